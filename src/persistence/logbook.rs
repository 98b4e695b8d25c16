//! Append-only plain-text logs under `LOG_DIR`.
//!
//! Errors are logged and swallowed. A full SD card must never stop the
//! sampling loop.
use std::path::Path;

use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

/// Readings, one line every log period.
pub const RESULT_FILE: &str = "sgp30-result.txt";
/// Baseline words, plain and `Valid: ` lines.
pub const BASELINE_FILE: &str = "sgp30-baseline.txt";

/// Append `line` plus a newline to `dir/file`, creating `dir` if needed.
pub async fn append(dir: &Path, file: &str, line: &str) {
    let path = dir.join(file);

    if let Err(e) = fs::create_dir_all(dir).await {
        warn!(path = %path.display(), error = %e, "logbook: failed to create directory");
        return;
    }

    let mut f = match fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "logbook: failed to open file");
            return;
        }
    };

    let content = format!("{line}\n");
    if let Err(e) = f.write_all(content.as_bytes()).await {
        warn!(path = %path.display(), error = %e, "logbook: failed to append");
    } else {
        debug!(path = %path.display(), "logbook: appended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_creates_dir_and_accumulates_lines() {
        let dir = std::env::temp_dir().join(format!("calcifer-logbook-{}", uuid::Uuid::new_v4()));

        append(&dir, RESULT_FILE, "first").await;
        append(&dir, RESULT_FILE, "second").await;

        let content = std::fs::read_to_string(dir.join(RESULT_FILE)).unwrap();
        assert_eq!(content, "first\nsecond\n");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn append_to_unwritable_path_is_swallowed() {
        let file = std::env::temp_dir().join(format!("calcifer-logbook-{}", uuid::Uuid::new_v4()));
        std::fs::write(&file, b"not a directory").unwrap();

        // `file` is a regular file, so creating the log inside it fails.
        append(&file, RESULT_FILE, "line").await;

        std::fs::remove_file(&file).unwrap();
    }
}
