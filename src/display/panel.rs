//! Output devices for the frame and the backlight.

use std::{
    fs::{File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use embedded_graphics::{
    pixelcolor::{IntoStorage, Rgb565},
    primitives::Rectangle,
};
use tracing::info;

use super::{framebuffer::WIDTH, Panel};

/// `bl_power` values (FB_BLANK_UNBLANK / FB_BLANK_POWERDOWN).
const BL_POWER_ON: &str = "0";
const BL_POWER_OFF: &str = "4";

/// A Linux framebuffer device in RGB565, such as the one `fbtft` exposes for
/// the ST7789.
pub struct FbPanel {
    fb: File,
    backlight: Option<PathBuf>,
}

impl FbPanel {
    pub fn open(fb: &Path, backlight: Option<PathBuf>) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(fb)?;
        info!(fb = %fb.display(), backlight = ?backlight, "Display panel opened");
        Ok(Self { fb: file, backlight })
    }
}

impl Panel for FbPanel {
    fn blit(&mut self, area: Rectangle, pixels: &[Rgb565]) -> io::Result<()> {
        let width = area.size.width as usize;
        if width == 0 {
            return Ok(());
        }
        for (row, chunk) in pixels.chunks(width).enumerate() {
            let y = area.top_left.y as u64 + row as u64;
            let offset = (y * WIDTH as u64 + area.top_left.x as u64) * 2;
            self.fb.seek(SeekFrom::Start(offset))?;
            self.fb.write_all(&encode_row(chunk))?;
        }
        self.fb.flush()
    }

    fn set_backlight(&mut self, on: bool) -> io::Result<()> {
        match &self.backlight {
            Some(path) => std::fs::write(path, if on { BL_POWER_ON } else { BL_POWER_OFF }),
            None => Ok(()),
        }
    }
}

/// Little-endian RGB565, the fbdev layout on the Pi.
pub fn encode_row(pixels: &[Rgb565]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|c| c.into_storage().to_le_bytes())
        .collect()
}

/// Headless mode: frames and backlight changes go nowhere.
#[derive(Debug, Default)]
pub struct NullPanel;

impl Panel for NullPanel {
    fn blit(&mut self, _area: Rectangle, _pixels: &[Rgb565]) -> io::Result<()> {
        Ok(())
    }

    fn set_backlight(&mut self, _on: bool) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embedded_graphics::prelude::*;

    use super::*;
    use crate::display::framebuffer::HEIGHT;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("calcifer-{name}-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn encodes_little_endian() {
        assert_eq!(encode_row(&[Rgb565::RED, Rgb565::BLUE]), vec![0x00, 0xF8, 0x1F, 0x00]);
    }

    #[test]
    fn blit_writes_rows_at_their_offset() {
        let path = temp_path("fb");
        std::fs::write(&path, vec![0u8; WIDTH * HEIGHT * 2]).unwrap();

        let mut panel = FbPanel::open(&path, None).unwrap();
        let area = Rectangle::new(Point::new(2, 1), Size::new(2, 2));
        panel.blit(area, &[Rgb565::WHITE; 4]).unwrap();
        drop(panel);

        let bytes = std::fs::read(&path).unwrap();
        let at = |x: usize, y: usize| u16::from_le_bytes([bytes[(y * WIDTH + x) * 2], bytes[(y * WIDTH + x) * 2 + 1]]);
        assert_eq!(at(2, 1), 0xFFFF);
        assert_eq!(at(3, 2), 0xFFFF);
        assert_eq!(at(1, 1), 0);
        assert_eq!(at(2, 3), 0);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn backlight_writes_bl_power() {
        let fb = temp_path("fb");
        let bl = temp_path("bl_power");
        std::fs::write(&fb, b"").unwrap();

        let mut panel = FbPanel::open(&fb, Some(bl.clone())).unwrap();
        panel.set_backlight(false).unwrap();
        assert_eq!(std::fs::read_to_string(&bl).unwrap(), "4");
        panel.set_backlight(true).unwrap();
        assert_eq!(std::fs::read_to_string(&bl).unwrap(), "0");

        std::fs::remove_file(&fb).unwrap();
        std::fs::remove_file(&bl).unwrap();
    }
}
