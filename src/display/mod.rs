pub mod framebuffer;
pub mod panel;
pub mod render;

use std::io;

use anyhow::{Context, Result};
use embedded_graphics::{pixelcolor::Rgb565, primitives::Rectangle};
use tracing::info;

use crate::models::Snapshot;

use self::framebuffer::FrameBuffer;

/// Where frames and backlight changes end up.
pub trait Panel: Send {
    /// Write `pixels`, row-major and `area.size.width` wide.
    fn blit(&mut self, area: Rectangle, pixels: &[Rgb565]) -> io::Result<()>;
    fn set_backlight(&mut self, on: bool) -> io::Result<()>;
}

/// Proximity-woken screen: on while something is near the sensor, and for
/// `timeout_ticks` ticks after it leaves.
#[derive(Debug, Clone)]
pub struct Screen {
    threshold: u16,
    timeout_ticks: u32,
    countdown: u32,
}

impl Screen {
    pub fn new(threshold: u16, timeout_ticks: u32) -> Self {
        Self {
            threshold,
            timeout_ticks,
            countdown: 0,
        }
    }

    /// Advance one tick. Returns whether the screen is on.
    pub fn update(&mut self, proximity: u16) -> bool {
        let near = proximity >= self.threshold;
        if !near && self.countdown == 0 {
            return false;
        }
        if near {
            self.countdown = self.timeout_ticks;
        }
        self.countdown = self.countdown.saturating_sub(1);
        true
    }
}

pub struct Display {
    screen: Screen,
    frame: FrameBuffer,
    panel: Box<dyn Panel>,
    /// Last state sent to the backlight; `None` until the first tick.
    backlight: Option<bool>,
}

impl Display {
    pub fn new(panel: Box<dyn Panel>, screen: Screen) -> Self {
        let mut frame = FrameBuffer::new();
        frame.invalidate();
        Self {
            screen,
            frame,
            panel,
            backlight: None,
        }
    }

    pub fn tick(&mut self, snapshot: &Snapshot) -> Result<()> {
        let on = self.screen.update(snapshot.reading.proximity);
        self.set_backlight(on)?;
        if !on {
            return Ok(());
        }

        render::draw(&mut self.frame, snapshot).unwrap_or_else(|never| match never {});
        self.frame
            .flush(self.panel.as_mut())
            .context("failed to write frame to panel")?;
        Ok(())
    }

    /// Show the boot frame with the backlight on.
    pub fn splash(&mut self) -> Result<()> {
        render::draw_splash(&mut self.frame).unwrap_or_else(|never| match never {});
        self.frame
            .flush(self.panel.as_mut())
            .context("failed to write boot frame to panel")?;
        self.set_backlight(true)
    }

    /// Turn the backlight off before exit.
    pub fn shutdown(&mut self) -> Result<()> {
        self.set_backlight(false)
    }

    pub fn is_on(&self) -> bool {
        self.backlight == Some(true)
    }

    fn set_backlight(&mut self, on: bool) -> Result<()> {
        if self.backlight == Some(on) {
            return Ok(());
        }
        self.panel
            .set_backlight(on)
            .context("failed to switch backlight")?;
        self.backlight = Some(on);
        info!(on, "Screen switched");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::DateTime;

    use super::*;
    use crate::models::{Classification, Reading};

    #[derive(Default)]
    pub struct RecordingPanel {
        pub blits: Vec<(Rectangle, Vec<Rgb565>)>,
        pub backlight: Vec<bool>,
    }

    impl Panel for RecordingPanel {
        fn blit(&mut self, area: Rectangle, pixels: &[Rgb565]) -> io::Result<()> {
            self.blits.push((area, pixels.to_vec()));
            Ok(())
        }

        fn set_backlight(&mut self, on: bool) -> io::Result<()> {
            self.backlight.push(on);
            Ok(())
        }
    }

    /// A panel whose calls can be inspected after it is boxed.
    #[derive(Clone, Default)]
    struct SharedPanel(Arc<Mutex<RecordingPanel>>);

    impl Panel for SharedPanel {
        fn blit(&mut self, area: Rectangle, pixels: &[Rgb565]) -> io::Result<()> {
            self.0.lock().unwrap().blit(area, pixels)
        }

        fn set_backlight(&mut self, on: bool) -> io::Result<()> {
            self.0.lock().unwrap().set_backlight(on)
        }
    }

    fn snapshot(proximity: u16) -> Snapshot {
        let ts = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
        Snapshot {
            reading: Reading {
                co2_ppm: Some(612),
                voc_ppb: Some(33),
                proximity,
                ..Reading::unknown(ts)
            },
            classification: Classification::Good,
            outdoor: None,
        }
    }

    #[test]
    fn screen_off_without_proximity() {
        let mut s = Screen::new(5, 5);
        assert!(!s.update(0));
        assert!(!s.update(4));
    }

    #[test]
    fn screen_stays_on_for_timeout_after_hit() {
        let mut s = Screen::new(5, 5);
        let states: Vec<bool> = [9, 0, 0, 0, 0, 0, 0].into_iter().map(|p| s.update(p)).collect();
        assert_eq!(states, vec![true, true, true, true, true, false, false]);
    }

    #[test]
    fn repeated_hits_extend_the_timeout() {
        let mut s = Screen::new(5, 3);
        assert!(s.update(5));
        assert!(s.update(0));
        assert!(s.update(5));
        assert!(s.update(0));
        assert!(s.update(0));
        assert!(!s.update(0));
    }

    #[test]
    fn backlight_only_switches_on_change() {
        let shared = SharedPanel::default();
        let mut display = Display::new(Box::new(shared.clone()), Screen::new(5, 2));

        for p in [0, 0, 9, 9, 0, 0, 0, 0] {
            display.tick(&snapshot(p)).unwrap();
        }
        display.shutdown().unwrap();

        let panel = shared.0.lock().unwrap();
        assert_eq!(panel.backlight, vec![false, true, false]);
    }

    #[test]
    fn splash_then_idle_turns_the_backlight_off() {
        let shared = SharedPanel::default();
        let mut display = Display::new(Box::new(shared.clone()), Screen::new(5, 5));

        display.splash().unwrap();
        assert!(display.is_on());
        display.tick(&snapshot(0)).unwrap();
        assert!(!display.is_on());

        let panel = shared.0.lock().unwrap();
        assert_eq!(panel.backlight, vec![true, false]);
        assert_eq!(panel.blits.len(), 1);
        assert_eq!(panel.blits[0].1.len(), framebuffer::WIDTH * framebuffer::HEIGHT);
    }

    #[test]
    fn unchanged_frame_is_flushed_once() {
        let shared = SharedPanel::default();
        let mut display = Display::new(Box::new(shared.clone()), Screen::new(5, 5));

        display.tick(&snapshot(9)).unwrap();
        display.tick(&snapshot(9)).unwrap();
        assert!(display.is_on());

        let panel = shared.0.lock().unwrap();
        assert_eq!(panel.blits.len(), 1);
        assert_eq!(panel.blits[0].1.len(), framebuffer::WIDTH * framebuffer::HEIGHT);
    }
}
