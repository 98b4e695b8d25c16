//! RAM framebuffer with change detection against the panel.
//!
//! Frames are drawn here first. `flush` compares the frame with what the
//! panel last received and sends only the bounding box of the differing
//! pixels, and nothing at all when the frame is unchanged. Pixels that are
//! overwritten and then restored within one frame do not count as changed.

use std::convert::Infallible;

use embedded_graphics::{pixelcolor::Rgb565, prelude::*, primitives::Rectangle};
use tracing::trace;

use super::Panel;

pub const WIDTH: usize = 240;
pub const HEIGHT: usize = 240;

const PIXEL_COUNT: usize = WIDTH * HEIGHT;

/// Bounding box of changed pixels, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyRect {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl DirtyRect {
    const FULL: Self = Self {
        min_x: 0,
        min_y: 0,
        max_x: WIDTH - 1,
        max_y: HEIGHT - 1,
    };

    fn from_point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn area(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.min_x as i32, self.min_y as i32),
            Size::new(
                (self.max_x - self.min_x + 1) as u32,
                (self.max_y - self.min_y + 1) as u32,
            ),
        )
    }
}

pub struct FrameBuffer {
    pixels: Vec<Rgb565>,
    /// What the panel currently shows.
    shown: Vec<Rgb565>,
    /// Panel contents unknown; the next flush sends the whole frame.
    stale: bool,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// A black frame, not yet dirty.
    pub fn new() -> Self {
        Self {
            pixels: vec![Rgb565::BLACK; PIXEL_COUNT],
            shown: vec![Rgb565::BLACK; PIXEL_COUNT],
            stale: false,
        }
    }

    /// Mark the whole frame as changed, e.g. when the panel's contents are
    /// unknown at startup.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.stale || self.pixels != self.shown
    }

    pub fn pixels(&self) -> &[Rgb565] {
        &self.pixels
    }

    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb565) {
        self.pixels[y * WIDTH + x] = color;
    }

    fn dirty_rect(&self) -> Option<DirtyRect> {
        if self.stale {
            return Some(DirtyRect::FULL);
        }
        let mut rect: Option<DirtyRect> = None;
        for (idx, _) in self
            .pixels
            .iter()
            .zip(&self.shown)
            .enumerate()
            .filter(|(_, (now, shown))| now != shown)
        {
            let (x, y) = (idx % WIDTH, idx / WIDTH);
            match &mut rect {
                Some(r) => r.expand(x, y),
                None => rect = Some(DirtyRect::from_point(x, y)),
            }
        }
        rect
    }

    /// Send the changed region to `panel` and remember it as shown.
    ///
    /// Returns `false` when there was nothing to send.
    pub fn flush(&mut self, panel: &mut dyn Panel) -> std::io::Result<bool> {
        let Some(rect) = self.dirty_rect() else {
            return Ok(false);
        };

        let width = rect.max_x - rect.min_x + 1;
        let region: Vec<Rgb565> = (rect.min_y..=rect.max_y)
            .flat_map(|y| {
                let start = y * WIDTH + rect.min_x;
                self.pixels[start..start + width].iter().copied()
            })
            .collect();

        let area = rect.area();
        trace!(
            width = area.size.width,
            height = area.size.height,
            x = rect.min_x,
            y = rect.min_y,
            "Flushing dirty region"
        );
        panel.blit(area, &region)?;
        self.shown.copy_from_slice(&self.pixels);
        self.stale = false;
        Ok(true)
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            let (x, y) = (coord.x, coord.y);
            if x >= 0 && y >= 0 && (x as usize) < WIDTH && (y as usize) < HEIGHT {
                self.set_pixel(x as usize, y as usize, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let x_start = (area.top_left.x.max(0) as usize).min(WIDTH);
        let y_start = (area.top_left.y.max(0) as usize).min(HEIGHT);
        let x_end = (area.top_left.x.max(0) as usize)
            .saturating_add(area.size.width as usize)
            .min(WIDTH);
        let y_end = (area.top_left.y.max(0) as usize)
            .saturating_add(area.size.height as usize)
            .min(HEIGHT);

        for y in y_start..y_end {
            for x in x_start..x_end {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.pixels.fill(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::tests::RecordingPanel;

    #[test]
    fn new_frame_is_clean() {
        let fb = FrameBuffer::new();
        assert!(!fb.is_dirty());
    }

    #[test]
    fn same_color_write_is_not_dirty() {
        let mut fb = FrameBuffer::new();
        fb.clear(Rgb565::BLACK).unwrap();
        assert!(!fb.is_dirty());
    }

    #[test]
    fn flush_sends_bounding_box_only() {
        let mut fb = FrameBuffer::new();
        Pixel(Point::new(10, 20), Rgb565::RED).draw(&mut fb).unwrap();
        Pixel(Point::new(12, 25), Rgb565::RED).draw(&mut fb).unwrap();

        let mut panel = RecordingPanel::default();
        assert!(fb.flush(&mut panel).unwrap());

        let (area, pixels) = &panel.blits[0];
        assert_eq!(*area, Rectangle::new(Point::new(10, 20), Size::new(3, 6)));
        assert_eq!(pixels.len(), 18);
        assert_eq!(pixels[0], Rgb565::RED);
        assert_eq!(pixels[17], Rgb565::RED);
        assert_eq!(pixels[1], Rgb565::BLACK);

        assert!(!fb.flush(&mut panel).unwrap());
        assert_eq!(panel.blits.len(), 1);
    }

    #[test]
    fn out_of_bounds_pixels_are_ignored() {
        let mut fb = FrameBuffer::new();
        Pixel(Point::new(-1, 5), Rgb565::WHITE).draw(&mut fb).unwrap();
        Pixel(Point::new(240, 5), Rgb565::WHITE).draw(&mut fb).unwrap();
        assert!(!fb.is_dirty());
    }

    #[test]
    fn overwritten_then_restored_pixel_is_not_dirty() {
        let mut fb = FrameBuffer::new();
        let mut panel = RecordingPanel::default();
        Pixel(Point::new(50, 60), Rgb565::RED).draw(&mut fb).unwrap();
        fb.flush(&mut panel).unwrap();

        fb.clear(Rgb565::BLACK).unwrap();
        assert!(fb.is_dirty());
        Pixel(Point::new(50, 60), Rgb565::RED).draw(&mut fb).unwrap();
        assert!(!fb.is_dirty());
        assert!(!fb.flush(&mut panel).unwrap());
        assert_eq!(panel.blits.len(), 1);
    }

    #[test]
    fn failed_blit_is_retried_on_next_flush() {
        struct BrokenPanel;
        impl Panel for BrokenPanel {
            fn blit(&mut self, _area: Rectangle, _pixels: &[Rgb565]) -> std::io::Result<()> {
                Err(std::io::Error::other("spi timeout"))
            }
            fn set_backlight(&mut self, _on: bool) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut fb = FrameBuffer::new();
        Pixel(Point::new(1, 1), Rgb565::GREEN).draw(&mut fb).unwrap();
        assert!(fb.flush(&mut BrokenPanel).is_err());
        assert!(fb.is_dirty());

        let mut panel = RecordingPanel::default();
        assert!(fb.flush(&mut panel).unwrap());
        assert_eq!(panel.blits[0].0, Rectangle::new(Point::new(1, 1), Size::new(1, 1)));
    }

    #[test]
    fn invalidate_covers_full_frame() {
        let mut fb = FrameBuffer::new();
        fb.invalidate();
        let mut panel = RecordingPanel::default();
        fb.flush(&mut panel).unwrap();
        assert_eq!(panel.blits[0].1.len(), PIXEL_COUNT);
    }
}
