//! Status screen layout.
//!
//! The frame is a pure function of the snapshot: the same snapshot always
//! produces the same pixels.

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Circle, PrimitiveStyleBuilder, Triangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use u8g2_fonts::{fonts, U8g2TextStyle};

use crate::{
    classifier::{classify_aqi, classify_co2, classify_voc},
    models::{Classification, Snapshot},
};

const CO2_X: i32 = 10;
const VOC_X: i32 = 125;
const LABEL_Y: i32 = 10;
const VALUE_Y: i32 = 45;
const UNIT_Y: i32 = 80;
const AQI_LABEL_Y: i32 = 150;
const AQI_VALUE_Y: i32 = 185;
/// Horizontal offset of a status dot from its block's x.
const DOT_DX: i32 = 75;
const DOT_DIAMETER: u32 = 16;

const BACKGROUND_DARK: Rgb565 = Rgb565::new(2, 5, 4);
const BACKGROUND_MEDIUM: Rgb565 = Rgb565::new(31, 63, 0);
const BACKGROUND_BAD: Rgb565 = Rgb565::new(31, 0, 0);

/// `(background, text)` colours for the indoor classification.
pub fn palette(classification: Classification) -> (Rgb565, Rgb565) {
    match classification {
        Classification::Bad => (BACKGROUND_BAD, Rgb565::WHITE),
        Classification::Medium => (BACKGROUND_MEDIUM, Rgb565::BLACK),
        Classification::Good | Classification::Unknown => (BACKGROUND_DARK, Rgb565::WHITE),
    }
}

pub fn dot_color(classification: Classification) -> Rgb565 {
    match classification {
        Classification::Good => Rgb565::new(0, 50, 8),
        Classification::Medium => Rgb565::new(31, 40, 0),
        Classification::Bad => Rgb565::new(24, 0, 0),
        Classification::Unknown => Rgb565::new(12, 24, 12),
    }
}

/// `<400` at the SGP30 floor, `--` when there is no value.
pub fn co2_text(co2_ppm: Option<u16>) -> String {
    match co2_ppm {
        Some(v) if v <= 400 => "<400".to_owned(),
        Some(v) => v.to_string(),
        None => "--".to_owned(),
    }
}

pub fn voc_text(voc_ppb: Option<u16>) -> String {
    voc_ppb.map(|v| v.to_string()).unwrap_or_else(|| "--".to_owned())
}

pub fn draw<D>(target: &mut D, snapshot: &Snapshot) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let (background, text_color) = palette(snapshot.classification);
    target.clear(background)?;

    let regular = || U8g2TextStyle::new(fonts::u8g2_font_helvR24_tf, text_color);
    let bold = || U8g2TextStyle::new(fonts::u8g2_font_helvB24_tf, text_color);
    let top_left = TextStyleBuilder::new().baseline(Baseline::Top).build();

    let reading = &snapshot.reading;
    let blocks = [
        (
            CO2_X,
            "CO2",
            co2_text(reading.co2_ppm),
            "ppm",
            reading.co2_ppm.map_or(Classification::Unknown, classify_co2),
        ),
        (
            VOC_X,
            "VOC",
            voc_text(reading.voc_ppb),
            "ppb",
            reading.voc_ppb.map_or(Classification::Unknown, classify_voc),
        ),
    ];

    for (x, label, value, unit, class) in blocks {
        Text::with_text_style(label, Point::new(x, LABEL_Y), regular(), top_left).draw(target)?;
        Text::with_text_style(&value, Point::new(x, VALUE_Y), bold(), top_left).draw(target)?;
        Text::with_text_style(unit, Point::new(x, UNIT_Y), regular(), top_left).draw(target)?;
        status_dot(target, Point::new(x + DOT_DX, LABEL_Y + 4), class, text_color)?;
    }

    if let Some(aqi) = snapshot.aqi() {
        Text::with_text_style("AQI", Point::new(CO2_X, AQI_LABEL_Y), regular(), top_left)
            .draw(target)?;
        Text::with_text_style(&aqi.to_string(), Point::new(CO2_X, AQI_VALUE_Y), bold(), top_left)
            .draw(target)?;
        status_dot(
            target,
            Point::new(CO2_X + DOT_DX, AQI_LABEL_Y + 4),
            classify_aqi(aqi),
            text_color,
        )?;
    }

    Ok(())
}

const FLAME_OUTER: Rgb565 = Rgb565::new(31, 24, 0);
const FLAME_INNER: Rgb565 = Rgb565::new(31, 52, 4);

/// Boot frame shown until the first reading: a flame and the name.
pub fn draw_splash<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(BACKGROUND_DARK)?;

    let outer = PrimitiveStyleBuilder::new().fill_color(FLAME_OUTER).build();
    let inner = PrimitiveStyleBuilder::new().fill_color(FLAME_INNER).build();
    Circle::new(Point::new(80, 70), 80).into_styled(outer).draw(target)?;
    Triangle::new(Point::new(84, 100), Point::new(120, 20), Point::new(156, 100))
        .into_styled(outer)
        .draw(target)?;
    Circle::new(Point::new(100, 105), 40).into_styled(inner).draw(target)?;

    let centered = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();
    Text::with_text_style(
        "Calcifer",
        Point::new(120, 180),
        U8g2TextStyle::new(fonts::u8g2_font_helvB24_tf, Rgb565::WHITE),
        centered,
    )
    .draw(target)?;
    Ok(())
}

/// Filled dot with an outline in the text colour, so it stays visible on
/// the red background.
fn status_dot<D>(
    target: &mut D,
    top_left: Point,
    class: Classification,
    outline: Rgb565,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = PrimitiveStyleBuilder::new()
        .fill_color(dot_color(class))
        .stroke_color(outline)
        .stroke_width(2)
        .build();
    Circle::new(top_left, DOT_DIAMETER).into_styled(style).draw(target)
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::{
        display::{framebuffer::FrameBuffer, tests::RecordingPanel},
        models::{OutdoorSnapshot, Reading},
    };

    fn snapshot(co2: u16, voc: u16, classification: Classification) -> Snapshot {
        let ts = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
        Snapshot {
            reading: Reading {
                co2_ppm: Some(co2),
                voc_ppb: Some(voc),
                ..Reading::unknown(ts)
            },
            classification,
            outdoor: Some(OutdoorSnapshot {
                aqi: 42,
                temperature_c: Some(18.0),
                humidity_pct: Some(60.0),
                pressure_hpa: Some(1012.0),
                measured_at: None,
                fetched_at: ts,
            }),
        }
    }

    #[test]
    fn value_texts() {
        assert_eq!(co2_text(Some(400)), "<400");
        assert_eq!(co2_text(Some(401)), "401");
        assert_eq!(co2_text(None), "--");
        assert_eq!(voc_text(Some(0)), "0");
        assert_eq!(voc_text(None), "--");
    }

    #[test]
    fn medium_uses_black_text_on_yellow() {
        assert_eq!(palette(Classification::Medium), (BACKGROUND_MEDIUM, Rgb565::BLACK));
        assert_eq!(palette(Classification::Bad).0, BACKGROUND_BAD);
        assert_eq!(palette(Classification::Unknown), palette(Classification::Good));
    }

    #[test]
    fn background_follows_classification() {
        let mut fb = FrameBuffer::new();
        draw(&mut fb, &snapshot(1100, 50, Classification::Bad)).unwrap();
        // Bottom-right corner is never covered by text or dots.
        assert_eq!(fb.pixels()[fb.pixels().len() - 1], BACKGROUND_BAD);
    }

    #[test]
    fn same_snapshot_twice_gives_identical_frame() {
        let s = snapshot(612, 33, Classification::Good);
        let mut fb = FrameBuffer::new();
        let mut panel = RecordingPanel::default();

        draw(&mut fb, &s).unwrap();
        assert!(fb.flush(&mut panel).unwrap());
        let first = fb.pixels().to_vec();

        draw(&mut fb, &s).unwrap();
        assert!(!fb.is_dirty());
        assert_eq!(fb.pixels(), first.as_slice());
        assert!(!fb.flush(&mut panel).unwrap());
        assert_eq!(panel.blits.len(), 1);
    }

    #[test]
    fn splash_draws_flame_on_dark_background() {
        let mut fb = FrameBuffer::new();
        draw_splash(&mut fb).unwrap();
        let at = |x: usize, y: usize| fb.pixels()[y * crate::display::framebuffer::WIDTH + x];
        assert_eq!(at(0, 0), BACKGROUND_DARK);
        assert_eq!(at(120, 125), FLAME_INNER);
        assert_eq!(at(120, 60), FLAME_OUTER);
    }

    #[test]
    fn different_values_redraw() {
        let mut fb = FrameBuffer::new();
        let mut panel = RecordingPanel::default();
        draw(&mut fb, &snapshot(612, 33, Classification::Good)).unwrap();
        fb.flush(&mut panel).unwrap();

        draw(&mut fb, &snapshot(655, 33, Classification::Good)).unwrap();
        assert!(fb.is_dirty());
    }
}
