//! Fixed-threshold air-quality classification.
//!
//! Levels from the Hong Kong Indoor Air Quality Management Group guide:
//! <https://www.iaq.gov.hk/media/65346/new-iaq-guide_eng.pdf>

use crate::models::{Classification, Reading};

pub const CO2_BAD_PPM: u16 = 1000;
pub const CO2_MEDIUM_PPM: u16 = 800;
pub const VOC_BAD_PPB: u16 = 261;
pub const VOC_MEDIUM_PPB: u16 = 87;

/// US EPA bands used by IQAir.
pub const AQI_GOOD_MAX: u32 = 50;
pub const AQI_MEDIUM_MAX: u32 = 100;

/// Classify a reading. The worse of the two pollutants wins.
pub fn classify(reading: &Reading) -> Classification {
    match (reading.co2_ppm, reading.voc_ppb) {
        (Some(co2), Some(voc)) => worst(classify_co2(co2), classify_voc(voc)),
        _ => Classification::Unknown,
    }
}

pub fn classify_co2(co2_ppm: u16) -> Classification {
    if co2_ppm >= CO2_BAD_PPM {
        Classification::Bad
    } else if co2_ppm >= CO2_MEDIUM_PPM {
        Classification::Medium
    } else {
        Classification::Good
    }
}

pub fn classify_voc(voc_ppb: u16) -> Classification {
    if voc_ppb >= VOC_BAD_PPB {
        Classification::Bad
    } else if voc_ppb >= VOC_MEDIUM_PPB {
        Classification::Medium
    } else {
        Classification::Good
    }
}

pub fn classify_aqi(aqi: u32) -> Classification {
    if aqi <= AQI_GOOD_MAX {
        Classification::Good
    } else if aqi <= AQI_MEDIUM_MAX {
        Classification::Medium
    } else {
        Classification::Bad
    }
}

fn worst(a: Classification, b: Classification) -> Classification {
    fn rank(c: Classification) -> u8 {
        match c {
            Classification::Unknown => 0,
            Classification::Good => 1,
            Classification::Medium => 2,
            Classification::Bad => 3,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}
