//! User-facing text: chat replies, alert bodies and relative times.

use chrono::{DateTime, Utc};

use crate::{
    classifier::{AQI_GOOD_MAX, AQI_MEDIUM_MAX},
    config::Language,
    models::{Classification, Snapshot},
};

/// Outdoor air band, used to pick the `/start` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outdoor {
    Clean,
    Moderate,
    Unhealthy,
}

impl Outdoor {
    fn from_aqi(aqi: u32) -> Self {
        if aqi > AQI_MEDIUM_MAX {
            Self::Unhealthy
        } else if aqi > AQI_GOOD_MAX {
            Self::Moderate
        } else {
            Self::Clean
        }
    }
}

/// `CO2: 612 ppm, VOC: 33 ppb, AQI: 42`. The SGP30 floor of 400 ppm is shown
/// as `<400`.
pub fn readings_line(snapshot: &Snapshot) -> String {
    let co2 = match snapshot.reading.co2_ppm {
        Some(v) if v <= 400 => "<400".to_owned(),
        Some(v) => v.to_string(),
        None => "--".to_owned(),
    };
    let voc = snapshot
        .reading
        .voc_ppb
        .map(|v| v.to_string())
        .unwrap_or_else(|| "--".to_owned());
    let aqi = snapshot
        .aqi()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "--".to_owned());
    format!("CO2: {co2} ppm, VOC: {voc} ppb, AQI: {aqi}")
}

/// Reply to the `start` command: advice based on indoor and outdoor air.
pub fn status_reply(snapshot: Option<&Snapshot>, lang: Language) -> String {
    let Some(snapshot) = snapshot.filter(|s| s.classification != Classification::Unknown) else {
        return match lang {
            Language::Spanish => "Todavía estoy poniéndome en marcha, así que no tengo datos aún",
            Language::English => "I'm still warming up, so I have no data yet",
        }
        .to_owned();
    };

    let outdoor = snapshot.aqi().map(Outdoor::from_aqi).unwrap_or(Outdoor::Clean);
    let advice = match lang {
        Language::Spanish => advice_es(snapshot.classification, outdoor),
        Language::English => advice_en(snapshot.classification, outdoor),
    };
    format!("{advice}\n{}", readings_line(snapshot))
}

fn advice_es(indoor: Classification, outdoor: Outdoor) -> &'static str {
    use Classification::*;
    use Outdoor::*;
    match (indoor, outdoor) {
        (Bad, Unhealthy) => "La calidad del aire tanto dentro como fuera de casa es muy mala. Habrá que aguantarse. 😷",
        (Bad, Moderate) => "Huele a tigre. Aunque la calidad del aire exterior no es muy buena, quizá sea oportuno ventilar un poco. 🔥",
        (Bad, _) => "Huele a tigre. Haz el favor de ventilar. 🔥",
        (Medium, Unhealthy) => "Aunque vendría bien ventilar un poco, la calidad del aire fuera de casa es muy mala. 💔",
        (Medium, Moderate) => "La calidad del aire tanto dentro como fuera de casa es bastante mala. Habrá que aguantarse. 😷",
        (Medium, _) => "El ambiente está un poco cargado. No nos vendría mal ventilar 🏡",
        (_, Unhealthy) => "La calidad del aire es muy mala afuera, pero muy buena adentro. Hoy es mejor quedarse en casa y no ventilar. 🛋",
        (_, Moderate) => "La calidad del aire es mala afuera, pero muy buena adentro. Hoy es mejor no ventilar. 🛋",
        (_, Clean) => "Qué aire más limpio 💖",
    }
}

fn advice_en(indoor: Classification, outdoor: Outdoor) -> &'static str {
    use Classification::*;
    use Outdoor::*;
    match (indoor, outdoor) {
        (Bad, Unhealthy) => "Air quality is very poor both indoors and outdoors. Nothing to do but wait. 😷",
        (Bad, Moderate) => "It's stuffy in here. Outdoor air isn't great either, but a little ventilation may help. 🔥",
        (Bad, _) => "It's stuffy in here. Please open a window. 🔥",
        (Medium, Unhealthy) => "Some ventilation would help, but outdoor air quality is very poor. 💔",
        (Medium, Moderate) => "Air quality is fairly poor both indoors and outdoors. Nothing to do but wait. 😷",
        (Medium, _) => "The air is getting a bit heavy. Some ventilation wouldn't hurt 🏡",
        (_, Unhealthy) => "Outdoor air is very poor, but indoor air is great. Better stay in and keep the windows closed. 🛋",
        (_, Moderate) => "Outdoor air is poor, but indoor air is great. Better keep the windows closed today. 🛋",
        (_, Clean) => "Such clean air 💖",
    }
}

pub fn bad_alert(snapshot: &Snapshot, lang: Language) -> String {
    let head = match lang {
        Language::Spanish => "¡La calidad del aire es muy mala! Toca ventilar 🖼️",
        Language::English => "Air quality is very poor! Time to ventilate 🖼️",
    };
    format!("{head}\n{}", readings_line(snapshot))
}

pub fn good_alert(snapshot: &Snapshot, lang: Language) -> String {
    let head = match lang {
        Language::Spanish => "¡La calidad del aire ha mejorado un montón! Ya podemos cerrar las ventanas 🪟",
        Language::English => "Air quality has improved a lot! We can close the windows now 🪟",
    };
    format!("{head}\n{}", readings_line(snapshot))
}

pub fn alerts_enabled(lang: Language) -> &'static str {
    match lang {
        Language::Spanish => "¡Alertas activadas!",
        Language::English => "Alerts enabled!",
    }
}

pub fn alerts_already_enabled(lang: Language) -> &'static str {
    match lang {
        Language::Spanish => "Ya tienes las alertas activadas.",
        Language::English => "Alerts are already enabled.",
    }
}

pub fn alerts_disabled(lang: Language) -> &'static str {
    match lang {
        Language::Spanish => "¡Alertas desactivadas!",
        Language::English => "Alerts disabled!",
    }
}

pub fn alerts_not_enabled(lang: Language) -> &'static str {
    match lang {
        Language::Spanish => "No tienes las alertas activadas.",
        Language::English => "You don't have alerts enabled.",
    }
}

// ---------------------------------------------------------------------------
// Relative time
// ---------------------------------------------------------------------------

/// Age of `then` as seen from `now`, in the single largest unit:
/// "2 days ago", "hace 1 mes", "just now".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>, lang: Language) -> String {
    let delta = now.signed_duration_since(then);
    let total_days = delta.num_days().max(0);
    let seconds_of_day = (delta.num_seconds().max(0)) % 86_400;

    let units = [
        (total_days / 365, Unit::Year),
        ((total_days % 365) / 30, Unit::Month),
        ((total_days % 365) % 30, Unit::Day),
        (seconds_of_day / 3600, Unit::Hour),
        ((seconds_of_day % 3600) / 60, Unit::Minute),
        (seconds_of_day % 60, Unit::Second),
    ];

    match units.iter().find(|(n, _)| *n > 0) {
        Some(&(n, unit)) => match lang {
            Language::Spanish => format!("hace {}", unit.count_es(n)),
            Language::English => format!("{} ago", unit.count_en(n)),
        },
        None => match lang {
            Language::Spanish => "justo ahora".to_owned(),
            Language::English => "just now".to_owned(),
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Unit {
    fn count_en(self, n: i64) -> String {
        let word = match self {
            Unit::Year => "year",
            Unit::Month => "month",
            Unit::Day => "day",
            Unit::Hour => "hour",
            Unit::Minute => "minute",
            Unit::Second => "second",
        };
        if n < 2 {
            format!("1 {word}")
        } else {
            format!("{n} {word}s")
        }
    }

    fn count_es(self, n: i64) -> String {
        let (singular, plural) = match self {
            Unit::Year => ("año", "años"),
            Unit::Month => ("mes", "meses"),
            Unit::Day => ("día", "días"),
            Unit::Hour => ("hora", "horas"),
            Unit::Minute => ("minuto", "minutos"),
            Unit::Second => ("segundo", "segundos"),
        };
        if n < 2 {
            format!("1 {singular}")
        } else {
            format!("{n} {plural}")
        }
    }
}
