//! Spanish Markdown rendering for every reply the bot sends.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike};

use crate::config::AlertThresholds;
use crate::weather::{Coordinate, CurrentConditions, ForecastPoint};

pub const FALLBACK: &str =
    "⚠️ No pude obtener el clima para tu ubicación. Probá de nuevo en un rato.";
pub const NO_LOCATION: &str = "❗ No tengo tu ubicación guardada.";
pub const LOCATION_PROMPT: &str = "📍 Tocá el botón para compartir tu ubicación";
pub const VOICE_PREFIX: &str = "🎙️ ¡Escuché tu audio!";
pub const SUBSCRIBED: &str = "🔔 Listo, vas a recibir el clima periódicamente.";
pub const UNSUBSCRIBED: &str = "🔕 Ya no vas a recibir el clima periódicamente.";
pub const TEST_MESSAGE: &str = "🚀 Este es tu bot del clima.";

/// Forecast intervals shown by `/mas-tarde`
pub const SHORT_RANGE_INTERVALS: usize = 3;

const TRANSLATIONS: &[(&str, &str)] = &[
    ("clear sky", "Cielo despejado"),
    ("few clouds", "Pocas nubes"),
    ("scattered clouds", "Nubes dispersas"),
    ("broken clouds", "Nubes rotas"),
    ("overcast clouds", "Nublado"),
    ("light rain", "Lluvia ligera"),
    ("moderate rain", "Lluvia moderada"),
    ("heavy intensity rain", "Lluvia fuerte"),
    ("thunderstorm", "Tormenta eléctrica"),
    ("snow", "Nieve"),
    ("mist", "Niebla"),
];

/// Translate an OpenWeatherMap description, keeping unknown ones as-is.
pub fn translate(description: &str) -> String {
    let lower = description.to_lowercase();
    TRANSLATIONS
        .iter()
        .find(|(en, _)| *en == lower)
        .map(|(_, es)| es.to_string())
        .unwrap_or_else(|| description.to_string())
}

/// Escape a value for Telegram's legacy Markdown, where only these four
/// characters open an entity.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Translated description, safe to embed in a reply
fn describe(description: &str) -> String {
    escape(&translate(description))
}

pub fn greeting(hour: u32) -> &'static str {
    if hour < 12 {
        "🌅 *Buenos días!*"
    } else if hour < 19 {
        "☀️ *Buenas tardes!*"
    } else {
        "🌙 *Buenas noches!*"
    }
}

fn place<'a>(current: &'a CurrentConditions, fallback: &'a str) -> &'a str {
    if current.place_name.is_empty() {
        fallback
    } else {
        &current.place_name
    }
}

fn conditions_block(current: &CurrentConditions) -> String {
    format!(
        "🌡️ *Temperatura:* {:.1}°C\n🥵 *Sensación térmica:* {:.1}°C\n🌥️ *Estado:* {}\n💧 *Humedad:* {}%\n💨 *Viento:* {:.1} km/h",
        current.temperature,
        current.feels_like,
        describe(&current.description),
        current.humidity,
        current.wind_speed
    )
}

/// Reply for `/ahora`
pub fn current_summary(current: &CurrentConditions, fallback_place: &str) -> String {
    format!(
        "🌤️ *Clima actual en {}*\n{}",
        escape(place(current, fallback_place)),
        conditions_block(current)
    )
}

/// Greeting, current conditions and the forecast hints. Used for free text,
/// voice notes and the scheduled broadcast.
pub fn full_weather(
    current: &CurrentConditions,
    fallback_place: &str,
    now: DateTime<FixedOffset>,
) -> String {
    format!(
        "{}\n\n{}\n\n📆 Si querés saber cómo estará *más tarde*, usá */mas-tarde*\n📅 Y si querés saber cómo estará *mañana*, usá */mañana* 😊",
        greeting(now.hour()),
        current_summary(current, fallback_place)
    )
}

/// Reply to a shared location
pub fn location_weather(current: &CurrentConditions, coord: Coordinate) -> String {
    let name = if current.place_name.is_empty() {
        format!("{}, {}", coord.latitude, coord.longitude)
    } else {
        escape(&current.place_name)
    };
    format!("📍 *Clima en {}*\n{}", name, conditions_block(current))
}

pub fn saved_location(coord: Coordinate) -> String {
    format!(
        "📍 Tu ubicación actual es:\nLat: {}\nLon: {}",
        coord.latitude, coord.longitude
    )
}

fn rain_suffix(point: &ForecastPoint) -> String {
    match point.precipitation_probability {
        Some(p) if p > 0.0 => format!(" (💧 {:.0}%)", p * 100.0),
        _ => String::new(),
    }
}

/// Next few intervals after `now`.
pub fn short_range(points: &[ForecastPoint], now: DateTime<FixedOffset>) -> Option<String> {
    let upcoming: Vec<&ForecastPoint> = points
        .iter()
        .filter(|p| p.timestamp >= now)
        .take(SHORT_RANGE_INTERVALS)
        .collect();
    if upcoming.is_empty() {
        return None;
    }

    let tz = *now.offset();
    let mut text = String::from("🕒 *Pronóstico para las próximas horas*\n");
    for point in upcoming {
        let local = point.timestamp.with_timezone(&tz);
        text.push_str(&format!(
            "\n• {:02}:{:02} → {:.1}°C, {}{}",
            local.hour(),
            local.minute(),
            point.temperature,
            describe(&point.description),
            rain_suffix(point)
        ));
    }
    Some(text)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub min: f64,
    pub max: f64,
    /// Most frequent description; ties go to the earliest interval
    pub condition: String,
    pub max_precipitation: Option<f64>,
}

/// Aggregate every interval whose local date is the day after `now`.
pub fn tomorrow(points: &[ForecastPoint], now: DateTime<FixedOffset>) -> Option<DaySummary> {
    let tz = *now.offset();
    let date = now.date_naive() + Duration::days(1);
    let day: Vec<&ForecastPoint> = points
        .iter()
        .filter(|p| p.timestamp.with_timezone(&tz).date_naive() == date)
        .collect();
    if day.is_empty() {
        return None;
    }

    let min = day.iter().map(|p| p.temperature).fold(f64::INFINITY, f64::min);
    let max = day
        .iter()
        .map(|p| p.temperature)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for p in &day {
        match counts.iter_mut().find(|(d, _)| *d == p.description) {
            Some((_, n)) => *n += 1,
            None => counts.push((p.description.as_str(), 1)),
        }
    }
    // max_by_key keeps the last maximum; walk in reverse so the earliest wins
    let condition = counts
        .iter()
        .rev()
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d.to_string())
        .unwrap_or_default();

    let max_precipitation = day
        .iter()
        .filter_map(|p| p.precipitation_probability)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));

    Some(DaySummary {
        date,
        min,
        max,
        condition,
        max_precipitation,
    })
}

pub fn tomorrow_text(summary: &DaySummary) -> String {
    let mut text = format!(
        "📅 *Pronóstico para mañana ({:02}/{:02})*\n🔻 *Mínima:* {:.1}°C\n🔺 *Máxima:* {:.1}°C\n🌥️ *Estado:* {}",
        summary.date.day(),
        summary.date.month(),
        summary.min,
        summary.max,
        describe(&summary.condition)
    );
    if let Some(p) = summary.max_precipitation {
        text.push_str(&format!("\n💧 *Probabilidad de lluvia:* {:.0}%", p * 100.0));
    }
    text
}

/// Intervals inspected by `/alertas` (~24h of 3-hour steps)
const ALERT_HORIZON: usize = 8;

/// Active-condition alerts from current conditions and the next day of forecast.
pub fn alerts(
    current: &CurrentConditions,
    points: &[ForecastPoint],
    thresholds: &AlertThresholds,
) -> Vec<String> {
    let mut found = Vec::new();
    let horizon = &points[..points.len().min(ALERT_HORIZON)];

    let coldest = horizon
        .iter()
        .map(|p| p.temperature)
        .fold(current.temperature, f64::min);
    let hottest = horizon
        .iter()
        .map(|p| p.temperature)
        .fold(current.temperature, f64::max);

    if coldest <= thresholds.cold_threshold {
        found.push(format!("🧊 *Frío extremo:* hasta {:.1}°C ❄️", coldest));
    }
    if hottest >= thresholds.heat_threshold {
        found.push(format!("🥵 *Calor extremo:* hasta {:.1}°C 🔥", hottest));
    }
    if current.wind_speed >= thresholds.wind_threshold {
        found.push(format!(
            "🌬️ *Viento fuerte:* {:.1} km/h",
            current.wind_speed
        ));
    }
    if let Some(rainy) = horizon.iter().find(|p| {
        p.precipitation_probability
            .is_some_and(|prob| prob >= thresholds.rain_probability)
    }) {
        found.push(format!(
            "☔ *Lluvia probable:* {} ({:.0}%)",
            describe(&rainy.description),
            rainy.precipitation_probability.unwrap_or_default() * 100.0
        ));
    }
    found
}

pub fn alerts_text(alerts: &[String]) -> String {
    if alerts.is_empty() {
        return "✅ No hay alertas activas.".to_string();
    }
    format!("🚨 *Alertas activas*\n\n{}", alerts.join("\n"))
}

pub fn sudden_change(previous: f64, current: f64) -> String {
    format!("⚠️ *Cambio brusco:* de {:.1}°C a {:.1}°C", previous, current)
}

pub fn extreme_cold(temp: f64) -> String {
    format!("🧊 *Frío extremo:* {:.1}°C ❄️", temp)
}

pub fn extreme_heat(temp: f64) -> String {
    format!("🥵 *Calor extremo:* {:.1}°C 🔥", temp)
}

pub fn help_text() -> String {
    "👋 *¡Hola! Soy tu bot del clima.*\n\n\
     Podés usar los siguientes comandos:\n\
     • /ahora → Ver clima actual\n\
     • /mas-tarde → Pronóstico para las próximas horas\n\
     • /mañana → Pronóstico para mañana\n\
     • /alertas → Ver alertas activas\n\
     • /ubicacion → Compartí tu ubicación\n\
     • /donde → Ver ubicación guardada\n\
     • /subscribe → Recibir el clima periódicamente\n\
     • /unsubscribe → Dejar de recibirlo\n\n\
     También podés escribirme un mensaje o nota de voz y te contesto 😉"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tz() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn point(when: DateTime<FixedOffset>, temp: f64, desc: &str, pop: Option<f64>) -> ForecastPoint {
        ForecastPoint {
            timestamp: when.with_timezone(&Utc),
            temperature: temp,
            description: desc.to_string(),
            precipitation_probability: pop,
        }
    }

    fn conditions(temp: f64, wind: f64) -> CurrentConditions {
        CurrentConditions {
            temperature: temp,
            feels_like: temp - 1.0,
            humidity: 55,
            wind_speed: wind,
            description: "clear sky".to_string(),
            place_name: "Buenos Aires".to_string(),
        }
    }

    #[test]
    fn test_translate_known_and_unknown() {
        assert_eq!(translate("Clear Sky"), "Cielo despejado");
        assert_eq!(translate("volcanic ash"), "volcanic ash");
    }

    #[test]
    fn test_markdown_in_names_is_escaped() {
        let mut current = conditions(20.0, 5.0);
        current.place_name = "San_Martín *Norte*".to_string();
        current.description = "smoke_[haze]".to_string();

        let text = current_summary(&current, "X");
        assert!(text.contains(r"*Clima actual en San\_Martín \*Norte\**"));
        assert!(text.contains(r"*Estado:* smoke\_\[haze]"));

        let text = location_weather(&current, Coordinate::new(1.0, 2.0));
        assert!(text.contains(r"San\_Martín"));
        assert_eq!(escape("Buenos Aires"), "Buenos Aires");
    }

    #[test]
    fn test_greeting_boundaries() {
        assert_eq!(greeting(0), "🌅 *Buenos días!*");
        assert_eq!(greeting(12), "☀️ *Buenas tardes!*");
        assert_eq!(greeting(19), "🌙 *Buenas noches!*");
    }

    #[test]
    fn test_full_weather_has_hints() {
        let text = full_weather(&conditions(21.5, 10.0), "X", at(2026, 5, 1, 9));
        assert!(text.starts_with("🌅 *Buenos días!*"));
        assert!(text.contains("*Clima actual en Buenos Aires*"));
        assert!(text.contains("21.5°C"));
        assert!(text.contains("Cielo despejado"));
        assert!(text.contains("/mas-tarde"));
    }

    #[test]
    fn test_short_range_takes_three_upcoming() {
        let now = at(2026, 5, 1, 10);
        let points = vec![
            point(at(2026, 5, 1, 9), 10.0, "mist", None),
            point(at(2026, 5, 1, 12), 14.0, "few clouds", None),
            point(at(2026, 5, 1, 15), 16.0, "light rain", Some(0.4)),
            point(at(2026, 5, 1, 18), 13.0, "mist", None),
            point(at(2026, 5, 1, 21), 11.0, "mist", None),
        ];
        let text = short_range(&points, now).unwrap();
        assert!(!text.contains("09:00"));
        assert!(text.contains("12:00 → 14.0°C, Pocas nubes"));
        assert!(text.contains("15:00 → 16.0°C, Lluvia ligera (💧 40%)"));
        assert!(text.contains("18:00"));
        assert!(!text.contains("21:00"));
    }

    #[test]
    fn test_tomorrow_uses_local_calendar_day() {
        let now = at(2026, 5, 1, 22);
        let points = vec![
            point(at(2026, 5, 1, 23), 5.0, "mist", None),
            point(at(2026, 5, 2, 0), 9.0, "mist", None),
            point(at(2026, 5, 2, 9), 12.0, "clear sky", Some(0.1)),
            point(at(2026, 5, 2, 15), 18.0, "clear sky", Some(0.3)),
            point(at(2026, 5, 2, 21), 11.0, "mist", None),
            point(at(2026, 5, 3, 0), 30.0, "clear sky", None),
        ];
        let day = tomorrow(&points, now).unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2026, 5, 2).unwrap());
        assert_eq!(day.min, 9.0);
        assert_eq!(day.max, 18.0);
        // two "mist" and two "clear sky": earliest wins
        assert_eq!(day.condition, "mist");
        assert_eq!(day.max_precipitation, Some(0.3));

        let text = tomorrow_text(&day);
        assert!(text.contains("(02/05)"));
        assert!(text.contains("Niebla"));
        assert!(text.contains("30%"));
    }

    #[test]
    fn test_tomorrow_without_points() {
        let now = at(2026, 5, 1, 10);
        let points = vec![point(at(2026, 5, 1, 12), 14.0, "mist", None)];
        assert!(tomorrow(&points, now).is_none());
    }

    #[test]
    fn test_alerts_detected() {
        let thresholds = AlertThresholds::default();
        let points = vec![
            point(at(2026, 1, 10, 12), 36.0, "clear sky", None),
            point(at(2026, 1, 10, 15), 30.0, "thunderstorm", Some(0.9)),
        ];
        let found = alerts(&conditions(33.0, 60.0), &points, &thresholds);
        assert_eq!(found.len(), 3);
        assert!(found[0].contains("Calor extremo"));
        assert!(found[1].contains("Viento fuerte"));
        assert!(found[2].contains("Tormenta eléctrica (90%)"));

        assert_eq!(
            alerts_text(&alerts(&conditions(20.0, 5.0), &[], &thresholds)),
            "✅ No hay alertas activas."
        );
    }

    #[test]
    fn test_saved_location_prints_numbers() {
        let text = saved_location(Coordinate::new(-34.6, -58.4));
        assert!(text.contains("Lat: -34.6"));
        assert!(text.contains("Lon: -58.4"));
    }
}
