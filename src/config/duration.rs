//! Serde support for compose-style duration strings ("10s", "1m30s", "500ms").

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    // 純數字視為秒數
    if text.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = text
            .parse()
            .map_err(|_| format!("invalid duration '{}'", text))?;
        return Ok(Duration::from_secs(secs));
    }

    let mut total_secs = 0f64;
    let mut chars = text.chars().peekable();

    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() || *c == '.' {
                number.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if number.is_empty() {
            return Err(format!("invalid duration '{}': expected a number", text));
        }

        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(*c);
                chars.next();
            } else {
                break;
            }
        }

        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}'", text))?;
        let multiplier = match unit.as_str() {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 0.001,
            "" => return Err(format!("invalid duration '{}': missing unit", text)),
            other => {
                return Err(format!(
                    "invalid duration '{}': unknown unit '{}'",
                    text, other
                ))
            }
        };
        total_secs += value * multiplier;
    }

    // 過大的數字會讓浮點秒數溢位,不能讓它 panic
    Duration::try_from_secs_f64(total_secs)
        .map_err(|_| format!("invalid duration '{}': out of range", text))
}

pub fn format_duration(duration: &Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    if millis > 0 {
        out.push_str(&format!("{}ms", millis));
    }
    out
}

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(duration))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(de::Error::custom),
    }
}
