use std::str::FromStr;
use tokio::time::Duration;

/// Parses a duration string in the format "30s", "10m", "5h", "3d".
///
/// Supported units:
/// - `s` for seconds
/// - `m` for minutes
/// - `h` for hours
/// - `d` for days
pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration string cannot be empty".to_string());
    }

    let unit_char = s.chars().last().unwrap();
    let value_str = &s[0..s.len() - 1];

    let value = match u64::from_str(value_str) {
        Ok(v) => v,
        Err(_) => return Err(format!("Invalid numeric value in duration: '{}'", value_str)),
    };

    match unit_char {
        's' => Ok(Duration::from_secs(value)),
        'm' => Ok(Duration::from_secs(value * 60)),
        'h' => Ok(Duration::from_secs(value * 60 * 60)),
        'd' => Ok(Duration::from_secs(value * 24 * 60 * 60)),
        _ => Err(format!(
            "Unknown duration unit: '{}'. Use 's', 'm', 'h', or 'd'.",
            unit_char
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds() {
        assert_eq!(parse_duration_string("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_minutes() {
        assert_eq!(parse_duration_string("10m").unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn parses_hours() {
        assert_eq!(parse_duration_string("5h").unwrap(), Duration::from_secs(18000));
    }

    #[test]
    fn parses_days() {
        assert_eq!(parse_duration_string("3d").unwrap(), Duration::from_secs(259200));
    }

    #[test]
    fn rejects_empty_string() {
        assert!(parse_duration_string("").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration_string("10x").is_err());
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(parse_duration_string("abcs").is_err());
    }
}
