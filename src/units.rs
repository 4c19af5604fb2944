use regex::Regex;
use std::sync::OnceLock;

use crate::error::DecodeError;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const SECONDS_PER_HOUR: u64 = 60 * 60;
const SECONDS_PER_MINUTE: u64 = 60;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(\d+)day\(s\))?(\d+)h:(\d+)m:(\d+)s$").expect("duration pattern compiles")
    })
}

/// Parses the uptime format used by the device, `"1day(s)2h:34m:56s"`, into
/// whole seconds. The day part is omitted by the device when it is zero.
pub fn parse_duration(text: &str) -> Result<u64, DecodeError> {
    let invalid = || DecodeError::InvalidDuration(text.to_string());
    let captures = duration_pattern().captures(text).ok_or_else(invalid)?;

    let field = |i: usize| -> Result<u64, DecodeError> {
        match captures.get(i) {
            Some(m) => m.as_str().parse::<u64>().map_err(|_| invalid()),
            None => Ok(0),
        }
    };

    let parts = [
        (field(1)?, SECONDS_PER_DAY),
        (field(2)?, SECONDS_PER_HOUR),
        (field(3)?, SECONDS_PER_MINUTE),
        (field(4)?, 1),
    ];

    parts.iter().try_fold(0u64, |total, (value, unit)| {
        value
            .checked_mul(*unit)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(invalid)
    })
}

/// Whole-degree Fahrenheit to whole-degree Celsius, truncating toward zero.
pub fn fahrenheit_to_celsius(fahrenheit: i32) -> i32 {
    // Widened so extreme readings cannot overflow; the result always fits i32.
    ((i64::from(fahrenheit) - 32) * 5 / 9) as i32
}
