//! # Spec Validation
//!
//! Parses the refresh and retry intervals of an owner and checks them
//! against the fixed validity of installation access tokens.

use crate::constants::FIXED_CREDENTIAL_VALIDITY;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// One `<number><unit>` component of a Go style duration (`1h30m`, `1.5h`, `500ms`)
static DURATION_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<number>\d+(?:\.\d*)?|\.\d+)(?P<unit>ns|us|µs|ms|s|m|h)")
        .expect("Failed to compile duration regex - this should never happen")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("invalid {field} {value:?}: expected a duration such as \"30m\" or \"1h30m\"")]
    InvalidDuration { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("refreshInterval {value:?} must be shorter than the installation token validity (1h)")]
    RefreshTooLong { value: String },
}

/// Validated timing policy of an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
}

/// Parse a Go style duration string
///
/// Supports a sequence of decimal numbers with units `ns`, `us`, `µs`,
/// `ms`, `s`, `m` and `h`. A bare `0` is accepted. Negative durations are
/// rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Some(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return None;
    }

    let mut position = 0;
    let mut nanos = 0.0_f64;
    for captures in DURATION_COMPONENT.captures_iter(trimmed) {
        let whole = captures.get(0)?;
        if whole.start() != position {
            return None;
        }
        position = whole.end();

        let number: f64 = captures.name("number")?.as_str().parse().ok()?;
        let unit_nanos = match captures.name("unit")?.as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        nanos += number * unit_nanos;
    }

    if position != trimmed.len() || !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return None;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "bounded and non-negative above"
    )]
    let nanos = nanos.round() as u64;
    Some(Duration::from_nanos(nanos))
}

fn parse_field(field: &'static str, value: &str) -> Result<Duration, SpecError> {
    parse_duration(value).ok_or_else(|| SpecError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Validate refresh and retry intervals
///
/// `0 < refreshInterval < FIXED_CREDENTIAL_VALIDITY` keeps rotation ahead of
/// expiry; a longer interval would leave an expired token in the Secret.
pub fn token_policy(refresh_interval: &str, retry_interval: &str) -> Result<TokenPolicy, SpecError> {
    let refresh = parse_field("refreshInterval", refresh_interval)?;
    let retry = parse_field("retryInterval", retry_interval)?;

    if refresh.is_zero() {
        return Err(SpecError::NotPositive {
            field: "refreshInterval",
        });
    }
    if retry.is_zero() {
        return Err(SpecError::NotPositive {
            field: "retryInterval",
        });
    }
    if refresh >= FIXED_CREDENTIAL_VALIDITY {
        return Err(SpecError::RefreshTooLong {
            value: refresh_interval.to_string(),
        });
    }

    Ok(TokenPolicy {
        refresh_interval: refresh,
        retry_interval: retry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_go_durations() {
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration(" 10m "), Some(Duration::from_secs(600)));
    }

    #[test]
    fn rejects_malformed_durations() {
        for input in ["", "10", "m", "10x", "1h 30m", "-5m", "1d", "5m!"] {
            assert_eq!(parse_duration(input), None, "{input:?} should not parse");
        }
    }

    #[test]
    fn policy_accepts_defaults() {
        let policy = token_policy("30m", "5m").unwrap();
        assert_eq!(policy.refresh_interval, Duration::from_secs(1800));
        assert_eq!(policy.retry_interval, Duration::from_secs(300));
    }

    #[test]
    fn policy_rejects_refresh_at_or_beyond_validity() {
        assert!(matches!(
            token_policy("1h", "5m"),
            Err(SpecError::RefreshTooLong { .. })
        ));
        assert!(matches!(
            token_policy("2h", "5m"),
            Err(SpecError::RefreshTooLong { .. })
        ));
        assert!(token_policy("59m59s", "5m").is_ok());
    }

    #[test]
    fn policy_rejects_zero_and_garbage() {
        assert_eq!(
            token_policy("0s", "5m"),
            Err(SpecError::NotPositive {
                field: "refreshInterval"
            })
        );
        assert_eq!(
            token_policy("10m", "0"),
            Err(SpecError::NotPositive {
                field: "retryInterval"
            })
        );
        assert!(matches!(
            token_policy("soon", "5m"),
            Err(SpecError::InvalidDuration {
                field: "refreshInterval",
                ..
            })
        ));
    }
}
