//! Configuration loading and representation.

use tracing::warn;

pub const ENV_NUMBER_PREFIX: &str = "RESERVATION_NUMBER_PREFIX";
pub const ENV_NUMBER_WIDTH: &str = "RESERVATION_NUMBER_WIDTH";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "RESERVATION_RETRY_MAX_ATTEMPTS";

/// Settings of the reservation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationConfig {
    /// Leading part of generated reservation numbers (`MR-20260302-000001`).
    pub number_prefix: String,
    /// Zero-padded width of the per-day sequence.
    pub number_width: usize,
    /// Attempts made by `retry_on_conflict` (including the first).
    pub retry_max_attempts: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            number_prefix: "MR".to_string(),
            number_width: 6,
            retry_max_attempts: 3,
        }
    }
}

impl ReservationConfig {
    /// Read the configuration from process environment variables.
    ///
    /// Missing variables fall back to defaults; malformed ones are logged and
    /// fall back as well.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let number_prefix = match lookup(ENV_NUMBER_PREFIX) {
            Some(prefix) if !prefix.trim().is_empty() => prefix.trim().to_string(),
            Some(_) => {
                warn!(key = ENV_NUMBER_PREFIX, "empty value, using default");
                defaults.number_prefix
            }
            None => defaults.number_prefix,
        };

        let number_width = parse_or(&lookup, ENV_NUMBER_WIDTH, defaults.number_width, |w: &usize| {
            (1..=18).contains(w)
        });
        let retry_max_attempts =
            parse_or(&lookup, ENV_RETRY_MAX_ATTEMPTS, defaults.retry_max_attempts, |n: &u32| *n >= 1);

        Self {
            number_prefix,
            number_width,
            retry_max_attempts,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: std::str::FromStr + core::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(key, value = %raw, default = ?default, "invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_variables_use_defaults() {
        let config = ReservationConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ReservationConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = ReservationConfig::from_lookup(lookup(&[
            (ENV_NUMBER_PREFIX, "RSV"),
            (ENV_NUMBER_WIDTH, "4"),
            (ENV_RETRY_MAX_ATTEMPTS, "5"),
        ]));

        assert_eq!(config.number_prefix, "RSV");
        assert_eq!(config.number_width, 4);
        assert_eq!(config.retry_max_attempts, 5);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = ReservationConfig::from_lookup(lookup(&[
            (ENV_NUMBER_PREFIX, "  "),
            (ENV_NUMBER_WIDTH, "wide"),
            (ENV_RETRY_MAX_ATTEMPTS, "0"),
        ]));

        assert_eq!(config, ReservationConfig::default());
    }
}
