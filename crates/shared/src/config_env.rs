use std::env;

use crate::config::ConfigError;

pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    require_non_empty(key, env::var(key).ok())
}

pub(crate) fn require_non_empty(key: &str, raw: Option<String>) -> Result<String, ConfigError> {
    let Some(value) = raw else {
        return Err(ConfigError::MissingVar(key.to_string()));
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingVar(key.to_string()));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn parse_u32_env(key: &str, default: u32) -> Result<u32, ConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<u32>()
            .map_err(|_| ConfigError::ParseInt {
                key: key.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

pub(crate) fn parse_u64_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::ParseInt {
                key: key.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

pub(crate) fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::require_non_empty;
    use crate::config::ConfigError;

    #[test]
    fn require_non_empty_trims_present_values() {
        let value = require_non_empty("GROQ_API_KEY", Some("  gsk-test  ".to_string()))
            .expect("value should resolve");
        assert_eq!(value, "gsk-test");
    }

    #[test]
    fn require_non_empty_rejects_missing_and_blank_values() {
        assert!(matches!(
            require_non_empty("GROQ_API_KEY", None),
            Err(ConfigError::MissingVar(key)) if key == "GROQ_API_KEY"
        ));
        assert!(matches!(
            require_non_empty("GROQ_API_KEY", Some("   ".to_string())),
            Err(ConfigError::MissingVar(_))
        ));
    }
}
