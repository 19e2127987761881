use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Read a variable through `lookup`, falling back to `default`.
///
/// In production every variable must be set explicitly; defaults only apply
/// outside of it. Variables without a default are always required.
pub fn get_env<F>(
    lookup: &F,
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

/// Parse a variable into `T`, reporting the key on failure.
pub fn parse_env<F, T>(lookup: &F, key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(lookup, key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn falls_back_to_default_outside_prod() {
        let lookup = lookup_from(&[]);
        assert_eq!(get_env(&lookup, "LOG_LEVEL", Some("info"), false).unwrap(), "info");
    }

    #[test]
    fn missing_required_variable_is_config_error() {
        let lookup = lookup_from(&[]);
        let err = get_env(&lookup, "HMAC_SHARED_SECRET", None, false).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn parse_env_reports_bad_values() {
        let lookup = lookup_from(&[("STEP_UP_MAX_ATTEMPTS", "five")]);
        let err = parse_env::<_, u32>(&lookup, "STEP_UP_MAX_ATTEMPTS", "5", false).unwrap_err();
        assert!(err.to_string().contains("STEP_UP_MAX_ATTEMPTS"));
    }
}
