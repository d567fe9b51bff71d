use std::{fmt, net::SocketAddr, time::Duration};
use tracing::Level;
use voxbridge_core::{catalog, language::canonicalize};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// Provider keys are optional: a missing key only marks that provider as
/// unavailable in the capability registry.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub daily_api_key: Option<String>,
    pub daily_api_url: String,
    pub transport_bridge_url: Option<String>,
    pub google_api_key: Option<String>,
    pub cartesia_api_key: Option<String>,
    /// Cartesia voice id used for the dedicated Dutch voice.
    pub cartesia_voice: String,
    pub deepgram_api_key: Option<String>,
    pub default_language: String,
    pub default_model: String,
    pub bot_name: String,
    pub bot_ready_timeout: Duration,
    pub language_detection_timeout: Duration,
    pub token_ttl: Duration,
    pub synthesis_failure_threshold: u32,
    pub prefer_dedicated_tts: bool,
    pub override_cooldown: Duration,
    pub agent_idle_timeout: Duration,
    pub shutdown_grace: Duration,
    pub delete_rooms_on_end: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(key: &Option<String>) -> &'static str {
            if key.is_some() { "[REDACTED]" } else { "<unset>" }
        }

        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("log_level", &self.log_level)
            .field("daily_api_key", &redact(&self.daily_api_key))
            .field("daily_api_url", &self.daily_api_url)
            .field("transport_bridge_url", &self.transport_bridge_url)
            .field("google_api_key", &redact(&self.google_api_key))
            .field("cartesia_api_key", &redact(&self.cartesia_api_key))
            .field("cartesia_voice", &self.cartesia_voice)
            .field("deepgram_api_key", &redact(&self.deepgram_api_key))
            .field("default_language", &self.default_language)
            .field("default_model", &self.default_model)
            .field("bot_name", &self.bot_name)
            .field("bot_ready_timeout", &self.bot_ready_timeout)
            .field("language_detection_timeout", &self.language_detection_timeout)
            .field("token_ttl", &self.token_ttl)
            .field("synthesis_failure_threshold", &self.synthesis_failure_threshold)
            .field("prefer_dedicated_tts", &self.prefer_dedicated_tts)
            .field("override_cooldown", &self.override_cooldown)
            .field("agent_idle_timeout", &self.agent_idle_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("delete_rooms_on_end", &self.delete_rooms_on_end)
            .finish()
    }
}

/// Reads an optional variable, treating empty values as unset.
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match optional(name) {
        Some(raw) => raw.parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue(name.to_string(), format!("'{raw}' is not a number: {e}"))
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match optional(name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{v}' is not a boolean"),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = optional("BIND_ADDRESS").unwrap_or_else(|| match optional("PORT") {
            Some(port) => format!("0.0.0.0:{port}"),
            None => "0.0.0.0:3000".to_string(),
        });
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = optional("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let default_language_str =
            optional("DEFAULT_LANGUAGE").unwrap_or_else(|| "en-US".to_string());
        let default_language = canonicalize(&default_language_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "DEFAULT_LANGUAGE".to_string(),
                format!("'{}' is not a valid language tag", default_language_str),
            )
        })?;

        let default_model =
            optional("DEFAULT_MODEL").unwrap_or_else(|| catalog::DEFAULT_MODEL.to_string());
        if catalog::model(&default_model).is_none() {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_MODEL".to_string(),
                format!("'{}' is not a known model", default_model),
            ));
        }

        let cartesia_voice_str = optional("CARTESIA_VOICE").unwrap_or_else(|| "female".to_string());
        let cartesia_voice = catalog::dedicated_dutch_voice(&cartesia_voice_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "CARTESIA_VOICE".to_string(),
                format!("'{}' is not 'female' or 'male'", cartesia_voice_str),
            )
        })?;

        let synthesis_failure_threshold = parse_u64("SYNTHESIS_FAILURE_THRESHOLD", 3)?;
        if synthesis_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "SYNTHESIS_FAILURE_THRESHOLD".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let synthesis_failure_threshold = u32::try_from(synthesis_failure_threshold)
            .map_err(|e| {
                ConfigError::InvalidValue("SYNTHESIS_FAILURE_THRESHOLD".to_string(), e.to_string())
            })?;

        Ok(Self {
            bind_address,
            log_level,
            daily_api_key: optional("DAILY_API_KEY"),
            daily_api_url: optional("DAILY_API_URL")
                .unwrap_or_else(|| "https://api.daily.co/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            transport_bridge_url: optional("TRANSPORT_BRIDGE_URL"),
            google_api_key: optional("GOOGLE_API_KEY"),
            cartesia_api_key: optional("CARTESIA_API_KEY"),
            cartesia_voice: cartesia_voice.to_string(),
            deepgram_api_key: optional("DEEPGRAM_API_KEY"),
            default_language,
            default_model,
            bot_name: optional("BOT_NAME").unwrap_or_else(|| "Voxbridge Bot".to_string()),
            bot_ready_timeout: Duration::from_millis(parse_u64("BOT_READY_TIMEOUT_MS", 10_000)?),
            language_detection_timeout: Duration::from_millis(parse_u64(
                "LANGUAGE_DETECTION_TIMEOUT_MS",
                300,
            )?),
            token_ttl: Duration::from_secs(parse_u64("TOKEN_TTL_SECS", 3600)?),
            synthesis_failure_threshold,
            prefer_dedicated_tts: parse_bool("PREFER_DEDICATED_TTS", true)?,
            override_cooldown: Duration::from_secs(parse_u64("OVERRIDE_COOLDOWN_SECS", 300)?),
            agent_idle_timeout: Duration::from_secs(parse_u64("AGENT_IDLE_TIMEOUT_SECS", 120)?),
            shutdown_grace: Duration::from_millis(parse_u64("SHUTDOWN_GRACE_MS", 5000)?),
            delete_rooms_on_end: parse_bool("DELETE_ROOMS_ON_END", true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "PORT",
        "RUST_LOG",
        "DAILY_API_KEY",
        "DAILY_API_URL",
        "TRANSPORT_BRIDGE_URL",
        "GOOGLE_API_KEY",
        "CARTESIA_API_KEY",
        "CARTESIA_VOICE",
        "DEEPGRAM_API_KEY",
        "DEFAULT_LANGUAGE",
        "DEFAULT_MODEL",
        "BOT_NAME",
        "BOT_READY_TIMEOUT_MS",
        "LANGUAGE_DETECTION_TIMEOUT_MS",
        "TOKEN_TTL_SECS",
        "SYNTHESIS_FAILURE_THRESHOLD",
        "PREFER_DEDICATED_TTS",
        "OVERRIDE_COOLDOWN_SECS",
        "AGENT_IDLE_TIMEOUT_SECS",
        "SHUTDOWN_GRACE_MS",
        "DELETE_ROOMS_ON_END",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults_without_any_keys() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.daily_api_url, "https://api.daily.co/v1");
        assert_eq!(config.daily_api_key, None);
        assert_eq!(config.google_api_key, None);
        assert_eq!(config.default_language, "en-US");
        assert_eq!(config.default_model, "gemini-2.0-flash-live-001");
        assert_eq!(config.bot_ready_timeout, Duration::from_secs(10));
        assert_eq!(config.language_detection_timeout, Duration::from_millis(300));
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.synthesis_failure_threshold, 3);
        assert_eq!(config.cartesia_voice, catalog::CARTESIA_DUTCH_VOICE_FEMALE);
        assert!(config.prefer_dedicated_tts);
        assert!(config.delete_rooms_on_end);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("PORT", "7860");
            env::set_var("RUST_LOG", "debug");
            env::set_var("DAILY_API_KEY", "daily-key");
            env::set_var("DAILY_API_URL", "https://daily.internal/v1/");
            env::set_var("GOOGLE_API_KEY", "google-key");
            env::set_var("CARTESIA_API_KEY", "");
            env::set_var("CARTESIA_VOICE", "Male");
            env::set_var("DEFAULT_LANGUAGE", "nl");
            env::set_var("SYNTHESIS_FAILURE_THRESHOLD", "5");
            env::set_var("PREFER_DEDICATED_TTS", "off");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:7860");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.daily_api_key.as_deref(), Some("daily-key"));
        assert_eq!(config.daily_api_url, "https://daily.internal/v1");
        assert_eq!(config.google_api_key.as_deref(), Some("google-key"));
        assert_eq!(config.cartesia_api_key, None);
        assert_eq!(config.cartesia_voice, catalog::CARTESIA_DUTCH_VOICE_MALE);
        assert_eq!(config.default_language, "nl-NL");
        assert_eq!(config.synthesis_failure_threshold, 5);
        assert!(!config.prefer_dedicated_tts);
    }

    #[test]
    #[serial]
    fn test_bind_address_wins_over_port() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("PORT", "7860");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        let cases = [
            ("BIND_ADDRESS", "not-a-valid-address"),
            ("RUST_LOG", "not-a-level"),
            ("DEFAULT_LANGUAGE", "klingon!"),
            ("DEFAULT_MODEL", "gpt-4o"),
            ("CARTESIA_VOICE", "robot"),
            ("BOT_READY_TIMEOUT_MS", "soon"),
            ("SYNTHESIS_FAILURE_THRESHOLD", "0"),
            ("DELETE_ROOMS_ON_END", "maybe"),
        ];

        for (name, value) in cases {
            clear_env_vars();
            unsafe {
                env::set_var(name, value);
            }
            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(var, _) => assert_eq!(var, name),
            }
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_debug_output_redacts_keys() {
        clear_env_vars();
        unsafe {
            env::set_var("GOOGLE_API_KEY", "super-secret");
        }

        let config = Config::from_env().expect("Config should load successfully");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
        clear_env_vars();
    }
}
