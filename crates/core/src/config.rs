use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::ConflictStrategy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub session: SessionConfig,
    pub checkout: CheckoutConfig,
    pub recommendations: RecommendationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_iterations: usize,
    pub max_depth: usize,
    pub conflict_resolution: ConflictStrategy,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    pub free_shipping_threshold: Decimal,
    pub shipping_cost: Decimal,
    pub tax_rate: Decimal,
    pub low_stock_threshold: u32,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub max_results: usize,
    pub popular_min_rating: f64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub conflict_resolution: Option<ConflictStrategy>,
    pub max_iterations: Option<usize>,
    pub session_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["cartwise.toml", "config/cartwise.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                max_iterations: 100,
                max_depth: 10,
                conflict_resolution: ConflictStrategy::Priority,
            },
            session: SessionConfig { timeout_secs: 30 * 60, sweep_interval_secs: 60 },
            checkout: CheckoutConfig {
                free_shipping_threshold: Decimal::new(50, 0),
                shipping_cost: Decimal::new(999, 2),
                tax_rate: Decimal::new(8, 2),
                low_stock_threshold: 10,
            },
            recommendations: RecommendationConfig { max_results: 10, popular_min_rating: 4.0 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(Self::Priority),
            "specificity" => Ok(Self::Specificity),
            "recency" => Ok(Self::Recency),
            other => Err(ConfigError::Validation(format!(
                "unsupported conflict resolution `{other}` (expected priority|specificity|recency)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(max_iterations) = engine.max_iterations {
                self.engine.max_iterations = max_iterations;
            }
            if let Some(max_depth) = engine.max_depth {
                self.engine.max_depth = max_depth;
            }
            if let Some(conflict_resolution) = engine.conflict_resolution {
                self.engine.conflict_resolution = conflict_resolution;
            }
        }

        if let Some(session) = patch.session {
            if let Some(timeout_secs) = session.timeout_secs {
                self.session.timeout_secs = timeout_secs;
            }
            if let Some(sweep_interval_secs) = session.sweep_interval_secs {
                self.session.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(checkout) = patch.checkout {
            if let Some(threshold) = checkout.free_shipping_threshold {
                self.checkout.free_shipping_threshold = threshold;
            }
            if let Some(shipping_cost) = checkout.shipping_cost {
                self.checkout.shipping_cost = shipping_cost;
            }
            if let Some(tax_rate) = checkout.tax_rate {
                self.checkout.tax_rate = tax_rate;
            }
            if let Some(low_stock_threshold) = checkout.low_stock_threshold {
                self.checkout.low_stock_threshold = low_stock_threshold;
            }
        }

        if let Some(recommendations) = patch.recommendations {
            if let Some(max_results) = recommendations.max_results {
                self.recommendations.max_results = max_results;
            }
            if let Some(popular_min_rating) = recommendations.popular_min_rating {
                self.recommendations.popular_min_rating = popular_min_rating;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CARTWISE_ENGINE_MAX_ITERATIONS") {
            self.engine.max_iterations = parse_usize("CARTWISE_ENGINE_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_ENGINE_MAX_DEPTH") {
            self.engine.max_depth = parse_usize("CARTWISE_ENGINE_MAX_DEPTH", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_ENGINE_CONFLICT_RESOLUTION") {
            self.engine.conflict_resolution = value.parse()?;
        }

        if let Some(value) = read_env("CARTWISE_SESSION_TIMEOUT_SECS") {
            self.session.timeout_secs = parse_u64("CARTWISE_SESSION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs =
                parse_u64("CARTWISE_SESSION_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("CARTWISE_CHECKOUT_FREE_SHIPPING_THRESHOLD") {
            self.checkout.free_shipping_threshold =
                parse_decimal("CARTWISE_CHECKOUT_FREE_SHIPPING_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_CHECKOUT_SHIPPING_COST") {
            self.checkout.shipping_cost = parse_decimal("CARTWISE_CHECKOUT_SHIPPING_COST", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_CHECKOUT_TAX_RATE") {
            self.checkout.tax_rate = parse_decimal("CARTWISE_CHECKOUT_TAX_RATE", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_CHECKOUT_LOW_STOCK_THRESHOLD") {
            self.checkout.low_stock_threshold =
                parse_u32("CARTWISE_CHECKOUT_LOW_STOCK_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("CARTWISE_RECOMMENDATIONS_MAX_RESULTS") {
            self.recommendations.max_results =
                parse_usize("CARTWISE_RECOMMENDATIONS_MAX_RESULTS", &value)?;
        }
        let rating_key = "CARTWISE_RECOMMENDATIONS_POPULAR_MIN_RATING";
        if let Some(value) = read_env(rating_key) {
            self.recommendations.popular_min_rating =
                value.trim().parse::<f64>().map_err(|_| invalid_override(rating_key, &value))?;
        }

        let log_level =
            read_env("CARTWISE_LOGGING_LEVEL").or_else(|| read_env("CARTWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARTWISE_LOGGING_FORMAT").or_else(|| read_env("CARTWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(conflict_resolution) = overrides.conflict_resolution {
            self.engine.conflict_resolution = conflict_resolution;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.engine.max_iterations = max_iterations;
        }
        if let Some(timeout_secs) = overrides.session_timeout_secs {
            self.session.timeout_secs = timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        validate_session(&self.session)?;
        validate_checkout(&self.checkout)?;
        validate_recommendations(&self.recommendations)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.max_iterations == 0 || engine.max_iterations > 10_000 {
        return Err(ConfigError::Validation(
            "engine.max_iterations must be in range 1..=10000".to_string(),
        ));
    }

    if engine.max_depth == 0 || engine.max_depth > 64 {
        return Err(ConfigError::Validation("engine.max_depth must be in range 1..=64".to_string()));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "session.timeout_secs must be greater than zero".to_string(),
        ));
    }

    if session.sweep_interval_secs == 0 || session.sweep_interval_secs > session.timeout_secs {
        return Err(ConfigError::Validation(
            "session.sweep_interval_secs must be in range 1..=session.timeout_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_checkout(checkout: &CheckoutConfig) -> Result<(), ConfigError> {
    if checkout.free_shipping_threshold.is_sign_negative()
        || checkout.shipping_cost.is_sign_negative()
    {
        return Err(ConfigError::Validation(
            "checkout.free_shipping_threshold and checkout.shipping_cost must not be negative"
                .to_string(),
        ));
    }

    if checkout.tax_rate.is_sign_negative() || checkout.tax_rate >= Decimal::ONE {
        return Err(ConfigError::Validation(
            "checkout.tax_rate must be a fraction in range 0..1 (e.g. 0.08)".to_string(),
        ));
    }

    Ok(())
}

fn validate_recommendations(recommendations: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendations.max_results == 0 {
        return Err(ConfigError::Validation(
            "recommendations.max_results must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=5.0).contains(&recommendations.popular_min_rating) {
        return Err(ConfigError::Validation(
            "recommendations.popular_min_rating must be in range 0..=5".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    session: Option<SessionPatch>,
    checkout: Option<CheckoutPatch>,
    recommendations: Option<RecommendationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    max_iterations: Option<usize>,
    max_depth: Option<usize>,
    conflict_resolution: Option<ConflictStrategy>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutPatch {
    free_shipping_threshold: Option<Decimal>,
    shipping_cost: Option<Decimal>,
    tax_rate: Option<Decimal>,
    low_stock_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    max_results: Option<usize>,
    popular_min_rating: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::engine::ConflictStrategy;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_values() -> Result<(), String> {
        let config = AppConfig::default();

        ensure(config.engine.max_iterations == 100, "max iterations defaults to 100")?;
        ensure(config.engine.max_depth == 10, "max depth defaults to 10")?;
        ensure(
            config.engine.conflict_resolution == ConflictStrategy::Priority,
            "priority conflict resolution is the default",
        )?;
        ensure(config.session.timeout_secs == 1800, "session timeout defaults to 30 minutes")?;
        ensure(
            config.checkout.shipping_cost == Decimal::new(999, 2),
            "shipping cost defaults to 9.99",
        )?;
        ensure(config.validate().is_ok(), "defaults must validate")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CARTWISE_TIMEOUT", "900");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cartwise.toml");
            fs::write(
                &path,
                r#"
[session]
timeout_secs = ${TEST_CARTWISE_TIMEOUT}
sweep_interval_secs = 30

[checkout]
tax_rate = "0.1"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.session.timeout_secs == 900, "timeout should come from environment")?;
            ensure(config.session.sweep_interval_secs == 30, "sweep interval read from file")?;
            ensure(config.checkout.tax_rate == Decimal::new(1, 1), "tax rate read from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_CARTWISE_TIMEOUT"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_LOG_LEVEL", "warn");
        env::set_var("CARTWISE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CARTWISE_LOG_LEVEL", "CARTWISE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_ENGINE_CONFLICT_RESOLUTION", "recency");
        env::set_var("CARTWISE_ENGINE_MAX_DEPTH", "6");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cartwise.toml");
            fs::write(
                &path,
                r#"
[engine]
max_iterations = 40
max_depth = 4
conflict_resolution = "specificity"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    conflict_resolution: Some(ConflictStrategy::Priority),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.engine.max_iterations == 40, "file value should beat default")?;
            ensure(config.engine.max_depth == 6, "env value should beat file")?;
            ensure(
                config.engine.conflict_resolution == ConflictStrategy::Priority,
                "explicit override should beat env",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["CARTWISE_ENGINE_CONFLICT_RESOLUTION", "CARTWISE_ENGINE_MAX_DEPTH"]);
        result
    }

    #[test]
    fn invalid_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_SESSION_TIMEOUT_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected override failure but load succeeded".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "CARTWISE_SESSION_TIMEOUT_SECS"
                ),
                "override failure should name the variable",
            )
        })();

        clear_vars(&["CARTWISE_SESSION_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_CHECKOUT_TAX_RATE", "8");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("checkout.tax_rate")
            );
            ensure(has_message, "validation failure should mention checkout.tax_rate")
        })();

        clear_vars(&["CARTWISE_CHECKOUT_TAX_RATE"]);
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");

        let result = AppConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(ref missing)) if *missing == path),
            "missing file error should carry the expected path",
        )
    }
}
