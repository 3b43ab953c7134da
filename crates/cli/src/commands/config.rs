use std::env;
use std::fs;
use std::path::Path;

use cartwise_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    render(&config)
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: [(&str, String, &str); 13] = [
        (
            "engine.max_iterations",
            config.engine.max_iterations.to_string(),
            "CARTWISE_ENGINE_MAX_ITERATIONS",
        ),
        ("engine.max_depth", config.engine.max_depth.to_string(), "CARTWISE_ENGINE_MAX_DEPTH"),
        (
            "engine.conflict_resolution",
            config.engine.conflict_resolution.as_str().to_string(),
            "CARTWISE_ENGINE_CONFLICT_RESOLUTION",
        ),
        (
            "session.timeout_secs",
            config.session.timeout_secs.to_string(),
            "CARTWISE_SESSION_TIMEOUT_SECS",
        ),
        (
            "session.sweep_interval_secs",
            config.session.sweep_interval_secs.to_string(),
            "CARTWISE_SESSION_SWEEP_INTERVAL_SECS",
        ),
        (
            "checkout.free_shipping_threshold",
            config.checkout.free_shipping_threshold.to_string(),
            "CARTWISE_CHECKOUT_FREE_SHIPPING_THRESHOLD",
        ),
        (
            "checkout.shipping_cost",
            config.checkout.shipping_cost.to_string(),
            "CARTWISE_CHECKOUT_SHIPPING_COST",
        ),
        ("checkout.tax_rate", config.checkout.tax_rate.to_string(), "CARTWISE_CHECKOUT_TAX_RATE"),
        (
            "checkout.low_stock_threshold",
            config.checkout.low_stock_threshold.to_string(),
            "CARTWISE_CHECKOUT_LOW_STOCK_THRESHOLD",
        ),
        (
            "recommendations.max_results",
            config.recommendations.max_results.to_string(),
            "CARTWISE_RECOMMENDATIONS_MAX_RESULTS",
        ),
        (
            "recommendations.popular_min_rating",
            config.recommendations.popular_min_rating.to_string(),
            "CARTWISE_RECOMMENDATIONS_POPULAR_MIN_RATING",
        ),
        ("logging.level", config.logging.level.clone(), "CARTWISE_LOGGING_LEVEL"),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            "CARTWISE_LOGGING_FORMAT",
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in &fields {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, value, source));
    }
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::contains_path;

    #[test]
    fn nested_keys_are_found_in_the_config_document() {
        let doc: toml::Value =
            "[checkout]\ntax_rate = \"0.07\"\n".parse().expect("toml parses");

        assert!(contains_path(&doc, "checkout.tax_rate"));
        assert!(!contains_path(&doc, "checkout.shipping_cost"));
        assert!(!contains_path(&doc, "engine.max_depth"));
    }
}
