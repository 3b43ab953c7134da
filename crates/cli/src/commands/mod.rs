pub mod config;
pub mod doctor;
pub mod explain;
pub mod simulate;

use cartwise_core::ProductId;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_SIMULATION: u8 = 3;
pub const EXIT_INVALID_INPUT: u8 = 4;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, Value::Null)
    }

    /// Success outcome carrying a structured `data` report.
    pub fn success_with(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 1);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Parses `product-id` or `product-id:quantity`; quantity defaults to one.
pub fn parse_item_spec(spec: &str) -> Result<(ProductId, u32), String> {
    let (id, quantity) = match spec.trim().split_once(':') {
        Some((id, quantity)) => {
            let quantity = quantity
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|quantity| *quantity > 0)
                .ok_or_else(|| format!("invalid quantity in `{spec}`"))?;
            (id.trim(), quantity)
        }
        None => (spec.trim(), 1),
    };
    if id.is_empty() {
        return Err(format!("missing product id in `{spec}`"));
    }
    Ok((ProductId::new(id), quantity))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string_pretty(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
