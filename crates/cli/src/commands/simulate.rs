use std::sync::Arc;

use cartwise_core::config::{AppConfig, LoadOptions};
use cartwise_core::domain::order::{BillingInfo, CheckoutDetails, OrderId, PaymentInfo};
use cartwise_core::pricing::PriceSummary;
use cartwise_core::session::{InMemoryOrderSink, SessionInfo};
use cartwise_core::{
    ApplicationError, CartEvaluation, CartResponse, InMemoryAuditSink, ProductId, SessionState,
    ShoppingAssistant, UserId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::{parse_item_spec, CommandResult, EXIT_CONFIG, EXIT_INVALID_INPUT, EXIT_SIMULATION};

const COMMAND: &str = "simulate";
const DEMO_CARD: &str = "4111111111111111";

#[derive(Debug, Clone, Default)]
pub struct SimulateRequest {
    pub user_id: String,
    pub items: Vec<String>,
    pub coupon: Option<String>,
    pub checkout: bool,
}

#[derive(Debug, Serialize)]
struct SimulationStep {
    operation: String,
    success: bool,
    message: String,
    state: SessionState,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    session: SessionInfo,
    steps: Vec<SimulationStep>,
    summary: PriceSummary,
    evaluation: Option<CartEvaluation>,
    order_id: Option<OrderId>,
    audit_events: usize,
}

/// Drives one scripted session over the seed catalog: view and add each item,
/// optionally apply a coupon, optionally check out.
pub fn run(request: &SimulateRequest) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let message = error.to_string();
            return CommandResult::failure(COMMAND, "config_validation", message, EXIT_CONFIG);
        }
    };

    let mut items = Vec::with_capacity(request.items.len());
    for spec in &request.items {
        match parse_item_spec(spec) {
            Ok(item) => items.push(item),
            Err(message) => return invalid(message),
        }
    }

    let audit = Arc::new(InMemoryAuditSink::default());
    let now = Utc::now();
    let assistant = ShoppingAssistant::seeded(
        config,
        audit.clone(),
        Arc::new(InMemoryOrderSink::default()),
        now,
    );

    match simulate(&assistant, request, &items, now) {
        Ok(mut report) => {
            report.audit_events = audit.events().len();
            let message = format!(
                "session {} ended in {} after {} step(s)",
                report.session.session_id,
                report.session.state,
                report.steps.len()
            );
            CommandResult::success_with(COMMAND, message, report)
        }
        Err(error) => {
            let class = match &error {
                ApplicationError::UserNotFound(_) | ApplicationError::ProductNotFound(_) => {
                    "invalid_input"
                }
                _ => "simulation_failed",
            };
            CommandResult::failure(COMMAND, class, error.to_string(), EXIT_SIMULATION)
        }
    }
}

fn simulate(
    assistant: &ShoppingAssistant,
    request: &SimulateRequest,
    items: &[(ProductId, u32)],
    now: DateTime<Utc>,
) -> Result<SimulationReport, ApplicationError> {
    let user_id = UserId::new(request.user_id.as_str());
    let session = assistant.start_session(&user_id, now)?;
    let session_id = session.session_id;
    let mut steps = Vec::new();
    let mut evaluation = None;

    for (product_id, quantity) in items {
        let viewed = assistant.browse(&session_id, product_id, now)?;
        steps.push(step(format!("browse {product_id}"), &viewed));
        let added = assistant.add_to_cart(&session_id, product_id, *quantity, now)?;
        steps.push(step(format!("add {product_id} x{quantity}"), &added));
        if added.evaluation.is_some() {
            evaluation = added.evaluation;
        }
    }

    if let Some(code) = &request.coupon {
        let applied = assistant.apply_coupon(&session_id, code, now)?;
        let state = assistant.session_info(&session_id, now)?.state;
        steps.push(SimulationStep {
            operation: format!("coupon {code}"),
            success: applied.success,
            message: applied.message,
            state,
        });
    }

    let mut order_id = None;
    if request.checkout {
        let proceeded = assistant.proceed_to_checkout(&session_id, now)?;
        steps.push(step("proceed to checkout".to_string(), &proceeded));
        if proceeded.outcome.success {
            let details = demo_details(assistant, &user_id);
            let completed = assistant.complete_checkout(&session_id, Some(&details), now)?;
            steps.push(step("complete checkout".to_string(), &completed));
            order_id = completed.outcome.order.map(|order| order.order_id);
        }
    }

    let summary = assistant.price_summary(&session_id)?;
    let session = assistant.session_info(&session_id, now)?;
    info!(
        event_name = "simulation.finished",
        session_id = %session_id,
        state = %session.state,
        total = %summary.total,
        "simulation finished"
    );
    Ok(SimulationReport { session, steps, summary, evaluation, order_id, audit_events: 0 })
}

fn step(operation: String, response: &CartResponse) -> SimulationStep {
    SimulationStep {
        operation,
        success: response.outcome.success,
        message: response.outcome.message.clone(),
        state: response.outcome.state,
    }
}

fn demo_details(assistant: &ShoppingAssistant, user_id: &UserId) -> CheckoutDetails {
    let name =
        assistant.user(user_id).map(|user| user.name).unwrap_or_else(|| user_id.to_string());
    let handle = name.to_ascii_lowercase().replace(' ', ".");
    CheckoutDetails {
        billing: BillingInfo {
            email: format!("{handle}@example.com"),
            name,
            phone: None,
            address: Some("1 Demo Street".to_string()),
            city: Some("Springfield".to_string()),
            postal_code: Some("12345".to_string()),
        },
        payment: PaymentInfo::card(DEMO_CARD),
    }
}

fn invalid(message: String) -> CommandResult {
    CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
}
