use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::SessionId;
use crate::domain::user::UserId;
use crate::session::{SessionFault, SessionOperationKind, SessionOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Session,
    Checkout,
    Rules,
    Discounts,
    Persistence,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub session_id: Option<SessionId>,
    pub user_id: Option<UserId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        session_id: Option<SessionId>,
        user_id: Option<UserId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { session_id, user_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(
            self.session_id.clone(),
            self.user_id.clone(),
            self.correlation_id.clone(),
            event_type,
            category,
            self.actor.clone(),
            outcome,
        )
    }

    pub fn session_started(&self) -> AuditEvent {
        self.event("session.started", AuditCategory::Session, AuditOutcome::Success)
    }

    pub fn session_timed_out(&self, timeout_secs: i64) -> AuditEvent {
        self.event("session.timeout_abandoned", AuditCategory::Session, AuditOutcome::Success)
            .with_metadata("timeout_secs", timeout_secs.to_string())
    }

    /// Coupon codes are recorded normalized, the way lookups match them.
    pub fn coupon_decision(&self, code: &str, applied: bool, message: &str) -> AuditEvent {
        let (event_type, outcome) = if applied {
            ("checkout.coupon_applied", AuditOutcome::Success)
        } else {
            ("checkout.coupon_rejected", AuditOutcome::Rejected)
        };
        self.event(event_type, AuditCategory::Discounts, outcome)
            .with_metadata("code", code.trim().to_ascii_uppercase())
            .with_metadata("message", message)
    }

    pub fn rule_added(&self, rule_id: &str, rule_type: &str) -> AuditEvent {
        self.event("rules.rule_added", AuditCategory::Rules, AuditOutcome::Success)
            .with_metadata("rule_id", rule_id)
            .with_metadata("rule_type", rule_type)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub session_id: Option<SessionId>,
    pub user_id: Option<UserId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        session_id: Option<SessionId>,
        user_id: Option<UserId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id,
            user_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.event_type == event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sink that drops every event; used where no audit trail is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Emits the audit events for one session operation result: a fault, a
/// rejection, or an applied transition plus any order persistence report.
pub fn record_session_outcome(
    sink: &dyn AuditSink,
    context: &AuditContext,
    operation: SessionOperationKind,
    result: &Result<SessionOutcome, SessionFault>,
) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(fault) => {
            sink.emit(
                context
                    .event("session.operation_faulted", AuditCategory::Session, AuditOutcome::Failed)
                    .with_metadata("operation", operation.as_str())
                    .with_metadata("error", fault.to_string()),
            );
            return;
        }
    };

    if !outcome.success {
        sink.emit(
            context
                .event("session.operation_rejected", AuditCategory::Session, AuditOutcome::Rejected)
                .with_metadata("operation", operation.as_str())
                .with_metadata("state", outcome.state.name())
                .with_metadata("message", outcome.message.clone()),
        );
        return;
    }

    if let Some(previous) = outcome.previous_state.filter(|_| outcome.transitioned()) {
        sink.emit(
            context
                .event("session.transition_applied", AuditCategory::Session, AuditOutcome::Success)
                .with_metadata("operation", operation.as_str())
                .with_metadata("from", previous.name())
                .with_metadata("to", outcome.state.name()),
        );
    }

    if let (Some(order), Some(status)) = (&outcome.order, &outcome.persistence) {
        let (event_type, audit_outcome) = if status.is_complete() {
            ("checkout.order_persisted", AuditOutcome::Success)
        } else {
            ("checkout.persistence_failed", AuditOutcome::Failed)
        };
        let mut event = context
            .event(event_type, AuditCategory::Persistence, audit_outcome)
            .with_metadata("order_id", order.order_id.0.clone())
            .with_metadata("total", order.total.to_string())
            .with_metadata("order_saved", status.order_saved.to_string())
            .with_metadata("history_updated", status.history_updated.to_string());
        if let Some(error) = &status.error {
            event = event.with_metadata("error", error.clone());
        }
        sink.emit(event);
    }
}
