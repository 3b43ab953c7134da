pub mod assistant;
pub mod audit;
pub mod config;
pub mod coupons;
pub mod discounts;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod evaluation;
pub mod fixtures;
pub mod pricing;
pub mod rules;
pub mod session;
pub mod store;

pub use assistant::{AssistantStatistics, CartResponse, CouponResponse, ShoppingAssistant};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use discounts::{DiscountComponent, DiscountOutcome, DiscountRule};
pub use domain::cart::{Cart, CartItem, CartView};
pub use domain::product::{Product, ProductId};
pub use domain::session::{SessionId, SessionState};
pub use domain::user::{UserId, UserProfile};
pub use engine::{ConflictStrategy, InferenceEngine, Rule, RuleAction, RuleBase, RuleId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use evaluation::{CartEvaluation, EvaluationPipeline};
pub use rules::{RuleCondition, RuleExpression, RuleParser, ShoppingContext};
pub use session::{SessionFault, SessionManager, SessionOutcome, ShoppingSession};
