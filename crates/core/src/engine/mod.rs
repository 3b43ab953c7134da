//! Production-rule engine: rule storage, working memory and chaining.

pub mod inference;
pub mod memory;
pub mod rule;
pub mod rule_base;

pub use inference::{
    BackwardChainResult, ConflictStrategy, EngineStatistics, ForwardChainResult, InferenceEngine,
    ReasoningStep, TraceEntry,
};
pub use memory::{MemoryAction, MemoryChange, WorkingMemory};
pub use rule::{Rule, RuleAction, RuleActionError, RuleId};
pub use rule_base::{RuleBase, RuleBaseStatistics};
