use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("SESSION-{}-{}", now.timestamp_millis(), &suffix[..9]))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Browsing,
    Shopping,
    Checkout,
    Completed,
    Abandoned,
}

impl SessionState {
    pub const ALL: [SessionState; 5] =
        [Self::Browsing, Self::Shopping, Self::Checkout, Self::Completed, Self::Abandoned];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Browsing => "Browsing",
            Self::Shopping => "Shopping",
            Self::Checkout => "Checkout",
            Self::Completed => "Completed",
            Self::Abandoned => "Abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Lifecycle edges. Everything moves forward except Shopping->Browsing on an
    /// emptied cart and Checkout->Shopping on cancel; terminal states never leave.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Browsing, Self::Shopping)
                | (Self::Shopping, Self::Browsing)
                | (Self::Shopping, Self::Checkout)
                | (Self::Checkout, Self::Shopping)
                | (Self::Checkout, Self::Completed)
                | (Self::Browsing, Self::Abandoned)
                | (Self::Shopping, Self::Abandoned)
                | (Self::Checkout, Self::Abandoned)
        )
    }

    pub fn ensure_transition(&self, next: SessionState) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        Err(DomainError::InvalidSessionTransition { from: *self, to: next })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
