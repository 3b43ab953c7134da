use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SessionConfig;
use crate::domain::session::{SessionId, SessionState};
use crate::domain::user::UserProfile;
use crate::session::machine::ShoppingSession;

pub type SharedSession = Arc<Mutex<ShoppingSession>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub abandoned: usize,
    pub by_state: BTreeMap<String, usize>,
}

/// Registry of live sessions.
///
/// Each session sits behind its own mutex, so operations on one session are
/// serialised while different sessions proceed independently. The registry
/// lock is only held to look sessions up.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), timeout }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        let timeout = i64::try_from(config.timeout_secs).unwrap_or(i64::MAX);
        Self::new(Duration::seconds(timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn create(&self, user: UserProfile, now: DateTime<Utc>) -> SessionId {
        let id = SessionId::generate(now);
        let session = ShoppingSession::new(id.clone(), user, now);
        self.write().insert(id.clone(), Arc::new(Mutex::new(session)));
        info!(event_name = "session.created", session_id = %id, "session created");
        id
    }

    pub fn get(&self, session_id: &SessionId) -> Option<SharedSession> {
        self.read().get(session_id).cloned()
    }

    /// Runs `operation` with exclusive access to one session.
    pub fn with_session<R>(
        &self,
        session_id: &SessionId,
        operation: impl FnOnce(&mut ShoppingSession) -> R,
    ) -> Option<R> {
        let session = self.get(session_id)?;
        let mut guard = lock_session(&session);
        Some(operation(&mut guard))
    }

    pub fn remove(&self, session_id: &SessionId) -> bool {
        self.write().remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.snapshot()
            .into_iter()
            .filter(|(_, session)| lock_session(session).is_active())
            .map(|(id, _)| id)
            .collect()
    }

    /// Abandons every active session idle for at least the timeout.
    ///
    /// Sessions already completed or abandoned are left untouched, even when
    /// they finished while the sweep was running.
    pub fn sweep_inactive(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut expired = Vec::new();
        for (id, session) in self.snapshot() {
            let outcome = lock_session(&session).expire_if_idle(now, self.timeout);
            if outcome.is_some() {
                info!(
                    event_name = "session.timeout_abandoned",
                    session_id = %id,
                    "session abandoned after inactivity"
                );
                expired.push(id);
            }
        }
        expired
    }

    pub fn statistics(&self) -> SessionStatistics {
        let mut stats = SessionStatistics::default();
        for state in SessionState::ALL {
            stats.by_state.insert(state.name().to_string(), 0);
        }
        for (_, session) in self.snapshot() {
            let state = lock_session(&session).state();
            stats.total += 1;
            match state {
                SessionState::Completed => stats.completed += 1,
                SessionState::Abandoned => stats.abandoned += 1,
                _ => stats.active += 1,
            }
            *stats.by_state.entry(state.name().to_string()).or_default() += 1;
        }
        stats
    }

    fn snapshot(&self) -> Vec<(SessionId, SharedSession)> {
        let mut sessions: Vec<(SessionId, SharedSession)> =
            self.read().iter().map(|(id, session)| (id.clone(), Arc::clone(session))).collect();
        sessions.sort_by(|left, right| left.0.cmp(&right.0));
        sessions
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, SharedSession>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SessionId, SharedSession>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn lock_session(session: &SharedSession) -> MutexGuard<'_, ShoppingSession> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Runs [`SessionManager::sweep_inactive`] every `period` until the handle is aborted.
pub fn spawn_timeout_sweeper(
    manager: Arc<SessionManager>,
    period: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let expired = manager.sweep_inactive(Utc::now());
            if !expired.is_empty() {
                info!(
                    event_name = "session.sweep_completed",
                    abandoned = expired.len(),
                    "inactive sessions swept"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{spawn_timeout_sweeper, SessionManager};
    use crate::domain::cart::CartItem;
    use crate::domain::order::{BillingInfo, CheckoutDetails, PaymentInfo};
    use crate::domain::session::SessionState;
    use crate::domain::user::UserProfile;
    use crate::session::persistence::InMemoryOrderSink;

    #[test]
    fn sweep_abandons_only_idle_active_sessions() {
        let manager = SessionManager::new(Duration::minutes(30));
        let start = Utc::now();
        let idle = manager.create(UserProfile::new("u-1", "Idle"), start);
        let busy = manager.create(UserProfile::new("u-2", "Busy"), start);
        let done = manager.create(UserProfile::new("u-3", "Done"), start);

        manager
            .with_session(&busy, |session| {
                session.add_to_cart(
                    CartItem::new("p-1", "Book", Decimal::new(20, 0), 1, "Books"),
                    start + Duration::minutes(20),
                )
            })
            .expect("session exists")
            .expect("add handled");
        manager
            .with_session(&done, |session| {
                session.add_to_cart(CartItem::new("p-1", "Book", Decimal::new(20, 0), 1, "Books"), start)?;
                session.proceed_to_checkout(start)?;
                session.complete_checkout(
                    Some(&CheckoutDetails {
                        billing: BillingInfo {
                            name: "Done".to_string(),
                            email: "done@example.com".to_string(),
                            ..BillingInfo::default()
                        },
                        payment: PaymentInfo::card("4242424242424242"),
                    }),
                    &InMemoryOrderSink::default(),
                    start,
                )
            })
            .expect("session exists")
            .expect("checkout handled");

        let expired = manager.sweep_inactive(start + Duration::minutes(40));

        assert_eq!(expired, vec![idle.clone()]);
        let state = |id| manager.with_session(id, |session| session.state());
        assert_eq!(state(&idle), Some(SessionState::Abandoned));
        assert_eq!(state(&busy), Some(SessionState::Shopping));
        assert_eq!(state(&done), Some(SessionState::Completed));

        let stats = manager.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.by_state.get("Abandoned"), Some(&1));
        assert_eq!(manager.active_sessions(), vec![busy]);
    }

    #[test]
    fn removed_sessions_are_gone() {
        let manager = SessionManager::new(Duration::minutes(30));
        let id = manager.create(UserProfile::new("u-1", "Jane"), Utc::now());

        assert!(manager.remove(&id));
        assert!(manager.get(&id).is_none());
        assert!(manager.with_session(&id, |session| session.state()).is_none());
    }

    #[tokio::test]
    async fn background_sweeper_abandons_expired_sessions() {
        let manager = Arc::new(SessionManager::new(Duration::zero()));
        let id = manager.create(UserProfile::new("u-1", "Jane"), Utc::now() - Duration::minutes(1));

        let handle = spawn_timeout_sweeper(Arc::clone(&manager), std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(
            manager.with_session(&id, |session| session.state()),
            Some(SessionState::Abandoned)
        );
    }
}
