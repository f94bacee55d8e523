use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DecisionRecord, Session, SessionHandle, SessionMetrics};
use crate::decision::Payload;
use crate::error::{ObserverError, ObserverResult};

#[derive(Debug, Default)]
struct StoreState {
    sessions: HashMap<String, Session>,
    /// Session ids in creation order.
    order: Vec<String>,
    /// Target of implicit tracking calls.
    active: Option<String>,
}

/// Session store and decision tracker.
///
/// An `Observer` owns every session opened through it for its own lifetime.
/// Clones share the same state, so one instance can be handed to every
/// adapter of a logical flow. At most one session is active at a time:
/// opening a second session while one is active is rejected rather than
/// silently replacing it. Flows that need independent sessions at the same
/// time should use separate `Observer` instances.
#[derive(Debug, Clone, Default)]
pub struct Observer {
    state: Arc<RwLock<StoreState>>,
}

impl Observer {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations keep the state consistent before any call that could panic,
    // so a poisoned lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session and make it the active one.
    ///
    /// Without a name a fresh UUID is used.
    pub fn open_session(&self, name: Option<&str>) -> ObserverResult<SessionHandle> {
        let mut state = self.write();

        if let Some(active_id) = &state.active {
            return Err(ObserverError::SessionAlreadyActive {
                active_id: active_id.clone(),
            });
        }

        let id = match name {
            Some(name) => name.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        if state.sessions.contains_key(&id) {
            return Err(ObserverError::DuplicateSession { session_id: id });
        }

        state.sessions.insert(id.clone(), Session::open(id.clone()));
        state.order.push(id.clone());
        state.active = Some(id.clone());

        info!(session_id = %id, "Session opened");
        Ok(SessionHandle::from_id(id))
    }

    /// Close a session. Closing an already-closed session is a no-op.
    pub fn close_session(&self, session: &SessionHandle) -> ObserverResult<()> {
        let mut state = self.write();

        let closed = state
            .sessions
            .get_mut(session.id())
            .ok_or_else(|| ObserverError::SessionNotFound {
                session_id: session.id().to_string(),
            })?
            .close();

        if state.active.as_deref() == Some(session.id()) {
            state.active = None;
        }

        if closed {
            let decisions = state
                .sessions
                .get(session.id())
                .map(|s| s.decisions.len())
                .unwrap_or_default();
            info!(session_id = %session, decisions, "Session closed");
        } else {
            debug!(session_id = %session, "Session already closed");
        }
        Ok(())
    }

    /// Append a decision record to an open session.
    pub fn track_decision(
        &self,
        session: &SessionHandle,
        agent_id: impl Into<String>,
        inputs: Payload,
        outputs: Payload,
        metadata: Option<Payload>,
    ) -> ObserverResult<()> {
        let record = DecisionRecord::new(agent_id, inputs, outputs, metadata.unwrap_or_default());
        self.append(session.id(), record)
    }

    /// Append a decision record to the active session.
    ///
    /// Fails with [`ObserverError::NoActiveSession`] when nothing is open;
    /// no session is ever created implicitly.
    pub fn track_active(
        &self,
        agent_id: impl Into<String>,
        inputs: Payload,
        outputs: Payload,
        metadata: Option<Payload>,
    ) -> ObserverResult<()> {
        let session = self.active_session().ok_or_else(|| {
            warn!("Decision tracked without an active session");
            ObserverError::NoActiveSession
        })?;
        self.track_decision(&session, agent_id, inputs, outputs, metadata)
    }

    fn append(&self, session_id: &str, record: DecisionRecord) -> ObserverResult<()> {
        if record.agent_id.trim().is_empty() {
            return Err(ObserverError::InvalidRecord {
                message: "agent_id cannot be empty".to_string(),
            });
        }

        let mut state = self.write();
        let session =
            state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| ObserverError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;

        if !session.is_open() {
            return Err(ObserverError::SessionClosed {
                session_id: session_id.to_string(),
            });
        }

        debug!(
            session_id = %session_id,
            agent_id = %record.agent_id,
            success = record.succeeded(),
            "Decision tracked"
        );
        session.append(record);
        Ok(())
    }

    /// Handle of the active session, if any.
    pub fn active_session(&self) -> Option<SessionHandle> {
        self.read().active.clone().map(SessionHandle::from_id)
    }

    /// Snapshot of a session.
    pub fn session(&self, session_id: &str) -> ObserverResult<Session> {
        self.read()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ObserverError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// All session ids in the order they were opened.
    pub fn session_ids(&self) -> Vec<String> {
        self.read().order.clone()
    }

    /// Number of sessions held by the store.
    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    /// Summary statistics for a session, open or closed.
    ///
    /// An open session is measured up to now.
    pub fn get_session_metrics(&self, session_id: &str) -> ObserverResult<SessionMetrics> {
        self.read()
            .sessions
            .get(session_id)
            .map(SessionMetrics::from_session)
            .ok_or_else(|| ObserverError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Every decision recorded in this store, session by session in open order.
    pub fn all_decisions(&self) -> Vec<DecisionRecord> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .flat_map(|session| session.decisions.iter().cloned())
            .collect()
    }
}
