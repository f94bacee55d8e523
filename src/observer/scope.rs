use std::future::Future;

use tracing::warn;

use super::{Observer, SessionHandle, SessionMetrics};
use crate::decision::Payload;
use crate::error::{ObserverError, ObserverResult};

/// Scoped session that closes itself when dropped.
///
/// The end timestamp is recorded on every exit path: normal return, early
/// return through `?`, unwinding, and dropping a future that owns the guard.
#[derive(Debug)]
pub struct SessionGuard {
    observer: Observer,
    handle: SessionHandle,
}

impl SessionGuard {
    /// Handle of the scoped session.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Track a decision in this guard's session.
    pub fn track(
        &self,
        agent_id: impl Into<String>,
        inputs: Payload,
        outputs: Payload,
        metadata: Option<Payload>,
    ) -> ObserverResult<()> {
        self.observer
            .track_decision(&self.handle, agent_id, inputs, outputs, metadata)
    }

    /// Close the session now and return its final metrics.
    pub fn finish(self) -> ObserverResult<SessionMetrics> {
        self.observer.close_session(&self.handle)?;
        self.observer.get_session_metrics(self.handle.id())
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.observer.close_session(&self.handle) {
            warn!(session_id = %self.handle, error = %e, "Failed to close scoped session");
        }
    }
}

impl Observer {
    /// Open a session bound to the returned guard.
    pub fn scope(&self, name: Option<&str>) -> ObserverResult<SessionGuard> {
        let handle = self.open_session(name)?;
        Ok(SessionGuard {
            observer: self.clone(),
            handle,
        })
    }

    /// Run `f` inside a session that is closed however `f` exits.
    ///
    /// The closure's own error is returned unchanged.
    pub fn with_session<T, E, F>(&self, name: Option<&str>, f: F) -> Result<T, E>
    where
        F: FnOnce(&SessionHandle) -> Result<T, E>,
        E: From<ObserverError>,
    {
        let guard = self.scope(name)?;
        f(guard.handle())
    }

    /// Async form of [`Observer::with_session`].
    ///
    /// Cancelling the returned future still closes the session.
    pub async fn observe<T, E, F, Fut>(&self, name: Option<&str>, f: F) -> Result<T, E>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ObserverError>,
    {
        let guard = self.scope(name)?;
        f(guard.handle().clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum WorkError {
        Observer(ObserverError),
        Agent(&'static str),
    }

    impl From<ObserverError> for WorkError {
        fn from(err: ObserverError) -> Self {
            WorkError::Observer(err)
        }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let observer = Observer::new();
        {
            let guard = observer.scope(Some("scoped")).unwrap();
            guard
                .track("agentA", Payload::new(), Payload::new(), None)
                .unwrap();
            assert!(observer.session("scoped").unwrap().is_open());
        }
        let session = observer.session("scoped").unwrap();
        assert!(!session.is_open());
        assert!(observer.active_session().is_none());
    }

    #[test]
    fn test_guard_finish_returns_metrics() {
        let observer = Observer::new();
        let guard = observer.scope(Some("s1")).unwrap();
        guard
            .track("agentA", Payload::new(), Payload::new(), None)
            .unwrap();
        let metrics = guard.finish().unwrap();
        assert!(!metrics.open);
        assert_eq!(metrics.decision_count, 1);
    }

    #[test]
    fn test_with_session_closes_on_error() {
        let observer = Observer::new();
        let result: Result<(), WorkError> = observer.with_session(Some("failing"), |handle| {
            observer.track_decision(handle, "agentA", Payload::new(), Payload::new(), None)?;
            Err(WorkError::Agent("boom"))
        });

        assert_eq!(result, Err(WorkError::Agent("boom")));
        let session = observer.session("failing").unwrap();
        assert!(session.ended_at.is_some());
        assert_eq!(session.decisions.len(), 1);
    }

    #[test]
    fn test_with_session_closes_on_panic() {
        let observer = Observer::new();
        let cloned = observer.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _ = cloned.with_session(Some("panicky"), |_| -> Result<(), ObserverError> {
                panic!("agent blew up")
            });
        });
        assert!(outcome.is_err());
        assert!(!observer.session("panicky").unwrap().is_open());
    }

    #[test]
    fn test_with_session_propagates_open_failure() {
        let observer = Observer::new();
        let _outer = observer.scope(Some("outer")).unwrap();
        let result: Result<(), WorkError> = observer.with_session(Some("inner"), |_| Ok(()));
        assert!(matches!(
            result,
            Err(WorkError::Observer(ObserverError::SessionAlreadyActive { .. }))
        ));
    }

    #[tokio::test]
    async fn test_observe_returns_value() {
        let observer = Observer::new();
        let value: Result<u32, ObserverError> = observer
            .observe(Some("async"), |handle| {
                let observer = observer.clone();
                async move {
                    observer.track_decision(&handle, "agentA", Payload::new(), Payload::new(), None)?;
                    Ok::<u32, ObserverError>(7)
                }
            })
            .await;
        assert_eq!(value, Ok(7));
        assert!(!observer.session("async").unwrap().is_open());
    }

    #[tokio::test]
    async fn test_observe_closes_on_cancellation() {
        let observer = Observer::new();
        let work = observer.observe(Some("cancelled"), |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), ObserverError>(())
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(20), work).await;
        assert!(timed_out.is_err());

        let session = observer.session("cancelled").unwrap();
        assert!(session.ended_at.is_some());
        assert!(observer.active_session().is_none());
    }
}
