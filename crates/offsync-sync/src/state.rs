//! Shared, persisted engine state
//!
//! Every mutation is applied to a copy, persisted, and only then published.
//! A failed write leaves the in-memory state exactly as it was.

use tokio::sync::Mutex;

use crate::persistence::{EngineState, PersistenceLayer, Section};
use crate::EngineError;

pub(crate) struct SharedState {
    state: Mutex<EngineState>,
    persistence: PersistenceLayer,
}

impl SharedState {
    pub(crate) fn new(state: EngineState, persistence: PersistenceLayer) -> Self {
        Self {
            state: Mutex::new(state),
            persistence,
        }
    }

    /// Runs `f` against the current state
    pub(crate) async fn read<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    /// Applies `f`, persists `sections`, then publishes the result
    pub(crate) async fn commit<R>(
        &self,
        sections: &[Section],
        f: impl FnOnce(&mut EngineState) -> R,
    ) -> Result<R, EngineError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let result = f(&mut next);

        self.persistence.save(&next, sections).await?;
        *guard = next;
        Ok(result)
    }

    /// Persists every section of the current state
    pub(crate) async fn flush(&self) -> Result<(), EngineError> {
        let guard = self.state.lock().await;
        self.persistence.save(&guard, &Section::ALL).await?;
        Ok(())
    }
}
