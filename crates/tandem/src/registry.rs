//! Named sessions for one scenario run.
//!
//! The registry is keyed by session name. Names are declared up front so a
//! session that has not been spawned yet is still observable as
//! `NotStarted`; spawning fills the slot. Termination runs in reverse spawn
//! order.

use std::collections::HashMap;

use crate::backend::Spawner;
use crate::config::SessionConfig;
use crate::error::{ExpectError, Result};
use crate::session::Session;
use crate::types::SessionState;

/// Sessions owned by a scenario, addressed by name.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: HashMap<String, Option<Session>>,
    declared: Vec<String>,
    spawned: Vec<String>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name for a session that will be spawned later.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name is empty or already declared.
    pub fn declare(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ExpectError::invalid_argument("session name is empty"));
        }
        if self.slots.contains_key(name) {
            return Err(ExpectError::invalid_argument(format!(
                "duplicate session name '{name}'"
            )));
        }
        self.slots.insert(name.to_string(), None);
        self.declared.push(name.to_string());
        Ok(())
    }

    /// Place a spawned session into its declared slot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name was never declared or its slot
    /// is already filled. The session is dropped in that case.
    pub fn insert(&mut self, session: Session) -> Result<()> {
        let name = session.name().to_string();
        match self.slots.get_mut(&name) {
            None => Err(ExpectError::invalid_argument(format!(
                "session '{name}' was not declared"
            ))),
            Some(Some(_)) => Err(ExpectError::invalid_argument(format!(
                "session '{name}' was already spawned"
            ))),
            Some(slot @ None) => {
                *slot = Some(session);
                self.spawned.push(name);
                Ok(())
            }
        }
    }

    /// Spawn the declared session `name` and wait for its ready pattern.
    ///
    /// The session is registered before waiting, so a session that never
    /// becomes ready is still cleaned up by [`terminate_all`](Self::terminate_all).
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the process cannot be started, the ready-pattern
    /// error, or `InvalidArgument` for an undeclared or already spawned name.
    pub async fn spawn<S: Spawner>(
        &mut self,
        spawner: &S,
        name: &str,
        config: SessionConfig,
    ) -> Result<()> {
        match self.slots.get(name) {
            None => {
                return Err(ExpectError::invalid_argument(format!(
                    "session '{name}' was not declared"
                )));
            }
            Some(Some(_)) => {
                return Err(ExpectError::invalid_argument(format!(
                    "session '{name}' was already spawned"
                )));
            }
            Some(None) => {}
        }

        let session = Session::spawn_with(spawner, name, config).await?;
        self.insert(session)?;
        self.get_mut(name)?.wait_ready().await
    }

    /// Get a running session by name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an undeclared name and
    /// `SessionNotRunning` for a session that has not been spawned or has
    /// terminated.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Session> {
        match self.slots.get_mut(name) {
            None => Err(ExpectError::invalid_argument(format!(
                "unknown session '{name}'"
            ))),
            Some(None) => Err(ExpectError::not_running(name, SessionState::NotStarted)),
            Some(Some(session)) => {
                if session.state().is_running() {
                    Ok(session)
                } else {
                    Err(ExpectError::not_running(name, session.state()))
                }
            }
        }
    }

    /// Get a session by name in any state.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Session> {
        self.slots.get(name).and_then(Option::as_ref)
    }

    /// State of a declared session.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<SessionState> {
        self.slots
            .get(name)
            .map(|slot| slot.as_ref().map_or(SessionState::NotStarted, Session::state))
    }

    /// States of all declared sessions, in declaration order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, SessionState)> {
        self.declared
            .iter()
            .filter_map(|name| self.state(name).map(|s| (name.clone(), s)))
            .collect()
    }

    /// Declared names, in declaration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.declared
    }

    /// Check if a name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Number of declared sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    /// Check if no session is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Terminate every spawned session, last spawned first.
    ///
    /// Failures do not stop the sweep; each becomes a warning in the
    /// returned list.
    pub async fn terminate_all(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        for name in self.spawned.iter().rev() {
            let Some(Some(session)) = self.slots.get_mut(name) else {
                continue;
            };
            if let Err(e) = session.terminate().await {
                tracing::warn!(session = %name, error = %e, "terminate failed");
                warnings.push(format!("terminating session '{name}': {e}"));
            }
        }
        warnings
    }
}
