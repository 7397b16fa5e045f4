//! Running many sessions at once

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use super::engine::{Mechanism, Protocol};
use super::info::CancelHandle;
use super::state::{MechanismState, SessionId};
use crate::error::{NegotiationError, Result};

/// A session the runner can drive, whatever its protocol
pub trait Session: Send {
    fn id(&self) -> SessionId;
    fn step(&mut self) -> MechanismState;
    fn run(&mut self) -> MechanismState;
    fn state(&self) -> MechanismState;
    fn cancel_handle(&self) -> CancelHandle;
}

impl<P: Protocol> Session for Mechanism<P> {
    fn id(&self) -> SessionId {
        Mechanism::id(self)
    }

    fn step(&mut self) -> MechanismState {
        Mechanism::step(self)
    }

    fn run(&mut self) -> MechanismState {
        Mechanism::run(self)
    }

    fn state(&self) -> MechanismState {
        Mechanism::state(self)
    }

    fn cancel_handle(&self) -> CancelHandle {
        Mechanism::cancel_handle(self)
    }
}

/// Run every session to completion on the blocking pool.
///
/// At most `max_concurrency` sessions run at the same time when a cap is given. Final
/// states come back in input order.
pub async fn run_sessions(
    sessions: Vec<Box<dyn Session>>,
    max_concurrency: Option<usize>,
) -> Vec<Result<MechanismState>> {
    let semaphore = max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
    debug!(sessions = sessions.len(), ?max_concurrency, "running sessions");

    let tasks = sessions.into_iter().map(|mut session| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = match semaphore {
                Some(semaphore) => Some(
                    semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| NegotiationError::SessionTask(e.to_string()))?,
                ),
                None => None,
            };
            let id = session.id();
            tokio::task::spawn_blocking(move || session.run())
                .await
                .map_err(|e| {
                    error!(session = %id, error = %e, "session task failed");
                    NegotiationError::SessionTask(format!("session {}: {}", id, e))
                })
        }
    });
    join_all(tasks).await
}
