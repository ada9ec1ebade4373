//! # pinlab demo
//!
//! Runs a catalog of unpinned and pinned HTTPS requests concurrently, logs every
//! state transition as it is published and summarizes the outcomes.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, trivial_casts, unused_import_braces)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod catalog;
pub mod config;
pub mod inspect;
pub mod report;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, warn};

use pinlab_core::{pin_registry, PinnedRequestExecutor, RegistryDelegate, RequestState};
use pinlab_types::{PinRegistry, RegistryError, RequestSnapshot};

use crate::catalog::CatalogEntry;
use crate::report::Outcome;

pub use config::{DemoConfig, OutputFormat};

/// The shared pin registry, installed until this value is dropped
#[derive(Debug)]
pub struct InstalledRegistry {
    delegate: Arc<RegistryDelegate>,
}

impl InstalledRegistry {
    /// Install `registry` as the process-wide registry
    pub fn install(registry: PinRegistry) -> Result<Self, RegistryError> {
        pin_registry::initialize(registry)?;
        match pin_registry::shared_delegate() {
            Ok(delegate) => Ok(Self { delegate }),
            Err(e) => {
                pin_registry::teardown();
                Err(e)
            }
        }
    }

    /// Delegate backed by the installed registry
    pub fn delegate(&self) -> Arc<RegistryDelegate> {
        Arc::clone(&self.delegate)
    }
}

impl Drop for InstalledRegistry {
    fn drop(&mut self) {
        pin_registry::teardown();
        debug!("shared pin registry torn down");
    }
}

/// Execute every entry concurrently and collect outcomes in catalog order
///
/// Each entry gets its own [`RequestState`] and a watcher that logs transitions.
pub async fn run_catalog(
    executor: Arc<PinnedRequestExecutor>,
    entries: Vec<CatalogEntry>,
) -> Vec<Outcome> {
    let mut running = Vec::with_capacity(entries.len());

    for entry in entries {
        let state = Arc::new(RequestState::new());
        let name = entry.definition.name().to_string();
        let watcher = tokio::spawn(watch(name, state.subscribe()));

        let executor = Arc::clone(&executor);
        let task_state = Arc::clone(&state);
        let definition = entry.definition.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = executor.execute(&definition, &task_state).await;
            (result, started.elapsed())
        });
        running.push((entry, state, task, watcher));
    }

    let mut outcomes = Vec::with_capacity(running.len());
    for (entry, state, task, watcher) in running {
        let name = entry.definition.name();
        let elapsed = match task.await {
            Ok((result, elapsed)) => {
                debug!(request = name, ok = result.is_ok(), "request task finished");
                elapsed.as_millis() as u64
            }
            Err(e) => {
                warn!(request = name, error = %e, "request task did not complete");
                0
            }
        };
        if let Err(e) = watcher.await {
            warn!(request = name, error = %e, "state watcher did not complete");
        }

        outcomes.push(Outcome::from_snapshot(&entry, state.snapshot(), elapsed));
    }
    outcomes
}

/// Log transitions of one request until it reaches a terminal phase
async fn watch(name: String, mut updates: Receiver<RequestSnapshot>) {
    loop {
        match updates.recv().await {
            Ok(snapshot) => {
                match &snapshot.last_error {
                    Some(err) => info!(
                        request = %name,
                        phase = %snapshot.phase,
                        error = %err,
                        "state changed"
                    ),
                    None => info!(
                        request = %name,
                        phase = %snapshot.phase,
                        status = ?snapshot.status_code,
                        "state changed"
                    ),
                }
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(request = %name, skipped, "missed state updates");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
