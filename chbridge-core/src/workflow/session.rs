//! Cooperative driver that runs workflow effects against a backend.
//!
//! Effects run concurrently as futures; their completions are applied one at
//! a time, so observers only ever see whole snapshots.

use super::action::{Action, Completion, Effect};
use super::controller::Workflow;
use super::snapshot::WorkflowSnapshot;
use crate::Result;
use crate::backend::TransferBackend;
use crate::executor::ArtifactSink;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// A workflow bound to a backend and an artifact sink.
///
/// # Example
/// ```rust,no_run
/// use chbridge_core::backend::{BackendConfig, HttpBackend};
/// use chbridge_core::executor::DirectorySink;
/// use chbridge_core::workflow::{Action, TransferSession};
/// use std::sync::Arc;
///
/// # async fn example() -> chbridge_core::Result<()> {
/// let backend = Arc::new(HttpBackend::new(BackendConfig::default())?);
/// let sink = Arc::new(DirectorySink::new("."));
/// let mut session = TransferSession::new(backend, sink);
///
/// session.dispatch(Action::TestConnection)?;
/// session.settle().await;
/// println!("{}", session.snapshot().status.connection.message);
/// # Ok(())
/// # }
/// ```
pub struct TransferSession {
    workflow: Workflow,
    backend: Arc<dyn TransferBackend>,
    sink: Arc<dyn ArtifactSink>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    publisher: watch::Sender<Arc<WorkflowSnapshot>>,
}

impl std::fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("workflow", &self.workflow)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl TransferSession {
    /// Creates a session over a fresh workflow.
    pub fn new(backend: Arc<dyn TransferBackend>, sink: Arc<dyn ArtifactSink>) -> Self {
        Self::with_workflow(Workflow::new(), backend, sink)
    }

    /// Creates a session over an existing workflow.
    pub fn with_workflow(
        workflow: Workflow,
        backend: Arc<dyn TransferBackend>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        let (publisher, _) = watch::channel(workflow.snapshot());
        Self {
            workflow,
            backend,
            sink,
            in_flight: FuturesUnordered::new(),
            publisher,
        }
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> Arc<WorkflowSnapshot> {
        self.workflow.snapshot()
    }

    /// Receiver notified with every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WorkflowSnapshot>> {
        self.publisher.subscribe()
    }

    /// Number of collaborator calls still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Applies an operator action and starts the calls it requests.
    ///
    /// # Errors
    /// Returns `ActionRejected` when the workflow refuses the action.
    pub fn dispatch(&mut self, action: Action) -> Result<()> {
        let effects = self.workflow.handle(action)?;
        self.spawn(effects);
        self.publish();
        Ok(())
    }

    /// Waits for the next call to finish and applies its outcome.
    ///
    /// Returns `false` when nothing is in flight.
    pub async fn step(&mut self) -> bool {
        let Some(completion) = self.in_flight.next().await else {
            return false;
        };

        trace!(?completion, "applying completion");
        let effects = self.workflow.complete(completion);
        self.spawn(effects);
        self.publish();
        true
    }

    /// Runs until no call is in flight.
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    fn spawn(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            trace!(?effect, "starting effect");
            let future = effect.run(Arc::clone(&self.backend), Arc::clone(&self.sink));
            self.in_flight.push(future.boxed());
        }
    }

    fn publish(&self) {
        let snapshot = self.workflow.snapshot();
        let unchanged = Arc::ptr_eq(&snapshot, &self.publisher.borrow());
        if !unchanged {
            self.publisher.send_replace(snapshot);
        }
    }
}
