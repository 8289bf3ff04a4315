//! Transfer workflow controller.
//!
//! # Module Structure
//! - `action`: Operator actions, collaborator effects and their completions
//! - `snapshot`: The published view state and execute gating
//! - `controller`: The pure state machine (`Workflow`)
//! - `session`: Async driver publishing snapshots (`TransferSession`)

mod action;
mod controller;
mod session;
mod snapshot;

pub use action::{Action, Completion, ConnectionEdit, Effect};
pub use controller::{
    CONNECTED_MESSAGE, EXPORTING_MESSAGE, IMPORTING_MESSAGE, TESTING_MESSAGE, Workflow,
};
pub use session::TransferSession;
pub use snapshot::{ExportOptions, ImportOptions, WorkflowSnapshot};
