//! Synchronization controller, derived-artifact registry, and session plumbing
//! for pipesync.
//!
//! - [`workspace`]: one step's parameters and source text kept in step, plus
//!   execution against the runtime
//! - [`registry`]: the lineage of named tables produced by executed steps
//! - [`runtime`]: the seam to the interpreter and the decoder for its results
//! - [`session`]: the shared runtime, registry, input files, and event channel
//! - [`events`]: broadcast notifications for pickers and other observers

pub mod config;
pub mod events;
pub mod memory;
pub mod preview;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod workspace;

pub use config::SessionConfig;
pub use events::{EventEmitter, WorkspaceEvent};
pub use memory::MemoryRuntime;
pub use preview::{build_preview, DelimitedParser, SimpleDelimitedParser, TablePreview};
pub use registry::{ArtifactRegistry, DerivedArtifact, RegisterOutcome};
pub use runtime::{decode_results, InputData, RunRequest, Runtime};
pub use session::{Session, UNKNOWN_SOURCE_FILE};
pub use workspace::{ExecutionOutcome, SyncPhase, Workspace};
