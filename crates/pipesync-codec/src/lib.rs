//! Parameter codecs for pipesync steps.
//!
//! Every pipeline step exists twice: as a structured parameter object driving a
//! form, and as editable Python source. This crate converts between the two:
//!
//! - [`codec::StepCodec`]: `generate` is pure and total, `parse` is best-effort and
//!   returns `None` when the step's anchor line is missing
//! - [`steps`]: one codec per [`StepKind`](pipesync_types::StepKind)
//! - [`normalize`]: the split percentage repair policies
//! - [`registry`]: runtime dispatch by step kind

pub mod codec;
pub mod normalize;
pub mod pylit;
pub mod registry;
pub mod steps;

pub use codec::StepCodec;
pub use normalize::{normalize_after_edit, redistribute_slider, SplitPlan};
pub use registry::{default_registry, CodecRegistry, DynCodec, ParamsVariant, StepParams};
pub use steps::*;
