//! The `StepCodec` trait: one pure generator and one best-effort parser per step kind.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use pipesync_types::{DataframeContext, StepKind};

/// Bidirectional mapping between a step's structured parameters and its source text.
///
/// `generate` is total and deterministic. `parse` returns `None` when the step's
/// anchor pattern is missing, and otherwise rebuilds the parameters field by field,
/// keeping the value from `current` for any field whose pattern is not found.
pub trait StepCodec {
    type Params: Clone + PartialEq + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    const KIND: StepKind;

    /// Render `params` as source text.
    fn generate(params: &Self::Params) -> String;

    /// Recover parameters from `source`, falling back to `current` field by field.
    fn parse(source: &str, current: &Self::Params) -> Option<Self::Params>;

    /// [`parse`](StepCodec::parse) against the default parameters.
    fn parse_default(source: &str) -> Option<Self::Params> {
        Self::parse(source, &Self::Params::default())
    }

    /// Reconcile a parse taken when editing settles with the parameters captured
    /// before editing started.
    fn normalize(parsed: Self::Params, _before: &Self::Params) -> Self::Params {
        parsed
    }

    /// Provenance and role for the tables this step's code produces.
    fn context(params: &Self::Params) -> DataframeContext;
}
