//! Per-step synchronization controller.
//!
//! A [`Workspace`] owns one step's parameters and its source text and keeps them
//! in step. Form edits regenerate the source unless the user is typing in it;
//! keystrokes re-parse the source into the parameters; blurring the editor
//! settles the edit by normalizing against the parameters captured when typing
//! began and regenerating canonical text.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pipesync_codec::{ParamsVariant, StepCodec};
use pipesync_types::ExecutionResults;

use crate::events::{EventEmitter, WorkspaceEvent};
use crate::runtime::{InputData, RunRequest};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    /// The source editor has focus; form edits must not overwrite its text.
    SourceEditing,
    Settling,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded {
        results: ExecutionResults,
        /// Names that landed in the artifact registry.
        registered: Vec<String>,
    },
    Failed {
        message: String,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Failed { message } => Some(message),
            ExecutionOutcome::Succeeded { .. } => None,
        }
    }
}

pub struct Workspace<C: StepCodec> {
    id: Uuid,
    params: C::Params,
    source_text: String,
    phase: SyncPhase,
    /// Parameters captured on the first keystroke of an editing burst.
    snapshot: Option<C::Params>,
    generation_enabled: bool,
    source_diverged: bool,
    last_error: Option<String>,
    last_results: Option<ExecutionResults>,
    events: EventEmitter,
    _codec: PhantomData<fn() -> C>,
}

impl<C> Workspace<C>
where
    C: StepCodec,
    C::Params: ParamsVariant,
{
    pub fn new(params: C::Params, events: EventEmitter) -> Self {
        let source_text = C::generate(&params);
        Self {
            id: Uuid::new_v4(),
            params,
            source_text,
            phase: SyncPhase::Idle,
            snapshot: None,
            generation_enabled: true,
            source_diverged: false,
            last_error: None,
            last_results: None,
            events,
            _codec: PhantomData,
        }
    }

    /// A workspace over the default parameters with a private event channel.
    pub fn standalone() -> Self {
        Self::new(C::Params::default(), EventEmitter::default())
    }

    // ----- Accessors -----

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn params(&self) -> &C::Params {
        &self.params
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn generation_enabled(&self) -> bool {
        self.generation_enabled
    }

    /// `true` when the text on screen no longer parses as this step.
    pub fn source_diverged(&self) -> bool {
        self.source_diverged
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_results(&self) -> Option<&ExecutionResults> {
        self.last_results.as_ref()
    }

    // ----- Editing -----

    /// Apply a form edit. The source is regenerated unless the user is typing in
    /// the editor or generation is switched off.
    pub fn form_change(&mut self, params: C::Params) {
        self.params = params;
        if self.phase == SyncPhase::Idle && self.generation_enabled {
            self.regenerate();
        } else {
            tracing::debug!(
                workspace = %self.id,
                step = %C::KIND,
                phase = ?self.phase,
                "form change kept source text"
            );
        }
        self.emit_params();
    }

    /// Apply one keystroke's worth of editor text.
    ///
    /// The text is never rewritten here. When it still parses, the parameters
    /// follow it so the form stays live.
    pub fn source_keystroke(&mut self, text: impl Into<String>) {
        if self.phase != SyncPhase::SourceEditing {
            self.snapshot = Some(self.params.clone());
            self.phase = SyncPhase::SourceEditing;
            tracing::debug!(workspace = %self.id, step = %C::KIND, "source editing started");
        }
        self.source_text = text.into();

        if let Some(parsed) = C::parse(&self.source_text, &self.params) {
            self.source_diverged = false;
            if parsed != self.params {
                self.params = parsed;
                self.emit_params();
            }
        }
    }

    /// Settle an editing burst when the editor loses focus.
    ///
    /// A successful parse is normalized against the pre-edit snapshot and, with
    /// generation on, replaced by canonical text. A miss keeps both the text and
    /// the parameters and marks the source as diverged.
    pub fn blur(&mut self) {
        if self.phase != SyncPhase::SourceEditing {
            return;
        }
        self.phase = SyncPhase::Settling;
        let before = self.snapshot.take().unwrap_or_else(|| self.params.clone());

        match C::parse(&self.source_text, &self.params) {
            Some(parsed) => {
                self.params = C::normalize(parsed, &before);
                self.source_diverged = false;
                if self.generation_enabled {
                    self.source_text = C::generate(&self.params);
                }
                tracing::debug!(workspace = %self.id, step = %C::KIND, "source edit settled");
                self.emit_params();
            }
            None => {
                self.source_diverged = true;
                tracing::debug!(
                    workspace = %self.id,
                    step = %C::KIND,
                    "source no longer matches step, keeping text"
                );
                self.events.emit(WorkspaceEvent::SourceDiverged {
                    workspace: self.id,
                    kind: C::KIND,
                });
            }
        }
        self.phase = SyncPhase::Idle;
    }

    /// Switch automatic regeneration. Turning it back on while idle replaces the
    /// text with the canonical rendering of the current parameters.
    pub fn set_generation_enabled(&mut self, enabled: bool) {
        self.generation_enabled = enabled;
        if enabled && self.phase == SyncPhase::Idle {
            self.regenerate();
        }
    }

    fn regenerate(&mut self) {
        self.source_text = C::generate(&self.params);
        self.source_diverged = false;
    }

    fn emit_params(&self) {
        self.events.emit(WorkspaceEvent::ParamsChanged {
            workspace: self.id,
            kind: C::KIND,
            params: self.params.clone().into_step(),
        });
    }

    // ----- Execution -----

    /// Run the current source text in the session's runtime.
    ///
    /// On success the tabular results are registered under this step's
    /// provenance. On failure the runtime's message is kept verbatim and nothing
    /// else changes.
    pub async fn execute(
        &mut self,
        session: &mut Session,
        input: Option<InputData>,
    ) -> ExecutionOutcome {
        self.events.emit(WorkspaceEvent::ExecutionStarted {
            workspace: self.id,
            kind: C::KIND,
        });
        tracing::debug!(workspace = %self.id, step = %C::KIND, "execution started");

        let input_file = input.as_ref().map(|i| i.name.clone());
        let request = RunRequest::new(self.source_text.clone()).with_input(input);
        let runtime = session.runtime().clone();

        match runtime.run_code(&request).await {
            Ok(results) => {
                let context = C::context(&self.params);
                let registered =
                    session.register_results(&results, &context, input_file.as_deref());
                self.last_error = None;
                self.last_results = Some(results.clone());
                self.events.emit(WorkspaceEvent::ExecutionSucceeded {
                    workspace: self.id,
                    kind: C::KIND,
                    result_names: results.keys().cloned().collect(),
                });
                tracing::info!(
                    workspace = %self.id,
                    step = %C::KIND,
                    results = results.len(),
                    registered = registered.len(),
                    "execution succeeded"
                );
                ExecutionOutcome::Succeeded {
                    results,
                    registered,
                }
            }
            Err(e) => {
                let message = e.display_message();
                tracing::warn!(workspace = %self.id, step = %C::KIND, error = %message, "execution failed");
                self.last_error = Some(message.clone());
                self.events.emit(WorkspaceEvent::ExecutionFailed {
                    workspace: self.id,
                    kind: C::KIND,
                    message: message.clone(),
                });
                ExecutionOutcome::Failed { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipesync_codec::{ReadCsvCodec, ReadCsvParams, SplitCodec, SplitParams};

    #[test]
    fn new_workspace_shows_generated_source() {
        let ws = Workspace::<ReadCsvCodec>::standalone();
        assert_eq!(ws.source_text(), ReadCsvCodec::generate(&ReadCsvParams::default()));
        assert_eq!(ws.phase(), SyncPhase::Idle);
        assert!(!ws.source_diverged());
    }

    #[test]
    fn form_change_regenerates_when_idle() {
        let mut ws = Workspace::<ReadCsvCodec>::standalone();
        let params = ReadCsvParams {
            filename: "houses.csv".into(),
            ..ReadCsvParams::default()
        };
        ws.form_change(params);
        assert!(ws.source_text().contains("pd.read_csv(\"houses.csv\""));
    }

    #[test]
    fn keystroke_updates_params_without_touching_text() {
        let mut ws = Workspace::<ReadCsvCodec>::standalone();
        let edited = ws.source_text().replace("data.csv", "sales.csv");
        ws.source_keystroke(edited.clone());
        assert_eq!(ws.phase(), SyncPhase::SourceEditing);
        assert_eq!(ws.params().filename, "sales.csv");
        assert_eq!(ws.source_text(), edited);
    }

    #[test]
    fn blur_settles_to_canonical_text() {
        let mut ws = Workspace::<SplitCodec>::standalone();
        let edited = ws.source_text().replace("train_size = int(total_rows * 0.80)", "train_size = int(total_rows * 0.90)");
        ws.source_keystroke(edited);
        ws.blur();
        assert_eq!(ws.phase(), SyncPhase::Idle);
        assert_eq!(ws.params().train_percent, 90);
        assert_eq!(ws.params().test_percent, 10);
        assert_eq!(ws.source_text(), SplitCodec::generate(ws.params()));
    }

    #[test]
    fn blur_on_unrelated_text_keeps_it() {
        let mut ws = Workspace::<SplitCodec>::standalone();
        ws.source_keystroke("print('hello')");
        ws.blur();
        assert!(ws.source_diverged());
        assert_eq!(ws.source_text(), "print('hello')");
        assert_eq!(ws.params(), &SplitParams::default());
    }

    #[test]
    fn blur_without_editing_is_a_no_op() {
        let mut ws = Workspace::<SplitCodec>::standalone();
        let before = ws.source_text().to_string();
        ws.blur();
        assert_eq!(ws.source_text(), before);
        assert_eq!(ws.phase(), SyncPhase::Idle);
    }

    #[test]
    fn generation_toggle() {
        let mut ws = Workspace::<ReadCsvCodec>::standalone();
        ws.set_generation_enabled(false);
        ws.form_change(ReadCsvParams {
            var_name: "raw".into(),
            ..ReadCsvParams::default()
        });
        assert!(ws.source_text().starts_with("import pandas as pd\ndf = "));

        ws.set_generation_enabled(true);
        assert!(ws.source_text().contains("raw = pd.read_csv("));
    }
}
