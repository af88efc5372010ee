//! One editing session: the shared runtime, the artifact registry, uploaded input
//! files, and the event channel every workspace publishes on.

use std::collections::BTreeMap;
use std::sync::Arc;

use pipesync_codec::{ParamsVariant, StepCodec};
use pipesync_types::{ArtifactKind, DataframeContext, ExecutionResults, Result};

use crate::config::SessionConfig;
use crate::events::{EventEmitter, WorkspaceEvent};
use crate::preview::{build_preview, SimpleDelimitedParser, TablePreview};
use crate::registry::{ArtifactRegistry, DerivedArtifact};
use crate::runtime::{InputData, Runtime};
use crate::workspace::Workspace;

/// Source file recorded for artifacts that came from no known input.
pub const UNKNOWN_SOURCE_FILE: &str = "unknown";

pub struct Session {
    runtime: Arc<dyn Runtime>,
    registry: ArtifactRegistry,
    events: EventEmitter,
    config: SessionConfig,
    inputs: BTreeMap<String, String>,
}

impl Session {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self::with_config(runtime, SessionConfig::default())
    }

    pub fn with_config(runtime: Arc<dyn Runtime>, config: SessionConfig) -> Self {
        Self {
            runtime,
            registry: ArtifactRegistry::new(),
            events: EventEmitter::new(config.event_capacity),
            config,
            inputs: BTreeMap::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    /// A workspace for one step, publishing on this session's channel.
    pub fn workspace<C>(&self, params: C::Params) -> Workspace<C>
    where
        C: StepCodec,
        C::Params: ParamsVariant,
    {
        Workspace::new(params, self.events.clone())
    }

    // ----- Input files -----

    pub fn add_input_file(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        let name = name.into();
        tracing::debug!(file = %name, "input file added");
        self.inputs.insert(name, contents.into());
    }

    pub fn remove_input_file(&mut self, name: &str) -> bool {
        self.inputs.remove(name).is_some()
    }

    pub fn input_files(&self) -> Vec<String> {
        self.inputs.keys().cloned().collect()
    }

    /// The named input file packaged for a run request.
    pub fn input(&self, name: &str) -> Option<InputData> {
        self.inputs.get(name).map(|contents| InputData {
            name: name.to_string(),
            contents: contents.clone(),
        })
    }

    /// Header and first `preview_rows` records of an input file.
    pub fn preview_input(&self, name: &str, delimiter: &str) -> Option<TablePreview> {
        self.inputs.get(name).map(|contents| {
            build_preview(&SimpleDelimitedParser, contents, delimiter, self.config.preview_rows)
        })
    }

    // ----- Registry maintenance -----

    /// Run [`reconcile`](Self::reconcile) if the configuration asks for it on
    /// every step activation. Returns the pruned names.
    pub async fn begin_step(&mut self) -> Result<Vec<String>> {
        if self.config.reconcile_on_start {
            self.reconcile().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Check every registered name against the runtime and silently drop the
    /// ones it no longer has, together with their descendants. Returns every
    /// name dropped.
    pub async fn reconcile(&mut self) -> Result<Vec<String>> {
        let names = self.registry.names();
        let stale = self
            .registry
            .reconcile_against_runtime(self.runtime.as_ref(), &names)
            .await?;
        let pruned = self.registry.prune(&stale);
        if !pruned.is_empty() {
            self.events.emit(WorkspaceEvent::StaleArtifactsPruned {
                names: pruned.clone(),
            });
        }
        Ok(pruned)
    }

    /// Remove `name` and its descendants from the registry, then delete each of
    /// them from the runtime. Runtime failures are logged and otherwise ignored.
    pub async fn remove_artifact(&mut self, name: &str) -> Vec<String> {
        let removed = self.registry.remove(name);
        for gone in &removed {
            if let Err(e) = self.runtime.delete_name(gone).await {
                tracing::warn!(name = %gone, error = %e, "runtime delete failed");
            }
        }
        if !removed.is_empty() {
            self.events.emit(WorkspaceEvent::ArtifactsRemoved {
                names: removed.clone(),
            });
        }
        removed
    }

    /// Column labels of `name` in the runtime, duplicates dropped.
    pub async fn columns_of(&self, name: &str) -> Result<Vec<String>> {
        let columns = self.runtime.get_columns(name).await?;
        let mut unique: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !unique.contains(&column) {
                unique.push(column);
            }
        }
        Ok(unique)
    }

    /// Register the tables and series among `results` under `context`.
    ///
    /// Derived artifacts inherit the parent's source file; others record
    /// `input_file`, or [`UNKNOWN_SOURCE_FILE`]. A result that cannot be
    /// registered (its parent is unknown) is skipped with a warning. Returns the
    /// registered names.
    pub fn register_results(
        &mut self,
        results: &ExecutionResults,
        context: &DataframeContext,
        input_file: Option<&str>,
    ) -> Vec<String> {
        let mut registered = Vec::new();
        for (name, result) in results.iter().filter(|(_, r)| r.is_tabular()) {
            let row_count = result.row_count().unwrap_or(0);
            let artifact = self.artifact_for(name, row_count, context, input_file);
            let parent = artifact.parent_name.clone();
            match self.registry.register(artifact) {
                Ok(_) => {
                    self.events.emit(WorkspaceEvent::ArtifactRegistered {
                        name: name.clone(),
                        parent,
                    });
                    registered.push(name.clone());
                }
                Err(e) => tracing::warn!(name = %name, error = %e, "result not registered"),
            }
        }
        registered
    }

    fn artifact_for(
        &self,
        name: &str,
        row_count: usize,
        context: &DataframeContext,
        input_file: Option<&str>,
    ) -> DerivedArtifact {
        let fallback_file = input_file.unwrap_or(UNKNOWN_SOURCE_FILE);

        // Rebinding the parent's own name (`df = df.dropna()`) refreshes that
        // entry instead of deriving it from itself.
        if context.parent.as_deref() == Some(name) {
            if let Some(existing) = self.registry.get(name) {
                return DerivedArtifact {
                    row_count,
                    registered_at: chrono::Utc::now(),
                    ..existing.clone()
                };
            }
        }

        match (context.kind, &context.parent) {
            (ArtifactKind::Derived, Some(parent)) if parent != name => {
                let source_file = self
                    .registry
                    .get(parent)
                    .map(|p| p.source_file.clone())
                    .unwrap_or_else(|| fallback_file.to_string());
                DerivedArtifact::derived(name, parent.clone(), source_file, row_count)
                    .with_role(context.role_for(name))
            }
            _ => DerivedArtifact::source(name, fallback_file, row_count)
                .with_role(context.role_for(name)),
        }
    }
}
