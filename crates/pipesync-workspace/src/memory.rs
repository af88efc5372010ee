//! In-process [`Runtime`] that keeps its namespace in a map.
//!
//! Nothing is actually evaluated: a responder closure decides what running a piece
//! of source produces. Used by the integration tests and by the developer CLI.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use pipesync_codec::pylit;
use pipesync_types::{ExecutionResults, Result, SyncError, TypedResult};

use crate::runtime::{RunRequest, Runtime};

type Responder = Arc<dyn Fn(&RunRequest) -> Result<ExecutionResults> + Send + Sync>;

pub struct MemoryRuntime {
    namespace: Mutex<BTreeMap<String, TypedResult>>,
    responder: Responder,
    failing_deletes: Mutex<HashSet<String>>,
    requests: Mutex<Vec<RunRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryRuntime {
    /// A runtime whose code produces nothing.
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(ExecutionResults::new()))
    }

    /// A runtime that answers every `run_code` with `responder`.
    ///
    /// Only results for names the source actually assigns are kept, the same
    /// filtering a real interpreter bridge applies.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&RunRequest) -> Result<ExecutionResults> + Send + Sync + 'static,
    {
        Self {
            namespace: Mutex::new(BTreeMap::new()),
            responder: Arc::new(responder),
            failing_deletes: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A runtime whose every run fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_responder(move |_| Err(SyncError::execution(message.clone())))
    }

    /// Put `value` into the namespace as if some earlier code had created it.
    pub fn insert(&self, name: impl Into<String>, value: TypedResult) {
        lock(&self.namespace).insert(name.into(), value);
    }

    /// Drop the whole namespace, as a restarted interpreter would.
    pub fn reset(&self) {
        lock(&self.namespace).clear();
        tracing::debug!("memory runtime namespace reset");
    }

    /// Make `delete_name(name)` fail from now on.
    pub fn fail_delete(&self, name: impl Into<String>) {
        lock(&self.failing_deletes).insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.namespace).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.namespace).keys().cloned().collect()
    }

    /// Every request passed to `run_code`, oldest first.
    pub fn requests(&self) -> Vec<RunRequest> {
        lock(&self.requests).clone()
    }
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runtime for MemoryRuntime {
    async fn run_code(&self, request: &RunRequest) -> Result<ExecutionResults> {
        lock(&self.requests).push(request.clone());
        let produced = (self.responder)(request)?;
        let assigned = pylit::assigned_names(&request.source_text);
        let results: ExecutionResults = produced
            .into_iter()
            .filter(|(name, _)| assigned.contains(name))
            .collect();

        let mut namespace = lock(&self.namespace);
        for (name, value) in &results {
            namespace.insert(name.clone(), value.clone());
        }
        Ok(results)
    }

    async fn check_names_exist(&self, names: &[String]) -> Result<Vec<String>> {
        let namespace = lock(&self.namespace);
        Ok(names
            .iter()
            .filter(|n| namespace.get(n.as_str()).is_some_and(TypedResult::is_tabular))
            .cloned()
            .collect())
    }

    async fn get_columns(&self, name: &str) -> Result<Vec<String>> {
        Ok(match lock(&self.namespace).get(name) {
            Some(TypedResult::Table { columns, .. }) => columns.clone(),
            _ => Vec::new(),
        })
    }

    async fn delete_name(&self, name: &str) -> Result<()> {
        if lock(&self.failing_deletes).contains(name) {
            return Err(SyncError::RuntimeCall {
                call: "delete_name".into(),
                message: format!("cannot delete '{name}'"),
            });
        }
        lock(&self.namespace).remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: usize) -> TypedResult {
        TypedResult::Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            shape: vec![rows, columns.len()],
        }
    }

    #[tokio::test]
    async fn run_keeps_only_assigned_names() {
        let rt = MemoryRuntime::with_responder(|_| {
            Ok(ExecutionResults::from([
                ("df".to_string(), table(&["a"], 3)),
                ("pd".to_string(), TypedResult::Scalar { value: serde_json::json!("module") }),
            ]))
        });
        let results = rt
            .run_code(&RunRequest::new("import pandas as pd\ndf = pd.read_csv('a.csv')"))
            .await
            .unwrap();
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["df"]);
        assert!(rt.contains("df"));
        assert!(!rt.contains("pd"));
        assert_eq!(rt.requests().len(), 1);
    }

    #[tokio::test]
    async fn failing_runtime_reports_message() {
        let rt = MemoryRuntime::failing("SyntaxError: invalid syntax");
        let err = rt.run_code(&RunRequest::new("df = (")).await.unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: invalid syntax");
        assert!(rt.names().is_empty());
    }

    #[tokio::test]
    async fn existence_and_columns_follow_namespace() {
        let rt = MemoryRuntime::new();
        rt.insert("df", table(&["a", "b"], 10));
        rt.insert("r2", TypedResult::Scalar { value: serde_json::json!(0.5) });

        let names = vec!["df".to_string(), "r2".to_string(), "gone".to_string()];
        assert_eq!(rt.check_names_exist(&names).await.unwrap(), vec!["df"]);
        assert_eq!(rt.get_columns("df").await.unwrap(), vec!["a", "b"]);
        assert!(rt.get_columns("r2").await.unwrap().is_empty());

        rt.reset();
        assert!(rt.check_names_exist(&names).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_can_be_injected() {
        let rt = MemoryRuntime::new();
        rt.insert("keep", table(&["a"], 1));
        rt.fail_delete("keep");
        assert!(rt.delete_name("keep").await.is_err());
        assert!(rt.contains("keep"));
        assert!(rt.delete_name("never_existed").await.is_ok());
    }
}
