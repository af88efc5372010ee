//! Derived-artifact registry: which named tables exist, where they came from, and
//! what they are for.
//!
//! The registry mirrors part of the runtime namespace and can go stale. It is only
//! ever corrected through an explicit [`ArtifactRegistry::reconcile_against_runtime`]
//! followed by [`ArtifactRegistry::prune`], which takes descendants along so no entry
//! is left pointing at a missing parent.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pipesync_types::{ArtifactKind, Result, Role, SyncError};

use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub name: String,
    pub source_file: String,
    pub row_count: usize,
    pub kind: ArtifactKind,
    pub parent_name: Option<String>,
    pub role: Role,
    pub registered_at: DateTime<Utc>,
}

impl DerivedArtifact {
    /// A table loaded straight from `source_file`.
    pub fn source(name: impl Into<String>, source_file: impl Into<String>, row_count: usize) -> Self {
        Self {
            name: name.into(),
            source_file: source_file.into(),
            row_count,
            kind: ArtifactKind::Source,
            parent_name: None,
            role: Role::Full,
            registered_at: Utc::now(),
        }
    }

    /// A table computed from `parent`.
    pub fn derived(
        name: impl Into<String>,
        parent: impl Into<String>,
        source_file: impl Into<String>,
        row_count: usize,
    ) -> Self {
        Self {
            name: name.into(),
            source_file: source_file.into(),
            row_count,
            kind: ArtifactKind::Derived,
            parent_name: Some(parent.into()),
            role: Role::Full,
            registered_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    /// An artifact of the same name was overwritten in place.
    Replaced,
}

#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    entries: Vec<DerivedArtifact>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- Mutation -----

    /// Insert `artifact`, or overwrite the entry with the same name while keeping
    /// its position.
    ///
    /// A derived artifact's parent must already be registered, and following
    /// parents from it must never lead back to the artifact itself.
    pub fn register(&mut self, artifact: DerivedArtifact) -> Result<RegisterOutcome> {
        if artifact.kind == ArtifactKind::Derived {
            if let Some(parent) = &artifact.parent_name {
                self.check_parent(&artifact.name, parent)?;
            }
        }

        let name = artifact.name.clone();
        match self.position(&name) {
            Some(idx) => {
                self.entries[idx] = artifact;
                tracing::info!(name = %name, "artifact replaced");
                Ok(RegisterOutcome::Replaced)
            }
            None => {
                tracing::info!(
                    name = %name,
                    kind = ?artifact.kind,
                    parent = ?artifact.parent_name,
                    role = %artifact.role,
                    "artifact registered"
                );
                self.entries.push(artifact);
                Ok(RegisterOutcome::Inserted)
            }
        }
    }

    fn check_parent(&self, name: &str, parent: &str) -> Result<()> {
        let invalid = |message: String| SyncError::InvalidArtifact {
            name: name.to_string(),
            message,
        };
        if !self.contains(parent) {
            return Err(invalid(format!("parent '{parent}' is not registered")));
        }
        let mut seen = HashSet::new();
        let mut cursor = Some(parent.to_string());
        while let Some(current) = cursor {
            if current == name {
                return Err(invalid(format!("parent '{parent}' would create a cycle")));
            }
            if !seen.insert(current.clone()) {
                break;
            }
            cursor = self.get(&current).and_then(|a| a.parent_name.clone());
        }
        Ok(())
    }

    /// Remove `name` and everything derived from it, directly or transitively.
    ///
    /// Returns the removed names, `name` first when it was present. Removing a name
    /// that is not registered removes only its orphaned descendants, if any.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        let mut doomed: Vec<String> = Vec::new();
        if self.contains(name) {
            doomed.push(name.to_string());
        }
        let mut queue = VecDeque::from([name.to_string()]);
        let mut visited = HashSet::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(&current) {
                if visited.insert(child.name.clone()) {
                    doomed.push(child.name.clone());
                    queue.push_back(child.name.clone());
                }
            }
        }

        if !doomed.is_empty() {
            self.entries.retain(|a| !doomed.contains(&a.name));
            tracing::info!(name = %name, removed = ?doomed, "artifact removed with descendants");
        }
        doomed
    }

    /// Drop `stale` names and their descendants. Returns every name dropped, in
    /// removal order.
    pub fn prune(&mut self, stale: &[String]) -> Vec<String> {
        let mut pruned: Vec<String> = Vec::new();
        for name in stale {
            for gone in self.remove(name) {
                if !pruned.contains(&gone) {
                    pruned.push(gone);
                }
            }
        }
        if !pruned.is_empty() {
            tracing::info!(stale = ?stale, pruned = ?pruned, "stale artifacts pruned");
        }
        pruned
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // ----- Reconciliation -----

    /// The subset of `names` the runtime no longer knows about. Does not modify
    /// the registry.
    pub async fn reconcile_against_runtime(
        &self,
        runtime: &dyn Runtime,
        names: &[String],
    ) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let existing = runtime.check_names_exist(names).await?;
        let stale: Vec<String> = names
            .iter()
            .filter(|n| !existing.contains(n))
            .cloned()
            .collect();
        if !stale.is_empty() {
            tracing::debug!(stale = ?stale, "runtime no longer has registered names");
        }
        Ok(stale)
    }

    // ----- Queries -----

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|a| a.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&DerivedArtifact> {
        self.entries.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|a| a.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DerivedArtifact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sources(&self) -> Vec<&DerivedArtifact> {
        self.entries
            .iter()
            .filter(|a| a.kind == ArtifactKind::Source)
            .collect()
    }

    pub fn with_role(&self, role: Role) -> Vec<&DerivedArtifact> {
        self.entries.iter().filter(|a| a.role == role).collect()
    }

    pub fn children_of(&self, name: &str) -> Vec<&DerivedArtifact> {
        self.entries
            .iter()
            .filter(|a| a.parent_name.as_deref() == Some(name))
            .collect()
    }

    /// Target artifacts that share a parent with `features`; every target when
    /// no features artifact is selected or it is unknown.
    pub fn targets_matching(&self, features: Option<&str>) -> Vec<&DerivedArtifact> {
        self.matching_role(Role::Target, features)
    }

    /// Feature artifacts that share a parent with `target`; every features
    /// artifact when no target is selected or it is unknown.
    pub fn features_matching(&self, target: Option<&str>) -> Vec<&DerivedArtifact> {
        self.matching_role(Role::Features, target)
    }

    fn matching_role(&self, role: Role, partner: Option<&str>) -> Vec<&DerivedArtifact> {
        let parent = partner
            .and_then(|name| self.get(name))
            .map(|a| a.parent_name.clone());
        self.with_role(role)
            .into_iter()
            .filter(|a| parent.as_ref().map_or(true, |p| &a.parent_name == p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ArtifactRegistry {
        let mut reg = ArtifactRegistry::new();
        reg.register(DerivedArtifact::source("df", "houses.csv", 100)).unwrap();
        reg.register(DerivedArtifact::derived("train_df", "df", "houses.csv", 80)).unwrap();
        reg.register(DerivedArtifact::derived("test_df", "df", "houses.csv", 20)).unwrap();
        reg.register(
            DerivedArtifact::derived("X", "train_df", "houses.csv", 80).with_role(Role::Features),
        )
        .unwrap();
        reg.register(
            DerivedArtifact::derived("y", "train_df", "houses.csv", 80).with_role(Role::Target),
        )
        .unwrap();
        reg
    }

    // --- register ---

    #[test]
    fn overwrite_keeps_position_and_reports_replace() {
        let mut reg = chain();
        let outcome = reg
            .register(DerivedArtifact::derived("train_df", "df", "houses.csv", 75))
            .unwrap();
        assert_eq!(outcome, RegisterOutcome::Replaced);
        assert_eq!(reg.names(), vec!["df", "train_df", "test_df", "X", "y"]);
        assert_eq!(reg.get("train_df").unwrap().row_count, 75);
    }

    #[test]
    fn missing_parent_is_rejected() {
        let mut reg = ArtifactRegistry::new();
        let err = reg
            .register(DerivedArtifact::derived("X", "nowhere", "a.csv", 1))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArtifact { ref name, .. } if name == "X"));
        assert!(reg.is_empty());
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let mut reg = chain();
        // df would become a descendant of its own grandchild.
        let err = reg
            .register(DerivedArtifact::derived("df", "X", "houses.csv", 100))
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
        let err = reg
            .register(DerivedArtifact::derived("solo", "solo", "a.csv", 1))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArtifact { .. }));
        assert_eq!(reg.get("df").unwrap().kind, ArtifactKind::Source);
    }

    // --- remove ---

    #[test]
    fn remove_cascades_transitively() {
        let mut reg = chain();
        let removed = reg.remove("train_df");
        assert_eq!(removed, vec!["train_df", "X", "y"]);
        assert_eq!(reg.names(), vec!["df", "test_df"]);

        let removed = reg.remove("df");
        assert_eq!(removed, vec!["df", "test_df"]);
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut reg = chain();
        reg.remove("X");
        assert!(reg.remove("X").is_empty());
        assert!(reg.remove("never").is_empty());
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn prune_takes_descendants_along() {
        let mut reg = chain();
        let pruned = reg.prune(&["train_df".to_string(), "ghost".to_string()]);
        assert_eq!(pruned, vec!["train_df", "X", "y"]);
        assert_eq!(reg.names(), vec!["df", "test_df"]);
        // No survivor points at a missing parent.
        for artifact in reg.iter() {
            if let Some(parent) = &artifact.parent_name {
                assert!(reg.contains(parent), "{} orphaned", artifact.name);
            }
        }
    }

    #[test]
    fn prune_reports_each_name_once() {
        let mut reg = chain();
        let pruned = reg.prune(&["df".to_string(), "X".to_string()]);
        assert_eq!(pruned.len(), 5);
        assert!(reg.is_empty());
    }

    // --- queries ---

    #[test]
    fn role_and_lineage_queries() {
        let reg = chain();
        assert_eq!(reg.sources().len(), 1);
        assert_eq!(reg.with_role(Role::Full).len(), 3);
        let children: Vec<_> = reg.children_of("df").iter().map(|a| a.name.as_str()).collect();
        assert_eq!(children, vec!["train_df", "test_df"]);
    }

    #[test]
    fn linked_pickers_match_on_shared_parent() {
        let mut reg = chain();
        reg.register(
            DerivedArtifact::derived("X_test", "test_df", "houses.csv", 20).with_role(Role::Features),
        )
        .unwrap();
        reg.register(
            DerivedArtifact::derived("y_test", "test_df", "houses.csv", 20).with_role(Role::Target),
        )
        .unwrap();

        let names = |v: Vec<&DerivedArtifact>| v.iter().map(|a| a.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(reg.targets_matching(Some("X_test"))), vec!["y_test"]);
        assert_eq!(names(reg.features_matching(Some("y"))), vec!["X"]);
        assert_eq!(names(reg.targets_matching(None)), vec!["y", "y_test"]);
    }
}
