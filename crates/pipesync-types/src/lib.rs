//! Shared types, errors, provenance, and typed runtime results for pipesync.
//!
//! This crate provides the foundational types used across the other pipesync crates:
//! - `SyncError`: unified error taxonomy
//! - `StepKind`: the pipeline step kinds that own a parameter codec
//! - `ArtifactKind` / `Role` / `DataframeContext`: provenance tagging for executed code
//! - `TypedResult`: runtime results, decoded once at the runtime boundary

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unified error type for all pipesync subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // === Runtime Errors ===
    /// The external runtime rejected or failed to run the source. The message is
    /// shown to the user exactly as the runtime produced it.
    #[error("{message}")]
    Execution { message: String },

    #[error("Runtime call '{call}' failed: {message}")]
    RuntimeCall { call: String, message: String },

    #[error("Malformed runtime result for '{name}': {message}")]
    MalformedResult { name: String, message: String },

    // === Registry Errors ===
    #[error("Invalid artifact '{name}': {message}")]
    InvalidArtifact { name: String, message: String },

    // === Codec Errors ===
    #[error("Unknown step kind '{0}'")]
    UnknownStepKind(String),

    #[error("Invalid parameters for step '{step}': {message}")]
    InvalidParams { step: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Shorthand for an execution failure carrying the runtime's message.
    pub fn execution(message: impl Into<String>) -> Self {
        SyncError::Execution {
            message: message.into(),
        }
    }

    /// Returns `true` for failures that come from the external runtime rather than
    /// from local state.
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            SyncError::Execution { .. }
                | SyncError::RuntimeCall { .. }
                | SyncError::MalformedResult { .. }
        )
    }

    /// The text to put in front of the user for this error.
    pub fn display_message(&self) -> String {
        match self {
            SyncError::Execution { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// A convenience alias for `Result<T, SyncError>`.
pub type Result<T> = std::result::Result<T, SyncError>;

// ---------------------------------------------------------------------------
// StepKind: the pipeline stages that carry a parameter codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ReadCsv,
    Split,
    FeaturesTarget,
    Inspection,
    Clean,
    LinearRegression,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::ReadCsv,
        StepKind::Split,
        StepKind::FeaturesTarget,
        StepKind::Inspection,
        StepKind::Clean,
        StepKind::LinearRegression,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ReadCsv => "read_csv",
            StepKind::Split => "split",
            StepKind::FeaturesTarget => "features_target",
            StepKind::Inspection => "inspection",
            StepKind::Clean => "clean",
            StepKind::LinearRegression => "linear_regression",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        StepKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| SyncError::UnknownStepKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Provenance: where a named table came from and what it is for
// ---------------------------------------------------------------------------

/// Whether an artifact was loaded straight from a file or computed from another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Source,
    Derived,
}

/// What a tabular artifact is used for downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Full,
    Features,
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Full => f.write_str("full"),
            Role::Features => f.write_str("features"),
            Role::Target => f.write_str("target"),
        }
    }
}

/// Provenance tagging applied to every table a step's code produces.
///
/// `role_map` overrides `role` for specific output names (the features/target step
/// produces one of each).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataframeContext {
    pub kind: ArtifactKind,
    pub parent: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub role_map: BTreeMap<String, Role>,
}

impl DataframeContext {
    /// Context for tables loaded directly from an input file.
    pub fn source() -> Self {
        Self {
            kind: ArtifactKind::Source,
            parent: None,
            role: Role::Full,
            role_map: BTreeMap::new(),
        }
    }

    /// Context for tables computed from `parent`.
    pub fn derived(parent: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Derived,
            parent: Some(parent.into()),
            role: Role::Full,
            role_map: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_role_for(mut self, name: impl Into<String>, role: Role) -> Self {
        self.role_map.insert(name.into(), role);
        self
    }

    /// The role an output called `name` gets under this context.
    pub fn role_for(&self, name: &str) -> Role {
        self.role_map.get(name).copied().unwrap_or(self.role)
    }
}

// ---------------------------------------------------------------------------
// TypedResult: runtime output, decided at the boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypedResult {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
        shape: Vec<usize>,
    },
    Series {
        name: String,
        values: Vec<serde_json::Value>,
        shape: Vec<usize>,
    },
    Array {
        values: Vec<serde_json::Value>,
        shape: Vec<usize>,
        element_type: String,
    },
    Scalar {
        value: serde_json::Value,
    },
}

impl TypedResult {
    /// `true` for tables and series, the results the artifact registry tracks.
    pub fn is_tabular(&self) -> bool {
        matches!(self, TypedResult::Table { .. } | TypedResult::Series { .. })
    }

    /// Full row count reported by the runtime (not the truncated preview length).
    pub fn row_count(&self) -> Option<usize> {
        match self {
            TypedResult::Table { shape, .. }
            | TypedResult::Series { shape, .. }
            | TypedResult::Array { shape, .. } => shape.first().copied(),
            TypedResult::Scalar { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TypedResult::Table { .. } => "table",
            TypedResult::Series { .. } => "series",
            TypedResult::Array { .. } => "array",
            TypedResult::Scalar { .. } => "scalar",
        }
    }
}

/// Named results of one execution, ordered by name.
pub type ExecutionResults = BTreeMap<String, TypedResult>;
