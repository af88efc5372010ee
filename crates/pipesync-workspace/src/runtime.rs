//! The external execution runtime seam and the decoder for its result payload.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pipesync_types::{ExecutionResults, Result, SyncError, TypedResult};

/// An input file made available to the runtime under `name` before the source runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    pub name: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub source_text: String,
    pub input: Option<InputData>,
}

impl RunRequest {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: Option<InputData>) -> Self {
        self.input = input;
        self
    }
}

/// Abstraction over the interpreter that actually runs step source.
///
/// The runtime keeps one namespace for the whole session. Everything the
/// workspace knows about that namespace is a cache, so names can disappear
/// behind its back (interpreter restart, manual `del`).
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run `request.source_text` and return the named results it produced.
    ///
    /// A failure of the code itself is `SyncError::Execution` carrying the
    /// interpreter's message unchanged.
    async fn run_code(&self, request: &RunRequest) -> Result<ExecutionResults>;

    /// The subset of `names` that still refer to a table or series.
    async fn check_names_exist(&self, names: &[String]) -> Result<Vec<String>>;

    /// Column labels of `name`, or an empty list when it is not a table.
    async fn get_columns(&self, name: &str) -> Result<Vec<String>>;

    /// Remove `name` from the namespace. Absent names are not an error.
    async fn delete_name(&self, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Wire decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireResult {
    Dataframe {
        columns: Vec<Value>,
        data: Vec<Vec<Value>>,
        shape: Vec<usize>,
    },
    Series {
        #[serde(default)]
        name: Option<Value>,
        data: Vec<Value>,
        shape: Vec<usize>,
    },
    Array {
        data: Vec<Value>,
        shape: Vec<usize>,
        #[serde(default = "default_dtype")]
        dtype: String,
    },
}

fn default_dtype() -> String {
    "object".to_string()
}

/// Column and series labels may be numbers in pandas; they become their JSON text.
fn label(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn malformed(name: &str, message: impl Into<String>) -> SyncError {
    SyncError::MalformedResult {
        name: name.to_string(),
        message: message.into(),
    }
}

fn decode_entry(name: &str, value: Value) -> Result<TypedResult> {
    match value {
        Value::Object(map) if map.contains_key("type") => {
            let wire: WireResult = serde_json::from_value(Value::Object(map))
                .map_err(|e| malformed(name, e.to_string()))?;
            Ok(match wire {
                WireResult::Dataframe {
                    columns,
                    data,
                    shape,
                } => TypedResult::Table {
                    columns: columns.into_iter().map(label).collect(),
                    rows: data,
                    shape,
                },
                WireResult::Series {
                    name: series_name,
                    data,
                    shape,
                } => TypedResult::Series {
                    name: match series_name {
                        None | Some(Value::Null) => name.to_string(),
                        Some(v) => label(v),
                    },
                    values: data,
                    shape,
                },
                WireResult::Array { data, shape, dtype } => TypedResult::Array {
                    values: data,
                    shape,
                    element_type: dtype,
                },
            })
        }
        Value::Object(_) => Err(malformed(name, "object without a 'type' field")),
        Value::Array(_) => Err(malformed(name, "bare list is not a runtime result")),
        scalar => Ok(TypedResult::Scalar { value: scalar }),
    }
}

/// Decode the runtime's JSON payload (an object of named results) into typed
/// results. This is the only place the untyped shape is inspected.
pub fn decode_results(payload: Value) -> Result<ExecutionResults> {
    let Value::Object(entries) = payload else {
        return Err(malformed("<results>", "expected an object of named results"));
    };
    entries
        .into_iter()
        .map(|(name, value)| {
            let decoded = decode_entry(&name, value)?;
            Ok((name, decoded))
        })
        .collect()
}
