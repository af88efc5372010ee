//! Features / target step: select feature columns into one table and the target
//! column into a series.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, Role, StepKind};

use crate::codec::StepCodec;
use crate::pylit::{self, pattern, STRING_LITERAL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesTargetParams {
    pub source_var: String,
    /// Empty when no target has been chosen yet.
    pub target_column: String,
    pub feature_columns: Vec<String>,
    pub features_var_name: String,
    pub target_var_name: String,
}

impl Default for FeaturesTargetParams {
    fn default() -> Self {
        Self {
            source_var: "df".into(),
            target_column: String::new(),
            feature_columns: Vec::new(),
            features_var_name: "X".into(),
            target_var_name: "y".into(),
        }
    }
}

impl FeaturesTargetParams {
    fn is_candidate(&self, column: &str) -> bool {
        column != self.target_column && !self.feature_columns.iter().any(|c| c == column)
    }

    /// Append the first column in `available` that is neither the target nor
    /// already selected. Returns `false` when nothing is left to add.
    pub fn add_feature_column(&mut self, available: &[String]) -> bool {
        match available.iter().find(|c| self.is_candidate(c)) {
            Some(column) => {
                self.feature_columns.push(column.clone());
                true
            }
            None => false,
        }
    }

    pub fn remove_feature_column(&mut self, index: usize) {
        if index < self.feature_columns.len() {
            self.feature_columns.remove(index);
        }
    }

    pub fn replace_feature_column(&mut self, index: usize, column: impl Into<String>) {
        if let Some(slot) = self.feature_columns.get_mut(index) {
            *slot = column.into();
        }
    }

    /// With no features selected yet, start from the first non-target column.
    pub fn seed_first_feature(&mut self, available: &[String]) {
        if !self.feature_columns.is_empty() {
            return;
        }
        if let Some(first) = available.iter().find(|c| **c != self.target_column) {
            self.feature_columns.push(first.clone());
        }
    }
}

pub struct FeaturesTargetCodec;

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

static SUBSCRIPT: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*\w+\s*=\s*(\w+)\["));
static FEATURE_LIST: Lazy<Regex> = Lazy::new(|| {
    pattern(&format!(
        r#"\bfeature_cols\s*=\s*\[((?:[^\]'"]|{STRING_LITERAL})*)\]"#
    ))
});
static EMPTY_FEATURES: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*\w+\s*=\s*\w+\[\s*\[\s*\]\s*\]"));
static FEATURES_VAR: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?m)^[ \t]*(\w+)\s*=\s*\w+\[\s*(?:feature_cols|\[\s*\])\s*\]")
});
static TARGET: Lazy<Regex> = Lazy::new(|| {
    pattern(&format!(r"(?m)^[ \t]*(\w+)\s*=\s*\w+\[\s*{STRING_LITERAL}\s*\]"))
});
static NO_TARGET: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*(\w+)\s*=\s*None\b"));

fn extract_source_var(source: &str) -> Option<String> {
    SUBSCRIPT.captures(source).map(|c| c[1].to_string())
}

fn extract_feature_columns(source: &str) -> Option<Vec<String>> {
    if let Some(caps) = FEATURE_LIST.captures(source) {
        return Some(pylit::all_literals(&caps[1]));
    }
    EMPTY_FEATURES.is_match(source).then(Vec::new)
}

fn extract_features_var(source: &str) -> Option<String> {
    FEATURES_VAR.captures(source).map(|c| c[1].to_string())
}

/// `(variable, column)`; an explicit `= None` assignment means no target column.
fn extract_target(source: &str) -> Option<(String, String)> {
    if let Some(caps) = TARGET.captures(source) {
        let column = pylit::literal_body(&caps, 2)?;
        return Some((caps[1].to_string(), column));
    }
    NO_TARGET
        .captures(source)
        .map(|c| (c[1].to_string(), String::new()))
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl StepCodec for FeaturesTargetCodec {
    type Params = FeaturesTargetParams;

    const KIND: StepKind = StepKind::FeaturesTarget;

    fn generate(params: &FeaturesTargetParams) -> String {
        let src = pylit::sanitize_identifier(&params.source_var, "df");
        let features = pylit::sanitize_identifier(&params.features_var_name, "X");
        let target = pylit::sanitize_identifier(&params.target_var_name, "y");

        let mut lines = vec![
            "import pandas as pd".to_string(),
            String::new(),
            format!("# Split {src} into features and target"),
        ];
        if params.feature_columns.is_empty() {
            lines.push(format!("{features} = {src}[[]]  # No features selected"));
        } else {
            let list: Vec<String> = params
                .feature_columns
                .iter()
                .map(|c| pylit::quote_single(c))
                .collect();
            lines.push(format!("feature_cols = [{}]", list.join(", ")));
            lines.push(format!("{features} = {src}[feature_cols]"));
        }
        if params.target_column.is_empty() {
            lines.push(format!("{target} = None  # No target selected"));
        } else {
            lines.push(format!(
                "{target} = {src}[{}]",
                pylit::quote_single(&params.target_column)
            ));
        }
        lines.join("\n")
    }

    fn parse(source: &str, current: &FeaturesTargetParams) -> Option<FeaturesTargetParams> {
        let source_var = extract_source_var(source)?;
        let mut params = current.clone();
        params.source_var = source_var;
        if let Some(columns) = extract_feature_columns(source) {
            params.feature_columns = columns;
        }
        if let Some(var) = extract_features_var(source) {
            params.features_var_name = var;
        }
        if let Some((var, column)) = extract_target(source) {
            params.target_var_name = var;
            params.target_column = column;
        }
        Some(params)
    }

    fn context(params: &FeaturesTargetParams) -> DataframeContext {
        // Names as they appear in the generated code, which is what the runtime reports.
        DataframeContext::derived(pylit::sanitize_identifier(&params.source_var, "df"))
            .with_role_for(
                pylit::sanitize_identifier(&params.features_var_name, "X"),
                Role::Features,
            )
            .with_role_for(
                pylit::sanitize_identifier(&params.target_var_name, "y"),
                Role::Target,
            )
    }
}
