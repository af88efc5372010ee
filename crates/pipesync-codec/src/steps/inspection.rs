//! Inspection step: dtypes, leading rows and summary statistics of one table.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, StepKind};

use crate::codec::StepCodec;
use crate::pylit::{self, pattern};

/// Rows shown by `DataFrame.head()` when called without an argument.
const PANDAS_HEAD_DEFAULT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionParams {
    pub source_var: String,
    pub show_describe: bool,
    pub show_head: bool,
    pub show_dtypes: bool,
    pub head_rows: u32,
}

impl Default for InspectionParams {
    fn default() -> Self {
        Self {
            source_var: "df".into(),
            show_describe: true,
            show_head: true,
            show_dtypes: true,
            head_rows: PANDAS_HEAD_DEFAULT,
        }
    }
}

pub struct InspectionCodec;

static HEADER: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*#\s*Inspect\s+(\w+)"));
static DTYPES: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*\w+\s*=\s*(\w+)\.dtypes\b"));
static HEAD: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*\w+\s*=\s*(\w+)\.head\(\s*(\d*)\s*\)"));
static DESCRIBE: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*\w+\s*=\s*(\w+)\.describe\(\s*\)"));

fn extract_header_var(source: &str) -> Option<String> {
    HEADER.captures(source).map(|c| c[1].to_string())
}

fn extract_dtypes_var(source: &str) -> Option<String> {
    DTYPES.captures(source).map(|c| c[1].to_string())
}

/// `(variable, rows)`; rows is `None` when the literal does not fit.
fn extract_head(source: &str) -> Option<(String, Option<u32>)> {
    HEAD.captures(source).map(|c| {
        let rows = match &c[2] {
            "" => Some(PANDAS_HEAD_DEFAULT),
            digits => digits.parse().ok(),
        };
        (c[1].to_string(), rows)
    })
}

fn extract_describe_var(source: &str) -> Option<String> {
    DESCRIBE.captures(source).map(|c| c[1].to_string())
}

impl StepCodec for InspectionCodec {
    type Params = InspectionParams;

    const KIND: StepKind = StepKind::Inspection;

    fn generate(params: &InspectionParams) -> String {
        let src = pylit::sanitize_identifier(&params.source_var, "df");
        let mut sections = vec![format!("import pandas as pd\n\n# Inspect {src}")];
        if params.show_dtypes {
            sections.push(format!("# Data types\ndtypes = {src}.dtypes"));
        }
        if params.show_head {
            sections.push(format!("# First rows\nhead = {src}.head({})", params.head_rows));
        }
        if params.show_describe {
            sections.push(format!("# Statistical summary\ndescribe = {src}.describe()"));
        }
        sections.join("\n\n")
    }

    /// The three toggles follow the presence of their assignment lines; only the
    /// source name and row count fall back to `current`.
    fn parse(source: &str, current: &InspectionParams) -> Option<InspectionParams> {
        let header = extract_header_var(source);
        let dtypes = extract_dtypes_var(source);
        let head = extract_head(source);
        let describe = extract_describe_var(source);
        if header.is_none() && dtypes.is_none() && head.is_none() && describe.is_none() {
            return None;
        }

        let source_var = header
            .or_else(|| dtypes.clone())
            .or_else(|| head.as_ref().map(|(v, _)| v.clone()))
            .or_else(|| describe.clone())
            .unwrap_or_else(|| current.source_var.clone());

        Some(InspectionParams {
            source_var,
            show_describe: describe.is_some(),
            show_head: head.is_some(),
            show_dtypes: dtypes.is_some(),
            head_rows: head
                .and_then(|(_, rows)| rows)
                .unwrap_or(current.head_rows),
        })
    }

    fn context(params: &InspectionParams) -> DataframeContext {
        DataframeContext::derived(pylit::sanitize_identifier(&params.source_var, "df"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_all_sections() {
        assert_eq!(
            InspectionCodec::generate(&InspectionParams::default()),
            "import pandas as pd\n\
             \n\
             # Inspect df\n\
             \n\
             # Data types\n\
             dtypes = df.dtypes\n\
             \n\
             # First rows\n\
             head = df.head(5)\n\
             \n\
             # Statistical summary\n\
             describe = df.describe()"
        );
    }

    #[test]
    fn toggles_follow_present_lines() {
        let params = InspectionParams {
            source_var: "test_df".into(),
            show_describe: false,
            show_dtypes: false,
            head_rows: 12,
            ..InspectionParams::default()
        };
        let parsed = InspectionCodec::parse_default(&InspectionCodec::generate(&params)).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn header_alone_anchors_an_empty_inspection() {
        let params = InspectionParams {
            show_describe: false,
            show_head: false,
            show_dtypes: false,
            head_rows: 20,
            ..InspectionParams::default()
        };
        let code = InspectionCodec::generate(&params);
        let parsed = InspectionCodec::parse(&code, &params).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn assignment_without_header_anchors() {
        let parsed = InspectionCodec::parse_default("summary = sales.describe()").unwrap();
        assert_eq!(parsed.source_var, "sales");
        assert!(parsed.show_describe);
        assert!(!parsed.show_head);
    }

    #[test]
    fn bare_head_call_uses_pandas_default() {
        let current = InspectionParams {
            head_rows: 30,
            ..InspectionParams::default()
        };
        let parsed = InspectionCodec::parse("head = df.head()", &current).unwrap();
        assert_eq!(parsed.head_rows, 5);
    }

    #[test]
    fn no_anchor_is_a_miss() {
        assert_eq!(InspectionCodec::parse_default(""), None);
        assert_eq!(InspectionCodec::parse_default("df.head()"), None);
    }
}
