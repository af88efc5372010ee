//! Cleaning step: copy a table and apply one column operation to the copy.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, StepKind};

use crate::codec::StepCodec;
use crate::pylit::{self, pattern, STRING_LITERAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanOperation {
    /// Cast the column to `target_dtype`.
    #[default]
    Dtype,
    /// Fill missing values using `fill_strategy`.
    Fill,
    /// Drop rows where the column is missing.
    Drop,
}

impl fmt::Display for CleanOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CleanOperation::Dtype => "dtype",
            CleanOperation::Fill => "fill",
            CleanOperation::Drop => "drop",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    Mean,
    Median,
    Mode,
    Ffill,
    Bfill,
    Constant,
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FillStrategy::Mean => "mean",
            FillStrategy::Median => "median",
            FillStrategy::Mode => "mode",
            FillStrategy::Ffill => "ffill",
            FillStrategy::Bfill => "bfill",
            FillStrategy::Constant => "constant",
        })
    }
}

/// How a constant fill value is written into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillValueKind {
    /// Numbers and `True`/`False`/`None` as-is, anything else quoted.
    #[default]
    Auto,
    /// Always a string literal, even when the text looks like a number.
    Text,
    /// Written verbatim, e.g. `np.nan`.
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanParams {
    pub source_var: String,
    pub column: String,
    pub operation: CleanOperation,
    pub target_dtype: String,
    pub fill_strategy: FillStrategy,
    /// Constant used by [`FillStrategy::Constant`], rendered per `fill_value_kind`.
    pub fill_value: String,
    pub fill_value_kind: FillValueKind,
    pub output_var: String,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            source_var: "df".into(),
            column: String::new(),
            operation: CleanOperation::Dtype,
            target_dtype: "float64".into(),
            fill_strategy: FillStrategy::Mean,
            fill_value: String::new(),
            fill_value_kind: FillValueKind::Auto,
            output_var: "df_clean".into(),
        }
    }
}

pub struct CleanCodec;

/// `true` when `value` can be written bare under [`FillValueKind::Auto`].
fn is_bare_literal(value: &str) -> bool {
    matches!(value, "True" | "False" | "None")
        || (NUMBER.is_match(value) && !LEADING_ZERO_INT.is_match(value))
}

/// Render a constant fill value as a Python expression.
fn fill_literal(value: &str, kind: FillValueKind) -> String {
    match kind {
        FillValueKind::Expression => value.to_string(),
        FillValueKind::Auto if is_bare_literal(value) => value.to_string(),
        FillValueKind::Auto | FillValueKind::Text => pylit::quote_single(value),
    }
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

static COPY: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*(\w+)\s*=\s*(\w+)\.copy\(\s*\)"));
static ASTYPE: Lazy<Regex> = Lazy::new(|| {
    pattern(&format!(
        r"\w+\[\s*{STRING_LITERAL}\s*\]\.astype\(\s*{STRING_LITERAL}\s*\)"
    ))
});
static FILLNA: Lazy<Regex> = Lazy::new(|| {
    pattern(&format!(r"(?m)\w+\[\s*{STRING_LITERAL}\s*\]\.fillna\((.*)\)[ \t]*$"))
});
static FORWARD_BACKWARD: Lazy<Regex> = Lazy::new(|| {
    pattern(&format!(r"\w+\[\s*{STRING_LITERAL}\s*\]\.(ffill|bfill)\(\s*\)"))
});
static NO_FILL_VALUE: Lazy<Regex> =
    Lazy::new(|| pattern(&format!(r"#\s*No fill value provided for\s+{STRING_LITERAL}")));
static DROPNA: Lazy<Regex> = Lazy::new(|| {
    pattern(&format!(r"\.dropna\(\s*subset\s*=\s*\[\s*{STRING_LITERAL}"))
});
static INPLACE: Lazy<Regex> = Lazy::new(|| pattern(r"\s*,\s*inplace\s*=\s*True\s*$"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| pattern(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$"));
// Python 3 rejects `007`; `0`, `00` and `0.7` are fine.
static LEADING_ZERO_INT: Lazy<Regex> = Lazy::new(|| pattern(r"^[+-]?0+[1-9]\d*$"));
static WHOLE_LITERAL: Lazy<Regex> = Lazy::new(|| pattern(&format!(r"^{STRING_LITERAL}$")));

/// `(output, source)` from the `out = src.copy()` anchor.
fn extract_copy(source: &str) -> Option<(String, String)> {
    COPY.captures(source)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

fn extract_astype(source: &str) -> Option<(String, String)> {
    let caps = ASTYPE.captures(source)?;
    Some((pylit::literal_body(&caps, 1)?, pylit::literal_body(&caps, 3)?))
}

/// A constant fill value and the kind that regenerates it in the same form.
type FillConstant = (String, FillValueKind);

/// Strategy and constant carried by a `fillna(...)` argument.
fn classify_fill_argument(argument: &str) -> (FillStrategy, Option<FillConstant>) {
    let argument = INPLACE.replace(argument.trim(), "");
    if argument.contains(".mean()") {
        (FillStrategy::Mean, None)
    } else if argument.contains(".median()") {
        (FillStrategy::Median, None)
    } else if argument.contains(".mode()") {
        (FillStrategy::Mode, None)
    } else if argument.contains("method='ffill'") || argument.contains("method=\"ffill\"") {
        (FillStrategy::Ffill, None)
    } else if argument.contains("method='bfill'") || argument.contains("method=\"bfill\"") {
        (FillStrategy::Bfill, None)
    } else {
        let constant = match WHOLE_LITERAL.captures(&argument) {
            Some(caps) => {
                let body = pylit::literal_body(&caps, 1).unwrap_or_default();
                let kind = if is_bare_literal(&body) {
                    FillValueKind::Text
                } else {
                    FillValueKind::Auto
                };
                (body, kind)
            }
            None => {
                let expr = argument.trim().to_string();
                let kind = if is_bare_literal(&expr) {
                    FillValueKind::Auto
                } else {
                    FillValueKind::Expression
                };
                (expr, kind)
            }
        };
        (FillStrategy::Constant, Some(constant))
    }
}

/// `(column, strategy, constant)` for any of the fill forms.
fn extract_fill(source: &str) -> Option<(String, FillStrategy, Option<FillConstant>)> {
    if let Some(caps) = FILLNA.captures(source) {
        let column = pylit::literal_body(&caps, 1)?;
        let (strategy, value) = classify_fill_argument(&caps[3]);
        return Some((column, strategy, value));
    }
    if let Some(caps) = FORWARD_BACKWARD.captures(source) {
        let column = pylit::literal_body(&caps, 1)?;
        let strategy = if &caps[3] == "ffill" {
            FillStrategy::Ffill
        } else {
            FillStrategy::Bfill
        };
        return Some((column, strategy, None));
    }
    NO_FILL_VALUE.captures(source).and_then(|caps| {
        let column = pylit::literal_body(&caps, 1)?;
        Some((
            column,
            FillStrategy::Constant,
            Some((String::new(), FillValueKind::Auto)),
        ))
    })
}

fn extract_drop_column(source: &str) -> Option<String> {
    DROPNA
        .captures(source)
        .and_then(|c| pylit::literal_body(&c, 1))
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl StepCodec for CleanCodec {
    type Params = CleanParams;

    const KIND: StepKind = StepKind::Clean;

    fn generate(params: &CleanParams) -> String {
        let src = pylit::sanitize_identifier(&params.source_var, "df");
        let out = pylit::sanitize_identifier(&params.output_var, "df_clean");
        let col = pylit::quote_single(&params.column);
        let cell = format!("{out}[{col}]");

        let mut lines = vec![
            "import pandas as pd".to_string(),
            "import numpy as np".to_string(),
            String::new(),
            format!("# Clean data: {} on column {col}", params.operation),
            format!("{out} = {src}.copy()"),
            String::new(),
        ];

        match params.operation {
            CleanOperation::Dtype => {
                lines.push(format!(
                    "# Convert column {col} to {}",
                    params.target_dtype.trim().replace(['\n', '\r'], " ")
                ));
                lines.push(format!(
                    "{cell} = {cell}.astype({})",
                    pylit::quote_single(&params.target_dtype)
                ));
            }
            CleanOperation::Fill => {
                lines.push(format!(
                    "# Fill missing values in {col} using {}",
                    params.fill_strategy
                ));
                let line = match params.fill_strategy {
                    FillStrategy::Mean => format!("{cell} = {cell}.fillna({cell}.mean())"),
                    FillStrategy::Median => format!("{cell} = {cell}.fillna({cell}.median())"),
                    FillStrategy::Mode => format!("{cell} = {cell}.fillna({cell}.mode()[0])"),
                    FillStrategy::Ffill => format!("{cell} = {cell}.ffill()"),
                    FillStrategy::Bfill => format!("{cell} = {cell}.bfill()"),
                    FillStrategy::Constant if params.fill_value.is_empty() => {
                        format!("# No fill value provided for {col}")
                    }
                    FillStrategy::Constant => {
                        format!("{cell} = {cell}.fillna({})", fill_literal(&params.fill_value, params.fill_value_kind))
                    }
                };
                lines.push(line);
            }
            CleanOperation::Drop => {
                lines.push(format!("# Drop rows with missing values in {col}"));
                lines.push(format!("{out} = {out}.dropna(subset=[{col}])"));
            }
        }

        lines.join("\n")
    }

    fn parse(source: &str, current: &CleanParams) -> Option<CleanParams> {
        let (output_var, source_var) = extract_copy(source)?;
        let mut params = current.clone();
        params.output_var = output_var;
        params.source_var = source_var;

        if let Some((column, dtype)) = extract_astype(source) {
            params.operation = CleanOperation::Dtype;
            params.column = column;
            params.target_dtype = dtype;
        } else if let Some((column, strategy, value)) = extract_fill(source) {
            params.operation = CleanOperation::Fill;
            params.column = column;
            params.fill_strategy = strategy;
            if let Some((value, kind)) = value {
                params.fill_value = value;
                params.fill_value_kind = kind;
            }
        } else if let Some(column) = extract_drop_column(source) {
            params.operation = CleanOperation::Drop;
            params.column = column;
        }
        Some(params)
    }

    fn context(params: &CleanParams) -> DataframeContext {
        DataframeContext::derived(pylit::sanitize_identifier(&params.source_var, "df"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(strategy: FillStrategy, value: &str) -> CleanParams {
        CleanParams {
            column: "age".into(),
            operation: CleanOperation::Fill,
            fill_strategy: strategy,
            fill_value: value.into(),
            ..CleanParams::default()
        }
    }

    #[test]
    fn generates_dtype_cast() {
        let params = CleanParams {
            column: "price".into(),
            ..CleanParams::default()
        };
        assert_eq!(
            CleanCodec::generate(&params),
            "import pandas as pd\n\
             import numpy as np\n\
             \n\
             # Clean data: dtype on column 'price'\n\
             df_clean = df.copy()\n\
             \n\
             # Convert column 'price' to float64\n\
             df_clean['price'] = df_clean['price'].astype('float64')"
        );
    }

    #[test]
    fn every_fill_strategy_round_trips() {
        for strategy in [
            FillStrategy::Mean,
            FillStrategy::Median,
            FillStrategy::Mode,
            FillStrategy::Ffill,
            FillStrategy::Bfill,
        ] {
            let params = fill(strategy, "");
            let parsed = CleanCodec::parse_default(&CleanCodec::generate(&params)).unwrap();
            assert_eq!(parsed, params, "{strategy}");
        }
    }

    #[test]
    fn constant_fill_values_keep_their_form() {
        for value in ["0", "-1.5", "None", "unknown", "it's"] {
            let params = fill(FillStrategy::Constant, value);
            let code = CleanCodec::generate(&params);
            let parsed = CleanCodec::parse_default(&code).unwrap();
            assert_eq!(parsed, params, "{code}");
        }
        assert!(CleanCodec::generate(&fill(FillStrategy::Constant, "0")).contains(".fillna(0)"));
        assert!(CleanCodec::generate(&fill(FillStrategy::Constant, "n/a")).contains(".fillna('n/a')"));
    }

    #[test]
    fn hand_written_expressions_are_not_quoted() {
        for expr in ["np.nan", "-np.inf"] {
            let code = format!("out = df.copy()\nout['a'] = out['a'].fillna({expr})");
            let parsed = CleanCodec::parse_default(&code).unwrap();
            assert_eq!(parsed.fill_value, expr);
            assert_eq!(parsed.fill_value_kind, FillValueKind::Expression);
            let regenerated = CleanCodec::generate(&parsed);
            assert!(regenerated.ends_with(&format!(".fillna({expr})")), "{regenerated}");
            assert_eq!(CleanCodec::parse_default(&regenerated), Some(parsed));
        }
    }

    #[test]
    fn quoted_numbers_stay_strings() {
        let code = "out = df.copy()\nout['a'] = out['a'].fillna('0')";
        let parsed = CleanCodec::parse_default(code).unwrap();
        assert_eq!(parsed.fill_value, "0");
        assert_eq!(parsed.fill_value_kind, FillValueKind::Text);
        assert!(CleanCodec::generate(&parsed).ends_with(".fillna('0')"));
    }

    #[test]
    fn leading_zero_integers_are_quoted() {
        let params = fill(FillStrategy::Constant, "007");
        let code = CleanCodec::generate(&params);
        assert!(code.ends_with("['age'].fillna('007')"), "{code}");
        assert_eq!(CleanCodec::parse_default(&code), Some(params));
        for bare in ["0", "00", "0.7", "-0"] {
            let code = CleanCodec::generate(&fill(FillStrategy::Constant, bare));
            assert!(code.ends_with(&format!(".fillna({bare})")), "{code}");
        }
    }

    #[test]
    fn constant_without_value_is_a_comment() {
        let params = fill(FillStrategy::Constant, "");
        let code = CleanCodec::generate(&params);
        assert!(code.ends_with("# No fill value provided for 'age'"));
        assert!(!code.contains(".fillna("));
        assert_eq!(CleanCodec::parse_default(&code), Some(params));
    }

    #[test]
    fn drop_round_trips() {
        let params = CleanParams {
            source_var: "train_df".into(),
            output_var: "train_clean".into(),
            column: "income".into(),
            operation: CleanOperation::Drop,
            ..CleanParams::default()
        };
        let code = CleanCodec::generate(&params);
        assert!(code.contains("train_clean = train_clean.dropna(subset=['income'])"));
        assert_eq!(CleanCodec::parse_default(&code), Some(params));
    }

    #[test]
    fn legacy_inplace_fill_is_understood() {
        let code = "out = df.copy()\n\
                    out['a'].fillna(out['a'].median(), inplace=True)\n";
        let parsed = CleanCodec::parse_default(code).unwrap();
        assert_eq!(parsed.operation, CleanOperation::Fill);
        assert_eq!(parsed.fill_strategy, FillStrategy::Median);
        assert_eq!(parsed.column, "a");

        let code = "out = df.copy()\nout['a'].fillna(method='bfill', inplace=True)";
        assert_eq!(
            CleanCodec::parse_default(code).unwrap().fill_strategy,
            FillStrategy::Bfill
        );

        let code = "out = df.copy()\nout['a'].fillna(7, inplace=True)";
        assert_eq!(CleanCodec::parse_default(code).unwrap().fill_value, "7");
    }

    #[test]
    fn copy_without_operation_keeps_current_operation() {
        let current = fill(FillStrategy::Mode, "");
        let parsed = CleanCodec::parse("tidy = raw.copy()", &current).unwrap();
        assert_eq!(parsed.output_var, "tidy");
        assert_eq!(parsed.source_var, "raw");
        assert_eq!(parsed.operation, CleanOperation::Fill);
        assert_eq!(parsed.fill_strategy, FillStrategy::Mode);
    }

    #[test]
    fn no_anchor_is_a_miss() {
        assert_eq!(CleanCodec::parse_default(""), None);
        assert_eq!(
            CleanCodec::parse_default("df['a'] = df['a'].astype('int64')"),
            None
        );
    }
}
