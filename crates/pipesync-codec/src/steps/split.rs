//! Row split step: cut one table into ordered train / validation / test slices.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, StepKind, SyncError};

use crate::codec::StepCodec;
use crate::normalize::{normalize_after_edit, SplitPlan};
use crate::pylit::{self, pattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitName {
    Train,
    Validation,
    Test,
}

impl SplitName {
    pub const ALL: [SplitName; 3] = [SplitName::Train, SplitName::Validation, SplitName::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Validation => "validation",
            SplitName::Test => "test",
        }
    }

    /// Name of the table this split produces.
    pub fn table_name(&self) -> String {
        format!("{}_df", self.as_str())
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, SyncError> {
        SplitName::ALL
            .iter()
            .copied()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| SyncError::InvalidParams {
                step: StepKind::Split.to_string(),
                message: format!("unknown split '{s}'"),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub source_var: String,
    pub train_percent: u32,
    pub validation_percent: u32,
    pub test_percent: u32,
    pub include_validation: bool,
    pub split_order: Vec<SplitName>,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            source_var: "df".into(),
            train_percent: 80,
            validation_percent: 0,
            test_percent: 20,
            include_validation: false,
            split_order: vec![SplitName::Train, SplitName::Test],
        }
    }
}

impl SplitParams {
    pub fn percent(&self, name: SplitName) -> u32 {
        match name {
            SplitName::Train => self.train_percent,
            SplitName::Validation => self.validation_percent,
            SplitName::Test => self.test_percent,
        }
    }

    pub fn set_percent(&mut self, name: SplitName, value: u32) {
        match name {
            SplitName::Train => self.train_percent = value,
            SplitName::Validation => self.validation_percent = value,
            SplitName::Test => self.test_percent = value,
        }
    }

    pub fn is_active(&self, name: SplitName) -> bool {
        name != SplitName::Validation || self.include_validation
    }

    /// `split_order` restricted to active splits, without duplicates, with any
    /// active split it forgot appended in canonical order.
    pub fn active_order(&self) -> Vec<SplitName> {
        let mut order: Vec<SplitName> = Vec::with_capacity(3);
        for name in self.split_order.iter().copied().chain(SplitName::ALL) {
            if self.is_active(name) && !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    /// Toggle the validation split, resetting to the 80/10/10 or 80/0/20 preset.
    pub fn with_validation(mut self, include: bool) -> Self {
        self.include_validation = include;
        self.train_percent = 80;
        if include {
            self.validation_percent = 10;
            self.test_percent = 10;
            self.split_order = vec![SplitName::Train, SplitName::Validation, SplitName::Test];
        } else {
            self.validation_percent = 0;
            self.test_percent = 20;
            self.split_order = vec![SplitName::Train, SplitName::Test];
        }
        self
    }

    /// Move the split at `from` to position `to` in `split_order`.
    /// Out-of-range positions leave the order unchanged.
    pub fn move_split(&mut self, from: usize, to: usize) {
        if from >= self.split_order.len() || to >= self.split_order.len() {
            return;
        }
        let moved = self.split_order.remove(from);
        self.split_order.insert(to, moved);
    }
}

pub struct SplitCodec;

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

static TOTAL_ROWS: Lazy<Regex> = Lazy::new(|| pattern(r"total_rows\s*=\s*len\(\s*(\w+)\s*\)"));
static SIZE_LINE: Lazy<Regex> = Lazy::new(|| {
    pattern(r"\b(train|validation|test)_size\s*=\s*int\(\s*total_rows\s*\*\s*([0-9]*\.?[0-9]*)\s*\)")
});
static TABLE_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| pattern(r"(?m)^[ \t]*(\w+)_df\s*="));

fn extract_source_var(source: &str) -> Option<String> {
    TOTAL_ROWS.captures(source).map(|c| c[1].to_string())
}

/// Percentage written on the `<name>_size` line, if present and readable.
fn extract_percent(source: &str, name: SplitName) -> Option<u32> {
    SIZE_LINE
        .captures_iter(source)
        .find(|c| &c[1] == name.as_str())
        .and_then(|c| pylit::fraction_to_percent(&c[2]))
}

/// Split order as the `<name>_df` assignments appear, known names only.
fn extract_order(source: &str) -> Option<Vec<SplitName>> {
    let mut order = Vec::new();
    for caps in TABLE_ASSIGNMENT.captures_iter(source) {
        if let Ok(name) = caps[1].parse::<SplitName>() {
            if !order.contains(&name) {
                order.push(name);
            }
        }
    }
    (!order.is_empty()).then_some(order)
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl StepCodec for SplitCodec {
    type Params = SplitParams;

    const KIND: StepKind = StepKind::Split;

    fn generate(params: &SplitParams) -> String {
        let src = pylit::sanitize_identifier(&params.source_var, "df");
        let order = params.active_order();
        let labels: Vec<&str> = order.iter().map(|n| n.as_str()).collect();

        let mut lines = vec![
            "import pandas as pd".to_string(),
            String::new(),
            format!("# Split {src} into {} sets", labels.join("/")),
            format!("total_rows = len({src})"),
            String::new(),
            "# Calculate split sizes".to_string(),
        ];
        for name in &order {
            lines.push(format!(
                "{name}_size = int(total_rows * {})",
                pylit::percent_to_fraction(params.percent(*name))
            ));
        }

        lines.push(String::new());
        lines.push("# Calculate split indices".to_string());
        let last = order.len().saturating_sub(1);
        for (idx, name) in order.iter().enumerate().take(last) {
            if idx == 0 {
                lines.push(format!("{name}_end = {name}_size"));
            } else {
                lines.push(format!("{name}_end = {}_end + {name}_size", order[idx - 1]));
            }
        }

        lines.push(String::new());
        lines.push("# Create split dataframes".to_string());
        for (idx, name) in order.iter().enumerate() {
            let start = if idx == 0 {
                "0".to_string()
            } else {
                format!("{}_end", order[idx - 1])
            };
            let end = if idx == last {
                String::new()
            } else {
                format!("{name}_end")
            };
            lines.push(format!("{name}_df = {src}.iloc[{start}:{end}]"));
        }

        lines.join("\n")
    }

    fn parse(source: &str, current: &SplitParams) -> Option<SplitParams> {
        let source_var = extract_source_var(source)?;
        let mut params = current.clone();
        params.source_var = source_var;

        if let Some(p) = extract_percent(source, SplitName::Train) {
            params.train_percent = p;
        }
        if let Some(p) = extract_percent(source, SplitName::Test) {
            params.test_percent = p;
        }
        match extract_percent(source, SplitName::Validation) {
            Some(p) => {
                params.validation_percent = p;
                params.include_validation = true;
            }
            None => {
                params.validation_percent = 0;
                params.include_validation = false;
            }
        }
        if let Some(order) = extract_order(source) {
            params.split_order = order;
        }
        Some(params)
    }

    fn normalize(parsed: SplitParams, before: &SplitParams) -> SplitParams {
        let plan = normalize_after_edit(&SplitPlan::from_params(&parsed), &SplitPlan::from_params(before));
        let mut out = parsed;
        plan.apply_to(&mut out);
        out
    }

    fn context(params: &SplitParams) -> DataframeContext {
        DataframeContext::derived(pylit::sanitize_identifier(&params.source_var, "df"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_way() -> SplitParams {
        SplitParams::default().with_validation(true)
    }

    #[test]
    fn generates_two_way_split() {
        let code = SplitCodec::generate(&SplitParams::default());
        assert_eq!(
            code,
            "import pandas as pd\n\
             \n\
             # Split df into train/test sets\n\
             total_rows = len(df)\n\
             \n\
             # Calculate split sizes\n\
             train_size = int(total_rows * 0.80)\n\
             test_size = int(total_rows * 0.20)\n\
             \n\
             # Calculate split indices\n\
             train_end = train_size\n\
             \n\
             # Create split dataframes\n\
             train_df = df.iloc[0:train_end]\n\
             test_df = df.iloc[train_end:]"
        );
    }

    #[test]
    fn generates_chained_indices_for_three_way_split() {
        let mut params = three_way();
        params.split_order = vec![SplitName::Test, SplitName::Train, SplitName::Validation];
        let code = SplitCodec::generate(&params);
        assert!(code.contains("test_end = test_size\n"));
        assert!(code.contains("train_end = test_end + train_size\n"));
        assert!(!code.contains("validation_end"));
        assert!(code.contains("test_df = df.iloc[0:test_end]"));
        assert!(code.contains("train_df = df.iloc[test_end:train_end]"));
        assert!(code.ends_with("validation_df = df.iloc[train_end:]"));
    }

    #[test]
    fn inactive_validation_is_left_out_of_generated_order() {
        let mut params = SplitParams::default();
        params.split_order = vec![SplitName::Validation, SplitName::Test, SplitName::Train];
        assert_eq!(params.active_order(), vec![SplitName::Test, SplitName::Train]);
        assert!(!SplitCodec::generate(&params).contains("validation"));
    }

    #[test]
    fn parse_recovers_percentages_and_order() {
        let mut params = three_way();
        params.source_var = "clean".into();
        params.train_percent = 70;
        params.validation_percent = 15;
        params.test_percent = 15;
        params.split_order = vec![SplitName::Validation, SplitName::Train, SplitName::Test];
        let parsed = SplitCodec::parse_default(&SplitCodec::generate(&params)).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn missing_validation_line_disables_validation() {
        let current = three_way();
        let code = "total_rows = len(df)\ntrain_size = int(total_rows * 0.75)\n";
        let parsed = SplitCodec::parse(code, &current).unwrap();
        assert!(!parsed.include_validation);
        assert_eq!(parsed.validation_percent, 0);
        assert_eq!(parsed.train_percent, 75);
        // No test line and no table assignments: last-known values stay.
        assert_eq!(parsed.test_percent, current.test_percent);
        assert_eq!(parsed.split_order, current.split_order);
    }

    #[test]
    fn order_ignores_unknown_and_repeated_tables() {
        let code = "total_rows = len(df)\n\
                    holdout_df = df.iloc[0:5]\n\
                    test_df = df.iloc[0:5]\n\
                    train_df = df.iloc[5:]\n\
                    test_df = test_df.dropna()\n";
        let parsed = SplitCodec::parse_default(code).unwrap();
        assert_eq!(parsed.split_order, vec![SplitName::Test, SplitName::Train]);
    }

    #[test]
    fn fractions_round_half_up() {
        let code = "total_rows = len(df)\ntrain_size = int(total_rows * 0.805)\n";
        assert_eq!(SplitCodec::parse_default(code).unwrap().train_percent, 81);
    }

    #[test]
    fn settle_normalizes_against_snapshot() {
        let before = SplitParams::default();
        let edited = SplitCodec::generate(&before).replace("0.80", "0.90");
        let parsed = SplitCodec::parse(&edited, &before).unwrap();
        assert_eq!((parsed.train_percent, parsed.test_percent), (90, 20));

        let settled = SplitCodec::normalize(parsed, &before);
        assert_eq!(
            (settled.train_percent, settled.validation_percent, settled.test_percent),
            (90, 0, 10)
        );
    }

    #[test]
    fn validation_toggle_applies_presets() {
        let on = SplitParams::default().with_validation(true);
        assert_eq!((on.train_percent, on.validation_percent, on.test_percent), (80, 10, 10));
        assert_eq!(on.split_order.len(), 3);

        let off = on.with_validation(false);
        assert_eq!((off.train_percent, off.validation_percent, off.test_percent), (80, 0, 20));
        assert_eq!(off.split_order, vec![SplitName::Train, SplitName::Test]);
    }

    #[test]
    fn move_split_reorders_rows() {
        let mut params = three_way();
        params.move_split(2, 0);
        assert_eq!(
            params.split_order,
            vec![SplitName::Test, SplitName::Train, SplitName::Validation]
        );
        params.move_split(0, 9);
        assert_eq!(params.split_order[0], SplitName::Test);
    }

    #[test]
    fn context_derives_from_source() {
        let ctx = SplitCodec::context(&SplitParams::default());
        assert_eq!(ctx.parent.as_deref(), Some("df"));
    }

    #[test]
    fn context_uses_the_generated_parent_name() {
        let params = SplitParams {
            source_var: "my df".into(),
            ..SplitParams::default()
        };
        assert!(SplitCodec::generate(&params).contains("my_df"));
        let ctx = SplitCodec::context(&params);
        assert_eq!(ctx.parent.as_deref(), Some("my_df"));
    }

    #[test]
    fn no_anchor_is_a_miss() {
        assert_eq!(SplitCodec::parse_default(""), None);
        assert_eq!(SplitCodec::parse_default("train_df = df.iloc[0:10]"), None);
    }
}
