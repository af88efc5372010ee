//! Model step: fit an ordinary least squares regression on a features / target pair.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, StepKind};

use crate::codec::StepCodec;
use crate::pylit::{self, pattern};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegressionParams {
    pub features_var: String,
    pub target_var: String,
    pub model_var: String,
    pub fit_intercept: bool,
}

impl Default for LinearRegressionParams {
    fn default() -> Self {
        Self {
            features_var: "X".into(),
            target_var: "y".into(),
            model_var: "model".into(),
            fit_intercept: true,
        }
    }
}

pub struct LinearRegressionCodec;

static MODEL: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^[ \t]*(\w+)\s*=\s*LinearRegression\("));
static FIT_INTERCEPT: Lazy<Regex> = Lazy::new(|| pattern(r"\bfit_intercept\s*=\s*(True|False)\b"));
static FIT: Lazy<Regex> = Lazy::new(|| pattern(r"\.fit\(\s*(\w+)\s*,\s*(\w+)\s*\)"));

fn extract_model_var(source: &str) -> Option<String> {
    MODEL.captures(source).map(|c| c[1].to_string())
}

fn extract_fit_intercept(source: &str) -> Option<bool> {
    FIT_INTERCEPT.captures(source).map(|c| &c[1] == "True")
}

/// `(features, target)` from the `.fit(X, y)` call.
fn extract_fit_args(source: &str) -> Option<(String, String)> {
    FIT.captures(source)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

impl StepCodec for LinearRegressionCodec {
    type Params = LinearRegressionParams;

    const KIND: StepKind = StepKind::LinearRegression;

    fn generate(params: &LinearRegressionParams) -> String {
        let x = pylit::sanitize_identifier(&params.features_var, "X");
        let y = pylit::sanitize_identifier(&params.target_var, "y");
        let model = pylit::sanitize_identifier(&params.model_var, "model");
        let intercept = if params.fit_intercept { "True" } else { "False" };

        [
            "from sklearn.linear_model import LinearRegression".to_string(),
            "from sklearn.metrics import r2_score".to_string(),
            "import numpy as np".to_string(),
            String::new(),
            "# Train linear regression model".to_string(),
            format!("{model} = LinearRegression(fit_intercept={intercept})"),
            format!("{model}.fit({x}, {y})"),
            String::new(),
            "# Model coefficients and intercept".to_string(),
            format!("coefficients = {model}.coef_"),
            format!("intercept = {model}.intercept_"),
            String::new(),
            "# Make predictions on training data".to_string(),
            format!("predictions = {model}.predict({x})"),
            String::new(),
            "# Calculate R² score".to_string(),
            format!("r2 = r2_score({y}, predictions)"),
        ]
        .join("\n")
    }

    fn parse(source: &str, current: &LinearRegressionParams) -> Option<LinearRegressionParams> {
        let model_var = extract_model_var(source)?;
        let (features_var, target_var) = extract_fit_args(source)
            .unwrap_or_else(|| (current.features_var.clone(), current.target_var.clone()));
        Some(LinearRegressionParams {
            features_var,
            target_var,
            model_var,
            fit_intercept: extract_fit_intercept(source).unwrap_or(current.fit_intercept),
        })
    }

    fn context(params: &LinearRegressionParams) -> DataframeContext {
        DataframeContext::derived(pylit::sanitize_identifier(&params.features_var, "X"))
    }
}
