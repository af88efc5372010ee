//! Load step: `pd.read_csv(...)` into a named table.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, StepKind};

use crate::codec::StepCodec;
use crate::pylit::{self, pattern, STRING_LITERAL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadCsvParams {
    pub var_name: String,
    pub filename: String,
    pub delimiter: String,
    /// `true` when the first row holds column names.
    pub header: bool,
    pub encoding: String,
}

impl Default for ReadCsvParams {
    fn default() -> Self {
        Self {
            var_name: "df".into(),
            filename: "data.csv".into(),
            delimiter: ",".into(),
            header: true,
            encoding: "utf-8".into(),
        }
    }
}

pub struct ReadCsvCodec;

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)^[ \t]*([A-Za-z_]\w*)[ \t]*=[ \t]*pd\.read_csv\("));
static FILENAME: Lazy<Regex> =
    Lazy::new(|| pattern(&format!(r"pd\.read_csv\(\s*{STRING_LITERAL}")));
static DELIMITER: Lazy<Regex> =
    Lazy::new(|| pattern(&format!(r"\b(?:delimiter|sep)\s*=\s*{STRING_LITERAL}")));
static HEADER: Lazy<Regex> = Lazy::new(|| pattern(r"\bheader\s*=\s*(\w+)"));
static ENCODING: Lazy<Regex> =
    Lazy::new(|| pattern(&format!(r"\bencoding\s*=\s*{STRING_LITERAL}")));

fn extract_var_name(source: &str) -> Option<String> {
    ASSIGNMENT.captures(source).map(|c| c[1].to_string())
}

fn extract_filename(source: &str) -> Option<String> {
    FILENAME
        .captures(source)
        .and_then(|c| pylit::literal_body(&c, 1))
}

fn extract_delimiter(source: &str) -> Option<String> {
    DELIMITER
        .captures(source)
        .and_then(|c| pylit::literal_body(&c, 1))
}

/// `header=0` (or any row index) means the file has a header row; `None` and
/// `False` mean it does not.
fn extract_header(source: &str) -> Option<bool> {
    HEADER
        .captures(source)
        .map(|c| !matches!(&c[1], "None" | "False"))
}

fn extract_encoding(source: &str) -> Option<String> {
    ENCODING
        .captures(source)
        .and_then(|c| pylit::literal_body(&c, 1))
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl StepCodec for ReadCsvCodec {
    type Params = ReadCsvParams;

    const KIND: StepKind = StepKind::ReadCsv;

    fn generate(params: &ReadCsvParams) -> String {
        let var = pylit::sanitize_identifier(&params.var_name, "df");
        let header = if params.header { "0" } else { "None" };
        [
            "import pandas as pd".to_string(),
            format!(
                "{var} = pd.read_csv({}, delimiter={}, header={header}, encoding={})",
                pylit::quote_double(&params.filename),
                pylit::quote_double(&params.delimiter),
                pylit::quote_double(&params.encoding),
            ),
        ]
        .join("\n")
    }

    fn parse(source: &str, current: &ReadCsvParams) -> Option<ReadCsvParams> {
        let var_name = extract_var_name(source)?;
        Some(ReadCsvParams {
            var_name,
            filename: extract_filename(source).unwrap_or_else(|| current.filename.clone()),
            delimiter: extract_delimiter(source).unwrap_or_else(|| current.delimiter.clone()),
            header: extract_header(source).unwrap_or(current.header),
            encoding: extract_encoding(source).unwrap_or_else(|| current.encoding.clone()),
        })
    }

    fn context(_params: &ReadCsvParams) -> DataframeContext {
        DataframeContext::source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_sentinel_header() {
        let params = ReadCsvParams {
            var_name: "sales".into(),
            filename: "sales.csv".into(),
            delimiter: ";".into(),
            header: false,
            encoding: "latin-1".into(),
        };
        assert_eq!(
            ReadCsvCodec::generate(&params),
            "import pandas as pd\n\
             sales = pd.read_csv(\"sales.csv\", delimiter=\";\", header=None, encoding=\"latin-1\")"
        );
        assert_eq!(ReadCsvCodec::parse_default(&ReadCsvCodec::generate(&params)), Some(params));
    }

    #[test]
    fn header_sentinels_decode() {
        let base = "df = pd.read_csv('a.csv', header=";
        for (value, expected) in [("0", true), ("1", true), ("None", false), ("False", false), ("True", true)] {
            let parsed = ReadCsvCodec::parse_default(&format!("{base}{value})")).unwrap();
            assert_eq!(parsed.header, expected, "header={value}");
        }
    }

    #[test]
    fn missing_fields_keep_current_values() {
        let current = ReadCsvParams {
            delimiter: "\t".into(),
            encoding: "utf-16".into(),
            ..ReadCsvParams::default()
        };
        let parsed = ReadCsvCodec::parse("raw = pd.read_csv('in.csv')", &current).unwrap();
        assert_eq!(parsed.var_name, "raw");
        assert_eq!(parsed.filename, "in.csv");
        assert_eq!(parsed.delimiter, "\t");
        assert_eq!(parsed.encoding, "utf-16");
        assert!(parsed.header);
    }

    #[test]
    fn accepts_sep_alias_and_single_quotes() {
        let parsed =
            ReadCsvCodec::parse_default("df = pd.read_csv('x.tsv', sep='\\t', encoding='ascii')")
                .unwrap();
        assert_eq!(parsed.delimiter, "\t");
        assert_eq!(parsed.encoding, "ascii");
    }

    #[test]
    fn filename_with_quotes_survives() {
        let params = ReadCsvParams {
            filename: "it's \"q3\".csv".into(),
            ..ReadCsvParams::default()
        };
        let parsed = ReadCsvCodec::parse_default(&ReadCsvCodec::generate(&params)).unwrap();
        assert_eq!(parsed.filename, params.filename);
    }

    #[test]
    fn invalid_variable_name_is_sanitized() {
        let params = ReadCsvParams {
            var_name: "my data".into(),
            ..ReadCsvParams::default()
        };
        assert!(ReadCsvCodec::generate(&params).contains("\nmy_data = pd.read_csv("));
        let empty = ReadCsvParams {
            var_name: String::new(),
            ..ReadCsvParams::default()
        };
        assert!(ReadCsvCodec::generate(&empty).contains("\ndf = pd.read_csv("));
    }

    #[test]
    fn no_anchor_is_a_miss() {
        assert_eq!(ReadCsvCodec::parse_default(""), None);
        assert_eq!(ReadCsvCodec::parse_default("print('hello')"), None);
        assert_eq!(ReadCsvCodec::parse_default("pd.read_csv('a.csv')"), None);
    }
}
