//! Local table preview of an input file, built without the runtime.

use serde::{Deserialize, Serialize};

/// Splits delimited text into records.
pub trait DelimitedParser {
    fn parse_delimited(&self, text: &str, delimiter: &str) -> Vec<Vec<String>>;
}

/// Line and field splitting with no quoting rules. Blank lines are skipped and
/// cells are trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleDelimitedParser;

impl DelimitedParser for SimpleDelimitedParser {
    fn parse_delimited(&self, text: &str, delimiter: &str) -> Vec<Vec<String>> {
        let delimiter = if delimiter.is_empty() { "," } else { delimiter };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split(delimiter).map(|cell| cell.trim().to_string()).collect())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TablePreview {
    /// Header cells with surrounding quotes removed, first occurrence kept.
    pub columns: Vec<String>,
    /// Up to `max_rows` data records after the header.
    pub rows: Vec<Vec<String>>,
}

/// Build a preview from the header and first `max_rows` data records of `text`.
pub fn build_preview(
    parser: &dyn DelimitedParser,
    text: &str,
    delimiter: &str,
    max_rows: usize,
) -> TablePreview {
    let mut records = parser.parse_delimited(text, delimiter).into_iter();
    let Some(header) = records.next() else {
        return TablePreview::default();
    };

    let mut columns: Vec<String> = Vec::with_capacity(header.len());
    for cell in header {
        let name = cell.replace(['"', '\''], "");
        if !columns.contains(&name) {
            columns.push(name);
        }
    }
    TablePreview {
        columns,
        rows: records.take(max_rows).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_cleaned_and_deduplicated() {
        let text = "\"id\", 'name' ,id,price\n1,a,1,9.5\n\n2,b,2,3\n";
        let preview = build_preview(&SimpleDelimitedParser, text, ",", 10);
        assert_eq!(preview.columns, vec!["id", "name", "price"]);
        assert_eq!(preview.rows.len(), 2);
        assert_eq!(preview.rows[1], vec!["2", "b", "2", "3"]);
    }

    #[test]
    fn rows_are_capped() {
        let text = "a;b\n1;2\n3;4\n5;6\n";
        let preview = build_preview(&SimpleDelimitedParser, text, ";", 2);
        assert_eq!(preview.columns, vec!["a", "b"]);
        assert_eq!(preview.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn empty_text_gives_empty_preview() {
        assert_eq!(
            build_preview(&SimpleDelimitedParser, "\n  \n", ",", 5),
            TablePreview::default()
        );
    }
}
