//! Delimited-text parsing for product and catalog-structure CSVs.
//!
//! The dialect is deliberately small:
//! - Separator is `;` when the header line has strictly more semicolons than commas, else `,`
//! - `"` toggles quoting and is never copied into a value (`""` is not unescaped)
//! - Values are trimmed, blank lines are skipped
//! - Data lines with the wrong field count are dropped

use std::collections::BTreeMap;

use bmecat_shared::{BmecatError, Result, StructureRow};

/// One CSV data line keyed by header name.
pub type CsvRow = BTreeMap<String, String>;

/// Header line plus the data lines that matched its width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

/// Columns a catalog-structure CSV must carry, in the order they are checked.
const STRUCTURE_COLUMNS: [&str; 3] = ["GROUP_ID", "GROUP_NAME", "PARENT_ID"];

/// Pick the column separator from the header line.
pub fn detect_separator(header_line: &str) -> char {
    let commas = header_line.matches(',').count();
    let semicolons = header_line.matches(';').count();
    if semicolons > commas { ';' } else { ',' }
}

/// Split a single line into trimmed field values.
pub fn parse_line(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == separator && !in_quotes {
            fields.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    fields.push(current.trim().to_string());

    fields
}

/// Parse CSV text into headers and header-keyed rows.
///
/// A leading UTF-8 byte order mark is dropped.
pub fn parse_csv(text: &str) -> Result<ParsedCsv> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let mut lines = text
        .trim()
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header_line)) = lines.next() else {
        return Err(BmecatError::empty_input("CSV"));
    };

    let separator = detect_separator(header_line);
    let headers = parse_line(header_line, separator);

    let mut rows = Vec::new();
    let mut data_lines = 0usize;

    for (index, line) in lines {
        data_lines += 1;
        let values = parse_line(line, separator);
        if values.len() != headers.len() {
            tracing::debug!(
                line = index + 1,
                found = values.len(),
                expected = headers.len(),
                "skipping malformed CSV line"
            );
            continue;
        }
        rows.push(headers.iter().cloned().zip(values).collect());
    }

    if data_lines == 0 {
        return Err(BmecatError::empty_input("CSV"));
    }

    tracing::debug!(
        columns = headers.len(),
        rows = rows.len(),
        dropped = data_lines - rows.len(),
        %separator,
        "parsed CSV"
    );

    Ok(ParsedCsv { headers, rows })
}

/// Parse a catalog-structure CSV (`GROUP_ID`, `GROUP_NAME`, `PARENT_ID`).
///
/// Extra columns are ignored.
pub fn parse_structure_csv(text: &str) -> Result<Vec<StructureRow>> {
    let parsed = parse_csv(text)?;

    if let Some(missing) = STRUCTURE_COLUMNS
        .iter()
        .find(|column| !parsed.headers.iter().any(|h| h == *column))
    {
        return Err(BmecatError::MissingColumn {
            column: (*missing).to_string(),
        });
    }

    let take = |row: &CsvRow, key: &str| row.get(key).cloned().unwrap_or_default();

    Ok(parsed
        .rows
        .iter()
        .map(|row| StructureRow {
            group_id: take(row, "GROUP_ID"),
            group_name: take(row, "GROUP_NAME"),
            parent_id: take(row, "PARENT_ID"),
        })
        .collect())
}

/// Reject characters that cannot appear in an XML 1.0 document.
///
/// Allowed: tab, LF, CR, and everything from U+0020 up except U+FFFE / U+FFFF.
/// Line and column are 1-based; columns count characters.
pub fn validate_xml_chars(text: &str) -> Result<()> {
    for (line_index, line) in text.split('\n').enumerate() {
        for (column_index, ch) in line.chars().enumerate() {
            if !is_xml_char(ch) {
                return Err(BmecatError::InvalidCharacter {
                    line: line_index + 1,
                    column: column_index + 1,
                    code: ch as u32,
                });
            }
        }
    }
    Ok(())
}

fn is_xml_char(ch: char) -> bool {
    matches!(ch, '\t' | '\n' | '\r') || (ch >= '\u{20}' && ch != '\u{FFFE}' && ch != '\u{FFFF}')
}
