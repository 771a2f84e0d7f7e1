//! Applies a [`FieldMapping`] to parsed CSV rows.

use bmecat_shared::{Feature, FieldMapping, NormalizedRow};

use crate::csv::CsvRow;

/// Map raw CSV rows onto canonical BMEcat keys.
///
/// Row order is preserved and nothing is deduplicated or validated.
/// A feature is attached only when both its name and value cells are non-empty.
pub fn transform(rows: &[CsvRow], mapping: &FieldMapping) -> Vec<NormalizedRow> {
    rows.iter().map(|row| map_row(row, mapping)).collect()
}

fn map_row(row: &CsvRow, mapping: &FieldMapping) -> NormalizedRow {
    let mut out = NormalizedRow::default();

    for (key, header) in &mapping.fields {
        if header.is_empty() {
            continue;
        }
        if let Some(value) = row.get(header) {
            out.set(key.clone(), value.clone());
        }
    }

    let cell = |header: &str| -> &str {
        if header.is_empty() {
            return "";
        }
        row.get(header).map(String::as_str).unwrap_or("")
    };

    for fm in &mapping.features {
        let fname = cell(&fm.fname);
        let fvalue = cell(&fm.fvalue);
        if fname.is_empty() || fvalue.is_empty() {
            continue;
        }
        let funit = fm.funit.as_deref().map(cell).filter(|u| !u.is_empty());
        out.features.push(Feature {
            fname: fname.to_string(),
            fvalue: fvalue.to_string(),
            funit: funit.map(str::to_string),
        });
    }

    out
}
