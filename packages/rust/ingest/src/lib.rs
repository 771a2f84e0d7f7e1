//! CSV ingestion: product and catalog-structure parsing, then field mapping.

pub mod csv;
pub mod mapper;

pub use csv::{
    CsvRow, ParsedCsv, detect_separator, parse_csv, parse_line, parse_structure_csv,
    validate_xml_chars,
};
pub use mapper::transform;
