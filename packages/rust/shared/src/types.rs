//! Core domain types for BMEcat catalog generation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BmecatError, Result};

// ---------------------------------------------------------------------------
// BmecatFormat
// ---------------------------------------------------------------------------

/// Target BMEcat version. Fixed for the duration of one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BmecatFormat {
    #[default]
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "2005")]
    V2005,
}

impl BmecatFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_2 => "1.2",
            Self::V2005 => "2005",
        }
    }
}

impl fmt::Display for BmecatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BmecatFormat {
    type Err = BmecatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1.2" => Ok(Self::V1_2),
            "2005" => Ok(Self::V2005),
            other => Err(BmecatError::validation(format!(
                "unsupported BMEcat format \"{other}\" (expected 1.2 or 2005)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// HeaderConfig
// ---------------------------------------------------------------------------

/// Catalog and supplier metadata rendered into the document `<HEADER>`.
///
/// Loaded from `header.toml`. Fields marked 2005-only are ignored when
/// rendering a 1.2 header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub format: BmecatFormat,
    pub catalog_id: String,
    pub catalog_version: String,
    pub catalog_name: String,
    pub territory: String,
    pub currency: String,
    pub supplier_name: String,
    pub supplier_street: String,
    pub supplier_zip: String,
    pub supplier_city: String,
    pub supplier_country: String,
    pub supplier_email: String,
    pub supplier_url: String,
    /// Catalog language code (`deu`, `eng`, ...). Defaults to `deu` when empty.
    pub language: String,

    // --- 2005-only ---
    /// `FULL`, `UPDATE` or `DELTA`.
    pub edition: String,
    pub fab_dis: String,
    /// Decimal separator convention, e.g. `Comma` or `Point`.
    pub decimal_separator: String,
    pub country_of_origin: String,
    pub contact_first_name: String,
    pub contact_last_name: String,
    pub marques: Vec<String>,
}

impl HeaderConfig {
    /// Parse a header definition from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| BmecatError::parse(format!("invalid header config: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

/// The standard BMEcat article fields a CSV column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BmecatField {
    SupplierAid,
    DescriptionShort,
    DescriptionLong,
    Ean,
    ManufacturerAid,
    ManufacturerName,
    PriceAmount,
    PriceCurrency,
    PriceType,
    CatalogGroupId,
    OrderUnit,
}

impl BmecatField {
    /// All standard fields, required ones first.
    pub const ALL: [BmecatField; 11] = [
        Self::SupplierAid,
        Self::DescriptionShort,
        Self::PriceAmount,
        Self::PriceType,
        Self::OrderUnit,
        Self::DescriptionLong,
        Self::Ean,
        Self::ManufacturerAid,
        Self::ManufacturerName,
        Self::PriceCurrency,
        Self::CatalogGroupId,
    ];

    /// The XML element name, also used as the normalized row key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SupplierAid => "SUPPLIER_AID",
            Self::DescriptionShort => "DESCRIPTION_SHORT",
            Self::DescriptionLong => "DESCRIPTION_LONG",
            Self::Ean => "EAN",
            Self::ManufacturerAid => "MANUFACTURER_AID",
            Self::ManufacturerName => "MANUFACTURER_NAME",
            Self::PriceAmount => "PRICE_AMOUNT",
            Self::PriceCurrency => "PRICE_CURRENCY",
            Self::PriceType => "PRICE_TYPE",
            Self::CatalogGroupId => "CATALOG_GROUP_ID",
            Self::OrderUnit => "ORDER_UNIT",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SupplierAid => "Supplier article number",
            Self::DescriptionShort => "Short description",
            Self::DescriptionLong => "Long description",
            Self::Ean => "EAN / GTIN",
            Self::ManufacturerAid => "Manufacturer article number",
            Self::ManufacturerName => "Manufacturer name",
            Self::PriceAmount => "Price",
            Self::PriceCurrency => "Price currency",
            Self::PriceType => "Price type",
            Self::CatalogGroupId => "Catalog group ID",
            Self::OrderUnit => "Order unit",
        }
    }

    pub fn required(&self) -> bool {
        matches!(
            self,
            Self::SupplierAid
                | Self::DescriptionShort
                | Self::PriceAmount
                | Self::PriceType
                | Self::OrderUnit
        )
    }

    /// Look up a standard field by its element name.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }
}

impl fmt::Display for BmecatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rows and features
// ---------------------------------------------------------------------------

/// A product characteristic attached to an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub fname: String,
    pub fvalue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funit: Option<String>,
}

/// One product record keyed by canonical field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
}

impl NormalizedRow {
    /// Value for `key`, or the empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn field(&self, field: BmecatField) -> &str {
        self.get(field.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Whether this row can be rendered as an `<ARTICLE>`.
    pub fn is_renderable(&self) -> bool {
        !self.field(BmecatField::SupplierAid).is_empty()
            && !self.field(BmecatField::PriceAmount).is_empty()
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// CSV header triple describing one product feature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMapping {
    pub fname: String,
    pub fvalue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funit: Option<String>,
}

/// Mapping from canonical field keys to CSV headers, plus feature triples.
///
/// ```toml
/// [fields]
/// SUPPLIER_AID = "Artikelnummer"
/// PRICE_AMOUNT = "Preis"
///
/// [[features]]
/// fname = "Merkmal1"
/// fvalue = "Wert1"
/// funit = "Einheit1"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub features: Vec<FeatureMapping>,
}

impl FieldMapping {
    /// Parse a mapping definition from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| BmecatError::parse(format!("invalid field mapping: {e}")))
    }

    /// Standard fields marked required that have no mapping.
    pub fn missing_required(&self) -> Vec<BmecatField> {
        BmecatField::ALL
            .into_iter()
            .filter(|f| f.required())
            .filter(|f| {
                self.fields
                    .get(f.as_str())
                    .is_none_or(|header| header.is_empty())
            })
            .collect()
    }

    /// Mapped keys that name no standard field, e.g. ones discovered from a specification.
    pub fn extra_keys(&self) -> Vec<&str> {
        self.fields
            .keys()
            .map(String::as_str)
            .filter(|key| BmecatField::from_key(key).is_none())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Catalog structure
// ---------------------------------------------------------------------------

/// One row of the catalog-structure CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StructureRow {
    pub group_id: String,
    pub group_name: String,
    pub parent_id: String,
}

/// A node of the catalog group forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CatalogGroup>,
}

impl CatalogGroup {
    /// Number of groups in this subtree, including `self`.
    pub fn subtree_size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(group) = stack.pop() {
            count += 1;
            stack.extend(&group.children);
        }
        count
    }
}

impl Drop for CatalogGroup {
    // Flatten before dropping so deep chains do not recurse.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut group) = pending.pop() {
            pending.append(&mut group.children);
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Which template the oracle is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Article,
    Body,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Article => f.write_str("article"),
            Self::Body => f.write_str("document body"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stored specifications
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for stored specification identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecId(pub Uuid);

impl SpecId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SpecId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SpecId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a stored specification artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecKind {
    /// PDF document, stored base64-encoded.
    Pdf,
    /// Proprietary structure description (BSB), stored as text.
    StructureDescription,
    /// Full BMEcat XML sample, stored as text.
    XmlSample,
}

impl SpecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::StructureDescription => "structure_description",
            Self::XmlSample => "xml_sample",
        }
    }
}

impl std::str::FromStr for SpecKind {
    type Err = BmecatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "structure_description" | "bsb" => Ok(Self::StructureDescription),
            "xml_sample" | "xml" => Ok(Self::XmlSample),
            other => Err(BmecatError::validation(format!(
                "unknown specification kind \"{other}\""
            ))),
        }
    }
}

/// A named specification artifact kept in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSpecification {
    pub id: SpecId,
    pub name: String,
    pub kind: SpecKind,
    /// Base64 for PDFs, raw text otherwise.
    pub content: String,
    /// SHA-256 of `content`, hex encoded.
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_and_displays() {
        assert_eq!("2005".parse::<BmecatFormat>().unwrap(), BmecatFormat::V2005);
        assert_eq!(BmecatFormat::V1_2.to_string(), "1.2");
        assert!("3.0".parse::<BmecatFormat>().is_err());
    }

    #[test]
    fn header_from_toml() {
        let header = HeaderConfig::from_toml(
            r#"
format = "2005"
catalog_id = "K1"
catalog_name = "Test"
marques = ["Acme", "Globex"]
"#,
        )
        .expect("parse header");
        assert_eq!(header.format, BmecatFormat::V2005);
        assert_eq!(header.catalog_id, "K1");
        assert_eq!(header.marques.len(), 2);
        assert!(header.supplier_name.is_empty());
    }

    #[test]
    fn mapping_from_toml() {
        let mapping = FieldMapping::from_toml(
            r#"
[fields]
SUPPLIER_AID = "Artikelnummer"
PRICE_AMOUNT = "Preis"

[[features]]
fname = "Merkmal1"
fvalue = "Wert1"
"#,
        )
        .expect("parse mapping");
        assert_eq!(mapping.fields["SUPPLIER_AID"], "Artikelnummer");
        assert_eq!(mapping.features.len(), 1);
        assert!(mapping.features[0].funit.is_none());

        let missing = mapping.missing_required();
        assert!(missing.contains(&BmecatField::OrderUnit));
        assert!(!missing.contains(&BmecatField::SupplierAid));
    }

    #[test]
    fn extra_keys_are_the_non_standard_ones() {
        let mut mapping = FieldMapping::default();
        mapping.fields.insert("SUPPLIER_AID".into(), "Artikelnummer".into());
        mapping.fields.insert("DELIVERY_TIME".into(), "Lieferzeit".into());
        mapping.fields.insert("ORDER_UNIT".into(), "Einheit".into());
        assert_eq!(mapping.extra_keys(), vec!["DELIVERY_TIME"]);
        assert_eq!(BmecatField::OrderUnit.label(), "Order unit");
    }

    #[test]
    fn row_renderability() {
        let mut row = NormalizedRow::default();
        row.set("SUPPLIER_AID", "A-1");
        assert!(!row.is_renderable());
        row.set("PRICE_AMOUNT", "1,00");
        assert!(row.is_renderable());
        assert_eq!(row.get("EAN"), "");
    }

    #[test]
    fn field_lookup_by_key() {
        assert_eq!(BmecatField::from_key("EAN"), Some(BmecatField::Ean));
        assert_eq!(BmecatField::from_key("PRODUCT_DETAILS"), None);
        assert_eq!(BmecatField::ALL.iter().filter(|f| f.required()).count(), 5);
    }

    #[test]
    fn spec_id_roundtrip() {
        let id = SpecId::new();
        let parsed: SpecId = id.to_string().parse().expect("parse SpecId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn subtree_size_counts_descendants() {
        let group = CatalogGroup {
            id: "A".into(),
            name: "A".into(),
            parent_id: None,
            children: vec![CatalogGroup {
                id: "B".into(),
                name: "B".into(),
                parent_id: Some("A".into()),
                children: vec![],
            }],
        };
        assert_eq!(group.subtree_size(), 2);
    }

    #[test]
    fn deep_chain_counts_and_drops() {
        let mut group = CatalogGroup {
            id: "0".into(),
            name: "leaf".into(),
            parent_id: None,
            children: vec![],
        };
        for depth in 1..100_000 {
            group = CatalogGroup {
                id: depth.to_string(),
                name: "level".into(),
                parent_id: None,
                children: vec![group],
            };
        }
        assert_eq!(group.subtree_size(), 100_000);
        drop(group);
    }
}
