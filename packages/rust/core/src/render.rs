//! Fixed-layout renderers: document header, articles, feature blocks.

use std::fmt::Write;

use chrono::NaiveDateTime;

use bmecat_shared::{AssemblyConfig, BmecatField, BmecatFormat, Feature, HeaderConfig, NormalizedRow};

use crate::xml::{XML_DECLARATION, cdata, escape_xml};

const NS_1_2: &str = "http://www.bmecat.org/bmecat/1.2/bmecat_new_catalog";
const NS_2005: &str = "http://www.bmecat.org/bmecat/2005";
const DOCTYPE_1_2: &str = r#"<!DOCTYPE BMECAT SYSTEM "bmecat_new_catalog.dtd">"#;
const DEFAULT_LANGUAGE: &str = "deu";

/// Declaration, optional DOCTYPE and the opening root element.
pub fn document_prologue(format: BmecatFormat) -> String {
    match format {
        BmecatFormat::V1_2 => format!(
            "{XML_DECLARATION}\n{DOCTYPE_1_2}\n<BMECAT version=\"1.2\" xmlns=\"{NS_1_2}\">\n"
        ),
        BmecatFormat::V2005 => {
            format!("{XML_DECLARATION}\n<BMECAT version=\"2005\" xmlns=\"{NS_2005}\">\n")
        }
    }
}

/// Append `<NAME>value</NAME>` on its own line at `pad`.
fn element(out: &mut String, pad: &str, name: &str, value: &str) {
    let _ = write!(out, "\n{pad}<{name}>{}</{name}>", escape_xml(value));
}

/// Same as [`element`], skipped when `value` is empty.
fn optional(out: &mut String, pad: &str, name: &str, value: &str) {
    if !value.is_empty() {
        element(out, pad, name, value);
    }
}

/// Render the `<HEADER>` block for the configured format.
///
/// The block starts at the `<HEADER>` tag itself (no leading newline) and
/// is indented for placement directly under the root element.
pub fn render_header(header: &HeaderConfig, generated_at: NaiveDateTime) -> String {
    let language = if header.language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        header.language.as_str()
    };
    let date = generated_at.format("%Y-%m-%d").to_string();
    let is_2005 = header.format == BmecatFormat::V2005;

    let c = "      ";
    let mut out = String::from("<HEADER>\n    <CATALOG>");
    element(&mut out, c, "LANGUAGE", language);
    element(&mut out, c, "CATALOG_ID", &header.catalog_id);
    element(&mut out, c, "CATALOG_VERSION", &header.catalog_version);
    element(&mut out, c, "CATALOG_NAME", &header.catalog_name);
    let _ = write!(out, "\n{c}<DATETIME type=\"generation_date\">");
    let _ = write!(out, "\n{c}  <DATE>{date}</DATE>");
    if !is_2005 {
        let _ = write!(out, "\n{c}  <TIME>{}</TIME>", generated_at.format("%H:%M:%S"));
    }
    let _ = write!(out, "\n{c}</DATETIME>");
    if is_2005 {
        optional(&mut out, c, "FAB-DIS", &header.fab_dis);
        optional(&mut out, c, "EDITION", &header.edition);
    }
    element(&mut out, c, "TERRITORY", &header.territory);
    element(&mut out, c, "CURRENCY", &header.currency);
    if is_2005 {
        optional(&mut out, c, "DECSEP", &header.decimal_separator);
    }
    out.push_str("\n    </CATALOG>\n    <SUPPLIER>");

    if is_2005 {
        element(&mut out, c, "FABRICANT", &header.supplier_name);
        for marque in header.marques.iter().filter(|m| !m.is_empty()) {
            element(&mut out, c, "MARQUE", marque);
        }
        optional(&mut out, c, "COUNTRY_OF_ORIGIN", &header.country_of_origin);
    } else {
        element(&mut out, c, "SUPPLIER_NAME", &header.supplier_name);
    }

    let a = "        ";
    let _ = write!(out, "\n{c}<ADDRESS type=\"supplier\">");
    element(&mut out, a, "STREET", &header.supplier_street);
    element(&mut out, a, "ZIP", &header.supplier_zip);
    element(&mut out, a, "CITY", &header.supplier_city);
    element(&mut out, a, "COUNTRY", &header.supplier_country);
    let has_contact =
        !header.contact_first_name.is_empty() || !header.contact_last_name.is_empty();
    if is_2005 && has_contact {
        let d = "          ";
        let _ = write!(out, "\n{a}<CONTACT_DETAILS>");
        optional(&mut out, d, "FIRST_NAME", &header.contact_first_name);
        optional(&mut out, d, "SURNAME", &header.contact_last_name);
        let _ = write!(out, "\n{d}<EMAILS>");
        element(&mut out, &format!("{d}  "), "EMAIL", &header.supplier_email);
        let _ = write!(out, "\n{d}</EMAILS>\n{a}</CONTACT_DETAILS>");
    } else {
        element(&mut out, a, "EMAIL", &header.supplier_email);
    }
    element(&mut out, a, "URL", &header.supplier_url);
    let _ = write!(out, "\n{c}</ADDRESS>");
    out.push_str("\n    </SUPPLIER>");

    if !is_2005 {
        out.push_str("\n    <USER_DEFINED_EXTENSIONS/>");
    }
    out.push_str("\n  </HEADER>");
    out
}

/// Render the `<PRODUCT_FEATURES>` block, or nothing when there are no features.
pub fn render_features(features: &[Feature]) -> String {
    if features.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n      <PRODUCT_FEATURES>");
    for feature in features {
        out.push_str("\n        <FEATURE>");
        element(&mut out, "          ", "FNAME", &feature.fname);
        element(&mut out, "          ", "FVALUE", &feature.fvalue);
        if let Some(unit) = feature.funit.as_deref().filter(|u| !u.is_empty()) {
            element(&mut out, "          ", "FUNIT", unit);
        }
        out.push_str("\n        </FEATURE>");
    }
    out.push_str("\n      </PRODUCT_FEATURES>");
    out
}

/// Render one `<ARTICLE>`; `None` when the row is not renderable.
pub fn render_article(
    row: &NormalizedRow,
    header_currency: &str,
    config: &AssemblyConfig,
) -> Option<String> {
    if !row.is_renderable() {
        return None;
    }
    let get = |field: BmecatField| row.field(field);

    let raw_price = get(BmecatField::PriceAmount);
    let price = if config.decimal_comma_to_point {
        raw_price.replacen(',', ".", 1)
    } else {
        raw_price.to_string()
    };
    let price_type = non_empty_or(get(BmecatField::PriceType), &config.default_price_type);
    let currency = non_empty_or(
        get(BmecatField::PriceCurrency),
        non_empty_or(header_currency, &config.default_currency),
    );

    let d = "        ";
    let mut out = String::from("\n    <ARTICLE>");
    element(&mut out, "      ", "SUPPLIER_AID", get(BmecatField::SupplierAid));
    out.push_str("\n      <ARTICLE_DETAILS>");
    element(&mut out, d, "DESCRIPTION_SHORT", get(BmecatField::DescriptionShort));
    let _ = write!(
        out,
        "\n{d}<DESCRIPTION_LONG>{}</DESCRIPTION_LONG>",
        cdata(get(BmecatField::DescriptionLong))
    );
    optional(&mut out, d, "MANUFACTURER_AID", get(BmecatField::ManufacturerAid));
    optional(&mut out, d, "MANUFACTURER_NAME", get(BmecatField::ManufacturerName));
    optional(&mut out, d, "EAN", get(BmecatField::Ean));
    element(&mut out, d, "ORDER_UNIT", get(BmecatField::OrderUnit));
    out.push_str("\n      </ARTICLE_DETAILS>");
    out.push_str(&render_features(&row.features));
    out.push_str("\n      <ARTICLE_PRICE_DETAILS>");
    let _ = write!(
        out,
        "\n{d}<ARTICLE_PRICE price_type=\"{}\">",
        escape_xml(price_type)
    );
    let p = "          ";
    element(&mut out, p, "PRICE_AMOUNT", &price);
    element(&mut out, p, "PRICE_CURRENCY", currency);
    element(&mut out, p, "TAX", &config.tax_rate);
    let _ = write!(out, "\n{d}</ARTICLE_PRICE>");
    out.push_str("\n      </ARTICLE_PRICE_DETAILS>\n    </ARTICLE>");
    Some(out)
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

/// Concatenate the `<T_NEW_CATALOG>` content in document order.
pub fn assemble_body(group_system: &str, articles: &str, group_map: &str) -> String {
    let mut body = String::with_capacity(group_system.len() + articles.len() + group_map.len());
    body.push_str(group_system);
    body.push_str(articles);
    body.push_str(group_map);
    body
}
