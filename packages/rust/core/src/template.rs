//! Slot filling for oracle-supplied article templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use bmecat_shared::{BmecatField, NormalizedRow};

use crate::render::render_features;
use crate::xml::escape_xml;

/// Marker the article template carries where feature blocks go.
pub const FEATURES_MARKER: &str = "<!-- {{PRODUCT_FEATURES}} -->";

/// Marker the document body template carries where the catalog content goes.
pub const BODY_MARKER: &str = "<!-- {{T_NEW_CATALOG_CONTENT}} -->";

/// Slot key that is reserved for [`FEATURES_MARKER`] and never substituted.
const FEATURES_KEY: &str = "PRODUCT_FEATURES";

/// Matches `{{UPPER_SNAKE_0_9}}` slots.
static SLOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Z_0-9]+)\}\}").expect("slot regex"));

/// Fill every slot of `template` from `row` and inject the feature block.
///
/// Values are XML-escaped except `DESCRIPTION_LONG`, which the template is
/// expected to wrap in CDATA itself. Absent keys become empty strings.
pub fn fill_article_template(template: &str, row: &NormalizedRow) -> String {
    let features = render_features(&row.features);

    match template.split_once(FEATURES_MARKER) {
        Some((before, after)) => {
            let mut out = fill_slots(before, row);
            out.push_str(&features);
            out.push_str(&fill_slots(after, row));
            out
        }
        None => fill_slots(template, row),
    }
}

fn fill_slots(text: &str, row: &NormalizedRow) -> String {
    SLOT_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let key = &caps[1];
            if key == FEATURES_KEY {
                return caps[0].to_string();
            }
            let value = row.get(key);
            if key == BmecatField::DescriptionLong.as_str() {
                value.to_string()
            } else {
                escape_xml(value)
            }
        })
        .into_owned()
}
