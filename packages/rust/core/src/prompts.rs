//! Prompt and schema construction for oracle requests.
//!
//! Every request appends its specification sources in the same fixed order:
//! structure description (BSB), then PDF, then XML sample or hint.

use serde_json::json;

use bmecat_shared::HeaderConfig;

use crate::oracle::{ContentPart, OracleRequest, OracleTask};

const PDF_MIME: &str = "application/pdf";
const TEMPLATE_TEMPERATURE: f32 = 0.1;
const MAPPING_TEMPERATURE: f32 = 0.2;

/// Borrowed specification sources, already in priority order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptSources<'a> {
    pub structure_description: Option<&'a str>,
    pub pdf_base64: Option<&'a str>,
    pub xml_hint: Option<&'a str>,
}

const PRIORITY_RULES: &str = "To determine the XML structure, follow this strict priority order for the provided sources:
1. Structure description (BSB): highest priority, its structure is mandatory.
2. PDF specification: medium priority, use it when no BSB file is provided.
3. XML sample: lowest priority, a structural reference only when the others are absent or unclear.";

const ARTICLE_SYSTEM: &str = "You are an expert in the BMEcat standards (1.2 and 2005). Generate a single BMEcat <ARTICLE> XML element template from the provided specification files.
- The template must use placeholders like {{FIELD_NAME}}.
- Put {{DESCRIPTION_LONG}} inside a CDATA section.
- Reply with one raw JSON object: { \"articleTemplate\": \"<ARTICLE>...</ARTICLE>\" }.
- Do not add conversational text, explanations or Markdown.";

const BODY_SYSTEM: &str = "You are an expert in the BMEcat standards (1.2 and 2005). Generate the main body structure of a BMEcat file from the provided specification files.
- Start with the <BMECAT> tag. Do not include an XML declaration.
- The <T_NEW_CATALOG> element must contain exactly this marker: <!-- {{T_NEW_CATALOG_CONTENT}} -->
- Reply with one raw JSON object: { \"bmecatBody\": \"<BMECAT>...</BMECAT>\" }.
- Do not add conversational text, explanations or Markdown.";

const MAPPING_SYSTEM: &str = "You are an expert assistant for mapping product data from a CSV file to a BMEcat XML structure. Analyze the CSV headers and any BMEcat specification files to build a complete mapping. Reply with one raw JSON object conforming to the provided schema, without conversational text, explanations or Markdown.";

/// Append labelled source parts in priority order.
fn push_sources(parts: &mut Vec<ContentPart>, sources: &PromptSources<'_>, body_scope: bool) {
    let scope = if body_scope {
        "the entire document, especially the <HEADER>"
    } else {
        "the article structure"
    };
    if let Some(bsb) = sources.structure_description {
        parts.push(ContentPart::Text(format!(
            "--- SOURCE 1: Structure description (BSB, highest priority) ---\nThis file defines the exact required structure for {scope}. Adhere to it strictly."
        )));
        parts.push(ContentPart::Text(format!("```xml\n{bsb}\n```")));
    }
    if let Some(pdf) = sources.pdf_base64 {
        parts.push(ContentPart::Text(
            "--- SOURCE 2: PDF specification (medium priority) ---\nUse this to inform the structure if no BSB file is provided.".into(),
        ));
        parts.push(ContentPart::Document {
            mime_type: PDF_MIME.into(),
            data_base64: pdf.to_string(),
        });
    }
    if let Some(xml) = sources.xml_hint {
        parts.push(ContentPart::Text(
            "--- SOURCE 3: XML sample (lowest priority) ---\nUse this as a structural guide only if higher priority sources are absent or unclear.".into(),
        ));
        parts.push(ContentPart::Text(format!("```xml\n{xml}\n```")));
    }
}

fn single_string_schema(field: &str, description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "description": description }
        },
        "required": [field],
        "additionalProperties": false
    })
}

/// Request for a slot-annotated `<ARTICLE>` template.
pub fn article_template_request(sources: &PromptSources<'_>) -> OracleRequest {
    let main = format!(
        "You are creating a BMEcat <ARTICLE> template. Derive the exact structure from the provided specification files.
Pay close attention to the BMEcat version (1.2 or 2005) the specifications indicate. BMEcat 2005 uses <PRODUCT_DETAILS> instead of <ARTICLE_DETAILS>; adapt the template to the correct version.

{PRIORITY_RULES}

Use these placeholders for data: {{{{SUPPLIER_AID}}}}, {{{{DESCRIPTION_SHORT}}}}, {{{{DESCRIPTION_LONG}}}}, {{{{EAN}}}}, {{{{PRICE_AMOUNT}}}}, {{{{PRICE_CURRENCY}}}}, {{{{MANUFACTURER_AID}}}}, {{{{MANUFACTURER_NAME}}}}, {{{{ORDER_UNIT}}}}, {{{{PRICE_TYPE}}}}.
- {{{{PRICE_TYPE}}}} is the value of the price_type attribute of <ARTICLE_PRICE>.
- Replace all hardcoded data from any example with these placeholders.
- Inside the article element, directly after the primary details block (<ARTICLE_DETAILS>, <PRODUCT_DETAILS> or similar), include this exact marker for product features: <!-- {{{{PRODUCT_FEATURES}}}} -->"
    );

    let mut parts = vec![ContentPart::Text(main)];
    push_sources(&mut parts, sources, false);

    OracleRequest {
        task: OracleTask::ArticleTemplate,
        system: ARTICLE_SYSTEM.into(),
        parts,
        schema: single_string_schema(
            "articleTemplate",
            "A single XML string for the <ARTICLE> element, starting with <ARTICLE> and ending with </ARTICLE>.",
        ),
        temperature: TEMPLATE_TEMPERATURE,
    }
}

/// Request for a document body template whose header carries `header`'s data.
pub fn body_template_request(header: &HeaderConfig, sources: &PromptSources<'_>) -> OracleRequest {
    let main = format!(
        "Generate the main body of a BMEcat XML file, including the <HEADER>.
Derive the entire XML structure, including the <HEADER>, from the provided specification files, paying attention to the BMEcat version they indicate.

{PRIORITY_RULES}

Populate the <HEADER> with this data:
- Catalog ID: {}
- Catalog Version: {}
- Catalog Name: {}
- Territory: {}
- Currency: {}
- Supplier Name: {}
- Supplier Street: {}
- Supplier ZIP: {}
- Supplier City: {}
- Supplier Country: {}
- Supplier Email: {}
- Supplier URL: {}",
        header.catalog_id,
        header.catalog_version,
        header.catalog_name,
        header.territory,
        header.currency,
        header.supplier_name,
        header.supplier_street,
        header.supplier_zip,
        header.supplier_city,
        header.supplier_country,
        header.supplier_email,
        header.supplier_url,
    );

    let mut parts = vec![ContentPart::Text(main)];
    push_sources(&mut parts, sources, true);

    OracleRequest {
        task: OracleTask::BodyTemplate,
        system: BODY_SYSTEM.into(),
        parts,
        schema: single_string_schema("bmecatBody", "A single XML string for the <BMECAT> body."),
        temperature: TEMPLATE_TEMPERATURE,
    }
}

/// Request for a suggested field mapping over `headers`.
pub fn field_mapping_request(headers: &[String], sources: &PromptSources<'_>) -> OracleRequest {
    let main = format!(
        "Work in two steps:
1. Discover all BMEcat fields. Analyze the specification sources to find every BMEcat XML element meant for product data, including version-specific tags such as <PRODUCT_DETAILS> for BMEcat 2005. If no specification is provided, fall back to the standard BMEcat 1.2 fields. For each field give a user-friendly label, a brief description and whether it is mandatory. The key must be the exact XML tag name.
2. Map the CSV columns. For each discovered field, find the best matching CSV header and set mappedCsvHeader when a good match exists; omit it otherwise. Also find groups of columns that describe product features (name, value, optional unit) and list them in featureMappings.

Watch for domain synonyms: \"Supplier product number\" and \"Artikelnummer\" both map to SUPPLIER_AID.

{PRIORITY_RULES}

Available CSV headers:
[{}]

Every mapped value must be one of the exact header strings above. Do not invent headers.",
        headers.join(", ")
    );

    let mut parts = vec![ContentPart::Text(main)];
    push_sources(&mut parts, sources, false);

    OracleRequest {
        task: OracleTask::FieldMapping,
        system: MAPPING_SYSTEM.into(),
        parts,
        schema: mapping_schema(),
        temperature: MAPPING_TEMPERATURE,
    }
}

fn mapping_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "identifiedFields": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "key": { "type": "string", "description": "The BMEcat XML tag name, e.g. SUPPLIER_AID." },
                        "label": { "type": "string" },
                        "description": { "type": "string" },
                        "required": { "type": "boolean" },
                        "mappedCsvHeader": { "type": ["string", "null"], "description": "Matching CSV header, or null when there is none." }
                    },
                    "required": ["key", "label", "description", "required", "mappedCsvHeader"],
                    "additionalProperties": false
                }
            },
            "featureMappings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fname": { "type": "string", "description": "CSV header for the feature name." },
                        "fvalue": { "type": "string", "description": "CSV header for the feature value." },
                        "funit": { "type": ["string", "null"], "description": "CSV header for the feature unit, or null." }
                    },
                    "required": ["fname", "fvalue", "funit"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["identifiedFields", "featureMappings"],
        "additionalProperties": false
    })
}
