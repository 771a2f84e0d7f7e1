//! Templating oracle port and the reply contract.
//!
//! The oracle is any model endpoint that takes ordered content parts plus a
//! JSON schema and replies with raw text. This module owns what a usable
//! reply looks like; transports live elsewhere (see [`crate::openrouter`]).

use std::future::Future;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use bmecat_shared::{BmecatError, HeaderConfig, Result, TemplateContractError, TemplateKind};

use crate::prompts::{self, PromptSources};
use crate::template::{BODY_MARKER, FEATURES_MARKER};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// What the oracle is being asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleTask {
    ArticleTemplate,
    BodyTemplate,
    FieldMapping,
}

impl OracleTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArticleTemplate => "article_template",
            Self::BodyTemplate => "body_template",
            Self::FieldMapping => "field_mapping",
        }
    }
}

/// One ordered piece of the user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Inline document, passed through as base64.
    Document {
        mime_type: String,
        data_base64: String,
    },
}

/// A single oracle call.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub task: OracleTask,
    pub system: String,
    pub parts: Vec<ContentPart>,
    /// JSON schema the reply must conform to.
    pub schema: serde_json::Value,
    pub temperature: f32,
}

/// Port to a model that answers [`OracleRequest`]s with raw reply text.
pub trait TemplatingOracle: Send + Sync {
    fn complete(&self, request: &OracleRequest) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Specification sources
// ---------------------------------------------------------------------------

/// Specification artifacts supplied for one generation run.
#[derive(Debug, Clone, Default)]
pub struct SpecSources {
    /// Proprietary structure description (BSB), highest priority.
    pub structure_description: Option<String>,
    /// PDF specification, base64-encoded.
    pub pdf_base64: Option<String>,
    /// Full BMEcat XML sample, lowest priority.
    pub xml_sample: Option<String>,
}

impl SpecSources {
    /// Attach a PDF from its raw bytes.
    pub fn with_pdf_bytes(mut self, bytes: &[u8]) -> Self {
        self.pdf_base64 = Some(STANDARD.encode(bytes));
        self
    }

    /// Whether no artifact was supplied at all.
    pub fn is_empty(&self) -> bool {
        self.structure_description.is_none() && self.pdf_base64.is_none() && self.xml_sample.is_none()
    }

    /// Borrow the sources for prompt building, with `xml_hint` as the lowest-priority part.
    pub(crate) fn prompt_sources<'a>(&'a self, xml_hint: Option<&'a str>) -> PromptSources<'a> {
        PromptSources {
            structure_description: self.structure_description.as_deref(),
            pdf_base64: self.pdf_base64.as_deref(),
            xml_hint,
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Whole reply must be one `<ARTICLE ...>...</ARTICLE>` element.
static ARTICLE_TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^<ARTICLE\b[^>]*>.*</ARTICLE>$").expect("article template regex")
});

/// Body must open with the root element.
static BODY_TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^<BMECAT\b[^>]*>").expect("body template regex"));

/// Check an article template against the slot contract.
pub fn validate_article_template(text: &str) -> std::result::Result<(), TemplateContractError> {
    if !text.contains(FEATURES_MARKER) {
        return Err(TemplateContractError::MissingMarker {
            kind: TemplateKind::Article,
            marker: FEATURES_MARKER,
        });
    }
    if !ARTICLE_TEMPLATE_RE.is_match(text) {
        return Err(TemplateContractError::InvalidTemplate {
            kind: TemplateKind::Article,
            root: "ARTICLE",
        });
    }
    Ok(())
}

/// Check a document body template against the slot contract.
pub fn validate_body_template(text: &str) -> std::result::Result<(), TemplateContractError> {
    if text.starts_with("<?xml") || !BODY_TEMPLATE_RE.is_match(text) {
        return Err(TemplateContractError::InvalidTemplate {
            kind: TemplateKind::Body,
            root: "BMECAT",
        });
    }
    if !text.contains(BODY_MARKER) {
        return Err(TemplateContractError::MissingMarker {
            kind: TemplateKind::Body,
            marker: BODY_MARKER,
        });
    }
    Ok(())
}

/// Pull the trimmed string `field` out of a JSON reply envelope.
pub fn extract_reply_field(
    reply: &str,
    field: &str,
) -> std::result::Result<String, TemplateContractError> {
    let json_text = strip_code_fence(reply.trim());
    if json_text.is_empty() {
        return Err(TemplateContractError::MalformedReply {
            detail: "empty reply".into(),
        });
    }
    let value: serde_json::Value =
        serde_json::from_str(json_text).map_err(|e| TemplateContractError::MalformedReply {
            detail: format!("invalid JSON: {e}"),
        })?;
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| TemplateContractError::MalformedReply {
            detail: format!("missing string field \"{field}\""),
        })
}

/// Drop a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Map transport failures that describe a bad input onto their contract variants.
pub fn classify_oracle_error(err: BmecatError) -> BmecatError {
    let BmecatError::Oracle(message) = &err else {
        return err;
    };
    let lower = message.to_lowercase();
    if lower.contains("no pages") {
        return TemplateContractError::UnreadableDocument.into();
    }
    if ["token count", "token limit", "too many tokens", "context length"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return TemplateContractError::InputTooLarge.into();
    }
    err
}

// ---------------------------------------------------------------------------
// Template requests
// ---------------------------------------------------------------------------

/// Ask for an article template. `xml_hint` is the first article of a sample, if any.
#[instrument(skip_all, fields(hint = xml_hint.is_some()))]
pub async fn request_article_template<O: TemplatingOracle>(
    oracle: &O,
    sources: &SpecSources,
    xml_hint: Option<&str>,
) -> Result<String> {
    let request = prompts::article_template_request(&sources.prompt_sources(xml_hint));
    let reply = oracle.complete(&request).await.map_err(classify_oracle_error)?;
    let template = extract_reply_field(&reply, "articleTemplate")?;
    if let Err(e) = validate_article_template(&template) {
        warn!(error = %e, "article template rejected");
        return Err(e.into());
    }
    debug!(bytes = template.len(), "article template accepted");
    Ok(template)
}

/// Ask for a document body template populated with `header` data.
#[instrument(skip_all)]
pub async fn request_body_template<O: TemplatingOracle>(
    oracle: &O,
    header: &HeaderConfig,
    sources: &SpecSources,
) -> Result<String> {
    let request = prompts::body_template_request(header, &sources.prompt_sources(None));
    let reply = oracle.complete(&request).await.map_err(classify_oracle_error)?;
    let template = extract_reply_field(&reply, "bmecatBody")?;
    if let Err(e) = validate_body_template(&template) {
        warn!(error = %e, "body template rejected");
        return Err(e.into());
    }
    debug!(bytes = template.len(), "body template accepted");
    Ok(template)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle for unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Replies per task; records every request it sees.
    #[derive(Default)]
    pub struct ScriptedOracle {
        replies: HashMap<OracleTask, Result<String>>,
        pub seen: Mutex<Vec<OracleRequest>>,
    }

    impl ScriptedOracle {
        pub fn reply(mut self, task: OracleTask, text: impl Into<String>) -> Self {
            self.replies.insert(task, Ok(text.into()));
            self
        }

        pub fn fail(mut self, task: OracleTask, message: impl Into<String>) -> Self {
            self.replies
                .insert(task, Err(BmecatError::Oracle(message.into())));
            self
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().map(|s| s.len()).unwrap_or(0)
        }
    }

    impl TemplatingOracle for ScriptedOracle {
        async fn complete(&self, request: &OracleRequest) -> Result<String> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            match self.replies.get(&request.task) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(BmecatError::Oracle(e.to_string())),
                None => Err(BmecatError::Oracle(format!(
                    "no scripted reply for {}",
                    request.task.as_str()
                ))),
            }
        }
    }

    pub fn article_reply(template: &str) -> String {
        serde_json::json!({ "articleTemplate": template }).to_string()
    }

    pub fn body_reply(template: &str) -> String {
        serde_json::json!({ "bmecatBody": template }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    const GOOD_ARTICLE: &str =
        "<ARTICLE><SUPPLIER_AID>{{SUPPLIER_AID}}</SUPPLIER_AID><!-- {{PRODUCT_FEATURES}} --></ARTICLE>";

    #[test]
    fn article_contract() {
        assert!(validate_article_template(GOOD_ARTICLE).is_ok());
        assert!(validate_article_template(r#"<article mode="new"><!-- {{PRODUCT_FEATURES}} --></article>"#).is_ok());
        assert!(matches!(
            validate_article_template("<ARTICLE></ARTICLE>"),
            Err(TemplateContractError::MissingMarker { kind: TemplateKind::Article, .. })
        ));
        assert!(matches!(
            validate_article_template("<PRODUCT><!-- {{PRODUCT_FEATURES}} --></PRODUCT>"),
            Err(TemplateContractError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn body_contract() {
        let good = "<BMECAT version=\"2005\"><T_NEW_CATALOG><!-- {{T_NEW_CATALOG_CONTENT}} --></T_NEW_CATALOG></BMECAT>";
        assert!(validate_body_template(good).is_ok());
        assert!(validate_body_template(&good.replace("BMECAT", "BMEcat")).is_ok());
        assert!(matches!(
            validate_body_template(&format!("<?xml version=\"1.0\"?>{good}")),
            Err(TemplateContractError::InvalidTemplate { kind: TemplateKind::Body, .. })
        ));
        assert!(matches!(
            validate_body_template("<BMECAT><T_NEW_CATALOG/></BMECAT>"),
            Err(TemplateContractError::MissingMarker { kind: TemplateKind::Body, .. })
        ));
    }

    #[test]
    fn reply_envelope_parsing() {
        assert_eq!(
            extract_reply_field(r#"  {"articleTemplate": "  <ARTICLE/>  "} "#, "articleTemplate").unwrap(),
            "<ARTICLE/>"
        );
        assert_eq!(
            extract_reply_field("```json\n{\"bmecatBody\":\"<BMECAT/>\"}\n```", "bmecatBody").unwrap(),
            "<BMECAT/>"
        );
        for bad in ["", "not json", r#"{"other": "x"}"#, r#"{"articleTemplate": 5}"#] {
            assert!(matches!(
                extract_reply_field(bad, "articleTemplate"),
                Err(TemplateContractError::MalformedReply { .. })
            ));
        }
    }

    #[test]
    fn transport_errors_are_classified() {
        assert!(matches!(
            classify_oracle_error(BmecatError::Oracle("The document has no pages.".into())),
            BmecatError::TemplateContract(TemplateContractError::UnreadableDocument)
        ));
        assert!(matches!(
            classify_oracle_error(BmecatError::Oracle("input token count exceeds the maximum".into())),
            BmecatError::TemplateContract(TemplateContractError::InputTooLarge)
        ));
        assert!(matches!(
            classify_oracle_error(BmecatError::Oracle("HTTP 503".into())),
            BmecatError::Oracle(_)
        ));
    }

    #[tokio::test]
    async fn article_request_orders_sources_by_priority() {
        let oracle = ScriptedOracle::default().reply(OracleTask::ArticleTemplate, article_reply(GOOD_ARTICLE));
        let sources = SpecSources {
            structure_description: Some("<BSB/>".into()),
            pdf_base64: Some("JVBERi0=".into()),
            xml_sample: None,
        };
        let template = request_article_template(&oracle, &sources, Some("<ARTICLE>hint</ARTICLE>"))
            .await
            .expect("template");
        assert_eq!(template, GOOD_ARTICLE);

        let seen = oracle.seen.lock().unwrap();
        let parts = &seen[0].parts;
        let position = |needle: &str| {
            parts
                .iter()
                .position(|p| match p {
                    ContentPart::Text(t) => t.contains(needle),
                    ContentPart::Document { .. } => needle == "<pdf>",
                })
                .unwrap_or_else(|| panic!("part {needle} missing"))
        };
        assert!(position("<BSB/>") < position("<pdf>"));
        assert!(position("<pdf>") < position("<ARTICLE>hint</ARTICLE>"));
        assert!((seen[0].temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn missing_marker_fails_request() {
        let oracle = ScriptedOracle::default()
            .reply(OracleTask::ArticleTemplate, article_reply("<ARTICLE></ARTICLE>"));
        let err = request_article_template(&oracle, &SpecSources::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BmecatError::TemplateContract(TemplateContractError::MissingMarker { .. })
        ));
    }

    #[tokio::test]
    async fn unreadable_pdf_is_reported() {
        let oracle = ScriptedOracle::default().fail(OracleTask::BodyTemplate, "document has no pages");
        let err = request_body_template(&oracle, &HeaderConfig::default(), &SpecSources::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BmecatError::TemplateContract(TemplateContractError::UnreadableDocument)
        ));
    }

    #[test]
    fn pdf_bytes_are_base64_encoded() {
        let sources = SpecSources::default().with_pdf_bytes(b"%PDF-1.4");
        assert_eq!(sources.pdf_base64.as_deref(), Some("JVBERi0xLjQ="));
        assert!(!sources.is_empty());
    }
}
