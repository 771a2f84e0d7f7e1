//! BMEcat document assembler.
//!
//! Picks classic or template-driven generation once per run and produces the
//! complete XML text. No path falls back to another mid-flight: any oracle or
//! contract failure fails the whole document.

use std::fmt;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use bmecat_shared::{
    AssemblyConfig, BmecatError, CatalogGroup, HeaderConfig, NormalizedRow, Result,
};

use crate::groups::{render_article_group_map, render_group_system};
use crate::oracle::{SpecSources, TemplatingOracle, request_article_template, request_body_template};
use crate::render::{assemble_body, document_prologue, render_article, render_header};
use crate::splice::{PatternSplice, RegionSplice};
use crate::template::{BODY_MARKER, fill_article_template};
use crate::xml::{XML_DECLARATION, ensure_declaration};

const HEADER_TAG: &str = "HEADER";
const CATALOG_TAG: &str = "T_NEW_CATALOG";
const ARTICLE_TAG: &str = "ARTICLE";

/// Indentation of articles inside `<T_NEW_CATALOG>`.
const ARTICLE_INDENT: &str = "\n    ";

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How a document is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStrategy {
    /// Fixed layout, no oracle.
    Classic,
    /// Oracle article template spliced into a supplied XML sample.
    SampleTemplate,
    /// Oracle article and body templates from a BSB file and/or PDF.
    SpecificationTemplate,
}

impl GenerationStrategy {
    pub fn select(sources: &SpecSources) -> Self {
        if sources.xml_sample.is_some() {
            Self::SampleTemplate
        } else if sources.structure_description.is_some() || sources.pdf_base64.is_some() {
            Self::SpecificationTemplate
        } else {
            Self::Classic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::SampleTemplate => "sample-template",
            Self::SpecificationTemplate => "specification-template",
        }
    }

    pub fn requires_oracle(&self) -> bool {
        !matches!(self, Self::Classic)
    }
}

impl fmt::Display for GenerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything one document is built from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub header: &'a HeaderConfig,
    pub rows: &'a [NormalizedRow],
    pub groups: &'a [CatalogGroup],
    pub sources: &'a SpecSources,
    /// Fixed generation timestamp; the local clock when `None`.
    pub generated_at: Option<NaiveDateTime>,
}

impl GenerationInput<'_> {
    fn timestamp(&self) -> NaiveDateTime {
        self.generated_at
            .unwrap_or_else(|| Local::now().naive_local())
    }

    fn header_xml(&self) -> String {
        render_header(self.header, self.timestamp())
    }

    /// `<T_NEW_CATALOG>` content around the given article XML.
    fn body_with(&self, articles: &str) -> String {
        assemble_body(
            &render_group_system(self.groups),
            articles,
            &render_article_group_map(self.rows),
        )
    }
}

// ---------------------------------------------------------------------------
// Classic path
// ---------------------------------------------------------------------------

/// Render a complete document with the fixed layout for `input.header.format`.
#[instrument(skip_all, fields(format = %input.header.format, rows = input.rows.len()))]
pub fn generate_classic(config: &AssemblyConfig, input: &GenerationInput<'_>) -> String {
    let articles: String = input
        .rows
        .iter()
        .filter_map(|row| render_article(row, &input.header.currency, config))
        .collect();
    let body = input.body_with(&articles);

    let mut doc = document_prologue(input.header.format);
    doc.push_str("  ");
    doc.push_str(&input.header_xml());
    doc.push_str("\n  <T_NEW_CATALOG>");
    doc.push_str(&body);
    doc.push_str("\n  </T_NEW_CATALOG>\n</BMECAT>\n");

    debug!(bytes = doc.len(), "classic document rendered");
    doc
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Produces documents, consulting the oracle when templates are needed.
pub struct Assembler<'a, O, S = PatternSplice> {
    config: &'a AssemblyConfig,
    oracle: Option<&'a O>,
    splice: S,
}

impl<'a, O: TemplatingOracle> Assembler<'a, O> {
    pub fn new(config: &'a AssemblyConfig, oracle: Option<&'a O>) -> Self {
        Self {
            config,
            oracle,
            splice: PatternSplice,
        }
    }
}

impl<'a, O: TemplatingOracle, S: RegionSplice> Assembler<'a, O, S> {
    /// Swap the region splicing strategy.
    pub fn with_splice<T: RegionSplice>(self, splice: T) -> Assembler<'a, O, T> {
        Assembler {
            config: self.config,
            oracle: self.oracle,
            splice,
        }
    }

    /// Generate a document using the strategy the sources call for.
    pub async fn generate(&self, input: &GenerationInput<'_>) -> Result<String> {
        match GenerationStrategy::select(input.sources) {
            GenerationStrategy::Classic => Ok(generate_classic(self.config, input)),
            _ => self.generate_from_template(input).await,
        }
    }

    /// Template-driven generation from an XML sample or BSB / PDF specification.
    #[instrument(skip_all, fields(rows = input.rows.len()))]
    pub async fn generate_from_template(&self, input: &GenerationInput<'_>) -> Result<String> {
        match input.sources.xml_sample.as_deref() {
            Some(sample) => self.generate_from_sample(input, sample).await,
            None => self.generate_from_specification(input).await,
        }
    }

    fn oracle(&self) -> Result<&'a O> {
        self.oracle.ok_or_else(|| {
            BmecatError::config("template-driven generation needs an oracle, but none is configured")
        })
    }

    async fn generate_from_sample(&self, input: &GenerationInput<'_>, sample: &str) -> Result<String> {
        if self.splice.find(sample, CATALOG_TAG).is_none() {
            return Err(BmecatError::structural(
                "the XML sample has no <T_NEW_CATALOG> element, so articles cannot be inserted",
            ));
        }
        let oracle = self.oracle()?;

        let hint = self.splice.extract(sample, ARTICLE_TAG);
        debug!(hint = hint.is_some(), "sample article hint");

        let template = request_article_template(oracle, input.sources, hint).await?;
        let body = input.body_with(&fill_articles(&template, input.rows));

        let document = match self.splice.replace_outer(sample, HEADER_TAG, &input.header_xml()) {
            Some(doc) => doc,
            None => {
                warn!("XML sample has no <HEADER>, keeping it without a generated header");
                sample.to_string()
            }
        };

        let document = self
            .splice
            .replace_inner(&document, CATALOG_TAG, &format!("{body}\n  "))
            .ok_or_else(|| BmecatError::structural("<T_NEW_CATALOG> vanished while splicing"))?;

        info!(bytes = document.len(), "sample document assembled");
        Ok(ensure_declaration(document))
    }

    async fn generate_from_specification(&self, input: &GenerationInput<'_>) -> Result<String> {
        let oracle = self.oracle()?;

        let (template, body_template) = tokio::try_join!(
            request_article_template(oracle, input.sources, None),
            request_body_template(oracle, input.header, input.sources),
        )?;

        let body = input.body_with(&fill_articles(&template, input.rows));
        let document = body_template.replacen(BODY_MARKER, &body, 1);

        info!(bytes = document.len(), "specification document assembled");
        Ok(format!("{XML_DECLARATION}\n{document}"))
    }
}

/// Fill the article template once per renderable row.
fn fill_articles(template: &str, rows: &[NormalizedRow]) -> String {
    rows.iter()
        .filter(|row| row.is_renderable())
        .map(|row| format!("{ARTICLE_INDENT}{}", fill_article_template(template, row)))
        .collect()
}
