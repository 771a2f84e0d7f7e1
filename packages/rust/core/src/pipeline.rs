//! End-to-end generation: CSV text → mapping → rows → groups → BMEcat XML.

use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tracing::{debug, info, instrument, warn};

use bmecat_ingest::{parse_csv, parse_structure_csv, transform, validate_xml_chars};
use bmecat_shared::{AssemblyConfig, BmecatError, FieldMapping, HeaderConfig, Result};

use crate::assembler::{Assembler, GenerationInput, GenerationStrategy};
use crate::groups::{build_group_tree, group_count};
use crate::oracle::{SpecSources, TemplatingOracle};
use crate::suggest::suggest_mapping;

/// Where the CSV-to-field mapping comes from.
#[derive(Debug, Clone)]
pub enum MappingSource {
    /// A mapping loaded from `mapping.toml`.
    File(FieldMapping),
    /// Ask the oracle to map the CSV headers.
    Smart,
}

/// Everything one `generate` run needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Product CSV text.
    pub csv_text: String,
    pub header: HeaderConfig,
    pub mapping: MappingSource,
    /// Catalog-structure CSV text, if any.
    pub structure_csv: Option<String>,
    pub sources: SpecSources,
    /// Fixed generation timestamp; the local clock when `None`.
    pub generated_at: Option<NaiveDateTime>,
}

/// Result of [`run_generation`].
#[derive(Debug)]
pub struct GenerationReport {
    /// The complete XML document.
    pub xml: String,
    pub strategy: GenerationStrategy,
    /// Rows rendered as articles.
    pub article_count: usize,
    /// Rows dropped for missing article id or price.
    pub skipped_rows: usize,
    pub group_count: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the document is complete.
    fn done(&self, report: &GenerationReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _report: &GenerationReport) {}
}

/// Run one generation.
///
/// 1. Reject characters XML cannot carry
/// 2. Parse the product CSV
/// 3. Resolve the field mapping (file or smart)
/// 4. Normalize rows and build the group tree
/// 5. Assemble the document with the strategy the sources call for
#[instrument(skip_all, fields(format = %request.header.format))]
pub async fn run_generation<O: TemplatingOracle>(
    config: &AssemblyConfig,
    request: &GenerationRequest,
    oracle: Option<&O>,
    progress: &dyn ProgressReporter,
) -> Result<GenerationReport> {
    let start = Instant::now();
    let strategy = GenerationStrategy::select(&request.sources);
    info!(%strategy, "starting generation");

    let needs_oracle =
        strategy.requires_oracle() || matches!(request.mapping, MappingSource::Smart);
    if needs_oracle && oracle.is_none() {
        return Err(BmecatError::config(
            "this generation needs an OpenRouter API key; set OPENROUTER_API_KEY or configure [openrouter]",
        ));
    }

    // --- Phase 1: Input ---
    progress.phase("Reading product data");
    validate_xml_chars(&request.csv_text)?;
    let parsed = parse_csv(&request.csv_text)?;
    info!(
        columns = parsed.headers.len(),
        rows = parsed.rows.len(),
        "product CSV parsed"
    );

    // --- Phase 2: Mapping ---
    let mapping = match (&request.mapping, oracle) {
        (MappingSource::File(mapping), _) => mapping.clone(),
        (MappingSource::Smart, Some(oracle)) => {
            progress.phase("Suggesting field mapping");
            suggest_mapping(oracle, &parsed.headers, &request.sources)
                .await?
                .to_field_mapping()
        }
        (MappingSource::Smart, None) => {
            return Err(BmecatError::config("smart mapping needs an oracle"));
        }
    };
    let missing = mapping.missing_required();
    if !missing.is_empty() {
        let names: Vec<String> = missing
            .iter()
            .map(|f| format!("{} ({})", f.label(), f.as_str()))
            .collect();
        warn!(fields = ?names, "required fields are not mapped");
    }
    let extra = mapping.extra_keys();
    if !extra.is_empty() {
        debug!(keys = ?extra, "mapping carries non-standard fields");
    }

    progress.phase("Normalizing rows");
    let rows = transform(&parsed.rows, &mapping);
    let article_count = rows.iter().filter(|row| row.is_renderable()).count();

    // --- Phase 3: Groups ---
    let groups = match request.structure_csv.as_deref() {
        Some(text) => {
            progress.phase("Building catalog groups");
            validate_xml_chars(text)?;
            build_group_tree(&parse_structure_csv(text)?)?
        }
        None => Vec::new(),
    };

    // --- Phase 4: Assembly ---
    progress.phase(match strategy {
        GenerationStrategy::Classic => "Rendering catalog",
        _ => "Requesting templates",
    });
    let input = GenerationInput {
        header: &request.header,
        rows: &rows,
        groups: &groups,
        sources: &request.sources,
        generated_at: request.generated_at,
    };
    let xml = Assembler::new(config, oracle).generate(&input).await?;

    let report = GenerationReport {
        xml,
        strategy,
        article_count,
        skipped_rows: rows.len() - article_count,
        group_count: group_count(&groups),
        elapsed: start.elapsed(),
    };

    info!(
        articles = report.article_count,
        skipped = report.skipped_rows,
        groups = report.group_count,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "generation complete"
    );
    progress.done(&report);

    Ok(report)
}
