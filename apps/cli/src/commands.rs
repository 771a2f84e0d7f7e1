//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use bmecat_core::openrouter::OpenRouterOracle;
use bmecat_core::oracle::SpecSources;
use bmecat_core::pipeline::{
    GenerationReport, GenerationRequest, MappingSource, ProgressReporter, run_generation,
};
use bmecat_shared::{
    AppConfig, AssemblyConfig, BmecatFormat, FieldMapping, HeaderConfig, SpecId, SpecKind,
    StoredSpecification, init_config, load_config, resolve_api_key, spec_db_path,
};
use bmecat_storage::{SpecStore, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// BMEcat builder: product CSV in, BMEcat catalog out.
#[derive(Parser)]
#[command(
    name = "bmecat",
    version,
    about = "Generate BMEcat 1.2 / 2005 catalogs from product CSV exports.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a BMEcat document.
    Generate(GenerateArgs),

    /// Manage stored specification files.
    Spec {
        #[command(subcommand)]
        action: SpecAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct GenerateArgs {
    /// Product CSV file.
    #[arg(long)]
    pub csv: PathBuf,

    /// Header TOML with catalog and supplier data.
    #[arg(long)]
    pub header: PathBuf,

    /// Field mapping TOML.
    #[arg(long, required_unless_present = "smart_mapping", conflicts_with = "smart_mapping")]
    pub mapping: Option<PathBuf>,

    /// Let the oracle map CSV headers to BMEcat fields.
    #[arg(long)]
    pub smart_mapping: bool,

    /// Catalog-structure CSV (GROUP_ID, GROUP_NAME, PARENT_ID).
    #[arg(long)]
    pub structure: Option<PathBuf>,

    /// BMEcat XML sample to follow.
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// PDF specification document.
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    /// Structure description (BSB) file.
    #[arg(long)]
    pub bsb: Option<PathBuf>,

    /// Stored specification id (repeatable).
    #[arg(long = "spec")]
    pub specs: Vec<SpecId>,

    /// Target format, overriding the header file.
    #[arg(long)]
    pub format: Option<BmecatFormat>,

    /// OpenRouter model, overriding the config.
    #[arg(long)]
    pub model: Option<String>,

    /// Output file (defaults to stdout).
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Specification store subcommands.
#[derive(Subcommand)]
pub(crate) enum SpecAction {
    /// List stored specifications.
    List,
    /// Store a specification file.
    Save {
        /// Display name.
        #[arg(long)]
        name: String,

        /// pdf, bsb (structure_description) or xml (xml_sample).
        #[arg(long)]
        kind: SpecKind,

        /// File to store.
        file: PathBuf,
    },
    /// Delete a stored specification.
    Delete {
        id: SpecId,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so XML can go to stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = ["bmecat", "bmecat_core", "bmecat_ingest", "bmecat_shared", "bmecat_storage"]
        .map(|target| format!("{target}={level}"))
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Spec { action } => match action {
            SpecAction::List => cmd_spec_list().await,
            SpecAction::Save { name, kind, file } => cmd_spec_save(&name, kind, &file).await,
            SpecAction::Delete { id } => cmd_spec_delete(&id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let config = load_config()?;

    let csv_text = read_text(&args.csv)?;
    let header_text = read_text(&args.header)?;
    let mut header = HeaderConfig::from_toml(&header_text)?;
    header.format = resolve_format(&header_text, header.format, args.format, &config)?;

    let mapping = match &args.mapping {
        Some(path) => MappingSource::File(FieldMapping::from_toml(&read_text(path)?)?),
        None => MappingSource::Smart,
    };
    let structure_csv = args.structure.as_deref().map(read_text).transpose()?;

    let mut sources = SpecSources::default();
    if !args.specs.is_empty() {
        let storage = Storage::open(&spec_db_path(&config)?).await?;
        for id in &args.specs {
            let spec = storage
                .get(id)
                .await?
                .ok_or_else(|| eyre!("no stored specification with id {id}"))?;
            apply_stored_spec(&mut sources, spec);
        }
    }
    if let Some(path) = &args.template {
        sources.xml_sample = Some(read_text(path)?);
    }
    if let Some(path) = &args.bsb {
        sources.structure_description = Some(read_text(path)?);
    }
    if let Some(path) = &args.pdf {
        let bytes = std::fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))?;
        sources = sources.with_pdf_bytes(&bytes);
    }

    let needs_oracle = args.smart_mapping || !sources.is_empty();
    let oracle = if needs_oracle {
        let api_key = resolve_api_key(&config)?;
        let oracle = OpenRouterOracle::new(&config.openrouter, api_key)?;
        Some(match &args.model {
            Some(model) => oracle.with_model(model.clone()),
            None => oracle,
        })
    } else {
        None
    };

    info!(
        csv = %args.csv.display(),
        format = %header.format,
        model = oracle.as_ref().map(|o| o.model()).unwrap_or("none"),
        "generating catalog"
    );

    let request = GenerationRequest {
        csv_text,
        header,
        mapping,
        structure_csv,
        sources,
        generated_at: None,
    };
    let reporter = CliProgress::new();
    let result = run_generation(
        &AssemblyConfig::from(&config),
        &request,
        oracle.as_ref(),
        &reporter,
    )
    .await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    let report = result?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, &report.xml)
                .wrap_err_with(|| format!("writing {}", path.display()))?;
            println!();
            println!("  Catalog written to {}", path.display());
            println!("  Strategy: {}", report.strategy);
            println!("  Articles: {}", report.article_count);
            println!("  Skipped:  {}", report.skipped_rows);
            println!("  Groups:   {}", report.group_count);
            println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
            println!();
        }
        None => print!("{}", report.xml),
    }

    Ok(())
}

/// Flag beats header file, header file beats `[defaults]`.
fn resolve_format(
    header_text: &str,
    from_header: BmecatFormat,
    flag: Option<BmecatFormat>,
    config: &AppConfig,
) -> Result<BmecatFormat> {
    if let Some(format) = flag {
        return Ok(format);
    }
    let table: toml::Table = header_text.parse().wrap_err("parsing header TOML")?;
    if table.contains_key("format") {
        Ok(from_header)
    } else {
        Ok(config.defaults.format)
    }
}

/// Slot a stored specification into the matching source.
fn apply_stored_spec(sources: &mut SpecSources, spec: StoredSpecification) {
    let slot = match spec.kind {
        SpecKind::Pdf => &mut sources.pdf_base64,
        SpecKind::StructureDescription => &mut sources.structure_description,
        SpecKind::XmlSample => &mut sources.xml_sample,
    };
    if slot.is_some() {
        warn!(id = %spec.id, kind = spec.kind.as_str(), "several stored specifications of one kind, using the last");
    }
    *slot = Some(spec.content);
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _report: &GenerationReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// spec
// ---------------------------------------------------------------------------

async fn open_store() -> Result<Storage> {
    let config = load_config()?;
    Ok(Storage::open(&spec_db_path(&config)?).await?)
}

async fn cmd_spec_list() -> Result<()> {
    let storage = open_store().await?;
    let specs = storage.list().await?;
    if specs.is_empty() {
        println!("No stored specifications.");
        return Ok(());
    }
    for spec in specs {
        println!(
            "{}  {:<21}  {:>9}  {}  {}",
            spec.id,
            spec.kind.as_str(),
            spec.content.len(),
            spec.created_at.format("%Y-%m-%d %H:%M"),
            spec.name
        );
    }
    Ok(())
}

async fn cmd_spec_save(name: &str, kind: SpecKind, file: &Path) -> Result<()> {
    let content = match kind {
        SpecKind::Pdf => {
            let bytes =
                std::fs::read(file).wrap_err_with(|| format!("reading {}", file.display()))?;
            STANDARD.encode(bytes)
        }
        SpecKind::StructureDescription | SpecKind::XmlSample => read_text(file)?,
    };
    let storage = open_store().await?;
    let spec = storage.save(name, kind, &content).await?;
    println!("Stored {} as {} ({})", spec.name, spec.id, spec.kind.as_str());
    Ok(())
}

async fn cmd_spec_delete(id: &SpecId) -> Result<()> {
    let storage = open_store().await?;
    if storage.delete(id).await? {
        println!("Deleted {id}");
    } else {
        println!("No stored specification with id {id}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn generate_requires_a_mapping_source() {
        assert!(Cli::try_parse_from(["bmecat", "generate", "--csv", "a.csv", "--header", "h.toml"]).is_err());
        assert!(
            Cli::try_parse_from([
                "bmecat", "generate", "--csv", "a.csv", "--header", "h.toml", "--mapping", "m.toml",
                "--smart-mapping",
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from([
            "bmecat", "generate", "--csv", "a.csv", "--header", "h.toml", "--smart-mapping",
            "--format", "2005",
        ])
        .expect("parse");
        match cli.command {
            Command::Generate(args) => {
                assert!(args.smart_mapping);
                assert_eq!(args.format, Some(BmecatFormat::V2005));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn spec_kind_aliases_parse() {
        let cli = Cli::try_parse_from(["bmecat", "spec", "save", "--name", "n", "--kind", "bsb", "f.xml"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Spec {
                action: SpecAction::Save {
                    kind: SpecKind::StructureDescription,
                    ..
                }
            }
        ));
    }

    #[test]
    fn format_precedence() {
        let mut config = AppConfig::default();
        config.defaults.format = BmecatFormat::V2005;

        let explicit = "format = \"1.2\"\ncatalog_id = \"K\"";
        let implicit = "catalog_id = \"K\"";
        assert_eq!(
            resolve_format(implicit, BmecatFormat::V1_2, None, &config).unwrap(),
            BmecatFormat::V2005
        );
        assert_eq!(
            resolve_format(explicit, BmecatFormat::V1_2, None, &config).unwrap(),
            BmecatFormat::V1_2
        );
        assert_eq!(
            resolve_format(explicit, BmecatFormat::V1_2, Some(BmecatFormat::V2005), &config).unwrap(),
            BmecatFormat::V2005
        );
    }

    #[test]
    fn stored_specs_fill_their_slots() {
        let spec = |kind, content: &str| StoredSpecification {
            id: SpecId::new(),
            name: "s".into(),
            kind,
            content: content.into(),
            sha256: String::new(),
            created_at: Utc::now(),
        };
        let mut sources = SpecSources::default();
        apply_stored_spec(&mut sources, spec(SpecKind::Pdf, "JVBERi0="));
        apply_stored_spec(&mut sources, spec(SpecKind::XmlSample, "<BMECAT/>"));
        assert_eq!(sources.pdf_base64.as_deref(), Some("JVBERi0="));
        assert_eq!(sources.xml_sample.as_deref(), Some("<BMECAT/>"));
        assert!(sources.structure_description.is_none());
    }
}
