//! CLI binary for exercising pipesync step codecs.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use pipesync_codec::{
    default_registry, redistribute_slider, CleanCodec, CodecRegistry, FeaturesTargetCodec,
    InspectionCodec, LinearRegressionCodec, ParamsVariant, ReadCsvCodec, SplitCodec, SplitName,
    SplitParams, SplitPlan, StepCodec, StepParams,
};
use pipesync_types::{ExecutionResults, StepKind, TypedResult};
use pipesync_workspace::{
    DelimitedParser, ExecutionOutcome, InputData, MemoryRuntime, Session, SessionConfig,
    SimpleDelimitedParser,
};

#[derive(Parser)]
#[command(name = "pipesync", version, about = "Step codec tool for pipesync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the step kinds that have a codec
    Kinds,

    /// Print the source for a step's parameters
    Generate {
        /// Step kind, e.g. read_csv or split
        kind: StepKind,

        /// Parameters as JSON (file path or '-' for stdin); defaults when omitted
        #[arg(short, long)]
        params: Option<PathBuf>,
    },

    /// Recover a step's parameters from source and print them as JSON
    Parse {
        kind: StepKind,

        /// Source file, or '-' for stdin
        source: PathBuf,
    },

    /// Parse source, regenerate it, and report whether it was already canonical
    Roundtrip {
        kind: StepKind,

        /// Source file, or '-' for stdin
        source: PathBuf,
    },

    /// Settle an edited split source against the parameters it was edited from
    Normalize {
        /// Edited split source, or '-' for stdin
        source: PathBuf,

        /// Split source the edit started from (default parameters when omitted)
        #[arg(short, long)]
        before: Option<PathBuf>,
    },

    /// Move one split slider and show how the others absorb the change
    Slider {
        /// train, validation or test
        split: SplitName,

        /// New percentage for that split
        value: u32,

        /// Split parameters as JSON (defaults when omitted)
        #[arg(short, long)]
        params: Option<PathBuf>,
    },

    /// Show the header and first rows of a delimited file
    Preview {
        file: PathBuf,

        #[arg(short, long, default_value = ",")]
        delimiter: String,
    },

    /// Dry-run step sources in order against an in-memory runtime and print
    /// the resulting lineage
    Exec {
        /// Step source files; the kind of each is detected from its text
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Input file made available to every step
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let registry = default_registry();

    match cli.command {
        Commands::Kinds => cmd_kinds(&registry),
        Commands::Generate { kind, params } => cmd_generate(&registry, kind, params.as_deref())?,
        Commands::Parse { kind, source } => cmd_parse(&registry, kind, &source)?,
        Commands::Roundtrip { kind, source } => cmd_roundtrip(&registry, kind, &source)?,
        Commands::Normalize { source, before } => cmd_normalize(&source, before.as_deref())?,
        Commands::Slider { split, value, params } => cmd_slider(split, value, params.as_deref())?,
        Commands::Preview { file, delimiter } => cmd_preview(&config, &file, &delimiter)?,
        Commands::Exec { sources, input } => {
            cmd_exec(&registry, config, &sources, input.as_deref()).await?;
        }
    }

    Ok(())
}

/// Read a file, or stdin when the path is `-`.
fn read_text(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SessionConfig> {
    match path {
        Some(path) => Ok(SessionConfig::from_json_str(&read_text(path)?)?),
        None => Ok(SessionConfig::default()),
    }
}

fn load_params(
    registry: &CodecRegistry,
    kind: StepKind,
    path: Option<&Path>,
) -> anyhow::Result<StepParams> {
    let codec = registry.require(kind)?;
    match path {
        Some(path) => {
            let value: serde_json::Value = serde_json::from_str(&read_text(path)?)?;
            Ok(codec.params_from_json(value)?)
        }
        None => Ok(codec.default_params()),
    }
}

fn cmd_kinds(registry: &CodecRegistry) {
    for kind in registry.kinds() {
        println!("{}", kind);
    }
}

fn cmd_generate(registry: &CodecRegistry, kind: StepKind, params: Option<&Path>) -> anyhow::Result<()> {
    let params = load_params(registry, kind, params)?;
    println!("{}", registry.require(kind)?.generate(&params)?);
    Ok(())
}

fn cmd_parse(registry: &CodecRegistry, kind: StepKind, source: &Path) -> anyhow::Result<()> {
    let text = read_text(source)?;
    let Some(params) = registry.require(kind)?.parse_default(&text) else {
        anyhow::bail!("{} does not look like a {} step", source.display(), kind);
    };
    println!("{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn cmd_roundtrip(registry: &CodecRegistry, kind: StepKind, source: &Path) -> anyhow::Result<()> {
    let codec = registry.require(kind)?;
    let text = read_text(source)?;
    let Some(params) = codec.parse_default(&text) else {
        anyhow::bail!("{} does not look like a {} step", source.display(), kind);
    };

    let regenerated = codec.generate(&params)?;
    let reparsed = codec.parse(&regenerated, &params)?;
    if reparsed.as_ref() != Some(&params) {
        anyhow::bail!("regenerated source does not parse back to the same parameters");
    }

    println!("{}", regenerated);
    if regenerated.trim_end() == text.trim_end() {
        eprintln!("Source is canonical");
    } else {
        eprintln!("Source was rewritten to canonical form");
    }
    Ok(())
}

fn split_params_from(path: &Path) -> anyhow::Result<SplitParams> {
    let text = read_text(path)?;
    SplitCodec::parse_default(&text)
        .ok_or_else(|| anyhow::anyhow!("{} does not look like a split step", path.display()))
}

fn print_plan(plan: &SplitPlan) {
    for name in &plan.order {
        println!("{:<10} {:>3}%", name.as_str(), plan.percent(*name));
    }
    println!(
        "total      {:>3}%{}",
        plan.total(),
        if plan.is_valid() { "" } else { "  (invalid)" }
    );
}

fn cmd_normalize(source: &Path, before: Option<&Path>) -> anyhow::Result<()> {
    let before = match before {
        Some(path) => split_params_from(path)?,
        None => SplitParams::default(),
    };
    let text = read_text(source)?;
    let Some(parsed) = SplitCodec::parse(&text, &before) else {
        anyhow::bail!("{} does not look like a split step", source.display());
    };

    let settled = SplitCodec::normalize(parsed, &before);
    print_plan(&SplitPlan::from_params(&settled));
    println!();
    println!("{}", SplitCodec::generate(&settled));
    Ok(())
}

fn cmd_slider(split: SplitName, value: u32, params: Option<&Path>) -> anyhow::Result<()> {
    let mut params: SplitParams = match params {
        Some(path) => serde_json::from_str(&read_text(path)?)?,
        None => SplitParams::default(),
    };
    if !params.is_active(split) {
        anyhow::bail!("split '{}' is not active", split);
    }

    let plan = redistribute_slider(&SplitPlan::from_params(&params), split, value);
    plan.apply_to(&mut params);
    print_plan(&plan);
    println!("\n{}", serde_json::to_string_pretty(&params)?);
    Ok(())
}

fn cmd_preview(config: &SessionConfig, file: &Path, delimiter: &str) -> anyhow::Result<()> {
    let text = read_text(file)?;
    let preview = pipesync_workspace::build_preview(
        &SimpleDelimitedParser,
        &text,
        delimiter,
        config.preview_rows,
    );

    println!("{}", preview.columns.join(" | "));
    for row in &preview.rows {
        println!("{}", row.join(" | "));
    }
    println!("\n{} columns, {} rows shown", preview.columns.len(), preview.rows.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Dry-run execution
// ---------------------------------------------------------------------------

/// Columns and row count of the input, used to fake every table a step assigns.
fn input_shape(input: Option<&InputData>) -> (Vec<String>, usize) {
    let Some(input) = input else {
        return (vec!["value".to_string()], 0);
    };
    let records = SimpleDelimitedParser.parse_delimited(&input.contents, ",");
    let columns = records.first().cloned().unwrap_or_default();
    (columns, records.len().saturating_sub(1))
}

/// Names the dry run treats as tables: `df`-like names and feature/target
/// matrices. Everything else comes back as a scalar.
fn looks_tabular(name: &str) -> bool {
    name.contains("df") || name.starts_with('X') || name.starts_with('y')
}

/// A runtime that answers every run with an empty result per assigned name.
fn dry_run_runtime(columns: Vec<String>, rows: usize) -> MemoryRuntime {
    MemoryRuntime::with_responder(move |request| {
        let results: ExecutionResults = pipesync_codec::pylit::assigned_names(&request.source_text)
            .into_iter()
            .map(|name| {
                let result = if looks_tabular(&name) {
                    TypedResult::Table {
                        columns: columns.clone(),
                        rows: Vec::new(),
                        shape: vec![rows, columns.len()],
                    }
                } else {
                    TypedResult::Scalar {
                        value: serde_json::Value::Null,
                    }
                };
                (name, result)
            })
            .collect();
        Ok(results)
    })
}

fn detect_kind(registry: &CodecRegistry, text: &str) -> Option<StepKind> {
    registry
        .kinds()
        .into_iter()
        .find(|kind| registry.get(*kind).is_some_and(|c| c.parse_default(text).is_some()))
}

async fn exec_step<C>(
    session: &mut Session,
    text: &str,
    input: Option<InputData>,
) -> anyhow::Result<ExecutionOutcome>
where
    C: StepCodec,
    C::Params: ParamsVariant,
{
    let Some(params) = C::parse_default(text) else {
        anyhow::bail!("source does not look like a {} step", C::KIND);
    };
    let mut workspace = session.workspace::<C>(params);
    // Run the text as written, not its canonical rewrite.
    workspace.set_generation_enabled(false);
    workspace.source_keystroke(text);
    workspace.blur();
    Ok(workspace.execute(session, input).await)
}

async fn cmd_exec(
    registry: &CodecRegistry,
    config: SessionConfig,
    sources: &[PathBuf],
    input: Option<&Path>,
) -> anyhow::Result<()> {
    let input = match input {
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Some(InputData {
                name,
                contents: read_text(path)?,
            })
        }
        None => None,
    };

    let (columns, rows) = input_shape(input.as_ref());
    let runtime = Arc::new(dry_run_runtime(columns, rows));
    let mut session = Session::with_config(runtime, config);
    session.begin_step().await?;

    for path in sources {
        let text = read_text(path)?;
        let Some(kind) = detect_kind(registry, &text) else {
            anyhow::bail!("{}: no step kind recognises this source", path.display());
        };
        tracing::debug!(file = %path.display(), step = %kind, "step detected");

        let input = input.clone();
        let outcome = match kind {
            StepKind::ReadCsv => exec_step::<ReadCsvCodec>(&mut session, &text, input).await?,
            StepKind::Split => exec_step::<SplitCodec>(&mut session, &text, input).await?,
            StepKind::FeaturesTarget => {
                exec_step::<FeaturesTargetCodec>(&mut session, &text, input).await?
            }
            StepKind::Inspection => exec_step::<InspectionCodec>(&mut session, &text, input).await?,
            StepKind::Clean => exec_step::<CleanCodec>(&mut session, &text, input).await?,
            StepKind::LinearRegression => {
                exec_step::<LinearRegressionCodec>(&mut session, &text, input).await?
            }
        };

        match outcome {
            ExecutionOutcome::Succeeded { registered, .. } => {
                println!("[{}] {}: registered {}", kind, path.display(), registered.join(", "));
            }
            ExecutionOutcome::Failed { message } => {
                println!("[{}] {}: failed\n{}", kind, path.display(), message);
                std::process::exit(1);
            }
        }
    }

    println!("\nLineage:");
    for artifact in session.registry().iter() {
        let parent = artifact.parent_name.as_deref().unwrap_or("-");
        println!(
            "  {} <- {} [{}] rows={} file={}",
            artifact.name, parent, artifact.role, artifact.row_count, artifact.source_file
        );
    }
    Ok(())
}
