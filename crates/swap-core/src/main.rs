//! SWAP - Bayesian crowd-labeling estimator
//!
//! The main entry point for the `swap` binary, handling:
//! - Estimator lifecycle (create, clear, inspect)
//! - Classification ingestion with the online scoring cycle
//! - Offline EM refinement
//! - Gold label application
//! - Reports and CSV exports

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use swap_common::{Config, ConfigResolution, ConfigResolver, Error, Result, SCHEMA_VERSION};
use swap_core::exit_codes::ExitCode;
use swap_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use swap_core::{
    export_subjects, export_users, ingest_records, log_event, parse_golds, ClassificationParser,
    InputFormat, OfflineOptions, Report, ReportOptions, Swap, SwapStore,
};

/// SWAP - Bayesian crowd-labeling estimator
#[derive(Parser)]
#[command(name = "swap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Estimator config file (JSON); falls back to SWAP_CONFIG, then XDG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding snapshots, reports and exports
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an estimator from the resolved config, replacing any existing one
    New(NameArgs),

    /// Reset an estimator to an empty state, keeping its config
    Clear(NameArgs),

    /// Ingest classifications, run the online cycle, retire and report
    Run(RunArgs),

    /// Ingest classifications and refine all scores with offline EM
    Offline(OfflineArgs),

    /// Apply gold labels from a `subject,gold` CSV file
    Golds(GoldsArgs),

    /// Print the text report
    Report(ReportArgs),

    /// Write subject scores and user skills as CSV
    Export(ExportArgs),

    /// Print a JSON summary of an estimator
    Show(NameArgs),
}

#[derive(Args, Debug)]
struct NameArgs {
    /// Estimator name
    name: String,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Estimator name
    name: String,

    /// Classification records (CSV export or JSON Lines)
    data: PathBuf,

    /// Record layout (csv, jsonl); defaults to the file extension
    #[arg(long)]
    format: Option<InputFormat>,
}

#[derive(Args, Debug)]
struct OfflineArgs {
    /// Estimator name
    name: String,

    /// Classification records (CSV export or JSON Lines)
    data: PathBuf,

    /// Record layout (csv, jsonl); defaults to the file extension
    #[arg(long)]
    format: Option<InputFormat>,

    /// Learn confusions from every subject, not only gold ones
    #[arg(long)]
    unsupervised: bool,

    /// Weight gold subjects by their current estimate instead of the label
    #[arg(long)]
    ignore_gold_status: bool,
}

#[derive(Args, Debug)]
struct GoldsArgs {
    /// Estimator name
    name: String,

    /// Gold CSV with `subject` and `gold` columns
    path: PathBuf,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Estimator name
    name: String,

    /// Population and threshold summary only
    #[arg(long)]
    summary: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Estimator name
    name: String,

    /// Output directory (defaults to the data directory)
    #[arg(long)]
    out: Option<PathBuf>,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            std::process::exit(code.as_i32());
        }
    };

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let ctx = LogContext::new(generate_run_id(), cli.command.estimator());
    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_STARTED,
        Stage::Init,
        "command started",
        command = cli.command.label()
    );

    let exit_code = match dispatch(&cli, &ctx) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            let code = ExitCode::from_error(&err);
            if code.is_internal_error() {
                log_event!(
                    ctx,
                    ERROR,
                    event_names::INTERNAL_ERROR,
                    Stage::Init,
                    "command failed",
                    error = tracing::field::display(&err),
                    code = err.code()
                );
            }
            eprintln!("swap: {}", err);
            eprintln!("hint: {}", err.remediation());
            code
        }
    };

    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Init,
        "command finished",
        exit_code = exit_code.as_i32()
    );
    std::process::exit(exit_code.as_i32());
}

impl Commands {
    fn estimator(&self) -> &str {
        match self {
            Commands::New(a) | Commands::Clear(a) | Commands::Show(a) => &a.name,
            Commands::Run(a) => &a.name,
            Commands::Offline(a) => &a.name,
            Commands::Golds(a) => &a.name,
            Commands::Report(a) => &a.name,
            Commands::Export(a) => &a.name,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Commands::New(_) => "new",
            Commands::Clear(_) => "clear",
            Commands::Run(_) => "run",
            Commands::Offline(_) => "offline",
            Commands::Golds(_) => "golds",
            Commands::Report(_) => "report",
            Commands::Export(_) => "export",
            Commands::Show(_) => "show",
        }
    }
}

fn dispatch(cli: &Cli, ctx: &LogContext) -> Result<()> {
    let resolver = ConfigResolver::new(cli.global.config.clone(), cli.global.data_dir.clone());
    let store = SwapStore::new(resolver.resolve_data_dir());

    match &cli.command {
        Commands::New(args) => run_new(&resolver, &store, ctx, args),
        Commands::Clear(args) => run_clear(&store, ctx, args),
        Commands::Run(args) => run_online(&resolver, &store, ctx, args),
        Commands::Offline(args) => run_offline(&resolver, &store, ctx, args),
        Commands::Golds(args) => run_golds(&resolver, &store, ctx, args),
        Commands::Report(args) => run_report(&store, ctx, args),
        Commands::Export(args) => run_export(&store, ctx, args),
        Commands::Show(args) => run_show(&store, ctx, args),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(resolver: &ConfigResolver, ctx: &LogContext) -> Result<Config> {
    let (config, source) = resolver.load()?;
    match source.resolution {
        ConfigResolution::Default => log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "no config file found, using defaults"
        ),
        resolution => log_event!(
            ctx,
            INFO,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "config loaded",
            resolution = tracing::field::display(resolution),
            path = tracing::field::display(
                source.path.as_deref().unwrap_or(Path::new("")).display()
            ),
            sha256 = source.hash.as_deref().unwrap_or("")
        ),
    }
    Ok(config)
}

/// Load an estimator that must already exist.
fn load_existing(store: &SwapStore, ctx: &LogContext, name: &str) -> Result<Swap> {
    match store.load(name)? {
        Some(swap) => Ok(swap.with_log_context(ctx.clone())),
        None => Err(Error::Store(format!(
            "estimator `{}` not found in {}",
            name,
            store.dir().display()
        ))),
    }
}

/// Load an estimator, or create it from the resolved config.
fn load_or_init(
    resolver: &ConfigResolver,
    store: &SwapStore,
    ctx: &LogContext,
    name: &str,
) -> Result<Swap> {
    if store.exists(name)? {
        return load_existing(store, ctx, name);
    }
    let swap = store.load_or_init(name, load_config(resolver, ctx)?)?;
    Ok(swap.with_log_context(ctx.clone()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::Ingest(format!("cannot open {}: {}", path.display(), e)))
}

fn write_report(store: &SwapStore, swap: &Swap, ctx: &LogContext) -> Result<PathBuf> {
    fs::create_dir_all(store.dir())?;
    let path = store.dir().join(format!("{}_report.txt", swap.name()));
    Report::new(swap, ReportOptions::default()).write_to(BufWriter::new(File::create(&path)?))?;
    log_event!(
        ctx,
        INFO,
        event_names::REPORT_WRITTEN,
        Stage::Report,
        "report written",
        path = tracing::field::display(path.display())
    );
    Ok(path)
}

fn thresholds_json(swap: &Swap) -> serde_json::Value {
    match swap.thresholds() {
        Some(t) => json!({
            "fpr": t.fpr,
            "mdr": t.mdr,
            "bogus_cutoff": t.bogus_cutoff,
            "real_cutoff": t.real_cutoff,
            "bogus_source": t.bogus_source,
            "real_source": t.real_source,
            "breakdown": t.breakdown(),
        }),
        None => serde_json::Value::Null,
    }
}

fn population_json(swap: &Swap) -> serde_json::Value {
    json!({
        "users": swap.users().len(),
        "subjects": swap.subjects().len(),
        "classifications": swap.classifications().len(),
        "gold_subjects": swap.subjects().iter().filter(|s| s.gold.is_known()).count(),
        "last_id": swap.last_id().map(|id| id.0),
    })
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_new(
    resolver: &ConfigResolver,
    store: &SwapStore,
    ctx: &LogContext,
    args: &NameArgs,
) -> Result<()> {
    let config = load_config(resolver, ctx)?;
    let swap = Swap::new(&args.name, config).with_log_context(ctx.clone());
    let path = store.save(&swap)?;
    print_json(&json!({
        "estimator": swap.name(),
        "path": path.display().to_string(),
        "schema_version": SCHEMA_VERSION,
    }))
}

fn run_clear(store: &SwapStore, ctx: &LogContext, args: &NameArgs) -> Result<()> {
    let old = load_existing(store, ctx, &args.name)?;
    let swap = Swap::new(&args.name, old.config().clone()).with_log_context(ctx.clone());
    let path = store.save(&swap)?;
    print_json(&json!({
        "estimator": swap.name(),
        "path": path.display().to_string(),
        "cleared": {
            "users": old.users().len(),
            "subjects": old.subjects().len(),
            "classifications": old.classifications().len(),
        },
    }))
}

fn run_online(
    resolver: &ConfigResolver,
    store: &SwapStore,
    ctx: &LogContext,
    args: &RunArgs,
) -> Result<()> {
    let mut swap = load_or_init(resolver, store, ctx, &args.name)?;
    let parser = ClassificationParser::new(&swap.config().annotation);
    let format = args
        .format
        .unwrap_or_else(|| InputFormat::from_path(&args.data));
    let stats = ingest_records(&mut swap, &parser, format, open_input(&args.data)?)?;

    swap.cycle();
    swap.retire_default();
    let report = write_report(store, &swap, ctx)?;
    let snapshot = store.save(&swap)?;

    print_json(&json!({
        "estimator": swap.name(),
        "ingest": stats,
        "population": population_json(&swap),
        "thresholds": thresholds_json(&swap),
        "report": report.display().to_string(),
        "snapshot": snapshot.display().to_string(),
    }))
}

fn run_offline(
    resolver: &ConfigResolver,
    store: &SwapStore,
    ctx: &LogContext,
    args: &OfflineArgs,
) -> Result<()> {
    let mut swap = load_or_init(resolver, store, ctx, &args.name)?;
    let parser = ClassificationParser::new(&swap.config().annotation);
    let format = args
        .format
        .unwrap_or_else(|| InputFormat::from_path(&args.data));
    let stats = ingest_records(&mut swap, &parser, format, open_input(&args.data)?)?;

    let em = swap.offline(OfflineOptions {
        unsupervised: args.unsupervised,
        ignore_gold_status: args.ignore_gold_status,
    });
    swap.retire_default();
    let report = write_report(store, &swap, ctx)?;
    let snapshot = store.save(&swap)?;

    print_json(&json!({
        "estimator": swap.name(),
        "ingest": stats,
        "offline": em,
        "population": population_json(&swap),
        "thresholds": thresholds_json(&swap),
        "report": report.display().to_string(),
        "snapshot": snapshot.display().to_string(),
    }))
}

fn run_golds(
    resolver: &ConfigResolver,
    store: &SwapStore,
    ctx: &LogContext,
    args: &GoldsArgs,
) -> Result<()> {
    let golds = parse_golds(open_input(&args.path)?)?;
    let mut swap = load_or_init(resolver, store, ctx, &args.name)?;
    let applied = golds.len();
    swap.apply_golds(golds);
    let snapshot = store.save(&swap)?;

    print_json(&json!({
        "estimator": swap.name(),
        "golds_applied": applied,
        "population": population_json(&swap),
        "snapshot": snapshot.display().to_string(),
    }))
}

fn run_report(store: &SwapStore, ctx: &LogContext, args: &ReportArgs) -> Result<()> {
    let swap = load_existing(store, ctx, &args.name)?;
    let options = if args.summary {
        ReportOptions::summary()
    } else {
        ReportOptions::default()
    };
    Report::new(&swap, options).write_to(io::stdout().lock())?;
    Ok(())
}

fn run_export(store: &SwapStore, ctx: &LogContext, args: &ExportArgs) -> Result<()> {
    let swap = load_existing(store, ctx, &args.name)?;
    let dir = args.out.clone().unwrap_or_else(|| store.dir().to_path_buf());
    fs::create_dir_all(&dir)?;

    let scores = dir.join(format!("{}_scores.csv", swap.name()));
    export_subjects(&swap, BufWriter::new(File::create(&scores)?))?;
    let skills = dir.join(format!("{}_skills.csv", swap.name()));
    export_users(&swap, BufWriter::new(File::create(&skills)?))?;
    log_event!(
        ctx,
        INFO,
        event_names::REPORT_WRITTEN,
        Stage::Report,
        "exports written",
        subjects = swap.subjects().len(),
        users = swap.users().len()
    );

    print_json(&json!({
        "estimator": swap.name(),
        "scores": scores.display().to_string(),
        "skills": skills.display().to_string(),
    }))
}

fn run_show(store: &SwapStore, ctx: &LogContext, args: &NameArgs) -> Result<()> {
    let swap = load_existing(store, ctx, &args.name)?;
    print_json(&json!({
        "estimator": swap.name(),
        "schema_version": SCHEMA_VERSION,
        "config": swap.config(),
        "population": population_json(&swap),
        "thresholds": thresholds_json(&swap),
    }))
}
