use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use valmap::{
    inspect_file, AnalysisKind, AnalysisReport, ComparisonReport, Derivation, DerivedAlgorithm,
    FitResult, MappingKind, ProgressEvent, Session, StatisticsSummary, StepOutcome, ValmapConfig,
    ValmapError,
};

/// Infer the transformation rule behind value-mapping logs
#[derive(Parser)]
#[command(name = "valmap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as pretty JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that loads a log
#[derive(Args, Debug, Clone, Copy, Default)]
struct LoadArgs {
    /// Stop after this many records
    #[arg(long, value_name = "N")]
    max_records: Option<usize>,

    /// Keep roughly this fraction of records, in (0, 1]
    #[arg(long, value_name = "R")]
    sample_rate: Option<f64>,
}

/// Analysis to run
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    /// Statistics, patterns, linear, piecewise and model fitting
    Comprehensive,
    /// Whole-range linear fit only
    Linear,
    /// Piecewise detection only
    Piecewise,
}

impl From<Kind> for AnalysisKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Comprehensive => AnalysisKind::Comprehensive,
            Kind::Linear => AnalysisKind::Linear,
            Kind::Piecewise => AnalysisKind::Piecewise,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the log format and estimate the record count
    Inspect {
        /// Mapping log
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Load a log and print its statistics
    Stats {
        /// Mapping log
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Run an analysis on a log
    Analyze {
        /// Mapping log
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Analysis to run
        #[arg(short, long, value_enum, default_value = "comprehensive")]
        kind: Kind,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Derive the simplest rule that explains a log
    Derive {
        /// Mapping log
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Compare the rules behind two logs
    Compare {
        /// First mapping log
        #[arg(value_name = "A")]
        first: PathBuf,

        /// Second mapping log
        #[arg(value_name = "B")]
        second: PathBuf,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Summarize the rule and optionally export the per-value summary
    Summary {
        /// Mapping log
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the mapping summary CSV here
        #[arg(short, long, value_name = "OUT.csv")]
        output: Option<PathBuf>,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// List distinct (original, target) pairs
    Unique {
        /// Mapping log
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Rows to print in text mode (0 prints all)
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[command(flatten)]
        load: LoadArgs,
    },
}

/// Output settings shared by every command
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity flags
    setup_logging(cli.verbose, cli.quiet);

    // Load configuration if specified
    let config = if let Some(config_path) = &cli.config {
        load_config(config_path)?
    } else {
        ValmapConfig::default()
    };

    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    // Execute the appropriate command
    match cli.command {
        Commands::Inspect { file } => {
            inspect_command(&file, &config, out)?;
        }
        Commands::Stats { file, load } => {
            stats_command(&file, with_load_args(config, load)?, out)?;
        }
        Commands::Analyze { file, kind, load } => {
            analyze_command(&file, kind.into(), with_load_args(config, load)?, out)?;
        }
        Commands::Derive { file, load } => {
            derive_command(&file, with_load_args(config, load)?, out)?;
        }
        Commands::Compare {
            first,
            second,
            load,
        } => {
            compare_command(&first, &second, with_load_args(config, load)?, out)?;
        }
        Commands::Summary { file, output, load } => {
            summary_command(&file, output.as_deref(), with_load_args(config, load)?, out)?;
        }
        Commands::Unique { file, limit, load } => {
            unique_command(&file, limit, with_load_args(config, load)?, out)?;
        }
    }

    Ok(())
}

/// Set up logging based on verbosity flags
fn setup_logging(verbose: bool, quiet: bool) {
    let log_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    debug!("Logging initialized at {} level", log_level);
}

/// Load configuration from a JSON file
fn load_config(path: &Path) -> Result<ValmapConfig> {
    debug!("Loading configuration from: {}", path.display());
    let config = ValmapConfig::from_json_file(path)
        .map_err(|e| map_valmap_error(e, "Configuration"))
        .with_context(|| format!("Failed to load config file: {}", path.display()))?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Apply command-line load options on top of the configuration
fn with_load_args(mut config: ValmapConfig, load: LoadArgs) -> Result<ValmapConfig> {
    if let Some(max) = load.max_records {
        config.ingest = config.ingest.with_max_records(Some(max));
    }
    if let Some(rate) = load.sample_rate {
        config.ingest = config.ingest.with_sample_rate(rate);
    }
    config
        .validate()
        .map_err(|e| map_valmap_error(e, "Load options"))?;
    Ok(config)
}

/// Inspect command implementation
fn inspect_command(file: &Path, config: &ValmapConfig, out: Output) -> Result<()> {
    let info = inspect_file(file, &config.ingest).map_err(|e| map_valmap_error(e, "Inspection"))?;

    if !info.format.is_known() {
        warn!("No known mapping grammar in the first {} lines", config.ingest.detect_lines);
    }

    if out.json {
        return print_json(&info);
    }

    println!("File:              {}", info.path.display());
    println!("Size:              {}", format_bytes(info.file_size));
    println!("Lines:             {}", info.total_lines);
    println!("Format:            {}", info.format);
    println!("Estimated records: {}", info.estimated_records);
    Ok(())
}

/// Stats command implementation
fn stats_command(file: &Path, config: ValmapConfig, out: Output) -> Result<()> {
    let session = Session::with_config(config);
    load_into(&session, file, out)?;
    let stats = session.statistics();

    if out.json {
        return print_json(&stats);
    }

    print_statistics(&stats);
    Ok(())
}

/// Analyze command implementation
fn analyze_command(file: &Path, kind: AnalysisKind, config: ValmapConfig, out: Output) -> Result<()> {
    let session = Session::with_config(config);
    load_into(&session, file, out)?;

    let start = Instant::now();
    let progress = create_progress_bar(out.quiet, &format!("Running {} analysis", kind));
    let observer = spinner_observer(&progress);
    let report = session
        .analyze(kind, &observer)
        .map_err(|e| map_valmap_error(e, "Analysis"))?;
    progress.finish_and_clear();

    if !out.quiet {
        eprintln!("✓ {} analysis complete", kind);
        eprintln!("  Time:        {:.2?}", start.elapsed());
    }

    if out.json {
        return print_json(report.as_ref());
    }

    print_report(&report);
    Ok(())
}

/// Derive command implementation
fn derive_command(file: &Path, config: ValmapConfig, out: Output) -> Result<()> {
    let session = Session::with_config(config);
    load_into(&session, file, out)?;

    let progress = create_progress_bar(out.quiet, "Deriving algorithm");
    let observer = spinner_observer(&progress);
    let derived = session
        .derive_algorithm(&observer)
        .map_err(|e| map_valmap_error(e, "Derivation"))?;
    progress.finish_and_clear();

    if out.json {
        return print_json(&derived);
    }

    print_derivation(&derived);
    Ok(())
}

/// Compare command implementation
fn compare_command(first: &Path, second: &Path, config: ValmapConfig, out: Output) -> Result<()> {
    let session = Session::with_config(config);
    load_into(&session, first, out)?;

    let progress = create_progress_bar(out.quiet, "Reading second log");
    let other = session
        .read_dataset(second)
        .map_err(|e| map_valmap_error(e, "Second log"))?;
    progress.set_message("Comparing");
    let observer = spinner_observer(&progress);
    let report = session
        .compare_with(&other, &observer)
        .map_err(|e| map_valmap_error(e, "Comparison"))?;
    progress.finish_and_clear();

    if out.json {
        return print_json(&report);
    }

    print_comparison(&report);
    Ok(())
}

/// Summary command implementation
fn summary_command(file: &Path, output: Option<&Path>, config: ValmapConfig, out: Output) -> Result<()> {
    let session = Session::with_config(config);
    load_into(&session, file, out)?;

    let progress = create_progress_bar(out.quiet, "Running comprehensive analysis");
    let observer = spinner_observer(&progress);
    session
        .analyze(AnalysisKind::Comprehensive, &observer)
        .map_err(|e| map_valmap_error(e, "Analysis"))?;
    progress.finish_and_clear();

    let summary = session.summary().map_err(|e| map_valmap_error(e, "Summary"))?;

    if let Some(path) = output {
        let rows = session
            .export_mapping_summary(path)
            .map_err(|e| map_valmap_error(e, "Export"))?;
        if !out.quiet {
            eprintln!("✓ Mapping summary exported");
            eprintln!("  Rows:        {}", rows);
            eprintln!("  Output:      {}", path.display());
        }
    }

    if out.json {
        return print_json(&summary);
    }

    println!("Algorithm:   {}", summary.algorithm_description);
    println!("Confidence:  {:.3}", summary.confidence);
    println!("Records:     {}", summary.data_overview.total_records);
    println!("Originals:   {} distinct", summary.data_overview.unique_original_values);
    println!("Targets:     {} distinct", summary.data_overview.unique_target_values);
    Ok(())
}

/// Unique command implementation
fn unique_command(file: &Path, limit: usize, config: ValmapConfig, out: Output) -> Result<()> {
    let session = Session::with_config(config);
    load_into(&session, file, out)?;
    let mappings = session
        .unique_mappings()
        .map_err(|e| map_valmap_error(e, "Unique mappings"))?;

    if out.json {
        return print_json(&mappings);
    }

    let shown = if limit == 0 { mappings.len() } else { limit.min(mappings.len()) };
    println!("{:>10} {:>10} {:>8} {:>8}  type", "original", "target", "delta", "count");
    for m in &mappings[..shown] {
        let kind = match m.mapping_type {
            MappingKind::OneToOne => "one-to-one",
            MappingKind::OneToMany => "one-to-many",
        };
        println!(
            "{:>10} {:>10} {:>+8} {:>8}  {}",
            m.original_value, m.target_value, m.delta, m.occurrences, kind
        );
    }
    if shown < mappings.len() {
        println!("... {} more (use --limit 0 to print all)", mappings.len() - shown);
    }
    Ok(())
}

/// Load a log into the session behind a spinner
fn load_into(session: &Session, file: &Path, out: Output) -> Result<()> {
    let start = Instant::now();
    let progress = create_progress_bar(out.quiet, "Reading input");
    let observer = spinner_observer(&progress);
    let loaded = session
        .load(file, &observer)
        .map_err(|e| map_valmap_error(e, "Load"))?;
    progress.finish_and_clear();

    if !out.quiet {
        eprintln!("✓ Loaded {}", loaded.path.display());
        eprintln!("  Format:      {}", loaded.format);
        eprintln!("  Records:     {}", loaded.records);
        eprintln!("  Lines read:  {}", loaded.build.lines_read);
        eprintln!("  Memory:      {}", format_bytes(session.memory_usage().total_bytes as u64));
        eprintln!("  Time:        {:.2?}", start.elapsed());
    }
    Ok(())
}

/// Progress observer that mirrors step messages on the spinner
fn spinner_observer(progress: &ProgressBar) -> impl Fn(&ProgressEvent<'_>) + '_ {
    move |event| match event {
        ProgressEvent::Step { message, .. } => progress.set_message(message.to_string()),
        ProgressEvent::Failed { operation, error } => debug!("{} failed: {}", operation, error),
        _ => {}
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn print_statistics(stats: &StatisticsSummary) {
    println!("Records: {}", stats.total_records);
    println!("Method:  {:?}", stats.method);
    println!();
    println!("{:<10} {:>12} {:>12} {:>14} {:>14}", "series", "min", "max", "mean", "std");
    for (name, series) in [
        ("original", &stats.original),
        ("target", &stats.target),
        ("delta", &stats.delta),
    ] {
        if let Some(s) = series {
            println!(
                "{:<10} {:>12} {:>12} {:>14.4} {:>14.4}",
                name, s.min, s.max, s.mean, s.std
            );
        }
    }
}

fn print_report(report: &AnalysisReport) {
    println!("Analysis: {}", report.analysis_type);

    if let Some(stats) = &report.basic_statistics {
        println!();
        print_statistics(stats);
    }

    if let Some(patterns) = &report.mapping_patterns {
        println!();
        match patterns {
            StepOutcome::Done(p) => {
                println!("Patterns:");
                println!("  Global constant:  {}", p.is_global_algorithm);
                println!("  Distinct deltas:  {}", p.unique_change_count);
                if let Some(r) = p.correlation {
                    println!("  Correlation:      {:.4}", r);
                }
            }
            StepOutcome::Failed(e) => println!("Patterns: failed ({})", e),
        }
    }

    if let Some(linear) = &report.linear_analysis {
        println!();
        match linear {
            StepOutcome::Done(l) => {
                println!("Linear:");
                println!("  {}", l.formula);
                println!("  R²:               {:.6}", l.fit.r_squared);
                println!("  RMSE:             {:.4}", l.residuals.rmse);
                println!("  Accepted:         {}", l.is_linear);
            }
            StepOutcome::Failed(e) => println!("Linear: failed ({})", e),
        }
    }

    if let Some(piecewise) = &report.piecewise_analysis {
        println!();
        match piecewise {
            StepOutcome::Done(p) if p.is_piecewise => {
                println!("Piecewise: {} segments", p.segment_count);
                for segment in &p.segments {
                    let formula = segment
                        .fit
                        .value()
                        .map_or_else(|| "fit failed".to_string(), |f| f.formula.clone());
                    println!(
                        "  [{} .. {}] {} records: {}",
                        segment.start_value, segment.end_value, segment.data_count, formula
                    );
                }
            }
            StepOutcome::Done(_) => println!("Piecewise: single linear range"),
            StepOutcome::Failed(e) => println!("Piecewise: failed ({})", e),
        }
    }

    if let Some(models) = &report.model_fitting {
        println!();
        println!("Models:");
        for fit in [
            &models.linear,
            &models.polynomial,
            &models.power,
            &models.logarithmic,
            &models.exponential,
        ] {
            if let StepOutcome::Done(f) = fit {
                println!("  {:<18} R² {:.6}  {}", f.kind.as_str(), f.r_squared, f.formula);
            }
        }
        match &models.best_model {
            StepOutcome::Done(best) => println!("  Best: {}", best.kind),
            StepOutcome::Failed(e) => println!("  Best: none ({})", e),
        }
    }
}

fn print_derivation(derived: &DerivedAlgorithm) {
    println!("Algorithm:   {}", derived.algorithm_type);
    println!("Confidence:  {:.3}", derived.confidence);
    match &derived.algorithm {
        Derivation::Constant(c) => {
            if let Some(formula) = &c.formula {
                println!("Rule:        {}", formula);
            }
        }
        Derivation::Linear(l) => println!("Rule:        {}", l.formula),
        Derivation::Piecewise(p) => {
            println!("Segments:    {}", p.total_segments);
            for tp in &p.turning_points {
                println!(
                    "  turn at record {} (original {}), slope change {:.4}",
                    tp.index, tp.original_value, tp.slope_change
                );
            }
        }
        Derivation::Model(models) => match &models.best_model {
            StepOutcome::Done(best) => print_fit("Best model:", best),
            StepOutcome::Failed(e) => println!("Best model:  none ({})", e),
        },
    }
}

fn print_fit(label: &str, fit: &FitResult) {
    println!("{:<12} {} (R² {:.6})", label, fit.formula, fit.r_squared);
}

fn print_comparison(report: &ComparisonReport) {
    println!("Records:     {} vs {}", report.data1_stats.total_records, report.data2_stats.total_records);
    match &report.algorithm_similarity {
        StepOutcome::Done(s) => {
            println!("Linear similarity:");
            println!("  Slope:        {:.4}", s.slope_similarity);
            println!("  Intercept:    {:.4}", s.intercept_similarity);
            println!("  R²:           {:.4}", s.r2_similarity);
            println!("  Overall:      {:.4} (similar: {})", s.overall_similarity, s.is_similar);
        }
        StepOutcome::Failed(e) => println!("Linear similarity: failed ({})", e),
    }
    match &report.distribution_comparison {
        StepOutcome::Done(d) => {
            println!("Distributions:");
            println!(
                "  Original:     D = {:.4}, p = {:.4}",
                d.original_distribution.ks_statistic, d.original_distribution.p_value
            );
            println!(
                "  Target:       D = {:.4}, p = {:.4}",
                d.target_distribution.ks_statistic, d.target_distribution.p_value
            );
            println!("  Similar:      {}", d.overall_similarity);
        }
        StepOutcome::Failed(e) => println!("Distributions: failed ({})", e),
    }
    let perf = &report.performance_comparison;
    println!("Delta correlation: {:.4} (consistent: {})", perf.change_correlation, perf.change_consistency);
}

/// Create a progress bar (spinner) for operations
fn create_progress_bar(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        // Return a hidden progress bar in quiet mode
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format bytes in human-readable format
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Map ValmapError to anyhow::Error with context
fn map_valmap_error(error: ValmapError, context: &str) -> anyhow::Error {
    match error {
        ValmapError::Io { path, source } => {
            anyhow::anyhow!("{}: cannot read {}: {}", context, path.display(), source)
        }
        ValmapError::InvalidEncoding { path, line } => {
            anyhow::anyhow!(
                "{}: {} is not UTF-8 text (first bad line {})",
                context,
                path.display(),
                line
            )
        }
        ValmapError::UnrecognizedFormat { path } => {
            anyhow::anyhow!(
                "{}: {} does not look like a mapping log (expected lines like 原值100→新值120)",
                context,
                path.display()
            )
        }
        ValmapError::NoData { path } => {
            anyhow::anyhow!("{}: no mapping records found in {}", context, path.display())
        }
        ValmapError::InvalidConfig { message } => {
            anyhow::anyhow!("{}: invalid configuration: {}", context, message)
        }
        other => anyhow::anyhow!("{}: {}", context, other),
    }
}
