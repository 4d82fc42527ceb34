//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use paperflow_core::{
    Converter, ProgressReporter, RunSummary, StageRecord, StageState, export_with, generate_all,
    merge, project_status, run_all, run_audit,
};
use paperflow_dataprep::{clean_all, visualize_all};
use paperflow_harvester::{HarvestOutcome, Harvester, load_requirements};
use paperflow_shared::{AppConfig, ProjectLayout, init_config, resolve_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// paperflow: from problem files to a numbered, exportable paper.
#[derive(Parser)]
#[command(
    name = "paperflow",
    version,
    about = "Math-modeling paper pipeline: harvest, clean, chart, draft, merge, export.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Project root directory.
    #[arg(long, default_value = ".", global = true, env = "PAPERFLOW_ROOT")]
    pub root: PathBuf,

    /// Config file (defaults to <root>/paperflow.toml, then ~/.paperflow/paperflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Fetch the data listed in data_requirements.json.
    Harvest,

    /// Clean every CSV/Excel/TXT data file into paper_output/data_cleaned.
    Clean,

    /// Draw SVG charts for every cleaned dataset.
    Visualize,

    /// Check the problem directory and write the task manifest.
    Audit {
        /// Target length of each micro-unit, in characters.
        #[arg(long)]
        target_words: Option<u32>,
    },

    /// Render every micro-unit from its template.
    Generate,

    /// Merge micro-units into final_paper.md and check cross-references.
    Merge,

    /// Export final_paper.md to Word.
    Export {
        /// Converter: auto, builtin, or pandoc (defaults to the config value).
        #[arg(long)]
        converter: Option<String>,
    },

    /// Run every stage in order.
    Run,

    /// Show how far the project has progressed.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Write <root>/paperflow.toml instead of the user config.
        #[arg(long)]
        project: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "paperflow=info",
        1 => "paperflow=debug",
        _ => "paperflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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

/// Resolved root, config, and layout for one invocation.
struct Project {
    root: PathBuf,
    config: AppConfig,
    layout: ProjectLayout,
}

impl Project {
    fn open(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        if !root.is_dir() {
            return Err(eyre!("project root '{}' is not a directory", root.display()));
        }
        let config = resolve_config(root, config_path)?;
        let layout = ProjectLayout::new(root, &config);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            layout,
        })
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init { project } => cmd_config_init(&cli.root, *project),
            ConfigAction::Show => cmd_config_show(&cli.root, cli.config.as_deref()),
        };
    }

    let mut project = Project::open(&cli.root, cli.config.as_deref())?;
    match cli.command {
        Command::Harvest => cmd_harvest(&project).await,
        Command::Clean => cmd_clean(&project),
        Command::Visualize => cmd_visualize(&project),
        Command::Audit { target_words } => {
            if let Some(n) = target_words {
                project.config.manifest.target_words = n;
            }
            cmd_audit(&project)
        }
        Command::Generate => cmd_generate(&project),
        Command::Merge => cmd_merge(&project),
        Command::Export { converter } => cmd_export(&project, converter.as_deref()),
        Command::Run => cmd_run(&project).await,
        Command::Status => cmd_status(&project),
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

async fn cmd_harvest(project: &Project) -> Result<()> {
    let requirements_path = project.root.join(&project.config.harvest.requirements_file);
    let requirements = load_requirements(&requirements_path)?;
    let harvester = Harvester::new(&project.config.harvest, project.layout.crawled_dir())?;

    info!(tasks = requirements.tasks.len(), "harvesting data");
    let report = harvester.run(&requirements).await;

    println!();
    for outcome in &report.outcomes {
        match outcome {
            HarvestOutcome::Downloaded { path, bytes, .. } => {
                println!("  downloaded  {} ({bytes} bytes)", path.display())
            }
            HarvestOutcome::TablesSaved { url, paths } => {
                println!("  tables      {} from {url}", paths.len())
            }
            HarvestOutcome::ManualSearch { query, notes } => {
                println!("  manual      {query}");
                if let Some(notes) = notes {
                    println!("              {notes}");
                }
            }
            HarvestOutcome::Skipped { reason } => println!("  skipped     {reason}"),
            HarvestOutcome::Failed { url, error } => println!("  failed      {url}: {error}"),
        }
    }
    println!();
    println!("  Executed: {}", report.executed());
    println!("  Failed:   {}", report.failures());
    println!("  Output:   {}", project.layout.crawled_dir().display());
    println!();
    Ok(())
}

fn cmd_clean(project: &Project) -> Result<()> {
    let out_dir = project.layout.cleaned_dir();
    let report = clean_all(&project.root, &project.config.clean, &out_dir)?;

    println!();
    for file in &report.files {
        match (&file.output, &file.stats, &file.error) {
            (Some(output), Some(stats), _) => println!(
                "  {} -> {} ({} filled, {} duplicates removed)",
                file.source.display(),
                output.display(),
                stats.filled_cells,
                stats.duplicates_removed
            ),
            (_, _, Some(error)) => println!("  {} failed: {error}", file.source.display()),
            _ => {}
        }
    }
    println!();
    println!("  Cleaned: {}", report.cleaned());
    println!("  Failed:  {}", report.failed());
    println!();
    Ok(())
}

fn cmd_visualize(project: &Project) -> Result<()> {
    let report = visualize_all(
        &project.layout.cleaned_dir(),
        &project.layout.figures_dir(),
        &project.config.visualize,
    )?;

    println!();
    for dataset in &report.datasets {
        println!(
            "  {}: {} charts in {}",
            dataset.source.display(),
            dataset.charts.len(),
            dataset.output_dir.display()
        );
    }
    for (source, reason) in &report.failures {
        println!("  {} failed: {reason}", source.display());
    }
    println!();
    println!("  Charts: {}", report.chart_count());
    println!();
    Ok(())
}

fn cmd_audit(project: &Project) -> Result<()> {
    let report = run_audit(&project.layout, &project.config.manifest)?;
    println!();
    println!("  Manifest:     {}", report.manifest_path.display());
    println!("  Tasks:        {}", report.tasks);
    println!(
        "  Complete:     {}/{}",
        report.completeness.ok, report.completeness.total
    );
    println!("  Total chars:  {}", report.completeness.total_chars);
    println!();
    Ok(())
}

fn cmd_generate(project: &Project) -> Result<()> {
    let report = generate_all(&project.layout)?;
    println!();
    println!("  Generated: {} units", report.generated);
    println!("  Units:     {}", report.units_dir.display());
    println!("  Log:       {}", report.log_file.display());
    println!();
    Ok(())
}

fn cmd_merge(project: &Project) -> Result<()> {
    let result = merge(&project.layout)?;
    println!();
    println!("  Paper:      {}", result.final_paper.display());
    println!("  Units:      {} in {} sections", result.units, result.sections);
    println!(
        "  Numbered:   {} figures, {} tables, {} equations, {} citations",
        result.counts.figures, result.counts.tables, result.counts.equations, result.counts.citations
    );
    if !result.missing.is_empty() {
        println!("  Missing:    {}", result.missing.join(", "));
    }
    println!(
        "  Unresolved: {} (see {})",
        result.unresolved.len(),
        result.ref_report.display()
    );
    println!();
    Ok(())
}

fn cmd_export(project: &Project, converter: Option<&str>) -> Result<()> {
    let converter: Converter = converter
        .unwrap_or(&project.config.export.converter)
        .parse()?;
    let reference_doc = project.root.join(&project.config.export.reference_doc);
    let result = export_with(&project.layout, converter, &reference_doc)?;

    println!();
    println!("  Word document: {}", result.path.display());
    println!("  Converter:     {}", result.converter);
    println!();
    Ok(())
}

async fn cmd_run(project: &Project) -> Result<()> {
    info!(root = %project.root.display(), "running full pipeline");
    let reporter = CliProgress::new();
    let summary = run_all(&project.root, &project.config, &reporter).await?;

    println!();
    println!("  Pipeline finished.");
    for deliverable in &summary.deliverables {
        println!(
            "  {:<36} {:>9} bytes  {}",
            deliverable.path,
            deliverable.size_bytes,
            &deliverable.sha256[..12]
        );
    }
    println!(
        "  Time: {:.1}s",
        (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0
    );
    println!();
    Ok(())
}

fn cmd_status(project: &Project) -> Result<()> {
    let status = project_status(&project.layout)?;
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!();
    println!("  Problem files:    {}", status.problem_files);
    println!("  Cleaned datasets: {}", status.cleaned_datasets);
    match status.tasks {
        Some(total) => println!("  Tasks:            {} ({} generated)", total, status.generated),
        None => println!("  Tasks:            no manifest (run `paperflow audit`)"),
    }
    println!(
        "  Complete units:   {}/{}",
        status.completeness.ok, status.completeness.total
    );
    println!("  final_paper.md:   {}", yes_no(status.final_paper));
    println!("  final_paper.docx: {}", yes_no(status.final_docx));
    println!();
    Ok(())
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, name: &str) {
        self.spinner.set_message(format!("Running {name}"));
    }

    fn stage_finished(&self, record: &StageRecord) {
        let mark = match record.state {
            StageState::Ok => "ok",
            StageState::Warned => "warn",
            StageState::Skipped => "skip",
            StageState::Failed => "FAIL",
        };
        self.spinner.println(format!(
            "  [{mark:>4}] {:<16} {} ({} ms)",
            record.name, record.detail, record.elapsed_ms
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init(root: &Path, project: bool) -> Result<()> {
    let path = if project {
        init_config(Some(root))?
    } else {
        init_config(None)?
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(root: &Path, config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = resolve_config(root, config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "paperflow",
            "audit",
            "--target-words",
            "400",
            "--root",
            "/tmp/proj",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/proj"));
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Command::Audit {
                target_words: Some(400)
            }
        );
    }

    #[test]
    fn parses_export_and_config() {
        let cli =
            Cli::try_parse_from(["paperflow", "--log-format", "json", "export", "--converter", "pandoc"])
                .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.command,
            Command::Export {
                converter: Some("pandoc".into())
            }
        );

        let cli = Cli::try_parse_from(["paperflow", "config", "init", "--project"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Config {
                action: ConfigAction::Init { project: true }
            }
        );
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["paperflow", "publish"]).is_err());
    }

    #[test]
    fn missing_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert!(Project::open(&missing, None).is_err());
    }
}
