//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use mlpipe_core::catalog::CATALOG;
use mlpipe_core::pipeline::{PipelineProgress, RunSummary};
use mlpipe_core::{DryRunRunner, ProcessRunner, RunContext, run_pipeline};
use mlpipe_shared::{DEFAULT_CONFIG_FILE, PipelineConfig, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// mlpipe: run a fixed data/ML pipeline step by step.
#[derive(Parser)]
#[command(
    name = "mlpipe",
    version,
    about = "Run the download → preprocess → check → split → train → evaluate pipeline.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Options locating and patching the configuration.
#[derive(clap::Args)]
pub(crate) struct ConfigArgs {
    /// Configuration file (.toml, .yaml or .yml).
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "MLPIPE_CONFIG")]
    pub config: PathBuf,

    /// Override a config value, e.g. `--set data.test_size=0.2` (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the selected pipeline steps.
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Steps to execute (comma-separated). Overrides main.execute_steps.
        #[arg(short, long)]
        steps: Option<String>,

        /// Project root containing the step directories (defaults to cwd).
        #[arg(long)]
        project_dir: Option<PathBuf>,

        /// Log the commands that would run without launching them.
        #[arg(long)]
        dry_run: bool,
    },

    /// List the step catalog in execution order.
    Steps,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the resolved configuration.
    Show {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mlpipe=info",
        1 => "mlpipe=debug",
        _ => "mlpipe=trace",
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

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            config,
            steps,
            project_dir,
            dry_run,
        } => cmd_run(config, steps, project_dir.as_deref(), dry_run).await,
        Command::Steps => cmd_steps(),
        Command::Config { action } => match action {
            ConfigAction::Show { config } => cmd_config_show(&config),
        },
    }
}

fn load(args: &ConfigArgs, steps: Option<String>) -> Result<PipelineConfig> {
    let mut overrides = args.overrides.clone();
    if let Some(steps) = steps {
        overrides.push(format!("main.execute_steps={steps}"));
    }
    load_config_from(&args.config, &overrides)
        .wrap_err_with(|| format!("loading {}", args.config.display()))
}

async fn cmd_run(
    args: ConfigArgs,
    steps: Option<String>,
    project_dir: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let config = load(&args, steps)?;
    let ctx = RunContext::initialize(&config, project_dir)?;

    info!(
        config = %args.config.display(),
        dry_run,
        "running pipeline"
    );

    let reporter = CliProgress::new();
    let outcome = if dry_run {
        let runner = DryRunRunner::new(config.runner.clone());
        run_pipeline(&config, &ctx, &runner, &reporter).await
    } else {
        let runner = ProcessRunner::new(config.runner.clone());
        run_pipeline(&config, &ctx, &runner, &reporter).await
    };

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            reporter.abandon();
            return Err(e.into());
        }
    };

    println!();
    println!("  Pipeline finished{}", if dry_run { " (dry run)" } else { "" });
    println!("  Run:      {}", summary.run_id);
    println!("  Group:    {}", ctx.run_group);
    println!("  Steps:    {}", summary.executed.join(", "));
    if !summary.skipped.is_empty() {
        println!("  Skipped:  {}", summary.skipped.join(", "));
    }
    println!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_steps() -> Result<()> {
    for (i, entry) in CATALOG.iter().enumerate() {
        let deps = if entry.depends_on.is_empty() {
            "-".to_string()
        } else {
            entry.depends_on.join(", ")
        };
        println!(
            "{:>2}. {:<14} {}/{}  (after: {deps})",
            i + 1,
            entry.spec.name,
            entry.spec.path,
            entry.spec.entry_point
        );
    }
    Ok(())
}

fn cmd_config_show(args: &ConfigArgs) -> Result<()> {
    let config = load(args, None)?;
    println!("{}", render_config(&config)?);
    Ok(())
}

/// Render as TOML, or as YAML when the tree holds values TOML cannot express.
fn render_config(config: &PipelineConfig) -> Result<String> {
    match toml::to_string_pretty(config) {
        Ok(rendered) => Ok(rendered),
        Err(e) => {
            debug!(error = %e, "config not representable as TOML, rendering YAML");
            Ok(serde_yaml::to_string(config)?)
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter.
///
/// The spinner only runs until the first step starts. Steps write straight
/// to the terminal, so from then on progress is printed as whole lines
/// between steps.
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
        spinner.set_message("preparing run");
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self::with_spinner(spinner)
    }

    fn with_spinner(spinner: ProgressBar) -> Self {
        Self { spinner }
    }

    fn stop_spinner(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }

    fn abandon(&self) {
        self.stop_spinner();
        eprintln!("  ✗ pipeline failed");
    }
}

impl PipelineProgress for CliProgress {
    fn step_started(&self, name: &str, current: usize, total: usize) {
        self.stop_spinner();
        eprintln!("  ▸ [{current}/{total}] {name}");
    }

    fn step_finished(&self, name: &str, elapsed: Duration) {
        eprintln!("  ✓ {name} ({:.1}s)", elapsed.as_secs_f64());
    }

    fn done(&self, _summary: &RunSummary) {
        self.stop_spinner();
    }
}
