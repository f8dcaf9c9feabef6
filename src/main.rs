use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;
use reel_forge::checkpoint::{CheckpointStore, FileCheckpointStore};
use reel_forge::concept::{PRESETS, VideoConcept, generate_preset};
use reel_forge::config::ForgeConfig;
use reel_forge::job::JobId;
use reel_forge::observability::{MetricsCollector, log_snapshot};
use reel_forge::orchestrator::{Orchestrator, ProgressEvent, RunOutcome};
use reel_forge::registry::StageRegistry;
use reel_forge::stages::build_offline_orchestrator;
use reel_forge::validation::validate_concept;
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};

fn main() -> Result<()> {
    let Cli { global, command } = Cli::parse();

    let otlp_endpoint = match &command {
        Commands::Run { otlp_endpoint, .. } | Commands::Resume { otlp_endpoint, .. } => {
            otlp_endpoint.clone()
        }
        _ => None,
    };
    configure_tracing(otlp_endpoint.as_deref())?;

    let result = match command {
        Commands::Run {
            concept,
            metrics,
            no_progress,
            otlp_endpoint: _,
        } => run_concept(&global, &concept, &metrics, !no_progress),
        Commands::Resume {
            job_id,
            metrics,
            no_progress,
            otlp_endpoint: _,
        } => resume_job(&global, job_id, &metrics, !no_progress),
        Commands::Pause { job_id } => pause_job(&global, job_id),
        Commands::Status { job_id } => show_status(&global, job_id),
        Commands::Jobs => list_jobs(&global),
        Commands::ListStages => {
            list_stages();
            Ok(())
        }
        Commands::Validate { patterns } => validate_concepts(&global, &patterns),
        Commands::Concept { action } => concept_command(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "reel-forge", &mut io::stdout());
            Ok(())
        }
    };

    #[cfg(feature = "otel")]
    if otlp_endpoint.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    result
}

fn configure_tracing(otlp_endpoint: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                    vec![KeyValue::new("service.name", "reel-forge")],
                )))
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .install_simple()?;

            return tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()));
        }
    }

    #[cfg(not(feature = "otel"))]
    if let Some(endpoint) = otlp_endpoint {
        eprintln!(
            "warning: --otlp-endpoint '{endpoint}' requested but OpenTelemetry support is not enabled. Rebuild with --features otel."
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

/// Settings and checkpoint store resolved from the global flags.
struct Workspace {
    config: ForgeConfig,
    store: Arc<dyn CheckpointStore>,
}

impl Workspace {
    fn open(global: &GlobalArgs) -> Result<Self> {
        let mut config = match &global.config {
            Some(path) => ForgeConfig::load(path)?,
            None => ForgeConfig::default(),
        };
        if let Some(workspace) = &global.workspace {
            config.workspace_root = workspace.clone();
        }
        if let Some(checkpoints) = &global.checkpoints {
            config.checkpoint_dir = checkpoints.clone();
        }
        let store = FileCheckpointStore::new(&config.checkpoint_dir)?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    fn orchestrator(&self, show_progress: bool) -> Result<Orchestrator> {
        let orchestrator = build_offline_orchestrator(self.config.clone(), self.store.clone())?;
        Ok(if show_progress {
            orchestrator.with_observer(progress_renderer())
        } else {
            orchestrator
        })
    }

    fn load(&self, id: JobId) -> Result<reel_forge::job::PipelineJob> {
        self.store
            .load(id)?
            .ok_or_else(|| anyhow!("No checkpoint found for job {id}"))
    }
}

fn progress_renderer() -> impl Fn(&ProgressEvent) + Send + Sync + 'static {
    let bar_width = 30usize;
    let percent = AtomicU8::new(0);
    move |event: &ProgressEvent| {
        let (label, value, done) = match event {
            ProgressEvent::StageStarted { stage, .. } => {
                (stage.as_str(), percent.load(Ordering::Relaxed), false)
            }
            ProgressEvent::StageCompleted {
                stage,
                progress_percent,
                ..
            }
            | ProgressEvent::StageSkipped {
                stage,
                progress_percent,
                ..
            } => {
                percent.store(*progress_percent, Ordering::Relaxed);
                (stage.as_str(), *progress_percent, false)
            }
            ProgressEvent::StageFailed { stage, .. } => {
                (stage.as_str(), percent.load(Ordering::Relaxed), true)
            }
            ProgressEvent::Paused {
                progress_percent, ..
            } => ("paused", *progress_percent, true),
            ProgressEvent::Completed { .. } => ("done", 100, true),
        };
        let filled = (usize::from(value) * bar_width / 100).min(bar_width);
        let mut stderr = io::stderr();
        let _ = write!(
            stderr,
            "\r[{}{}] {:>3}% {:<18}",
            "=".repeat(filled),
            " ".repeat(bar_width - filled),
            value,
            label
        );
        if done {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

fn run_concept(
    global: &GlobalArgs,
    concept_path: &Path,
    metrics: &MetricsArgs,
    show_progress: bool,
) -> Result<()> {
    let concept = VideoConcept::load(concept_path)?;
    let workspace = Workspace::open(global)?;
    let orchestrator = workspace.orchestrator(show_progress)?;
    let id = orchestrator.submit(concept)?;
    println!("job {id}");
    let outcome = orchestrator.run(id);
    finish(id, outcome, orchestrator.metrics(), metrics)
}

fn resume_job(
    global: &GlobalArgs,
    id: JobId,
    metrics: &MetricsArgs,
    show_progress: bool,
) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let orchestrator = workspace.orchestrator(show_progress)?;
    let outcome = orchestrator.resume(id);
    finish(id, outcome, orchestrator.metrics(), metrics)
}

fn finish(
    id: JobId,
    outcome: reel_forge::PipelineResult<RunOutcome>,
    collector: MetricsCollector,
    metrics: &MetricsArgs,
) -> Result<()> {
    metrics.emit(&collector)?;
    match outcome {
        Ok(RunOutcome::Completed(output)) => {
            println!("completed {}", output.display());
            Ok(())
        }
        Ok(RunOutcome::Paused { last_completed }) => {
            let after = last_completed.map(|stage| stage.as_str()).unwrap_or("start");
            println!("paused after {after}");
            Ok(())
        }
        Err(err) => {
            error!(job_id = %id, "Run stopped: {err}. Resume with `reel-forge resume {id}`");
            Err(err.into())
        }
    }
}

fn pause_job(global: &GlobalArgs, id: JobId) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let orchestrator = workspace.orchestrator(false)?;
    orchestrator.recover(id)?;
    orchestrator.pause(id)?;
    if let Some(job) = orchestrator.job(id) {
        workspace.store.save(&job)?;
    }
    println!("paused {id}");
    Ok(())
}

fn show_status(global: &GlobalArgs, id: JobId) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let job = workspace.load(id)?;
    let stdout = io::stdout();
    to_writer_pretty(stdout.lock(), &job.progress()).context("Failed to write status")?;
    println!();
    Ok(())
}

fn list_jobs(global: &GlobalArgs) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let mut jobs = Vec::new();
    for id in workspace.store.list()? {
        match workspace.load(id) {
            Ok(job) => jobs.push(job),
            Err(err) => warn!(job_id = %id, "Skipping unreadable checkpoint: {err}"),
        }
    }
    jobs.sort_by_key(|job| job.created_at);
    for job in jobs {
        println!(
            "{}  {:<9} {:>3}%  {:<17} {}",
            job.id,
            job.status.as_str(),
            job.progress_percent,
            job.current_stage.as_str(),
            job.concept.title
        );
    }
    Ok(())
}

fn list_stages() {
    let registry = StageRegistry::standard();
    println!("Pipeline stages:");
    for stage in registry.stages() {
        println!("- {stage} ({}%)", registry.progress_for(*stage));
    }
}

fn validate_concepts(global: &GlobalArgs, patterns: &[String]) -> Result<()> {
    let config = match &global.config {
        Some(path) => ForgeConfig::load(path)?,
        None => ForgeConfig::default(),
    };

    let mut files = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern)
            .with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        for entry in matches {
            files.push(entry.with_context(|| format!("Failed to read match for {pattern}"))?);
        }
    }
    if files.is_empty() {
        bail!("No concept files matched {}", patterns.join(", "));
    }

    let mut failures = 0usize;
    for path in &files {
        match VideoConcept::load(path) {
            Ok(concept) => {
                let report = validate_concept(&concept, &config.concept_limits);
                for warning in &report.warnings {
                    warn!(file = %path.display(), "{warning}");
                }
                if report.is_ok() {
                    info!(file = %path.display(), "Concept validation passed");
                } else {
                    failures += 1;
                    for error_msg in &report.errors {
                        error!(file = %path.display(), "{error_msg}");
                    }
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %path.display(), "Failed to load concept: {err:#}");
            }
        }
    }

    if failures > 0 {
        bail!("Validation failed for {failures} concept(s)");
    }
    println!("{} concept(s) valid", files.len());
    Ok(())
}

fn concept_command(command: ConceptCommands) -> Result<()> {
    match command {
        ConceptCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("concepts/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(preset = %preset, path = %generated.display(), "Concept preset generated");
            println!("{}", generated.display());
            Ok(())
        }
        ConceptCommands::Presets => {
            for preset in PRESETS {
                println!("{preset}");
            }
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(
    name = "reel-forge",
    version,
    about = "Checkpointed concept-to-video generation pipeline"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// YAML settings file.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// Root directory for per-job workspaces.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    workspace: Option<PathBuf>,
    /// Directory holding job checkpoints.
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    checkpoints: Option<PathBuf>,
}

#[derive(Args)]
struct MetricsArgs {
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
    #[arg(long = "metrics-prometheus")]
    metrics_prometheus: Option<PathBuf>,
}

impl MetricsArgs {
    fn emit(&self, collector: &MetricsCollector) -> Result<()> {
        if !self.print_metrics && self.metrics_json.is_none() && self.metrics_prometheus.is_none()
        {
            return Ok(());
        }
        let snapshot = collector.snapshot();
        if self.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = &self.metrics_json {
            ensure_parent(path)?;
            let file = File::create(path)
                .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
            to_writer_pretty(file, &snapshot)
                .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
            info!(metrics = %path.display(), "Metrics JSON written");
        }
        if let Some(path) = &self.metrics_prometheus {
            ensure_parent(path)?;
            fs::write(path, snapshot.to_prometheus()).with_context(|| {
                format!("Failed to write Prometheus metrics: {}", path.display())
            })?;
            info!(metrics = %path.display(), "Prometheus metrics written");
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create metrics directory: {}", parent.display())
        })?;
    }
    Ok(())
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a concept file and run it to completion.
    Run {
        #[arg(value_hint = ValueHint::FilePath)]
        concept: PathBuf,
        #[command(flatten)]
        metrics: MetricsArgs,
        #[arg(long)]
        no_progress: bool,
        #[arg(long = "otlp-endpoint")]
        otlp_endpoint: Option<String>,
    },
    /// Continue a paused, failed or interrupted job from its checkpoint.
    Resume {
        job_id: JobId,
        #[command(flatten)]
        metrics: MetricsArgs,
        #[arg(long)]
        no_progress: bool,
        #[arg(long = "otlp-endpoint")]
        otlp_endpoint: Option<String>,
    },
    Pause {
        job_id: JobId,
    },
    Status {
        job_id: JobId,
    },
    /// List checkpointed jobs, oldest first.
    Jobs,
    ListStages,
    Validate {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    Concept {
        #[command(subcommand)]
        action: ConceptCommands,
    },
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConceptCommands {
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Presets,
}
