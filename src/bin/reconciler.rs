//! Manifest reconciler command-line entry point.
//!
//! The `reconciler` command routes one delivered webhook through the
//! configured targets, or validates a configuration file.
//!
//! ## Commands
//!
//! - `dispatch`: Reconcile the manifest for one webhook delivery
//! - `targets`: Validate the configuration and list its targets

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::{Parser, Subcommand};
use manifest_reconciler::{
    config::AppConfig,
    reconcile::{
        adapters::{GitCliWorkingCopyProvider, KustomizeEditor, StaticTokenAuth, github},
        ports::InstallationToken,
        services::{DispatchOutcome, EventDispatcher, PolicyContext, TargetRegistry},
    },
    telemetry::init_tracing,
};
use mockable::DefaultClock;
use std::sync::Arc;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "reconciler")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GitOps manifest reconciler", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "RECONCILER_CONFIG")]
    config: Utf8PathBuf,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the manifest for one webhook delivery
    Dispatch {
        /// Webhook event name, as sent in the `X-GitHub-Event` header
        #[arg(short, long)]
        event: String,

        /// Path to the webhook body (JSON)
        #[arg(short, long)]
        payload: Utf8PathBuf,

        /// Installation token used for every hosting call
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: String,
    },

    /// Validate the configuration and list its targets
    Targets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    match cli.command {
        Commands::Dispatch {
            event,
            payload,
            github_token,
        } => cmd_dispatch(&config, &event, &payload, github_token).await,
        Commands::Targets => cmd_targets(&config),
    }
}

async fn cmd_dispatch(
    config: &AppConfig,
    event_name: &str,
    payload: &Utf8Path,
    github_token: String,
) -> Result<()> {
    let body = read_payload(payload)?;
    let Some(event) = github::parse_webhook(event_name, &body)
        .with_context(|| format!("Failed to decode {event_name} payload"))?
    else {
        info!(event = event_name, "event carries nothing to reconcile");
        return Ok(());
    };

    let registry = build_registry(config, github_token)?;
    let dispatcher = EventDispatcher::new(Arc::new(registry), config.max_concurrent_runs);
    dispatcher.submit(event).await;

    let mut failed = 0_usize;
    for outcome in dispatcher.drain().await {
        match outcome {
            DispatchOutcome::Completed(report) => info!(
                run_id = %report.run_id,
                target = %report.target,
                outcome = report.outcome.label(),
                "run completed"
            ),
            DispatchOutcome::Unrouted { repository } => {
                info!(repository = %repository, "no target configured for repository");
            }
            DispatchOutcome::Failed {
                repository,
                trigger,
                error,
            } => {
                error!(repository = %repository, trigger = %trigger, error = %error, "run failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} run(s) failed");
    }
    Ok(())
}

fn cmd_targets(config: &AppConfig) -> Result<()> {
    let targets = config
        .managed_targets()
        .context("Configuration contains invalid targets")?;
    let manifest = config
        .manifest_coordinates()
        .context("Configuration contains an invalid manifest repository")?;

    info!(
        manifest = %manifest.repository(),
        base_branch = %manifest.base_branch(),
        count = targets.len(),
        "configuration valid"
    );
    for target in &targets {
        info!(
            repository = %target.repository(),
            branch = %target.target_branch(),
            prefix = %target.branch_prefix(),
            images = target.images().len(),
            "target"
        );
    }
    Ok(())
}

fn build_registry(config: &AppConfig, github_token: String) -> Result<TargetRegistry> {
    let auth = StaticTokenAuth::new(
        InstallationToken::new(github_token),
        config.github.api_base.clone(),
        config.installation_id().context("Invalid installation id")?,
    );
    let provider =
        GitCliWorkingCopyProvider::new(config.git_binary.clone(), config.github.git_base.clone());
    let editor = KustomizeEditor::new(config.kustomize_binary.clone());
    let manifest = config
        .manifest_coordinates()
        .context("Invalid manifest repository")?;

    let context = Arc::new(
        PolicyContext::new(
            Arc::new(auth),
            Arc::new(provider),
            Arc::new(editor),
            manifest,
        )
        .with_run_timeout(config.run_timeout()),
    );
    let targets = config.managed_targets().context("Invalid targets")?;

    TargetRegistry::with_policies(targets, &context, &Arc::new(DefaultClock))
        .context("Failed to register targets")
}

fn read_payload(path: &Utf8Path) -> Result<Vec<u8>> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("Payload path {path} has no file name"))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .with_context(|| format!("Failed to open {parent}"))?;
    dir.read(file_name)
        .with_context(|| format!("Failed to read payload {path}"))
}
