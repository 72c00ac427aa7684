//! agit - safe git working-copy convergence
//!
//! Applies a manifest of declared repositories, cloning, switching branches
//! and fast-forwarding without discarding local work.

#![forbid(unsafe_code)]

use agit::{
    Accounts, AgentLocator, ConvergeMode, CredentialWrapperManager, GitContext, Run,
    SystemCommandRunner, inspect,
};
use agit_common::{LogConfig, ResourceId, init_logging, load_manifest};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

const SYSTEM_MANIFEST: &str = "/etc/agit/agit.toml";

#[derive(Parser)]
#[command(name = "agit")]
#[command(author, version, about = "Safe git working-copy convergence")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge every repository declared in a manifest
    Converge {
        /// Manifest path (defaults to the user config dir, then /etc/agit)
        #[arg(short, long, env = "AGIT_MANIFEST")]
        manifest: Option<PathBuf>,

        /// Report what would change without changing it
        #[arg(long)]
        dry_run: bool,

        /// Emit one JSON outcome per repository
        #[arg(long)]
        json: bool,
    },

    /// Print the observed remote and branch of a working copy
    Inspect {
        path: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the forwarded SSH agent socket of this session, if any
    LocateAgent {
        /// Socket glob
        #[arg(long, default_value = agit_common::DEFAULT_AGENT_SOCKET_GLOB)]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(err) => {
            let code = err.error_code();
            for step in code.remediation() {
                eprintln!("  - {step}");
            }
            bail!("[{}] {err}", code.code_string());
        }
    };

    match cli.command {
        Commands::Converge {
            manifest,
            dry_run,
            json,
        } => converge(manifest, dry_run, json).await,
        Commands::Inspect { path, json } => inspect_path(&path, json).await,
        Commands::LocateAgent { pattern } => {
            match AgentLocator::system(pattern, agit_common::DEFAULT_PROC_ROOT).locate() {
                Some(socket) => println!("{}", socket.display()),
                None => bail!("no forwarded SSH agent socket belongs to this session"),
            }
            Ok(())
        }
    }
}

fn default_manifest_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("agit").join("agit.toml"))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(SYSTEM_MANIFEST))
}

async fn converge(manifest: Option<PathBuf>, dry_run: bool, json: bool) -> Result<()> {
    let path = manifest.unwrap_or_else(default_manifest_path);
    let manifest = load_manifest(&path).map_err(|err| {
        error!(code = %err.error_code().code_string(), "{err}");
        anyhow::Error::new(err)
    })?;

    let settings = &manifest.settings;
    let mode = ConvergeMode::from_dry_run(dry_run || settings.dry_run);
    let locator = AgentLocator::system(&settings.agent_socket_glob, &settings.proc_root);
    let credentials = CredentialWrapperManager::new(locator, settings.wrapper_dir.clone());
    let mut run = Run::new(
        SystemCommandRunner::default(),
        Accounts::system(),
        credentials,
        mode,
    );

    info!(
        manifest = %path.display(),
        repositories = manifest.repositories.len(),
        dry_run = mode.is_dry_run(),
        "Starting run"
    );

    let mut failed = 0usize;
    for desired in &manifest.repositories {
        match run.converge(desired).await {
            Ok(outcome) if json => match serde_json::to_string(&outcome) {
                Ok(line) => println!("{line}"),
                Err(err) => error!(resource = %outcome.resource, error = %err, "Failed to encode outcome"),
            },
            Ok(outcome) if outcome.applied => println!("{}: {}", outcome.resource, outcome.action),
            Ok(outcome) if outcome.action.is_mutating() => {
                println!("{}: would {}", outcome.resource, outcome.action)
            }
            Ok(outcome) => println!("{}: up to date", outcome.resource),
            Err(err) => {
                failed += 1;
                let code = err.error_code();
                error!(
                    resource = %err.resource(),
                    reason = err.reason_code(),
                    code = %code.code_string(),
                    "{err}"
                );
                eprintln!("[{}] {err}", code.code_string());
                for step in err.remediation() {
                    eprintln!("  - {step}");
                }
            }
        }
    }

    let report = run.run_completed();
    for failure in &report.failures {
        eprintln!("cleanup: {failure}");
    }

    if failed > 0 {
        bail!(
            "{failed} of {} repositories failed to converge",
            manifest.repositories.len()
        );
    }
    Ok(())
}

async fn inspect_path(path: &Path, json: bool) -> Result<()> {
    let destination = std::path::absolute(path)
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    let ctx = GitContext::current_user(ResourceId::for_destination(&destination));
    let observed = inspect(&SystemCommandRunner::default(), &ctx, &destination).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&observed)?);
    } else if observed.is_absent() {
        println!("{}: no working copy", ctx.resource);
    } else {
        println!(
            "{}: origin {} on branch {}",
            ctx.resource,
            observed
                .repository
                .as_deref()
                .map(agit_common::mask_url_credentials)
                .unwrap_or_else(|| "(none)".to_string()),
            observed.branch.as_deref().unwrap_or("(none)")
        );
    }
    Ok(())
}
