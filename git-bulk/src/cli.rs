///
/// This module implements the CLI interface for git-bulk: command parsing,
/// request loading, wiring of the GitHub client and printing of results.
///
/// All pipeline logic (validation, chunking, rate limiting, commits) lives in
/// the [`git-bulk-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - For command-line users: use the installed `git-bulk` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// Requests are JSON files shaped like the core request types, e.g. for `push`:
/// `{"owner", "repo", "branch", "files": [{"path", "content"}], "message",
/// "chunk_size"?, "continue_on_error"?}`.
///
/// [`git-bulk-core`]: ../../git-bulk-core/
use crate::github::GitHubClient;
use crate::load_config::{config_from_env, load_config, CliConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use git_bulk_core::limits::push_limits;
use git_bulk_core::push::{
    delete_files, push_files, push_files_chunked, BulkDeleteRequest, BulkPushRequest,
    PushContext, PushRequest,
};
use git_bulk_core::ratelimit::RateLimiter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// CLI for git-bulk: size-aware bulk pushes to GitHub.
#[derive(Parser)]
#[clap(
    name = "git-bulk",
    version,
    about = "Push, commit and delete many files on a GitHub branch through the git data API"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Push any number of files as a sequence of size-bounded commits
    Push {
        /// Path to the JSON request file
        #[clap(long)]
        request: PathBuf,
    },
    /// Push up to 100 files as a single commit
    Commit {
        #[clap(long)]
        request: PathBuf,
    },
    /// Delete up to 100 paths in a single commit
    Delete {
        #[clap(long)]
        request: PathBuf,
    },
    /// Print the size and count limits as JSON
    Limits,
}

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {path:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid request JSON in {path:?}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancels the returned token on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight work");
            trigger.cancel();
        }
    });
    cancel
}

fn connect(config: &CliConfig) -> Result<(GitHubClient, PushContext)> {
    let token = config
        .github
        .token
        .as_deref()
        .context("GITHUB_TOKEN must be set for commands that talk to GitHub")?;
    let client = GitHubClient::new(&config.github.api_url, token)?;

    let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
    let mut ctx = PushContext::new(limiter).with_cancellation(shutdown_token());
    if let Some(retry) = &config.retry {
        ctx = ctx.with_retry(retry.to_retry_config());
    }
    Ok((client, ctx))
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    if let Commands::Limits = cli.command {
        return print_json(&push_limits());
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => config_from_env()?,
    };

    match cli.command {
        Commands::Push { request } => {
            let req: BulkPushRequest = read_request(&request)?;
            let (client, ctx) = connect(&config)?;
            tracing::info!(command = "push", files = req.files.len(), "Starting chunked push");
            let result = push_files_chunked(&client, &ctx, &req).await?;
            print_json(&result)?;
            if !result.fully_successful {
                tracing::error!(
                    command = "push",
                    failed_chunks = result.failed_chunks,
                    "Chunked push incomplete"
                );
                bail!(
                    "{} of {} chunks failed",
                    result.failed_chunks,
                    result.total_chunks
                );
            }
            Ok(())
        }
        Commands::Commit { request } => {
            let req: PushRequest = read_request(&request)?;
            let (client, ctx) = connect(&config)?;
            let result = push_files(&client, &ctx, &req).await?;
            tracing::info!(command = "commit", commit = %result.commit_sha, "Commit complete");
            print_json(&result)
        }
        Commands::Delete { request } => {
            let req: BulkDeleteRequest = read_request(&request)?;
            let (client, ctx) = connect(&config)?;
            let result = delete_files(&client, &ctx, &req).await?;
            tracing::info!(command = "delete", commit = %result.commit_sha, "Delete complete");
            print_json(&result)
        }
        Commands::Limits => print_json(&push_limits()),
    }
}
