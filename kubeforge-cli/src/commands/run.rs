use crate::commands::load_config;
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kubeforge_service::execution::{progress_channel, LogLevel};
use kubeforge_service::{
    create_cluster_pipeline, Engine, ExecutionEvent, FailurePolicy, NodeStatus, Pipeline,
    RunOptions, RunReport, RunStatus,
};

/// Bring up the cluster described by the configuration
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration file (default: ~/.kubeforge/config.yaml)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report what would run without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep running work unrelated to a failure
    #[arg(long)]
    pub continue_on_error: bool,

    /// Maximum node-host pairs in flight (0 = unlimited)
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Maximum pairs in flight per host (0 = unlimited)
    #[arg(long, value_name = "N")]
    pub max_per_host: Option<usize>,

    /// Roll back succeeded ancestors of failed nodes
    #[arg(long)]
    pub rollback: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let mut engine_config = config.engine_config();
    if let Some(limit) = args.max_concurrency {
        engine_config.max_concurrency = limit;
    }
    if let Some(limit) = args.max_per_host {
        engine_config.max_per_host = limit;
    }
    if args.rollback {
        engine_config.rollback_on_failure = true;
    }
    let policy = if args.continue_on_error {
        FailurePolicy::ContinueOnError
    } else {
        config.engine.failure_policy
    };

    let runtime = Arc::new(config.runtime_context()?);
    let pipeline = create_cluster_pipeline(&config.cluster);
    let graph = pipeline.plan(&runtime)?;
    output::status(
        "Planned",
        &format!("{} nodes, {} node-host pairs", graph.len(), graph.pair_count()),
    );

    // Ctrl-C cancels the run; in-flight commands are killed
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            output::warning("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = progress_channel();
    let engine = Engine::new(engine_config).with_progress(tx);
    let options = RunOptions {
        policy,
        dry_run: args.dry_run,
    };

    // Spawn execution in background
    let exec_handle =
        tokio::spawn(async move { engine.execute(&graph, runtime, options, cancel).await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        print_event(&event);
    }

    let report = exec_handle.await?;
    info!(
        run_id = %report.run_id,
        status = %report.status,
        duration_ms = report.duration.as_millis() as u64,
        "run finished"
    );
    print_summary(&report);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            total_nodes,
            total_pairs,
            dry_run,
        } => {
            println!();
            let mode = if *dry_run { " (dry run)" } else { "" };
            output::header(&format!(
                "Run {}{}: {} nodes, {} pairs",
                run_id, mode, total_nodes, total_pairs
            ));
        }

        ExecutionEvent::NodeStarted { node, host } => {
            output::dim(&format!("    {} @ {} started", node, host));
        }

        ExecutionEvent::NodeRetrying {
            node,
            host,
            attempt,
            error,
            backoff,
        } => {
            output::warning(&format!(
                "{} @ {} attempt {} failed: {} (retrying in {:.1}s)",
                node,
                host,
                attempt,
                error,
                backoff.as_secs_f64()
            ));
        }

        ExecutionEvent::NodeCompleted {
            node,
            host,
            status,
            duration,
            up_to_date,
            error,
            message,
            ..
        } => {
            let label = format!("{} @ {} ({:.2}s)", node, host, duration.as_secs_f64());
            match status {
                NodeStatus::Succeeded if *up_to_date => output::check(&format!("{} up to date", label)),
                NodeStatus::Succeeded => match message {
                    Some(message) => output::success(&format!("{}: {}", label, message)),
                    None => output::success(&label),
                },
                _ => {
                    let reason = error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown error".to_string());
                    output::failure(&format!("{}: {}", label, reason));
                }
            }
        }

        ExecutionEvent::NodeSkipped { node, host, reason } => {
            output::warning(&format!("{} @ {} skipped: {}", node, host, reason));
        }

        ExecutionEvent::RollbackCompleted {
            node,
            host,
            success,
            error,
        } => {
            if *success {
                output::info(&format!("{} @ {} rolled back", node, host));
            } else {
                output::failure(&format!(
                    "{} @ {} rollback failed: {}",
                    node,
                    host,
                    error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        ExecutionEvent::RunCompleted { .. } => {}

        ExecutionEvent::Log { level, message, .. } => match level {
            LogLevel::Info => output::info(message),
            LogLevel::Warning => output::warning(message),
        },
    }
}

fn print_summary(report: &RunReport) {
    let summary = report.summary();
    println!();
    output::info(&format!(
        "{} pairs: {} succeeded ({} up to date), {} failed, {} skipped, {} rolled back",
        summary.total,
        summary.succeeded,
        summary.up_to_date,
        summary.failed,
        summary.skipped,
        summary.rolled_back
    ));

    let elapsed = report.duration.as_secs_f64();
    match report.status {
        RunStatus::Success => output::success(&format!("Run completed successfully in {:.2}s", elapsed)),
        RunStatus::Cancelled => output::error(&format!("Run cancelled after {:.2}s", elapsed)),
        status => {
            output::failure(&format!("Run finished with status '{}' after {:.2}s", status, elapsed));
            for (node, host, error) in report.failed_nodes() {
                let reason = error.map(|e| e.to_string()).unwrap_or_default();
                output::dim(&format!("    {} @ {}: {}", node, host, reason));
            }
        }
    }
}
