use crate::commands::load_config;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use kubeforge_service::{create_cluster_pipeline, Pipeline};

/// Plan the bring-up without touching any host
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the configuration file (default: ~/.kubeforge/config.yaml)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the graph as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let runtime = config.runtime_context()?;

    let pipeline = create_cluster_pipeline(&config.cluster);
    let graph = pipeline.plan(&runtime)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graph.summary())?);
        return Ok(());
    }

    output::header(&format!(
        "Pipeline '{}' for cluster '{}'",
        pipeline.name(),
        config.cluster.name
    ));
    for (level, nodes) in graph.parallel_levels().iter().enumerate() {
        output::level_header(level, nodes.len());
        for node in nodes {
            println!("    {:<32} {}", node.id.as_str(), node.host_names().join(", "));
        }
    }

    println!();
    output::info(&format!(
        "{} nodes, {} node-host pairs, modules: {}",
        graph.len(),
        graph.pair_count(),
        pipeline.module_names().join(" -> ")
    ));
    Ok(())
}
