//! Main entry point for CLI command to start server.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::configuration::generate_config_schema;
use crate::configuration::Configuration;
use crate::services::http;
use crate::services::GraphQLService;
use crate::storage::MemoryStorage;

/// Options for the server
#[derive(Parser, Debug)]
#[clap(
    name = "social-graph",
    about = "GraphQL service over users, profiles, posts and member types"
)]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[clap(
        long = "log",
        default_value = "info",
        alias = "log-level",
        env = "SOCIAL_GRAPH_LOG"
    )]
    log_level: String,

    /// Configuration location relative to the project directory.
    #[clap(short, long = "config", env = "SOCIAL_GRAPH_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Prints the configuration schema.
    #[clap(long)]
    schema: bool,
}

/// This is the main entrypoint.
pub fn main() -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(nb) = std::env::var("SOCIAL_GRAPH_NUM_CORES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        builder.worker_threads(nb);
    }
    let runtime = builder.build()?;
    runtime.block_on(start(Opt::parse()))
}

async fn start(opt: Opt) -> Result<()> {
    if opt.schema {
        let schema = generate_config_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let builder = tracing_subscriber::fmt::fmt().with_env_filter(
        EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
    );
    if std::io::stdout().is_terminal() {
        builder.try_init()
    } else {
        builder.json().try_init()
    }
    .map_err(|error| anyhow::anyhow!("could not set the global subscriber: {error}"))?;

    let configuration = match &opt.config_path {
        Some(path) => {
            let path = if path.is_relative() {
                std::env::current_dir()?.join(path)
            } else {
                path.clone()
            };
            Configuration::from_file(&path)?
        }
        None => Configuration::default(),
    };
    tracing::debug!(?configuration, "configuration loaded");

    let storage = MemoryStorage::builder()
        .seed_member_types(configuration.storage().seed_member_types())
        .build();
    let service = GraphQLService::new(&configuration, Arc::new(storage))?;
    let router = http::main_router(&configuration, service)?;

    if let Err(err) = http::serve(&configuration, router).await {
        tracing::error!("{}", err);
        return Err(err.into());
    }
    tracing::info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_line_is_well_formed() {
        Opt::command().debug_assert();
    }

    #[test]
    fn options_are_parsed() {
        let opt = Opt::try_parse_from(["social-graph", "--config", "config.yaml", "--log", "debug"])
            .unwrap();
        assert_eq!(opt.config_path, Some(PathBuf::from("config.yaml")));
        assert_eq!(opt.log_level, "debug");
        assert!(!opt.schema);
    }
}
