use anyhow::Result;
use clap::{Parser, Subcommand};
use dialogc::config::CompilerConfig;
use dialogc::loader::FileProjectSource;
use dialogc::publish::{PublishRequest, Publisher};
use dialogc::sink::redis_store::RedisStore;
use dialogc::sink::store::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML or JSON compiler config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding `<project-id>/project.yaml` and `<project-id>/<version>.yaml`
    #[arg(long, global = true, default_value = "projects")]
    source: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a project version into Redis
    Publish {
        project: Uuid,

        /// Ignored with --demo, which always reads version -1
        #[arg(default_value_t = 0, allow_negative_numbers = true)]
        version: i64,

        /// Compile into the preview namespace
        #[arg(long)]
        demo: bool,

        /// Redis connection URL, overrides the config file
        #[arg(long)]
        redis: Option<String>,
    },

    /// Compile into memory and list the keys that would be written
    DryRun {
        project: Uuid,

        #[arg(default_value_t = 0, allow_negative_numbers = true)]
        version: i64,

        #[arg(long)]
        demo: bool,
    },
}

fn request(project: Uuid, version: i64, demo: bool) -> PublishRequest {
    if demo { PublishRequest::demo(project) } else { PublishRequest::new(project, version) }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };
    let source = Arc::new(FileProjectSource::new(cli.source.clone()));
    let trainer = config.training.build_trainer()?;

    match cli.command {
        Commands::Publish { project, version, demo, redis } => {
            if let Some(url) = redis {
                config.redis_url = url;
            }
            info!("Connecting to Redis at {}", config.redis_url);
            let store = Arc::new(RedisStore::connect(&config.redis_url).await?);

            let mut publisher = Publisher::new(store, source, config);
            if let Some(trainer) = trainer {
                publisher = publisher.with_trainer(trainer);
            }

            let outcome = publisher.publish(request(project, version, demo)).await?;
            println!(
                "{}: {:?}, {} dialog nodes, {} writes",
                outcome.publish_id, outcome.status, outcome.nodes, outcome.report.commands
            );
        }
        Commands::DryRun { project, version, demo } => {
            let store = Arc::new(MemoryStore::new());

            let mut publisher = Publisher::new(store.clone(), source, config);
            if let Some(trainer) = trainer {
                publisher = publisher.with_trainer(trainer);
            }

            let outcome = publisher.publish(request(project, version, demo)).await?;
            let mut keys = store.keys();
            keys.sort();
            for key in keys {
                println!("{}\t{}", store.size_of(&key), key);
            }
            println!(
                "{}: {:?}, {} dialog nodes, {} writes",
                outcome.publish_id, outcome.status, outcome.nodes, outcome.report.commands
            );
        }
    }

    Ok(())
}
