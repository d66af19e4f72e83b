use anyhow::Result;
use clap::Parser;
use job_throttler::config::Config;
use job_throttler::config_validator::ConfigValidator;
use job_throttler::context::ExecutionContext;
use job_throttler::pipeline::RecordingPipeline;
use job_throttler::rate_limit_config::WorkerRules;
use job_throttler::redis::RedisClient;
use job_throttler::server::Server;
use job_throttler::store::SharedStore;
use job_throttler::throttler::Throttler;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Admission control service for background job pipelines
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind_addr: Option<SocketAddr>,

    /// Redis URL for shared storage (overrides REDIS_URL)
    #[arg(long)]
    redis_url: Option<String>,

    /// Worker rules file (overrides RULES_PATH)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Log level (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(bind_addr) = self.bind_addr {
            config.bind_addr = bind_addr;
        }
        if let Some(redis_url) = self.redis_url {
            config.redis_url = Some(redis_url);
        }
        if let Some(rules) = self.rules {
            config.rules_path = Some(rules);
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    Args::parse().apply(&mut config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("job_throttler={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    ConfigValidator::validate_config(&config)?;

    tracing::info!("Starting job throttler");
    tracing::info!(
        bind_addr = %config.bind_addr,
        shared_storage = config.shared_storage_enabled(),
        rules_path = ?config.rules_path,
        "Configuration loaded"
    );

    let mut context = ExecutionContext::new();
    if let Some(url) = config.redis_url.as_deref().filter(|_| config.shared_storage_enabled()) {
        let client = RedisClient::connect(url).await?;
        tracing::info!(redis = %client.connection_info(), "Connected shared store");
        context = context.with_shared_store(Arc::new(SharedStore::with_namespace(
            Arc::new(client),
            config.shared_namespace.clone(),
        )));
    }

    let rules = match &config.rules_path {
        Some(path) => WorkerRules::from_file(path)?,
        None => WorkerRules::default(),
    };
    ConfigValidator::validate_rules(&rules, context.has_shared_store())?;
    tracing::info!(workers = rules.workers.len(), "Worker rules loaded");

    // The service answers admission requests; callers requeue deferred jobs themselves.
    let throttler = Throttler::with_rules(
        Arc::new(context),
        Arc::new(RecordingPipeline::new()),
        rules,
    );

    Server::new(Arc::new(throttler), config.bind_addr)
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
