use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidqueue::{
    config::Config,
    connectors::{StorageConnector, VideoPlatformConnector},
    credentials::CredentialResolver,
    database::Database,
    pipeline::{JobProcessor, OpThrottle, PublishScheduler, QueueDispatcher},
    providers::{DownloadProvider, ProviderChain, SsstikProvider, TikwmProvider},
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "vidqueue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Video publish scheduling and ingestion queue service")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("vidqueue={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vidqueue v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration from specified file
    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    // Shared HTTP client with an explicit timeout on every outbound call
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.processing.request_timeout_secs))
        .user_agent(concat!("vidqueue/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let credentials = CredentialResolver::new(
        database.clone(),
        client.clone(),
        config.platform.clone(),
    );
    let storage = Arc::new(StorageConnector::new(client.clone(), config.platform.clone()));
    let platform = Arc::new(VideoPlatformConnector::new(
        client.clone(),
        config.platform.clone(),
    ));

    // Download providers are tried in this order
    let chain = Arc::new(ProviderChain::new(vec![
        Box::new(TikwmProvider::new(
            client.clone(),
            config.providers.tikwm_api_base.clone(),
        )) as Box<dyn DownloadProvider>,
        Box::new(SsstikProvider::new(
            client.clone(),
            config.providers.ssstik_api_base.clone(),
        )),
    ]));

    let processor = Arc::new(JobProcessor::new(
        database.clone(),
        credentials,
        storage,
        platform,
        chain,
        client,
        config.platform.clone(),
        config.processing.clone(),
    ));

    let scheduler = Arc::new(PublishScheduler::new(
        database.clone(),
        processor.clone(),
        config.processing.window_hours,
    ));
    let dispatcher = Arc::new(QueueDispatcher::new(
        database.clone(),
        processor.clone(),
        config.processing.batch_size,
    ));
    let throttle = OpThrottle::new(config.trigger.min_run_spacing_secs);

    // Optional internal ticker for deployments without an external trigger
    if let Some(interval_secs) = config.trigger.internal_interval_secs {
        let ticker_scheduler = scheduler.clone();
        let ticker_dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;

                if let Err(e) = ticker_scheduler.run().await {
                    error!("Internal publish run failed: {}", e);
                }
                if let Err(e) = ticker_dispatcher.run().await {
                    error!("Internal queue run failed: {}", e);
                }
            }
        });
        info!("Internal pipeline ticker started ({}s interval)", interval_secs);
    }

    let web_server = WebServer::new(config, database, scheduler, dispatcher, throttle)?;

    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve().await?;

    Ok(())
}
