use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use changes_reader::{ChangesEvent, ChangesReader, HttpTransport};

mod config;

use config::{Config, ReaderMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!(
        database = %config.couch.database,
        mode = ?config.reader.mode,
        since = %config.poll.since,
        "Starting changes reader"
    );

    let transport = Arc::new(HttpTransport::new(&config.couch.url)?);
    let reader = Arc::new(ChangesReader::new(config.couch.database.clone(), transport));

    let channel = match config.reader.mode {
        ReaderMode::Start => reader.start(config.poll.clone()),
        ReaderMode::Get => reader.get(config.poll.clone()),
        ReaderMode::Spool => reader.spool(config.poll.clone()),
    };

    let interrupt = {
        let reader = Arc::clone(&reader);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping after the current request");
                reader.stop();
            }
        })
    };

    let wait = config.poll.wait;
    let mut stdout = std::io::stdout().lock();
    while let Some(event) = channel.recv().await {
        serde_json::to_writer(&mut stdout, &event)?;
        writeln!(stdout)?;

        // Output is the consumer: once a batch is written, ask for the next one
        if wait && matches!(event, ChangesEvent::Batch { .. }) {
            stdout.flush()?;
            reader.resume();
        }
    }
    stdout.flush()?;
    interrupt.abort();

    match channel.outcome() {
        Some(Ok(last_seq)) => {
            tracing::info!(last_seq = %last_seq, "Changes reader finished");
            Ok(())
        }
        Some(Err(error)) => anyhow::bail!("Changes reader failed: {}", error),
        None => anyhow::bail!("Changes reader ended without an outcome"),
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout carries the events; logs go to stderr
    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
