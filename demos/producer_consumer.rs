//! Producer/consumer walkthrough: a bounded queue drained through a verbose rate gate.
//!
//! Run with `cargo run --example producer_consumer`. Settings are read from the environment
//! (or a `.env` file) when `RATE_GATE_ID` and `RATE_GATE_TARGET_RPM` are present; otherwise
//! the gate targets 1000 requests per minute. Press Ctrl-C to stop.

use std::{sync::Arc, time::Duration};

use rand::seq::IndexedRandom;
use rate_gate::rate_gate::{ConfigError, RateGate, RateGateSettings, RoundingMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_NAME: &str = "rate_gate_demo.log";
const QUEUE_CAPACITY: usize = 25;
const PRODUCE_EVERY: Duration = Duration::from_millis(50);
const DEFAULT_TARGET_PER_MINUTE: u32 = 1000;
const WORK_DELAYS_MS: [u64; 4] = [100, 200, 500, 1000];

#[tokio::main]
async fn main() -> Result<(), rate_gate::Error> {
    let file_appender = tracing_appender::rolling::daily(".", LOG_FILE_NAME);
    let (non_blocking_appender, _guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = "info,rate_gate::stats=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true);
    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    dotenvy::dotenv().ok();

    let settings = match RateGateSettings::from_env() {
        Ok(settings) => settings,
        Err(ConfigError::MissingVar { name }) => {
            info!(missing = name, "Using built-in demo settings.");
            RateGateSettings::builder()
                .identifier("sampleId")
                .target_per_minute(DEFAULT_TARGET_PER_MINUTE)
                .rounding_mode(RoundingMode::Hasty)
                .verbose(true)
                .build()
        }
        Err(error) => return Err(error.into()),
    };
    info!(target: "config", settings = ?settings);

    let gate = Arc::new(RateGate::from_settings(settings));
    let stop = CancellationToken::new();
    let (queue, items) = mpsc::channel::<String>(QUEUE_CAPACITY);

    let producer = tokio::spawn(produce(queue, stop.clone()));
    let consumer = tokio::spawn(consume(items, Arc::clone(&gate), stop.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Stopping.");
    stop.cancel();

    producer.await?;
    let processed = consumer.await?;
    gate.shutdown().await;

    info!(processed, "Done.");
    Ok(())
}

async fn produce(queue: mpsc::Sender<String>, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(PRODUCE_EVERY);
    info!("Started producer.");

    loop {
        let produced_at = tokio::select! {
            _ = stop.cancelled() => break,
            tick = ticker.tick() => tick,
        };

        let payload = format!("Custom Payload: {:?}", produced_at);
        if queue.send(payload).await.is_err() {
            break;
        }

        let buffered = queue.max_capacity() - queue.capacity();
        if buffered > 0 && buffered % 10 == 0 {
            info!(buffered, capacity = queue.max_capacity(), "Buffer filling up.");
        }
    }
}

async fn consume(
    mut items: mpsc::Receiver<String>,
    gate: Arc<RateGate>,
    stop: CancellationToken,
) -> u64 {
    let mut processed = 0;

    while let Some(payload) = items.recv().await {
        if let Err(error) = gate.admit_until(&stop).await {
            warn!(%error, "Stopped waiting for admission.");
            break;
        }

        let delay = WORK_DELAYS_MS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(WORK_DELAYS_MS[0]);
        tokio::spawn(work(payload, Duration::from_millis(delay)));
        processed += 1;
    }

    processed
}

async fn work(payload: String, delay: Duration) {
    // Stand-in for a network call or any other gated job.
    tokio::time::sleep(delay).await;
    tracing::trace!(%payload, delay_ms = delay.as_millis() as u64, "Work finished.");
}
