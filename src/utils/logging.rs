// src/utils/logging.rs
use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console + `logs/bot.log`. Keep the returned guard alive for the whole run,
/// dropping it flushes and stops the background writer.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&cfg.dir)?;

    let filter_str = format!(
        "{},hyper=warn,reqwest=warn,rustls=warn,tungstenite=warn,tokio_tungstenite=warn",
        cfg.level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never(&cfg.dir, &cfg.file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
