use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stdout + daily-rotating file logging, grounded on the teacher's
/// `utils/logger.rs`. `LOG_FORMAT=json` switches both layers to JSON for
/// production; anything else keeps the pretty default for local runs.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rag_worker=debug"));
    let json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rag-worker")
        .filename_suffix("log")
        .build("logs")?;

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .with(fmt::layer().json().with_writer(file_appender))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stdout))
            .with(fmt::layer().with_writer(file_appender).with_ansi(false))
            .init();
    }
    Ok(())
}
