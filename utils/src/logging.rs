use std::env;

use chrono::Local;
use log::LevelFilter;

pub fn setup_logging() -> Result<(), fern::InitError> {
    let level = parse_level_filter(env::var("LOG_LEVEL").ok().as_deref());

    let stderr_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}: {}",
                Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        // The kube client is chatty at debug level
        .level_for("tower", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .chain(std::io::stderr());

    fern::Dispatch::new().chain(stderr_config).apply()?;

    Ok(())
}

pub fn parse_level_filter(value: Option<&str>) -> LevelFilter {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Warn, // Default to Warn if variable is unset or has an unrecognized value
    }
}
