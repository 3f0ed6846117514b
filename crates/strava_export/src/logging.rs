use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber shared by both binaries.
///
/// The filter comes from `STRAVA_EXPORT_LOG_LEVEL`, then `RUST_LOG`, then
/// `info`. HTTP internals stay at `warn` unless the filter says otherwise.
pub fn init() {
    let log_env = std::env::var("STRAVA_EXPORT_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let combined_filter = format!("{log_env},hyper=warn,reqwest=warn");
    let env_filter = EnvFilter::try_new(combined_filter)
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::debug!("log filter: {}", log_env);
}
