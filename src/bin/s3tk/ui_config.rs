// Decides whether the terminal shows progress, based on quiet mode,
// verbosity and JSON logging.

use s3tk_rs::config::Config;

/// Whether throttled progress lines and the live indicator are shown.
///
/// Returns `false` when:
/// - `show_no_progress` is set
/// - Verbosity is above Warn (tracing takes over the terminal)
/// - JSON logging is enabled (progress text would corrupt JSON output)
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    match &config.tracing_config {
        None => true,
        Some(tracing_config) => {
            tracing_config.tracing_level <= log::Level::Warn && !tracing_config.json_tracing
        }
    }
}

/// Whether the confirmation prompt must be skipped because logs are JSON.
pub fn is_json_logging(config: &Config) -> bool {
    config
        .tracing_config
        .as_ref()
        .is_some_and(|tracing_config| tracing_config.json_tracing)
}
