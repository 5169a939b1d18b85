// Tracing subscriber for the CLI binary.
//
// Events go to stderr: stdout carries command output (`get --stdout`,
// `scan`) and must stay clean.

use std::env;
use std::io::IsTerminal;

use tracing_subscriber::fmt::format::FmtSpan;

use s3tk_rs::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(!config.disable_color_tracing && std::io::stderr().is_terminal())
        .with_span_events(fmt_span);

    let (event_filter, show_target) = event_filter(config, env::var(EVENT_FILTER_ENV_VAR).ok());

    let subscriber_builder = subscriber_builder
        .with_env_filter(event_filter)
        .with_target(show_target);
    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

/// The filter directive and whether event targets are worth showing.
fn event_filter(config: &TracingConfig, rust_log: Option<String>) -> (String, bool) {
    let level = config.tracing_level;
    if config.aws_sdk_tracing {
        (
            format!(
                "s3tk_rs={level},s3tk={level},aws_smithy_runtime={level},aws_config={level},aws_sigv4={level}"
            ),
            true,
        )
    } else if let Some(rust_log) = rust_log {
        (rust_log, true)
    } else {
        (format!("s3tk_rs={level},s3tk={level}"), false)
    }
}
