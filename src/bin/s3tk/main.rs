use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace};

use s3tk_rs::command::{CommandEnv, run_command};
use s3tk_rs::config::Config;
use s3tk_rs::storage::create_storage;
use s3tk_rs::types::RunContext;
use s3tk_rs::{
    CLIArgs, create_run_cancellation_token, exit_code_from_error, is_cancelled_error,
    is_output_closed,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

/// s3tk - bulk operations toolkit for Amazon S3.
///
/// This binary is a thin wrapper over the s3tk-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3tk",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let exit_code = run(config).await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Runs the configured command and maps its outcome to a process exit code.
async fn run(config: Config) -> i32 {
    let Some(command) = config.command.as_ref() else {
        let _ = CLIArgs::command().print_help();
        return 2;
    };

    let cancellation_token = create_run_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let context = RunContext::new(cancellation_token.clone(), command.is_dry_run());

    let storage = match (command.bucket(), config.client_config.as_ref()) {
        (Some(bucket), Some(client_config)) => {
            Some(create_storage(client_config, bucket, config.rate_limit_objects).await)
        }
        _ => None,
    };

    let show_progress = ui_config::is_progress_indicator_needed(&config);
    let indicator = indicator::Indicator::start(context.clone(), show_progress);

    let mut env = CommandEnv::new(context, config.reporter_config)
        .with_json_logging(ui_config::is_json_logging(&config));
    if show_progress {
        env = env.with_progress(indicator.progress_sink());
    }

    debug!("command start.");
    let result = run_command(command, storage, &env, &mut tokio::io::stdout()).await;

    indicator.finish().await;
    cancellation_token.cancel();

    match result {
        Ok(()) => {
            debug!(
                duration_sec = format!("{:.3}", env.context.elapsed().as_secs_f32()),
                "s3tk has been completed."
            );
            0
        }
        Err(e) if is_cancelled_error(&e) => {
            debug!("command cancelled.");
            0
        }
        Err(e) if is_output_closed(&e) => {
            debug!("output closed by reader.");
            0
        }
        Err(e) => {
            error!("{:#}", e);
            exit_code_from_error(&e)
        }
    }
}
