use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use opentelemetry::Context;
use opentelemetry::trace::{FutureExt, TraceContextExt};
use propsync::config::Configuration;
use propsync::directory::Selector;
use propsync::error::Result;
use propsync::pipeline::{Pipeline, RunReport};
use propsync::publisher::ImportJob;
use propsync::{build_pipeline, telemetry};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the YAML configuration, `config.yaml` by default.
    #[clap(long, short)]
    config: Option<PathBuf>,
    /// Only export users matching this string.
    #[clap(long, short)]
    search: Option<String>,
    /// Write local artifacts without uploading nor queuing an import.
    #[clap(long)]
    dry_run: bool,
}

/// Prepare the document, then publish it unless `dry_run` is set.
async fn run(
    pipeline: &Pipeline,
    selector: &Selector,
    dry_run: bool,
) -> Result<(Option<ImportJob>, RunReport)> {
    let prepared = pipeline.prepare(selector).await?;
    if dry_run {
        return Ok((None, prepared.report));
    }

    let job = pipeline.publish(&prepared).await?;
    Ok((Some(job), prepared.report))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Configuration::read(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            // telemetry settings live in the configuration.
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            tracing::error!(error = %err, "cannot load configuration");
            return ExitCode::from(EXIT_CONFIG);
        },
    };

    let guard = match telemetry::init(&config.telemetry) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("cannot initialize telemetry: {err}");
            return ExitCode::from(EXIT_CONFIG);
        },
    };
    tracing::debug!(path = %config.path().display(), "configuration loaded");

    let pipeline = match build_pipeline(&config, args.dry_run) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            guard.shutdown();
            return ExitCode::from(EXIT_CONFIG);
        },
    };

    let selector = Selector::from(args.search);
    let span = telemetry::start_run(args.dry_run);
    let cx = Context::current_with_span(span);

    let outcome = run(&pipeline, &selector, args.dry_run)
        .with_context(cx.clone())
        .await;

    let code = match outcome {
        Ok((job, report)) => {
            telemetry::end_run(&cx, Some(&report), None);
            match job {
                Some(job) => println!("{job}"),
                None => tracing::info!("dry run, nothing published"),
            }
            ExitCode::SUCCESS
        },
        Err(err) => {
            tracing::error!(stage = err.stage(), error = %err, "run failed");
            if let Some(source) = std::error::Error::source(&err) {
                tracing::debug!(cause = %source, "failure cause");
            }
            let failure = (err.stage(), err.to_string());
            telemetry::end_run(&cx, None, Some(failure));
            ExitCode::from(EXIT_FAILURE)
        },
    };

    guard.shutdown();
    code
}
