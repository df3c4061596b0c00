use std::{process, sync::Arc};

use stampa::{
    application::{convert::ConversionService, error::AppError},
    config,
    infra::{
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(config::ServeArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Convert(args) => run_convert(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let converter = ConversionService::new(&settings.converter)?;
    let state = ApiState {
        converter: Arc::new(converter),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "stampa::server",
        addr = %settings.server.addr,
        converter = %settings.converter.binary_path.display(),
        "Server started"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

async fn run_convert(settings: config::Settings, args: config::ConvertArgs) -> Result<(), AppError> {
    let converter = ConversionService::new(&settings.converter)?;

    let content = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    let pdf = converter.render_pdf(&content).await?;

    tokio::fs::write(&args.output, &pdf)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    info!(
        target = "stampa::convert",
        input = %args.input.display(),
        output = %args.output.display(),
        pdf_bytes = pdf.len(),
        "PDF written"
    );

    Ok(())
}
