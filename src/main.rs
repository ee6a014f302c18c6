use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::archive::Archive;
use crate::archive::fs::FsArchive;
use crate::archive::s3::S3Archive;
use crate::db::pg::PgWarehouse;
use crate::processor::Processor;
use crate::util::env::{ArchiveBackend, Env, EnvErr};
use crate::util::telemetry::Telemetry;

mod api;
mod archive;
mod args;
mod db;
mod event;
mod processor;
mod scoring;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Server(#[from] api::server::ServerError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("telemetry setup failed: {0}")]
    Telemetry(Box<dyn std::error::Error + Send + Sync>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = args::Cli::parse();
    let env = Env::new()?;
    let telemetry = Telemetry::new(&env).map_err(RunnerErr::Telemetry)?.register();

    tracing::info!(service = %env.service_name, "starting risk scorer");

    let warehouse = PgWarehouse::connect_lazy(&env.warehouse()?);
    let processor = Processor::new(
        Arc::new(warehouse.clone()),
        build_archive(&env).await?,
        env.archive_prefix.clone(),
    );

    let outcome = match cli.command {
        args::Command::Serve { port } => {
            let port = match port {
                Some(port) => port,
                None => env.server_port()?,
            };

            api::server::serve(processor, port)
                .await
                .map(|_| ExitCode::SUCCESS)
                .map_err(RunnerErr::from)
        }
        args::Command::Process { input } => process_once(&processor, input.as_deref()).await,
    };

    warehouse.close().await;
    telemetry.shutdown();

    outcome
}

async fn build_archive(env: &Env) -> Result<Arc<dyn Archive>> {
    Ok(match env.archive_backend()? {
        ArchiveBackend::S3 { bucket } => {
            tracing::info!(%bucket, "archiving to s3");
            Arc::new(S3Archive::from_env(&bucket).await)
        }
        ArchiveBackend::Fs { root } => {
            let archive = FsArchive::new(root);
            tracing::info!(root = %archive.root().display(), "archiving to local filesystem");
            Arc::new(archive)
        }
    })
}

async fn process_once(processor: &Processor, input: Option<&Path>) -> Result<ExitCode> {
    let raw = match input {
        Some(path) => tokio::fs::read(path).await?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            buf
        }
    };

    let result = processor.handle_delivery(&raw).await;
    println!("{}", serde_json::to_string(&result)?);

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
