//! Chunk-processing worker binary.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use equinewatch_inference::{InferenceClient, InferenceConfig};
use equinewatch_queue::{JobQueue, ProgressChannel};
use equinewatch_registry::{HotStore, IdentityRegistry, RegistryClient};
use equinewatch_storage::R2Client;
use equinewatch_worker::{JobExecutor, PipelineContext, RemoteExtractor, WorkerConfig};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("equinewatch=info".parse().unwrap()))
        .init();

    info!("starting equinewatch-worker");

    let config = WorkerConfig::from_env();
    info!("worker config: {:?}", config);

    let metrics_addr: std::net::SocketAddr = std::env::var("EQUINEWATCH_METRICS_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:9090".to_string())
        .parse()
        .expect("invalid EQUINEWATCH_METRICS_ADDR");
    if let Err(e) = equinewatch_worker::metrics::init_metrics(metrics_addr) {
        warn!("failed to start metrics listener on {metrics_addr}: {e}");
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("failed to create job queue: {e}");
            std::process::exit(1);
        }
    };

    let ctx = match build_pipeline_context().await {
        Ok(c) => c,
        Err(e) => {
            error!("failed to build pipeline context: {e}");
            std::process::exit(1);
        }
    };

    let executor = JobExecutor::new(config, queue, ctx);

    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
    });

    if let Err(e) = executor.run().await {
        error!("executor error: {e}");
        std::process::exit(1);
    }

    shutdown_handle.await.ok();

    info!("worker shutdown complete");
}

/// Assemble the pipeline's collaborators from the environment (§6, §11).
/// The overlay label font is optional and best-effort: without
/// `EQUINEWATCH_OVERLAY_FONT_PATH` set, `render_overlay` still draws boxes
/// and skeletons, just without text labels.
async fn build_pipeline_context() -> anyhow::Result<PipelineContext> {
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let hot = HotStore::from_env()?;
    let warm = RegistryClient::from_env().await?;
    let registry = IdentityRegistry::new(hot, warm);

    let inference_config = InferenceConfig::from_env();
    let inference = InferenceClient::new(inference_config.clone())?;
    let extractor = RemoteExtractor::new(InferenceClient::new(inference_config)?);

    let storage = R2Client::from_env().await?;
    let progress = ProgressChannel::new(&redis_url)?;

    let font = load_overlay_font();

    Ok(PipelineContext { registry, extractor, inference, progress, storage, font })
}

fn load_overlay_font() -> Option<rusttype::Font<'static>> {
    let path = std::env::var("EQUINEWATCH_OVERLAY_FONT_PATH").ok()?;
    match std::fs::read(&path) {
        Ok(bytes) => match rusttype::Font::try_from_vec(bytes) {
            Some(font) => Some(font),
            None => {
                warn!("failed to parse font at {path}, overlay labels will be omitted");
                None
            }
        },
        Err(e) => {
            warn!("failed to read overlay font at {path}: {e}, overlay labels will be omitted");
            None
        }
    }
}
