//! Vigil server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil_api::{create_router, metrics, ApiConfig, AppState, Collaborators};
use vigil_db::EventStore;
use vigil_ml_client::{HostedClassifier, MlClientConfig, MlServiceClient};
use vigil_perception::collaborators::LabelClassifier;
use vigil_perception::{FfmpegCamera, FfmpegMicrophone, PerceptionConfig};
use vigil_storage::{uploader_from_env, Uploader};

fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    if let Err(e) = run() {
        error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
    info!("Shutdown complete");
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Wire everything outside the runtime, serve inside it, tear down outside it.
///
/// The blocking HTTP clients must not be created or dropped on a runtime thread.
fn run() -> anyhow::Result<()> {
    info!("Starting vigil");

    let config = ApiConfig::from_env();
    let perception = PerceptionConfig::from_env();
    info!(
        "API config: host={}, port={}, environment={}",
        config.host, config.port, config.environment
    );
    if config.is_production() && config.cors_origins.iter().any(|o| o == "*") {
        warn!("CORS allows any origin in production; set CORS_ORIGINS");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    std::fs::create_dir_all(&perception.capture_dir)
        .with_context(|| format!("failed to create {}", perception.capture_dir.display()))?;
    let store = Arc::new(
        EventStore::open(&perception.face_db_path)
            .with_context(|| format!("failed to open {}", perception.face_db_path.display()))?,
    );

    let camera = FfmpegCamera::open(&perception).context("camera failed to open")?;

    let ml = Arc::new(MlServiceClient::new(MlClientConfig {
        base_url: perception.ml_service_url.clone(),
        audio_model: perception.audio_local_model.clone(),
        ..MlClientConfig::from_env()
    })?);
    let audio_local = ml
        .has_audio_model()
        .then(|| Arc::clone(&ml) as Arc<dyn LabelClassifier>);
    let emotion = hosted(perception.emotion_endpoint())?;
    let audio_remote = hosted(perception.audio_endpoint())?;
    if emotion.is_none() {
        info!("Emotion classifier not configured; emotion worker idle");
    }
    if audio_remote.is_none() && audio_local.is_none() {
        info!("No audio classifier configured; audio worker idle");
    }

    let uploader = uploader_from_env(runtime.handle().clone());
    if uploader.is_enabled() {
        if let Err(e) = uploader.check() {
            warn!("Object storage unreachable, captures will be kept locally until it recovers: {}", e);
        }
    }

    let collaborators = Collaborators {
        camera: Arc::new(camera),
        detector: ml.clone(),
        faces: ml.clone(),
        action: ml.clone(),
        microphone: Arc::new(FfmpegMicrophone::new(&perception)),
        emotion,
        audio_remote,
        audio_local,
        uploader,
    };
    let state = AppState::new(config.clone(), &perception, store, collaborators);

    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Metrics disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    state.start();
    let served = runtime.block_on(serve(&config, state.clone(), metrics_handle));
    state.shutdown();

    drop(state);
    drop(runtime);
    served
}

fn hosted(endpoint: Option<(&str, &str)>) -> anyhow::Result<Option<Arc<dyn LabelClassifier>>> {
    let Some((url, token)) = endpoint else {
        return Ok(None);
    };
    let classifier: Arc<dyn LabelClassifier> = Arc::new(HostedClassifier::new(url, token)?);
    Ok(Some(classifier))
}

async fn serve(
    config: &ApiConfig,
    state: AppState,
    metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    let app = create_router(state.clone(), metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

/// Wait for Ctrl-C, then stop perception so open streams end and the server can drain.
async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");
    if let Err(e) = tokio::task::spawn_blocking(move || state.shutdown()).await {
        error!("Perception shutdown failed: {}", e);
    }
}
