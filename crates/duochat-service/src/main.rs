//! Presence runner entry point
//!
//! Run with:
//! ```bash
//! DUOCHAT_SELF_ID=<uuid> DUOCHAT_PEER_ID=<uuid> cargo run -p duochat-service
//! ```
//!
//! Keeps the local user's heartbeat going and, when a peer is given, logs
//! every change of the peer's presence label. Uses Redis when `REDIS_URL`
//! is set, the in-process backend otherwise.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use duochat_cache::{MemoryBackend, RedisBackend};
use duochat_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use duochat_core::{LivenessBackend, UserId};
use duochat_service::{LiveSession, PresenceWatch, SessionContext};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Presence runner failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        online_window_secs = config.presence.online_window.as_secs(),
        redis = config.redis.is_some(),
        "Configuration loaded"
    );

    let self_id = user_from_env("DUOCHAT_SELF_ID")?;
    let peer_id = user_from_env("DUOCHAT_PEER_ID")?;

    match &config.redis {
        Some(redis) => {
            let backend = RedisBackend::connect(redis, &config.typing)
                .await
                .context("Failed to connect to Redis")?;
            serve(Arc::new(backend), &config, self_id, peer_id).await
        }
        None => {
            info!("REDIS_URL not set, using the in-process backend");
            serve(Arc::new(MemoryBackend::new()), &config, self_id, peer_id).await
        }
    }
}

async fn serve<B>(
    backend: Arc<B>,
    config: &AppConfig,
    self_id: Option<UserId>,
    peer_id: Option<UserId>,
) -> anyhow::Result<()>
where
    B: LivenessBackend + 'static,
{
    let mut builder = SessionContext::builder(backend).app_config(config);
    if let Some(id) = self_id {
        builder = builder.self_id(id);
    }
    let session = LiveSession::start(builder.build());

    let mut watch = peer_id.map(|peer| session.watch_presence(peer));

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                info!("Shutdown signal received");
                break;
            }
            open = changed(watch.as_mut()) => {
                if !open {
                    break;
                }
                if let Some(watch) = &watch {
                    let view = watch.current();
                    info!(
                        peer_id = %watch.subject_id(),
                        liveness = %view.liveness,
                        label = %view.label,
                        "Peer presence changed"
                    );
                }
            }
        }
    }

    if let Some(watch) = watch.as_mut() {
        watch.stop().await;
    }
    session.end().await;

    Ok(())
}

async fn changed(watch: Option<&mut PresenceWatch>) -> bool {
    match watch {
        Some(watch) => watch.changed().await,
        None => std::future::pending().await,
    }
}

fn user_from_env(name: &str) -> anyhow::Result<Option<UserId>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => UserId::parse(raw.trim())
            .map(Some)
            .with_context(|| format!("{name} is not a valid user id")),
        _ => Ok(None),
    }
}
