//! OAuth 2.1 authorization server binary.
//!
//! Loads configuration and static clients, starts the HTTP server and the
//! expired-entry sweeper, and shuts both down gracefully on SIGINT/SIGTERM.

use anyhow::Result;
use oauth21::{
    config::{Config, SigningKeySource},
    errors::ConfigError,
    http::{AppState, build_router},
    oauth::{
        IssuerBundle, JsonWebTokenSigner, MemoryRegistrationAuthority,
        RandomCodeAuthorizationAuthority, Rfc9068AccessTokenIssuer, TokenSigner, generate_token,
    },
    storage::{DataStore, MemoryDataStore},
};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "oauth21=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = oauth21::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    tracing::info!(?version, "Starting oauth21");

    let config = Config::new()?;

    let registry = match &config.clients_file {
        Some(path) => {
            let registry =
                MemoryRegistrationAuthority::load_file(path, &config.client_defaults()).await?;
            tracing::info!(clients = registry.len(), path = %path.display(), "Loaded clients");
            registry
        }
        None => {
            tracing::warn!("OAUTH_CLIENTS_FILE not set, no clients are registered");
            MemoryRegistrationAuthority::new()
        }
    };

    let signer = load_signer(&config).await?;
    let store: Arc<dyn DataStore> = Arc::new(MemoryDataStore::new());
    let issuers = IssuerBundle::new(
        Arc::new(RandomCodeAuthorizationAuthority::new(store.clone())),
        Arc::new(Rfc9068AccessTokenIssuer::new(
            config.external_base.issuer(),
            signer,
        )),
    );

    let app_context = AppState::new(Arc::new(config.clone()), Arc::new(registry), issuers);

    // Build the router
    let app = build_router(app_context);

    // Setup graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to install signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    // Sweep expired codes and refresh tokens
    {
        let interval = *config.store_cleanup_interval.as_ref();
        let inner_token = token.clone();
        let store = store.clone();
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = inner_token.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.cleanup_expired().await {
                            Ok(0) => {}
                            Ok(removed) => tracing::debug!(removed, "expired store entries removed"),
                            Err(err) => tracing::error!("store cleanup failed: {}", err),
                        }
                    }
                }
            }
            tracing::info!("store sweeper stopped");
        });
    }

    // Start HTTP server
    {
        let http_port = *config.http_port.as_ref();
        let inner_token = token.clone();
        tracker.spawn(async move {
            let bind_address = format!("0.0.0.0:{http_port}");
            tracing::info!("Starting server on {bind_address}");
            let listener = match TcpListener::bind(&bind_address).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind {bind_address}: {}", err);
                    inner_token.cancel();
                    return;
                }
            };

            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        () = shutdown_token.cancelled() => { }
                    }
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}

async fn load_signer(config: &Config) -> Result<Arc<dyn TokenSigner>> {
    let key_id = Some(config.signing_key_id.clone());
    let signer = match &config.signing_key {
        SigningKeySource::PemFile(path) => {
            let pem = tokio::fs::read(path).await.map_err(|e| {
                ConfigError::SigningKeyUnreadable(path.display().to_string(), e.to_string())
            })?;
            let signer = JsonWebTokenSigner::from_pem(&pem, key_id)?;
            tracing::info!(algorithm = ?signer.algorithm(), "Loaded signing key");
            signer
        }
        SigningKeySource::Secret(secret) => JsonWebTokenSigner::hs256(secret.as_bytes(), key_id),
        SigningKeySource::Ephemeral => {
            tracing::warn!(
                "no signing key configured, access tokens are signed with a random secret"
            );
            JsonWebTokenSigner::hs256(generate_token().as_bytes(), key_id)
        }
    };
    Ok(Arc::new(signer))
}
