use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use todo_api::auth::{KeySetCache, TokenVerifier};
use todo_api::authorizer::RemoteAuthorizer;
use todo_api::config::Config;
use todo_api::directory::RemoteDirectory;
use todo_api::state::AppState;
use todo_api::store::Store;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up the upstream addresses and keys
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    let filter = match EnvFilter::try_new(&config.log_level) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("invalid log level {:?}: {}", config.log_level, err);
            std::process::exit(1);
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(config).await {
        tracing::error!(error = %format!("{err:#}"), "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        authorizer = %config.authorizer.address,
        directory = %config.directory.address,
        jwks = %config.oidc.jwks_url,
        "starting todo service"
    );

    let store = Store::connect(&config.database_path)
        .await
        .context("failed to initialize store")?;

    let timeout = config.upstream_timeout();

    let authorizer = RemoteAuthorizer::new(
        &config.authorizer,
        &config.policy,
        config.authorizer.http_client(timeout)?,
    )
    .context("failed to create authorizer client")?;

    let directory = RemoteDirectory::new(&config.directory, config.directory.http_client(timeout)?)
        .context("failed to create directory client")?;

    let keyset_http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build key-set HTTP client")?;
    let keyset = Arc::new(KeySetCache::new(
        config.oidc.jwks_url.clone(),
        config.keyset_ttl(),
        keyset_http,
    ));
    let verifier = Arc::new(TokenVerifier::new(keyset, config.oidc.audience.clone()));

    let listen_addr = config.listen_addr.clone();
    let grace = config.shutdown_grace();

    let state = AppState {
        config: Arc::new(config),
        verifier,
        authorizer: Arc::new(authorizer),
        directory: Arc::new(directory),
        store,
    };

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, todo_api::app(state))
        .with_graceful_shutdown(shutdown_signal(grace))
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves when a shutdown signal arrives. In-flight requests then get the
/// grace period to finish before the process is forced down.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::warn!("shutdown grace period expired, forcing exit");
        std::process::exit(0);
    });
}
