use rangebook::api::{self, AppState};
use rangebook::chain::HttpChainSource;
use rangebook::orchestration::{LedgerRebuilder, RefreshCoordinator};
use rangebook::orders::OrderMonitor;
use rangebook::signing::{IntentStore, MockIntentStore, MockSigner, Signer};
use rangebook::{init_db, Config, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies. All process-wide services are
    // constructed here and injected; nothing is a module-level singleton.
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let chain = Arc::new(HttpChainSource::new(
        config.chain_query_url.clone(),
        Duration::from_millis(config.attempt_timeout_ms),
    ));
    // The signer and intent store are external collaborators; until a real
    // adapter is wired in deployments run with the in-process stand-ins.
    let signer: Arc<dyn Signer> = Arc::new(MockSigner::new());
    let intents: Arc<dyn IntentStore> = Arc::new(MockIntentStore::new());

    let refresh = Arc::new(RefreshCoordinator::new(
        repo.clone(),
        chain.clone(),
        config.refresh_cooldown_ms,
    ));
    let rebuilder = Arc::new(LedgerRebuilder::new(repo.clone(), chain.clone()));
    let monitor = Arc::new(OrderMonitor::new(
        repo.clone(),
        chain.clone(),
        chain.clone(),
        signer,
        intents,
        config.retry_ceiling,
        config.retry_backoff_ms,
        Duration::from_millis(config.attempt_timeout_ms),
    ));

    // Close-order poll loop runs beside the API server.
    tokio::spawn(
        monitor
            .clone()
            .run(Duration::from_millis(config.poll_interval_ms)),
    );

    // Create router
    let app = api::create_router(AppState {
        repo,
        refresh,
        rebuilder,
        monitor,
    });

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
