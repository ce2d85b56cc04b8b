use std::sync::Arc;

use billflow_api::{app, config::Config};
use billflow_engine::{BillDispatcher, InMemoryEventStore};

#[tokio::main]
async fn main() {
    billflow_observability::init();

    let config = Config::from_env();

    let store = Arc::new(InMemoryEventStore::new());
    let dispatcher = Arc::new(BillDispatcher::new(store, config.rates));

    // Restart machines for bills the log says are still open.
    if let Err(e) = dispatcher.recover().await {
        tracing::error!(error = %e, "recovery failed; continuing with fresh state");
    }

    let app = app::build_app(dispatcher);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.listen_addr));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
