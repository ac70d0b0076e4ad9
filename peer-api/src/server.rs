use std::future::Future;

use tokio::net::TcpListener;

use peer_common::store::PgStore;

use crate::config::Config;
use crate::router;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = PgStore::new(&config.database_url, config.max_pg_connections)
        .expect("failed to create postgres store");

    if config.run_migrations {
        store.run_migrations().await.expect("failed to run migrations");
    }

    let app = router::router(store, config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
