use gradebook_backend::{
    config::{get_config, init_config},
    database::{
        pool::{create_pool, run_migrations},
        DocumentStore, MemoryStore, PgStore, SeedData,
    },
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();
    init_config()?;
    let config = get_config();

    let store = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            let store = PgStore::new(pool);
            if let Some(path) = &config.seed_file {
                info!("Seeding PostgreSQL store from {}", path);
                store.seed(SeedData::from_file(path)?).await?;
            }
            info!("Using PostgreSQL document store");
            DocumentStore::Postgres(store)
        }
        None => {
            let store = match &config.seed_file {
                Some(path) => {
                    info!("Seeding in-memory store from {}", path);
                    MemoryStore::from_seed_file(path)?
                }
                None => MemoryStore::new(),
            };
            tracing::warn!("DATABASE_URL not set, using in-memory document store");
            DocumentStore::Memory(store)
        }
    };

    let app_state = AppState::new(store, config);

    let app = routes::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
