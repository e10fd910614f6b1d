use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use opsgraph_common::Config;
use opsgraph_graph::{GraphStore, InMemoryGraphStore, PgGraphStore};
use opsgraph_server::{build_router, AppState};

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = Config::from_env()?;

    let store: Arc<dyn GraphStore> = match &config.database_url {
        Some(url) => {
            let store = PgGraphStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("Connected to Postgres graph store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory graph store; data is lost on restart");
            Arc::new(InMemoryGraphStore::new())
        }
    };

    let mut llm = OpenAi::new(&config.openai_api_key, &config.openai_model)
        .with_max_tokens(config.openai_max_tokens);
    if let Some(base_url) = &config.openai_base_url {
        llm = llm.with_base_url(base_url);
    }
    info!(model = %config.openai_model, "Extraction model configured");

    let state = Arc::new(AppState::new(store, Arc::new(llm)));
    let app = build_router(state);

    let addr = config.bind_addr();
    info!("opsgraph server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
