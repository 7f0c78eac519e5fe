use service::config::Config;
use service::logging::Logger;
use service::store::RedisSessionStore;
use service::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    Logger::init_logger(&config);

    let session_store = RedisSessionStore::connect(&config).await?;
    let sse_manager = Arc::new(sse::Manager::new());
    let app_state = AppState::new(config, Arc::new(session_store), sse_manager);

    web::init(app_state).await?;

    Ok(())
}
