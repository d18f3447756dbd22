pub mod cli;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod store;

use cli::Args;
use llm::LlmConfig;
use llm::chat::new_client as new_chat_client;
use log::info;
use relay::RelayCoordinator;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("WebSocket Address: {}", args.server_addr);
    info!("HTTP Port: {}", args.http_port);
    info!("CORS Origin: {}", args.cors_origin);
    info!("Store Type: {}", args.store_type);
    info!("Store Host: {}", args.store_host);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("History Limit: {}", args.history_limit);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let store = store::initialize_message_store(&args).await?;

    let chat_config = LlmConfig::from_parts(
        &args.chat_llm_type,
        &args.chat_api_key,
        args.chat_model.clone(),
        args.chat_base_url.clone(),
    )?;
    let chat_client = new_chat_client(&chat_config)?;
    info!(
        "Chat client configured: Type={}, Model={}, BaseURL={:?}",
        chat_config.llm_type,
        chat_client.get_model(),
        chat_client.get_base_url().as_deref().unwrap_or("adapter default")
    );

    let coordinator = Arc::new(RelayCoordinator::new(store, chat_client, args.history_limit));
    let server = Server::new(coordinator, args);
    server.run().await?;

    Ok(())
}
