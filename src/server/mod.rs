pub mod api;
pub mod tls;
pub mod websocket;

use crate::cli::Args;
use crate::relay::RelayCoordinator;
use self::websocket::WsLimits;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    coordinator: Arc<RelayCoordinator>,
    args: Args,
}

impl Server {
    pub fn new(coordinator: Arc<RelayCoordinator>, args: Args) -> Self {
        Self { coordinator, args }
    }

    /// Starts the HTTP API in the background, then runs the WebSocket accept
    /// loop on the current task.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls = tls::tls_paths(&self.args)?;

        api::start_http_server(
            self.args.http_port,
            self.coordinator.clone(),
            &self.args.cors_origin,
            tls.clone(),
        ).await?;

        websocket::start_ws_server(
            &self.args.server_addr,
            self.coordinator.clone(),
            tls,
            WsLimits {
                max_connections_per_second: self.args.max_connections_per_second,
                max_messages_per_second: self.args.max_messages_per_second,
            },
        ).await
    }
}
