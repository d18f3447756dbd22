use crate::relay::RelayCoordinator;
use crate::server::tls::TlsPaths;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::get,
    Router,
    extract::State,
    response::IntoResponse,
    http::{ HeaderValue, StatusCode },
    Json,
};
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    coordinator: Arc<RelayCoordinator>,
}

pub fn router(
    coordinator: Arc<RelayCoordinator>,
    cors_origin: &str
) -> Result<Router, Box<dyn Error + Send + Sync>> {
    let cors = if cors_origin.trim() == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origin = HeaderValue::from_str(cors_origin.trim()).map_err(|e|
            format!("Invalid CORS origin '{}': {}", cors_origin, e)
        )?;
        CorsLayer::new().allow_origin(origin)
    };
    let cors = cors.allow_methods(Any).allow_headers(Any);

    Ok(
        Router::new()
            .route("/api/messages", get(list_messages_handler))
            .layer(cors)
            .with_state(AppState { coordinator })
    )
}

pub async fn start_http_server(
    http_port: u16,
    coordinator: Arc<RelayCoordinator>,
    cors_origin: &str,
    tls: Option<TlsPaths>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    let app = router(coordinator, cors_origin)?;

    if let Some(paths) = tls {
        info!("Starting HTTPS API server on: https://{}", addr);
        let tls_config = axum_server::tls_rustls::RustlsConfig
            ::from_pem_file(&paths.cert_path, &paths.key_path).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });
    } else {
        info!("Starting HTTP API server on: http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e|
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
        )?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    Ok(())
}

async fn list_messages_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.list_messages().await {
        Ok(messages) => (StatusCode::OK, Json(messages)).into_response(),
        Err(e) => {
            error!("Failed to list messages: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: e.to_string() }),
            ).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::{ ChatClient, CompletionResponse };
    use crate::models::chat::{ Author, Message };
    use crate::store::memory::MemoryMessageStore;
    use crate::store::{ MessageStore, StoreError };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{ Duration, TimeZone, Utc };
    use tower::ServiceExt;

    struct Unused;

    #[async_trait]
    impl ChatClient for Unused {
        async fn complete(
            &self,
            _prompt: &str
        ) -> Result<CompletionResponse, Box<dyn Error + Send + Sync>> {
            Err("not used".into())
        }

        fn get_model(&self) -> String {
            String::new()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    struct DownStore;

    #[async_trait]
    impl MessageStore for DownStore {
        async fn insert(&self, _message: Message) -> Result<Message, StoreError> {
            Err(StoreError::Unavailable("db offline".into()))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::Unavailable("db offline".into()))
        }

        async fn list_all(&self) -> Result<Vec<Message>, StoreError> {
            Err(StoreError::Unavailable("db offline".into()))
        }
    }

    fn get_messages() -> Request<Body> {
        Request::builder().uri("/api/messages").body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn lists_all_messages_oldest_first() {
        let store = Arc::new(MemoryMessageStore::new());
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        store.insert(Message::with_timestamp(Author::Ai, "later", base + Duration::seconds(5))).await.unwrap();
        store.insert(Message::with_timestamp(Author::User, "earlier", base)).await.unwrap();
        let coordinator = Arc::new(RelayCoordinator::new(store, Arc::new(Unused), 50));
        let app = router(coordinator, "http://localhost:3000").unwrap();

        let response = app.oneshot(get_messages()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["text"], "earlier");
        assert_eq!(json[0]["user"], "User");
        assert_eq!(json[1]["text"], "later");
        assert_eq!(json[1]["user"], "AI");
    }

    #[tokio::test]
    async fn listing_is_not_capped_by_history_limit() {
        let store = Arc::new(MemoryMessageStore::new());
        for i in 0..120 {
            store.insert(Message::new(Author::User, i.to_string())).await.unwrap();
        }
        let coordinator = Arc::new(RelayCoordinator::new(store, Arc::new(Unused), 50));
        let app = router(coordinator, "*").unwrap();

        let response = app.oneshot(get_messages()).await.unwrap();

        assert_eq!(body_json(response).await.as_array().unwrap().len(), 120);
    }

    #[tokio::test]
    async fn store_failure_is_a_500_with_the_error_text() {
        let coordinator = Arc::new(RelayCoordinator::new(Arc::new(DownStore), Arc::new(Unused), 50));
        let app = router(coordinator, "*").unwrap();

        let response = app.oneshot(get_messages()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "store unavailable: db offline");
    }

    #[tokio::test]
    async fn cors_allows_the_configured_origin() {
        let coordinator = Arc::new(
            RelayCoordinator::new(Arc::new(MemoryMessageStore::new()), Arc::new(Unused), 50)
        );
        let app = router(coordinator, "http://localhost:3000").unwrap();
        let request = Request::builder()
            .uri("/api/messages")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn rejects_an_invalid_origin() {
        let coordinator = Arc::new(
            RelayCoordinator::new(Arc::new(MemoryMessageStore::new()), Arc::new(Unused), 50)
        );
        assert!(router(coordinator, "bad\norigin").is_err());
    }
}
