use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Message Store Args ---
    /// Message store type (redis, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "redis")]
    pub store_type: String,

    /// Message store endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub store_host: String,

    /// Prefix for Redis message keys.
    #[arg(long, env = "STORE_REDIS_PREFIX", default_value = "chat:")]
    pub store_redis_prefix: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider answering chat messages (gemini, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-2.0-flash, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Server Args ---
    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:5001")]
    pub server_addr: String,

    /// Port for the HTTP API (GET /api/messages).
    #[arg(long, env = "PORT", default_value = "5000")]
    pub http_port: u16,

    /// Origin allowed to call the HTTP API from a browser. "*" allows any.
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Number of recent messages sent to a client when it connects.
    #[arg(long, env = "HISTORY_LIMIT", default_value = "50")]
    pub history_limit: usize,

    /// Per-connection cap on sendMessage events per second. 0 disables the cap.
    #[arg(long, env = "MAX_MESSAGES_PER_SECOND", default_value = "0")]
    pub max_messages_per_second: u32,

    /// Global cap on accepted WebSocket connections per second. 0 disables the cap.
    #[arg(long, env = "MAX_CONNECTIONS_PER_SECOND", default_value = "10")]
    pub max_connections_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS/HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS/HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_local_setup() {
        let args = Args::try_parse_from(["gemini-relay"]).unwrap();
        assert_eq!(args.store_type, "redis");
        assert_eq!(args.chat_llm_type, "gemini");
        assert_eq!(args.history_limit, 50);
        assert_eq!(args.cors_origin, "http://localhost:3000");
        assert_eq!(args.max_messages_per_second, 0);
        assert!(!args.enable_tls);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "gemini-relay",
            "--store-type",
            "memory",
            "--history-limit",
            "10",
            "--http-port",
            "8080",
        ]).unwrap();
        assert_eq!(args.store_type, "memory");
        assert_eq!(args.history_limit, 10);
        assert_eq!(args.http_port, 8080);
    }
}
