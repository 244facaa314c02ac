//! Default values for configuration

/// Default LLM endpoint (Ollama-compatible API)
pub fn default_llm_endpoint() -> String {
    std::env::var("FACTMILL_LLM_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string())
}

/// Default completion model
pub fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}

/// Default sampling temperature (rewriting and extraction want determinism)
pub fn default_llm_temperature() -> f32 {
    0.2
}

/// Default completion token budget
pub fn default_llm_max_tokens() -> u32 {
    2048
}

/// Default LLM request timeout in seconds
pub fn default_llm_timeout_secs() -> u64 {
    300
}

/// Default embedding provider ("primary" = remote backend, "local" = fastembed)
pub fn default_embedding_provider() -> String {
    "primary".to_string()
}

/// Default remote embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("FACTMILL_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (must match model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for remote embedding calls
pub fn default_embedding_batch_size() -> usize {
    100
}

/// Default embedding backend request timeout in seconds
pub fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Default staleness threshold for non-terminal status rows, in seconds
pub fn default_staleness_secs() -> u64 {
    120
}

/// Default client-side status polling interval in seconds
pub fn default_status_poll_secs() -> u64 {
    3
}
