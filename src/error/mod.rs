use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed for {key}: {message}")]
    Serialization { key: String, message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Generative-language API errors.
///
/// Covers configuration (missing credential), transport (HTTP status) and
/// protocol (error payload, empty body) failures of a single remote call.
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("No API credential configured")]
    MissingCredential,

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("API reported error: {message}")]
    Protocol { message: String },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by a generation provider.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Remote call failed: {0}")]
    Remote(#[from] GeminiError),

    #[error("Malformed JSON in response: {message}")]
    Parse { message: String },

    #[error("Response shape mismatch: {message}")]
    Shape { message: String },
}

/// Tree invariant violations rejected by the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Node already exists: {node_id}")]
    DuplicateNode { node_id: String },

    #[error("Node not found: {node_id}")]
    UnknownNode { node_id: String },

    #[error("Edge would connect {node_id} to itself")]
    SelfLoop { node_id: String },

    #[error("Node {node_id} already has parent {parent_id}")]
    MultipleParents { node_id: String, parent_id: String },

    #[error("Edge {source_id} -> {target_id} would create a cycle")]
    Cycle { source_id: String, target_id: String },

    #[error("No active session")]
    NoSession,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Gemini API calls
pub type GeminiResult<T> = Result<T, GeminiError>;

/// Result type alias for generation providers
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type alias for store mutations
pub type StoreResult<T> = Result<T, StoreError>;
