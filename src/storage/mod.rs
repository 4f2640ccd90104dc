//! Local persistent storage.
//!
//! The core only needs a "get/set a named value" capability. This module
//! defines it as the [`KeyValueStore`] trait, provides a SQLite-backed
//! implementation, and wraps the three record kinds the core reads and
//! writes:
//! - `session_<id>`: the [`Session`] entity
//! - `canvas_<id>`: the serialized tree/UI snapshot
//! - `api_key`: the generative-language API credential

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::atlas::Session;
use crate::error::{StorageError, StorageResult};

/// Storage key holding the API credential.
pub const API_KEY_KEY: &str = "api_key";

/// Key of a session record.
pub fn session_key(session_id: &str) -> String {
    format!("session_{}", session_id)
}

/// Key of a canvas snapshot record.
pub fn canvas_key(session_id: &str) -> String {
    format!("canvas_{}", session_id)
}

/// Named JSON values in durable storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;
    /// Insert or replace a value.
    async fn set(&self, key: &str, value: &serde_json::Value) -> StorageResult<()>;
    /// Delete a value; missing keys are not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Serialize and store a typed record.
pub async fn save_json<S, T>(storage: &S, key: &str, value: &T) -> StorageResult<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + Sync,
{
    let json = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    storage.set(key, &json).await
}

/// Read and deserialize a typed record.
pub async fn load_json<S, T>(storage: &S, key: &str) -> StorageResult<Option<T>>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    match storage.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Read the session record for `session_id`.
pub async fn load_session<S>(storage: &S, session_id: &str) -> StorageResult<Option<Session>>
where
    S: KeyValueStore + ?Sized,
{
    load_json(storage, &session_key(session_id)).await
}

/// Write the session record under its own id.
pub async fn save_session<S>(storage: &S, session: &Session) -> StorageResult<()>
where
    S: KeyValueStore + ?Sized,
{
    save_json(storage, &session_key(&session.session_id), session).await
}

/// Read the stored API credential.
pub async fn load_api_key<S>(storage: &S) -> StorageResult<Option<String>>
where
    S: KeyValueStore + ?Sized,
{
    Ok(storage
        .get(API_KEY_KEY)
        .await?
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|k| !k.trim().is_empty()))
}

/// Save the API credential.
pub async fn store_api_key<S>(storage: &S, key: &str) -> StorageResult<()>
where
    S: KeyValueStore + ?Sized,
{
    storage
        .set(API_KEY_KEY, &serde_json::Value::String(key.to_string()))
        .await
}
