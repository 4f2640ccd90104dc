//! Generative-language API client.
//!
//! Wraps the `generateContent` and `streamGenerateContent` endpoints with
//! per-call credential resolution and 429 backoff.

mod client;
mod stream;
mod types;

pub use client::*;
pub use stream::*;
pub use types::*;
