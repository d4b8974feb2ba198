//! freebase_rdf: a read-only Freebase MQL client that assembles entities into a
//! lazily interpreted object graph and projects it into RDF triples.
//!
//! This crate is intentionally standalone. It provides:
//! - Batched property fetches (at most 16 properties per MQL request)
//! - An optional persistent response cache with a single-flight guard
//! - Type-schema driven discovery of "every property this entity may have"
//! - Projection of loaded entities into `(subject, predicate, object)` triples
//!
//! The async [`FreebaseClient`] and the synchronous [`BlockingClient`] share one
//! implementation; the blocking variant simply drives the async futures to
//! completion on its own runtime.

#![forbid(unsafe_code)]

pub mod blocking;
pub mod cache;
pub mod client;
pub mod config;
pub mod loaders;
pub mod models;
pub mod query;
pub mod rdf;
pub mod schema;
pub mod transport;

#[cfg(test)]
mod test_support;

use std::error::Error as StdError;

pub type Result<T> = std::result::Result<T, FreebaseError>;

pub use blocking::BlockingClient;
pub use cache::{
    CacheKeying, CacheStore, DynCacheStore, InMemoryCacheStore, ResponseCache, SqliteCacheStore,
};
pub use client::FreebaseClient;
pub use config::{CacheConfig, ClientConfig, DEFAULT_BASE_URL, MAX_BATCH_SIZE};
pub use models::{Object, PropertyMap, Reference, Value};
pub use query::{Batch, Query, WILDCARD, plan_batches};
pub use rdf::{DEFAULT_NAMESPACE, Literal, ProjectionOrder, Term, Triple, Triples, write_ntriples};
pub use transport::{DynTransport, HttpTransport, Transport};

#[derive(thiserror::Error, Debug)]
pub enum FreebaseError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no entity matched: {0}")]
    NotFound(String),

    #[error("could not resolve schema of type {type_id}: {source}")]
    SchemaResolution {
        type_id: String,
        #[source]
        source: Box<FreebaseError>,
    },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl FreebaseError {
    #[tracing::instrument(level = "debug", skip(err))]
    pub fn cache<E: StdError>(err: E) -> Self {
        Self::Cache(err.to_string())
    }

    #[tracing::instrument(level = "debug", skip(message))]
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for FreebaseError {
    fn from(e: reqwest::Error) -> Self {
        FreebaseError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<sqlx::Error> for FreebaseError {
    fn from(e: sqlx::Error) -> Self {
        FreebaseError::cache(e)
    }
}
