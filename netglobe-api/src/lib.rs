//! # netglobe API Services
//!
//! Push channel for viewers plus operational endpoints.
//!
//! Every `/ws` connection is registered with the shared
//! [`SubscriberRegistry`](netglobe_core::subscribers::SubscriberRegistry)
//! and stays registered until its read loop ends or a send to it fails.

pub mod rest;
pub mod transport;
pub mod ws;

pub use rest::{bind, router, serve, AppState};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
