//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (peer address via ConnectInfo)
//!     → server.rs (Axum setup, middleware, read/write handlers)
//!     → request.rs (request ID, relay context)
//!     → [allowlist check, writes only]
//!     → [upstream dispatcher]
//!     → response.rs (relay status/headers/body, or 403/413/503)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RelayContext, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
