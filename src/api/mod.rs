//! HTTP and WebSocket gateway
//!
//! Players connect over `/ws`; read-only state is served over plain HTTP.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{create_app, init_tracing, ApiServer, App};
