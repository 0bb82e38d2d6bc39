//! The abstract model-capability boundary: a `ChatComplete` trait, an
//! HTTP-backed implementation with SSE streaming and retry/backoff, and a
//! scripted test double.

pub mod client;
pub mod http;
pub mod noop;

pub use client::ChatComplete;
pub use http::HttpChatClient;
pub use noop::NoopChatClient;
