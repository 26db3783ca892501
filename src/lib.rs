//! AI gateway data-plane processor: an external processing (`ext_proc`) service that
//! sits in front of an HTTP proxy, translating OpenAI-shaped client traffic into
//! whichever upstream LLM provider a request gets routed to.

pub mod auth;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod framing;
pub mod grpc;
pub mod metrics;
pub mod processor;
pub mod router;
pub mod telemetry;
pub mod translators;
pub mod types;
