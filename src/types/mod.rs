//! Wire types for each client-facing endpoint schema and each backend schema.
//!
//! Every request/response struct follows the `llm::types::*` idiom: fields a
//! translator actually reads or rewrites are named and typed, everything else is
//! captured by a `#[serde(flatten)] rest: serde_json::Value` bucket so round-tripping an
//! unfamiliar field never loses it.

pub mod anthropic;
pub mod bedrock;
pub mod cohere;
pub mod gemini;
pub mod openai;

/// A minimal, schema-independent view of one chat message, used when a translator needs
/// to walk all messages regardless of which wire shape they arrived in (e.g. to extract
/// a system prompt). Mirrors `SimpleChatCompletionMessage`.
#[derive(Debug, Clone)]
pub struct SimpleMessage {
	pub role: String,
	pub content: String,
}
