//! Cohere Rerank wire types. The rest of the workspace carries no Cohere integration, so this
//! shape is drawn straight from Cohere's public Rerank API rather than any pack file,
//! keeping this crate's flatten-the-rest idiom for forward compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankRequest {
	pub model: String,
	pub query: String,
	pub documents: Vec<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_n: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_documents: Option<bool>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Document {
	Text(String),
	Structured(Value),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankResponse {
	pub id: String,
	pub results: Vec<RerankResult>,
	pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankResult {
	pub index: u32,
	pub relevance_score: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Meta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub billed_units: Option<Value>,
}
