//! Endpoint handlers: one per client-facing API shape. Each owns body parsing (model
//! extraction, streaming detection, any required body mutation) and translator
//! selection for that endpoint, split into one type per endpoint so the router/upstream
//! filters can hold a `Box<dyn EndpointHandler>` without a central match.

pub mod chat_completions;
pub mod completions;
pub mod embeddings;
pub mod image_generation;
pub mod messages;
pub mod realtime_client_secrets;
pub mod rerank;
pub mod responses;

use std::sync::Arc;

use bytes::Bytes;

use crate::config::Backend;
use crate::error::{ParseError, TranslationError};
use crate::translators::Translator;

/// Backend schema identifiers, matching `Backend.schema.name` in `RuntimeConfig`.
pub mod schema {
	pub const OPENAI: &str = "openai";
	pub const AZURE_OPENAI: &str = "azure-openai";
	pub const ANTHROPIC: &str = "anthropic";
	pub const BEDROCK_CONVERSE: &str = "bedrock-converse";
	pub const BEDROCK_INVOKE: &str = "bedrock-invoke";
	pub const VERTEX_GEMINI: &str = "vertex-gemini";
	pub const GCP_ANTHROPIC: &str = "gcp-anthropic";
	pub const COHERE: &str = "cohere";
}

/// Outcome of parsing a client request body.
pub struct ParsedBody {
	pub model_name: String,
	pub is_streaming: bool,
	/// Set when `parse_body` rewrote the raw bytes (e.g. forcing
	/// `stream_options.include_usage=true`); retries must replay this mutated body, not
	/// the client's original bytes, so the caller stores it back into the original-body
	/// slot rather than treating it as a one-off.
	pub mutated_body: Option<Bytes>,
}

/// Per-endpoint capability: parse the client body, then hand back a translator for a
/// chosen backend schema.
pub trait EndpointHandler: Send + Sync {
	fn parse_body(&self, raw: &[u8]) -> Result<ParsedBody, ParseError>;

	fn translator(&self, backend_schema: &str, model_name_override: Option<&str>) -> Result<Box<dyn Translator>, TranslationError>;
}

fn unsupported(endpoint: &str, backend_schema: &str) -> TranslationError {
	TranslationError::UnsupportedSchema {
		endpoint: endpoint.to_string(),
		schema: backend_schema.to_string(),
	}
}

/// Resolves the client-facing `:path` the router filter observes into the handler for
/// that endpoint. `None` means the path isn't one of the endpoints this gateway serves;
/// the router filter turns that into a fast `ParseError`-shaped failure before ever
/// touching the body.
pub fn handler_for_path(path: &str) -> Option<Arc<dyn EndpointHandler>> {
	// Strip a query string; only `realtime/client_secrets` doesn't carry one today, but
	// being defensive here costs nothing.
	let path = path.split('?').next().unwrap_or(path);
	match path {
		"/v1/chat/completions" => Some(Arc::new(chat_completions::ChatCompletions)),
		"/v1/completions" => Some(Arc::new(completions::Completions)),
		"/v1/embeddings" => Some(Arc::new(embeddings::Embeddings)),
		"/v1/images/generations" => Some(Arc::new(image_generation::ImageGeneration)),
		"/v1/messages" => Some(Arc::new(messages::Messages)),
		"/v1/rerank" => Some(Arc::new(rerank::Rerank)),
		"/v1/responses" => Some(Arc::new(responses::Responses)),
		"/v1/realtime/client_secrets" => Some(Arc::new(realtime_client_secrets::RealtimeClientSecrets)),
		_ => None,
	}
}

/// Derives the upstream `:path` and `:authority`/host for a backend, given the resolved
/// model name and whether this attempt is streaming. One path/host pair per schema;
/// `host_override` always wins over the derived host, but never replaces the path.
pub fn upstream_path_and_host(backend: &Backend, model: &str, streaming: bool) -> (String, Option<String>) {
	let (path, derived_host) = match backend.schema.name.as_str() {
		schema::BEDROCK_CONVERSE => {
			let region = aws_region(backend);
			let suffix = if streaming { "converse-stream" } else { "converse" };
			(format!("/model/{model}/{suffix}"), Some(format!("bedrock-runtime.{region}.amazonaws.com")))
		},
		schema::BEDROCK_INVOKE => {
			let region = aws_region(backend);
			let suffix = if streaming { "invoke-with-response-stream" } else { "invoke" };
			(format!("/model/{model}/{suffix}"), Some(format!("bedrock-runtime.{region}.amazonaws.com")))
		},
		schema::VERTEX_GEMINI => {
			let (project, location) = gcp_project_location(backend);
			let suffix = if streaming {
				"streamGenerateContent?alt=sse"
			} else {
				"generateContent"
			};
			(
				format!("/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:{suffix}"),
				Some(format!("{location}-aiplatform.googleapis.com")),
			)
		},
		schema::GCP_ANTHROPIC => {
			let (project, location) = gcp_project_location(backend);
			let suffix = if streaming { "streamRawPredict" } else { "rawPredict" };
			(
				format!("/v1/projects/{project}/locations/{location}/publishers/anthropic/models/{model}:{suffix}"),
				Some(format!("{location}-aiplatform.googleapis.com")),
			)
		},
		schema::ANTHROPIC => ("/v1/messages".to_string(), None),
		schema::COHERE => ("/v1/rerank".to_string(), None),
		// openai, azure-openai, and anything unrecognized fall back to the
		// chat/completions path; Azure's deployment/api-version shaping happens in the
		// router's header mutation, not here, since it needs the configured deployment
		// name rather than anything derivable from the model string alone.
		_ => ("/v1/chat/completions".to_string(), None),
	};
	let host = backend.host_override.clone().or(derived_host);
	(path, host)
}

fn aws_region(backend: &Backend) -> String {
	match &backend.auth {
		Some(crate::config::BackendAuth::AwsCredentials { region, .. }) => region.clone(),
		_ => "us-east-1".to_string(),
	}
}

fn gcp_project_location(backend: &Backend) -> (String, String) {
	let project = backend.gcp_project_id.clone().unwrap_or_default();
	(project, "us-central1".to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{BackendAuth, SchemaRef};

	fn backend(schema_name: &str) -> Backend {
		Backend {
			name: "b".to_string(),
			schema: SchemaRef {
				name: schema_name.to_string(),
				version: "v1".to_string(),
			},
			model_name_override: None,
			header_mutation: None,
			auth: None,
			host_override: None,
			gcp_project_id: None,
		}
	}

	#[test]
	fn bedrock_converse_path_uses_region_from_auth() {
		let mut b = backend(schema::BEDROCK_CONVERSE);
		b.auth = Some(BackendAuth::AwsCredentials {
			region: "eu-west-1".to_string(),
			secret: None,
			profile: None,
		});
		let (path, host) = upstream_path_and_host(&b, "claude-3", true);
		assert_eq!(path, "/model/claude-3/converse-stream");
		assert_eq!(host.as_deref(), Some("bedrock-runtime.eu-west-1.amazonaws.com"));
	}

	#[test]
	fn host_override_wins_but_path_stays_schema_specific() {
		let mut b = backend(schema::BEDROCK_CONVERSE);
		b.host_override = Some("bedrock.internal.example.com".to_string());
		let (path, host) = upstream_path_and_host(&b, "claude-3", false);
		assert_eq!(path, "/model/claude-3/converse");
		assert_eq!(host.as_deref(), Some("bedrock.internal.example.com"));
	}

	#[test]
	fn gcp_anthropic_path_includes_project_and_model() {
		let mut b = backend(schema::GCP_ANTHROPIC);
		b.gcp_project_id = Some("my-proj".to_string());
		let (path, _) = upstream_path_and_host(&b, "claude-3-sonnet-20240229", false);
		assert_eq!(path, "/v1/projects/my-proj/locations/us-central1/publishers/anthropic/models/claude-3-sonnet-20240229:rawPredict");
	}

	#[test]
	fn handler_for_path_resolves_known_endpoints_and_ignores_query_strings() {
		assert!(handler_for_path("/v1/chat/completions?foo=bar").is_some());
		assert!(handler_for_path("/v1/rerank").is_some());
		assert!(handler_for_path("/v1/not-a-real-endpoint").is_none());
	}
}
