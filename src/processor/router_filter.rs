//! The client-facing phase handler: parses the body, extracts the model name, stamps
//! the headers the upstream filter and the router need, and publishes the request's
//! shared state for the upstream filter to pick up.

use bytes::{Bytes, BytesMut};
use tracing::{info_span, warn};
use uuid::Uuid;

use super::state::{RequestRegistry, SharedRequestState, MODEL_HEADER, ORIGINAL_PATH_HEADER, REQUEST_ID_HEADER};
use super::{header_str, BodyMutation, HeaderMutation, Phase, PhaseResponse, StreamPhase};
use crate::endpoints::{self, EndpointHandler};
use crate::error::ProcessorError;
use crate::metrics::{MetricsSink, RequestMetrics};

pub struct RouterFilter {
	registry: RequestRegistry,
	phase: StreamPhase,
	request_id: String,
	original_path: Option<String>,
	endpoint_handler: Option<std::sync::Arc<dyn EndpointHandler>>,
	body_buffer: BytesMut,
}

impl RouterFilter {
	pub fn new(registry: RequestRegistry) -> Self {
		Self {
			registry,
			phase: StreamPhase::default(),
			request_id: Uuid::new_v4().to_string(),
			original_path: None,
			endpoint_handler: None,
			body_buffer: BytesMut::new(),
		}
	}

	pub fn handle(&mut self, phase: Phase) -> Result<PhaseResponse, ProcessorError> {
		self.phase = self.phase.advance(&phase, true)?;
		match phase {
			Phase::RequestHeaders { headers, .. } => self.on_request_headers(&headers),
			Phase::RequestBody { body, end_of_stream } => self.on_request_body(body, end_of_stream),
			// Only reached when no upstream filter ever attached (e.g. the route never
			// matched); the proxy's own error response passes straight through.
			Phase::ResponseHeaders { .. } | Phase::ResponseBody { .. } => Ok(PhaseResponse::unmodified()),
		}
	}

	fn on_request_headers(&mut self, headers: &[super::Header]) -> Result<PhaseResponse, ProcessorError> {
		let path = header_str(headers, ":path").unwrap_or("").to_string();
		self.original_path = Some(path.clone());
		self.endpoint_handler = endpoints::handler_for_path(&path);
		if self.endpoint_handler.is_none() {
			warn!(path, "no endpoint handler for path");
		}
		Ok(PhaseResponse::unmodified())
	}

	fn on_request_body(&mut self, body: Bytes, end_of_stream: bool) -> Result<PhaseResponse, ProcessorError> {
		self.body_buffer.extend_from_slice(&body);
		if !end_of_stream {
			return Ok(PhaseResponse::unmodified());
		}
		let handler = self
			.endpoint_handler
			.clone()
			.ok_or(ProcessorError::ProtocolViolation("request body completed with no endpoint handler resolved"))?;
		let raw = self.body_buffer.split().freeze();
		let parsed = handler.parse_body(&raw)?;
		let final_body = parsed.mutated_body.clone().unwrap_or_else(|| raw.clone());

		let mut metrics = RequestMetrics::default();
		metrics.start_request();
		metrics.set_model(&parsed.model_name);
		metrics.set_original_model(&parsed.model_name);

		let span = info_span!("aigw_request", request_id = %self.request_id, model = %parsed.model_name);

		self.registry.insert(
			self.request_id.clone(),
			SharedRequestState {
				raw_body: final_body,
				model_name: parsed.model_name.clone(),
				is_streaming: parsed.is_streaming,
				endpoint_handler: handler,
				span,
				metrics,
				attempt_count: 0,
			},
		);

		let mutation = HeaderMutation::default()
			.with_set(MODEL_HEADER, parsed.model_name.into_bytes())
			.with_set(ORIGINAL_PATH_HEADER, self.original_path.clone().unwrap_or_default().into_bytes())
			.with_set(REQUEST_ID_HEADER, self.request_id.clone().into_bytes());

		Ok(PhaseResponse {
			header_mutation: Some(mutation),
			body_mutation: parsed.mutated_body.map(BodyMutation::Replace),
			clear_route_cache: true,
			status: None,
			mode_override: None,
			dynamic_metadata: None,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::processor::Header;

	fn headers(path: &str) -> Vec<Header> {
		vec![Header {
			name: ":path".to_string(),
			value: path.as_bytes().to_vec(),
		}]
	}

	#[test]
	fn parses_model_and_publishes_shared_state() {
		let registry = RequestRegistry::new();
		let mut filter = RouterFilter::new(registry.clone());
		filter
			.handle(Phase::RequestHeaders {
				headers: headers("/v1/chat/completions"),
				end_of_stream: false,
				attributes: Default::default(),
			})
			.unwrap();
		let resp = filter
			.handle(Phase::RequestBody {
				body: Bytes::from_static(br#"{"model":"gpt-4o-mini","messages":[]}"#),
				end_of_stream: true,
			})
			.unwrap();
		assert!(resp.clear_route_cache);
		let mutation = resp.header_mutation.unwrap();
		assert!(mutation.set.iter().any(|h| h.name == MODEL_HEADER && h.value == b"gpt-4o-mini"));
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn unknown_path_fails_fast_on_body_completion() {
		let registry = RequestRegistry::new();
		let mut filter = RouterFilter::new(registry);
		filter
			.handle(Phase::RequestHeaders {
				headers: headers("/v1/not-a-real-endpoint"),
				end_of_stream: false,
				attributes: Default::default(),
			})
			.unwrap();
		let err = filter
			.handle(Phase::RequestBody {
				body: Bytes::from_static(b"{}"),
				end_of_stream: true,
			})
			.unwrap_err();
		assert!(matches!(err, ProcessorError::ProtocolViolation(_)));
	}

	#[test]
	fn streaming_chat_completion_forces_include_usage_and_replaces_body() {
		let registry = RequestRegistry::new();
		let mut filter = RouterFilter::new(registry.clone());
		filter
			.handle(Phase::RequestHeaders {
				headers: headers("/v1/chat/completions"),
				end_of_stream: false,
				attributes: Default::default(),
			})
			.unwrap();
		let resp = filter
			.handle(Phase::RequestBody {
				body: Bytes::from_static(br#"{"model":"gpt-4o-mini","messages":[],"stream":true}"#),
				end_of_stream: true,
			})
			.unwrap();
		assert!(matches!(resp.body_mutation, Some(BodyMutation::Replace(_))));
	}
}
