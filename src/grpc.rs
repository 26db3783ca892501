//! Bridges the generated `ExternalProcessor` service to the `processor` module. Two
//! server types share the generated code: [`RouterService`] drives a [`RouterFilter`]
//! per stream and [`UpstreamService`] drives an [`UpstreamFilter`] per stream. Both run
//! as separate listeners inside the same process — the host proxy is configured with two
//! `ext_proc` filters, each scoped (via its own `processing_mode`) to one leg of the
//! request, pointed at this process's two ports — so the [`RequestRegistry`] the two
//! sides share is ordinary in-process state, not anything that crosses a process
//! boundary.

pub mod proto {
	#![allow(clippy::all)]
	tonic::include_proto!("aigw.ext_proc.v1");
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, warn};

use proto::external_processor_server::ExternalProcessor;
use proto::processing_request::Request as ProtoRequest;
use proto::processing_response::Response as ProtoResponse;
use proto::{
	BodyMutation as ProtoBodyMutation, BodyResponse, CommonResponse, CommonStatus as ProtoCommonStatus, HeaderAppendAction, HeaderMutation as ProtoHeaderMutation,
	HeaderValue as ProtoHeaderValue, HeadersResponse, ProcessingRequest, ProcessingResponse,
};

use crate::config::ConfigStore;
use crate::error::ProcessorError;
use crate::processor::router_filter::RouterFilter;
use crate::processor::state::RequestRegistry;
use crate::processor::upstream_filter::UpstreamFilter;
use crate::processor::{BodyMutation, CommonStatus, Header, HeaderMutation, Phase, PhaseResponse};

fn proto_headers_to_headers(headers: Option<proto::HeaderMap>) -> Vec<Header> {
	headers
		.map(|m| {
			m.headers
				.into_iter()
				.map(|h| Header {
					name: h.key,
					value: if h.raw_value.is_empty() { h.value.into_bytes() } else { h.raw_value },
				})
				.collect()
		})
		.unwrap_or_default()
}

fn proto_request_to_phase(req: ProcessingRequest) -> Result<Phase, Status> {
	let attributes: HashMap<String, String> = req.attributes;
	match req.request {
		Some(ProtoRequest::RequestHeaders(h)) => Ok(Phase::RequestHeaders {
			headers: proto_headers_to_headers(h.headers),
			end_of_stream: h.end_of_stream,
			attributes,
		}),
		Some(ProtoRequest::RequestBody(b)) => Ok(Phase::RequestBody {
			body: b.body.into(),
			end_of_stream: b.end_of_stream,
		}),
		Some(ProtoRequest::ResponseHeaders(h)) => Ok(Phase::ResponseHeaders {
			headers: proto_headers_to_headers(h.headers),
			end_of_stream: h.end_of_stream,
		}),
		Some(ProtoRequest::ResponseBody(b)) => Ok(Phase::ResponseBody {
			body: b.body.into(),
			end_of_stream: b.end_of_stream,
		}),
		None => Err(Status::invalid_argument("empty ProcessingRequest")),
	}
}

fn header_mutation_to_proto(mutation: HeaderMutation) -> ProtoHeaderMutation {
	ProtoHeaderMutation {
		set_headers: mutation
			.set
			.into_iter()
			.map(|h| proto::HeaderValueOption {
				header: Some(ProtoHeaderValue {
					key: h.name,
					value: String::new(),
					raw_value: h.value,
				}),
				append_action: HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
			})
			.collect(),
		remove_headers: mutation.remove,
	}
}

fn common_response(resp: PhaseResponse) -> CommonResponse {
	CommonResponse {
		status: match resp.status {
			Some(CommonStatus::ContinueAndReplace) => ProtoCommonStatus::ContinueAndReplace as i32,
			_ => ProtoCommonStatus::Continue as i32,
		},
		header_mutation: resp.header_mutation.map(header_mutation_to_proto),
		body_mutation: resp.body_mutation.map(|m| ProtoBodyMutation {
			mutation: Some(match m {
				BodyMutation::Replace(bytes) => proto::body_mutation::Mutation::Body(bytes.to_vec()),
				BodyMutation::Clear => proto::body_mutation::Mutation::ClearBody(true),
			}),
		}),
		clear_route_cache: resp.clear_route_cache,
	}
}

/// Which oneof arm a `ProcessingResponse` must answer on — determined by which phase
/// message it's replying to, not by anything in the response itself.
#[derive(Clone, Copy)]
enum PhaseKind {
	RequestHeaders,
	RequestBody,
	ResponseHeaders,
	ResponseBody,
}

fn phase_kind(phase: &Phase) -> PhaseKind {
	match phase {
		Phase::RequestHeaders { .. } => PhaseKind::RequestHeaders,
		Phase::RequestBody { .. } => PhaseKind::RequestBody,
		Phase::ResponseHeaders { .. } => PhaseKind::ResponseHeaders,
		Phase::ResponseBody { .. } => PhaseKind::ResponseBody,
	}
}

fn phase_response_to_proto(kind: PhaseKind, resp: PhaseResponse) -> ProcessingResponse {
	let dynamic_metadata = resp.dynamic_metadata.clone();
	let common = common_response(resp);
	let response = match kind {
		PhaseKind::RequestHeaders => ProtoResponse::RequestHeaders(HeadersResponse { response: Some(common) }),
		PhaseKind::RequestBody => ProtoResponse::RequestBody(BodyResponse { response: Some(common) }),
		PhaseKind::ResponseHeaders => ProtoResponse::ResponseHeaders(HeadersResponse { response: Some(common) }),
		PhaseKind::ResponseBody => ProtoResponse::ResponseBody(BodyResponse { response: Some(common) }),
	};
	ProcessingResponse {
		response: Some(response),
		mode_override: None,
		dynamic_metadata: dynamic_metadata.map(json_to_dynamic_metadata),
	}
}

fn json_to_dynamic_metadata(value: serde_json::Value) -> proto::DynamicMetadata {
	let mut namespaces = HashMap::new();
	if let serde_json::Value::Object(map) = value {
		if let Ok(bytes) = serde_json::to_vec(&map) {
			namespaces.insert("io.aigw".to_string(), bytes);
		}
	}
	proto::DynamicMetadata { namespaces }
}

fn to_status(err: ProcessorError) -> Status {
	warn!(error = %err, "processor returned an error; failing the stream");
	if err.is_fatal_before_upstream() {
		Status::invalid_argument(err.to_string())
	} else {
		Status::unavailable(err.to_string())
	}
}

pub type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

/// Client-facing leg: one [`RouterFilter`] per `Process` stream. Doesn't need the
/// runtime config — path-to-handler resolution is static and backend selection happens
/// on the upstream leg.
pub struct RouterService {
	registry: RequestRegistry,
}

impl RouterService {
	pub fn new(registry: RequestRegistry) -> Self {
		Self { registry }
	}
}

#[tonic::async_trait]
impl ExternalProcessor for RouterService {
	type ProcessStream = ProcessStream;

	async fn process(&self, request: Request<Streaming<ProcessingRequest>>) -> Result<Response<Self::ProcessStream>, Status> {
		let mut inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(16);
		let registry = self.registry.clone();

		tokio::spawn(async move {
			let mut filter = RouterFilter::new(registry);
			while let Some(next) = inbound.message().await.transpose() {
				let req = match next {
					Ok(r) => r,
					Err(e) => {
						error!(error = %e, "router stream read error");
						break;
					},
				};
				let phase = match proto_request_to_phase(req) {
					Ok(p) => p,
					Err(status) => {
						let _ = tx.send(Err(status)).await;
						break;
					},
				};
				let kind = phase_kind(&phase);
				let result = filter.handle(phase).map(|resp| phase_response_to_proto(kind, resp));
				let outcome = result.map_err(to_status);
				if tx.send(outcome).await.is_err() {
					break;
				}
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

/// Upstream leg: one [`UpstreamFilter`] per attempt stream.
pub struct UpstreamService {
	config: Arc<ConfigStore>,
	registry: RequestRegistry,
}

impl UpstreamService {
	pub fn new(config: Arc<ConfigStore>, registry: RequestRegistry) -> Self {
		Self { config, registry }
	}
}

#[tonic::async_trait]
impl ExternalProcessor for UpstreamService {
	type ProcessStream = ProcessStream;

	async fn process(&self, request: Request<Streaming<ProcessingRequest>>) -> Result<Response<Self::ProcessStream>, Status> {
		let mut inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(16);
		let config = self.config.current();
		let registry = self.registry.clone();

		tokio::spawn(async move {
			let mut filter = UpstreamFilter::new(config, registry);
			while let Some(next) = inbound.message().await.transpose() {
				let req = match next {
					Ok(r) => r,
					Err(e) => {
						error!(error = %e, "upstream stream read error");
						break;
					},
				};
				let phase = match proto_request_to_phase(req) {
					Ok(p) => p,
					Err(status) => {
						let _ = tx.send(Err(status)).await;
						break;
					},
				};
				let kind = phase_kind(&phase);
				let result = filter.handle(phase).await.map(|resp| phase_response_to_proto(kind, resp));
				let outcome = result.map_err(to_status);
				if tx.send(outcome).await.is_err() {
					break;
				}
			}
		});

		Ok(Response::new(ReceiverStream::new(rx)))
	}
}

pub use proto::external_processor_server::ExternalProcessorServer;

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;

	#[test]
	fn header_mutation_round_trips_into_proto_shape() {
		let mutation = HeaderMutation::default()
			.with_set("x-ai-eg-model", b"gpt-4o-mini".to_vec())
			.with_remove("x-stale");
		let proto = header_mutation_to_proto(mutation);
		assert_eq!(proto.set_headers.len(), 1);
		assert_eq!(proto.remove_headers, vec!["x-stale".to_string()]);
	}

	#[test]
	fn continue_and_replace_status_is_preserved() {
		let resp = PhaseResponse {
			status: Some(CommonStatus::ContinueAndReplace),
			body_mutation: Some(BodyMutation::Replace(Bytes::from_static(b"{}"))),
			..PhaseResponse::unmodified()
		};
		let common = common_response(resp);
		assert_eq!(common.status, ProtoCommonStatus::ContinueAndReplace as i32);
	}
}
