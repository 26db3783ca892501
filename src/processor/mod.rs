//! The ext_proc phase-message contract: header/body mutation types plus the two phase
//! handlers, `RouterFilter` (client-facing leg) and `UpstreamFilter` (one per upstream
//! attempt). `grpc.rs` maps the generated proto `ProcessingRequest`/`ProcessingResponse`
//! messages to/from the types here.

pub mod router_filter;
pub mod state;
pub mod upstream_filter;

use bytes::Bytes;

use crate::error::ProcessorError;

/// One header or pseudo-header pair. Plain strings/bytes rather than
/// `http::HeaderName`/`HeaderValue`, since pseudo-headers like `:path` and `:authority`
/// aren't valid `http` crate header names but are ordinary string keys on this wire
/// contract.
#[derive(Debug, Clone)]
pub struct Header {
	pub name: String,
	pub value: Vec<u8>,
}

pub type HeaderList = Vec<Header>;

pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a [u8]> {
	headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)).map(|h| h.value.as_slice())
}

pub fn header_str<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
	header_value(headers, name).and_then(|v| std::str::from_utf8(v).ok())
}

#[derive(Debug, Clone, Default)]
pub struct HeaderMutation {
	pub set: Vec<Header>,
	pub remove: Vec<String>,
}

impl HeaderMutation {
	pub fn is_empty(&self) -> bool {
		self.set.is_empty() && self.remove.is_empty()
	}

	pub fn with_set(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
		self.set.push(Header {
			name: name.into(),
			value: value.into(),
		});
		self
	}

	pub fn with_remove(mut self, name: impl Into<String>) -> Self {
		self.remove.push(name.into());
		self
	}
}

#[derive(Debug, Clone)]
pub enum BodyMutation {
	Replace(Bytes),
	Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonStatus {
	Continue,
	ContinueAndReplace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBodyMode {
	None,
	Streamed,
}

/// What a phase handler hands back to the proxy for one phase message.
#[derive(Debug, Clone, Default)]
pub struct PhaseResponse {
	pub header_mutation: Option<HeaderMutation>,
	pub body_mutation: Option<BodyMutation>,
	pub clear_route_cache: bool,
	pub status: Option<CommonStatus>,
	pub mode_override: Option<ResponseBodyMode>,
	pub dynamic_metadata: Option<serde_json::Value>,
}

impl PhaseResponse {
	/// Nothing to mutate, proceed as normal — the shape for a phase nothing needs to
	/// touch (e.g. a router filter's response-side pass-through when no upstream filter
	/// has attached, such as an early routing failure).
	pub fn unmodified() -> Self {
		Self::default()
	}
}

/// One phase message in a filter's bidirectional stream. `attributes` mirrors the
/// proto's opaque `map<string, string>` forwarded by the proxy (e.g. the request id an
/// upstream filter uses to find the router filter's published state, or
/// `x-gateway-destination-endpoint`); only meaningful on `RequestHeaders` today.
#[derive(Debug)]
pub enum Phase {
	RequestHeaders {
		headers: HeaderList,
		end_of_stream: bool,
		attributes: std::collections::HashMap<String, String>,
	},
	RequestBody { body: Bytes, end_of_stream: bool },
	ResponseHeaders { headers: HeaderList, end_of_stream: bool },
	ResponseBody { body: Bytes, end_of_stream: bool },
}

/// Legal phase ordering, shared by both filter kinds even though each only ever
/// exercises part of it: a router filter sees `RequestHeaders -> RequestBody* ->
/// ResponseHeaders -> ResponseBody*`; an upstream filter sees `RequestHeaders ->
/// ResponseHeaders -> ResponseBody*` (never `RequestBody`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
	#[default]
	Start,
	RequestHeaders,
	RequestBody,
	ResponseHeaders,
	ResponseBody,
}

impl StreamPhase {
	pub fn advance(self, incoming: &Phase, allow_request_body: bool) -> Result<Self, ProcessorError> {
		use Phase::*;
		use StreamPhase::*;
		let next = match (self, incoming) {
			(Start, RequestHeaders { .. }) => RequestHeaders,
			(RequestHeaders, RequestBody { .. }) if allow_request_body => RequestBody,
			(RequestBody, RequestBody { .. }) if allow_request_body => RequestBody,
			(RequestHeaders, ResponseHeaders { .. }) => ResponseHeaders,
			(RequestBody, ResponseHeaders { .. }) if allow_request_body => ResponseHeaders,
			(ResponseHeaders, ResponseBody { .. }) => ResponseBody,
			(ResponseBody, ResponseBody { .. }) => ResponseBody,
			_ => return Err(ProcessorError::ProtocolViolation("illegal phase transition")),
		};
		if matches!(incoming, RequestBody { .. }) && !allow_request_body {
			return Err(ProcessorError::ProtocolViolation("RequestBody phase sent to an upstream filter"));
		}
		Ok(next)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn router_filter_ordering_allows_request_body() {
		let mut phase = StreamPhase::Start;
		phase = phase
			.advance(&Phase::RequestHeaders { headers: vec![], end_of_stream: false, attributes: Default::default() }, true)
			.unwrap();
		phase = phase.advance(&Phase::RequestBody { body: Bytes::new(), end_of_stream: true }, true).unwrap();
		phase = phase
			.advance(&Phase::ResponseHeaders { headers: vec![], end_of_stream: false }, true)
			.unwrap();
		assert_eq!(phase, StreamPhase::ResponseHeaders);
	}

	#[test]
	fn upstream_filter_rejects_request_body() {
		let phase = StreamPhase::Start
			.advance(&Phase::RequestHeaders { headers: vec![], end_of_stream: true, attributes: Default::default() }, false)
			.unwrap();
		let err = phase
			.advance(&Phase::RequestBody { body: Bytes::new(), end_of_stream: true }, false)
			.unwrap_err();
		assert!(matches!(err, ProcessorError::ProtocolViolation(_)));
	}

	#[test]
	fn response_body_before_headers_is_illegal() {
		let err = StreamPhase::Start
			.advance(&Phase::ResponseBody { body: Bytes::new(), end_of_stream: true }, true)
			.unwrap_err();
		assert!(matches!(err, ProcessorError::ProtocolViolation(_)));
	}
}
