//! Error taxonomy for the gateway core.
//!
//! Each subsystem gets its own `thiserror` enum; [`GatewayError`] composes them for
//! anything that needs to cross a subsystem boundary (e.g. the processor calling into
//! the router and the auth layer in the same phase handler).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("backend '{0}' referenced by a rule is not defined")]
	UnknownBackend(String),
	#[error("invalid CEL cost expression '{expr}': {source}")]
	InvalidCelExpression {
		expr: String,
		#[source]
		source: cel_interpreter::ParseError,
	},
	#[error("failed to parse runtime config: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("failed to read runtime config file: {0}")]
	Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RouterError {
	#[error("no route rule matched the request headers")]
	NoMatch,
	#[error("matched rule has no backends configured")]
	EmptyBackendList,
}

#[derive(Debug, Error)]
pub enum AuthError {
	#[error("failed to read API key material: {0}")]
	KeyFile(#[source] std::io::Error),
	#[error("failed to sign AWS SigV4 request: {0}")]
	Sigv4(String),
	#[error("failed to obtain AWS credentials: {0}")]
	AwsCredentials(String),
	#[error("failed to obtain Azure access token: {0}")]
	AzureToken(String),
	#[error("failed to obtain GCP access token: {0}")]
	GcpToken(String),
	#[error("invalid header value produced during authentication: {0}")]
	InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

#[derive(Debug, Error)]
pub enum ParseError {
	#[error("missing required field: {0}")]
	MissingField(&'static str),
	#[error("malformed request body: {0}")]
	Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TranslationError {
	#[error("no translator for endpoint {endpoint} -> backend schema {schema}")]
	UnsupportedSchema { endpoint: String, schema: String },
	#[error("failed to decode upstream response body: {0}")]
	Decode(String),
	#[error("failed to encode outgoing body: {0}")]
	Encode(#[from] serde_json::Error),
	#[error("malformed streaming frame: {0}")]
	Framing(String),
	#[error(transparent)]
	InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error(transparent)]
	Router(#[from] RouterError),
	#[error(transparent)]
	Auth(#[from] AuthError),
	#[error(transparent)]
	Translation(#[from] TranslationError),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("upstream returned HTTP status {0}")]
	UpstreamHttp(u16),
	#[error("stream cancelled")]
	Cancelled,
	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),
}

impl ProcessorError {
	/// Whether this error must fail the stream immediately, as opposed to `UpstreamHttp`
	/// which the proxy may retry against another backend.
	pub fn is_fatal_before_upstream(&self) -> bool {
		!matches!(self, ProcessorError::UpstreamHttp(_) | ProcessorError::Cancelled)
	}
}

pub type GatewayError = ProcessorError;
