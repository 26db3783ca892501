//! Runtime configuration: the immutable snapshot handed to every processor phase, plus
//! the load/validate/hot-reload machinery that keeps it current.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaRef {
	pub name: String,
	#[serde(default = "default_version")]
	pub version: String,
}

fn default_version() -> String {
	"v1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
	pub name: String,
	pub owned_by: String,
	pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CostKind {
	InputToken,
	OutputToken,
	TotalToken,
	Cel { expr: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDescriptor {
	#[serde(flatten)]
	pub kind: CostKind,
	pub metadata_key: String,
}

/// Discriminated auth variant for a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendAuth {
	ApiKey {
		/// Path to a file containing the key (trimmed of surrounding whitespace).
		secret: PathBuf,
	},
	AwsCredentials {
		region: String,
		/// Optional path to a shared credentials file; None means use the default
		/// provider chain (env vars, IMDS, IAM roles, SSO).
		#[serde(default)]
		secret: Option<PathBuf>,
		#[serde(default)]
		profile: Option<String>,
	},
	AzureAccessToken {
		#[serde(default)]
		token_source: Option<String>,
	},
	GcpServiceAccount {
		#[serde(default)]
		token_source: Option<String>,
	},
	None,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMutationConfig {
	#[serde(default)]
	pub set: Vec<(String, String)>,
	#[serde(default)]
	pub remove: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
	pub name: String,
	pub schema: SchemaRef,
	#[serde(default)]
	pub model_name_override: Option<String>,
	#[serde(default)]
	pub header_mutation: Option<HeaderMutationConfig>,
	#[serde(default)]
	pub auth: Option<BackendAuth>,
	/// Overrides the derived upstream `:authority`/host for this backend (e.g. a
	/// self-hosted or VPC-private endpoint). None means derive from the schema/auth
	/// (project id, region) as the provider normally would.
	#[serde(default)]
	pub host_override: Option<String>,
	/// GCP Vertex project id, required to derive the upstream path/host for the
	/// `vertex-gemini`/`gcp-anthropic` schemas.
	#[serde(default)]
	pub gcp_project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedBackend {
	pub name: String,
	#[serde(default)]
	pub weight: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
	pub headers: Vec<HeaderMatch>,
	pub backends: Vec<WeightedBackend>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
	pub input_schema: SchemaRef,
	#[serde(default = "default_model_header_key")]
	pub model_name_header_key: String,
	#[serde(default = "default_backend_header_key")]
	pub selected_backend_header_key: String,
	#[serde(default)]
	pub backends: Vec<Backend>,
	#[serde(default)]
	pub rules: Vec<RouteRule>,
	#[serde(default)]
	pub models: Vec<Model>,
	#[serde(default)]
	pub request_costs: Vec<CostDescriptor>,
	#[serde(default = "default_metadata_namespace")]
	pub metadata_namespace: String,
	#[serde(default)]
	pub uuid: Option<String>,
}

fn default_model_header_key() -> String {
	"x-ai-eg-model".to_string()
}

fn default_backend_header_key() -> String {
	"x-ai-eg-selected-backend".to_string()
}

fn default_metadata_namespace() -> String {
	"io.aigw".to_string()
}

impl RuntimeConfig {
	pub fn backend(&self, name: &str) -> Option<&Backend> {
		self.backends.iter().find(|b| b.name == name)
	}

	/// Validate cross-references and precompile CEL cost expressions. Any failure here
	/// is a `ConfigError` raised at load time, never deferred to request time.
	fn validate(&self) -> Result<(), ConfigError> {
		let names: std::collections::HashSet<&str> =
			self.backends.iter().map(|b| b.name.as_str()).collect();
		for rule in &self.rules {
			for b in &rule.backends {
				if !names.contains(b.name.as_str()) {
					return Err(ConfigError::UnknownBackend(b.name.clone()));
				}
			}
		}
		for cost in &self.request_costs {
			if let CostKind::Cel { expr } = &cost.kind {
				cel_interpreter::Program::compile(expr)
					.map_err(|source| ConfigError::InvalidCelExpression {
						expr: expr.clone(),
						source,
					})?;
			}
		}
		Ok(())
	}

	pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
		let cfg: RuntimeConfig = serde_yaml::from_str(raw)?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)?;
		Self::from_yaml(&raw)
	}
}

/// Secret material loaded from disk for `BackendAuth::ApiKey`. Kept out of
/// `RuntimeConfig` proper since it is read lazily and cached by the auth layer, not
/// part of the declarative snapshot.
#[derive(Clone)]
pub struct LoadedApiKey(pub SecretString);

/// Holder for the live, hot-reloadable config snapshot plus its watcher.
///
/// Reads are lock-free (`ArcSwap::load`); reloads publish a brand-new `Arc` so
/// in-flight streams that already cloned the old snapshot keep running against it
/// instead of observing a reload mid-stream.
pub struct ConfigStore {
	current: ArcSwap<RuntimeConfig>,
}

impl ConfigStore {
	pub fn new(initial: RuntimeConfig) -> Arc<Self> {
		Arc::new(Self {
			current: ArcSwap::from_pointee(initial),
		})
	}

	pub fn current(&self) -> Arc<RuntimeConfig> {
		self.current.load_full()
	}

	fn reload_from(&self, path: &Path) {
		match RuntimeConfig::load(path) {
			Ok(cfg) => {
				info!(path = %path.display(), "reloaded runtime config");
				self.current.store(Arc::new(cfg));
			},
			Err(e) => {
				warn!(path = %path.display(), error = %e, "failed to reload runtime config, keeping previous snapshot");
			},
		}
	}
}

/// Spawn a debounced file watcher that republishes `RuntimeConfig` on change.
/// Returns the watcher so the caller keeps it alive for the process lifetime.
pub fn watch(
	store: Arc<ConfigStore>,
	path: PathBuf,
) -> anyhow::Result<notify_debouncer_full::Debouncer<notify::RecommendedWatcher, notify_debouncer_full::RecommendedCache>> {
	use notify::Watcher;
	use notify_debouncer_full::{DebounceEventResult, new_debouncer};

	let watch_path = path.clone();
	let mut debouncer = new_debouncer(
		Duration::from_millis(250),
		None,
		move |result: DebounceEventResult| match result {
			Ok(events) => {
				if events.iter().any(|e| !e.kind.is_access()) {
					debug!(?events, "config file changed, reloading");
					store.reload_from(&watch_path);
				}
			},
			Err(errors) => {
				for e in errors {
					error!(error = %e, "config watcher error");
				}
			},
		},
	)?;
	debouncer
		.watcher()
		.watch(&path, notify::RecursiveMode::NonRecursive)?;
	Ok(debouncer)
}
