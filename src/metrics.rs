//! Metrics sink contract plus the cost/dynamic-metadata computation that runs at
//! end-of-stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::warn;

use crate::config::{CostDescriptor, CostKind, RuntimeConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
	pub input: u64,
	pub output: u64,
	pub total: u64,
	pub cached_input: Option<u64>,
}

impl TokenUsage {
	/// Token usage is monotonically non-decreasing within one attempt; merging a later
	/// partial reading never regresses a field.
	pub fn merge(&mut self, other: TokenUsage) {
		self.input = self.input.max(other.input);
		self.output = self.output.max(other.output);
		self.total = self.total.max(other.total);
		self.cached_input = other.cached_input.or(self.cached_input);
	}
}

/// A metrics sink is injected per request. `RecordRequestCompletion` must be guarded to
/// fire exactly once even if the processor's phase handlers call it from more than one
/// place (e.g. both a normal completion path and a cancellation path).
pub trait MetricsSink: Send {
	fn start_request(&mut self);
	fn set_model(&mut self, model: &str);
	fn set_backend(&mut self, backend: &str);
	fn set_original_model(&mut self, model: &str);
	fn set_response_model(&mut self, model: &str);
	fn record_token_usage(&mut self, usage: TokenUsage);
	fn record_token_latency(&mut self, ttft_ms: Option<u64>, itl_ms: Option<u64>);
	fn record_request_completion(&mut self, success: bool);
    fn time_to_first_token_ms(&self) -> Option<u64>;
    fn inter_token_latency_ms(&self) -> Option<u64>;
}

/// Tracks first/subsequent output-token arrival for token latency (streaming only) and
/// guards against double-firing `RecordRequestCompletion` via an "already recorded"
/// flag.
pub struct RequestMetrics {
	model: Option<String>,
	backend: Option<String>,
	original_model: Option<String>,
	response_model: Option<String>,
	usage: TokenUsage,
	started_at: Option<Instant>,
	first_token_at: Option<Instant>,
	last_token_at: Option<Instant>,
	itl_total_ms: u64,
	itl_samples: u64,
	completion_recorded: AtomicBool,
}

impl Default for RequestMetrics {
	fn default() -> Self {
		Self {
			model: None,
			backend: None,
			original_model: None,
			response_model: None,
			usage: TokenUsage::default(),
			started_at: None,
			first_token_at: None,
			last_token_at: None,
			itl_total_ms: 0,
			itl_samples: 0,
			completion_recorded: AtomicBool::new(false),
		}
	}
}

impl MetricsSink for RequestMetrics {
	fn start_request(&mut self) {
		self.started_at = Some(Instant::now());
	}
	fn set_model(&mut self, model: &str) {
		self.model = Some(model.to_string());
	}
	fn set_backend(&mut self, backend: &str) {
		self.backend = Some(backend.to_string());
	}
	fn set_original_model(&mut self, model: &str) {
		self.original_model = Some(model.to_string());
	}
	fn set_response_model(&mut self, model: &str) {
		self.response_model = Some(model.to_string());
	}
	fn record_token_usage(&mut self, usage: TokenUsage) {
		self.usage.merge(usage);
	}
	fn record_token_latency(&mut self, _ttft_ms: Option<u64>, _itl_ms: Option<u64>) {
		let now = Instant::now();
		if self.first_token_at.is_none() {
			self.first_token_at = Some(now);
		} else if let Some(last) = self.last_token_at {
			self.itl_total_ms += now.duration_since(last).as_millis() as u64;
			self.itl_samples += 1;
		}
		self.last_token_at = Some(now);
	}
	fn record_request_completion(&mut self, success: bool) {
		if self
			.completion_recorded
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			warn!("RecordRequestCompletion called more than once; ignoring duplicate");
			return;
		}
		tracing::debug!(success, "request completion recorded");
	}
	fn time_to_first_token_ms(&self) -> Option<u64> {
		match (self.started_at, self.first_token_at) {
			(Some(s), Some(f)) => Some(f.duration_since(s).as_millis() as u64),
			_ => None,
		}
	}
	fn inter_token_latency_ms(&self) -> Option<u64> {
		if self.itl_samples == 0 {
			None
		} else {
			Some(self.itl_total_ms / self.itl_samples)
		}
	}
}

impl RequestMetrics {
	pub fn usage(&self) -> TokenUsage {
		self.usage
	}
}

/// Dynamic metadata emitted at end-of-stream.
#[derive(Debug, Serialize)]
pub struct DynamicMetadata {
	pub backend_name: String,
	pub model_name_override: Option<String>,
	#[serde(flatten)]
	pub costs: serde_json::Map<String, serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_latency_ttft: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub token_latency_itl: Option<u64>,
}

pub struct CelCostContext<'a> {
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub total_tokens: u64,
	pub backend: &'a str,
	pub model: &'a str,
}

/// Evaluate every configured cost descriptor and return it keyed by its metadata key.
/// Cost-expression results must be non-negative; a negative evaluation is clamped to
/// zero rather than propagated, since a malformed expression was already rejected at
/// config-load time and a negative runtime value is a policy bug, not a request-time
/// failure worth failing the stream over.
pub fn compute_costs(
	config: &RuntimeConfig,
	usage: TokenUsage,
	ctx: &CelCostContext,
) -> serde_json::Map<String, serde_json::Value> {
	let mut out = serde_json::Map::new();
	for cost in &config.request_costs {
		let value = match &cost.kind {
			CostKind::InputToken => usage.input as f64,
			CostKind::OutputToken => usage.output as f64,
			CostKind::TotalToken => usage.total as f64,
			CostKind::Cel { expr } => match eval_cel_cost(expr, ctx) {
				Ok(v) => v.max(0.0),
				Err(e) => {
					warn!(expr, error = %e, "CEL cost expression failed at request time");
					continue;
				},
			},
		};
		out.insert(
			cost.metadata_key.clone(),
			serde_json::Number::from_f64(value)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
		);
	}
	out
}

fn eval_cel_cost(expr: &str, ctx: &CelCostContext) -> anyhow::Result<f64> {
	let program = cel_interpreter::Program::compile(expr)
		.map_err(|e| anyhow::anyhow!("cel compile error: {e}"))?;
	let mut context = cel_interpreter::Context::default();
	context.add_variable("input_tokens", ctx.input_tokens as i64)?;
	context.add_variable("output_tokens", ctx.output_tokens as i64)?;
	context.add_variable("total_tokens", ctx.total_tokens as i64)?;
	context.add_variable("backend", ctx.backend)?;
	context.add_variable("model", ctx.model)?;
	let value = program.execute(&context)?;
	match value {
		cel_interpreter::Value::Int(i) => Ok(i as f64),
		cel_interpreter::Value::UInt(u) => Ok(u as f64),
		cel_interpreter::Value::Float(f) => Ok(f),
		other => Err(anyhow::anyhow!("CEL cost expression returned non-numeric value: {other:?}")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{CostDescriptor, CostKind, RuntimeConfig, SchemaRef};

	fn cfg_with_costs(costs: Vec<CostDescriptor>) -> RuntimeConfig {
		RuntimeConfig {
			input_schema: SchemaRef {
				name: "openai".into(),
				version: "v1".into(),
			},
			model_name_header_key: "x-ai-eg-model".into(),
			selected_backend_header_key: "x-ai-eg-selected-backend".into(),
			backends: vec![],
			rules: vec![],
			models: vec![],
			request_costs: costs,
			metadata_namespace: "io.aigw".into(),
			uuid: None,
		}
	}

	#[test]
	fn direct_token_costs_read_from_usage() {
		let cfg = cfg_with_costs(vec![
			CostDescriptor {
				kind: CostKind::InputToken,
				metadata_key: "in".into(),
			},
			CostDescriptor {
				kind: CostKind::OutputToken,
				metadata_key: "out".into(),
			},
			CostDescriptor {
				kind: CostKind::TotalToken,
				metadata_key: "tot".into(),
			},
		]);
		let usage = TokenUsage {
			input: 3,
			output: 5,
			total: 8,
			cached_input: None,
		};
		let ctx = CelCostContext {
			input_tokens: 3,
			output_tokens: 5,
			total_tokens: 8,
			backend: "openai-primary",
			model: "gpt-4o-mini",
		};
		let costs = compute_costs(&cfg, usage, &ctx);
		assert_eq!(costs["in"], 3.0);
		assert_eq!(costs["out"], 5.0);
		assert_eq!(costs["tot"], 8.0);
	}

	#[test]
	fn cel_cost_is_evaluated_with_scope_variables() {
		let cfg = cfg_with_costs(vec![CostDescriptor {
			kind: CostKind::Cel {
				expr: "input_tokens * 2".to_string(),
			},
			metadata_key: "doubled".into(),
		}]);
		let usage = TokenUsage {
			input: 10,
			output: 0,
			total: 10,
			cached_input: None,
		};
		let ctx = CelCostContext {
			input_tokens: 10,
			output_tokens: 0,
			total_tokens: 10,
			backend: "b",
			model: "m",
		};
		let costs = compute_costs(&cfg, usage, &ctx);
		assert_eq!(costs["doubled"], 20.0);
	}

	#[test]
	fn token_usage_merge_is_monotonic() {
		let mut u = TokenUsage {
			input: 5,
			output: 2,
			total: 7,
			cached_input: None,
		};
		u.merge(TokenUsage {
			input: 3,
			output: 9,
			total: 12,
			cached_input: Some(1),
		});
		assert_eq!(u.input, 5);
		assert_eq!(u.output, 9);
		assert_eq!(u.total, 12);
		assert_eq!(u.cached_input, Some(1));
	}
}
