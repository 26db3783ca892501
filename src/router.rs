//! Backend selection: rule matching plus weighted random pick.
//!
//! The router is stateless and safe for concurrent reads — it borrows only from the
//! `Arc<RuntimeConfig>` snapshot handed to it per call, so many stream tasks can call
//! `Router::select` concurrently without any shared mutable state.

use std::collections::HashMap;

use rand::Rng;

use crate::config::{RouteRule, RuntimeConfig, WeightedBackend};
use crate::error::RouterError;

/// A case-insensitive view over request headers, built once per phase handler
/// invocation. Matching is exact-string equality by default.
pub struct HeaderView<'a>(HashMap<&'a str, &'a str>);

impl<'a> HeaderView<'a> {
	pub fn from_pairs(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
		Self(pairs.into_iter().map(|(k, v)| (k, v)).collect())
	}

	fn get(&self, name: &str) -> Option<&str> {
		self.0.get(name).copied()
	}
}

fn rule_matches(rule: &RouteRule, headers: &HeaderView) -> bool {
	rule
		.headers
		.iter()
		.all(|m| headers.get(&m.name) == Some(m.value.as_str()))
}

/// Picks one backend name out of a rule's weighted list. If every weight is zero or
/// absent, uniform random; otherwise cumulative-weight bucket selection in
/// `[0, totalWeight)`.
fn weighted_pick<'b>(backends: &'b [WeightedBackend], rng: &mut impl Rng) -> &'b WeightedBackend {
	if backends.len() == 1 {
		return &backends[0];
	}
	let total: u32 = backends.iter().map(|b| b.weight.unwrap_or(0)).sum();
	if total == 0 {
		let idx = rng.gen_range(0..backends.len());
		return &backends[idx];
	}
	let pick = rng.gen_range(0..total);
	let mut cumulative = 0u32;
	for b in backends {
		cumulative += b.weight.unwrap_or(0);
		if pick < cumulative {
			return b;
		}
	}
	// Floating point / integer rounding cannot reach here given the loop invariant,
	// but fall back to the last entry rather than panicking on a malformed config.
	backends.last().expect("non-empty, checked by caller")
}

/// Customization seam: a user-supplied function that receives the default router's
/// pick and the config, returning a possibly different backend name. Stored as a trait
/// object so it can close over arbitrary state.
pub trait RouterCustomization: Send + Sync {
	fn wrap(&self, default_pick: &str, config: &RuntimeConfig) -> String;
}

#[derive(Default)]
pub struct Router {
	customization: Option<Box<dyn RouterCustomization>>,
}

impl Router {
	pub fn new() -> Self {
		Self { customization: None }
	}

	pub fn with_customization(customization: Box<dyn RouterCustomization>) -> Self {
		Self {
			customization: Some(customization),
		}
	}

	/// Iterate rules in declared order; return the first matching rule's weighted pick,
	/// resolved to a `Backend` from the config. Pure function of `headers` except for
	/// the weighted pick itself.
	pub fn select<'c>(
		&self,
		config: &'c RuntimeConfig,
		headers: &HeaderView,
	) -> Result<&'c crate::config::Backend, RouterError> {
		let rule = config
			.rules
			.iter()
			.find(|r| rule_matches(r, headers))
			.ok_or(RouterError::NoMatch)?;
		if rule.backends.is_empty() {
			return Err(RouterError::EmptyBackendList);
		}
		let mut rng = rand::thread_rng();
		let picked = weighted_pick(&rule.backends, &mut rng);
		let name = match &self.customization {
			Some(c) => c.wrap(&picked.name, config),
			None => picked.name.clone(),
		};
		// Config validation guarantees every rule backend name resolves; a customization
		// hook that returns an unknown name falls back to the original pick.
		config
			.backend(&name)
			.or_else(|| config.backend(&picked.name))
			.ok_or(RouterError::NoMatch)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Backend, HeaderMatch, RuntimeConfig, SchemaRef};

	fn backend(name: &str) -> Backend {
		Backend {
			name: name.to_string(),
			schema: SchemaRef {
				name: "openai".into(),
				version: "v1".into(),
			},
			model_name_override: None,
			header_mutation: None,
			auth: None,
			host_override: None,
			gcp_project_id: None,
		}
	}

	fn config_with_weights(weights: &[(&str, Option<u32>)]) -> RuntimeConfig {
		RuntimeConfig {
			input_schema: SchemaRef {
				name: "openai".into(),
				version: "v1".into(),
			},
			model_name_header_key: "x-ai-eg-model".into(),
			selected_backend_header_key: "x-ai-eg-selected-backend".into(),
			backends: weights.iter().map(|(n, _)| backend(n)).collect(),
			rules: vec![RouteRule {
				headers: vec![HeaderMatch {
					name: "x-model-name".into(),
					value: "llama3.3333".into(),
				}],
				backends: weights
					.iter()
					.map(|(n, w)| WeightedBackend {
						name: n.to_string(),
						weight: *w,
					})
					.collect(),
			}],
			models: vec![],
			request_costs: vec![],
			metadata_namespace: "io.aigw".into(),
			uuid: None,
		}
	}

	#[test]
	fn no_matching_rule_is_an_error() {
		let cfg = config_with_weights(&[("foo", Some(1))]);
		let headers = HeaderView::from_pairs([("x-model-name", "something-else")]);
		let router = Router::new();
		assert!(matches!(
			router.select(&cfg, &headers),
			Err(RouterError::NoMatch)
		));
	}

	#[test]
	fn single_backend_rule_always_picks_it() {
		let cfg = config_with_weights(&[("only", None)]);
		let headers = HeaderView::from_pairs([("x-model-name", "llama3.3333")]);
		let router = Router::new();
		let picked = router.select(&cfg, &headers).unwrap();
		assert_eq!(picked.name, "only");
	}

	#[test]
	fn weighted_pick_converges_to_expected_ratio() {
		let cfg = config_with_weights(&[("foo", Some(1)), ("bar", Some(3))]);
		let headers = HeaderView::from_pairs([("x-model-name", "llama3.3333")]);
		let router = Router::new();
		let mut foo = 0u32;
		let mut bar = 0u32;
		for _ in 0..10_000 {
			match router.select(&cfg, &headers).unwrap().name.as_str() {
				"foo" => foo += 1,
				"bar" => bar += 1,
				other => panic!("unexpected backend {other}"),
			}
		}
		// 1:3 weighting => ~25%/75% within +/- 2 percentage points
		let foo_pct = foo as f64 / 10_000.0;
		assert!((0.23..0.27).contains(&foo_pct), "foo_pct={foo_pct}");
		assert!(bar > foo);
	}

	#[test]
	fn zero_weights_are_uniform() {
		let cfg = config_with_weights(&[("foo", Some(0)), ("bar", Some(0))]);
		let headers = HeaderView::from_pairs([("x-model-name", "llama3.3333")]);
		let router = Router::new();
		let mut foo = 0u32;
		for _ in 0..2_000 {
			if router.select(&cfg, &headers).unwrap().name == "foo" {
				foo += 1;
			}
		}
		let pct = foo as f64 / 2_000.0;
		assert!((0.4..0.6).contains(&pct), "pct={pct}");
	}
}
