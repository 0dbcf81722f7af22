//! LLM enrichment capability.
//!
//! When the best fuzzy score lands in the uncertain band between the review
//! and auto-merge thresholds, the orchestrator may ask an LLM provider to
//! adjudicate the pair. The provider is optional: the no-op implementation
//! reports itself unavailable and the state machine follows the non-LLM path
//! without failing the request. Timeouts and retries are provider-internal.

pub mod client;
pub mod http;

pub use client::{LlmClientError, LlmProviderConfig, ResilientLlmClient};
pub use http::HttpLlmProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{EntityType, MatchOutcome};

/// Provider's judgment on one (input, candidate) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmVerdict {
	/// Provider confidence in the pair denoting the same entity, in `[0, 1]`.
	pub score: f64,
	pub decision: MatchOutcome,
	pub reasoning: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
	/// Whether the provider can currently take requests.
	async fn available(&self) -> bool;

	/// Adjudicate whether `raw_name` denotes the same entity as the
	/// candidate.
	async fn enrich(
		&self,
		raw_name: &str,
		candidate_name: &str,
		entity_type: &EntityType,
		candidate_id: &str,
	) -> Result<LlmVerdict>;
}

/// Provider used when none is configured; never available.
pub struct NoopLlmProvider;

#[async_trait]
impl LlmProvider for NoopLlmProvider {
	async fn available(&self) -> bool {
		false
	}

	async fn enrich(
		&self,
		_raw_name: &str,
		_candidate_name: &str,
		_entity_type: &EntityType,
		_candidate_id: &str,
	) -> Result<LlmVerdict> {
		Err(crate::error::ResolutionError::ProviderUnavailable(
			"no LLM provider configured".to_string(),
		))
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[tokio::test]
	async fn noop_provider_is_unavailable() {
		let provider = NoopLlmProvider;
		assert!(!provider.available().await);
		let err = provider
			.enrich("Acme", "Acme Corp", &EntityType::Company, "e-1")
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			crate::error::ResolutionError::ProviderUnavailable(_)
		));
	}

	#[test]
	fn verdict_serde_round_trip() {
		let verdict = LlmVerdict {
			score: 0.87,
			decision: MatchOutcome::AutoMerge,
			reasoning: "same legal entity".to_string(),
		};
		let json = serde_json::to_string(&verdict).unwrap();
		let back: LlmVerdict = serde_json::from_str(&json).unwrap();
		assert_eq!(back.decision, MatchOutcome::AutoMerge);
		assert!((back.score - 0.87).abs() < 1e-9);
	}
}
