//! HTTP-backed LLM provider.
//!
//! Speaks a small JSON contract: POST the mention pair, get back
//! `{score, decision, reasoning}`. Transport resilience (rate limiting,
//! retries, circuit breaking) lives in [`ResilientLlmClient`].

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ResolutionError, Result};
use crate::model::EntityType;

use super::client::{LlmClientError, LlmProviderConfig, ResilientLlmClient};
use super::{LlmProvider, LlmVerdict};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrichRequest<'a> {
	raw_name: &'a str,
	candidate_name: &'a str,
	#[serde(rename = "type")]
	entity_type: &'a str,
	candidate_id: &'a str,
}

pub struct HttpLlmProvider {
	client: ResilientLlmClient,
}

impl HttpLlmProvider {
	pub fn new(config: LlmProviderConfig) -> Self {
		Self {
			client: ResilientLlmClient::new(config),
		}
	}
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
	async fn available(&self) -> bool {
		self.client.healthy().await
	}

	async fn enrich(
		&self,
		raw_name: &str,
		candidate_name: &str,
		entity_type: &EntityType,
		candidate_id: &str,
	) -> Result<LlmVerdict> {
		let request = EnrichRequest {
			raw_name,
			candidate_name,
			entity_type: entity_type.as_label(),
			candidate_id,
		};
		let body = serde_json::to_string(&request)
			.map_err(|e| ResolutionError::Internal(format!("unencodable enrich request: {e}")))?;

		let bytes = self.client.post_enrich(body).await.map_err(classify)?;
		let verdict: LlmVerdict = serde_json::from_slice(&bytes).map_err(|e| {
			ResolutionError::ProviderUnavailable(format!("malformed enrich response: {e}"))
		})?;

		if !(0.0..=1.0).contains(&verdict.score) {
			return Err(ResolutionError::ProviderUnavailable(format!(
				"enrich score {} outside [0, 1]",
				verdict.score
			)));
		}
		Ok(verdict)
	}
}

fn classify(error: LlmClientError) -> ResolutionError {
	ResolutionError::ProviderUnavailable(error.to_string())
}
