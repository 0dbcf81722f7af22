//! Review queue integration.
//!
//! REVIEW outcomes are submitted as [`ReviewItem`]s for human adjudication.
//! Approval merges the source entity into the candidate through the merge
//! engine, so an approved review carries the same provenance (synonym,
//! duplicate record, ledger entry, audit chain) as an automatic merge.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{ResolutionError, Result};
use crate::merge::{MergeEngine, MergeOutcome, MergeRequest};
use crate::model::{MatchOutcome, ReviewItem, ReviewStatus};
use crate::repo::ReviewRepo;

pub struct ReviewService {
	queue: Arc<dyn ReviewRepo>,
	merge_engine: MergeEngine,
	source_system: String,
}

impl ReviewService {
	pub fn new(
		queue: Arc<dyn ReviewRepo>,
		merge_engine: MergeEngine,
		source_system: impl Into<String>,
	) -> Self {
		Self {
			queue,
			merge_engine,
			source_system: source_system.into(),
		}
	}

	pub async fn get_pending(&self, offset: usize, limit: usize) -> Result<Vec<ReviewItem>> {
		self.queue.get_pending(offset, limit).await
	}

	async fn load_pending(&self, id: &str) -> Result<ReviewItem> {
		let item = self
			.queue
			.find_by_id(id)
			.await?
			.ok_or_else(|| ResolutionError::NotFound(format!("review item {id}")))?;
		if item.status != ReviewStatus::Pending {
			return Err(ResolutionError::IllegalState(format!(
				"review item {id} already adjudicated"
			)));
		}
		Ok(item)
	}

	/// Approve: merge the source entity into the candidate, then mark the
	/// item. A failed merge leaves the item pending for retry.
	pub async fn approve(&self, id: &str, actor: &str) -> Result<MergeOutcome> {
		let item = self.load_pending(id).await?;
		let outcome = self
			.merge_engine
			.merge(MergeRequest {
				source_id: item.source_entity_id.clone(),
				target_id: item.candidate_entity_id.clone(),
				confidence: item.similarity_score,
				decision: MatchOutcome::Review,
				triggered_by: actor.to_string(),
				reasoning: format!("review {id} approved"),
				source_system: self.source_system.clone(),
				correlation_id: None,
				strategy: Default::default(),
			})
			.await?;
		self.queue
			.set_status(id, ReviewStatus::Approved, actor, Utc::now())
			.await?;
		info!(review = id, actor, "review approved and merged");
		Ok(outcome)
	}

	pub async fn reject(&self, id: &str, actor: &str) -> Result<()> {
		self.load_pending(id).await?;
		self.queue
			.set_status(id, ReviewStatus::Rejected, actor, Utc::now())
			.await?;
		info!(review = id, actor, "review rejected");
		Ok(())
	}
}
