//! Saga-style merge engine.
//!
//! The graph store offers no cross-statement atomicity, so a merge runs as a
//! sequence of steps, each registering a compensation. On any step failure
//! the compensations run in reverse order; compensation failures are
//! collected and surfaced rather than short-circuiting. Compensations are
//! pure functions of the step's outputs (synonym id, duplicate id, migrated
//! relationship ids), never recomputed from live state.
//!
//! Steps, in order:
//!
//! 1. Synonym from the source's canonical name on the target (skipped when an
//!    equivalent value already exists, case-insensitively).
//! 2. DuplicateEntity record linked to the target.
//! 3. Library-relationship endpoint migration from source to target.
//! 4. Foreign (non-library) edge migration.
//! 5. Source status ACTIVE → MERGED plus the MERGED_INTO edge.
//! 6. Merge ledger record; ENTITY_MERGED audit.

use chrono::Utc;
use serde_json::{Map, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ResolutionError, Result};
use crate::model::{
	AuditAction, AuditEntry, DuplicateEntity, Entity, EntityStatus, MatchOutcome, MergeRecord,
	Synonym, SynonymSource,
};
use crate::repo::Repositories;

/// Which side survives a merge. The resolution pipeline always keeps the
/// matched (target) entity as canonical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeStrategy {
	#[default]
	KeepTarget,
}

/// One merge invocation.
#[derive(Debug, Clone)]
pub struct MergeRequest {
	pub source_id: String,
	pub target_id: String,
	pub confidence: f64,
	pub decision: MatchOutcome,
	pub triggered_by: String,
	pub reasoning: String,
	pub source_system: String,
	/// Threaded into the audit chain of the owning resolution call.
	pub correlation_id: Option<String>,
	pub strategy: MergeStrategy,
}

impl MergeRequest {
	pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
		Self {
			source_id: source_id.into(),
			target_id: target_id.into(),
			confidence: 1.0,
			decision: MatchOutcome::AutoMerge,
			triggered_by: "SYSTEM".to_string(),
			reasoning: String::new(),
			source_system: "mimir".to_string(),
			correlation_id: None,
			strategy: MergeStrategy::KeepTarget,
		}
	}
}

/// Successful merge summary.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
	pub record: MergeRecord,
	/// Id of the synonym created from the source name, when one was.
	pub synonym_id: Option<String>,
	pub migrated_relationships: Vec<String>,
	pub migrated_edges: u64,
}

/// Reversal action registered by a completed step.
enum Compensation {
	DeleteSynonym {
		synonym_id: String,
	},
	DeleteDuplicate {
		duplicate_id: String,
	},
	RedirectRelationshipsBack {
		relationship_ids: Vec<String>,
		source_id: String,
		target_id: String,
	},
	RestoreForeignEdges {
		source_id: String,
		target_id: String,
	},
	ReactivateSource {
		source_id: String,
	},
}

impl Compensation {
	async fn run(&self, repos: &Repositories) -> Result<()> {
		match self {
			Compensation::DeleteSynonym { synonym_id } => repos.synonyms.delete(synonym_id).await,
			Compensation::DeleteDuplicate { duplicate_id } => {
				repos.duplicates.delete(duplicate_id).await
			}
			Compensation::RedirectRelationshipsBack {
				relationship_ids,
				source_id,
				target_id,
			} => {
				repos
					.relationships
					.redirect_back(relationship_ids, source_id, target_id)
					.await
			}
			Compensation::RestoreForeignEdges {
				source_id,
				target_id,
			} => repos
				.relationships
				.restore_foreign_edges(source_id, target_id)
				.await
				.map(|_| ()),
			Compensation::ReactivateSource { source_id } => {
				repos.entities.unset_merged(source_id).await
			}
		}
	}

	fn describe(&self) -> &'static str {
		match self {
			Compensation::DeleteSynonym { .. } => "delete synonym",
			Compensation::DeleteDuplicate { .. } => "delete duplicate record",
			Compensation::RedirectRelationshipsBack { .. } => "redirect relationships back",
			Compensation::RestoreForeignEdges { .. } => "restore foreign edges",
			Compensation::ReactivateSource { .. } => "reactivate source entity",
		}
	}
}

#[derive(Clone)]
pub struct MergeEngine {
	repos: Repositories,
}

impl MergeEngine {
	pub fn new(repos: Repositories) -> Self {
		Self { repos }
	}

	/// Whether the pair currently satisfies the merge preconditions: both
	/// exist, both ACTIVE, same type.
	pub async fn can_merge(&self, source_id: &str, target_id: &str) -> Result<bool> {
		Ok(self.load_pair(source_id, target_id).await?.is_some())
	}

	/// Every ledger entry involving the entity, oldest first.
	pub async fn merge_history(&self, entity_id: &str) -> Result<Vec<MergeRecord>> {
		self.repos.ledger.history_for(entity_id).await
	}

	async fn load_pair(&self, source_id: &str, target_id: &str) -> Result<Option<(Entity, Entity)>> {
		let Some(source) = self.repos.entities.find_by_id(source_id).await? else {
			return Ok(None);
		};
		let Some(target) = self.repos.entities.find_by_id(target_id).await? else {
			return Ok(None);
		};
		let valid = source.status == EntityStatus::Active
			&& target.status == EntityStatus::Active
			&& source.entity_type == target.entity_type
			&& source.id != target.id;
		Ok(valid.then_some((source, target)))
	}

	/// Merge `source` into `target`, compensating on failure.
	pub async fn merge(&self, request: MergeRequest) -> Result<MergeOutcome> {
		let MergeStrategy::KeepTarget = request.strategy;

		let Some((source, target)) = self.load_pair(&request.source_id, &request.target_id).await?
		else {
			return Err(self
				.precondition_failure(&request.source_id, &request.target_id)
				.await);
		};

		let mut compensations: Vec<Compensation> = Vec::new();
		match self.run_steps(&request, &source, &target, &mut compensations).await {
			Ok(outcome) => {
				// Committed: compensations are dropped, never run.
				info!(
					source = %source.id,
					target = %target.id,
					relationships = outcome.migrated_relationships.len(),
					edges = outcome.migrated_edges,
					"merged entity"
				);
				self.audit_success(&request, &source, &target, &outcome).await;
				Ok(outcome)
			}
			Err(step_error) => Err(self.compensate(compensations, step_error).await),
		}
	}

	async fn run_steps(
		&self,
		request: &MergeRequest,
		source: &Entity,
		target: &Entity,
		compensations: &mut Vec<Compensation>,
	) -> Result<MergeOutcome> {
		let now = Utc::now();

		// Step 1: the source's canonical name becomes a synonym of the target.
		let mut synonym_id = None;
		if !self
			.repos
			.synonyms
			.exists_with_value(&target.id, &source.canonical_name)
			.await?
		{
			let synonym = Synonym {
				id: Uuid::new_v4().to_string(),
				value: source.canonical_name.clone(),
				normalized_value: source.normalized_name.clone(),
				source: SynonymSource::System,
				confidence: request.confidence,
				created_at: now,
				last_confirmed_at: now,
				support_count: 0,
			};
			self.repos.synonyms.create(&target.id, &synonym).await?;
			compensations.push(Compensation::DeleteSynonym {
				synonym_id: synonym.id.clone(),
			});
			synonym_id = Some(synonym.id);
		}

		// Step 2: duplicate record for provenance.
		let duplicate = DuplicateEntity {
			id: Uuid::new_v4().to_string(),
			original_name: source.canonical_name.clone(),
			normalized_name: source.normalized_name.clone(),
			source_system: request.source_system.clone(),
			created_at: now,
		};
		self.repos.duplicates.create(&target.id, &duplicate).await?;
		compensations.push(Compensation::DeleteDuplicate {
			duplicate_id: duplicate.id.clone(),
		});

		// Step 3: library-managed relationships follow the canonical entity.
		let migrated_relationships = self
			.repos
			.relationships
			.redirect_endpoints(&source.id, &target.id)
			.await?;
		if !migrated_relationships.is_empty() {
			compensations.push(Compensation::RedirectRelationshipsBack {
				relationship_ids: migrated_relationships.clone(),
				source_id: source.id.clone(),
				target_id: target.id.clone(),
			});
		}

		// Step 4: foreign edges, both directions.
		let migrated_edges = self
			.repos
			.relationships
			.migrate_foreign_edges(&source.id, &target.id)
			.await?;
		if migrated_edges > 0 {
			compensations.push(Compensation::RestoreForeignEdges {
				source_id: source.id.clone(),
				target_id: target.id.clone(),
			});
		}

		// Step 5: the status transition and provenance edge.
		self.repos
			.entities
			.set_merged(&source.id, &target.id, request.confidence, &request.reasoning, now)
			.await?;
		compensations.push(Compensation::ReactivateSource {
			source_id: source.id.clone(),
		});

		// Step 6: the append-only ledger.
		let record = MergeRecord {
			id: Uuid::new_v4().to_string(),
			source_entity_id: source.id.clone(),
			target_entity_id: target.id.clone(),
			source_name: source.canonical_name.clone(),
			target_name: target.canonical_name.clone(),
			confidence: request.confidence,
			decision: request.decision,
			triggered_by: request.triggered_by.clone(),
			reasoning: request.reasoning.clone(),
			merged_at: now,
		};
		self.repos.ledger.record(&record).await?;

		Ok(MergeOutcome {
			record,
			synonym_id,
			migrated_relationships,
			migrated_edges,
		})
	}

	async fn compensate(
		&self,
		compensations: Vec<Compensation>,
		step_error: ResolutionError,
	) -> ResolutionError {
		let mut step_errors = vec![step_error.to_string()];
		for compensation in compensations.iter().rev() {
			if let Err(e) = compensation.run(&self.repos).await {
				warn!(
					compensation = compensation.describe(),
					error = %e,
					"merge compensation failed"
				);
				step_errors.push(format!("compensation '{}' failed: {e}", compensation.describe()));
			}
		}
		ResolutionError::MergeFailed {
			summary: step_error.to_string(),
			step_errors,
		}
	}

	async fn precondition_failure(&self, source_id: &str, target_id: &str) -> ResolutionError {
		let describe = |entity: Option<&Entity>| match entity {
			None => "missing".to_string(),
			Some(e) => format!("{:?} {}", e.status, e.entity_type),
		};
		let source = self.repos.entities.find_by_id(source_id).await.ok().flatten();
		let target = self.repos.entities.find_by_id(target_id).await.ok().flatten();
		ResolutionError::MergeFailed {
			summary: format!(
				"merge preconditions violated: source {source_id} is {}, target {target_id} is {}",
				describe(source.as_ref()),
				describe(target.as_ref())
			),
			step_errors: Vec::new(),
		}
	}

	/// Audit is best-effort: failures are logged, never unwound.
	async fn audit_success(
		&self,
		request: &MergeRequest,
		source: &Entity,
		target: &Entity,
		outcome: &MergeOutcome,
	) {
		let mut base = Map::new();
		if let Some(correlation_id) = &request.correlation_id {
			base.insert("correlationId".to_string(), json!(correlation_id));
		}
		base.insert("sourceSystem".to_string(), json!(request.source_system));

		if let Some(synonym_id) = &outcome.synonym_id {
			let mut details = base.clone();
			details.insert("synonymId".to_string(), json!(synonym_id));
			details.insert("value".to_string(), json!(source.canonical_name));
			self.audit(AuditAction::SynonymCreated, &target.id, &request.triggered_by, details)
				.await;
		}

		let mut details = base.clone();
		details.insert("originalName".to_string(), json!(source.canonical_name));
		self.audit(AuditAction::DuplicateCreated, &target.id, &request.triggered_by, details)
			.await;

		if !outcome.migrated_relationships.is_empty() || outcome.migrated_edges > 0 {
			let mut details = base.clone();
			details.insert(
				"relationshipIds".to_string(),
				json!(outcome.migrated_relationships),
			);
			details.insert("foreignEdges".to_string(), json!(outcome.migrated_edges));
			details.insert("from".to_string(), json!(source.id));
			self.audit(
				AuditAction::RelationshipsMigrated,
				&target.id,
				&request.triggered_by,
				details,
			)
			.await;
		}

		let mut details = base;
		details.insert("targetId".to_string(), json!(target.id));
		details.insert("confidence".to_string(), json!(request.confidence));
		details.insert("reasoning".to_string(), json!(request.reasoning));
		self.audit(AuditAction::EntityMerged, &source.id, &request.triggered_by, details)
			.await;
	}

	async fn audit(
		&self,
		action: AuditAction,
		entity_id: &str,
		actor_id: &str,
		details: Map<String, serde_json::Value>,
	) {
		let entry = AuditEntry {
			id: Uuid::new_v4().to_string(),
			action,
			entity_id: entity_id.to_string(),
			actor_id: actor_id.to_string(),
			details,
			timestamp: Utc::now(),
		};
		if let Err(e) = self.repos.audit.record(&entry).await {
			warn!(action = %action, entity_id, error = %e, "audit record failed");
		}
	}
}
