//! Domain model for the resolution graph.
//!
//! These types are read-only snapshots of graph-owned state: the store is the
//! source of truth for entities and synonyms, and in-process values are never
//! mutated in place. Everything here serializes to the property shapes the
//! graph schema defines.

pub mod entity_ref;

pub use entity_ref::{CanonicalResolver, EntityRef};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::similarity::ScoreBreakdown;

/// Coarse entity type attached to every mention. The set is open: unknown
/// labels round-trip through [`EntityType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
	Company,
	Person,
	Product,
	Location,
	Other(String),
}

impl EntityType {
	/// Canonical uppercase label as stored in the graph.
	pub fn as_label(&self) -> &str {
		match self {
			EntityType::Company => "COMPANY",
			EntityType::Person => "PERSON",
			EntityType::Product => "PRODUCT",
			EntityType::Location => "LOCATION",
			EntityType::Other(s) => s.as_str(),
		}
	}
}

impl fmt::Display for EntityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_label())
	}
}

impl FromStr for EntityType {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		let upper = s.trim().to_uppercase();
		Ok(match upper.as_str() {
			"COMPANY" => EntityType::Company,
			"PERSON" => EntityType::Person,
			"PRODUCT" => EntityType::Product,
			"LOCATION" => EntityType::Location,
			_ => EntityType::Other(upper),
		})
	}
}

impl Serialize for EntityType {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_label())
	}
}

impl<'de> Deserialize<'de> for EntityType {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		EntityType::from_str(&s).map_err(D::Error::custom)
	}
}

/// Lifecycle status of an entity node. Transitions only ACTIVE → MERGED and
/// never back; a MERGED entity has exactly one outgoing MERGED_INTO edge to
/// an ACTIVE entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
	Active,
	Merged,
}

/// A canonical entity node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
	/// Immutable identifier (UUID string).
	pub id: String,
	/// Name as first seen.
	pub canonical_name: String,
	/// `Normalize(canonical_name, entity_type)` at creation time.
	pub normalized_name: String,
	#[serde(rename = "type")]
	pub entity_type: EntityType,
	/// Confidence in the canonical identity, in `[0, 1]`.
	pub confidence_score: f64,
	pub status: EntityStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Entity {
	pub fn is_active(&self) -> bool {
		self.status == EntityStatus::Active
	}
}

/// Origin of a synonym link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynonymSource {
	System,
	Human,
	Llm,
}

/// An alternative textual form attached to exactly one ACTIVE entity via
/// SYNONYM_OF. Re-matching a synonym reinforces it: `support_count` is
/// incremented and `last_confirmed_at` refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synonym {
	pub id: String,
	/// Raw value as observed.
	pub value: String,
	pub normalized_value: String,
	pub source: SynonymSource,
	pub confidence: f64,
	pub created_at: DateTime<Utc>,
	pub last_confirmed_at: DateTime<Utc>,
	pub support_count: u64,
}

/// Audit record of a source-side name that merged into a canonical entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateEntity {
	pub id: String,
	pub original_name: String,
	pub normalized_name: String,
	pub source_system: String,
	pub created_at: DateTime<Utc>,
}

/// Decision outcome for a candidate evaluation or a whole resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
	AutoMerge,
	Synonym,
	Review,
	NoMatch,
}

impl fmt::Display for MatchOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			MatchOutcome::AutoMerge => "AUTO_MERGE",
			MatchOutcome::Synonym => "SYNONYM",
			MatchOutcome::Review => "REVIEW",
			MatchOutcome::NoMatch => "NO_MATCH",
		};
		f.write_str(s)
	}
}

/// Thresholds in effect for one resolution call. Invariant:
/// `auto_merge >= synonym >= review`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
	pub auto_merge: f64,
	pub synonym: f64,
	pub review: f64,
}

impl Thresholds {
	/// Map a composite score to its unique outcome.
	pub fn outcome_for(&self, score: f64) -> MatchOutcome {
		if score >= self.auto_merge {
			MatchOutcome::AutoMerge
		} else if score >= self.synonym {
			MatchOutcome::Synonym
		} else if score >= self.review {
			MatchOutcome::Review
		} else {
			MatchOutcome::NoMatch
		}
	}
}

/// Append-only ledger entry recording one merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecord {
	pub id: String,
	pub source_entity_id: String,
	pub target_entity_id: String,
	/// Names captured at merge time; the source node's name may later be
	/// unreachable without traversing MERGED_INTO.
	pub source_name: String,
	pub target_name: String,
	pub confidence: f64,
	pub decision: MatchOutcome,
	pub triggered_by: String,
	pub reasoning: String,
	pub merged_at: DateTime<Utc>,
}

/// Persisted evaluation of a single fuzzy-match candidate. Every candidate
/// considered during one resolution call produces exactly one record, all
/// sharing the same `input_entity_temp_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDecisionRecord {
	pub id: String,
	/// Correlates all candidate evaluations for one call.
	pub input_entity_temp_id: String,
	pub candidate_entity_id: String,
	#[serde(rename = "type")]
	pub entity_type: EntityType,
	pub scores: ScoreBreakdown,
	pub final_score: f64,
	pub thresholds: Thresholds,
	pub outcome: MatchOutcome,
	/// Who produced the evaluation; `SYSTEM` unless a human or LLM reviewed.
	pub evaluator: String,
	pub evaluated_at: DateTime<Utc>,
}

/// A relationship created through the library so merges can migrate it.
/// Endpoints must reference entities whose current canonical is ACTIVE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRelationship {
	pub id: String,
	pub source_entity_id: String,
	pub target_entity_id: String,
	/// Identifier charset `[A-Za-z0-9_]+`. Stored as `type` on the edge.
	#[serde(rename = "type")]
	pub relationship_type: String,
	pub properties: Map<String, Value>,
	pub created_at: DateTime<Utc>,
	pub created_by: String,
}

/// Enumerated audit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
	EntityCreated,
	EntityUpdated,
	EntityMerged,
	SynonymCreated,
	DuplicateCreated,
	RelationshipsMigrated,
	RelationshipCreated,
	LlmEnrichmentRequested,
	LlmEnrichmentCompleted,
	ManualReviewRequested,
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AuditAction::EntityCreated => "ENTITY_CREATED",
			AuditAction::EntityUpdated => "ENTITY_UPDATED",
			AuditAction::EntityMerged => "ENTITY_MERGED",
			AuditAction::SynonymCreated => "SYNONYM_CREATED",
			AuditAction::DuplicateCreated => "DUPLICATE_CREATED",
			AuditAction::RelationshipsMigrated => "RELATIONSHIPS_MIGRATED",
			AuditAction::RelationshipCreated => "RELATIONSHIP_CREATED",
			AuditAction::LlmEnrichmentRequested => "LLM_ENRICHMENT_REQUESTED",
			AuditAction::LlmEnrichmentCompleted => "LLM_ENRICHMENT_COMPLETED",
			AuditAction::ManualReviewRequested => "MANUAL_REVIEW_REQUESTED",
		};
		f.write_str(s)
	}
}

/// Append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
	pub id: String,
	pub action: AuditAction,
	pub entity_id: String,
	pub actor_id: String,
	pub details: Map<String, Value>,
	pub timestamp: DateTime<Utc>,
}

/// Adjudication state of a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
	Pending,
	Approved,
	Rejected,
}

/// A REVIEW outcome queued for human adjudication. Approval merges the
/// source entity into the candidate via the merge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
	pub id: String,
	pub source_entity_id: String,
	pub candidate_entity_id: String,
	pub input_name: String,
	pub candidate_name: String,
	#[serde(rename = "type")]
	pub entity_type: EntityType,
	pub similarity_score: f64,
	pub status: ReviewStatus,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub resolved_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub resolved_by: Option<String>,
}
