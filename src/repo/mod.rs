//! Repository capabilities over the graph collaborator.
//!
//! Each repository is a thin, parameterized Cypher surface: the traits here
//! are the seams, the `cypher` submodule holds the AGE-backed
//! implementations, and `crate::store::memory` supplies in-process
//! implementations for embedded use and hermetic tests.

pub mod cypher;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
	AuditEntry, CanonicalResolver, DuplicateEntity, Entity, EntityType, LibraryRelationship,
	MatchDecisionRecord, MergeRecord, ReviewItem, ReviewStatus, Synonym,
};

/// Hop bound when following `MERGED_INTO*`. The graph invariant (a MERGED
/// entity points at an ACTIVE one) keeps real chains short; the bound guards
/// against corrupted data looping forever.
pub const CANONICAL_HOP_BOUND: usize = 64;

#[async_trait]
pub trait EntityRepo: Send + Sync {
	async fn create(&self, entity: &Entity) -> Result<()>;

	async fn find_by_id(&self, id: &str) -> Result<Option<Entity>>;

	/// Exact lookup on `(normalized_name, type)` among ACTIVE entities, in
	/// insertion order.
	async fn find_by_normalized_name(
		&self,
		normalized: &str,
		entity_type: &EntityType,
	) -> Result<Vec<Entity>>;

	/// Full scan of ACTIVE entities of one type; the blocking-index fallback.
	async fn find_active_by_type(&self, entity_type: &EntityType) -> Result<Vec<Entity>>;

	/// Transition ACTIVE → MERGED and create the
	/// `MERGED_INTO {confidence, reason, mergedAt}` edge.
	async fn set_merged(
		&self,
		source_id: &str,
		target_id: &str,
		confidence: f64,
		reason: &str,
		merged_at: DateTime<Utc>,
	) -> Result<()>;

	/// Compensation for [`set_merged`]: drop the edge, restore ACTIVE.
	///
	/// [`set_merged`]: EntityRepo::set_merged
	async fn unset_merged(&self, source_id: &str) -> Result<()>;

	/// Current canonical id: the end of the `MERGED_INTO*` chain.
	/// `NotFound` when no entity has this id.
	async fn canonical_id(&self, id: &str) -> Result<String>;

	/// Index an entity under its blocking keys.
	async fn add_blocking_keys(&self, entity_id: &str, keys: &[String]) -> Result<()>;

	/// Union of the ACTIVE candidate sets of all given keys, restricted to
	/// one type, deduplicated, in first-seen order.
	async fn find_by_blocking_keys(
		&self,
		keys: &[String],
		entity_type: &EntityType,
	) -> Result<Vec<Entity>>;
}

#[async_trait]
pub trait SynonymRepo: Send + Sync {
	/// Attach a synonym to an entity via `SYNONYM_OF`.
	async fn create(&self, entity_id: &str, synonym: &Synonym) -> Result<()>;

	async fn delete(&self, synonym_id: &str) -> Result<()>;

	/// Look up a synonym by `(normalized_value, type)` together with its
	/// owning ACTIVE entity.
	async fn find_by_normalized_value(
		&self,
		normalized: &str,
		entity_type: &EntityType,
	) -> Result<Option<(Synonym, Entity)>>;

	async fn find_by_entity(&self, entity_id: &str) -> Result<Vec<Synonym>>;

	/// Case-insensitive check whether an equivalent synonym value already
	/// hangs off the entity.
	async fn exists_with_value(&self, entity_id: &str, value: &str) -> Result<bool>;

	/// Reinforce on re-match: `support_count += 1`,
	/// `last_confirmed_at = at`.
	async fn reinforce(&self, synonym_id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait DuplicateRepo: Send + Sync {
	/// Record a source-side name that merged into `entity_id` via
	/// `DUPLICATE_OF`.
	async fn create(&self, entity_id: &str, duplicate: &DuplicateEntity) -> Result<()>;

	async fn delete(&self, duplicate_id: &str) -> Result<()>;
}

#[async_trait]
pub trait RelationshipRepo: Send + Sync {
	async fn create(&self, relationship: &LibraryRelationship) -> Result<()>;

	async fn find_by_id(&self, id: &str) -> Result<Option<LibraryRelationship>>;

	/// Library relationships with the entity as either endpoint.
	async fn find_by_entity(&self, entity_id: &str) -> Result<Vec<LibraryRelationship>>;

	/// Redirect every library relationship endpoint from `from` to `to`,
	/// preserving id, type, properties, created_at, and created_by. Returns
	/// the ids of the migrated relationships.
	async fn redirect_endpoints(&self, from: &str, to: &str) -> Result<Vec<String>>;

	/// Compensation for [`redirect_endpoints`]: move the named relationships'
	/// endpoints back from `to` to `from`.
	///
	/// [`redirect_endpoints`]: RelationshipRepo::redirect_endpoints
	async fn redirect_back(&self, relationship_ids: &[String], from: &str, to: &str)
	-> Result<()>;

	/// Migrate non-library edges (both directions) whose other endpoint is
	/// not `target`, copying type and properties. Returns the number of
	/// migrated edges.
	async fn migrate_foreign_edges(&self, source_id: &str, target_id: &str) -> Result<u64>;

	/// Best-effort reverse of [`migrate_foreign_edges`]; edge identity is by
	/// reconstruction.
	///
	/// [`migrate_foreign_edges`]: RelationshipRepo::migrate_foreign_edges
	async fn restore_foreign_edges(&self, source_id: &str, target_id: &str) -> Result<u64>;
}

/// One page of an entity's audit trail. The cursor is `(timestamp, id)`,
/// giving a monotonic total order.
#[derive(Debug, Clone)]
pub struct AuditPage {
	pub entries: Vec<AuditEntry>,
	pub next_cursor: Option<(DateTime<Utc>, String)>,
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
	/// Append-only.
	async fn record(&self, entry: &AuditEntry) -> Result<()>;

	/// Entity-scoped time-range query, oldest first.
	async fn find_by_entity(
		&self,
		entity_id: &str,
		since: Option<DateTime<Utc>>,
		until: Option<DateTime<Utc>>,
	) -> Result<Vec<AuditEntry>>;

	/// Cursor-paginated trail ordered by `(timestamp, id)`.
	async fn trail(
		&self,
		entity_id: &str,
		cursor: Option<(DateTime<Utc>, String)>,
		limit: usize,
	) -> Result<AuditPage>;
}

#[async_trait]
pub trait MergeLedgerRepo: Send + Sync {
	/// Append-only.
	async fn record(&self, record: &MergeRecord) -> Result<()>;

	/// Every merge involving the entity as source or target, oldest first.
	async fn history_for(&self, entity_id: &str) -> Result<Vec<MergeRecord>>;
}

#[async_trait]
pub trait DecisionRepo: Send + Sync {
	/// Persist all candidate evaluations for one call. Must complete before
	/// any merge or synonym mutation for that call.
	async fn record_all(&self, records: &[MatchDecisionRecord]) -> Result<()>;

	async fn find_by_temp_id(&self, input_entity_temp_id: &str)
	-> Result<Vec<MatchDecisionRecord>>;
}

#[async_trait]
pub trait ReviewRepo: Send + Sync {
	async fn submit(&self, item: &ReviewItem) -> Result<()>;

	async fn find_by_id(&self, id: &str) -> Result<Option<ReviewItem>>;

	/// Pending items, oldest first.
	async fn get_pending(&self, offset: usize, limit: usize) -> Result<Vec<ReviewItem>>;

	async fn set_status(
		&self,
		id: &str,
		status: ReviewStatus,
		resolved_by: &str,
		resolved_at: DateTime<Utc>,
	) -> Result<()>;
}

/// The repository bundle the orchestrator and merge engine are composed from.
/// All members are required; optional capabilities (cache, lock, LLM, review
/// queue) live on the resolver builder instead.
#[derive(Clone)]
pub struct Repositories {
	pub entities: Arc<dyn EntityRepo>,
	pub synonyms: Arc<dyn SynonymRepo>,
	pub duplicates: Arc<dyn DuplicateRepo>,
	pub relationships: Arc<dyn RelationshipRepo>,
	pub audit: Arc<dyn AuditRepo>,
	pub ledger: Arc<dyn MergeLedgerRepo>,
	pub decisions: Arc<dyn DecisionRepo>,
}

impl Repositories {
	/// Cypher-backed repositories over a shared graph store.
	pub fn over_graph(store: Arc<dyn crate::graph::GraphStore>) -> Self {
		Self {
			entities: Arc::new(cypher::CypherEntityRepo::new(store.clone())),
			synonyms: Arc::new(cypher::CypherSynonymRepo::new(store.clone())),
			duplicates: Arc::new(cypher::CypherDuplicateRepo::new(store.clone())),
			relationships: Arc::new(cypher::CypherRelationshipRepo::new(store.clone())),
			audit: Arc::new(cypher::CypherAuditRepo::new(store.clone())),
			ledger: Arc::new(cypher::CypherMergeLedgerRepo::new(store.clone())),
			decisions: Arc::new(cypher::CypherDecisionRepo::new(store)),
		}
	}

	/// A resolver capability bound to the entity repository.
	pub fn canonical_resolver(&self) -> Arc<dyn CanonicalResolver> {
		Arc::new(RepoCanonicalResolver {
			entities: self.entities.clone(),
		})
	}
}

struct RepoCanonicalResolver {
	entities: Arc<dyn EntityRepo>,
}

#[async_trait]
impl CanonicalResolver for RepoCanonicalResolver {
	async fn canonical_id(&self, id: &str) -> Result<String> {
		self.entities.canonical_id(id).await
	}
}
