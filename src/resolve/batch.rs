//! Batch resolution context.
//!
//! Deduplicates within the batch on `(lowercase(name), type)`, defers
//! relationship creation to commit, and commits pending relationships in
//! chunks, collecting per-item errors instead of aborting the batch.
//! Entities are persisted during `resolve`, so commit is idempotent with
//! respect to resolution; `rollback` discards only the pending
//! relationships.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ResolutionOptions;
use crate::error::{ResolutionError, Result};
use crate::model::{AuditAction, AuditEntry, EntityRef, EntityType, LibraryRelationship};

use super::{EntityResolver, ResolutionResult};

static RELATIONSHIP_TYPE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("relationship type pattern is valid"));

/// In-batch dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
	name_lower: String,
	entity_type: EntityType,
}

/// A relationship queued for commit.
struct PendingRelationship {
	source: EntityRef,
	target: EntityRef,
	relationship_type: String,
	properties: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
	Open,
	Committed,
	RolledBack,
}

/// One failed batch item.
#[derive(Debug, Clone)]
pub struct BatchItemError {
	pub relationship_type: String,
	pub message: String,
}

/// Commit summary. The batch reports success when at least one item
/// succeeded; individual failures are in `errors`.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
	pub total_entities_resolved: usize,
	pub new_entities_created: usize,
	pub entities_merged: usize,
	pub relationships_created: usize,
	pub errors: Vec<BatchItemError>,
}

pub struct BatchContext {
	resolver: Arc<EntityResolver>,
	options: ResolutionOptions,
	resolved: DashMap<BatchKey, ResolutionResult>,
	pending: Mutex<Vec<PendingRelationship>>,
	state: Mutex<BatchState>,
	committed: Mutex<Option<BatchResult>>,
	cancelled: AtomicBool,
}

impl BatchContext {
	/// A context bound to a resolver, using the resolver's own options.
	pub fn new(resolver: Arc<EntityResolver>) -> Self {
		let options = resolver.options().clone();
		Self::with_options(resolver, options)
	}

	pub fn with_options(resolver: Arc<EntityResolver>, options: ResolutionOptions) -> Self {
		Self {
			resolver,
			options,
			resolved: DashMap::new(),
			pending: Mutex::new(Vec::new()),
			state: Mutex::new(BatchState::Open),
			committed: Mutex::new(None),
			cancelled: AtomicBool::new(false),
		}
	}

	/// Request cancellation; commit checks between chunks.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::Relaxed);
	}

	async fn ensure_open(&self) -> Result<()> {
		let state = *self.state.lock().await;
		match state {
			BatchState::Open => Ok(()),
			BatchState::Committed => Err(ResolutionError::IllegalState(
				"batch context already committed".to_string(),
			)),
			BatchState::RolledBack => Err(ResolutionError::IllegalState(
				"batch context already rolled back".to_string(),
			)),
		}
	}

	/// Resolve within the batch. Case variants of an already-resolved name
	/// are free and return the same per-batch result; only new keys count
	/// against `max_batch_size`.
	pub async fn resolve(
		&self,
		name: &str,
		entity_type: EntityType,
	) -> Result<ResolutionResult> {
		self.ensure_open().await?;
		let key = BatchKey {
			name_lower: name.trim().to_lowercase(),
			entity_type: entity_type.clone(),
		};
		if let Some(hit) = self.resolved.get(&key) {
			return Ok(hit.clone());
		}
		if self.resolved.len() >= self.options.max_batch_size {
			return Err(ResolutionError::InvalidInput(format!(
				"batch size limit {} reached",
				self.options.max_batch_size
			)));
		}
		let result = self
			.resolver
			.resolve_with(name, entity_type, &self.options)
			.await?;
		// Two concurrent resolvers of the same key keep the first-inserted
		// result, matching the dedup contract.
		let entry = self.resolved.entry(key).or_insert(result);
		Ok(entry.clone())
	}

	/// Queue a relationship for commit. The type must match `[A-Za-z0-9_]+`.
	pub async fn create_relationship(
		&self,
		source: &EntityRef,
		target: &EntityRef,
		relationship_type: &str,
	) -> Result<()> {
		self.create_relationship_with(source, target, relationship_type, Map::new())
			.await
	}

	pub async fn create_relationship_with(
		&self,
		source: &EntityRef,
		target: &EntityRef,
		relationship_type: &str,
		properties: Map<String, Value>,
	) -> Result<()> {
		self.ensure_open().await?;
		if !RELATIONSHIP_TYPE.is_match(relationship_type) {
			return Err(ResolutionError::InvalidInput(format!(
				"relationship type {relationship_type:?} must match [A-Za-z0-9_]+"
			)));
		}
		let mut pending = self.pending.lock().await;
		pending.push(PendingRelationship {
			source: source.clone(),
			target: target.clone(),
			relationship_type: relationship_type.to_string(),
			properties,
		});
		Ok(())
	}

	/// Commit pending relationships in chunks of `batch_commit_chunk_size`,
	/// preserving insertion order within a chunk. Re-committing returns the
	/// prior summary.
	pub async fn commit(&self) -> Result<BatchResult> {
		{
			let state = *self.state.lock().await;
			if state == BatchState::Committed {
				let committed = self.committed.lock().await;
				return Ok(committed.clone().unwrap_or_default());
			}
			if state == BatchState::RolledBack {
				return Err(ResolutionError::IllegalState(
					"batch context already rolled back".to_string(),
				));
			}
		}

		let pending: Vec<PendingRelationship> = {
			let mut guard = self.pending.lock().await;
			guard.drain(..).collect()
		};

		let mut result = BatchResult {
			total_entities_resolved: self.resolved.len(),
			new_entities_created: self
				.resolved
				.iter()
				.filter(|r| r.value().is_new_entity)
				.count(),
			entities_merged: self
				.resolved
				.iter()
				.filter(|r| r.value().was_merged)
				.count(),
			..BatchResult::default()
		};

		let chunk_size = self.options.batch_commit_chunk_size.max(1);
		let mut position = 0usize;
		while position < pending.len() {
			// Cancellation is honored between chunks; remaining items are
			// reported rather than silently dropped.
			if self.cancelled.load(Ordering::Relaxed) {
				warn!(remaining = pending.len() - position, "batch commit cancelled");
				for item in &pending[position..] {
					result.errors.push(BatchItemError {
						relationship_type: item.relationship_type.clone(),
						message: "commit cancelled".to_string(),
					});
				}
				break;
			}
			let end = (position + chunk_size).min(pending.len());
			for item in &pending[position..end] {
				match self.create_one(item).await {
					Ok(()) => result.relationships_created += 1,
					Err(e) => {
						debug!(
							relationship_type = %item.relationship_type,
							error = %e,
							"pending relationship failed"
						);
						result.errors.push(BatchItemError {
							relationship_type: item.relationship_type.clone(),
							message: e.to_string(),
						});
					}
				}
			}
			position = end;
			tokio::task::yield_now().await;
		}

		info!(
			resolved = result.total_entities_resolved,
			created = result.new_entities_created,
			merged = result.entities_merged,
			relationships = result.relationships_created,
			errors = result.errors.len(),
			"batch committed"
		);

		*self.state.lock().await = BatchState::Committed;
		*self.committed.lock().await = Some(result.clone());
		Ok(result)
	}

	async fn create_one(&self, item: &PendingRelationship) -> Result<()> {
		// Endpoints resolve through their refs so relationships created after
		// an in-batch merge land on the surviving canonical entity.
		let source_id = item.source.canonical_id().await?;
		let target_id = item.target.canonical_id().await?;
		let relationship = LibraryRelationship {
			id: Uuid::new_v4().to_string(),
			source_entity_id: source_id.clone(),
			target_entity_id: target_id.clone(),
			relationship_type: item.relationship_type.clone(),
			properties: item.properties.clone(),
			created_at: Utc::now(),
			created_by: self.options.source_system.clone(),
		};
		self.resolver
			.repositories()
			.relationships
			.create(&relationship)
			.await?;

		let mut details = Map::new();
		details.insert("relationshipId".to_string(), json!(relationship.id));
		details.insert("type".to_string(), json!(relationship.relationship_type));
		details.insert("targetEntityId".to_string(), json!(target_id));
		let entry = AuditEntry {
			id: Uuid::new_v4().to_string(),
			action: AuditAction::RelationshipCreated,
			entity_id: source_id,
			actor_id: self.options.source_system.clone(),
			details,
			timestamp: Utc::now(),
		};
		if let Err(e) = self.resolver.repositories().audit.record(&entry).await {
			warn!(error = %e, "relationship audit record failed");
		}
		Ok(())
	}

	/// Discard pending relationships. Entities persisted during `resolve`
	/// are not undone; that is documented behavior, reconciled by later
	/// resolutions.
	pub async fn rollback(&self) -> Result<()> {
		self.ensure_open().await?;
		self.pending.lock().await.clear();
		*self.state.lock().await = BatchState::RolledBack;
		Ok(())
	}

	/// Auto-commits when neither committed nor rolled back.
	pub async fn close(&self) -> Result<Option<BatchResult>> {
		let state = *self.state.lock().await;
		match state {
			BatchState::Open => self.commit().await.map(Some),
			_ => Ok(None),
		}
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use crate::normalize::Normalizer;
	use crate::store::MemoryGraph;

	fn resolver(graph: &MemoryGraph) -> Arc<EntityResolver> {
		Arc::new(
			EntityResolver::new(
				graph.repositories(),
				Normalizer::with_default_rules(),
				ResolutionOptions::default(),
			)
			.expect("default options are valid"),
		)
	}

	#[tokio::test]
	async fn case_variants_deduplicate_within_the_batch() {
		let graph = MemoryGraph::new();
		let batch = BatchContext::new(resolver(&graph));
		let a = batch.resolve("Acme Corp", EntityType::Company).await.unwrap();
		let b = batch.resolve("ACME CORP", EntityType::Company).await.unwrap();
		let c = batch.resolve("acme corp", EntityType::Company).await.unwrap();
		assert_eq!(a.entity.id, b.entity.id);
		assert_eq!(b.entity.id, c.entity.id);
		assert_eq!(batch.commit().await.unwrap().total_entities_resolved, 1);
	}

	#[tokio::test]
	async fn max_batch_size_gates_only_new_keys() {
		let graph = MemoryGraph::new();
		let mut options = ResolutionOptions::default();
		options.max_batch_size = 2;
		let batch = BatchContext::with_options(resolver(&graph), options);

		batch.resolve("Alpha", EntityType::Company).await.unwrap();
		batch.resolve("Beta", EntityType::Company).await.unwrap();
		// Duplicate of an existing key stays free.
		batch.resolve("ALPHA", EntityType::Company).await.unwrap();
		let err = batch
			.resolve("Gamma", EntityType::Company)
			.await
			.unwrap_err();
		assert!(matches!(err, ResolutionError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn relationship_type_charset_is_enforced() {
		let graph = MemoryGraph::new();
		let batch = BatchContext::new(resolver(&graph));
		let a = batch.resolve("Alpha", EntityType::Company).await.unwrap();
		let b = batch.resolve("Beta", EntityType::Company).await.unwrap();
		assert!(
			batch
				.create_relationship(&a.entity_ref, &b.entity_ref, "PARTNER_OF")
				.await
				.is_ok()
		);
		let err = batch
			.create_relationship(&a.entity_ref, &b.entity_ref, "bad type!")
			.await
			.unwrap_err();
		assert!(matches!(err, ResolutionError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn commit_creates_relationships_and_is_idempotent() {
		let graph = MemoryGraph::new();
		let batch = BatchContext::new(resolver(&graph));
		let a = batch.resolve("Alpha", EntityType::Company).await.unwrap();
		let b = batch.resolve("Beta", EntityType::Company).await.unwrap();
		batch
			.create_relationship(&a.entity_ref, &b.entity_ref, "PARTNER")
			.await
			.unwrap();

		let first = batch.commit().await.unwrap();
		assert_eq!(first.relationships_created, 1);
		assert!(first.errors.is_empty());

		let again = batch.commit().await.unwrap();
		assert_eq!(again.relationships_created, 1);

		let rels = crate::repo::RelationshipRepo::find_by_entity(&graph, &a.entity.id)
			.await
			.unwrap();
		assert_eq!(rels.len(), 1);
		assert_eq!(rels[0].relationship_type, "PARTNER");
	}

	#[tokio::test]
	async fn operations_after_commit_fail_with_illegal_state() {
		let graph = MemoryGraph::new();
		let batch = BatchContext::new(resolver(&graph));
		batch.resolve("Alpha", EntityType::Company).await.unwrap();
		batch.commit().await.unwrap();

		let err = batch
			.resolve("Beta", EntityType::Company)
			.await
			.unwrap_err();
		assert!(matches!(err, ResolutionError::IllegalState(_)));
		assert!(batch.rollback().await.is_err());
	}

	#[tokio::test]
	async fn rollback_discards_pending_relationships() {
		let graph = MemoryGraph::new();
		let batch = BatchContext::new(resolver(&graph));
		let a = batch.resolve("Alpha", EntityType::Company).await.unwrap();
		let b = batch.resolve("Beta", EntityType::Company).await.unwrap();
		batch
			.create_relationship(&a.entity_ref, &b.entity_ref, "PARTNER")
			.await
			.unwrap();
		batch.rollback().await.unwrap();

		let rels = crate::repo::RelationshipRepo::find_by_entity(&graph, &a.entity.id)
			.await
			.unwrap();
		assert!(rels.is_empty());
		// Entities persisted during resolve remain.
		assert!(
			crate::repo::EntityRepo::find_by_id(&graph, &a.entity.id)
				.await
				.unwrap()
				.is_some()
		);
	}

	#[tokio::test]
	async fn close_auto_commits_once() {
		let graph = MemoryGraph::new();
		let batch = BatchContext::new(resolver(&graph));
		let a = batch.resolve("Alpha", EntityType::Company).await.unwrap();
		let b = batch.resolve("Beta", EntityType::Company).await.unwrap();
		batch
			.create_relationship(&a.entity_ref, &b.entity_ref, "SUPPLIES")
			.await
			.unwrap();

		let summary = batch.close().await.unwrap().expect("first close commits");
		assert_eq!(summary.relationships_created, 1);
		assert!(batch.close().await.unwrap().is_none());
	}
}
