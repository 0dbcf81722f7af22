//! In-process graph backend.
//!
//! Implements every repository capability over shared in-memory maps. Used
//! for embedded operation without a database and as the test double for the
//! whole pipeline, the same way the Cypher layer is substituted in tests.
//! Insertion order is tracked explicitly so lookups match the
//! insertion-order-stable guarantees of the Cypher implementations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{ResolutionError, Result};
use crate::model::{
	AuditEntry, DuplicateEntity, Entity, EntityStatus, EntityType, LibraryRelationship,
	MatchDecisionRecord, MergeRecord, ReviewItem, ReviewStatus, Synonym,
};
use crate::repo::{
	AuditPage, AuditRepo, CANONICAL_HOP_BOUND, DecisionRepo, DuplicateRepo, EntityRepo,
	MergeLedgerRepo, RelationshipRepo, Repositories, ReviewRepo, SynonymRepo,
};

#[derive(Debug, Clone)]
struct MergedEdge {
	target_id: String,
}

#[derive(Debug, Clone)]
struct StoredSynonym {
	synonym: Synonym,
	entity_id: String,
}

/// A non-library edge, migratable during merges. `migrated_from` tags edges
/// moved by a merge so the compensating restore can find them.
#[derive(Debug, Clone)]
pub struct ForeignEdge {
	pub source_id: String,
	pub target_id: String,
	pub label: String,
	pub properties: Map<String, Value>,
	migrated_from: Option<String>,
}

#[derive(Default)]
struct GraphData {
	entities: HashMap<String, Entity>,
	entity_order: Vec<String>,
	merged_into: HashMap<String, MergedEdge>,
	synonyms: HashMap<String, StoredSynonym>,
	synonym_order: Vec<String>,
	duplicates: HashMap<String, DuplicateEntity>,
	relationships: HashMap<String, LibraryRelationship>,
	relationship_order: Vec<String>,
	foreign_edges: Vec<ForeignEdge>,
	blocking_index: HashMap<String, HashSet<String>>,
	audits: Vec<AuditEntry>,
	merges: Vec<MergeRecord>,
	decisions: Vec<MatchDecisionRecord>,
	reviews: HashMap<String, ReviewItem>,
	review_order: Vec<String>,
}

/// Shared in-memory graph. Cheap to clone; all clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryGraph {
	inner: Arc<RwLock<GraphData>>,
}

impl MemoryGraph {
	pub fn new() -> Self {
		Self::default()
	}

	/// The full repository bundle over this graph.
	pub fn repositories(&self) -> Repositories {
		Repositories {
			entities: Arc::new(self.clone()),
			synonyms: Arc::new(self.clone()),
			duplicates: Arc::new(self.clone()),
			relationships: Arc::new(self.clone()),
			audit: Arc::new(self.clone()),
			ledger: Arc::new(self.clone()),
			decisions: Arc::new(self.clone()),
		}
	}

	/// Attach a non-library edge, e.g. ingest-produced context the merge
	/// engine must carry across canonicalization.
	pub async fn add_foreign_edge(
		&self,
		source_id: &str,
		target_id: &str,
		label: &str,
		properties: Map<String, Value>,
	) {
		let mut data = self.inner.write().await;
		data.foreign_edges.push(ForeignEdge {
			source_id: source_id.to_string(),
			target_id: target_id.to_string(),
			label: label.to_string(),
			properties,
			migrated_from: None,
		});
	}

	/// Snapshot of the non-library edges touching an entity.
	pub async fn foreign_edges_of(&self, entity_id: &str) -> Vec<ForeignEdge> {
		let data = self.inner.read().await;
		data.foreign_edges
			.iter()
			.filter(|e| e.source_id == entity_id || e.target_id == entity_id)
			.cloned()
			.collect()
	}

	/// Snapshot of every persisted match decision record, insertion order.
	pub async fn all_decisions(&self) -> Vec<MatchDecisionRecord> {
		self.inner.read().await.decisions.clone()
	}

	/// Snapshot of every audit entry, insertion order.
	pub async fn all_audits(&self) -> Vec<AuditEntry> {
		self.inner.read().await.audits.clone()
	}

	/// Graph-invariant check used by tests: no ACTIVE entity has an outgoing
	/// MERGED_INTO, and every MERGED_INTO points at an ACTIVE entity.
	pub async fn check_merge_invariant(&self) -> Result<()> {
		let data = self.inner.read().await;
		for (source_id, edge) in &data.merged_into {
			let source = data
				.entities
				.get(source_id)
				.ok_or_else(|| ResolutionError::Internal(format!("dangling source {source_id}")))?;
			if source.status == EntityStatus::Active {
				return Err(ResolutionError::Internal(format!(
					"ACTIVE entity {source_id} has an outgoing MERGED_INTO"
				)));
			}
			let target = data.entities.get(&edge.target_id).ok_or_else(|| {
				ResolutionError::Internal(format!("dangling target {}", edge.target_id))
			})?;
			if target.status != EntityStatus::Active {
				return Err(ResolutionError::Internal(format!(
					"MERGED_INTO from {source_id} points at non-ACTIVE {}",
					edge.target_id
				)));
			}
		}
		Ok(())
	}
}

#[async_trait]
impl EntityRepo for MemoryGraph {
	async fn create(&self, entity: &Entity) -> Result<()> {
		let mut data = self.inner.write().await;
		if data.entities.contains_key(&entity.id) {
			return Err(ResolutionError::Store(format!(
				"entity {} already exists",
				entity.id
			)));
		}
		data.entity_order.push(entity.id.clone());
		data.entities.insert(entity.id.clone(), entity.clone());
		Ok(())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<Entity>> {
		let data = self.inner.read().await;
		Ok(data.entities.get(id).cloned())
	}

	async fn find_by_normalized_name(
		&self,
		normalized: &str,
		entity_type: &EntityType,
	) -> Result<Vec<Entity>> {
		let data = self.inner.read().await;
		Ok(data
			.entity_order
			.iter()
			.filter_map(|id| data.entities.get(id))
			.filter(|e| {
				e.status == EntityStatus::Active
					&& e.normalized_name == normalized
					&& &e.entity_type == entity_type
			})
			.cloned()
			.collect())
	}

	async fn find_active_by_type(&self, entity_type: &EntityType) -> Result<Vec<Entity>> {
		let data = self.inner.read().await;
		Ok(data
			.entity_order
			.iter()
			.filter_map(|id| data.entities.get(id))
			.filter(|e| e.status == EntityStatus::Active && &e.entity_type == entity_type)
			.cloned()
			.collect())
	}

	async fn set_merged(
		&self,
		source_id: &str,
		target_id: &str,
		_confidence: f64,
		_reason: &str,
		merged_at: DateTime<Utc>,
	) -> Result<()> {
		let mut data = self.inner.write().await;
		if !data.entities.contains_key(target_id) {
			return Err(ResolutionError::NotFound(format!("entity {target_id}")));
		}
		let source = data
			.entities
			.get_mut(source_id)
			.ok_or_else(|| ResolutionError::NotFound(format!("entity {source_id}")))?;
		source.status = EntityStatus::Merged;
		source.updated_at = merged_at;
		data.merged_into.insert(
			source_id.to_string(),
			MergedEdge {
				target_id: target_id.to_string(),
			},
		);
		Ok(())
	}

	async fn unset_merged(&self, source_id: &str) -> Result<()> {
		let mut data = self.inner.write().await;
		data.merged_into.remove(source_id);
		let source = data
			.entities
			.get_mut(source_id)
			.ok_or_else(|| ResolutionError::NotFound(format!("entity {source_id}")))?;
		source.status = EntityStatus::Active;
		Ok(())
	}

	async fn canonical_id(&self, id: &str) -> Result<String> {
		let data = self.inner.read().await;
		if !data.entities.contains_key(id) {
			return Err(ResolutionError::NotFound(format!("entity {id}")));
		}
		let mut current = id.to_string();
		for _ in 0..CANONICAL_HOP_BOUND {
			match data.merged_into.get(&current) {
				Some(edge) => current = edge.target_id.clone(),
				None => return Ok(current),
			}
		}
		Err(ResolutionError::Internal(format!(
			"merge chain from {id} exceeded {CANONICAL_HOP_BOUND} hops"
		)))
	}

	async fn add_blocking_keys(&self, entity_id: &str, keys: &[String]) -> Result<()> {
		let mut data = self.inner.write().await;
		for key in keys {
			data.blocking_index
				.entry(key.clone())
				.or_default()
				.insert(entity_id.to_string());
		}
		Ok(())
	}

	async fn find_by_blocking_keys(
		&self,
		keys: &[String],
		entity_type: &EntityType,
	) -> Result<Vec<Entity>> {
		let data = self.inner.read().await;
		let mut candidate_ids: HashSet<&String> = HashSet::new();
		for key in keys {
			if let Some(ids) = data.blocking_index.get(key) {
				candidate_ids.extend(ids);
			}
		}
		// Union reported in entity insertion order, deduplicated.
		Ok(data
			.entity_order
			.iter()
			.filter(|id| candidate_ids.contains(id))
			.filter_map(|id| data.entities.get(id))
			.filter(|e| e.status == EntityStatus::Active && &e.entity_type == entity_type)
			.cloned()
			.collect())
	}
}

#[async_trait]
impl SynonymRepo for MemoryGraph {
	async fn create(&self, entity_id: &str, synonym: &Synonym) -> Result<()> {
		let mut data = self.inner.write().await;
		if !data.entities.contains_key(entity_id) {
			return Err(ResolutionError::NotFound(format!("entity {entity_id}")));
		}
		data.synonym_order.push(synonym.id.clone());
		data.synonyms.insert(
			synonym.id.clone(),
			StoredSynonym {
				synonym: synonym.clone(),
				entity_id: entity_id.to_string(),
			},
		);
		Ok(())
	}

	async fn delete(&self, synonym_id: &str) -> Result<()> {
		let mut data = self.inner.write().await;
		data.synonyms
			.remove(synonym_id)
			.ok_or_else(|| ResolutionError::NotFound(format!("synonym {synonym_id}")))?;
		data.synonym_order.retain(|id| id != synonym_id);
		Ok(())
	}

	async fn find_by_normalized_value(
		&self,
		normalized: &str,
		entity_type: &EntityType,
	) -> Result<Option<(Synonym, Entity)>> {
		let data = self.inner.read().await;
		for id in &data.synonym_order {
			let Some(stored) = data.synonyms.get(id) else {
				continue;
			};
			if stored.synonym.normalized_value != normalized {
				continue;
			}
			let Some(entity) = data.entities.get(&stored.entity_id) else {
				continue;
			};
			if entity.status == EntityStatus::Active && &entity.entity_type == entity_type {
				return Ok(Some((stored.synonym.clone(), entity.clone())));
			}
		}
		Ok(None)
	}

	async fn find_by_entity(&self, entity_id: &str) -> Result<Vec<Synonym>> {
		let data = self.inner.read().await;
		Ok(data
			.synonym_order
			.iter()
			.filter_map(|id| data.synonyms.get(id))
			.filter(|s| s.entity_id == entity_id)
			.map(|s| s.synonym.clone())
			.collect())
	}

	async fn exists_with_value(&self, entity_id: &str, value: &str) -> Result<bool> {
		let data = self.inner.read().await;
		let needle = value.to_lowercase();
		Ok(data.synonyms.values().any(|s| {
			s.entity_id == entity_id && s.synonym.value.to_lowercase() == needle
		}))
	}

	async fn reinforce(&self, synonym_id: &str, at: DateTime<Utc>) -> Result<()> {
		let mut data = self.inner.write().await;
		let stored = data
			.synonyms
			.get_mut(synonym_id)
			.ok_or_else(|| ResolutionError::NotFound(format!("synonym {synonym_id}")))?;
		stored.synonym.support_count += 1;
		stored.synonym.last_confirmed_at = at;
		Ok(())
	}
}

#[async_trait]
impl DuplicateRepo for MemoryGraph {
	async fn create(&self, entity_id: &str, duplicate: &DuplicateEntity) -> Result<()> {
		let mut data = self.inner.write().await;
		if !data.entities.contains_key(entity_id) {
			return Err(ResolutionError::NotFound(format!("entity {entity_id}")));
		}
		data.duplicates
			.insert(duplicate.id.clone(), duplicate.clone());
		Ok(())
	}

	async fn delete(&self, duplicate_id: &str) -> Result<()> {
		let mut data = self.inner.write().await;
		data.duplicates
			.remove(duplicate_id)
			.ok_or_else(|| ResolutionError::NotFound(format!("duplicate {duplicate_id}")))?;
		Ok(())
	}
}

#[async_trait]
impl RelationshipRepo for MemoryGraph {
	async fn create(&self, relationship: &LibraryRelationship) -> Result<()> {
		let mut data = self.inner.write().await;
		for endpoint in [
			&relationship.source_entity_id,
			&relationship.target_entity_id,
		] {
			if !data.entities.contains_key(endpoint) {
				return Err(ResolutionError::NotFound(format!("entity {endpoint}")));
			}
		}
		data.relationship_order.push(relationship.id.clone());
		data.relationships
			.insert(relationship.id.clone(), relationship.clone());
		Ok(())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<LibraryRelationship>> {
		let data = self.inner.read().await;
		Ok(data.relationships.get(id).cloned())
	}

	async fn find_by_entity(&self, entity_id: &str) -> Result<Vec<LibraryRelationship>> {
		let data = self.inner.read().await;
		Ok(data
			.relationship_order
			.iter()
			.filter_map(|id| data.relationships.get(id))
			.filter(|r| r.source_entity_id == entity_id || r.target_entity_id == entity_id)
			.cloned()
			.collect())
	}

	async fn redirect_endpoints(&self, from: &str, to: &str) -> Result<Vec<String>> {
		let mut data = self.inner.write().await;
		let ids: Vec<String> = data.relationship_order.clone();
		let mut migrated = Vec::new();
		for id in ids {
			let Some(rel) = data.relationships.get_mut(&id) else {
				continue;
			};
			let mut touched = false;
			if rel.source_entity_id == from {
				rel.source_entity_id = to.to_string();
				touched = true;
			}
			if rel.target_entity_id == from {
				rel.target_entity_id = to.to_string();
				touched = true;
			}
			if touched {
				migrated.push(id);
			}
		}
		Ok(migrated)
	}

	async fn redirect_back(
		&self,
		relationship_ids: &[String],
		from: &str,
		to: &str,
	) -> Result<()> {
		let mut data = self.inner.write().await;
		for id in relationship_ids {
			let rel = data
				.relationships
				.get_mut(id)
				.ok_or_else(|| ResolutionError::NotFound(format!("relationship {id}")))?;
			if rel.source_entity_id == to {
				rel.source_entity_id = from.to_string();
			}
			if rel.target_entity_id == to {
				rel.target_entity_id = from.to_string();
			}
		}
		Ok(())
	}

	async fn migrate_foreign_edges(&self, source_id: &str, target_id: &str) -> Result<u64> {
		let mut data = self.inner.write().await;
		let mut migrated = 0u64;
		for edge in &mut data.foreign_edges {
			if edge.source_id == source_id && edge.target_id != target_id {
				edge.source_id = target_id.to_string();
				edge.migrated_from = Some(source_id.to_string());
				migrated += 1;
			} else if edge.target_id == source_id && edge.source_id != target_id {
				edge.target_id = target_id.to_string();
				edge.migrated_from = Some(source_id.to_string());
				migrated += 1;
			}
		}
		Ok(migrated)
	}

	async fn restore_foreign_edges(&self, source_id: &str, target_id: &str) -> Result<u64> {
		let mut data = self.inner.write().await;
		let mut restored = 0u64;
		for edge in &mut data.foreign_edges {
			if edge.migrated_from.as_deref() != Some(source_id) {
				continue;
			}
			if edge.source_id == target_id {
				edge.source_id = source_id.to_string();
			} else if edge.target_id == target_id {
				edge.target_id = source_id.to_string();
			} else {
				continue;
			}
			edge.migrated_from = None;
			restored += 1;
		}
		Ok(restored)
	}
}

#[async_trait]
impl AuditRepo for MemoryGraph {
	async fn record(&self, entry: &AuditEntry) -> Result<()> {
		let mut data = self.inner.write().await;
		data.audits.push(entry.clone());
		Ok(())
	}

	async fn find_by_entity(
		&self,
		entity_id: &str,
		since: Option<DateTime<Utc>>,
		until: Option<DateTime<Utc>>,
	) -> Result<Vec<AuditEntry>> {
		let data = self.inner.read().await;
		let mut entries: Vec<AuditEntry> = data
			.audits
			.iter()
			.filter(|a| a.entity_id == entity_id)
			.filter(|a| since.is_none_or(|s| a.timestamp >= s))
			.filter(|a| until.is_none_or(|u| a.timestamp <= u))
			.cloned()
			.collect();
		entries.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
		Ok(entries)
	}

	async fn trail(
		&self,
		entity_id: &str,
		cursor: Option<(DateTime<Utc>, String)>,
		limit: usize,
	) -> Result<AuditPage> {
		let data = self.inner.read().await;
		let mut entries: Vec<AuditEntry> = data
			.audits
			.iter()
			.filter(|a| a.entity_id == entity_id)
			.filter(|a| match &cursor {
				Some((ts, id)) => (a.timestamp, &a.id) > (*ts, id),
				None => true,
			})
			.cloned()
			.collect();
		entries.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
		entries.truncate(limit);
		let next_cursor = if entries.len() == limit {
			entries.last().map(|e| (e.timestamp, e.id.clone()))
		} else {
			None
		};
		Ok(AuditPage {
			entries,
			next_cursor,
		})
	}
}

#[async_trait]
impl MergeLedgerRepo for MemoryGraph {
	async fn record(&self, record: &MergeRecord) -> Result<()> {
		let mut data = self.inner.write().await;
		data.merges.push(record.clone());
		Ok(())
	}

	async fn history_for(&self, entity_id: &str) -> Result<Vec<MergeRecord>> {
		let data = self.inner.read().await;
		Ok(data
			.merges
			.iter()
			.filter(|m| m.source_entity_id == entity_id || m.target_entity_id == entity_id)
			.cloned()
			.collect())
	}
}

#[async_trait]
impl DecisionRepo for MemoryGraph {
	async fn record_all(&self, records: &[MatchDecisionRecord]) -> Result<()> {
		let mut data = self.inner.write().await;
		data.decisions.extend_from_slice(records);
		Ok(())
	}

	async fn find_by_temp_id(
		&self,
		input_entity_temp_id: &str,
	) -> Result<Vec<MatchDecisionRecord>> {
		let data = self.inner.read().await;
		Ok(data
			.decisions
			.iter()
			.filter(|d| d.input_entity_temp_id == input_entity_temp_id)
			.cloned()
			.collect())
	}
}

#[async_trait]
impl ReviewRepo for MemoryGraph {
	async fn submit(&self, item: &ReviewItem) -> Result<()> {
		let mut data = self.inner.write().await;
		data.review_order.push(item.id.clone());
		data.reviews.insert(item.id.clone(), item.clone());
		Ok(())
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<ReviewItem>> {
		let data = self.inner.read().await;
		Ok(data.reviews.get(id).cloned())
	}

	async fn get_pending(&self, offset: usize, limit: usize) -> Result<Vec<ReviewItem>> {
		let data = self.inner.read().await;
		Ok(data
			.review_order
			.iter()
			.filter_map(|id| data.reviews.get(id))
			.filter(|r| r.status == ReviewStatus::Pending)
			.skip(offset)
			.take(limit)
			.cloned()
			.collect())
	}

	async fn set_status(
		&self,
		id: &str,
		status: ReviewStatus,
		resolved_by: &str,
		resolved_at: DateTime<Utc>,
	) -> Result<()> {
		let mut data = self.inner.write().await;
		let item = data
			.reviews
			.get_mut(id)
			.ok_or_else(|| ResolutionError::NotFound(format!("review item {id}")))?;
		item.status = status;
		item.resolved_by = Some(resolved_by.to_string());
		item.resolved_at = Some(resolved_at);
		Ok(())
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	fn entity(id: &str, name: &str, normalized: &str) -> Entity {
		Entity {
			id: id.to_string(),
			canonical_name: name.to_string(),
			normalized_name: normalized.to_string(),
			entity_type: EntityType::Company,
			confidence_score: 1.0,
			status: EntityStatus::Active,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn entity_lookup_preserves_insertion_order() {
		let graph = MemoryGraph::new();
		EntityRepo::create(&graph, &entity("e-1", "Acme", "acme")).await.unwrap();
		EntityRepo::create(&graph, &entity("e-2", "ACME", "acme")).await.unwrap();
		let found = graph
			.find_by_normalized_name("acme", &EntityType::Company)
			.await
			.unwrap();
		assert_eq!(found.len(), 2);
		assert_eq!(found[0].id, "e-1");
	}

	#[tokio::test]
	async fn canonical_id_follows_merge_chain() {
		let graph = MemoryGraph::new();
		EntityRepo::create(&graph, &entity("a", "A", "a")).await.unwrap();
		EntityRepo::create(&graph, &entity("b", "B", "b")).await.unwrap();
		EntityRepo::create(&graph, &entity("c", "C", "c")).await.unwrap();
		graph
			.set_merged("a", "b", 0.95, "duplicate", Utc::now())
			.await
			.unwrap();
		graph
			.set_merged("b", "c", 0.95, "duplicate", Utc::now())
			.await
			.unwrap();
		assert_eq!(graph.canonical_id("a").await.unwrap(), "c");
		assert_eq!(graph.canonical_id("c").await.unwrap(), "c");
		graph.check_merge_invariant().await.unwrap();
	}

	#[tokio::test]
	async fn unset_merged_restores_active_status() {
		let graph = MemoryGraph::new();
		EntityRepo::create(&graph, &entity("a", "A", "a")).await.unwrap();
		EntityRepo::create(&graph, &entity("b", "B", "b")).await.unwrap();
		graph
			.set_merged("a", "b", 0.9, "dup", Utc::now())
			.await
			.unwrap();
		graph.unset_merged("a").await.unwrap();
		let restored = EntityRepo::find_by_id(&graph, "a").await.unwrap().unwrap();
		assert_eq!(restored.status, EntityStatus::Active);
		assert_eq!(graph.canonical_id("a").await.unwrap(), "a");
	}

	#[tokio::test]
	async fn blocking_union_is_deduplicated_in_insertion_order() {
		let graph = MemoryGraph::new();
		EntityRepo::create(&graph, &entity("e-1", "Acme", "acme")).await.unwrap();
		EntityRepo::create(&graph, &entity("e-2", "Acorn", "acorn")).await.unwrap();
		graph
			.add_blocking_keys("e-1", &["pfx:acm".into(), "bg:ac".into()])
			.await
			.unwrap();
		graph
			.add_blocking_keys("e-2", &["bg:ac".into()])
			.await
			.unwrap();
		let found = graph
			.find_by_blocking_keys(
				&["pfx:acm".into(), "bg:ac".into()],
				&EntityType::Company,
			)
			.await
			.unwrap();
		assert_eq!(found.len(), 2);
		assert_eq!(found[0].id, "e-1");
		assert_eq!(found[1].id, "e-2");
	}

	#[tokio::test]
	async fn synonym_case_insensitive_existence() {
		let graph = MemoryGraph::new();
		EntityRepo::create(&graph, &entity("e-1", "IBM", "ibm")).await.unwrap();
		let synonym = Synonym {
			id: "s-1".to_string(),
			value: "Big Blue".to_string(),
			normalized_value: "big blue".to_string(),
			source: crate::model::SynonymSource::Human,
			confidence: 0.9,
			created_at: Utc::now(),
			last_confirmed_at: Utc::now(),
			support_count: 0,
		};
		SynonymRepo::create(&graph, "e-1", &synonym).await.unwrap();
		assert!(graph.exists_with_value("e-1", "BIG BLUE").await.unwrap());
		assert!(!graph.exists_with_value("e-1", "Deep Blue").await.unwrap());
	}

	#[tokio::test]
	async fn foreign_edge_migration_round_trip() {
		let graph = MemoryGraph::new();
		EntityRepo::create(&graph, &entity("src", "Src", "src")).await.unwrap();
		EntityRepo::create(&graph, &entity("tgt", "Tgt", "tgt")).await.unwrap();
		EntityRepo::create(&graph, &entity("other", "Other", "other")).await.unwrap();
		let mut props = Map::new();
		props.insert("weight".to_string(), json!(3));
		graph.add_foreign_edge("src", "other", "MENTIONS", props).await;

		let migrated = graph.migrate_foreign_edges("src", "tgt").await.unwrap();
		assert_eq!(migrated, 1);
		assert!(graph.foreign_edges_of("src").await.is_empty());
		assert_eq!(graph.foreign_edges_of("tgt").await.len(), 1);

		let restored = graph.restore_foreign_edges("src", "tgt").await.unwrap();
		assert_eq!(restored, 1);
		assert_eq!(graph.foreign_edges_of("src").await.len(), 1);
	}

	#[tokio::test]
	async fn audit_trail_pages_by_timestamp_and_id() {
		let graph = MemoryGraph::new();
		let base = Utc::now();
		for i in 0..5 {
			let entry = AuditEntry {
				id: format!("a-{i}"),
				action: crate::model::AuditAction::EntityCreated,
				entity_id: "e-1".to_string(),
				actor_id: "SYSTEM".to_string(),
				details: Map::new(),
				timestamp: base + chrono::Duration::seconds(i),
			};
			AuditRepo::record(&graph, &entry).await.unwrap();
		}
		let first = graph.trail("e-1", None, 2).await.unwrap();
		assert_eq!(first.entries.len(), 2);
		let cursor = first.next_cursor.unwrap();
		let second = graph.trail("e-1", Some(cursor), 2).await.unwrap();
		assert_eq!(second.entries[0].id, "a-2");
	}
}
