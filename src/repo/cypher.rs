//! Cypher-backed repository implementations over the graph collaborator.
//!
//! Statements stay thin and parameterized; all orchestration (compensation
//! stacks, chunking, candidate unions) lives above this layer. Generic-edge
//! migration tags moved edges with `_migratedFrom` so the compensating
//! restore can identify them by reconstruction rather than live state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{ResolutionError, Result};
use crate::graph::{GraphStore, result_column, vertex_properties};
use crate::model::{
	AuditEntry, DuplicateEntity, Entity, EntityStatus, EntityType, LibraryRelationship,
	MatchDecisionRecord, MergeRecord, ReviewItem, ReviewStatus, Synonym,
};

use super::{
	AuditPage, AuditRepo, CANONICAL_HOP_BOUND, DecisionRepo, DuplicateRepo, EntityRepo,
	MergeLedgerRepo, RelationshipRepo, ReviewRepo, SynonymRepo,
};

/// Edge labels owned by the resolution pipeline; everything else is a
/// foreign edge for merge-migration purposes.
const OWNED_EDGE_LABELS: &[&str] = &[
	"SYNONYM_OF",
	"DUPLICATE_OF",
	"MERGED_INTO",
	"HAS_BLOCKING_KEY",
	"LIBRARY_REL",
];

fn decode_vertex<T: DeserializeOwned>(value: &Value) -> Result<T> {
	let props = vertex_properties(value);
	serde_json::from_value(Value::Object(props))
		.map_err(|e| ResolutionError::Store(format!("undecodable vertex: {e}")))
}

fn to_props<T: serde::Serialize>(record: &T) -> Result<Value> {
	serde_json::to_value(record)
		.map_err(|e| ResolutionError::Internal(format!("unencodable record: {e}")))
}

/// Keep only `[A-Za-z0-9_]` so a label can be spliced into a Cypher
/// statement; Cypher offers no parameter binding position for labels.
fn sanitize_edge_label(label: &str) -> String {
	let cleaned: String = label
		.chars()
		.filter(|c| c.is_ascii_alphanumeric() || *c == '_')
		.collect();
	if cleaned.is_empty() {
		"RELATED_TO".to_string()
	} else {
		cleaned
	}
}

pub struct CypherEntityRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherEntityRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl EntityRepo for CypherEntityRepo {
	async fn create(&self, entity: &Entity) -> Result<()> {
		let props = to_props(entity)?;
		self.store
			.execute(
				"CREATE (e:Entity $props)",
				&[("props", props)],
			)
			.await
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<Entity>> {
		let rows = self
			.store
			.query(
				"MATCH (e:Entity {id: $id}) RETURN e",
				&[("id", json!(id))],
			)
			.await?;
		result_column(rows).next().map(|v| decode_vertex(&v)).transpose()
	}

	async fn find_by_normalized_name(
		&self,
		normalized: &str,
		entity_type: &EntityType,
	) -> Result<Vec<Entity>> {
		let rows = self
			.store
			.query(
				"MATCH (e:Entity {normalizedName: $normalized, type: $type, status: \"ACTIVE\"}) \
				 RETURN e ORDER BY e.createdAt, e.id",
				&[
					("normalized", json!(normalized)),
					("type", json!(entity_type.as_label())),
				],
			)
			.await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}

	async fn find_active_by_type(&self, entity_type: &EntityType) -> Result<Vec<Entity>> {
		let rows = self
			.store
			.query(
				"MATCH (e:Entity {type: $type, status: \"ACTIVE\"}) \
				 RETURN e ORDER BY e.createdAt, e.id",
				&[("type", json!(entity_type.as_label()))],
			)
			.await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}

	async fn set_merged(
		&self,
		source_id: &str,
		target_id: &str,
		confidence: f64,
		reason: &str,
		merged_at: DateTime<Utc>,
	) -> Result<()> {
		self.store
			.execute(
				"MATCH (s:Entity {id: $sourceId}), (t:Entity {id: $targetId}) \
				 SET s.status = \"MERGED\", s.updatedAt = $mergedAt \
				 CREATE (s)-[:MERGED_INTO {confidence: $confidence, reason: $reason, mergedAt: $mergedAt}]->(t)",
				&[
					("sourceId", json!(source_id)),
					("targetId", json!(target_id)),
					("confidence", json!(confidence)),
					("reason", json!(reason)),
					("mergedAt", json!(merged_at)),
				],
			)
			.await
	}

	async fn unset_merged(&self, source_id: &str) -> Result<()> {
		self.store
			.execute(
				"MATCH (s:Entity {id: $sourceId})-[m:MERGED_INTO]->(:Entity) \
				 SET s.status = \"ACTIVE\" \
				 DELETE m",
				&[("sourceId", json!(source_id))],
			)
			.await
	}

	async fn canonical_id(&self, id: &str) -> Result<String> {
		// Hop-by-hop client-side walk; the hop bound guards corrupted chains.
		let mut current = id.to_string();
		for _ in 0..CANONICAL_HOP_BOUND {
			let entity = self
				.find_by_id(&current)
				.await?
				.ok_or_else(|| ResolutionError::NotFound(format!("entity {current}")))?;
			if entity.status == EntityStatus::Active {
				return Ok(current);
			}
			let rows = self
				.store
				.query(
					"MATCH (:Entity {id: $id})-[:MERGED_INTO]->(t:Entity) RETURN t.id",
					&[("id", json!(current))],
				)
				.await?;
			match result_column(rows).next().and_then(|v| v.as_str().map(String::from)) {
				Some(next) => current = next,
				None => {
					return Err(ResolutionError::Internal(format!(
						"MERGED entity {current} has no MERGED_INTO edge"
					)));
				}
			}
		}
		Err(ResolutionError::Internal(format!(
			"merge chain from {id} exceeded {CANONICAL_HOP_BOUND} hops"
		)))
	}

	async fn add_blocking_keys(&self, entity_id: &str, keys: &[String]) -> Result<()> {
		for key in keys {
			self.store
				.execute(
					"MATCH (e:Entity {id: $entityId}) \
					 MERGE (k:BlockingKey {value: $value}) \
					 MERGE (e)-[:HAS_BLOCKING_KEY]->(k)",
					&[("entityId", json!(entity_id)), ("value", json!(key))],
				)
				.await?;
		}
		Ok(())
	}

	async fn find_by_blocking_keys(
		&self,
		keys: &[String],
		entity_type: &EntityType,
	) -> Result<Vec<Entity>> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}
		let rows = self
			.store
			.query(
				"MATCH (e:Entity {type: $type, status: \"ACTIVE\"})-[:HAS_BLOCKING_KEY]->(k:BlockingKey) \
				 WHERE k.value IN $keys \
				 RETURN DISTINCT e ORDER BY e.createdAt, e.id",
				&[
					("type", json!(entity_type.as_label())),
					("keys", json!(keys)),
				],
			)
			.await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}
}

pub struct CypherSynonymRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherSynonymRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl SynonymRepo for CypherSynonymRepo {
	async fn create(&self, entity_id: &str, synonym: &Synonym) -> Result<()> {
		let props = to_props(synonym)?;
		self.store
			.execute(
				"MATCH (e:Entity {id: $entityId}) \
				 CREATE (s:Synonym $props)-[:SYNONYM_OF]->(e)",
				&[("entityId", json!(entity_id)), ("props", props)],
			)
			.await
	}

	async fn delete(&self, synonym_id: &str) -> Result<()> {
		self.store
			.execute(
				"MATCH (s:Synonym {id: $id}) DETACH DELETE s",
				&[("id", json!(synonym_id))],
			)
			.await
	}

	async fn find_by_normalized_value(
		&self,
		normalized: &str,
		entity_type: &EntityType,
	) -> Result<Option<(Synonym, Entity)>> {
		let rows = self
			.store
			.query(
				"MATCH (s:Synonym {normalizedValue: $normalized})-[:SYNONYM_OF]->\
				 (e:Entity {type: $type, status: \"ACTIVE\"}) \
				 RETURN [s, e] ORDER BY s.createdAt, s.id",
				&[
					("normalized", json!(normalized)),
					("type", json!(entity_type.as_label())),
				],
			)
			.await?;
		match result_column(rows).next() {
			Some(Value::Array(pair)) if pair.len() == 2 => {
				let synonym: Synonym = decode_vertex(&pair[0])?;
				let entity: Entity = decode_vertex(&pair[1])?;
				Ok(Some((synonym, entity)))
			}
			Some(other) => Err(ResolutionError::Store(format!(
				"expected [synonym, entity] pair, got {other}"
			))),
			None => Ok(None),
		}
	}

	async fn find_by_entity(&self, entity_id: &str) -> Result<Vec<Synonym>> {
		let rows = self
			.store
			.query(
				"MATCH (s:Synonym)-[:SYNONYM_OF]->(:Entity {id: $entityId}) \
				 RETURN s ORDER BY s.createdAt, s.id",
				&[("entityId", json!(entity_id))],
			)
			.await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}

	async fn exists_with_value(&self, entity_id: &str, value: &str) -> Result<bool> {
		let rows = self
			.store
			.query(
				"MATCH (s:Synonym)-[:SYNONYM_OF]->(:Entity {id: $entityId}) \
				 WHERE toLower(s.value) = toLower($value) \
				 RETURN s.id",
				&[("entityId", json!(entity_id)), ("value", json!(value))],
			)
			.await?;
		Ok(!rows.is_empty())
	}

	async fn reinforce(&self, synonym_id: &str, at: DateTime<Utc>) -> Result<()> {
		self.store
			.execute(
				"MATCH (s:Synonym {id: $id}) \
				 SET s.supportCount = s.supportCount + 1, s.lastConfirmedAt = $at",
				&[("id", json!(synonym_id)), ("at", json!(at))],
			)
			.await
	}
}

pub struct CypherDuplicateRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherDuplicateRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl DuplicateRepo for CypherDuplicateRepo {
	async fn create(&self, entity_id: &str, duplicate: &DuplicateEntity) -> Result<()> {
		let props = to_props(duplicate)?;
		self.store
			.execute(
				"MATCH (e:Entity {id: $entityId}) \
				 CREATE (d:DuplicateEntity $props)-[:DUPLICATE_OF]->(e)",
				&[("entityId", json!(entity_id)), ("props", props)],
			)
			.await
	}

	async fn delete(&self, duplicate_id: &str) -> Result<()> {
		self.store
			.execute(
				"MATCH (d:DuplicateEntity {id: $id}) DETACH DELETE d",
				&[("id", json!(duplicate_id))],
			)
			.await
	}
}

pub struct CypherRelationshipRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherRelationshipRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}

	fn assemble(value: &Value) -> Result<LibraryRelationship> {
		let parts = value.as_array().filter(|a| a.len() == 3).ok_or_else(|| {
			ResolutionError::Store(format!("expected [props, sourceId, targetId], got {value}"))
		})?;
		let mut props = vertex_properties(&parts[0]);
		props.insert("sourceEntityId".to_string(), parts[1].clone());
		props.insert("targetEntityId".to_string(), parts[2].clone());
		props
			.entry("properties".to_string())
			.or_insert_with(|| json!({}));
		serde_json::from_value(Value::Object(props))
			.map_err(|e| ResolutionError::Store(format!("undecodable relationship: {e}")))
	}

	async fn delete_edge(&self, relationship_id: &str) -> Result<()> {
		self.store
			.execute(
				"MATCH (:Entity)-[r:LIBRARY_REL {id: $id}]->(:Entity) DELETE r",
				&[("id", json!(relationship_id))],
			)
			.await
	}

	async fn create_edge(&self, relationship: &LibraryRelationship) -> Result<()> {
		self.store
			.execute(
				"MATCH (a:Entity {id: $sourceId}), (b:Entity {id: $targetId}) \
				 CREATE (a)-[:LIBRARY_REL {id: $id, type: $relType, properties: $properties, \
				 createdAt: $createdAt, createdBy: $createdBy}]->(b)",
				&[
					("sourceId", json!(relationship.source_entity_id)),
					("targetId", json!(relationship.target_entity_id)),
					("id", json!(relationship.id)),
					("relType", json!(relationship.relationship_type)),
					("properties", Value::Object(relationship.properties.clone())),
					("createdAt", json!(relationship.created_at)),
					("createdBy", json!(relationship.created_by)),
				],
			)
			.await
	}

	/// Move each named relationship's `from`-side endpoints to `to` by
	/// delete-and-recreate; Cypher cannot rebind an existing edge.
	async fn move_endpoints(&self, ids: &[String], from: &str, to: &str) -> Result<()> {
		for id in ids {
			let Some(mut rel) = self.find_by_id(id).await? else {
				return Err(ResolutionError::NotFound(format!("relationship {id}")));
			};
			if rel.source_entity_id == from {
				rel.source_entity_id = to.to_string();
			}
			if rel.target_entity_id == from {
				rel.target_entity_id = to.to_string();
			}
			self.delete_edge(id).await?;
			self.create_edge(&rel).await?;
		}
		Ok(())
	}
}

#[async_trait]
impl RelationshipRepo for CypherRelationshipRepo {
	async fn create(&self, relationship: &LibraryRelationship) -> Result<()> {
		self.create_edge(relationship).await
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<LibraryRelationship>> {
		let rows = self
			.store
			.query(
				"MATCH (a:Entity)-[r:LIBRARY_REL {id: $id}]->(b:Entity) \
				 RETURN [properties(r), a.id, b.id]",
				&[("id", json!(id))],
			)
			.await?;
		result_column(rows).next().map(|v| Self::assemble(&v)).transpose()
	}

	async fn find_by_entity(&self, entity_id: &str) -> Result<Vec<LibraryRelationship>> {
		let rows = self
			.store
			.query(
				"MATCH (a:Entity)-[r:LIBRARY_REL]->(b:Entity) \
				 WHERE a.id = $entityId OR b.id = $entityId \
				 RETURN [properties(r), a.id, b.id] ORDER BY r.createdAt, r.id",
				&[("entityId", json!(entity_id))],
			)
			.await?;
		result_column(rows).map(|v| Self::assemble(&v)).collect()
	}

	async fn redirect_endpoints(&self, from: &str, to: &str) -> Result<Vec<String>> {
		let rels = self.find_by_entity(from).await?;
		let ids: Vec<String> = rels.iter().map(|r| r.id.clone()).collect();
		self.move_endpoints(&ids, from, to).await?;
		Ok(ids)
	}

	async fn redirect_back(
		&self,
		relationship_ids: &[String],
		from: &str,
		to: &str,
	) -> Result<()> {
		self.move_endpoints(relationship_ids, to, from).await
	}

	async fn migrate_foreign_edges(&self, source_id: &str, target_id: &str) -> Result<u64> {
		let mut migrated = 0u64;
		for (pattern, outgoing) in [
			("MATCH (s:Entity {id: $sourceId})-[r]->(o) ", true),
			("MATCH (s:Entity {id: $sourceId})<-[r]-(o) ", false),
		] {
			let cypher = format!(
				"{pattern}WHERE NOT type(r) IN $ownedLabels AND (o.id IS NULL OR o.id <> $targetId) \
				 RETURN [type(r), properties(r), id(o)]"
			);
			let rows = self
				.store
				.query(
					&cypher,
					&[
						("sourceId", json!(source_id)),
						("targetId", json!(target_id)),
						("ownedLabels", json!(OWNED_EDGE_LABELS)),
					],
				)
				.await?;

			for value in result_column(rows) {
				let parts = value.as_array().filter(|a| a.len() == 3).ok_or_else(|| {
					ResolutionError::Store(format!("expected [type, props, other], got {value}"))
				})?;
				let label = sanitize_edge_label(parts[0].as_str().unwrap_or_default());
				let mut props = vertex_properties(&parts[1]);
				props.insert("_migratedFrom".to_string(), json!(source_id));
				let other_graph_id = parts[2].clone();

				let (create, delete) = if outgoing {
					(
						format!(
							"MATCH (t:Entity {{id: $targetId}}) MATCH (o) WHERE id(o) = $otherId \
							 CREATE (t)-[r:{label}]->(o) SET r = $props"
						),
						format!(
							"MATCH (s:Entity {{id: $sourceId}})-[r:{label}]->(o) \
							 WHERE id(o) = $otherId DELETE r"
						),
					)
				} else {
					(
						format!(
							"MATCH (t:Entity {{id: $targetId}}) MATCH (o) WHERE id(o) = $otherId \
							 CREATE (o)-[r:{label}]->(t) SET r = $props"
						),
						format!(
							"MATCH (s:Entity {{id: $sourceId}})<-[r:{label}]-(o) \
							 WHERE id(o) = $otherId DELETE r"
						),
					)
				};

				self.store
					.execute(
						&create,
						&[
							("targetId", json!(target_id)),
							("otherId", other_graph_id.clone()),
							("props", Value::Object(props)),
						],
					)
					.await?;
				self.store
					.execute(
						&delete,
						&[("sourceId", json!(source_id)), ("otherId", other_graph_id)],
					)
					.await?;
				migrated += 1;
			}
		}
		Ok(migrated)
	}

	async fn restore_foreign_edges(&self, source_id: &str, target_id: &str) -> Result<u64> {
		let mut restored = 0u64;
		for (pattern, outgoing) in [
			("MATCH (t:Entity {id: $targetId})-[r]->(o) ", true),
			("MATCH (t:Entity {id: $targetId})<-[r]-(o) ", false),
		] {
			let cypher = format!(
				"{pattern}WHERE r._migratedFrom = $sourceId \
				 RETURN [type(r), properties(r), id(o)]"
			);
			let rows = self
				.store
				.query(
					&cypher,
					&[("targetId", json!(target_id)), ("sourceId", json!(source_id))],
				)
				.await?;

			for value in result_column(rows) {
				let parts = value.as_array().filter(|a| a.len() == 3).ok_or_else(|| {
					ResolutionError::Store(format!("expected [type, props, other], got {value}"))
				})?;
				let label = sanitize_edge_label(parts[0].as_str().unwrap_or_default());
				let mut props = vertex_properties(&parts[1]);
				props.remove("_migratedFrom");
				let other_graph_id = parts[2].clone();

				let (create, delete) = if outgoing {
					(
						format!(
							"MATCH (s:Entity {{id: $sourceId}}) MATCH (o) WHERE id(o) = $otherId \
							 CREATE (s)-[r:{label}]->(o) SET r = $props"
						),
						format!(
							"MATCH (t:Entity {{id: $targetId}})-[r:{label}]->(o) \
							 WHERE id(o) = $otherId AND r._migratedFrom = $sourceId DELETE r"
						),
					)
				} else {
					(
						format!(
							"MATCH (s:Entity {{id: $sourceId}}) MATCH (o) WHERE id(o) = $otherId \
							 CREATE (o)-[r:{label}]->(s) SET r = $props"
						),
						format!(
							"MATCH (t:Entity {{id: $targetId}})<-[r:{label}]-(o) \
							 WHERE id(o) = $otherId AND r._migratedFrom = $sourceId DELETE r"
						),
					)
				};

				self.store
					.execute(
						&create,
						&[
							("sourceId", json!(source_id)),
							("otherId", other_graph_id.clone()),
							("props", Value::Object(props)),
						],
					)
					.await?;
				self.store
					.execute(
						&delete,
						&[
							("targetId", json!(target_id)),
							("sourceId", json!(source_id)),
							("otherId", other_graph_id),
						],
					)
					.await?;
				restored += 1;
			}
		}
		Ok(restored)
	}
}

pub struct CypherAuditRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherAuditRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl AuditRepo for CypherAuditRepo {
	async fn record(&self, entry: &AuditEntry) -> Result<()> {
		let props = to_props(entry)?;
		self.store
			.execute("CREATE (a:AuditEntry $props)", &[("props", props)])
			.await
	}

	async fn find_by_entity(
		&self,
		entity_id: &str,
		since: Option<DateTime<Utc>>,
		until: Option<DateTime<Utc>>,
	) -> Result<Vec<AuditEntry>> {
		let mut clauses = vec!["a.entityId = $entityId".to_string()];
		let mut params: Vec<(&str, Value)> = vec![("entityId", json!(entity_id))];
		if let Some(since) = since {
			clauses.push("a.timestamp >= $since".to_string());
			params.push(("since", json!(since)));
		}
		if let Some(until) = until {
			clauses.push("a.timestamp <= $until".to_string());
			params.push(("until", json!(until)));
		}
		let cypher = format!(
			"MATCH (a:AuditEntry) WHERE {} RETURN a ORDER BY a.timestamp, a.id",
			clauses.join(" AND ")
		);
		let rows = self.store.query(&cypher, &params).await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}

	async fn trail(
		&self,
		entity_id: &str,
		cursor: Option<(DateTime<Utc>, String)>,
		limit: usize,
	) -> Result<AuditPage> {
		let mut clauses = vec!["a.entityId = $entityId".to_string()];
		let mut params: Vec<(&str, Value)> = vec![("entityId", json!(entity_id))];
		if let Some((ts, id)) = &cursor {
			clauses.push(
				"(a.timestamp > $cursorTs OR (a.timestamp = $cursorTs AND a.id > $cursorId))"
					.to_string(),
			);
			params.push(("cursorTs", json!(ts)));
			params.push(("cursorId", json!(id)));
		}
		let cypher = format!(
			"MATCH (a:AuditEntry) WHERE {} RETURN a ORDER BY a.timestamp, a.id LIMIT {}",
			clauses.join(" AND "),
			limit
		);
		let rows = self.store.query(&cypher, &params).await?;
		let entries: Vec<AuditEntry> = result_column(rows)
			.map(|v| decode_vertex(&v))
			.collect::<Result<_>>()?;
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

pub struct CypherMergeLedgerRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherMergeLedgerRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl MergeLedgerRepo for CypherMergeLedgerRepo {
	async fn record(&self, record: &MergeRecord) -> Result<()> {
		let props = to_props(record)?;
		self.store
			.execute("CREATE (m:MergeRecord $props)", &[("props", props)])
			.await
	}

	async fn history_for(&self, entity_id: &str) -> Result<Vec<MergeRecord>> {
		let rows = self
			.store
			.query(
				"MATCH (m:MergeRecord) \
				 WHERE m.sourceEntityId = $entityId OR m.targetEntityId = $entityId \
				 RETURN m ORDER BY m.mergedAt, m.id",
				&[("entityId", json!(entity_id))],
			)
			.await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}
}

pub struct CypherDecisionRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherDecisionRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl DecisionRepo for CypherDecisionRepo {
	async fn record_all(&self, records: &[MatchDecisionRecord]) -> Result<()> {
		for record in records {
			let props = to_props(record)?;
			self.store
				.execute("CREATE (d:MatchDecisionRecord $props)", &[("props", props)])
				.await?;
		}
		Ok(())
	}

	async fn find_by_temp_id(
		&self,
		input_entity_temp_id: &str,
	) -> Result<Vec<MatchDecisionRecord>> {
		let rows = self
			.store
			.query(
				"MATCH (d:MatchDecisionRecord {inputEntityTempId: $tempId}) \
				 RETURN d ORDER BY d.evaluatedAt, d.id",
				&[("tempId", json!(input_entity_temp_id))],
			)
			.await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}
}

pub struct CypherReviewRepo {
	store: Arc<dyn GraphStore>,
}

impl CypherReviewRepo {
	pub fn new(store: Arc<dyn GraphStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl ReviewRepo for CypherReviewRepo {
	async fn submit(&self, item: &ReviewItem) -> Result<()> {
		let props = to_props(item)?;
		self.store
			.execute("CREATE (r:ReviewItem $props)", &[("props", props)])
			.await
	}

	async fn find_by_id(&self, id: &str) -> Result<Option<ReviewItem>> {
		let rows = self
			.store
			.query(
				"MATCH (r:ReviewItem {id: $id}) RETURN r",
				&[("id", json!(id))],
			)
			.await?;
		result_column(rows).next().map(|v| decode_vertex(&v)).transpose()
	}

	async fn get_pending(&self, offset: usize, limit: usize) -> Result<Vec<ReviewItem>> {
		let cypher = format!(
			"MATCH (r:ReviewItem {{status: \"PENDING\"}}) \
			 RETURN r ORDER BY r.createdAt, r.id SKIP {offset} LIMIT {limit}"
		);
		let rows = self.store.query(&cypher, &[]).await?;
		result_column(rows).map(|v| decode_vertex(&v)).collect()
	}

	async fn set_status(
		&self,
		id: &str,
		status: ReviewStatus,
		resolved_by: &str,
		resolved_at: DateTime<Utc>,
	) -> Result<()> {
		self.store
			.execute(
				"MATCH (r:ReviewItem {id: $id}) \
				 SET r.status = $status, r.resolvedBy = $resolvedBy, r.resolvedAt = $resolvedAt",
				&[
					("id", json!(id)),
					("status", to_props(&status)?),
					("resolvedBy", json!(resolved_by)),
					("resolvedAt", json!(resolved_at)),
				],
			)
			.await
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn edge_labels_are_sanitized() {
		assert_eq!(sanitize_edge_label("PARTNER_OF"), "PARTNER_OF");
		assert_eq!(sanitize_edge_label("bad label;--"), "badlabel");
		assert_eq!(sanitize_edge_label(""), "RELATED_TO");
	}

	#[test]
	fn assemble_builds_relationship_from_edge_parts() {
		let value = json!([
			{
				"id": "r-1",
				"type": "PARTNER",
				"properties": {},
				"createdAt": "2026-01-01T00:00:00Z",
				"createdBy": "mimir"
			},
			"e-1",
			"e-2"
		]);
		let rel = CypherRelationshipRepo::assemble(&value).unwrap();
		assert_eq!(rel.id, "r-1");
		assert_eq!(rel.relationship_type, "PARTNER");
		assert_eq!(rel.source_entity_id, "e-1");
		assert_eq!(rel.target_entity_id, "e-2");
	}
}
