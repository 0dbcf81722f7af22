//! Merge engine and entity-handle behavior across canonicalization.

use std::sync::Arc;

use chrono::Utc;
use mimir::config::ResolutionOptions;
use mimir::merge::{MergeEngine, MergeRequest};
use mimir::model::{
	Entity, EntityStatus, EntityType, LibraryRelationship, MatchOutcome,
};
use mimir::normalize::Normalizer;
use mimir::repo::{EntityRepo, RelationshipRepo, SynonymRepo};
use mimir::resolve::EntityResolver;
use mimir::review::ReviewService;
use mimir::store::MemoryGraph;

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

fn plain_entity(id: &str, name: &str, normalized: &str) -> Entity {
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

/// Scenario: a merge survives the EntityRef. The handle taken before the
/// merge resolves to the merge target afterwards, and LIBRARY_REL edges
/// follow the canonical entity.
#[tokio::test]
async fn merge_survives_entity_ref() {
	let graph = MemoryGraph::new();
	let resolver = resolver(&graph);

	let foo = resolver.resolve("Foo Inc", EntityType::Company).await.unwrap();
	let r = foo.entity_ref.clone();
	assert_eq!(r.canonical_id().await.unwrap(), foo.entity.id);
	assert!(!r.was_merged().await.unwrap());

	// A separately-ingested duplicate under a distinct normalized form.
	EntityRepo::create(
		&graph,
		&plain_entity("foo-incorporated", "Foo Incorporated", "foo incorporated"),
	)
	.await
	.unwrap();
	EntityRepo::create(&graph, &plain_entity("partner", "Partner Co", "partner"))
		.await
		.unwrap();

	let rel = LibraryRelationship {
		id: "rel-1".to_string(),
		source_entity_id: foo.entity.id.clone(),
		target_entity_id: "partner".to_string(),
		relationship_type: "SUPPLIES".to_string(),
		properties: serde_json::Map::new(),
		created_at: Utc::now(),
		created_by: "mimir".to_string(),
	};
	RelationshipRepo::create(&graph, &rel).await.unwrap();

	let engine = MergeEngine::new(graph.repositories());
	engine
		.merge(MergeRequest {
			confidence: 0.97,
			reasoning: "same registrant".to_string(),
			..MergeRequest::new(foo.entity.id.clone(), "foo-incorporated")
		})
		.await
		.unwrap();

	// The pre-merge handle now points at the target.
	assert_eq!(r.canonical_id().await.unwrap(), "foo-incorporated");
	assert!(r.was_merged().await.unwrap());
	assert_eq!(r.original_id(), foo.entity.id);

	// The library relationship originates from the canonical now.
	let migrated = RelationshipRepo::find_by_id(&graph, "rel-1")
		.await
		.unwrap()
		.unwrap();
	assert_eq!(migrated.source_entity_id, "foo-incorporated");
	assert_eq!(migrated.target_entity_id, "partner");

	graph.check_merge_invariant().await.unwrap();
}

/// Resolving the source's original name after a merge lands on the target
/// canonical: the source name became a synonym of the target.
#[tokio::test]
async fn merged_name_resolves_to_target() {
	let graph = MemoryGraph::new();
	let resolver = resolver(&graph);

	let foo = resolver.resolve("Foo Inc", EntityType::Company).await.unwrap();
	EntityRepo::create(
		&graph,
		&plain_entity("foo-incorporated", "Foo Incorporated", "foo incorporated"),
	)
	.await
	.unwrap();

	let engine = MergeEngine::new(graph.repositories());
	engine
		.merge(MergeRequest::new(foo.entity.id.clone(), "foo-incorporated"))
		.await
		.unwrap();

	// "Foo Inc" normalizes to "foo", the merged source's normalized name;
	// the synonym created at merge time routes it to the target.
	let resolved = resolver.resolve("Foo Inc", EntityType::Company).await.unwrap();
	assert_eq!(resolved.entity.id, "foo-incorporated");
	assert!(resolved.was_matched_via_synonym);

	let history = engine.merge_history(&foo.entity.id).await.unwrap();
	assert_eq!(history.len(), 1);
	assert_eq!(history[0].source_name, "Foo Inc");
	assert_eq!(history[0].target_entity_id, "foo-incorporated");
}

/// Repeated merges chain: A→B, B→C; every handle resolves to C and the
/// ledger records both hops.
#[tokio::test]
async fn merge_chains_resolve_to_the_final_canonical() {
	let graph = MemoryGraph::new();
	for (id, name) in [("a", "Alpha One"), ("b", "Alpha Two"), ("c", "Alpha Three")] {
		EntityRepo::create(&graph, &plain_entity(id, name, name)).await.unwrap();
	}
	let engine = MergeEngine::new(graph.repositories());

	engine.merge(MergeRequest::new("a", "b")).await.unwrap();
	engine.merge(MergeRequest::new("b", "c")).await.unwrap();

	assert_eq!(graph.canonical_id("a").await.unwrap(), "c");
	assert_eq!(graph.canonical_id("b").await.unwrap(), "c");

	let history_b = engine.merge_history("b").await.unwrap();
	assert_eq!(history_b.len(), 2);

	// A MERGED source refuses further merges.
	assert!(!engine.can_merge("a", "c").await.unwrap());
	graph.check_merge_invariant().await.unwrap();
}

/// Foreign (non-library) edges move with the merge, except edges whose other
/// endpoint is the target itself.
#[tokio::test]
async fn foreign_edges_migrate_with_the_merge() {
	let graph = MemoryGraph::new();
	for (id, name) in [("src", "Src"), ("tgt", "Tgt"), ("ctx", "Ctx")] {
		EntityRepo::create(&graph, &plain_entity(id, name, name)).await.unwrap();
	}
	graph
		.add_foreign_edge("src", "ctx", "MENTIONED_WITH", serde_json::Map::new())
		.await;
	graph
		.add_foreign_edge("src", "tgt", "MENTIONED_WITH", serde_json::Map::new())
		.await;

	let engine = MergeEngine::new(graph.repositories());
	let outcome = engine.merge(MergeRequest::new("src", "tgt")).await.unwrap();

	// Only the src→ctx edge migrates; src→tgt would become a self-loop.
	assert_eq!(outcome.migrated_edges, 1);
	let tgt_edges = graph.foreign_edges_of("tgt").await;
	assert!(
		tgt_edges
			.iter()
			.any(|e| e.source_id == "tgt" && e.target_id == "ctx")
	);
}

/// Approving a review item merges through the engine with full provenance.
#[tokio::test]
async fn review_approval_triggers_merge() {
	let graph = MemoryGraph::new();
	let options = ResolutionOptions::default()
		.with_thresholds(0.92, 0.80, 0.40)
		.unwrap();
	let resolver = Arc::new(
		EntityResolver::new(
			graph.repositories(),
			Normalizer::with_default_rules(),
			options,
		)
		.unwrap()
		.with_review_queue(Arc::new(graph.clone())),
	);

	resolver
		.resolve("Acme Holdings International", EntityType::Company)
		.await
		.unwrap();
	let review = resolver.resolve("Acme", EntityType::Company).await.unwrap();
	assert_eq!(review.decision, MatchOutcome::Review);

	let service = ReviewService::new(
		Arc::new(graph.clone()),
		resolver.merge_engine().clone(),
		"mimir",
	);
	let pending = mimir::repo::ReviewRepo::get_pending(&graph, 0, 10)
		.await
		.unwrap();
	let outcome = service.approve(&pending[0].id, "analyst-1").await.unwrap();

	assert_eq!(outcome.record.decision, MatchOutcome::Review);
	let canonical = graph.canonical_id(&review.entity.id).await.unwrap();
	assert_eq!(canonical, pending[0].candidate_entity_id);

	// The input name is now a synonym of the canonical.
	let synonyms = SynonymRepo::find_by_entity(&graph, &canonical).await.unwrap();
	assert!(synonyms.iter().any(|s| s.value == "Acme"));
	graph.check_merge_invariant().await.unwrap();
}

/// Ledger that always fails, forcing every merge saga to compensate.
struct FailingLedger;

#[async_trait::async_trait]
impl mimir::repo::MergeLedgerRepo for FailingLedger {
	async fn record(&self, _record: &mimir::model::MergeRecord) -> mimir::error::Result<()> {
		Err(mimir::error::ResolutionError::Store(
			"ledger unavailable".to_string(),
		))
	}

	async fn history_for(
		&self,
		_entity_id: &str,
	) -> mimir::error::Result<Vec<mimir::model::MergeRecord>> {
		Ok(Vec::new())
	}
}

/// Auto-merge failure downgrades the resolution to REVIEW instead of
/// failing the call, and the saga leaves the graph compensated.
#[tokio::test]
async fn auto_merge_failure_downgrades_to_review() {
	let graph = MemoryGraph::new();
	let mut repos = graph.repositories();
	repos.ledger = Arc::new(FailingLedger);

	let options = ResolutionOptions::default()
		.with_thresholds(0.65, 0.55, 0.40)
		.unwrap();
	let resolver = Arc::new(
		EntityResolver::new(repos, Normalizer::with_default_rules(), options)
			.unwrap()
			.with_review_queue(Arc::new(graph.clone())),
	);
	let org: EntityType = "ORGANIZATION".parse().unwrap();

	let original = resolver
		.resolve("Microsoft Corporation", org.clone())
		.await
		.unwrap();
	let resolved = resolver
		.resolve("Microsft Corporatoin", org)
		.await
		.unwrap();

	assert_eq!(resolved.decision, MatchOutcome::Review);
	assert!(resolved.reasoning.starts_with("auto-merge failed:"));
	assert_ne!(resolved.entity.id, original.entity.id);

	// The compensations undid the half-merge: both entities ACTIVE, no
	// synonym left behind on the target.
	let transient = EntityRepo::find_by_id(&graph, &resolved.entity.id)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(transient.status, EntityStatus::Active);
	assert!(
		SynonymRepo::find_by_entity(&graph, &original.entity.id)
			.await
			.unwrap()
			.is_empty()
	);

	// The review item links the transient input entity to the candidate.
	let pending = mimir::repo::ReviewRepo::get_pending(&graph, 0, 10)
		.await
		.unwrap();
	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].source_entity_id, resolved.entity.id);
	assert_eq!(pending[0].candidate_entity_id, original.entity.id);
	graph.check_merge_invariant().await.unwrap();
}
