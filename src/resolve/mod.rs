//! Resolution orchestrator.
//!
//! Implements the resolution state machine: validate → normalize → cache →
//! per-key lock (double-checked) → exact match → synonym match → blocked
//! fuzzy match → optional LLM enrichment → outcome action → cache populate.
//! Every fuzzy candidate produces a persisted decision record before any
//! mutation, and every resolution emits one correlated audit chain.

pub mod batch;
pub mod facade;

pub use batch::{BatchContext, BatchItemError, BatchResult};
pub use facade::ResolveRequest;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocking::{BlockingStrategy, DefaultBlockingStrategy};
use crate::cache::{CacheKey, NoopResolutionCache, ResolutionCache};
use crate::config::ResolutionOptions;
use crate::error::{ResolutionError, Result};
use crate::llm::{LlmProvider, NoopLlmProvider};
use crate::lock::{NoopLock, ResolutionLock};
use crate::merge::{MergeEngine, MergeRequest};
use crate::model::{
	AuditAction, AuditEntry, Entity, EntityRef, EntityStatus, EntityType, MatchDecisionRecord,
	MatchOutcome, ReviewItem, ReviewStatus, Synonym, SynonymSource,
};
use crate::normalize::Normalizer;
use crate::repo::{Repositories, ReviewRepo};
use crate::similarity::CompositeScorer;

// Pipeline counters, exposed in Prometheus text form via `metrics_text`.
static RESOLUTIONS_TOTAL: AtomicU64 = AtomicU64::new(0);
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);
static EXACT_MATCHES: AtomicU64 = AtomicU64::new(0);
static SYNONYM_MATCHES: AtomicU64 = AtomicU64::new(0);
static AUTO_MERGES: AtomicU64 = AtomicU64::new(0);
static SYNONYMS_CREATED: AtomicU64 = AtomicU64::new(0);
static REVIEWS_REQUESTED: AtomicU64 = AtomicU64::new(0);
static ENTITIES_CREATED: AtomicU64 = AtomicU64::new(0);
static BLOCKING_FALLBACKS: AtomicU64 = AtomicU64::new(0);
static LOCK_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Prometheus-compatible text for the resolution counters.
pub fn metrics_text() -> String {
	let counters: [(&str, &str, &AtomicU64); 10] = [
		(
			"mimir_resolutions_total",
			"Total resolution calls",
			&RESOLUTIONS_TOTAL,
		),
		("mimir_cache_hits_total", "Resolution cache hits", &CACHE_HITS),
		(
			"mimir_exact_matches_total",
			"Exact normalized-name matches",
			&EXACT_MATCHES,
		),
		(
			"mimir_synonym_matches_total",
			"Synonym lookups that matched",
			&SYNONYM_MATCHES,
		),
		("mimir_auto_merges_total", "Automatic merges", &AUTO_MERGES),
		(
			"mimir_synonyms_created_total",
			"Synonyms created from resolutions",
			&SYNONYMS_CREATED,
		),
		(
			"mimir_reviews_requested_total",
			"Resolutions routed to review",
			&REVIEWS_REQUESTED,
		),
		(
			"mimir_entities_created_total",
			"New entities created",
			&ENTITIES_CREATED,
		),
		(
			"mimir_blocking_fallbacks_total",
			"Fuzzy scans that fell back to a full active scan",
			&BLOCKING_FALLBACKS,
		),
		(
			"mimir_lock_failures_total",
			"Per-key lock acquisitions that timed out",
			&LOCK_FAILURES,
		),
	];
	let mut out = String::new();
	for (name, help, counter) in counters {
		out.push_str(&format!("# HELP {name} {help}\n"));
		out.push_str(&format!("# TYPE {name} counter\n"));
		out.push_str(&format!("{name} {}\n", counter.load(Ordering::Relaxed)));
	}
	out
}

/// Outcome of one resolution call.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
	/// Merge-stable handle to the resolved entity.
	pub entity_ref: EntityRef,
	/// Snapshot of the canonical entity at resolution time.
	pub entity: Entity,
	pub synonyms: Vec<Synonym>,
	pub decision: MatchOutcome,
	pub confidence: f64,
	pub reasoning: String,
	pub is_new_entity: bool,
	pub was_merged: bool,
	pub was_matched_via_synonym: bool,
	pub was_new_synonym_created: bool,
	pub input_name: String,
	pub matched_name: Option<String>,
}

#[cfg(test)]
impl ResolutionResult {
	pub(crate) fn test_fixture(
		id: &str,
		entity_type: EntityType,
		decision: MatchOutcome,
	) -> Self {
		let now = Utc::now();
		Self {
			entity_ref: EntityRef::pinned(id, entity_type.clone()),
			entity: Entity {
				id: id.to_string(),
				canonical_name: "fixture".to_string(),
				normalized_name: "fixture".to_string(),
				entity_type,
				confidence_score: 1.0,
				status: EntityStatus::Active,
				created_at: now,
				updated_at: now,
			},
			synonyms: Vec::new(),
			decision,
			confidence: 1.0,
			reasoning: "fixture".to_string(),
			is_new_entity: false,
			was_merged: false,
			was_matched_via_synonym: false,
			was_new_synonym_created: false,
			input_name: "fixture".to_string(),
			matched_name: None,
		}
	}
}

/// Best fuzzy candidate tracked through the scan.
struct BestCandidate {
	entity: Entity,
	score: f64,
	/// Set when an accepted LLM verdict overrides the composite outcome.
	llm_decision: Option<MatchOutcome>,
	reasoning: String,
}

pub struct EntityResolver {
	repos: Repositories,
	merge_engine: MergeEngine,
	normalizer: Arc<Normalizer>,
	blocking: Arc<dyn BlockingStrategy>,
	cache: Arc<dyn ResolutionCache>,
	lock: Arc<dyn ResolutionLock>,
	llm: Arc<dyn LlmProvider>,
	review_queue: Option<Arc<dyn ReviewRepo>>,
	defaults: ResolutionOptions,
	lock_wait: Duration,
}

impl EntityResolver {
	/// Compose a resolver. Repositories, the normalizer, and the options are
	/// required; optional capabilities default to no-op implementations and
	/// are attached with the `with_*` builders.
	pub fn new(
		repos: Repositories,
		normalizer: Normalizer,
		defaults: ResolutionOptions,
	) -> Result<Self> {
		defaults.validate()?;
		let merge_engine = MergeEngine::new(repos.clone());
		Ok(Self {
			repos,
			merge_engine,
			normalizer: Arc::new(normalizer),
			blocking: Arc::new(DefaultBlockingStrategy::default()),
			cache: Arc::new(NoopResolutionCache),
			lock: Arc::new(NoopLock),
			llm: Arc::new(NoopLlmProvider),
			review_queue: None,
			defaults,
			lock_wait: Duration::from_secs(5),
		})
	}

	pub fn with_blocking(mut self, blocking: Arc<dyn BlockingStrategy>) -> Self {
		self.blocking = blocking;
		self
	}

	pub fn with_cache(mut self, cache: Arc<dyn ResolutionCache>) -> Self {
		self.cache = cache;
		self
	}

	pub fn with_lock(mut self, lock: Arc<dyn ResolutionLock>, wait: Duration) -> Self {
		self.lock = lock;
		self.lock_wait = wait;
		self
	}

	pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
		self.llm = llm;
		self
	}

	pub fn with_review_queue(mut self, queue: Arc<dyn ReviewRepo>) -> Self {
		self.review_queue = Some(queue);
		self
	}

	pub fn options(&self) -> &ResolutionOptions {
		&self.defaults
	}

	pub fn merge_engine(&self) -> &MergeEngine {
		&self.merge_engine
	}

	pub fn repositories(&self) -> &Repositories {
		&self.repos
	}

	pub fn normalizer(&self) -> &Normalizer {
		&self.normalizer
	}

	/// Resolve with the resolver's default options.
	pub async fn resolve(&self, name: &str, entity_type: EntityType) -> Result<ResolutionResult> {
		let options = self.defaults.clone();
		self.resolve_with(name, entity_type, &options).await
	}

	/// Resolve one raw mention into a canonical entity.
	pub async fn resolve_with(
		&self,
		name: &str,
		entity_type: EntityType,
		options: &ResolutionOptions,
	) -> Result<ResolutionResult> {
		options.validate()?;
		validate_input(name)?;
		RESOLUTIONS_TOTAL.fetch_add(1, Ordering::Relaxed);

		let correlation_id = Uuid::new_v4().to_string();
		let normalized = self.normalizer.normalize(name, &entity_type);
		let cache_key = CacheKey::new(normalized.clone(), entity_type.clone());

		if let Some(hit) = self.cache.get(&cache_key).await {
			CACHE_HITS.fetch_add(1, Ordering::Relaxed);
			return Ok(hit);
		}

		let lock_key = format!("{normalized}:{entity_type}");
		let locked = match self.lock.try_lock(&lock_key, self.lock_wait).await {
			Ok(true) => true,
			Ok(false) => {
				LOCK_FAILURES.fetch_add(1, Ordering::Relaxed);
				warn!(key = %lock_key, "resolution lock not acquired; continuing unlocked");
				false
			}
			Err(e) => {
				LOCK_FAILURES.fetch_add(1, Ordering::Relaxed);
				warn!(key = %lock_key, error = %e, "resolution lock errored; continuing unlocked");
				false
			}
		};

		// Double-checked: a concurrent holder may have populated the cache
		// while we waited on the lock.
		if locked {
			if let Some(hit) = self.cache.get(&cache_key).await {
				CACHE_HITS.fetch_add(1, Ordering::Relaxed);
				let _ = self.lock.unlock(&lock_key).await;
				return Ok(hit);
			}
		}

		let outcome = self
			.resolve_uncached(name, &normalized, &entity_type, options, &correlation_id)
			.await;

		if locked {
			if let Err(e) = self.lock.unlock(&lock_key).await {
				warn!(key = %lock_key, error = %e, "resolution lock release failed");
			}
		}

		let result = outcome?;
		if result.decision != MatchOutcome::Review {
			self.cache.put(cache_key, result.clone()).await;
		}
		Ok(result)
	}

	async fn resolve_uncached(
		&self,
		name: &str,
		normalized: &str,
		entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
	) -> Result<ResolutionResult> {
		// Exact match on the normalized name. Insertion order is stable, the
		// first hit wins.
		let exact = self
			.repos
			.entities
			.find_by_normalized_name(normalized, entity_type)
			.await?;
		if let Some(entity) = exact.into_iter().next() {
			EXACT_MATCHES.fetch_add(1, Ordering::Relaxed);
			let synonyms = self.repos.synonyms.find_by_entity(&entity.id).await?;
			let matched_name = entity.canonical_name.clone();
			return Ok(self.result_for(
				entity,
				synonyms,
				MatchOutcome::AutoMerge,
				1.0,
				"exact normalized-name match".to_string(),
				ResultFlags {
					matched_name: Some(matched_name),
					..ResultFlags::default()
				},
				name,
			));
		}

		// Synonym lookup; reinforcement is best-effort side work.
		if let Some((synonym, entity)) = self
			.repos
			.synonyms
			.find_by_normalized_value(normalized, entity_type)
			.await?
		{
			SYNONYM_MATCHES.fetch_add(1, Ordering::Relaxed);
			if let Err(e) = self.repos.synonyms.reinforce(&synonym.id, Utc::now()).await {
				warn!(synonym_id = %synonym.id, error = %e, "synonym reinforcement failed");
			}
			let synonyms = self.repos.synonyms.find_by_entity(&entity.id).await?;
			return Ok(self.result_for(
				entity,
				synonyms,
				MatchOutcome::AutoMerge,
				1.0,
				format!("matched synonym {:?}", synonym.value),
				ResultFlags {
					was_matched_via_synonym: true,
					matched_name: Some(synonym.value),
					..ResultFlags::default()
				},
				name,
			));
		}

		// Blocked fuzzy scan.
		let best = self
			.fuzzy_scan(name, normalized, entity_type, options, correlation_id)
			.await?;

		let outcome = best.as_ref().map(|b| {
			b.llm_decision
				.unwrap_or_else(|| options.thresholds().outcome_for(b.score))
		});

		match (outcome, best) {
			(Some(MatchOutcome::AutoMerge), Some(best)) if options.auto_merge_enabled => {
				self.auto_merge(name, normalized, entity_type, options, correlation_id, best)
					.await
			}
			(Some(MatchOutcome::AutoMerge), Some(best)) => {
				debug!(candidate = %best.entity.id, "auto-merge disabled; routing to review");
				self.request_review(
					name,
					normalized,
					entity_type,
					options,
					correlation_id,
					best,
					"auto-merge disabled".to_string(),
				)
				.await
			}
			(Some(MatchOutcome::Synonym), Some(best)) => {
				self.attach_synonym(name, normalized, entity_type, options, correlation_id, best)
					.await
			}
			(Some(MatchOutcome::Review), Some(best)) => {
				let reasoning = best.reasoning.clone();
				self.request_review(
					name,
					normalized,
					entity_type,
					options,
					correlation_id,
					best,
					reasoning,
				)
				.await
			}
			_ => {
				let entity = self
					.create_entity(name, normalized, entity_type, options, correlation_id)
					.await?;
				Ok(self.result_for(
					entity,
					Vec::new(),
					MatchOutcome::NoMatch,
					1.0,
					"no candidate at or above the review threshold".to_string(),
					ResultFlags {
						is_new_entity: true,
						..ResultFlags::default()
					},
					name,
				))
			}
		}
	}

	/// Compute composite scores for every blocked candidate, persisting one
	/// decision record per candidate before any mutation. Ties keep the
	/// first-seen candidate.
	async fn fuzzy_scan(
		&self,
		name: &str,
		normalized: &str,
		entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
	) -> Result<Option<BestCandidate>> {
		let keys = self.blocking.keys(normalized);
		let mut candidates = self
			.repos
			.entities
			.find_by_blocking_keys(&keys, entity_type)
			.await?;
		if candidates.is_empty() {
			// Bounded event: without blocking candidates the scan degrades to
			// the full active set of this type.
			BLOCKING_FALLBACKS.fetch_add(1, Ordering::Relaxed);
			warn!(%normalized, %entity_type, "no blocking candidates; full active scan");
			candidates = self.repos.entities.find_active_by_type(entity_type).await?;
		}
		if candidates.is_empty() {
			return Ok(None);
		}

		let scorer = CompositeScorer::new(options.similarity_weights)?;
		let thresholds = options.thresholds();
		let temp_id = Uuid::new_v4().to_string();
		let now = Utc::now();

		let mut records = Vec::with_capacity(candidates.len());
		let mut best: Option<BestCandidate> = None;
		for candidate in candidates {
			let (breakdown, score) = scorer.score(normalized, &candidate.normalized_name);
			records.push(MatchDecisionRecord {
				id: Uuid::new_v4().to_string(),
				input_entity_temp_id: temp_id.clone(),
				candidate_entity_id: candidate.id.clone(),
				entity_type: entity_type.clone(),
				scores: breakdown,
				final_score: score,
				thresholds,
				outcome: thresholds.outcome_for(score),
				evaluator: "SYSTEM".to_string(),
				evaluated_at: now,
			});
			let improves = best.as_ref().is_none_or(|b| score > b.score);
			if improves {
				let reasoning = format!(
					"composite similarity {score:.3} against {:?}",
					candidate.canonical_name
				);
				best = Some(BestCandidate {
					entity: candidate,
					score,
					llm_decision: None,
					reasoning,
				});
			}
		}

		// Decision records precede any merge or synonym mutation.
		self.repos.decisions.record_all(&records).await?;
		debug!(candidates = records.len(), temp_id = %temp_id, "fuzzy scan complete");

		let best = match best {
			Some(best) => best,
			None => return Ok(None),
		};
		Ok(Some(
			self.maybe_enrich(name, entity_type, options, correlation_id, best)
				.await,
		))
	}

	/// LLM enrichment applies only in the uncertain band between the review
	/// and auto-merge thresholds, and only when the provider is available.
	/// Provider failure is never fatal.
	async fn maybe_enrich(
		&self,
		name: &str,
		entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
		mut best: BestCandidate,
	) -> BestCandidate {
		let uncertain = best.score > options.review_threshold
			&& best.score < options.auto_merge_threshold;
		if !options.use_llm || !uncertain || !self.llm.available().await {
			return best;
		}

		let mut details = Map::new();
		details.insert("correlationId".to_string(), json!(correlation_id));
		details.insert("rawName".to_string(), json!(name));
		details.insert("candidateName".to_string(), json!(best.entity.canonical_name));
		details.insert("compositeScore".to_string(), json!(best.score));
		self.audit(
			AuditAction::LlmEnrichmentRequested,
			&best.entity.id,
			&options.source_system,
			details.clone(),
		)
		.await;

		match self
			.llm
			.enrich(name, &best.entity.canonical_name, entity_type, &best.entity.id)
			.await
		{
			Ok(verdict) => {
				details.insert("score".to_string(), json!(verdict.score));
				details.insert("decision".to_string(), json!(verdict.decision));
				details.insert("reasoning".to_string(), json!(verdict.reasoning));
				self.audit(
					AuditAction::LlmEnrichmentCompleted,
					&best.entity.id,
					&options.source_system,
					details,
				)
				.await;

				if verdict.score >= options.llm_confidence_threshold {
					best.score = verdict.score;
					best.llm_decision = Some(verdict.decision);
					best.reasoning = format!("llm verdict: {}", verdict.reasoning);
				} else {
					debug!(
						score = verdict.score,
						threshold = options.llm_confidence_threshold,
						"llm verdict below confidence threshold; keeping composite score"
					);
				}
			}
			Err(e) => {
				warn!(error = %e, "llm enrichment failed; continuing with composite score");
			}
		}
		best
	}

	async fn auto_merge(
		&self,
		name: &str,
		normalized: &str,
		entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
		best: BestCandidate,
	) -> Result<ResolutionResult> {
		// Create-then-merge: the input becomes a transient entity whose
		// MERGED_INTO edge records where it went.
		let transient = self
			.create_entity(name, normalized, entity_type, options, correlation_id)
			.await?;

		let request = MergeRequest {
			source_id: transient.id.clone(),
			target_id: best.entity.id.clone(),
			confidence: best.score,
			decision: MatchOutcome::AutoMerge,
			triggered_by: "SYSTEM".to_string(),
			reasoning: best.reasoning.clone(),
			source_system: options.source_system.clone(),
			correlation_id: Some(correlation_id.to_string()),
			strategy: Default::default(),
		};

		match self.merge_engine.merge(request).await {
			Ok(outcome) => {
				AUTO_MERGES.fetch_add(1, Ordering::Relaxed);
				let entity = self
					.repos
					.entities
					.find_by_id(&best.entity.id)
					.await?
					.ok_or_else(|| {
						ResolutionError::Internal(format!(
							"merge target {} vanished",
							best.entity.id
						))
					})?;
				let synonyms = self.repos.synonyms.find_by_entity(&entity.id).await?;
				let matched_name = entity.canonical_name.clone();
				Ok(self.result_for(
					entity,
					synonyms,
					MatchOutcome::AutoMerge,
					best.score,
					best.reasoning,
					ResultFlags {
						was_merged: true,
						was_new_synonym_created: outcome.synonym_id.is_some(),
						matched_name: Some(matched_name),
						..ResultFlags::default()
					},
					name,
				))
			}
			Err(e) => {
				warn!(error = %e, "auto-merge failed; downgrading to review");
				self.review_existing(
					name,
					options,
					correlation_id,
					transient,
					best,
					format!("auto-merge failed: {e}"),
				)
				.await
			}
		}
	}

	async fn attach_synonym(
		&self,
		name: &str,
		normalized: &str,
		_entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
		best: BestCandidate,
	) -> Result<ResolutionResult> {
		let now = Utc::now();
		let synonym = Synonym {
			id: Uuid::new_v4().to_string(),
			value: name.to_string(),
			normalized_value: normalized.to_string(),
			source: SynonymSource::System,
			confidence: best.score,
			created_at: now,
			last_confirmed_at: now,
			support_count: 0,
		};
		self.repos.synonyms.create(&best.entity.id, &synonym).await?;
		SYNONYMS_CREATED.fetch_add(1, Ordering::Relaxed);

		let mut details = Map::new();
		details.insert("correlationId".to_string(), json!(correlation_id));
		details.insert("synonymId".to_string(), json!(synonym.id));
		details.insert("value".to_string(), json!(name));
		details.insert("confidence".to_string(), json!(best.score));
		self.audit(
			AuditAction::SynonymCreated,
			&best.entity.id,
			&options.source_system,
			details,
		)
		.await;

		let synonyms = self.repos.synonyms.find_by_entity(&best.entity.id).await?;
		let matched_name = best.entity.canonical_name.clone();
		Ok(self.result_for(
			best.entity,
			synonyms,
			MatchOutcome::Synonym,
			best.score,
			best.reasoning,
			ResultFlags {
				was_new_synonym_created: true,
				matched_name: Some(matched_name),
				..ResultFlags::default()
			},
			name,
		))
	}

	/// REVIEW path for a fresh input: persist the input as a new ACTIVE
	/// entity so the adjudicated merge has a source, then queue it.
	async fn request_review(
		&self,
		name: &str,
		normalized: &str,
		entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
		best: BestCandidate,
		reasoning: String,
	) -> Result<ResolutionResult> {
		let entity = self
			.create_entity(name, normalized, entity_type, options, correlation_id)
			.await?;
		self.review_existing(name, options, correlation_id, entity, best, reasoning)
			.await
	}

	/// REVIEW path when the input entity already exists (fresh, or left over
	/// from a failed auto-merge).
	async fn review_existing(
		&self,
		name: &str,
		options: &ResolutionOptions,
		correlation_id: &str,
		entity: Entity,
		best: BestCandidate,
		reasoning: String,
	) -> Result<ResolutionResult> {
		REVIEWS_REQUESTED.fetch_add(1, Ordering::Relaxed);
		let item = ReviewItem {
			id: Uuid::new_v4().to_string(),
			source_entity_id: entity.id.clone(),
			candidate_entity_id: best.entity.id.clone(),
			input_name: name.to_string(),
			candidate_name: best.entity.canonical_name.clone(),
			entity_type: entity.entity_type.clone(),
			similarity_score: best.score,
			status: ReviewStatus::Pending,
			created_at: Utc::now(),
			resolved_at: None,
			resolved_by: None,
		};

		let mut queued = false;
		if let Some(queue) = &self.review_queue {
			match queue.submit(&item).await {
				Ok(()) => queued = true,
				Err(e) => {
					warn!(error = %e, "review queue submission failed; falling back to audit");
				}
			}
		}
		if !queued {
			let mut details = Map::new();
			details.insert("correlationId".to_string(), json!(correlation_id));
			details.insert("candidateEntityId".to_string(), json!(best.entity.id));
			details.insert("similarityScore".to_string(), json!(best.score));
			details.insert("reasoning".to_string(), json!(reasoning));
			self.audit(
				AuditAction::ManualReviewRequested,
				&entity.id,
				&options.source_system,
				details,
			)
			.await;
		}

		info!(
			entity = %entity.id,
			candidate = %best.entity.id,
			score = best.score,
			queued,
			"resolution routed to review"
		);
		let matched_name = best.entity.canonical_name.clone();
		Ok(self.result_for(
			entity,
			Vec::new(),
			MatchOutcome::Review,
			best.score,
			reasoning,
			ResultFlags {
				is_new_entity: true,
				matched_name: Some(matched_name),
				..ResultFlags::default()
			},
			name,
		))
	}

	async fn create_entity(
		&self,
		name: &str,
		normalized: &str,
		entity_type: &EntityType,
		options: &ResolutionOptions,
		correlation_id: &str,
	) -> Result<Entity> {
		let now = Utc::now();
		let entity = Entity {
			id: Uuid::new_v4().to_string(),
			canonical_name: name.to_string(),
			normalized_name: normalized.to_string(),
			entity_type: entity_type.clone(),
			confidence_score: 1.0,
			status: EntityStatus::Active,
			created_at: now,
			updated_at: now,
		};
		self.repos.entities.create(&entity).await?;
		let keys = self.blocking.keys(normalized);
		self.repos.entities.add_blocking_keys(&entity.id, &keys).await?;
		ENTITIES_CREATED.fetch_add(1, Ordering::Relaxed);

		let mut details = Map::new();
		details.insert("correlationId".to_string(), json!(correlation_id));
		details.insert("name".to_string(), json!(name));
		details.insert("normalizedName".to_string(), json!(normalized));
		details.insert("sourceSystem".to_string(), json!(options.source_system));
		self.audit(
			AuditAction::EntityCreated,
			&entity.id,
			&options.source_system,
			details,
		)
		.await;
		Ok(entity)
	}

	#[allow(clippy::too_many_arguments)]
	fn result_for(
		&self,
		entity: Entity,
		synonyms: Vec<Synonym>,
		decision: MatchOutcome,
		confidence: f64,
		reasoning: String,
		flags: ResultFlags,
		input_name: &str,
	) -> ResolutionResult {
		let entity_ref = EntityRef::with_resolver(
			entity.id.clone(),
			entity.entity_type.clone(),
			self.repos.canonical_resolver(),
		);
		ResolutionResult {
			entity_ref,
			entity,
			synonyms,
			decision,
			confidence,
			reasoning,
			is_new_entity: flags.is_new_entity,
			was_merged: flags.was_merged,
			was_matched_via_synonym: flags.was_matched_via_synonym,
			was_new_synonym_created: flags.was_new_synonym_created,
			input_name: input_name.to_string(),
			matched_name: flags.matched_name,
		}
	}

	/// Best-effort audit append; failures are logged, never propagated.
	async fn audit(
		&self,
		action: AuditAction,
		entity_id: &str,
		actor_id: &str,
		details: Map<String, Value>,
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

/// Raw-input validation: non-blank, bounded length, no C0/C1 control
/// characters (TAB/LF/CR exempt).
fn validate_input(name: &str) -> Result<()> {
	if name.trim().is_empty() {
		return Err(ResolutionError::InvalidInput(
			"name must not be blank".to_string(),
		));
	}
	if name.chars().count() > 1000 {
		return Err(ResolutionError::InvalidInput(
			"name exceeds 1000 characters".to_string(),
		));
	}
	if let Some(c) = name
		.chars()
		.find(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
	{
		return Err(ResolutionError::InvalidInput(format!(
			"name contains control character {c:?}"
		)));
	}
	Ok(())
}

#[derive(Default)]
struct ResultFlags {
	is_new_entity: bool,
	was_merged: bool,
	was_matched_via_synonym: bool,
	was_new_synonym_created: bool,
	matched_name: Option<String>,
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;
	use crate::store::MemoryGraph;

	fn resolver(graph: &MemoryGraph) -> EntityResolver {
		EntityResolver::new(
			graph.repositories(),
			Normalizer::with_default_rules(),
			ResolutionOptions::default(),
		)
		.expect("default options are valid")
	}

	#[test]
	fn blank_and_oversized_names_are_rejected() {
		assert!(validate_input("  ").is_err());
		assert!(validate_input(&"x".repeat(1001)).is_err());
		assert!(validate_input(&"x".repeat(1000)).is_ok());
	}

	#[test]
	fn control_characters_are_rejected_except_whitespace() {
		assert!(validate_input("bad\u{0007}name").is_err());
		assert!(validate_input("bad\u{009f}name").is_err());
		assert!(validate_input("ok\tname\r\n").is_ok());
	}

	#[tokio::test]
	async fn first_resolution_creates_a_new_entity() {
		let graph = MemoryGraph::new();
		let resolver = resolver(&graph);
		let result = resolver
			.resolve("Acme Corp", EntityType::Company)
			.await
			.unwrap();
		assert!(result.is_new_entity);
		assert_eq!(result.decision, MatchOutcome::NoMatch);
		assert_eq!(result.entity.normalized_name, "acme");
		assert_eq!(result.confidence, 1.0);
	}

	#[tokio::test]
	async fn repeat_resolution_hits_exact_match() {
		let graph = MemoryGraph::new();
		let resolver = resolver(&graph);
		let first = resolver
			.resolve("Acme Corp", EntityType::Company)
			.await
			.unwrap();
		let second = resolver
			.resolve("ACME CORPORATION", EntityType::Company)
			.await
			.unwrap();
		assert_eq!(first.entity.id, second.entity.id);
		assert_eq!(second.decision, MatchOutcome::AutoMerge);
		assert!(!second.was_matched_via_synonym);
		assert!(!second.is_new_entity);
	}

	#[tokio::test]
	async fn types_partition_the_namespace() {
		let graph = MemoryGraph::new();
		let resolver = resolver(&graph);
		let company = resolver
			.resolve("Mercury", EntityType::Company)
			.await
			.unwrap();
		let product = resolver
			.resolve("Mercury", EntityType::Product)
			.await
			.unwrap();
		assert_ne!(company.entity.id, product.entity.id);
		assert!(product.is_new_entity);
	}
}
