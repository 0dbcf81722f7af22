use anyhow::Result;
use serde::Deserialize;

use crate::error::{ResolutionError, Result as CoreResult};
use crate::similarity::SimilarityWeights;

/// Runtime configuration for Mimir.
///
/// Values are loaded from (in order): `config` file (optional) and environment
/// variables prefixed with `MIMIR_` (e.g. `MIMIR_DATABASE_URL`). This covers
/// the hosting concerns; per-call behavior lives on [`ResolutionOptions`].
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Settings {
	pub database_url: Option<String>,
	/// Apache AGE graph name to target.
	pub graph: String,
	pub log_level: Option<String>,
	pub db_connect_retries: u32,
	pub db_connect_backoff_ms: u64,
	/// Resolution cache capacity (entries).
	pub cache_capacity: usize,
	/// Resolution cache TTL in seconds.
	pub cache_ttl_secs: u64,
	/// Per-key lock acquisition wait in milliseconds.
	pub lock_wait_ms: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			database_url: None,
			graph: "mimir_graph".to_string(),
			log_level: Some("info".to_string()),
			db_connect_retries: 60,
			db_connect_backoff_ms: 1000,
			cache_capacity: 10_000,
			cache_ttl_secs: 300,
			lock_wait_ms: 5_000,
		}
	}
}

/// Partial settings used to overlay environment/file values on top of defaults.
#[derive(Debug, Deserialize)]
struct PartialSettings {
	database_url: Option<String>,
	graph: Option<String>,
	log_level: Option<String>,
	db_connect_retries: Option<u32>,
	db_connect_backoff_ms: Option<u64>,
	cache_capacity: Option<usize>,
	cache_ttl_secs: Option<u64>,
	lock_wait_ms: Option<u64>,
}

/// Load settings from config file (optional) and environment variables.
pub fn load() -> Result<Settings> {
	let builder = config::Config::builder()
		.add_source(config::File::with_name("config").required(false))
		// Double-underscore separator so single-underscore env names like
		// `MIMIR_DATABASE_URL` map to `database_url` instead of nested keys.
		.add_source(config::Environment::with_prefix("MIMIR").separator("__"));

	let cfg = builder.build()?;
	let partial: PartialSettings = cfg.try_deserialize()?;

	let mut s = Settings::default();
	if let Some(db) = partial.database_url {
		s.database_url = Some(db);
	}
	if let Some(graph) = partial.graph {
		s.graph = graph;
	}
	if let Some(level) = partial.log_level {
		s.log_level = Some(level);
	}
	if let Some(retries) = partial.db_connect_retries {
		s.db_connect_retries = retries;
	}
	if let Some(backoff) = partial.db_connect_backoff_ms {
		s.db_connect_backoff_ms = backoff;
	}
	if let Some(capacity) = partial.cache_capacity {
		s.cache_capacity = capacity;
	}
	if let Some(ttl) = partial.cache_ttl_secs {
		s.cache_ttl_secs = ttl;
	}
	if let Some(wait) = partial.lock_wait_ms {
		s.lock_wait_ms = wait;
	}

	// Explicitly prefer direct environment variables when present. Some
	// environments (CI, test harnesses) set env vars in ways the `config`
	// crate doesn't map as expected; read them directly so explicit
	// overrides take effect.
	if let Ok(db) = std::env::var("MIMIR_DATABASE_URL") {
		if !db.is_empty() {
			s.database_url = Some(db);
		}
	}
	if let Ok(g) = std::env::var("MIMIR_GRAPH") {
		if !g.is_empty() {
			s.graph = g;
		}
	}
	if let Ok(l) = std::env::var("MIMIR_LOG_LEVEL") {
		if !l.is_empty() {
			s.log_level = Some(l);
		}
	}

	Ok(s)
}

/// Per-call configuration knobs for the resolution state machine.
///
/// Threshold invariant: `auto_merge_threshold >= synonym_threshold >=
/// review_threshold`; constructors and setters enforce it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOptions {
	/// Permit LLM enrichment when the best fuzzy score lies in the uncertain
	/// band between the review and auto-merge thresholds.
	pub use_llm: bool,
	pub auto_merge_threshold: f64,
	pub synonym_threshold: f64,
	pub review_threshold: f64,
	/// Lower bound for accepting an LLM verdict over the fuzzy score.
	pub llm_confidence_threshold: f64,
	pub similarity_weights: SimilarityWeights,
	/// Tag recorded on audit entries and duplicate records.
	pub source_system: String,
	pub auto_merge_enabled: bool,
	pub max_batch_size: usize,
	pub batch_commit_chunk_size: usize,
	/// Deadline for each call made through the async facade.
	pub async_timeout_ms: u64,
}

impl Default for ResolutionOptions {
	fn default() -> Self {
		Self {
			use_llm: false,
			auto_merge_threshold: 0.92,
			synonym_threshold: 0.80,
			review_threshold: 0.60,
			llm_confidence_threshold: 0.75,
			similarity_weights: SimilarityWeights::default(),
			source_system: "mimir".to_string(),
			auto_merge_enabled: true,
			max_batch_size: 1_000,
			batch_commit_chunk_size: 100,
			async_timeout_ms: 30_000,
		}
	}
}

impl ResolutionOptions {
	/// Replace the three decision thresholds, enforcing the ordering
	/// invariant.
	pub fn with_thresholds(
		mut self,
		auto_merge: f64,
		synonym: f64,
		review: f64,
	) -> CoreResult<Self> {
		self.auto_merge_threshold = auto_merge;
		self.synonym_threshold = synonym;
		self.review_threshold = review;
		self.validate()?;
		Ok(self)
	}

	pub fn with_weights(mut self, weights: SimilarityWeights) -> CoreResult<Self> {
		self.similarity_weights = weights;
		self.validate()?;
		Ok(self)
	}

	pub fn with_llm(mut self, use_llm: bool) -> Self {
		self.use_llm = use_llm;
		self
	}

	pub fn with_auto_merge_enabled(mut self, enabled: bool) -> Self {
		self.auto_merge_enabled = enabled;
		self
	}

	pub fn with_source_system(mut self, source_system: impl Into<String>) -> Self {
		self.source_system = source_system.into();
		self
	}

	pub fn validate(&self) -> CoreResult<()> {
		for (name, value) in [
			("auto_merge_threshold", self.auto_merge_threshold),
			("synonym_threshold", self.synonym_threshold),
			("review_threshold", self.review_threshold),
			("llm_confidence_threshold", self.llm_confidence_threshold),
		] {
			if !(0.0..=1.0).contains(&value) {
				return Err(ResolutionError::InvalidInput(format!(
					"{name} must be in [0, 1], got {value}"
				)));
			}
		}
		if self.auto_merge_threshold < self.synonym_threshold {
			return Err(ResolutionError::InvalidInput(format!(
				"auto_merge_threshold ({}) must be >= synonym_threshold ({})",
				self.auto_merge_threshold, self.synonym_threshold
			)));
		}
		if self.synonym_threshold < self.review_threshold {
			return Err(ResolutionError::InvalidInput(format!(
				"synonym_threshold ({}) must be >= review_threshold ({})",
				self.synonym_threshold, self.review_threshold
			)));
		}
		if self.max_batch_size == 0 {
			return Err(ResolutionError::InvalidInput(
				"max_batch_size must be positive".to_string(),
			));
		}
		if self.batch_commit_chunk_size == 0 {
			return Err(ResolutionError::InvalidInput(
				"batch_commit_chunk_size must be positive".to_string(),
			));
		}
		self.similarity_weights.validate()
	}

	pub fn thresholds(&self) -> crate::model::Thresholds {
		crate::model::Thresholds {
			auto_merge: self.auto_merge_threshold,
			synonym: self.synonym_threshold,
			review: self.review_threshold,
		}
	}
}
