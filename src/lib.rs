//! Mimir: an entity-resolution engine over a property graph.
//!
//! Raw entity mentions (a name plus a coarse type) go in; a deduplicated,
//! auditable graph of canonical entities comes out, with explicit synonym
//! links, merge provenance, and library-managed relationships that survive
//! canonicalization.
//!
//! The pipeline: normalize → cache → per-key lock → exact match → synonym
//! match → blocked fuzzy match → optional LLM enrichment → decision. Merges
//! run as sagas with compensations; entity handles ([`model::EntityRef`])
//! stay valid across merges.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mimir::config::ResolutionOptions;
//! use mimir::model::EntityType;
//! use mimir::normalize::Normalizer;
//! use mimir::resolve::EntityResolver;
//! use mimir::store::MemoryGraph;
//!
//! # async fn demo() -> mimir::error::Result<()> {
//! let graph = MemoryGraph::new();
//! let resolver = Arc::new(EntityResolver::new(
//! 	graph.repositories(),
//! 	Normalizer::with_default_rules(),
//! 	ResolutionOptions::default(),
//! )?);
//!
//! let acme = resolver.resolve("Acme Corp", EntityType::Company).await?;
//! let same = resolver.resolve("ACME CORPORATION", EntityType::Company).await?;
//! assert_eq!(acme.entity.id, same.entity.id);
//! # Ok(())
//! # }
//! ```
//!
//! The production backend is Postgres + Apache AGE: build an
//! [`graph::AgeGraphStore`], wrap it with [`repo::Repositories::over_graph`],
//! and compose the resolver the same way.

pub mod blocking;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod lock;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod observability;
pub mod repo;
pub mod resolve;
pub mod review;
pub mod similarity;
pub mod store;

pub use config::{ResolutionOptions, Settings};
pub use error::{ResolutionError, Result};
pub use model::{Entity, EntityRef, EntityType, MatchOutcome};
pub use resolve::{BatchContext, BatchResult, EntityResolver, ResolutionResult, ResolveRequest};
