//! Merge-stable entity handle.
//!
//! An [`EntityRef`] holds no entity object, only the original id, the type,
//! and an optional resolver capability that traverses `MERGED_INTO*` to the
//! current canonical id. The handle stays valid across merges: after the
//! entity it points at is merged away, `canonical_id()` returns the merge
//! target's id, exactly and forever.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

use super::EntityType;

/// Capability that resolves an entity id to its current canonical id by
/// following the merge chain. Implementations must be side-effect-free and
/// safe under concurrent calls.
#[async_trait]
pub trait CanonicalResolver: Send + Sync {
	async fn canonical_id(&self, id: &str) -> Result<String>;
}

/// Opaque, merge-stable handle to an entity.
///
/// Identity is the pair (current canonical id, type), not the original id:
/// compare handles with [`EntityRef::same_entity`]. Canonical resolution is
/// graph I/O, so the handle intentionally implements neither `Eq` nor `Hash`
/// on canonical identity.
#[derive(Clone)]
pub struct EntityRef {
	original_id: String,
	entity_type: EntityType,
	resolver: Option<Arc<dyn CanonicalResolver>>,
}

impl EntityRef {
	/// A pinned handle with no resolver: `canonical_id()` always returns the
	/// original id. Suitable for entities known to be ACTIVE snapshots.
	pub fn pinned(id: impl Into<String>, entity_type: EntityType) -> Self {
		Self {
			original_id: id.into(),
			entity_type,
			resolver: None,
		}
	}

	/// A lazy handle bound to a resolver capability.
	pub fn with_resolver(
		id: impl Into<String>,
		entity_type: EntityType,
		resolver: Arc<dyn CanonicalResolver>,
	) -> Self {
		Self {
			original_id: id.into(),
			entity_type,
			resolver: Some(resolver),
		}
	}

	/// The id this handle was created with. Immutable.
	pub fn original_id(&self) -> &str {
		&self.original_id
	}

	pub fn entity_type(&self) -> &EntityType {
		&self.entity_type
	}

	/// The current canonical id: the end of the `MERGED_INTO*` chain from the
	/// original id, or the original id itself for a pinned handle.
	pub async fn canonical_id(&self) -> Result<String> {
		match &self.resolver {
			Some(resolver) => resolver.canonical_id(&self.original_id).await,
			None => Ok(self.original_id.clone()),
		}
	}

	/// Whether the original entity has been merged away.
	pub async fn was_merged(&self) -> Result<bool> {
		Ok(self.canonical_id().await? != self.original_id)
	}

	/// Whether two handles currently denote the same canonical entity:
	/// equal types and equal canonical ids.
	pub async fn same_entity(&self, other: &EntityRef) -> Result<bool> {
		if self.entity_type != other.entity_type {
			return Ok(false);
		}
		Ok(self.canonical_id().await? == other.canonical_id().await?)
	}
}

impl fmt::Debug for EntityRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EntityRef")
			.field("original_id", &self.original_id)
			.field("entity_type", &self.entity_type)
			.field("lazy", &self.resolver.is_some())
			.finish()
	}
}
