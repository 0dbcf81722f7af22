//! Per-key resolution lock.
//!
//! Serializes concurrent resolutions of the same `(normalized_name, type)`
//! key so at most one performs candidate selection and entity creation; the
//! others observe the cached result on re-check. Acquisition failure is
//! non-fatal by contract: the orchestrator proceeds without the lock and a
//! later fuzzy match reconciles any duplicate.
//!
//! The orchestrator never holds two keys at once, so no lock ordering is
//! required.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::error::Result;

/// Lock capability. `try_lock` returns whether the key was acquired within
/// the timeout; `unlock` must only be called by the holder.
#[async_trait]
pub trait ResolutionLock: Send + Sync {
	async fn try_lock(&self, key: &str, timeout: Duration) -> Result<bool>;

	async fn unlock(&self, key: &str) -> Result<()>;
}

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// In-process lock table. A distributed deployment substitutes an
/// implementation backed by its coordination service; the contract is the
/// same.
#[derive(Default)]
pub struct InProcessLock {
	held: DashMap<String, ()>,
}

impl InProcessLock {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl ResolutionLock for InProcessLock {
	async fn try_lock(&self, key: &str, timeout: Duration) -> Result<bool> {
		let deadline = Instant::now() + timeout;
		loop {
			match self.held.entry(key.to_string()) {
				Entry::Vacant(slot) => {
					slot.insert(());
					return Ok(true);
				}
				Entry::Occupied(_) => {}
			}
			if Instant::now() >= deadline {
				return Ok(false);
			}
			tokio::time::sleep(RETRY_INTERVAL).await;
		}
	}

	async fn unlock(&self, key: &str) -> Result<()> {
		self.held.remove(key);
		Ok(())
	}
}

/// Lock that always grants; used when locking is disabled. Duplicate entity
/// creation then becomes possible and is reconciled by later merges.
pub struct NoopLock;

#[async_trait]
impl ResolutionLock for NoopLock {
	async fn try_lock(&self, _key: &str, _timeout: Duration) -> Result<bool> {
		Ok(true)
	}

	async fn unlock(&self, _key: &str) -> Result<()> {
		Ok(())
	}
}
