//! Bounded-concurrency facade over the resolver.
//!
//! Fans a set of resolution requests out across tasks behind a counting
//! semaphore, applies the per-call deadline from
//! `ResolutionOptions::async_timeout_ms`, and drains in-flight work within a
//! grace period on close.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::warn;

use crate::config::ResolutionOptions;
use crate::error::{ResolutionError, Result};
use crate::model::EntityType;

use super::{EntityResolver, ResolutionResult};

/// One unit of facade work.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
	pub name: String,
	pub entity_type: EntityType,
}

impl ResolveRequest {
	pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
		Self {
			name: name.into(),
			entity_type,
		}
	}
}

impl EntityResolver {
	/// Resolve with a deadline. The timeout comes from the options'
	/// `async_timeout_ms`.
	pub async fn resolve_with_timeout(
		&self,
		name: &str,
		entity_type: EntityType,
		options: &ResolutionOptions,
	) -> Result<ResolutionResult> {
		let deadline = Duration::from_millis(options.async_timeout_ms);
		match tokio::time::timeout(deadline, self.resolve_with(name, entity_type, options)).await
		{
			Ok(result) => result,
			Err(_) => Err(ResolutionError::Timeout(options.async_timeout_ms)),
		}
	}

	/// Fan out a batch of requests with at most `max_concurrency` in flight.
	/// Results are returned in request order; per-item failures do not abort
	/// the batch. `max_concurrency` of zero fails immediately.
	pub async fn resolve_many(
		self: Arc<Self>,
		requests: Vec<ResolveRequest>,
		max_concurrency: usize,
	) -> Result<Vec<Result<ResolutionResult>>> {
		if max_concurrency == 0 {
			return Err(ResolutionError::InvalidInput(
				"max_concurrency must be positive".to_string(),
			));
		}
		let semaphore = Arc::new(Semaphore::new(max_concurrency));
		let options = self.options().clone();

		let mut set: JoinSet<(usize, Result<ResolutionResult>)> = JoinSet::new();
		for (index, request) in requests.into_iter().enumerate() {
			let resolver = Arc::clone(&self);
			let semaphore = Arc::clone(&semaphore);
			let options = options.clone();
			set.spawn(async move {
				let _permit = match semaphore.acquire().await {
					Ok(permit) => permit,
					Err(_) => {
						return (
							index,
							Err(ResolutionError::Internal(
								"facade semaphore closed".to_string(),
							)),
						);
					}
				};
				let result = resolver
					.resolve_with_timeout(&request.name, request.entity_type, &options)
					.await;
				(index, result)
			});
		}

		let mut slots: Vec<Option<Result<ResolutionResult>>> = Vec::new();
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((index, result)) => {
					if slots.len() <= index {
						slots.resize_with(index + 1, || None);
					}
					slots[index] = Some(result);
				}
				Err(e) => {
					warn!(error = %e, "facade task panicked or was cancelled");
				}
			}
		}

		Ok(slots
			.into_iter()
			.map(|slot| {
				slot.unwrap_or_else(|| {
					Err(ResolutionError::Internal(
						"facade task produced no result".to_string(),
					))
				})
			})
			.collect())
	}
}

/// Handle for callers that spawn resolutions over time and want a graceful
/// drain on shutdown.
pub struct ResolverHandle {
	resolver: Arc<EntityResolver>,
	in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl ResolverHandle {
	pub fn new(resolver: Arc<EntityResolver>) -> Self {
		Self {
			resolver,
			in_flight: Mutex::new(Vec::new()),
		}
	}

	pub fn resolver(&self) -> &Arc<EntityResolver> {
		&self.resolver
	}

	/// Spawn a resolution and deliver the result through the returned
	/// receiver.
	pub async fn spawn_resolve(
		&self,
		request: ResolveRequest,
	) -> tokio::sync::oneshot::Receiver<Result<ResolutionResult>> {
		let (tx, rx) = tokio::sync::oneshot::channel();
		let resolver = Arc::clone(&self.resolver);
		let options = resolver.options().clone();
		let handle = tokio::spawn(async move {
			let result = resolver
				.resolve_with_timeout(&request.name, request.entity_type, &options)
				.await;
			let _ = tx.send(result);
		});
		self.in_flight.lock().await.push(handle);
		rx
	}

	/// Drain in-flight work, aborting whatever misses the grace period.
	pub async fn close(&self, grace: Duration) {
		let handles: Vec<JoinHandle<()>> = {
			let mut guard = self.in_flight.lock().await;
			guard.drain(..).collect()
		};
		let drain = async {
			for handle in &handles {
				// JoinHandle is not consumed by abort; awaiting needs
				// ownership, so poll completion cooperatively.
				while !handle.is_finished() {
					tokio::time::sleep(Duration::from_millis(5)).await;
				}
			}
		};
		if tokio::time::timeout(grace, drain).await.is_err() {
			for handle in &handles {
				if !handle.is_finished() {
					warn!("aborting resolution task past shutdown grace period");
					handle.abort();
				}
			}
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
	async fn zero_concurrency_fails_immediately() {
		let graph = MemoryGraph::new();
		let resolver = resolver(&graph);
		let err = resolver
			.resolve_many(vec![ResolveRequest::new("Acme", EntityType::Company)], 0)
			.await
			.unwrap_err();
		assert!(matches!(err, ResolutionError::InvalidInput(_)));
	}

	#[tokio::test]
	async fn results_preserve_request_order() {
		let graph = MemoryGraph::new();
		let resolver = resolver(&graph);
		let requests = vec![
			ResolveRequest::new("Alpha", EntityType::Company),
			ResolveRequest::new("Beta", EntityType::Company),
			ResolveRequest::new("Gamma", EntityType::Company),
		];
		let results = resolver.resolve_many(requests, 2).await.unwrap();
		assert_eq!(results.len(), 3);
		let names: Vec<String> = results
			.iter()
			.map(|r| r.as_ref().unwrap().entity.canonical_name.clone())
			.collect();
		assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
	}

	#[tokio::test]
	async fn per_item_failures_do_not_abort_the_batch() {
		let graph = MemoryGraph::new();
		let resolver = resolver(&graph);
		let requests = vec![
			ResolveRequest::new("Alpha", EntityType::Company),
			ResolveRequest::new("   ", EntityType::Company),
		];
		let results = resolver.resolve_many(requests, 4).await.unwrap();
		assert!(results[0].is_ok());
		assert!(matches!(
			results[1].as_ref().unwrap_err(),
			ResolutionError::InvalidInput(_)
		));
	}

	#[tokio::test]
	async fn handle_spawns_and_drains() {
		let graph = MemoryGraph::new();
		let handle = ResolverHandle::new(resolver(&graph));
		let rx = handle
			.spawn_resolve(ResolveRequest::new("Acme", EntityType::Company))
			.await;
		let result = rx.await.expect("task delivers a result").unwrap();
		assert_eq!(result.entity.canonical_name, "Acme");
		handle.close(Duration::from_millis(500)).await;
	}
}
