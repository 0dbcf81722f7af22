use thiserror::Error;

/// Errors surfaced by the resolution pipeline and its collaborators.
///
/// Best-effort side work (synonym reinforcement, audit persistence, metrics)
/// never produces these at the caller; it is logged and swallowed inside the
/// pipeline. Anything on the main resolution path propagates, except that
/// auto-merge failures are downgraded to a REVIEW outcome by the orchestrator.
#[derive(Debug, Error)]
pub enum ResolutionError {
	/// Name/type failed validation, or a relationship type violated the
	/// `[A-Za-z0-9_]+` charset. No side effects were performed.
	#[error("invalid input: {0}")]
	InvalidInput(String),

	/// Entity, synonym, or relationship lookup by id found nothing.
	#[error("not found: {0}")]
	NotFound(String),

	/// The graph connection pool could not hand out a connection within its
	/// bounded wait.
	#[error("graph connection pool exhausted")]
	PoolExhausted,

	/// The per-key resolution lock could not be acquired within the timeout.
	#[error("timed out acquiring resolution lock for key {key}")]
	LockTimeout { key: String },

	/// A merge precondition was violated or a saga step failed and
	/// compensations fired. `step_errors` carries the step-by-step detail,
	/// including any compensation failures.
	#[error("merge failed: {summary}")]
	MergeFailed {
		summary: String,
		step_errors: Vec<String>,
	},

	/// An operation was attempted on a batch context after commit, rollback,
	/// or close.
	#[error("illegal state: {0}")]
	IllegalState(String),

	/// An optional collaborator (LLM provider, review queue) is absent or
	/// refused the call. The state machine treats this as "not available"
	/// rather than failing the request.
	#[error("provider unavailable: {0}")]
	ProviderUnavailable(String),

	/// An asynchronous operation exceeded its deadline.
	#[error("operation timed out after {0} ms")]
	Timeout(u64),

	/// The graph store rejected a query or statement.
	#[error("graph store error: {0}")]
	Store(String),

	/// Anything unexpected. Logged with the resolution correlation id and
	/// surfaced opaquely.
	#[error("internal error: {0}")]
	Internal(String),
}

impl ResolutionError {
	/// Classify a `sqlx` failure: pool waits map to [`PoolExhausted`],
	/// everything else is a store error.
	///
	/// [`PoolExhausted`]: ResolutionError::PoolExhausted
	pub fn from_sqlx(err: sqlx::Error) -> Self {
		match err {
			sqlx::Error::PoolTimedOut => ResolutionError::PoolExhausted,
			sqlx::Error::PoolClosed => ResolutionError::Store("connection pool closed".to_string()),
			other => ResolutionError::Store(other.to_string()),
		}
	}
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ResolutionError>;

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn pool_timeout_maps_to_pool_exhausted() {
		let err = ResolutionError::from_sqlx(sqlx::Error::PoolTimedOut);
		assert!(matches!(err, ResolutionError::PoolExhausted));
	}

	#[test]
	fn merge_failed_carries_step_errors() {
		let err = ResolutionError::MergeFailed {
			summary: "source entity is not ACTIVE".to_string(),
			step_errors: vec!["step 3: relationship migration failed".to_string()],
		};
		assert!(err.to_string().contains("source entity is not ACTIVE"));
		match err {
			ResolutionError::MergeFailed { step_errors, .. } => {
				assert_eq!(step_errors.len(), 1);
			}
			_ => panic!("expected MergeFailed"),
		}
	}
}
