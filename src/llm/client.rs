//! Resilient HTTP transport for LLM providers.
//!
//! Wraps a plain hyper client with the protections a flaky upstream needs:
//! request pacing, bounded retries with a jittered backoff schedule, and a
//! circuit breaker that sheds load while the provider is down. Enrichment is
//! best-effort side work; the breaker keeps a dead provider from slowing
//! every resolution to its timeout.
//!
//! The breaker is deadline-based: a streak of transient failures past the
//! threshold sets a retry deadline, and requests are refused until it
//! passes. Pacing uses a virtual-scheduling (GCRA-style) slot clock rather
//! than token counting: each admitted request advances the next free slot by
//! one interval, and the slot may run ahead of real time by the configured
//! burst tolerance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{debug, warn};
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Errors from the resilient transport.
#[derive(Debug, Error)]
pub enum LlmClientError {
	#[error("request failed: {0}")]
	Http(String),

	#[error("provider returned status {0}")]
	Status(StatusCode),

	#[error("circuit breaker is open")]
	CircuitOpen,

	#[error("rate limit exceeded")]
	RateLimited,

	#[error("request timed out")]
	Timeout,

	#[error("retries exhausted")]
	RetriesExhausted,

	#[error("invalid provider URL: {0}")]
	InvalidUrl(#[from] hyper::http::uri::InvalidUri),

	#[error("malformed provider response: {0}")]
	MalformedResponse(String),
}

/// Transport configuration for one provider endpoint.
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
	pub base_url: String,
	/// Path the enrichment request is POSTed to.
	pub enrich_path: String,
	/// Sent as `X-API-Key` when present.
	pub api_key: Option<String>,
	pub request_timeout_ms: u64,
	pub max_retries: u32,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
	/// Consecutive transient failures before the breaker refuses requests.
	pub circuit_threshold: u32,
	/// How long the breaker refuses requests before probing again.
	pub circuit_reset_ms: u64,
	pub rate_limit_burst: u32,
	pub rate_limit_per_sec: u32,
}

impl Default for LlmProviderConfig {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:8600".to_string(),
			enrich_path: "/v1/enrich".to_string(),
			api_key: None,
			request_timeout_ms: 10_000,
			max_retries: 3,
			initial_backoff_ms: 200,
			max_backoff_ms: 5_000,
			circuit_threshold: 5,
			circuit_reset_ms: 30_000,
			rate_limit_burst: 10,
			rate_limit_per_sec: 5,
		}
	}
}

impl LlmProviderConfig {
	fn timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	fn circuit_reset(&self) -> Duration {
		Duration::from_millis(self.circuit_reset_ms)
	}
}

/// Deadline-based breaker. A failure streak at the threshold sets
/// `retry_at`; once the deadline passes, requests probe again, and a further
/// failure pushes the deadline out anew (the streak only clears on success).
struct Breaker {
	threshold: u32,
	cooldown: Duration,
	failure_streak: u32,
	retry_at: Option<Instant>,
}

impl Breaker {
	fn new(threshold: u32, cooldown: Duration) -> Self {
		Self {
			threshold: threshold.max(1),
			cooldown,
			failure_streak: 0,
			retry_at: None,
		}
	}

	fn admits(&self, now: Instant) -> bool {
		match self.retry_at {
			Some(at) => now >= at,
			None => true,
		}
	}

	fn is_refusing(&self, now: Instant) -> bool {
		!self.admits(now)
	}

	fn note_success(&mut self) {
		if self.retry_at.is_some() {
			debug!("LLM circuit breaker cleared after successful probe");
		}
		self.failure_streak = 0;
		self.retry_at = None;
	}

	fn note_failure(&mut self, now: Instant) {
		self.failure_streak += 1;
		if self.failure_streak >= self.threshold {
			warn!(
				"LLM circuit breaker refusing requests after {} consecutive failures",
				self.failure_streak
			);
			self.retry_at = Some(now + self.cooldown);
		}
	}
}

/// GCRA-style pacer. `next_free` is the virtual slot clock: each admitted
/// request pushes it one interval into the future, and a request is admitted
/// while the clock runs at most `tolerance` ahead of real time. A burst of
/// `burst` requests lands inside the tolerance; sustained traffic is paced
/// at one request per interval.
struct Pacer {
	interval: Duration,
	tolerance: Duration,
	next_free: Instant,
}

impl Pacer {
	fn new(burst: u32, per_sec: u32) -> Self {
		// A zero rate leaves only the burst allowance; one slot per day
		// approximates "never refills" without risking clock arithmetic
		// overflow.
		let interval = if per_sec == 0 {
			Duration::from_secs(86_400)
		} else {
			Duration::from_secs(1) / per_sec
		};
		let tolerance = interval * burst.max(1).saturating_sub(1);
		Self {
			interval,
			tolerance,
			next_free: Instant::now(),
		}
	}

	fn admit(&mut self, now: Instant) -> bool {
		let slot = self.next_free.max(now);
		if slot.duration_since(now) <= self.tolerance {
			self.next_free = slot + self.interval;
			true
		} else {
			false
		}
	}
}

/// Backoff schedule: the cap doubles per attempt from `initial_backoff_ms`
/// up to `max_backoff_ms`, and the actual delay is drawn uniformly from the
/// upper half of the cap so concurrent retriers spread out.
fn backoff_delay(config: &LlmProviderConfig, attempt: u32) -> Duration {
	let doublings = attempt.saturating_sub(1).min(16);
	let cap_ms = config
		.initial_backoff_ms
		.saturating_mul(1u64 << doublings)
		.min(config.max_backoff_ms);
	let floor_ms = cap_ms / 2;
	let delay_ms = rand::thread_rng().gen_range(floor_ms..=cap_ms.max(floor_ms + 1));
	Duration::from_millis(delay_ms)
}

/// HTTP client with request pacing, retry/backoff, and a circuit breaker.
pub struct ResilientLlmClient {
	config: LlmProviderConfig,
	client: Client<hyper_util::client::legacy::connect::HttpConnector, Full<Bytes>>,
	pacer: Arc<Mutex<Pacer>>,
	breaker: Arc<Mutex<Breaker>>,
}

impl ResilientLlmClient {
	pub fn new(config: LlmProviderConfig) -> Self {
		let client = Client::builder(TokioExecutor::new()).build_http();
		let pacer = Arc::new(Mutex::new(Pacer::new(
			config.rate_limit_burst,
			config.rate_limit_per_sec,
		)));
		let breaker = Arc::new(Mutex::new(Breaker::new(
			config.circuit_threshold,
			config.circuit_reset(),
		)));
		Self {
			config,
			client,
			pacer,
			breaker,
		}
	}

	/// Whether the breaker currently admits requests.
	pub async fn healthy(&self) -> bool {
		!self.breaker.lock().await.is_refusing(Instant::now())
	}

	/// Breaker and pacer gate every attempt, including retries.
	async fn admit(&self) -> Result<(), LlmClientError> {
		let now = Instant::now();
		if !self.breaker.lock().await.admits(now) {
			return Err(LlmClientError::CircuitOpen);
		}
		if !self.pacer.lock().await.admit(now) {
			return Err(LlmClientError::RateLimited);
		}
		Ok(())
	}

	/// POST a JSON body to the configured enrich path and return the raw
	/// response bytes, retrying transient failures on the backoff schedule.
	pub async fn post_enrich(&self, body: String) -> Result<Bytes, LlmClientError> {
		for attempt in 0..=self.config.max_retries {
			if attempt > 0 {
				let delay = backoff_delay(&self.config, attempt);
				warn!(
					"retrying LLM request (attempt {}/{}) after {:?}",
					attempt, self.config.max_retries, delay
				);
				sleep(delay).await;
			}
			self.admit().await?;

			match self.send_once(body.clone()).await {
				Ok(bytes) => {
					self.breaker.lock().await.note_success();
					return Ok(bytes);
				}
				Err(e) => {
					self.breaker.lock().await.note_failure(Instant::now());
					if !is_transient(&e) {
						return Err(e);
					}
					debug!("transient LLM request failure: {e}");
				}
			}
		}
		Err(LlmClientError::RetriesExhausted)
	}

	async fn send_once(&self, body: String) -> Result<Bytes, LlmClientError> {
		let url = format!(
			"{}{}",
			self.config.base_url.trim_end_matches('/'),
			self.config.enrich_path
		);
		let uri: Uri = url.parse()?;

		let mut builder = Request::builder()
			.method(Method::POST)
			.uri(uri)
			.header("Content-Type", "application/json");
		if let Some(key) = &self.config.api_key {
			builder = builder.header("X-API-Key", key.as_str());
		}
		let request = builder
			.body(Full::new(Bytes::from(body)))
			.map_err(|e| LlmClientError::Http(e.to_string()))?;

		let response =
			match tokio::time::timeout(self.config.timeout(), self.client.request(request)).await {
				Ok(Ok(resp)) => resp,
				Ok(Err(e)) => return Err(LlmClientError::Http(e.to_string())),
				Err(_) => return Err(LlmClientError::Timeout),
			};

		let status = response.status();
		if !status.is_success() {
			return Err(LlmClientError::Status(status));
		}

		let bytes = response
			.into_body()
			.collect()
			.await
			.map_err(|e| LlmClientError::Http(e.to_string()))?
			.to_bytes();
		Ok(bytes)
	}
}

fn is_transient(error: &LlmClientError) -> bool {
	match error {
		LlmClientError::Status(status) => {
			status.is_server_error()
				|| *status == StatusCode::TOO_MANY_REQUESTS
				|| *status == StatusCode::REQUEST_TIMEOUT
		}
		LlmClientError::Timeout | LlmClientError::Http(_) => true,
		_ => false,
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn breaker_refuses_only_after_full_streak() {
		let mut breaker = Breaker::new(3, Duration::from_secs(60));
		let now = Instant::now();
		breaker.note_failure(now);
		breaker.note_failure(now);
		assert!(breaker.admits(now), "below the threshold the breaker admits");
		breaker.note_failure(now);
		assert!(breaker.is_refusing(now));
		assert!(
			breaker.admits(now + Duration::from_secs(61)),
			"a past deadline lets a probe through"
		);
	}

	#[test]
	fn breaker_success_clears_streak_and_deadline() {
		let mut breaker = Breaker::new(2, Duration::from_secs(60));
		let now = Instant::now();
		breaker.note_failure(now);
		breaker.note_failure(now);
		assert!(breaker.is_refusing(now));
		breaker.note_success();
		assert!(breaker.admits(now));
		// A single failure after the reset is below the threshold again.
		breaker.note_failure(now);
		assert!(breaker.admits(now));
	}

	#[test]
	fn failed_probe_extends_the_deadline() {
		let mut breaker = Breaker::new(1, Duration::from_secs(60));
		let start = Instant::now();
		breaker.note_failure(start);
		let probe_time = start + Duration::from_secs(61);
		assert!(breaker.admits(probe_time));
		// The streak never cleared, so one failed probe refuses again.
		breaker.note_failure(probe_time);
		assert!(breaker.is_refusing(probe_time + Duration::from_secs(1)));
	}

	#[test]
	fn pacer_admits_burst_then_refuses() {
		let mut pacer = Pacer::new(3, 0);
		let now = Instant::now();
		assert!(pacer.admit(now));
		assert!(pacer.admit(now));
		assert!(pacer.admit(now));
		assert!(!pacer.admit(now), "the slot clock is past the tolerance");
	}

	#[test]
	fn pacer_frees_a_slot_per_interval() {
		let mut pacer = Pacer::new(1, 100);
		let now = Instant::now();
		assert!(pacer.admit(now));
		assert!(!pacer.admit(now));
		// One interval (10ms at 100/s) later the next slot is free.
		assert!(pacer.admit(now + Duration::from_millis(11)));
	}

	#[test]
	fn backoff_caps_and_stays_in_upper_half() {
		let config = LlmProviderConfig {
			initial_backoff_ms: 100,
			max_backoff_ms: 1_000,
			..LlmProviderConfig::default()
		};
		for _ in 0..32 {
			let first = backoff_delay(&config, 1);
			assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(101));
			let late = backoff_delay(&config, 12);
			assert!(late >= Duration::from_millis(500) && late <= Duration::from_millis(1_001));
		}
	}

	#[test]
	fn transient_classification() {
		assert!(is_transient(&LlmClientError::Timeout));
		assert!(is_transient(&LlmClientError::Status(
			StatusCode::SERVICE_UNAVAILABLE
		)));
		assert!(!is_transient(&LlmClientError::Status(
			StatusCode::UNAUTHORIZED
		)));
		assert!(!is_transient(&LlmClientError::CircuitOpen));
	}
}
