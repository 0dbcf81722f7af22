//! Blocking keys for sub-linear fuzzy candidate lookup.
//!
//! A normalized name produces a small deterministic set of keys; entities are
//! indexed under every key they produce, and a fuzzy lookup unions the
//! candidate sets of the query's keys. Sharing any key makes two names
//! fuzzy-match candidates.

use std::collections::BTreeSet;

/// Pluggable key-generation strategy.
pub trait BlockingStrategy: Send + Sync {
	/// Deterministic, deduplicated keys for a normalized string. May be empty
	/// (the orchestrator then falls back to a full active scan).
	fn keys(&self, normalized: &str) -> Vec<String>;
}

/// Default strategy generating three key families:
///
/// - `pfx:` — the first three characters, when the string has at least three.
/// - `tok:` — the sorted tokens joined by a space, one key per string.
/// - `bg:` — the first bigram of the string, plus the first bigram of every
///   prominent token (length ≥ `prominent_token_len`).
#[derive(Debug, Clone)]
pub struct DefaultBlockingStrategy {
	/// Minimum token length for per-token bigram keys.
	pub prominent_token_len: usize,
}

impl Default for DefaultBlockingStrategy {
	fn default() -> Self {
		Self {
			prominent_token_len: 4,
		}
	}
}

impl BlockingStrategy for DefaultBlockingStrategy {
	fn keys(&self, normalized: &str) -> Vec<String> {
		let mut keys = BTreeSet::new();
		let chars: Vec<char> = normalized.chars().collect();

		if chars.len() >= 3 {
			keys.insert(format!("pfx:{}", chars[..3].iter().collect::<String>()));
		}

		let mut tokens: Vec<&str> = normalized.split_whitespace().collect();
		if !tokens.is_empty() {
			tokens.sort_unstable();
			keys.insert(format!("tok:{}", tokens.join(" ")));
		}

		if chars.len() >= 2 {
			keys.insert(format!("bg:{}{}", chars[0], chars[1]));
		}
		for token in normalized.split_whitespace() {
			let token_chars: Vec<char> = token.chars().collect();
			if token_chars.len() >= self.prominent_token_len {
				keys.insert(format!("bg:{}{}", token_chars[0], token_chars[1]));
			}
		}

		keys.into_iter().collect()
	}
}
