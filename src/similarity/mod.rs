//! String similarity scoring over already-normalized names.
//!
//! Three algorithms feed a weighted composite: Levenshtein edit similarity,
//! Jaro–Winkler, and Jaccard token overlap. All scores are in `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::error::{ResolutionError, Result};

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Weights for the composite score. Must be non-negative and sum to
/// `1.0 ± ε`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
	pub levenshtein: f64,
	pub jaro_winkler: f64,
	pub jaccard: f64,
}

impl Default for SimilarityWeights {
	fn default() -> Self {
		Self {
			levenshtein: 0.4,
			jaro_winkler: 0.35,
			jaccard: 0.25,
		}
	}
}

impl SimilarityWeights {
	pub fn new(levenshtein: f64, jaro_winkler: f64, jaccard: f64) -> Result<Self> {
		let weights = Self {
			levenshtein,
			jaro_winkler,
			jaccard,
		};
		weights.validate()?;
		Ok(weights)
	}

	pub fn validate(&self) -> Result<()> {
		if self.levenshtein < 0.0 || self.jaro_winkler < 0.0 || self.jaccard < 0.0 {
			return Err(ResolutionError::InvalidInput(
				"similarity weights must be non-negative".to_string(),
			));
		}
		let sum = self.levenshtein + self.jaro_winkler + self.jaccard;
		if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
			return Err(ResolutionError::InvalidInput(format!(
				"similarity weights must sum to 1.0, got {sum}"
			)));
		}
		Ok(())
	}
}

/// Per-algorithm component scores for one candidate evaluation, persisted on
/// every match decision record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
	/// 1.0 when the normalized strings are byte-identical, else 0.0.
	pub exact: f64,
	pub levenshtein: f64,
	pub jaro_winkler: f64,
	pub jaccard: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub llm: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub graph_context: Option<f64>,
}

/// Levenshtein similarity: `1 − editDistance(a, b) / max(|a|, |b|)`.
///
/// Wagner–Fischer with two rows, O(min(|a|, |b|)) space. Empty vs non-empty
/// is 0.0; two identical strings (including two empty strings) are 1.0.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
	if a == b {
		return 1.0;
	}
	let a_chars: Vec<char> = a.chars().collect();
	let b_chars: Vec<char> = b.chars().collect();
	if a_chars.is_empty() || b_chars.is_empty() {
		return 0.0;
	}

	// Iterate over the longer string, keep rows sized by the shorter one.
	let (longer, shorter) = if a_chars.len() >= b_chars.len() {
		(&a_chars, &b_chars)
	} else {
		(&b_chars, &a_chars)
	};

	let mut prev: Vec<usize> = (0..=shorter.len()).collect();
	let mut curr: Vec<usize> = vec![0; shorter.len() + 1];

	for (i, lc) in longer.iter().enumerate() {
		curr[0] = i + 1;
		for (j, sc) in shorter.iter().enumerate() {
			let cost = usize::from(lc != sc);
			curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
		}
		std::mem::swap(&mut prev, &mut curr);
	}

	let distance = prev[shorter.len()];
	1.0 - distance as f64 / longer.len() as f64
}

/// Jaro similarity, the base of Jaro–Winkler.
fn jaro_similarity(a: &[char], b: &[char]) -> f64 {
	if a.is_empty() && b.is_empty() {
		return 1.0;
	}
	if a.is_empty() || b.is_empty() {
		return 0.0;
	}

	let match_window = (a.len().max(b.len()) / 2).saturating_sub(1);
	let mut a_matched = vec![false; a.len()];
	let mut b_matched = vec![false; b.len()];
	let mut matches = 0usize;

	for (i, ac) in a.iter().enumerate() {
		let lo = i.saturating_sub(match_window);
		let hi = (i + match_window + 1).min(b.len());
		for j in lo..hi {
			if !b_matched[j] && ac == &b[j] {
				a_matched[i] = true;
				b_matched[j] = true;
				matches += 1;
				break;
			}
		}
	}

	if matches == 0 {
		return 0.0;
	}

	// Count transpositions among matched characters.
	let mut transpositions = 0usize;
	let mut j = 0usize;
	for (i, ac) in a.iter().enumerate() {
		if !a_matched[i] {
			continue;
		}
		while !b_matched[j] {
			j += 1;
		}
		if ac != &b[j] {
			transpositions += 1;
		}
		j += 1;
	}

	let m = matches as f64;
	(m / a.len() as f64 + m / b.len() as f64 + (m - transpositions as f64 / 2.0) / m) / 3.0
}

/// Jaro–Winkler similarity with the conventional parameters: prefix scaling
/// factor 0.1, common prefix capped at 4, boost applied when the base Jaro
/// score exceeds 0.7.
pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
	let a_chars: Vec<char> = a.chars().collect();
	let b_chars: Vec<char> = b.chars().collect();
	let jaro = jaro_similarity(&a_chars, &b_chars);
	if jaro <= 0.7 {
		return jaro;
	}

	let prefix = a_chars
		.iter()
		.zip(b_chars.iter())
		.take(4)
		.take_while(|(x, y)| x == y)
		.count();

	jaro + prefix as f64 * 0.1 * (1.0 - jaro)
}

/// Jaccard token overlap: `|A ∩ B| / |A ∪ B|` over whitespace-split tokens.
/// Two empty token sets yield 0.0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
	use std::collections::HashSet;

	let a_tokens: HashSet<&str> = a.split_whitespace().collect();
	let b_tokens: HashSet<&str> = b.split_whitespace().collect();
	if a_tokens.is_empty() && b_tokens.is_empty() {
		return 0.0;
	}

	let intersection = a_tokens.intersection(&b_tokens).count();
	let union = a_tokens.union(&b_tokens).count();
	intersection as f64 / union as f64
}

/// Weighted composite scorer producing the full per-candidate breakdown.
#[derive(Debug, Clone, Copy)]
pub struct CompositeScorer {
	weights: SimilarityWeights,
}

impl CompositeScorer {
	pub fn new(weights: SimilarityWeights) -> Result<Self> {
		weights.validate()?;
		Ok(Self { weights })
	}

	pub fn weights(&self) -> SimilarityWeights {
		self.weights
	}

	/// Score a pair of normalized strings. The composite is
	/// `w_L·L + w_JW·JW + w_J·J`.
	pub fn score(&self, a: &str, b: &str) -> (ScoreBreakdown, f64) {
		let breakdown = ScoreBreakdown {
			exact: if a == b { 1.0 } else { 0.0 },
			levenshtein: levenshtein_similarity(a, b),
			jaro_winkler: jaro_winkler_similarity(a, b),
			jaccard: jaccard_similarity(a, b),
			llm: None,
			graph_context: None,
		};
		let composite = self.weights.levenshtein * breakdown.levenshtein
			+ self.weights.jaro_winkler * breakdown.jaro_winkler
			+ self.weights.jaccard * breakdown.jaccard;
		(breakdown, composite)
	}
}

impl Default for CompositeScorer {
	fn default() -> Self {
		Self {
			weights: SimilarityWeights::default(),
		}
	}
}
