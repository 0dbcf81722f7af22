//! Canonical name normalization.
//!
//! Normalization applies a priority-ordered list of type-scoped regex rewrite
//! rules, then collapses whitespace and lowercases. The result is
//! deterministic and idempotent: `normalize(normalize(x, t), t) ==
//! normalize(x, t)`. Rule sets are replaceable per tenant; the default set
//! strips common organizational suffixes from COMPANY names.

use regex::Regex;

use crate::error::{ResolutionError, Result};
use crate::model::EntityType;

/// One rewrite rule. Rules with higher priority apply first; within the same
/// priority, definition order is preserved.
#[derive(Debug, Clone)]
pub struct NormalizationRule {
	pub pattern: Regex,
	pub replacement: String,
	/// `None` applies to every type.
	pub applicable_types: Option<Vec<EntityType>>,
	pub priority: i32,
}

impl NormalizationRule {
	pub fn new(pattern: &str, replacement: impl Into<String>, priority: i32) -> Result<Self> {
		Ok(Self {
			pattern: compile(pattern)?,
			replacement: replacement.into(),
			applicable_types: None,
			priority,
		})
	}

	pub fn scoped_to(mut self, types: Vec<EntityType>) -> Self {
		self.applicable_types = Some(types);
		self
	}

	fn applies_to(&self, entity_type: &EntityType) -> bool {
		match &self.applicable_types {
			None => true,
			Some(types) => types.contains(entity_type),
		}
	}
}

fn compile(pattern: &str) -> Result<Regex> {
	Regex::new(pattern)
		.map_err(|e| ResolutionError::InvalidInput(format!("invalid rule pattern {pattern:?}: {e}")))
}

/// Normalization engine holding a stable-sorted rule list.
#[derive(Debug, Clone)]
pub struct Normalizer {
	rules: Vec<NormalizationRule>,
}

impl Normalizer {
	/// Engine with the default rule set: organizational suffixes stripped as
	/// whole tokens, case-insensitively, for COMPANY names.
	pub fn with_default_rules() -> Self {
		// The alternation lists longer suffixes first so `Incorporated` never
		// survives as a partial strip of `Inc`.
		let suffixes =
			r"(?i)\b(?:incorporated|corporation|corp|inc|ltd|llc|plc|sa|co)\b\.?";
		let rule = NormalizationRule {
			pattern: Regex::new(suffixes).expect("default suffix pattern is valid"),
			replacement: String::new(),
			applicable_types: Some(vec![EntityType::Company]),
			priority: 100,
		};
		Self::with_rules(vec![rule])
	}

	/// Engine with a caller-supplied rule set (per-tenant replacement).
	pub fn with_rules(mut rules: Vec<NormalizationRule>) -> Self {
		// Stable: same-priority rules keep their definition order.
		rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
		Self { rules }
	}

	/// An engine with no rewrite rules: whitespace/case normalization only.
	pub fn bare() -> Self {
		Self { rules: Vec::new() }
	}

	/// Apply rewrite rules scoped to `entity_type`, then collapse whitespace
	/// and lowercase. Unknown types see only the whitespace/case step unless
	/// a rule explicitly covers them.
	pub fn normalize(&self, raw: &str, entity_type: &EntityType) -> String {
		let mut value = raw.to_string();
		for rule in &self.rules {
			if rule.applies_to(entity_type) {
				value = rule
					.pattern
					.replace_all(&value, rule.replacement.as_str())
					.into_owned();
			}
		}
		collapse(&value)
	}
}

impl Default for Normalizer {
	fn default() -> Self {
		Self::with_default_rules()
	}
}

/// Whitespace collapse + lowercase, the unconditional final step.
fn collapse(value: &str) -> String {
	value
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.to_lowercase()
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	fn company(raw: &str) -> String {
		Normalizer::with_default_rules().normalize(raw, &EntityType::Company)
	}

	#[test]
	fn strips_organizational_suffixes() {
		assert_eq!(company("Acme Corp"), "acme");
		assert_eq!(company("Acme Corporation"), "acme");
		assert_eq!(company("ACME CORPORATION"), "acme");
		assert_eq!(company("Acme Inc."), "acme");
		assert_eq!(company("Acme Incorporated"), "acme");
		assert_eq!(company("Globex LLC"), "globex");
		assert_eq!(company("Initech Ltd"), "initech");
	}

	#[test]
	fn suffix_must_be_whole_token() {
		// "Inc" inside a word is not a suffix.
		assert_eq!(company("Incline Partners"), "incline partners");
		assert_eq!(company("Coca Cola Co"), "coca cola");
	}

	#[test]
	fn collapses_whitespace_and_lowercases() {
		assert_eq!(company("  Acme \t  Widgets  "), "acme widgets");
	}

	#[test]
	fn suffix_rules_are_type_scoped() {
		let n = Normalizer::with_default_rules();
		// A person named "Corp" keeps their name.
		assert_eq!(n.normalize("Alice Corp", &EntityType::Person), "alice corp");
		assert_eq!(n.normalize("Alice Corp", &EntityType::Company), "alice");
	}

	#[test]
	fn unknown_types_get_case_and_whitespace_only() {
		let n = Normalizer::with_default_rules();
		let t: EntityType = "VESSEL".parse().unwrap();
		assert_eq!(n.normalize("  MV Ever  Given Ltd ", &t), "mv ever given ltd");
	}

	#[test]
	fn custom_rules_replace_the_default_set() {
		let rule = NormalizationRule::new(r"(?i)\bgmbh\b", "", 50).unwrap();
		let n = Normalizer::with_rules(vec![rule.scoped_to(vec![EntityType::Company])]);
		assert_eq!(n.normalize("Müller GmbH", &EntityType::Company), "müller");
		// Default suffixes are no longer stripped.
		assert_eq!(n.normalize("Acme Corp", &EntityType::Company), "acme corp");
	}

	#[test]
	fn higher_priority_rules_apply_first() {
		// Expanding rule at high priority, stripping rule at low priority.
		let expand = NormalizationRule::new(r"(?i)\bintl\b", "international", 200).unwrap();
		let strip = NormalizationRule::new(r"(?i)\binternational\b", "", 100).unwrap();
		let n = Normalizer::with_rules(vec![strip, expand]);
		assert_eq!(n.normalize("Acme Intl", &EntityType::Company), "acme");
	}

	#[test]
	fn same_priority_preserves_definition_order() {
		let first = NormalizationRule::new(r"a", "b", 10).unwrap();
		let second = NormalizationRule::new(r"b", "c", 10).unwrap();
		let n = Normalizer::with_rules(vec![first, second]);
		// "a" -> "b" by the first rule, then "b" -> "c" by the second.
		assert_eq!(n.normalize("a", &EntityType::Company), "c");
	}

	#[test]
	fn normalization_is_idempotent() {
		let n = Normalizer::with_default_rules();
		for raw in [
			"Acme Corp",
			"ACME CORPORATION",
			"  International  Business   Machines ",
			"Foo Inc",
			"Coca Cola Co.",
			"plain name",
		] {
			let once = n.normalize(raw, &EntityType::Company);
			let twice = n.normalize(&once, &EntityType::Company);
			assert_eq!(once, twice, "not idempotent for {raw:?}");
		}
	}

	mod properties {
		use proptest::prelude::*;

		use super::*;

		proptest! {
			#[test]
			fn idempotent_for_arbitrary_input(raw in "[A-Za-z0-9 .]{0,48}") {
				let n = Normalizer::with_default_rules();
				let once = n.normalize(&raw, &EntityType::Company);
				let twice = n.normalize(&once, &EntityType::Company);
				prop_assert_eq!(once, twice);
			}

			#[test]
			fn output_never_has_leading_trailing_or_double_spaces(raw in "[A-Za-z .]{0,48}") {
				let n = Normalizer::with_default_rules();
				let out = n.normalize(&raw, &EntityType::Company);
				prop_assert!(!out.starts_with(' '));
				prop_assert!(!out.ends_with(' '));
				prop_assert!(!out.contains("  "));
			}
		}
	}
}
