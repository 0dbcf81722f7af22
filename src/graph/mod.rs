//! Graph-store collaborator interface.
//!
//! The core depends on a small capability: run a Cypher query and get rows
//! back, or execute a Cypher statement for effect. The dialect is a
//! labeled-property-graph language with `MATCH/CREATE/MERGE/SET/DELETE`,
//! `$name` parameter binding, and path patterns. The production
//! implementation targets Postgres + Apache AGE; repositories stay thin and
//! parameterized on top of this trait.

pub mod age;

pub use age::AgeGraphStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// One result row: column name to value.
pub type Row = Map<String, Value>;

/// Cypher-executing collaborator.
#[async_trait]
pub trait GraphStore: Send + Sync {
	/// Run a query and return its rows. Parameters are bound by `$name`.
	async fn query(&self, cypher: &str, params: &[(&str, Value)]) -> Result<Vec<Row>>;

	/// Execute a statement for effect.
	async fn execute(&self, cypher: &str, params: &[(&str, Value)]) -> Result<()>;

	/// Create the label indices the resolution pipeline relies on.
	/// Idempotent.
	async fn create_indexes(&self) -> Result<()>;

	/// Lightweight connectivity probe.
	async fn is_connected(&self) -> bool;

	/// Release underlying connections.
	async fn close(&self) -> Result<()>;
}

/// Pull the property map out of an agtype vertex value; plain maps pass
/// through unchanged. Non-object values yield an empty map.
pub fn vertex_properties(value: &Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => match map.get("properties") {
			Some(Value::Object(props)) => props.clone(),
			_ => map.clone(),
		},
		_ => Map::new(),
	}
}

/// Convenience: iterate the single `result` column produced by the AGE
/// backend's query wrapper.
pub fn result_column(rows: Vec<Row>) -> impl Iterator<Item = Value> {
	rows.into_iter().filter_map(|mut row| row.remove("result"))
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn vertex_properties_unwraps_agtype_vertices() {
		let vertex = json!({
			"id": 844424930131969u64,
			"label": "Entity",
			"properties": {"id": "e-1", "canonicalName": "Acme Corp"}
		});
		let props = vertex_properties(&vertex);
		assert_eq!(props.get("id"), Some(&json!("e-1")));
	}

	#[test]
	fn vertex_properties_passes_plain_maps_through() {
		let map = json!({"id": "e-1"});
		let props = vertex_properties(&map);
		assert_eq!(props.get("id"), Some(&json!("e-1")));
	}

	#[test]
	fn result_column_extracts_values() {
		let mut row = Row::new();
		row.insert("result".to_string(), json!(42));
		let values: Vec<Value> = result_column(vec![row]).collect();
		assert_eq!(values, vec![json!(42)]);
	}
}
