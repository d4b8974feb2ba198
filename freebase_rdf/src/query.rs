//! MQL read queries and property batching.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as Json;
use std::collections::BTreeSet;

/// Property marker meaning "every property of the entity".
pub const WILDCARD: &str = "*";

/// A shape-templated MQL read query.
///
/// Serialises as `{"id": .., "type": [], ["name": ..,] "<property>": [{}], ..}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    id: Option<String>,
    name: Option<String>,
    properties: Vec<String>,
}

impl Query {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            properties: Vec::new(),
        }
    }

    /// Lookup of the single entity carrying `name`; the response fills in `id`.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property_id: impl Into<String>) -> Self {
        let property_id = property_id.into();
        if !self.properties.contains(&property_id) {
            self.properties.push(property_id);
        }
        self
    }

    pub fn with_properties<I, S>(self, property_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        property_ids
            .into_iter()
            .fold(self, |q, p| q.with_property(p))
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn is_wildcard(&self) -> bool {
        self.properties.iter().any(|p| p == WILDCARD)
    }

    pub fn to_json(&self) -> Json {
        // Serialising a map of strings and JSON literals cannot fail.
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let template = [serde_json::Map::new()];
        let extra = usize::from(self.name.is_some());
        let mut map = serializer.serialize_map(Some(2 + extra + self.properties.len()))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", &[] as &[String])?;
        if let Some(name) = &self.name {
            map.serialize_entry("name", name)?;
        }
        for property in &self.properties {
            map.serialize_entry(property, &template)?;
        }
        map.end()
    }
}

/// One bounded group of properties fetched by a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub properties: Vec<String>,
}

impl Batch {
    pub fn query(&self, id: &str) -> Query {
        Query::by_id(id).with_properties(self.properties.iter().cloned())
    }
}

/// Splits `properties` into lexicographically sorted, disjoint groups of at
/// most `batch_size` ids.
///
/// A set containing [`WILDCARD`] collapses to one unbounded batch.
pub fn plan_batches(properties: &BTreeSet<String>, batch_size: usize) -> Vec<Batch> {
    if properties.contains(WILDCARD) {
        return vec![Batch {
            properties: vec![WILDCARD.to_string()],
        }];
    }
    let sorted: Vec<String> = properties.iter().cloned().collect();
    sorted
        .chunks(batch_size.max(1))
        .map(|chunk| Batch {
            properties: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(n: usize) -> BTreeSet<String> {
        (0..n).map(|i| format!("/test/prop/p{i:02}")).collect()
    }

    #[test]
    fn serialises_in_protocol_order() {
        let q = Query::by_id("/m/0x")
            .with_property("/type/object/name")
            .with_property("/common/topic/notable_types");
        let text = serde_json::to_string(&q).unwrap();
        assert_eq!(
            text,
            r#"{"id":"/m/0x","type":[],"/type/object/name":[{}],"/common/topic/notable_types":[{}]}"#
        );
    }

    #[test]
    fn name_lookup_leaves_id_open() {
        let q = Query::by_name("SAP AG");
        assert_eq!(q.to_json(), json!({"id": null, "type": [], "name": "SAP AG"}));
        assert_eq!(q.id(), None);
    }

    #[test]
    fn duplicate_properties_are_requested_once() {
        let q = Query::by_id("/m/0x").with_properties(["/a", "/b", "/a"]);
        assert_eq!(q.properties(), ["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn batch_count_is_ceiling_of_n_over_16() {
        for n in [0usize, 1, 15, 16, 17, 32, 33, 100] {
            let set = props(n);
            let batches = plan_batches(&set, 16);
            assert_eq!(batches.len(), n.div_ceil(16), "n = {n}");
            assert!(batches.iter().all(|b| !b.properties.is_empty() && b.properties.len() <= 16));

            let mut union = BTreeSet::new();
            for b in &batches {
                for p in &b.properties {
                    assert!(union.insert(p.clone()), "{p} appears in two batches");
                }
            }
            assert_eq!(union, set);
        }
    }

    #[test]
    fn twenty_properties_split_sixteen_then_four_in_sorted_order() {
        let set = props(20);
        let batches = plan_batches(&set, 16);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].properties.len(), 16);
        assert_eq!(batches[1].properties.len(), 4);
        let flat: Vec<String> = batches.into_iter().flat_map(|b| b.properties).collect();
        let mut sorted = flat.clone();
        sorted.sort();
        assert_eq!(flat, sorted);
    }

    #[test]
    fn wildcard_collapses_to_one_batch() {
        let mut set = props(40);
        set.insert(WILDCARD.to_string());
        let batches = plan_batches(&set, 16);
        assert_eq!(batches.len(), 1);
        let q = batches[0].query("/m/0x");
        assert!(q.is_wildcard());
        assert_eq!(q.to_json(), json!({"id": "/m/0x", "type": [], "*": [{}]}));
    }
}
