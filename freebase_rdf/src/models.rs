use crate::loaders;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value as Json};
use std::collections::BTreeSet;

/// A merged MQL result: the raw `{property_id: value}` object returned by the
/// service, exactly as it is cached.
pub type PropertyMap = Map<String, Json>;

/// An unresolved pointer to an entity, as embedded in another entity's
/// property values.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    id: Option<String>,
    name: Option<String>,
    types: IndexSet<String>,
    raw: PropertyMap,
}

impl Reference {
    pub fn new<I, S>(id: impl Into<String>, name: Option<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Some(id.into()).filter(|s: &String| !s.is_empty()),
            name,
            types: types.into_iter().map(Into::into).collect(),
            raw: PropertyMap::new(),
        }
    }

    /// Builds a reference from an untagged (or unknown-tag) object slot.
    pub fn from_envelope(envelope: &PropertyMap) -> Self {
        let id = envelope
            .get("id")
            .and_then(Json::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let name = envelope.get("name").and_then(first_text);
        let mut types = IndexSet::new();
        if let Some(t) = envelope.get("type") {
            extend_ids(&mut types, t);
        }
        Self {
            id,
            name,
            types,
            raw: envelope.clone(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn types(&self) -> &IndexSet<String> {
        &self.types
    }

    /// The envelope this reference was interpreted from (empty when built by hand).
    pub fn raw(&self) -> &PropertyMap {
        &self.raw
    }

    /// Literal stand-in for a reference that carries no id: its `value` field,
    /// then its `name`.
    pub fn literal_value(&self) -> Option<&Json> {
        self.raw
            .get("value")
            .filter(|v| !v.is_null())
            .or_else(|| self.raw.get("name").filter(|v| !v.is_null()))
    }
}

/// One interpreted slot of an MQL response.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Scalar unwrapped from a primitive-typed envelope.
    Literal { type_id: String, value: Json },
    Reference(Reference),
    List(Vec<Value>),
    /// Bare JSON scalar passed through untouched.
    Raw(Json),
}

impl Value {
    pub fn interpret(raw: &Json) -> Self {
        match raw {
            Json::Object(envelope) => match loaders::extract(envelope) {
                Some((tag, value)) => Value::Literal {
                    type_id: tag.to_string(),
                    value,
                },
                None => Value::Reference(Reference::from_envelope(envelope)),
            },
            Json::Array(items) => Value::List(items.iter().map(Value::interpret).collect()),
            other => Value::Raw(other.clone()),
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The scalar carried by a literal or raw slot.
    pub fn as_scalar(&self) -> Option<&Json> {
        match self {
            Value::Literal { value, .. } | Value::Raw(value) => Some(value),
            _ => None,
        }
    }

    /// Every reference reachable through nested lists, in order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        collect_references(self, &mut out);
        out
    }
}

fn collect_references<'a>(value: &'a Value, out: &mut Vec<&'a Reference>) {
    match value {
        Value::Reference(r) => out.push(r),
        Value::List(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

/// A resolved entity. Built from a raw property result and grown in place by
/// further loads.
#[derive(Debug, Clone, Default)]
pub struct Object {
    id: Option<String>,
    types: IndexSet<String>,
    names: Vec<String>,
    properties: IndexMap<String, Value>,
    // Schema-declared property ids, resolved once from `types` on first use.
    pub(crate) property_names: Option<BTreeSet<String>>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_raw(raw: &PropertyMap) -> Self {
        let mut obj = Self::default();
        obj.apply(raw);
        obj
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn types(&self) -> &IndexSet<String> {
        &self.types
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, property_id: &str) -> Option<&Value> {
        self.properties.get(property_id)
    }

    /// Schema-declared property ids, if they have been resolved already.
    pub fn resolved_property_names(&self) -> Option<&BTreeSet<String>> {
        self.property_names.as_ref()
    }

    /// Every reference held by any property, in insertion order.
    pub fn references(&self) -> Vec<&Reference> {
        self.properties
            .values()
            .flat_map(Value::references)
            .collect()
    }

    /// Merges one raw MQL result into this object.
    ///
    /// `type` values are added to the type set, `id` is only taken when none
    /// is known yet, `name` replaces the names wholesale and every other key
    /// overwrites the property of the same id.
    pub fn apply(&mut self, raw: &PropertyMap) {
        for (key, value) in raw {
            match key.as_str() {
                "type" => extend_ids(&mut self.types, value),
                "id" => {
                    let Some(id) = value.as_str().filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    match &self.id {
                        None => self.id = Some(id.to_string()),
                        Some(existing) if existing != id => {
                            tracing::debug!(existing = %existing, ignored = %id, "object id already set");
                        }
                        Some(_) => {}
                    }
                }
                "name" => self.names = texts(value),
                _ => {
                    self.properties
                        .insert(key.clone(), Value::interpret(value));
                }
            }
        }
    }
}

fn extend_ids(set: &mut IndexSet<String>, value: &Json) {
    match value {
        Json::String(s) if !s.is_empty() => {
            set.insert(s.clone());
        }
        Json::Array(items) => {
            for item in items {
                extend_ids(set, item);
            }
        }
        Json::Object(map) => {
            if let Some(id) = map.get("id") {
                extend_ids(set, id);
            }
        }
        _ => {}
    }
}

fn first_text(value: &Json) -> Option<String> {
    texts(value).into_iter().next()
}

fn texts(value: &Json) -> Vec<String> {
    match value {
        Json::String(s) => vec![s.clone()],
        Json::Array(items) => items.iter().flat_map(texts).collect(),
        Json::Object(map) => map
            .get("value")
            .and_then(Json::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
