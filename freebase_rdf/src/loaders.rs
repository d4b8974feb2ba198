//! Registry of Freebase primitive value types.
//!
//! A slot such as `{"type": "/type/int", "value": 42}` is a tagged envelope
//! around a scalar. Tags listed here are unwrapped to their `value`; any other
//! object-shaped slot is treated as a reference to another entity.

use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Pulls the scalar out of a tagged envelope.
pub type Loader = fn(&Map<String, Json>) -> Json;

pub const DATETIME: &str = "/type/datetime";
pub const INT: &str = "/type/int";
pub const FLOAT: &str = "/type/float";
pub const BOOLEAN: &str = "/type/boolean";
pub const TEXT: &str = "/type/text";
pub const RAWSTRING: &str = "/type/rawstring";
pub const URI: &str = "/type/uri";
pub const KEY: &str = "/type/key";
pub const ID: &str = "/type/id";

fn value_field(envelope: &Map<String, Json>) -> Json {
    envelope.get("value").cloned().unwrap_or(Json::Null)
}

static LOADERS: LazyLock<HashMap<&'static str, Loader>> = LazyLock::new(|| {
    let mut map: HashMap<&'static str, Loader> = HashMap::new();
    for tag in [DATETIME, INT, FLOAT, BOOLEAN, TEXT, RAWSTRING, URI, KEY, ID] {
        map.insert(tag, value_field);
    }
    map
});

pub fn loader(type_id: &str) -> Option<Loader> {
    LOADERS.get(type_id).copied()
}

pub fn is_primitive(type_id: &str) -> bool {
    LOADERS.contains_key(type_id)
}

/// Returns the tag and extracted scalar when `envelope` is a recognised
/// primitive envelope.
pub fn extract(envelope: &Map<String, Json>) -> Option<(&str, Json)> {
    let tag = envelope.get("type")?.as_str()?;
    let load = loader(tag)?;
    Some((tag, load(envelope)))
}
