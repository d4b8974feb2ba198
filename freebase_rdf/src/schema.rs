//! Type-schema driven property discovery.
//!
//! A type is itself an entity whose `/type/type/properties` lists the property
//! ids applicable to its instances. Resolution is one hop only: the types of
//! those properties are never followed, since types reference each other.

use crate::client::FreebaseClient;
use crate::models::{Object, Value};
use crate::{FreebaseError, Result};
use std::collections::BTreeSet;

pub const TYPE_PROPERTIES: &str = "/type/type/properties";
pub const TYPE_DOMAIN: &str = "/type/type/domain";
pub const TYPE_EXPECTED_BY: &str = "/type/type/expected_by";
pub const TYPE_DEFAULT_PROPERTY: &str = "/type/type/default_property";

/// The fixed bundle fetched for every type declaration.
pub const TYPE_DECLARATION: [&str; 4] = [
    TYPE_PROPERTIES,
    TYPE_DOMAIN,
    TYPE_EXPECTED_BY,
    TYPE_DEFAULT_PROPERTY,
];

/// Property ids named by a loaded type declaration. A declaration without a
/// properties slot contributes nothing.
pub fn declared_property_ids(declaration: &Object) -> BTreeSet<String> {
    declaration
        .property(TYPE_PROPERTIES)
        .map(Value::references)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.id().map(str::to_string))
        .collect()
}

impl FreebaseClient {
    /// Fetches the declaration bundle of `type_id`.
    #[tracing::instrument(skip(self))]
    pub async fn load_type(&self, type_id: &str) -> Result<Object> {
        let raw = self.load_properties(type_id, TYPE_DECLARATION).await?;
        Ok(Object::from_raw(&raw))
    }

    /// Union of the properties declared by each of `type_ids`. Any type whose
    /// declaration cannot be loaded fails the whole resolution.
    #[tracing::instrument(skip_all)]
    pub async fn resolve_property_names<I, S>(&self, type_ids: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = BTreeSet::new();
        for type_id in type_ids {
            let type_id = type_id.as_ref();
            let declaration =
                self.load_type(type_id)
                    .await
                    .map_err(|e| FreebaseError::SchemaResolution {
                        type_id: type_id.to_string(),
                        source: Box::new(e),
                    })?;
            names.extend(declared_property_ids(&declaration));
        }
        tracing::debug!(count = names.len(), "resolved property names");
        Ok(names)
    }

    /// Property ids declared by the object's types, resolved on first use and
    /// memoised on the object. Later changes to its types do not refresh it.
    #[tracing::instrument(skip_all, fields(id = ?obj.id()))]
    pub async fn property_names(&self, obj: &mut Object) -> Result<BTreeSet<String>> {
        if let Some(names) = obj.resolved_property_names() {
            return Ok(names.clone());
        }
        let types: Vec<String> = obj.types().iter().cloned().collect();
        let names = self.resolve_property_names(&types).await?;
        obj.property_names = Some(names.clone());
        Ok(names)
    }
}
