//! Synchronous facade over [`FreebaseClient`].
//!
//! Each call blocks the current thread until the underlying future completes
//! on a private current-thread runtime. Do not call these methods from inside
//! an async context.

use crate::cache::ResponseCache;
use crate::client::FreebaseClient;
use crate::config::ClientConfig;
use crate::models::{Object, PropertyMap, Reference};
use crate::query::Query;
use crate::transport::DynTransport;
use crate::{FreebaseError, Result};
use serde_json::Value as Json;
use std::collections::BTreeSet;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingClient {
    inner: FreebaseClient,
    rt: Runtime,
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("inner", &self.inner)
            .finish()
    }
}

fn runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| FreebaseError::Runtime(e.to_string()))
}

impl BlockingClient {
    pub fn new(transport: DynTransport, cache: ResponseCache) -> Result<Self> {
        Ok(Self {
            inner: FreebaseClient::new(transport, cache),
            rt: runtime()?,
        })
    }

    #[tracing::instrument(skip_all)]
    pub fn from_config(cfg: ClientConfig) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(FreebaseClient::from_config(cfg))?;
        Ok(Self { inner, rt })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.inner = self.inner.with_batch_size(batch_size);
        self
    }

    /// The async client driven by this facade.
    pub fn inner(&self) -> &FreebaseClient {
        &self.inner
    }

    pub fn request(&self, service: &str, params: &[(&str, String)]) -> Result<Json> {
        self.rt.block_on(self.inner.request(service, params))
    }

    pub fn mql(&self, query: &Query) -> Result<PropertyMap> {
        self.rt.block_on(self.inner.mql(query))
    }

    pub fn search(&self, text: &str) -> Result<Json> {
        self.rt.block_on(self.inner.search(text))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Object> {
        self.rt.block_on(self.inner.find_by_name(name))
    }

    pub fn load_properties<I, S>(&self, id: &str, properties: I) -> Result<PropertyMap>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rt.block_on(self.inner.load_properties(id, properties))
    }

    pub fn load_object<I, S>(&self, id: &str, properties: I) -> Result<Object>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rt.block_on(self.inner.load_object(id, properties))
    }

    pub fn load_type(&self, type_id: &str) -> Result<Object> {
        self.rt.block_on(self.inner.load_type(type_id))
    }

    pub fn load_reference<I, S>(&self, reference: &Reference, properties: I) -> Result<Object>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rt.block_on(reference.load(&self.inner, properties))
    }

    pub fn load<I, S>(&self, obj: &mut Object, properties: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rt.block_on(self.inner.load(obj, properties))
    }

    pub fn load_all(&self, obj: &mut Object) -> Result<()> {
        self.rt.block_on(self.inner.load_all(obj))
    }

    pub fn property_names(&self, obj: &mut Object) -> Result<BTreeSet<String>> {
        self.rt.block_on(self.inner.property_names(obj))
    }

    pub fn resolve_property_names<I, S>(&self, type_ids: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rt.block_on(self.inner.resolve_property_names(type_ids))
    }

    pub fn close(&self) -> Result<()> {
        self.rt.block_on(self.inner.close())
    }
}
