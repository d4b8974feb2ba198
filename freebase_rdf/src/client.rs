use crate::cache::ResponseCache;
use crate::config::{ClientConfig, MAX_BATCH_SIZE};
use crate::models::{Object, PropertyMap, Reference};
use crate::query::{Query, WILDCARD, plan_batches};
use crate::transport::{DynTransport, HttpTransport};
use crate::{FreebaseError, Result};
use dashmap::DashMap;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type Flight = Arc<Mutex<Option<PropertyMap>>>;

struct FlightGuard<'a> {
    inflight: &'a DashMap<String, Flight>,
    key: &'a str,
    flight: &'a Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inflight
            .remove_if(self.key, |_, f| Arc::ptr_eq(f, self.flight));
    }
}

/// Async Freebase client. Cloning is cheap and clones share the cache and the
/// in-flight request table.
#[derive(Clone)]
pub struct FreebaseClient {
    transport: DynTransport,
    cache: ResponseCache,
    batch_size: usize,
    // cache key -> fetch in progress; concurrent identical requests wait on it
    inflight: Arc<DashMap<String, Flight>>,
}

impl std::fmt::Debug for FreebaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreebaseClient")
            .field("cache", &self.cache)
            .field("batch_size", &self.batch_size)
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

impl FreebaseClient {
    pub fn new(transport: DynTransport, cache: ResponseCache) -> Self {
        Self {
            transport,
            cache,
            batch_size: MAX_BATCH_SIZE,
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    #[tracing::instrument(skip_all)]
    pub async fn from_config(cfg: ClientConfig) -> Result<Self> {
        cfg.validate()?;
        let transport = Arc::new(HttpTransport::new(&cfg)?) as DynTransport;
        let cache = ResponseCache::from_config(&cfg.cache).await?;
        Ok(Self::new(transport, cache).with_batch_size(cfg.batch_size))
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Calls `service` and unwraps the `{"result": ..}` envelope.
    #[tracing::instrument(level = "debug", skip(self, params))]
    pub async fn request(&self, service: &str, params: &[(&str, String)]) -> Result<Json> {
        match self.transport.call(service, params).await? {
            Json::Object(mut envelope) => envelope.remove("result").ok_or_else(|| {
                FreebaseError::MalformedResponse("response envelope has no `result` key".to_string())
            }),
            other => Err(FreebaseError::MalformedResponse(format!(
                "response envelope is not an object: {other}"
            ))),
        }
    }

    /// Runs one MQL read query. The result must be a single object.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn mql(&self, query: &Query) -> Result<PropertyMap> {
        let text = serde_json::to_string(query)?;
        tracing::debug!(query = %text, "running MQL");
        match self.request("mqlread", &[("query", text.clone())]).await? {
            Json::Object(result) => Ok(result),
            Json::Null => Err(FreebaseError::NotFound(text)),
            other => Err(FreebaseError::MalformedResponse(format!(
                "expected an object result, got {other}"
            ))),
        }
    }

    /// Free-text search; the unwrapped result is passed through as-is.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, text: &str) -> Result<Json> {
        self.request("search", &[("query", text.to_string())]).await
    }

    /// Resolves the single entity named `name`.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Object> {
        let raw = self.mql(&Query::by_name(name)).await?;
        Ok(Object::from_raw(&raw))
    }

    /// Fetches `properties` of entity `id` as one merged raw result.
    ///
    /// Served from the cache when possible; otherwise the properties are sent
    /// in sorted batches of at most `batch_size`, strictly one after another.
    /// If any batch fails the whole call fails and nothing is cached.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn load_properties<I, S>(&self, id: &str, properties: I) -> Result<PropertyMap>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let properties = collect_properties(properties);
        self.load_property_set(id, &properties).await
    }

    async fn load_property_set(
        &self,
        id: &str,
        properties: &BTreeSet<String>,
    ) -> Result<PropertyMap> {
        if id.trim().is_empty() {
            return Err(FreebaseError::InvalidArgument("entity id is required".to_string()));
        }
        if properties.is_empty() {
            return Ok(PropertyMap::new());
        }

        let key = self.cache.key(id, properties);
        let flight = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut slot = flight.lock().await;
        if let Some(shared) = slot.as_ref() {
            tracing::debug!(id, "sharing result of concurrent fetch");
            return Ok(shared.clone());
        }
        // Holding the lock makes this caller the leader; the entry goes away
        // when it settles or its future is dropped.
        let _leader = FlightGuard {
            inflight: &self.inflight,
            key: &key,
            flight: &flight,
        };

        let result = self.cached_or_fetch(id, &key, properties).await;
        if let Ok(merged) = &result {
            *slot = Some(merged.clone());
        }
        drop(slot);
        result
    }

    async fn cached_or_fetch(
        &self,
        id: &str,
        key: &str,
        properties: &BTreeSet<String>,
    ) -> Result<PropertyMap> {
        match self.cache.get(key).await {
            Ok(Some(hit)) => {
                tracing::debug!(id, "using cached copy");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(id, error = %err, "cache read failed; fetching"),
        }

        let merged = self.fetch_batches(id, properties).await?;
        if let Err(err) = self.cache.put(key, &merged).await {
            tracing::warn!(id, error = %err, "cache write failed");
        }
        Ok(merged)
    }

    async fn fetch_batches(&self, id: &str, properties: &BTreeSet<String>) -> Result<PropertyMap> {
        let batches = plan_batches(properties, self.batch_size);
        tracing::debug!(id, batches = batches.len(), properties = properties.len(), "fetching");
        let mut merged = PropertyMap::new();
        for batch in &batches {
            let result = self.mql(&batch.query(id)).await?;
            merged.extend(result);
        }
        Ok(merged)
    }

    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn load_object<I, S>(&self, id: &str, properties: I) -> Result<Object>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raw = self.load_properties(id, properties).await?;
        Ok(Object::from_raw(&raw))
    }

    /// Completion-handler form of [`load_object`](Self::load_object): the fetch
    /// runs as a spawned task and `on_complete` receives its result.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like [`tokio::spawn`].
    pub fn load_object_then<I, S, F>(
        &self,
        id: impl Into<String>,
        properties: I,
        on_complete: F,
    ) -> JoinHandle<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnOnce(Result<Object>) + Send + 'static,
    {
        let client = self.clone();
        let id = id.into();
        let properties = collect_properties(properties);
        tokio::spawn(async move {
            let result = client.load_object(&id, &properties).await;
            on_complete(result);
        })
    }

    /// Loads more `properties` into an already resolved object.
    #[tracing::instrument(skip_all, fields(id = ?obj.id()))]
    pub async fn load<I, S>(&self, obj: &mut Object, properties: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(id) = obj.id().map(str::to_string) else {
            return Err(FreebaseError::InvalidArgument(
                "object has no id to load from".to_string(),
            ));
        };
        let raw = self.load_properties(&id, properties).await?;
        obj.apply(&raw);
        Ok(())
    }

    /// Loads every property declared by the object's types.
    #[tracing::instrument(skip_all, fields(id = ?obj.id()))]
    pub async fn load_all(&self, obj: &mut Object) -> Result<()> {
        let names = self.property_names(obj).await?;
        self.load(obj, &names).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        self.cache.close().await
    }
}

impl Reference {
    /// Resolves this reference. No properties means all of them.
    pub async fn load<I, S>(&self, client: &FreebaseClient, properties: I) -> Result<Object>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(id) = self.id() else {
            return Err(FreebaseError::InvalidArgument(
                "reference has no id to load".to_string(),
            ));
        };
        let mut properties = collect_properties(properties);
        if properties.is_empty() {
            properties.insert(WILDCARD.to_string());
        }
        client.load_object(id, &properties).await
    }
}

pub(crate) fn collect_properties<I, S>(properties: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    properties
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
