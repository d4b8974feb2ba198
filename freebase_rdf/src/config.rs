use crate::cache::CacheKeying;
use crate::{FreebaseError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/freebase/v1/";

/// Per-request slot limit of the MQL read service.
pub const MAX_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Location of the SQLite file backing the cache. `None` disables caching.
    pub path: Option<PathBuf>,
    pub keying: CacheKeying,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            keying: CacheKeying::PropertySet,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    /// Service root; endpoint names such as `mqlread` are appended verbatim.
    pub base_url: String,
    /// Extra query-string parameters sent with every request.
    pub params: BTreeMap<String, String>,
    pub timeout_ms: u64,
    /// Number of properties requested per MQL query, in [1, 16].
    pub batch_size: usize,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            params: BTreeMap::new(),
            timeout_ms: 30_000,
            batch_size: MAX_BATCH_SIZE,
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::default().with_api_key(api_key)
    }

    /// Overlay `FREEBASE_API_KEY`, `FREEBASE_BASE_URL`, `FREEBASE_CACHE_PATH` and
    /// `FREEBASE_TIMEOUT_MS` onto the defaults.
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(key) = env_var("FREEBASE_API_KEY") {
            cfg.api_key = Some(key);
        }
        if let Some(url) = env_var("FREEBASE_BASE_URL") {
            cfg.base_url = url;
        }
        if let Some(path) = env_var("FREEBASE_CACHE_PATH") {
            cfg.cache.path = Some(PathBuf::from(path));
        }
        if let Some(ms) = env_var("FREEBASE_TIMEOUT_MS") {
            cfg.timeout_ms = ms.parse().map_err(|_| {
                FreebaseError::InvalidConfig(format!("FREEBASE_TIMEOUT_MS is not a number: {ms}"))
            })?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache.path = Some(path.into());
        self
    }

    pub fn with_cache_keying(mut self, keying: CacheKeying) -> Self {
        self.cache.keying = keying;
        self
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(FreebaseError::InvalidConfig(
                "base_url is required".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(FreebaseError::InvalidConfig(format!(
                "base_url is not a valid URL: {}",
                self.base_url
            )));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(FreebaseError::InvalidConfig(format!(
                "batch_size must be in [1,{MAX_BATCH_SIZE}]"
            )));
        }
        if self.timeout_ms == 0 {
            return Err(FreebaseError::InvalidConfig(
                "timeout_ms must be > 0".to_string(),
            ));
        }
        if self.params.contains_key("api_key") {
            return Err(FreebaseError::InvalidConfig(
                "api_key belongs in ClientConfig::api_key, not params".to_string(),
            ));
        }
        if let Some(path) = &self.cache.path {
            if path.as_os_str().is_empty() {
                return Err(FreebaseError::InvalidConfig(
                    "cache.path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
