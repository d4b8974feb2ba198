use crate::config::ClientConfig;
use crate::{FreebaseError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Issues one request against a named service endpoint (`mqlread`, `search`)
/// and returns the decoded JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, service: &str, params: &[(&str, String)]) -> Result<Json>;
}

pub type DynTransport = Arc<dyn Transport>;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    params: BTreeMap<String, String>,
}

impl HttpTransport {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            params: cfg.params.clone(),
        })
    }

    /// `base_url + service`, with the configured parameters, the API key and
    /// then `extra` as query string. Later keys override earlier ones.
    pub fn request_url(&self, service: &str, extra: &[(&str, String)]) -> Result<Url> {
        let mut merged: BTreeMap<&str, &str> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(key) = self.api_key.as_deref() {
            merged.insert("api_key", key);
        }
        for (k, v) in extra {
            merged.insert(*k, v.as_str());
        }
        Url::parse_with_params(&format!("{}{}", self.base_url, service), merged)
            .map_err(|e| FreebaseError::InvalidConfig(format!("bad request url: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(level = "debug", skip(self, params))]
    async fn call(&self, service: &str, params: &[(&str, String)]) -> Result<Json> {
        let url = self.request_url(service, params)?;
        tracing::debug!(service, "calling freebase service");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FreebaseError::transport(
                Some(status.as_u16()),
                if text.is_empty() {
                    status.to_string()
                } else {
                    text
                },
            ));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            FreebaseError::MalformedResponse(format!("response body is not JSON: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/freebase/v1/")
    }

    fn transport(base_url: String) -> HttpTransport {
        let cfg = ClientConfig::new("secret")
            .with_base_url(base_url)
            .with_param("lang", "/lang/en");
        HttpTransport::new(&cfg).unwrap()
    }

    #[test]
    fn request_url_merges_params_in_order() {
        let t = transport("https://example.org/freebase/v1/".to_string());
        let url = t
            .request_url("mqlread", &[("query", "{\"id\":null}".to_string()), ("lang", "/lang/de".to_string())])
            .unwrap();
        assert_eq!(url.path(), "/freebase/v1/mqlread");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["api_key"], "secret");
        assert_eq!(pairs["lang"], "/lang/de");
        assert_eq!(pairs["query"], "{\"id\":null}");
    }

    #[tokio::test]
    async fn decodes_json_bodies() {
        let app = Router::new().route(
            "/freebase/v1/mqlread",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                axum::Json(serde_json::json!({
                    "result": {"echo": q.get("query").cloned(), "key": q.get("api_key").cloned()}
                }))
            }),
        );
        let t = transport(serve(app).await);
        let body = t
            .call("mqlread", &[("query", "{}".to_string())])
            .await
            .unwrap();
        assert_eq!(body["result"]["echo"], "{}");
        assert_eq!(body["result"]["key"], "secret");
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let app = Router::new().route(
            "/freebase/v1/mqlread",
            get(|| async { (StatusCode::FORBIDDEN, "daily limit exceeded") }),
        );
        let t = transport(serve(app).await);
        let err = t.call("mqlread", &[]).await.unwrap_err();
        match err {
            FreebaseError::Transport { status, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(message, "daily limit exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let app = Router::new().route("/freebase/v1/search", get(|| async { "<html>" }));
        let t = transport(serve(app).await);
        let err = t.call("search", &[]).await.unwrap_err();
        assert!(matches!(err, FreebaseError::MalformedResponse(_)));
    }
}
