#![cfg(test)]

use crate::transport::Transport;
use crate::{FreebaseError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value as Json, json};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&str, &Map<String, Json>) -> Result<Json> + Send + Sync>;

/// One request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub service: String,
    /// The decoded MQL query for `mqlread` calls, the raw params otherwise.
    pub query: Map<String, Json>,
}

impl RecordedCall {
    /// Property keys requested by an MQL call, minus `id` and `type`.
    pub fn properties(&self) -> Vec<String> {
        self.query
            .keys()
            .filter(|k| *k != "id" && *k != "type" && *k != "name")
            .cloned()
            .collect()
    }
}

/// Scripted transport: answers each request from a closure and records it.
pub(crate) struct MockTransport {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Map<String, Json>) -> Result<Json> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Answers every MQL query by echoing each requested property with one
    /// integer literal, wrapped in the usual `{"result": ..}` envelope.
    pub fn echo() -> Self {
        Self::new(|_, query| Ok(json!({ "result": echo_result(query) })))
    }

    /// Suspends every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

pub(crate) fn echo_result(query: &Map<String, Json>) -> Json {
    let mut out = Map::new();
    for (k, v) in query {
        let value = match k.as_str() {
            "id" => v.clone(),
            "type" => json!(["/common/topic"]),
            "name" => v.clone(),
            _ => json!([{"type": "/type/int", "value": k.len()}]),
        };
        out.insert(k.clone(), value);
    }
    Json::Object(out)
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, service: &str, params: &[(&str, String)]) -> Result<Json> {
        let query = match params.iter().find(|(k, _)| *k == "query") {
            Some((_, text)) if service == "mqlread" => match serde_json::from_str(text)? {
                Json::Object(map) => map,
                _ => Map::new(),
            },
            _ => params
                .iter()
                .map(|(k, v)| (k.to_string(), Json::String(v.clone())))
                .collect(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                service: service.to_string(),
                query: query.clone(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(service, &query)
    }
}

pub(crate) fn transport_failure() -> FreebaseError {
    FreebaseError::transport(Some(500), "backend error")
}
