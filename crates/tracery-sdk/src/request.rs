//! PATCH requests and the dispatcher seam.

use crate::error::{Result, SdkError};
use parking_lot::Mutex;
use serde::Serialize;
use ulid::Ulid;

/// A PATCH request ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    /// Unique id for correlating logs and responses.
    pub request_id: String,
    pub method: &'static str,
    pub uri: String,
    /// Quoted etag, sent as `If-Match`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,
    pub body: serde_json::Value,
}

impl PatchRequest {
    pub fn new(uri: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            request_id: Ulid::new().to_string(),
            method: "PATCH",
            uri: uri.into(),
            if_match: None,
            body,
        }
    }

    /// Attach an `If-Match` precondition.
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.if_match = Some(format!("\"{}\"", etag.trim_matches('"')));
        self
    }
}

/// Transport that delivers patch requests to the remote service.
pub trait Dispatcher: Send + Sync {
    /// Send `request` and return the response body.
    fn send(&self, request: &PatchRequest) -> Result<serde_json::Value>;
}

/// In-memory dispatcher that records requests. Useful for testing.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    sent: Mutex<Vec<PatchRequest>>,
    failure: Mutex<Option<String>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with `reason`, or succeed again with `None`.
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    /// Requests sent so far.
    pub fn sent(&self) -> Vec<PatchRequest> {
        self.sent.lock().clone()
    }

    pub fn last(&self) -> Option<PatchRequest> {
        self.sent.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Dispatcher for MemoryDispatcher {
    fn send(&self, request: &PatchRequest) -> Result<serde_json::Value> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(SdkError::Dispatch(reason));
        }
        self.sent.lock().push(request.clone());
        Ok(request.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = PatchRequest::new("http://localhost/critters/1", json!({"name": "x"}))
            .with_etag("v1");
        assert_eq!(request.method, "PATCH");
        assert_eq!(request.if_match.as_deref(), Some("\"v1\""));
        assert_eq!(request.request_id.len(), 26);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["if_match"], "\"v1\"");
        assert_eq!(json["body"]["name"], "x");
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = PatchRequest::new("u", json!({}));
        let b = PatchRequest::new("u", json!({}));
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_memory_dispatcher() {
        let dispatcher = MemoryDispatcher::new();
        let request = PatchRequest::new("u", json!({"a": 1}));

        assert_eq!(dispatcher.send(&request).unwrap(), json!({"a": 1}));
        assert_eq!(dispatcher.sent().len(), 1);

        dispatcher.fail_with(Some("offline"));
        assert!(matches!(dispatcher.send(&request), Err(SdkError::Dispatch(_))));
        assert_eq!(dispatcher.sent().len(), 1);

        dispatcher.fail_with(None);
        dispatcher.send(&request).unwrap();
        assert_eq!(dispatcher.last().unwrap().uri, "u");
    }
}
