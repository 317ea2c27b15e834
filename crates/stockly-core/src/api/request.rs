//! Rebuildable request descriptions.
//!
//! A `reqwest::RequestBuilder` is consumed on send, so the guard keeps the
//! request as plain data and builds a fresh one for each attempt.

use reqwest::Method;
use reqwest::multipart::Form;

/// Body of an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Text fields sent as `multipart/form-data`.
    Multipart(Vec<(String, String)>),
}

/// An API call relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    /// Caller-supplied identifiers appended to `path`, each encoded as a
    /// single segment.
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append an identifier such as an image id. `/`, `?` and `#` inside it
    /// are percent-encoded rather than read as URL structure.
    pub fn segment(mut self, value: impl Into<String>) -> Self {
        self.segments.push(value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let field = (name.into(), value.into());
        match self.body {
            RequestBody::Multipart(ref mut fields) => fields.push(field),
            _ => self.body = RequestBody::Multipart(vec![field]),
        }
        self
    }

    /// Multipart forms are single-use; build one per attempt.
    pub(crate) fn multipart_form(fields: &[(String, String)]) -> Form {
        fields.iter().fold(Form::new(), |form, (name, value)| {
            form.text(name.clone(), value.clone())
        })
    }
}

/// Per-request dispatch state, threaded through each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestContext {
    /// Re-dispatches so far; the original attempt is 0.
    pub retries: u8,
    /// Exempt from refresh-on-401, set on the refresh call itself.
    pub skip_refresh: bool,
}

/// A request is re-dispatched at most once.
pub const MAX_RETRIES: u8 = 1;

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exempt() -> Self {
        Self {
            retries: 0,
            skip_refresh: true,
        }
    }

    /// Whether a 401 on this attempt may trigger refresh-and-retry.
    pub fn may_refresh(&self) -> bool {
        !self.skip_refresh && self.retries < MAX_RETRIES
    }

    /// Context for the next attempt.
    pub fn retried(self) -> Self {
        Self {
            retries: self.retries.saturating_add(1),
            ..self
        }
    }

    pub fn is_retry(&self) -> bool {
        self.retries > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_allows_single_retry() {
        let ctx = RequestContext::new();
        assert!(ctx.may_refresh());
        assert!(!ctx.is_retry());

        let retried = ctx.retried();
        assert!(retried.is_retry());
        assert!(!retried.may_refresh());
        assert!(!retried.retried().may_refresh());
    }

    #[test]
    fn test_exempt_context_never_refreshes() {
        assert!(!RequestContext::exempt().may_refresh());
    }

    #[test]
    fn test_segments_keep_path_separate() {
        let request = OutboundRequest::delete("images").segment("a/b");
        assert_eq!(request.path, "images");
        assert_eq!(request.segments, vec!["a/b".to_string()]);
    }

    #[test]
    fn test_form_fields_accumulate() {
        let request = OutboundRequest::post("images/generate")
            .form_field("prompt", "a lighthouse at dusk")
            .form_field("category", "landscape");
        match request.body {
            RequestBody::Multipart(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1], ("category".to_string(), "landscape".to_string()));
            }
            other => panic!("expected multipart body, got {:?}", other),
        }
    }
}
