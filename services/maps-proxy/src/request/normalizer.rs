use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use url::{form_urlencoded, Url};

use super::{HttpMethod, NormalizedRequest, RequestDescriptor, ValidationError};

/// Scheme prefixes rejected at the start of a path even without `//`
const SCHEME_PREFIXES: &[&str] = &["http:", "https:", "file:", "data:", "javascript:", "ftp:"];

/// Turns untrusted [`RequestDescriptor`]s into [`NormalizedRequest`]s.
///
/// Pure over its inputs: the only state is the configured default base URL and whether
/// plain `http` upstreams are tolerated (local testing only).
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_base_url: String,
    allow_insecure: bool,
}

impl Normalizer {
    pub fn new(default_base_url: impl Into<String>) -> Self {
        Self {
            default_base_url: default_base_url.into(),
            allow_insecure: false,
        }
    }

    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    pub fn normalize(&self, raw: &RequestDescriptor) -> Result<NormalizedRequest, ValidationError> {
        let path = normalize_path(&raw.path)?;

        let method = match raw.method.as_deref() {
            Some(method) => method.parse::<HttpMethod>()?,
            None => HttpMethod::Get,
        };

        let base_url = self.resolve_base_url(raw.base_url.as_deref())?;

        let query = raw
            .params
            .as_ref()
            .map(build_query_string)
            .unwrap_or_default();

        let body = if method.carries_body() {
            raw.body.clone()
        } else {
            None
        };

        debug!(%method, path = %path, base_url = %base_url, "request normalized");

        Ok(NormalizedRequest {
            method,
            base_url,
            path,
            query,
            body,
        })
    }

    /// Validates a caller-supplied base URL, or the configured default when absent.
    pub fn resolve_base_url(&self, candidate: Option<&str>) -> Result<String, ValidationError> {
        let candidate = candidate
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.default_base_url);

        let url = Url::parse(candidate)
            .map_err(|e| ValidationError::InvalidBaseUrl(format!("unable to parse URL ({})", e)))?;

        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure => {}
            other => {
                return Err(ValidationError::InvalidBaseUrl(format!(
                    "scheme '{}' is not allowed, use https",
                    other
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ValidationError::InvalidBaseUrl("missing host".to_string()));
        }
        if url.query().is_some_and(|q| !q.is_empty()) {
            return Err(ValidationError::InvalidBaseUrl(
                "query strings are not allowed".to_string(),
            ));
        }
        if url.fragment().is_some_and(|f| !f.is_empty()) {
            return Err(ValidationError::InvalidBaseUrl(
                "fragments are not allowed".to_string(),
            ));
        }

        let normalized = format!("{}{}", url.origin().ascii_serialization(), url.path());
        Ok(normalized.trim_end_matches('/').to_string())
    }
}

fn normalize_path(raw: &str) -> Result<String, ValidationError> {
    let path = raw.trim().trim_start_matches('/');

    if path.is_empty() {
        return Err(ValidationError::InvalidPath("path is required"));
    }

    let lowered = path.to_ascii_lowercase();
    if lowered.contains("://")
        || SCHEME_PREFIXES
            .iter()
            .any(|prefix| lowered.starts_with(prefix))
    {
        return Err(ValidationError::InvalidPath("absolute URLs are not allowed"));
    }

    if path.contains('?') || path.contains('#') {
        return Err(ValidationError::InvalidPath(
            "query strings and fragments belong in params",
        ));
    }

    if path.split(['/', '\\']).any(is_parent_segment) {
        return Err(ValidationError::InvalidPath(
            "parent directory segments are not allowed",
        ));
    }

    Ok(path.to_string())
}

fn is_parent_segment(segment: &str) -> bool {
    segment.to_ascii_lowercase().replace("%2e", ".") == ".."
}

/// URL-encodes every non-null parameter. Keys come out in sorted order.
pub fn build_query_string(params: &BTreeMap<String, Value>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        serializer.append_pair(key, &value);
    }
    serializer.finish()
}
