use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Logical request description sent by the explorer UI. Untrusted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    /// Upstream endpoint path without scheme or host, e.g. `search/address/json`
    pub path: String,

    /// Query parameters; `null` values are dropped during normalization
    pub params: Option<BTreeMap<String, Value>>,

    /// HTTP verb, defaults to GET when absent
    pub method: Option<String>,

    /// Overrides the configured upstream base URL
    pub base_url: Option<String>,

    /// JSON payload, only sent for POST/PUT/PATCH
    pub body: Option<Value>,

    /// Per-request credential overrides
    pub auth: Option<AuthOverride>,
}

impl RequestDescriptor {
    /// Reads a descriptor out of any JSON value, field by field.
    ///
    /// A non-string `path` is rejected outright. A non-string `method` or `baseUrl` is kept
    /// as its JSON text, which the normalizer then rejects in its usual order. Non-object
    /// `params` and `auth`, and non-string credential fields, are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let field = |name: &str| value.get(name).filter(|v| !v.is_null());

        let path = match field("path") {
            None => String::new(),
            Some(Value::String(path)) => path.clone(),
            Some(_) => return Err(ValidationError::InvalidPath("path must be a string")),
        };

        let params = field("params").and_then(Value::as_object).map(|params| {
            params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        });

        let auth = field("auth").and_then(Value::as_object).map(|auth| AuthOverride {
            api_key: auth.get("apiKey").and_then(Value::as_str).map(str::to_string),
            client_id: auth
                .get("clientId")
                .and_then(Value::as_str)
                .map(str::to_string),
        });

        Ok(Self {
            path,
            params,
            method: field("method").map(text_of),
            base_url: field("baseUrl").map(text_of),
            body: field("body").cloned(),
            auth,
        })
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_auth(mut self, auth: AuthOverride) -> Self {
        self.auth = Some(auth);
        self
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOverride {
    pub api_key: Option<String>,
    pub client_id: Option<String>,
}

impl AuthOverride {
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            client_id: None,
        }
    }

    pub fn with_client_id(client_id: impl Into<String>) -> Self {
        Self {
            api_key: None,
            client_id: Some(client_id.into()),
        }
    }
}

impl fmt::Debug for AuthOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOverride")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request body is forwarded for this verb
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ValidationError::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Validated upstream request. Every field has passed the normalizer's checks.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub method: HttpMethod,
    /// `origin + pathname`, no trailing slash
    pub base_url: String,
    /// Relative path, no leading slash
    pub path: String,
    /// Encoded query string without the leading `?`
    pub query: String,
    pub body: Option<Value>,
}

impl NormalizedRequest {
    pub fn url(&self) -> String {
        let mut url = format!("{}/{}", self.base_url, self.path);
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert_eq!(
            "TRACE".parse::<HttpMethod>(),
            Err(ValidationError::InvalidMethod("TRACE".to_string()))
        );
        assert!("get".parse::<HttpMethod>().is_err());
        assert!("".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_descriptor_reads_camel_case() {
        let descriptor = RequestDescriptor::from_value(&json!({
            "path": "search/address/json",
            "params": { "query": "Seattle", "limit": 5, "skip": null },
            "method": "GET",
            "baseUrl": "https://atlas.microsoft.com",
            "auth": { "apiKey": "k", "clientId": "c" }
        }))
        .unwrap();

        assert_eq!(descriptor.path, "search/address/json");
        assert_eq!(descriptor.base_url.as_deref(), Some("https://atlas.microsoft.com"));
        let auth = descriptor.auth.unwrap();
        assert_eq!(auth.api_key.as_deref(), Some("k"));
        assert_eq!(auth.client_id.as_deref(), Some("c"));
        assert_eq!(descriptor.params.unwrap().len(), 3);
    }

    #[test]
    fn test_descriptor_field_types_read_leniently() {
        assert_eq!(
            RequestDescriptor::from_value(&json!({ "path": 42 })).unwrap_err(),
            ValidationError::InvalidPath("path must be a string")
        );

        let descriptor = RequestDescriptor::from_value(&json!({
            "path": "search",
            "method": 7,
            "baseUrl": ["https://atlas.microsoft.com"],
            "params": "query=x",
            "auth": { "apiKey": 5, "clientId": "c" },
            "body": null
        }))
        .unwrap();
        assert_eq!(descriptor.method.as_deref(), Some("7"));
        assert_eq!(
            descriptor.base_url.as_deref(),
            Some(r#"["https://atlas.microsoft.com"]"#)
        );
        assert!(descriptor.params.is_none());
        assert!(descriptor.body.is_none());
        let auth = descriptor.auth.unwrap();
        assert!(auth.api_key.is_none());
        assert_eq!(auth.client_id.as_deref(), Some("c"));

        let empty = RequestDescriptor::from_value(&json!(["not", "an", "object"])).unwrap();
        assert!(empty.path.is_empty());
        assert!(empty.method.is_none());
    }

    #[test]
    fn test_auth_override_debug_hides_key() {
        let auth = AuthOverride::with_api_key("super-secret");
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_normalized_url() {
        let request = NormalizedRequest {
            method: HttpMethod::Get,
            base_url: "https://atlas.microsoft.com".to_string(),
            path: "reverseGeocode".to_string(),
            query: "coordinates=1%2C2".to_string(),
            body: None,
        };
        assert_eq!(
            request.url(),
            "https://atlas.microsoft.com/reverseGeocode?coordinates=1%2C2"
        );

        let bare = NormalizedRequest {
            query: String::new(),
            ..request
        };
        assert_eq!(bare.url(), "https://atlas.microsoft.com/reverseGeocode");
    }
}
