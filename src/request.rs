//! Turns a descriptor plus caller arguments into a ready-to-send request.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::commands::{CommandDescriptor, Method};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::options::{self, RequestOptions};
use crate::template::{ESCAPED_SLASH, Templater};
use crate::validator::{REQUEST_SCHEMA, ValidationError, Validator};

pub const TOKEN_HEADER: &str = "X-Vault-Token";
pub const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// A fully resolved request. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSpec {
    pub method: Method,
    /// Rendered path, including any query string.
    pub path: String,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub body: Map<String, Value>,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

pub struct RequestBuilder<'a> {
    config: &'a ClientConfig,
    validator: &'a dyn Validator,
    templater: &'a dyn Templater,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        config: &'a ClientConfig,
        validator: &'a dyn Validator,
        templater: &'a dyn Templater,
    ) -> Self {
        Self {
            config,
            validator,
            templater,
        }
    }

    /// Client defaults, then descriptor defaults, then per-call overrides.
    /// Client defaults are skipped when the per-call options say `inherit: false`.
    pub fn merge_options(
        &self,
        descriptor_options: Option<&RequestOptions>,
        per_call: &RequestOptions,
    ) -> RequestOptions {
        let mut merged = if per_call.inherits() {
            self.config.request_options.clone()
        } else {
            RequestOptions::new()
        };
        if let Some(descriptor_options) = descriptor_options {
            merged.merge(descriptor_options);
        }
        merged.merge(per_call);
        merged.remove(options::INHERIT);
        merged
    }

    /// Builds the request for a command table entry.
    pub fn build(
        &self,
        descriptor: &CommandDescriptor,
        args: &Map<String, Value>,
        per_call: &RequestOptions,
    ) -> Result<RequestSpec> {
        let mut merged = self
            .merge_options(descriptor.request_options.as_ref(), per_call)
            .method(descriptor.method)
            .path(descriptor.path.clone())
            .body(Value::Object(args.clone()));
        self.check_shape(&merged)?;

        let document = Value::Object(args.clone());
        if let Some(schema) = descriptor.validation.body_schema() {
            self.validator.validate(&document, schema)?;
        }
        if let Some(schema) = descriptor.validation.query_schema() {
            self.validator.validate(&document, schema)?;
            merged.insert(options::PATH, expand_query(&descriptor.path, schema, args));
        }

        self.finish(merged)
    }

    /// Builds a request from raw options (`path`, `method`, `headers`, `json`, ...).
    pub fn build_raw(&self, per_call: &RequestOptions) -> Result<RequestSpec> {
        let merged = self.merge_options(None, per_call);
        self.check_shape(&merged)?;
        self.finish(merged)
    }

    fn check_shape(&self, merged: &RequestOptions) -> std::result::Result<(), ValidationError> {
        self.validator
            .validate(&Value::Object(merged.as_map().clone()), &REQUEST_SCHEMA)
    }

    fn finish(&self, merged: RequestOptions) -> Result<RequestSpec> {
        let mut method: Method = merged
            .get(options::METHOD)
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::new("/method", "method is required"))?
            .parse()?;
        let mut path = merged
            .path_str()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| ValidationError::new("/path", "path is required"))?
            .to_string();
        let body = match merged.body_value() {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(ValidationError::new("/json", "body must be an object").into()),
        };

        if method == Method::List && self.config.no_custom_http_verbs {
            method = Method::Get;
            path = append_query(&path, "list=true");
        }

        let rendered = self
            .templater
            .render(&path, &Value::Object(body.clone()))
            .replace(ESCAPED_SLASH, "/");

        let mut headers = merged.headers();
        if let Some(token) = self.config.active_token() {
            let caller_supplied = headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case(TOKEN_HEADER));
            if !caller_supplied {
                headers.insert(TOKEN_HEADER.to_string(), token.to_string());
            }
        }
        if let Some(namespace) = self.config.active_namespace() {
            headers.insert(NAMESPACE_HEADER.to_string(), namespace.to_string());
        }

        Ok(RequestSpec {
            method,
            uri: self.config.uri_for(&rendered),
            path: rendered,
            headers,
            body,
            timeout: merged.timeout_duration(),
        })
    }
}

/// Promotes arguments declared in the query schema to the query string,
/// in the schema's property order.
pub fn expand_query(path: &str, query_schema: &Value, args: &Map<String, Value>) -> String {
    let Some(properties) = query_schema.get("properties").and_then(Value::as_object) else {
        return path.to_string();
    };
    let params: Vec<String> = properties
        .keys()
        .filter_map(|name| {
            args.get(name)
                .map(|value| format!("{name}={}", urlencoding::encode(&query_value(value))))
        })
        .collect();
    if params.is_empty() {
        return path.to_string();
    }
    append_query(path, &params.join("&"))
}

fn append_query(path: &str, query: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{path}{sep}{query}")
}

/// Arrays are comma-joined, matching how Vault reads list parameters.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::DescriptorValidation;
    use crate::error::VaultError;
    use crate::template::MustacheTemplater;
    use crate::validator::JsonSchemaValidator;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn build(
        config: &ClientConfig,
        descriptor: &CommandDescriptor,
        call_args: Value,
        per_call: RequestOptions,
    ) -> Result<RequestSpec> {
        RequestBuilder::new(config, &JsonSchemaValidator::new(), &MustacheTemplater).build(
            descriptor,
            &args(call_args),
            &per_call,
        )
    }

    fn token_config(token: &str) -> ClientConfig {
        ClientConfig {
            token: Some(token.to_string()),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn query_expansion_follows_schema_order_and_skips_undeclared() {
        let schema = json!({"properties": {"a": {}, "b": {}}});
        let desc = CommandDescriptor::new(Method::Get, "/q")
            .with_validation(DescriptorValidation::QueryOnly(schema));
        let spec = build(
            &ClientConfig::default(),
            &desc,
            json!({"c": 3, "b": 2, "a": 1}),
            RequestOptions::new(),
        )
        .unwrap();
        assert!(spec.path.ends_with("?a=1&b=2"), "got {}", spec.path);
        assert!(spec.uri.ends_with("/v1/q?a=1&b=2"));
    }

    #[test]
    fn query_values_are_url_encoded() {
        let query = expand_query(
            "/x",
            &json!({"properties": {"q": {}}}),
            &args(json!({"q": "a b&c"})),
        );
        assert_eq!(query, "/x?q=a%20b%26c");
    }

    #[test]
    fn array_query_values_are_comma_joined() {
        let query = expand_query(
            "/sys/metrics",
            &json!({"properties": {"keys": {}, "tags": {}}}),
            &args(json!({"keys": [1, 2], "tags": ["a b", "c"]})),
        );
        assert_eq!(query, "/sys/metrics?keys=1%2C2&tags=a%20b%2Cc");
    }

    #[test]
    fn no_query_params_leaves_path_alone() {
        assert_eq!(
            expand_query("/x", &json!({"properties": {"q": {}}}), &args(json!({"z": 1}))),
            "/x"
        );
    }

    #[test]
    fn substituted_slashes_stay_literal() {
        let desc = CommandDescriptor::new(Method::Get, "/secret/{{name}}");
        let spec = build(
            &ClientConfig::default(),
            &desc,
            json!({"name": "foo/bar"}),
            RequestOptions::new(),
        )
        .unwrap();
        assert_eq!(spec.path, "/secret/foo/bar");
        assert_eq!(spec.uri, "http://127.0.0.1:8200/v1/secret/foo/bar");
    }

    #[test]
    fn token_header_attached_when_configured() {
        let desc = CommandDescriptor::new(Method::Get, "/sys/seal-status");
        let spec = build(&token_config("abc"), &desc, json!({}), RequestOptions::new()).unwrap();
        assert_eq!(spec.headers.get(TOKEN_HEADER).map(String::as_str), Some("abc"));
    }

    #[test]
    fn no_token_header_without_token() {
        let desc = CommandDescriptor::new(Method::Get, "/sys/seal-status");
        let spec =
            build(&ClientConfig::default(), &desc, json!({}), RequestOptions::new()).unwrap();
        assert!(!spec.headers.contains_key(TOKEN_HEADER));
        assert!(build(&token_config(""), &desc, json!({}), RequestOptions::new())
            .unwrap()
            .headers
            .is_empty());
    }

    #[test]
    fn caller_token_header_is_kept() {
        let desc = CommandDescriptor::new(Method::Get, "/auth/token/lookup-self");
        let spec = build(
            &token_config("abc"),
            &desc,
            json!({}),
            RequestOptions::new().header("x-vault-token", "other"),
        )
        .unwrap();
        assert_eq!(spec.headers.get("x-vault-token").map(String::as_str), Some("other"));
        assert!(!spec.headers.contains_key(TOKEN_HEADER));
    }

    #[test]
    fn namespace_header_attached() {
        let config = ClientConfig {
            namespace: Some("team-a".to_string()),
            ..ClientConfig::default()
        };
        let desc = CommandDescriptor::new(Method::Get, "/sys/mounts");
        let spec = build(&config, &desc, json!({}), RequestOptions::new()).unwrap();
        assert_eq!(
            spec.headers.get(NAMESPACE_HEADER).map(String::as_str),
            Some("team-a")
        );
    }

    #[test]
    fn body_schema_violation_is_a_schema_error() {
        let desc = CommandDescriptor::new(Method::Put, "/sys/init").with_validation(
            DescriptorValidation::BodyOnly(json!({
                "type": "object",
                "properties": {"secret_shares": {"type": "integer"}},
                "required": ["secret_shares"]
            })),
        );
        let err = build(&ClientConfig::default(), &desc, json!({}), RequestOptions::new())
            .unwrap_err();
        let VaultError::Schema(validation) = err else {
            panic!("expected schema error, got {err:?}");
        };
        assert!(validation.message.contains("secret_shares"));
    }

    #[test]
    fn query_schema_violation_is_a_schema_error() {
        let desc = CommandDescriptor::new(Method::Get, "/sys/health").with_validation(
            DescriptorValidation::QueryOnly(json!({
                "type": "object",
                "properties": {"standbyok": {"type": "boolean"}}
            })),
        );
        let err = build(
            &ClientConfig::default(),
            &desc,
            json!({"standbyok": "yes"}),
            RequestOptions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::Schema(ref v) if v.location == "/standbyok"));
    }

    #[test]
    fn options_merge_in_priority_order() {
        let config = ClientConfig {
            request_options: RequestOptions::new().set("timeout", 1000).set("client", true),
            ..ClientConfig::default()
        };
        let desc = CommandDescriptor::new(Method::Get, "/sys/leader")
            .with_request_options(RequestOptions::new().set("timeout", 2000));
        let spec = build(&config, &desc, json!({}), RequestOptions::new()).unwrap();
        assert_eq!(spec.timeout, Some(Duration::from_millis(2000)));

        let spec = build(&config, &desc, json!({}), RequestOptions::new().set("timeout", 30))
            .unwrap();
        assert_eq!(spec.timeout, Some(Duration::from_millis(30)));
    }

    #[test]
    fn descriptor_fields_override_per_call_path_and_method() {
        let desc = CommandDescriptor::new(Method::Get, "/sys/leader");
        let spec = build(
            &ClientConfig::default(),
            &desc,
            json!({}),
            RequestOptions::new().path("/elsewhere").method(Method::Delete),
        )
        .unwrap();
        assert_eq!(spec.method, Method::Get);
        assert_eq!(spec.path, "/sys/leader");
    }

    #[test]
    fn inherit_false_skips_client_defaults() {
        let config = ClientConfig {
            request_options: RequestOptions::new().header("X-Default", "1"),
            ..ClientConfig::default()
        };
        let validator = JsonSchemaValidator::new();
        let builder = RequestBuilder::new(&config, &validator, &MustacheTemplater);
        let inherited = builder
            .build_raw(&RequestOptions::new().path("/a").method(Method::Get))
            .unwrap();
        assert!(inherited.headers.contains_key("X-Default"));

        let isolated = builder
            .build_raw(
                &RequestOptions::new()
                    .path("/a")
                    .method(Method::Get)
                    .inherit(false),
            )
            .unwrap();
        assert!(!isolated.headers.contains_key("X-Default"));
    }

    #[test]
    fn raw_request_with_bad_method_fails_shape_check() {
        let config = ClientConfig::default();
        let validator = JsonSchemaValidator::new();
        let builder = RequestBuilder::new(&config, &validator, &MustacheTemplater);
        let err = builder
            .build_raw(&RequestOptions::new().path("/a").set("method", "PATCH"))
            .unwrap_err();
        assert!(matches!(err, VaultError::Schema(ref v) if v.location == "/method"));

        let err = builder
            .build_raw(&RequestOptions::new().method(Method::Get))
            .unwrap_err();
        assert!(matches!(err, VaultError::Schema(_)));
    }

    #[test]
    fn list_becomes_get_without_custom_verbs() {
        let config = ClientConfig {
            no_custom_http_verbs: true,
            ..ClientConfig::default()
        };
        let desc = CommandDescriptor::new(Method::List, "/auth/token/roles");
        let spec = build(&config, &desc, json!({}), RequestOptions::new()).unwrap();
        assert_eq!(spec.method, Method::Get);
        assert_eq!(spec.path, "/auth/token/roles?list=true");
    }

    #[test]
    fn identical_calls_build_identical_specs() {
        let desc = CommandDescriptor::new(Method::Post, "/transit/encrypt/{{name}}");
        let config = token_config("abc");
        let call = || {
            build(
                &config,
                &desc,
                json!({"name": "k", "plaintext": "aGk="}),
                RequestOptions::new(),
            )
            .unwrap()
        };
        let first = call();
        let second = call();
        assert_eq!(first, second);
        assert_eq!(first.body.get("plaintext"), Some(&json!("aGk=")));
    }
}
