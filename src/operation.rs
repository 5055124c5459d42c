//! Named operations bound to command table entries.

use serde_json::{Map, Value};
use tracing::debug;

use crate::client::VaultClient;
use crate::commands::CommandDescriptor;
use crate::error::{Result, VaultError};
use crate::options::RequestOptions;
use crate::request::RequestSpec;

/// Argument key holding per-call transport overrides. Never sent as body.
pub const REQUEST_OPTIONS_KEY: &str = "requestOptions";

/// A command table entry bound to a client.
///
/// Each call runs build, send and interpret once, in that order, and stops at
/// the first failure. Nothing is kept between calls.
#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    descriptor: CommandDescriptor,
    client: VaultClient,
}

impl Operation {
    pub(crate) fn bind(client: VaultClient, name: &str, descriptor: CommandDescriptor) -> Self {
        Self {
            name: name.to_string(),
            descriptor,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    /// Builds the request `call` would send, without sending it.
    pub fn prepare(&self, args: Value) -> Result<RequestSpec> {
        let (body, per_call) = split_args(args)?;
        self.client
            .with_builder(|builder| builder.build(&self.descriptor, &body, &per_call))
    }

    pub async fn call(&self, args: Value) -> Result<Value> {
        let spec = self.prepare(args).inspect_err(|err| {
            debug!(operation = %self.name, error = %err, "request rejected before dispatch");
        })?;
        self.client.dispatch(spec).await
    }
}

/// Separates the body arguments from the nested `requestOptions` object.
pub fn split_args(args: Value) -> Result<(Map<String, Value>, RequestOptions)> {
    let mut map = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(VaultError::invalid_arguments(format!(
                "expected an object, got {other}"
            )));
        }
    };
    let per_call = map
        .shift_remove(REQUEST_OPTIONS_KEY)
        .map(RequestOptions::from_value)
        .unwrap_or_default();
    Ok((map, per_call))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{SpyTransport, client_with};
    use crate::commands::{CommandTable, DescriptorValidation, Method};
    use serde_json::json;
    use std::time::Duration;

    fn table() -> CommandTable {
        CommandTable::default()
            .with("status", CommandDescriptor::new(Method::Get, "/sys/seal-status"))
            .with(
                "init",
                CommandDescriptor::new(Method::Put, "/sys/init").with_validation(
                    DescriptorValidation::BodyOnly(json!({
                        "type": "object",
                        "properties": {
                            "secret_shares": {"type": "integer"},
                            "secret_threshold": {"type": "integer"}
                        },
                        "required": ["secret_shares", "secret_threshold"]
                    })),
                ),
            )
            .with(
                "search",
                CommandDescriptor::new(Method::Get, "/search/{{kind}}").with_validation(
                    DescriptorValidation::BodyAndQuery(
                        json!({"type": "object", "required": ["kind"]}),
                        json!({"type": "object", "properties": {"a": {}, "b": {}}}),
                    ),
                ),
            )
    }

    fn client(spy: &std::sync::Arc<SpyTransport>) -> VaultClient {
        VaultClient::builder()
            .token("abc")
            .transport(spy.clone())
            .commands(table())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn schema_less_operation_dispatches_any_arguments() {
        let spy = SpyTransport::new(200, json!({"sealed": false}));
        let client = client(&spy);
        let body = client
            .invoke("status", json!({"anything": [1, {"nested": true}], "n": 4.5}))
            .await
            .unwrap();
        assert_eq!(body, json!({"sealed": false}));
        assert_eq!(spy.requests().len(), 1);
    }

    #[tokio::test]
    async fn schema_violation_never_reaches_the_transport() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client(&spy);
        let err = client
            .invoke("init", json!({"secret_shares": "five"}))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Schema(_)));
        assert!(spy.requests().is_empty());
    }

    #[tokio::test]
    async fn valid_arguments_become_body_and_query() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client(&spy);
        client
            .invoke("search", json!({"kind": "roles", "a": 1, "b": 2, "c": 3}))
            .await
            .unwrap();
        let sent = spy.requests();
        assert_eq!(sent[0].path, "/search/roles?a=1&b=2");
        assert_eq!(sent[0].body.get("c"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn request_options_are_overrides_not_body() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client(&spy);
        client
            .invoke(
                "init",
                json!({
                    "secret_shares": 1,
                    "secret_threshold": 1,
                    "requestOptions": {"timeout": 1500, "headers": {"X-Extra": "yes"}}
                }),
            )
            .await
            .unwrap();
        let sent = spy.requests();
        assert!(!sent[0].body.contains_key(REQUEST_OPTIONS_KEY));
        assert_eq!(sent[0].timeout, Some(Duration::from_millis(1500)));
        assert_eq!(sent[0].headers.get("X-Extra").map(String::as_str), Some("yes"));
        assert_eq!(sent[0].headers.get("X-Vault-Token").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn repeated_calls_build_independent_equal_requests() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client(&spy);
        let args = json!({"secret_shares": 3, "secret_threshold": 2});
        client.invoke("init", args.clone()).await.unwrap();
        client.invoke("init", args).await.unwrap();
        let sent = spy.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_share_requests() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client(&spy);
        let first = client.operation("search").unwrap();
        let second = first.clone();
        let (a, b) = tokio::join!(
            first.call(json!({"kind": "x", "a": 1})),
            second.call(json!({"kind": "y", "b": 2})),
        );
        a.unwrap();
        b.unwrap();
        let mut paths: Vec<String> = spy.requests().into_iter().map(|spec| spec.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["/search/x?a=1", "/search/y?b=2"]);
    }

    #[test]
    fn prepare_does_not_dispatch() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client(&spy);
        let spec = client
            .operation("status")
            .unwrap()
            .prepare(Value::Null)
            .unwrap();
        assert_eq!(spec.uri, "http://127.0.0.1:8200/v1/sys/seal-status");
        assert!(spy.requests().is_empty());
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let err = split_args(json!("oops")).unwrap_err();
        assert!(matches!(err, VaultError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn bundled_table_operations_work_through_the_default_client() {
        let spy = SpyTransport::new(200, json!({}));
        let client = client_with(&spy);
        client
            .invoke("health", json!({"standbyok": true, "ignored": 1}))
            .await
            .unwrap();
        assert_eq!(spy.requests()[0].path, "/sys/health?standbyok=true");
    }
}
