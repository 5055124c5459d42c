use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tracing::debug;

use crate::commands::{CommandDescriptor, CommandTable, Method};
use crate::config::ClientConfig;
use crate::error::{Result, VaultError};
use crate::http::{HttpTransport, Transport};
use crate::operation::Operation;
use crate::options::RequestOptions;
use crate::request::{RequestBuilder, RequestSpec};
use crate::response::interpret;
use crate::template::{MustacheTemplater, Templater};
use crate::validator::{JsonSchemaValidator, Validator};

/// Vault HTTP client. Cheap to clone; clones share configuration and transport.
#[derive(Clone)]
pub struct VaultClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ArcSwap<ClientConfig>,
    transport: Arc<dyn Transport>,
    validator: Arc<dyn Validator>,
    templater: Arc<dyn Templater>,
    commands: CommandTable,
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.inner.config.load();
        f.debug_struct("VaultClient")
            .field("endpoint", &config.endpoint)
            .field("api_version", &config.api_version)
            .field("commands", &self.inner.commands.len())
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    pub fn builder() -> VaultClientBuilder {
        VaultClientBuilder::new()
    }

    /// Client configured from `VAULT_ADDR`, `VAULT_TOKEN` and friends.
    pub fn from_env() -> Result<Self> {
        VaultClientBuilder::from_env().build()
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.inner.config.load_full()
    }

    /// Replaces the token for calls started from now on.
    pub fn set_token(&self, token: Option<String>) {
        self.inner.config.rcu(|current| {
            let mut next = ClientConfig::clone(current);
            next.token = token.clone();
            next
        });
    }

    pub fn commands(&self) -> &CommandTable {
        &self.inner.commands
    }

    /// Names of every generated operation.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.commands.names()
    }

    pub fn descriptor(&self, name: &str) -> Option<&CommandDescriptor> {
        self.inner.commands.get(name)
    }

    pub fn operation(&self, name: &str) -> Result<Operation> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| VaultError::UnknownCommand {
                name: name.to_string(),
            })?;
        Ok(Operation::bind(self.clone(), name, descriptor.clone()))
    }

    /// One bound operation per command table entry.
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.inner
            .commands
            .iter()
            .map(|(name, descriptor)| Operation::bind(self.clone(), name, descriptor.clone()))
    }

    /// Calls the named operation with `args` as body and template context.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        self.operation(name)?.call(args).await
    }

    /// Sends raw options (`path`, `method`, `headers`, `json`, `inherit`, ...).
    pub async fn request(&self, options: RequestOptions) -> Result<Value> {
        let spec = self.with_builder(|builder| builder.build_raw(&options))?;
        self.dispatch(spec).await
    }

    pub async fn read(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(options.path(rooted(path)).method(Method::Get))
            .await
    }

    pub async fn write(&self, path: &str, data: Value, options: RequestOptions) -> Result<Value> {
        if !(data.is_object() || data.is_null()) {
            return Err(VaultError::invalid_arguments("write data must be an object"));
        }
        self.request(options.path(rooted(path)).method(Method::Put).body(data))
            .await
    }

    pub async fn list(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(options.path(rooted(path)).method(Method::List))
            .await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Value> {
        self.request(options.path(rooted(path)).method(Method::Delete))
            .await
    }

    /// Fetches the help text for a path.
    pub async fn help(&self, path: &str, options: RequestOptions) -> Result<Value> {
        let path = format!("{}?help=1", rooted(path));
        self.request(options.path(path).method(Method::Get)).await
    }

    pub(crate) fn with_builder<T>(&self, f: impl FnOnce(&RequestBuilder<'_>) -> T) -> T {
        let config = self.inner.config.load_full();
        let builder = RequestBuilder::new(
            &config,
            self.inner.validator.as_ref(),
            self.inner.templater.as_ref(),
        );
        f(&builder)
    }

    pub(crate) async fn dispatch(&self, spec: RequestSpec) -> Result<Value> {
        debug!(method = %spec.method, path = %spec.path, "dispatching");
        let raw = self.inner.transport.send(&spec).await?;
        interpret(Some(raw))
    }
}

fn rooted(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Builder for [`VaultClient`]. Every collaborator has a default.
pub struct VaultClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    validator: Option<Arc<dyn Validator>>,
    templater: Option<Arc<dyn Templater>>,
    commands: Option<CommandTable>,
}

impl Default for VaultClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultClientBuilder {
    /// Builder with built-in defaults; the environment is not consulted.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    pub fn from_env() -> Self {
        Self::from_config(ClientConfig::from_env())
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            validator: None,
            templater: None,
            commands: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.config.api_version = api_version.into();
        self
    }

    pub fn path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.config.path_prefix = path_prefix.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn no_token(mut self) -> Self {
        self.config.token = None;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    pub fn request_options(mut self, options: RequestOptions) -> Self {
        self.config.request_options = options;
        self
    }

    pub fn no_custom_http_verbs(mut self, enabled: bool) -> Self {
        self.config.no_custom_http_verbs = enabled;
        self
    }

    pub fn skip_tls_verify(mut self, skip: bool) -> Self {
        self.config.skip_tls_verify = skip;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn templater(mut self, templater: Arc<dyn Templater>) -> Self {
        self.templater = Some(templater);
        self
    }

    pub fn commands(mut self, commands: CommandTable) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn build(self) -> Result<VaultClient> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.skip_tls_verify)?),
        };
        let commands = match self.commands {
            Some(commands) => commands,
            None => CommandTable::bundled()?,
        };
        commands.check_schemas()?;
        debug!(
            endpoint = %self.config.endpoint,
            commands = commands.len(),
            "vault client ready"
        );
        Ok(VaultClient {
            inner: Arc::new(ClientInner {
                config: ArcSwap::from_pointee(self.config),
                transport,
                validator: self
                    .validator
                    .unwrap_or_else(|| Arc::new(JsonSchemaValidator::new())),
                templater: self
                    .templater
                    .unwrap_or_else(|| Arc::new(MustacheTemplater)),
                commands,
            }),
        })
    }
}
