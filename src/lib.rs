//! Table-driven client for the Vault HTTP API.
//!
//! Every entry of a [`CommandTable`] becomes a named [`Operation`]. Calling one
//! validates the arguments against the entry's schemas, renders its path
//! template, attaches the token header, sends the request and turns the
//! response into either the body or a [`VaultError`].
//!
//! ```no_run
//! use serde_json::json;
//! use vault_client::VaultClient;
//!
//! # async fn run() -> vault_client::Result<()> {
//! let client = VaultClient::from_env()?;
//! let health = client.invoke("health", json!({"standbyok": true})).await?;
//! let secret = client.read("secret/app", Default::default()).await?;
//! # let _ = (health, secret);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod operation;
pub mod options;
pub mod request;
pub mod response;
pub mod template;
pub mod validator;

pub use client::{VaultClient, VaultClientBuilder};
pub use commands::{CommandDescriptor, CommandTable, DescriptorValidation, Method};
pub use config::ClientConfig;
pub use error::{Result, VaultError};
pub use http::{HttpTransport, RawResponse, RequestEcho, Transport};
pub use operation::Operation;
pub use options::RequestOptions;
pub use request::RequestSpec;
pub use template::{MustacheTemplater, Templater};
pub use validator::{JsonSchemaValidator, ValidationError, Validator};
