use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CommandTableError, VaultError};
use crate::options::RequestOptions;
use crate::validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    List,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::List => "LIST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "LIST" => Ok(Method::List),
            other => Err(VaultError::invalid_arguments(format!(
                "unsupported method {other}"
            ))),
        }
    }
}

/// Which schemas a descriptor declares.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorValidation {
    NoValidation,
    BodyOnly(Value),
    QueryOnly(Value),
    BodyAndQuery(Value, Value),
}

impl DescriptorValidation {
    pub fn body_schema(&self) -> Option<&Value> {
        match self {
            Self::BodyOnly(body) | Self::BodyAndQuery(body, _) => Some(body),
            Self::NoValidation | Self::QueryOnly(_) => None,
        }
    }

    pub fn query_schema(&self) -> Option<&Value> {
        match self {
            Self::QueryOnly(query) | Self::BodyAndQuery(_, query) => Some(query),
            Self::NoValidation | Self::BodyOnly(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "RawDescriptor", into = "RawDescriptor")]
pub struct CommandDescriptor {
    pub method: Method,
    pub path: String,
    pub validation: DescriptorValidation,
    pub request_options: Option<RequestOptions>,
}

impl CommandDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            validation: DescriptorValidation::NoValidation,
            request_options: None,
        }
    }

    pub fn with_validation(mut self, validation: DescriptorValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = Some(options);
        self
    }
}

/// Wire form of a descriptor, as found in command table files.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawDescriptor {
    method: Method,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<RawSchema>,
    #[serde(
        default,
        rename = "requestOptions",
        skip_serializing_if = "Option::is_none"
    )]
    request_options: Option<RequestOptions>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    req: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<Value>,
}

impl From<RawDescriptor> for CommandDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        let (req, query) = raw
            .schema
            .map(|schema| (schema.req, schema.query))
            .unwrap_or_default();
        let validation = match (req, query) {
            (None, None) => DescriptorValidation::NoValidation,
            (Some(body), None) => DescriptorValidation::BodyOnly(body),
            (None, Some(query)) => DescriptorValidation::QueryOnly(query),
            (Some(body), Some(query)) => DescriptorValidation::BodyAndQuery(body, query),
        };
        Self {
            method: raw.method,
            path: raw.path,
            validation,
            request_options: raw.request_options,
        }
    }
}

impl From<CommandDescriptor> for RawDescriptor {
    fn from(desc: CommandDescriptor) -> Self {
        let schema = match desc.validation {
            DescriptorValidation::NoValidation => None,
            DescriptorValidation::BodyOnly(req) => Some(RawSchema {
                req: Some(req),
                query: None,
            }),
            DescriptorValidation::QueryOnly(query) => Some(RawSchema {
                req: None,
                query: Some(query),
            }),
            DescriptorValidation::BodyAndQuery(req, query) => Some(RawSchema {
                req: Some(req),
                query: Some(query),
            }),
        };
        Self {
            method: desc.method,
            path: desc.path,
            schema,
            request_options: desc.request_options,
        }
    }
}

/// Operation name to descriptor mapping. Loaded once, never mutated by the client.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CommandTable {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandTable {
    /// The table compiled into the crate.
    pub fn bundled() -> Result<Self, CommandTableError> {
        let raw = include_str!("../schemas/commands.json");
        Self::from_json_str(raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CommandTableError> {
        let table: Self = serde_json::from_str(raw)?;
        table.check_schemas()?;
        Ok(table)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, CommandTableError> {
        let table: Self = serde_yaml::from_str(raw)?;
        table.check_schemas()?;
        Ok(table)
    }

    /// Compiles every declared schema so a broken table fails on load
    /// instead of on each call.
    pub fn check_schemas(&self) -> Result<(), CommandTableError> {
        for (name, desc) in &self.commands {
            let schemas = [desc.validation.body_schema(), desc.validation.query_schema()];
            for schema in schemas.into_iter().flatten() {
                validator::compile(schema).map_err(|source| CommandTableError::Schema {
                    name: name.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: CommandDescriptor) {
        self.commands.insert(name.into(), descriptor);
    }

    pub fn with(mut self, name: impl Into<String>, descriptor: CommandDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CommandDescriptor)> {
        self.commands.iter().map(|(name, desc)| (name.as_str(), desc))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
