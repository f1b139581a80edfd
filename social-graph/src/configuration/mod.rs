//! Logic for loading configuration in to an object model

use std::net::SocketAddr;
use std::str::FromStr;

use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file '{path}': {error}
    CannotReadConfig {
        path: String,
        error: std::io::Error,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}

/// The configuration for the service.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builder.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Configuration options pertaining to the http server component.
    pub(crate) server: Server,

    /// Limits applied to incoming operations before they execute.
    pub(crate) limits: Limits,

    /// Configuration of the bundled in-memory storage.
    pub(crate) storage: StorageConfig,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(
        server: Option<Server>,
        limits: Option<Limits>,
        storage: Option<StorageConfig>,
    ) -> Self {
        Self {
            server: server.unwrap_or_default(),
            limits: limits.unwrap_or_default(),
            storage: storage.unwrap_or_default(),
        }
    }

    /// Reads and parses the YAML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigurationError> {
        let yaml = std::fs::read_to_string(path).map_err(|error| {
            ConfigurationError::CannotReadConfig {
                path: path.display().to_string(),
                error,
            }
        })?;
        yaml.parse()
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // an empty document means "all defaults"
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(s).map_err(ConfigurationError::DeserializeConfigError)
    }
}

/// Configuration options pertaining to the http server component.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Server {
    /// The socket address and port to listen on
    /// Defaults to 127.0.0.1:4000
    pub(crate) listen: SocketAddr,

    /// The HTTP path on which GraphQL requests will be served.
    /// default: "/"
    pub(crate) path: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4000))
}

fn default_graphql_path() -> String {
    String::from("/")
}

#[buildstructor::buildstructor]
impl Server {
    #[builder]
    pub fn new(listen: Option<SocketAddr>, path: Option<String>) -> Self {
        Self {
            listen: listen.unwrap_or_else(default_listen),
            path: path.unwrap_or_else(default_graphql_path),
        }
    }

    pub fn listen(&self) -> SocketAddr {
        self.listen
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Operation limits.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Limits {
    /// Deepest allowed field nesting. Root fields are at depth 0.
    /// `null` disables the check.
    /// default: 5
    pub(crate) max_depth: Option<u32>,
}

const DEFAULT_MAX_DEPTH: u32 = 5;

#[buildstructor::buildstructor]
impl Limits {
    /// Builder for a bounded depth, 5 unless `max_depth` is set.
    #[builder]
    pub fn new(max_depth: Option<u32>) -> Self {
        Self {
            max_depth: Some(max_depth.unwrap_or(DEFAULT_MAX_DEPTH)),
        }
    }

    /// Limits that let operations of any depth through.
    pub fn unlimited() -> Self {
        Self { max_depth: None }
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.max_depth
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// In-memory storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Insert the `basic` and `business` member types at startup.
    /// default: true
    pub(crate) seed_member_types: bool,
}

#[buildstructor::buildstructor]
impl StorageConfig {
    #[builder]
    pub fn new(seed_member_types: Option<bool>) -> Self {
        Self {
            seed_member_types: seed_member_types.unwrap_or(true),
        }
    }

    pub fn seed_member_types(&self) -> bool {
        self.seed_member_types
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });

    let gen = settings.into_generator();
    gen.into_root_schema_for::<Configuration>()
}
