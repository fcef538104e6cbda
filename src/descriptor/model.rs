// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource declarations and provider bindings

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OutpostError;

/// Namespace served by the cloud provider binding
pub const CLOUD_NAMESPACE: &str = "cloud";
/// Namespace served by the container runtime binding
pub const CONTAINER_NAMESPACE: &str = "container";

/// Resource type of a declaration
///
/// Known kinds carry a default namespace and engine type. Anything else is
/// written `<namespace>:<engine_type>`, e.g. `cloud:linode_firewall`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    ComputeInstance,
    DiskImage,
    ObjectStorageCluster,
    ObjectStorageBucket,
    ObjectStorageKey,
    Container,
    ContainerImage,
    Custom { namespace: String, engine_type: String },
}

impl ResourceKind {
    /// Name used in references and addresses
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::ComputeInstance => "compute_instance",
            ResourceKind::DiskImage => "disk_image",
            ResourceKind::ObjectStorageCluster => "object_storage_cluster",
            ResourceKind::ObjectStorageBucket => "object_storage_bucket",
            ResourceKind::ObjectStorageKey => "object_storage_key",
            ResourceKind::Container => "container",
            ResourceKind::ContainerImage => "container_image",
            ResourceKind::Custom { engine_type, .. } => engine_type,
        }
    }

    /// Provider namespace that must be bound for this kind
    pub fn namespace(&self) -> &str {
        match self {
            ResourceKind::Container | ResourceKind::ContainerImage => CONTAINER_NAMESPACE,
            ResourceKind::Custom { namespace, .. } => namespace,
            _ => CLOUD_NAMESPACE,
        }
    }

    /// Engine type name when the binding has no override
    pub fn default_engine_type(&self) -> &str {
        match self {
            ResourceKind::ComputeInstance => "linode_instance",
            ResourceKind::DiskImage => "linode_image",
            ResourceKind::ObjectStorageCluster => "linode_object_storage_cluster",
            ResourceKind::ObjectStorageBucket => "linode_object_storage_bucket",
            ResourceKind::ObjectStorageKey => "linode_object_storage_key",
            ResourceKind::Container => "docker_container",
            ResourceKind::ContainerImage => "docker_image",
            ResourceKind::Custom { engine_type, .. } => engine_type,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Custom {
                namespace,
                engine_type,
            } => write!(f, "{}:{}", namespace, engine_type),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = OutpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "compute_instance" => ResourceKind::ComputeInstance,
            "disk_image" => ResourceKind::DiskImage,
            "object_storage_cluster" => ResourceKind::ObjectStorageCluster,
            "object_storage_bucket" => ResourceKind::ObjectStorageBucket,
            "object_storage_key" => ResourceKind::ObjectStorageKey,
            "container" => ResourceKind::Container,
            "container_image" => ResourceKind::ContainerImage,
            other => match other.split_once(':') {
                Some((namespace, engine_type))
                    if is_word(namespace) && is_word(engine_type) =>
                {
                    ResourceKind::Custom {
                        namespace: namespace.to_string(),
                        engine_type: engine_type.to_string(),
                    }
                }
                _ => {
                    return Err(OutpostError::InvalidConfig {
                        message: format!("Unknown resource type: {}", other),
                    })
                }
            },
        };
        Ok(kind)
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = OutpostError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.to_string()
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `{ ref = "<type>.<name>.<attribute>" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    #[serde(rename = "ref")]
    pub target: String,
}

/// Parsed form of a [`Reference`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTarget {
    pub kind: ResourceKind,
    pub name: String,
    /// Computed attribute; may itself be dotted (`ipv4.0`)
    pub attribute: String,
}

impl ReferenceTarget {
    /// Address of the referenced declaration
    pub fn address(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }
}

impl FromStr for ReferenceTarget {
    type Err = OutpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || OutpostError::InvalidConfig {
            message: format!("Malformed reference: {}", s),
        };

        let mut parts = s.splitn(3, '.');
        let (kind, name, attribute) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(n), Some(a)) if !n.is_empty() && !a.is_empty() => (k, n, a),
            _ => return Err(malformed()),
        };

        Ok(Self {
            kind: kind.parse().map_err(|_| malformed())?,
            name: name.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

/// Attribute value of a declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Reference(Reference),
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Reference strings anywhere inside this value
    pub fn references(&self) -> Vec<&str> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references<'v>(&'v self, found: &mut Vec<&'v str>) {
        match self {
            Value::Reference(r) => found.push(&r.target),
            Value::List(items) => items.iter().for_each(|v| v.collect_references(found)),
            Value::Map(entries) => entries.values().for_each(|v| v.collect_references(found)),
            _ => {}
        }
    }
}

/// A single named, typed infrastructure object description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Resource type
    #[serde(rename = "type")]
    pub kind: ResourceKind,

    /// Local name, unique per type
    pub name: String,

    /// Read from the provider rather than managed
    #[serde(default)]
    pub data: bool,

    /// Literal attributes and references
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Declaration {
    /// `<type>.<name>`
    pub fn address(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    /// Reference strings used by this declaration's attributes
    pub fn references(&self) -> Vec<&str> {
        self.attributes.values().flat_map(Value::references).collect()
    }
}

/// Associates a namespace with an engine provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    /// Namespace served (`cloud`, `container`, ...)
    pub namespace: String,

    /// Engine-local provider name (`linode`, `docker`)
    pub provider: String,

    /// Registry source (`linode/linode`)
    pub source: String,

    /// Version constraint
    #[serde(default)]
    pub version: Option<String>,

    /// Literal provider settings (no references)
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,

    /// Environment variable holding the credential
    #[serde(default)]
    pub token_env: Option<String>,

    /// Provider setting the credential is written to; without it the engine
    /// picks the token up from its environment
    #[serde(default)]
    pub token_field: Option<String>,

    /// Engine type overrides keyed by resource type name
    #[serde(default)]
    pub types: BTreeMap<String, String>,
}

impl ProviderBinding {
    /// Engine type for a kind under this binding
    pub fn engine_type<'k>(&'k self, kind: &'k ResourceKind) -> &'k str {
        self.types
            .get(kind.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_engine_type())
    }
}
