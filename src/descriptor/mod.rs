// SPDX-License-Identifier: AGPL-3.0-or-later
//! Desired-state descriptor sets
//!
//! A descriptor set is the static list of resource declarations and provider
//! bindings an operator hands to the external reconciliation engine. This
//! module loads and validates sets, orders them by their reference edges and
//! renders them in the engine's JSON input format.

mod engine;
mod graph;
mod loader;
mod model;
mod render;

pub use engine::{Credentials, Engine, EngineAction};
pub use graph::ReferenceGraph;
pub use loader::list_descriptor_files;
pub use model::{
    Declaration, ProviderBinding, Reference, ReferenceTarget, ResourceKind, Value,
    CLOUD_NAMESPACE, CONTAINER_NAMESPACE,
};
pub use render::render;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OutpostError, Result};

/// Provider bindings plus resource declarations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSet {
    /// Engine providers by namespace
    #[serde(default, rename = "provider")]
    pub providers: Vec<ProviderBinding>,

    /// Declared resources
    #[serde(default, rename = "resource")]
    pub declarations: Vec<Declaration>,
}

impl DescriptorSet {
    /// Append another set's bindings and declarations
    pub fn merge(&mut self, other: DescriptorSet) {
        self.providers.extend(other.providers);
        self.declarations.extend(other.declarations);
    }

    /// Binding serving `namespace`
    pub fn binding_for(&self, namespace: &str) -> Option<&ProviderBinding> {
        self.providers.iter().find(|p| p.namespace == namespace)
    }

    /// Declaration at `address`
    pub fn declaration(&self, address: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.address() == address)
    }

    /// Check the whole set and return its reference graph
    pub fn validate(&self) -> Result<ReferenceGraph> {
        let mut namespaces = BTreeSet::new();
        for binding in &self.providers {
            if !namespaces.insert(binding.namespace.as_str()) {
                return Err(OutpostError::InvalidConfig {
                    message: format!("Namespace '{}' is bound twice", binding.namespace),
                });
            }
            if binding.settings.values().any(|v| !v.references().is_empty()) {
                return Err(OutpostError::InvalidConfig {
                    message: format!(
                        "Provider '{}' settings cannot contain references",
                        binding.provider
                    ),
                });
            }
        }

        // engine address -> outpost address
        let mut rendered: BTreeMap<String, String> = BTreeMap::new();
        for declaration in &self.declarations {
            let namespace = declaration.kind.namespace();
            let Some(binding) = self.binding_for(namespace) else {
                return Err(OutpostError::UnboundNamespace {
                    namespace: namespace.to_string(),
                    address: declaration.address(),
                });
            };

            let engine_address = format!(
                "{}{}.{}",
                if declaration.data { "data." } else { "" },
                binding.engine_type(&declaration.kind),
                declaration.name
            );
            let address = declaration.address();
            match rendered.entry(engine_address) {
                Entry::Vacant(slot) => {
                    slot.insert(address);
                }
                Entry::Occupied(slot) if *slot.get() != address => {
                    let mut pair = [slot.get().clone(), address];
                    pair.sort();
                    let [first, second] = pair;
                    return Err(OutpostError::EngineAddressClash {
                        engine_address: slot.key().clone(),
                        first,
                        second,
                    });
                }
                // Same address twice is reported by the graph
                Entry::Occupied(_) => {}
            }
        }

        let graph = ReferenceGraph::build(self)?;
        graph.application_order()?;

        debug!(
            providers = self.providers.len(),
            declarations = self.declarations.len(),
            "Descriptor set is valid"
        );
        Ok(graph)
    }

    /// Addresses in the order the engine has to apply them
    pub fn application_order(&self) -> Result<Vec<String>> {
        self.validate()?.application_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SET: &str = r#"
        [[provider]]
        namespace = "container"
        provider = "docker"
        source = "kreuzwerker/docker"

        [provider.settings]
        host = "unix:///var/run/docker.sock"

        [[resource]]
        type = "container"
        name = "openvpn"

        [resource.attributes]
        image = { ref = "container_image.openvpn.image_id" }

        [[resource]]
        type = "container_image"
        name = "openvpn"
    "#;

    #[test]
    fn test_validate_ok() {
        let set: DescriptorSet = toml::from_str(SET).unwrap();
        let order = set.application_order().unwrap();
        assert_eq!(order, vec!["container_image.openvpn", "container.openvpn"]);
    }

    #[test]
    fn test_unbound_namespace() {
        let mut set: DescriptorSet = toml::from_str(SET).unwrap();
        set.providers.clear();
        assert!(matches!(
            set.validate(),
            Err(OutpostError::UnboundNamespace { .. })
        ));
    }

    #[test]
    fn test_namespace_bound_twice() {
        let mut set: DescriptorSet = toml::from_str(SET).unwrap();
        let duplicate = set.providers[0].clone();
        set.providers.push(duplicate);
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_reference_in_provider_settings() {
        let mut set: DescriptorSet = toml::from_str(SET).unwrap();
        set.providers[0].settings.insert(
            "host".to_string(),
            Value::Reference(Reference {
                target: "container_image.openvpn.id".to_string(),
            }),
        );
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_lookup_helpers() {
        let set: DescriptorSet = toml::from_str(SET).unwrap();
        assert!(set.binding_for("container").is_some());
        assert!(set.binding_for("cloud").is_none());
        assert!(set.declaration("container.openvpn").is_some());
    }

    const CLASHING: &str = r#"
        [[provider]]
        namespace = "cloud"
        provider = "linode"
        source = "linode/linode"

        [[resource]]
        type = "compute_instance"
        name = "vpn"

        [resource.attributes]
        label = "first"

        [[resource]]
        type = "cloud:linode_instance"
        name = "vpn"

        [resource.attributes]
        label = "second"
    "#;

    #[test]
    fn test_engine_address_clash_rejected() {
        let set: DescriptorSet = toml::from_str(CLASHING).unwrap();
        let mut reversed = set.clone();
        reversed.declarations.reverse();

        for candidate in [set, reversed] {
            match candidate.validate() {
                Err(OutpostError::EngineAddressClash {
                    engine_address,
                    first,
                    second,
                }) => {
                    assert_eq!(engine_address, "linode_instance.vpn");
                    assert_eq!(first, "cloud:linode_instance.vpn");
                    assert_eq!(second, "compute_instance.vpn");
                }
                other => panic!("Expected clash, got {:?}", other),
            }
            assert!(render(&candidate, &Credentials::default()).is_err());
        }
    }

    #[test]
    fn test_type_override_clash_rejected() {
        let mut set: DescriptorSet = toml::from_str(SET).unwrap();
        set.providers[0]
            .types
            .insert("container".to_string(), "docker_image".to_string());
        assert!(matches!(
            set.validate(),
            Err(OutpostError::EngineAddressClash { .. })
        ));
    }

    #[test]
    fn test_resource_and_data_may_share_name() {
        let mut set: DescriptorSet = toml::from_str(SET).unwrap();
        set.providers[0]
            .types
            .insert("container".to_string(), "docker_image".to_string());
        set.declarations[1].data = true;
        assert!(set.validate().is_ok());
    }
}
