// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reference graph over a descriptor set
//!
//! Nodes are declaration addresses, edges run from a declaration to each
//! declaration it references. The graph must be acyclic.

use std::collections::{BTreeMap, BTreeSet};

use super::model::ReferenceTarget;
use super::DescriptorSet;
use crate::error::{OutpostError, Result};

/// Dependency edges keyed by address
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    /// address -> addresses it references
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl ReferenceGraph {
    /// Build the graph, checking addresses and reference targets
    pub fn build(set: &DescriptorSet) -> Result<Self> {
        let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for declaration in &set.declarations {
            let address = declaration.address();
            if !is_declaration_name(&declaration.name) {
                return Err(OutpostError::InvalidName {
                    kind: declaration.kind.to_string(),
                    name: declaration.name.clone(),
                });
            }
            if dependencies.insert(address.clone(), BTreeSet::new()).is_some() {
                return Err(OutpostError::DuplicateDeclaration { address });
            }
        }

        for declaration in &set.declarations {
            let address = declaration.address();
            let mut targets = BTreeSet::new();

            for reference in declaration.references() {
                let target: ReferenceTarget =
                    reference
                        .parse()
                        .map_err(|_| OutpostError::MalformedReference {
                            address: address.clone(),
                            reference: reference.to_string(),
                        })?;

                let target_address = target.address();
                if !dependencies.contains_key(&target_address) {
                    return Err(OutpostError::DanglingReference {
                        address,
                        target: target_address,
                    });
                }
                targets.insert(target_address);
            }

            dependencies.insert(address, targets);
        }

        Ok(Self { dependencies })
    }

    /// Dependency-respecting order, ties broken by address
    ///
    /// Declaration order in the input has no influence on the result.
    pub fn application_order(&self) -> Result<Vec<String>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(address, deps)| (address.as_str(), deps.len()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (address, deps) in &self.dependencies {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(address.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(address, _)| *address)
            .collect();

        let mut order = Vec::with_capacity(self.dependencies.len());

        while let Some(address) = ready.pop_first() {
            remaining.remove(address);
            order.push(address.to_string());

            for dependent in dependents.get(address).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if !remaining.is_empty() {
            return Err(OutpostError::ReferenceCycle {
                members: remaining.keys().map(|a| a.to_string()).collect(),
            });
        }

        Ok(order)
    }
}

/// `[A-Za-z_][A-Za-z0-9_-]*`; a dot would split the name inside references
fn is_declaration_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
