// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Node flavors
//!
//! A flavor names a host type. Flavors may replace older flavors, and a flavor satisfies
//! every flavor it transitively replaces. Retired flavors only satisfy themselves and must
//! have a replacement.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlavorType {
    #[default]
    Undefined,
    BareMetal,
    VirtualMachine,
    DockerContainer,
}

/// One flavor as configured; replacements are given by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlavorConfig {
    pub name: String,
    pub cost: u32,
    pub stock: bool,
    pub environment: FlavorType,
    pub min_cpu_cores: f64,
    pub min_main_memory_available_gb: f64,
    pub min_disk_available_gb: f64,
    pub fast_disk: bool,
    pub bandwidth: f64,
    pub description: String,
    pub retired: bool,
    pub replaces: Vec<String>,
}

impl Default for FlavorConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            cost: 0,
            stock: true,
            environment: FlavorType::Undefined,
            min_cpu_cores: 0.0,
            min_main_memory_available_gb: 0.0,
            min_disk_available_gb: 0.0,
            fast_disk: true,
            bandwidth: 0.0,
            description: String::new(),
            retired: false,
            replaces: Vec::new(),
        }
    }
}

impl FlavorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlavorsConfig {
    pub flavor: Vec<FlavorConfig>,
}

impl FlavorsConfig {
    pub fn from_json(json: &str) -> ProvisionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A host flavor. Identity is the name.
#[derive(Debug, Clone, Serialize)]
pub struct Flavor {
    name: String,
    cost: u32,
    stock: bool,
    flavor_type: FlavorType,
    min_cpu_cores: f64,
    min_main_memory_available_gb: f64,
    min_disk_available_gb: f64,
    fast_disk: bool,
    bandwidth: f64,
    description: String,
    retired: bool,
    replaces: Vec<String>,
}

impl Flavor {
    fn from_config(config: &FlavorConfig) -> Self {
        Self {
            name: config.name.clone(),
            cost: config.cost,
            stock: config.stock,
            flavor_type: config.environment,
            min_cpu_cores: config.min_cpu_cores,
            min_main_memory_available_gb: config.min_main_memory_available_gb,
            min_disk_available_gb: config.min_disk_available_gb,
            fast_disk: config.fast_disk,
            bandwidth: config.bandwidth,
            description: config.description.clone(),
            retired: config.retired,
            replaces: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn is_stock(&self) -> bool {
        self.stock
    }

    pub fn flavor_type(&self) -> FlavorType {
        self.flavor_type
    }

    pub fn is_docker(&self) -> bool {
        self.flavor_type == FlavorType::DockerContainer
    }

    pub fn min_cpu_cores(&self) -> f64 {
        self.min_cpu_cores
    }

    pub fn min_main_memory_available_gb(&self) -> f64 {
        self.min_main_memory_available_gb
    }

    pub fn min_disk_available_gb(&self) -> f64 {
        self.min_disk_available_gb
    }

    pub fn has_fast_disk(&self) -> bool {
        self.fast_disk
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Names of the flavors this one directly replaces
    pub fn replaces(&self) -> &[String] {
        &self.replaces
    }

    /// A flavor replacing exactly one other flavor is an alias of it
    pub fn is_canonical(&self) -> bool {
        self.replaces.len() != 1
    }

    /// At least as much CPU, disk and memory, and a fast disk if `other` has one
    pub fn is_larger_than(&self, other: &Flavor) -> bool {
        (self.min_cpu_cores >= other.min_cpu_cores
            && self.min_disk_available_gb >= other.min_disk_available_gb
            && self.min_main_memory_available_gb >= other.min_main_memory_available_gb)
            && (self.fast_disk || !other.fast_disk)
    }
}

impl PartialEq for Flavor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Flavor {}

/// The flavor catalog
#[derive(Debug, Clone, Default)]
pub struct NodeFlavors {
    flavors: BTreeMap<String, Flavor>,
}

impl NodeFlavors {
    /// Builds the catalog, resolving replacements and checking that retired flavors are replaced
    pub fn from_config(config: &FlavorsConfig) -> ProvisionResult<Self> {
        let mut flavors: BTreeMap<String, Flavor> = config
            .flavor
            .iter()
            .map(|flavor| (flavor.name.clone(), Flavor::from_config(flavor)))
            .collect();

        for flavor_config in &config.flavor {
            for target in &flavor_config.replaces {
                if !flavors.contains_key(target) {
                    return Err(ProvisionError::UnknownReplacement {
                        flavor: flavor_config.name.clone(),
                        target: target.clone(),
                    });
                }
            }
            if let Some(flavor) = flavors.get_mut(&flavor_config.name) {
                flavor.replaces.extend(flavor_config.replaces.iter().cloned());
            }
        }

        let catalog = Self { flavors };
        for flavor in catalog.flavors.values().filter(|flavor| flavor.retired) {
            if !catalog.has_replacement(flavor) {
                return Err(ProvisionError::RetiredWithoutReplacement(flavor.name.clone()));
            }
        }
        log::debug!("Loaded {} flavors", catalog.flavors.len());
        Ok(catalog)
    }

    fn has_replacement(&self, flavor: &Flavor) -> bool {
        self.flavors
            .values()
            .filter(|candidate| *candidate != flavor)
            .any(|candidate| self.satisfies(candidate, flavor))
    }

    pub fn flavors(&self) -> impl Iterator<Item = &Flavor> {
        self.flavors.values()
    }

    pub fn len(&self) -> usize {
        self.flavors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flavors.is_empty()
    }

    pub fn get_flavor(&self, name: &str) -> Option<&Flavor> {
        self.flavors.get(name)
    }

    pub fn get_flavor_or_err(&self, name: &str) -> ProvisionResult<&Flavor> {
        self.get_flavor(name)
            .ok_or_else(|| ProvisionError::UnknownFlavor {
                name: name.to_string(),
                known: self.canonical_names(),
            })
    }

    /// Distinct canonical names, sorted
    pub fn canonical_names(&self) -> Vec<String> {
        self.flavors
            .values()
            .map(|flavor| self.canonical_name(flavor).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Follows single-replacement aliases down to a canonical flavor
    pub fn canonical_name<'a>(&'a self, flavor: &'a Flavor) -> &'a str {
        let mut current = flavor;
        let mut seen = HashSet::new();
        while !current.is_canonical() && seen.insert(current.name.as_str()) {
            match self.flavors.get(&current.replaces[0]) {
                Some(next) => current = next,
                None => break,
            }
        }
        &current.name
    }

    /// Whether a node of `flavor` can stand in for one of `wanted`
    pub fn satisfies(&self, flavor: &Flavor, wanted: &Flavor) -> bool {
        let mut seen = HashSet::new();
        self.satisfies_inner(flavor, wanted, &mut seen)
    }

    fn satisfies_inner<'a>(
        &'a self,
        flavor: &'a Flavor,
        wanted: &Flavor,
        seen: &mut HashSet<&'a str>,
    ) -> bool {
        if flavor == wanted {
            return true;
        }
        if flavor.retired || !seen.insert(flavor.name.as_str()) {
            return false;
        }
        flavor
            .replaces
            .iter()
            .filter_map(|name| self.flavors.get(name))
            .any(|replaced| self.satisfies_inner(replaced, wanted, seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavor(name: &str, replaces: &[&str], retired: bool) -> FlavorConfig {
        FlavorConfig {
            retired,
            replaces: replaces.iter().map(|s| s.to_string()).collect(),
            ..FlavorConfig::new(name)
        }
    }

    fn catalog() -> NodeFlavors {
        NodeFlavors::from_config(&FlavorsConfig {
            flavor: vec![
                flavor("old", &[], true),
                flavor("mid", &["old"], false),
                flavor("new", &["mid"], false),
                flavor("alias", &["new"], false),
                flavor("big", &["mid", "new"], false),
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_satisfies_is_transitive() {
        let flavors = catalog();
        let get = |name| flavors.get_flavor(name).unwrap();
        assert!(flavors.satisfies(get("new"), get("old")));
        assert!(flavors.satisfies(get("alias"), get("old")));
        assert!(flavors.satisfies(get("old"), get("old")));
        assert!(!flavors.satisfies(get("old"), get("mid")));
        assert!(!flavors.satisfies(get("mid"), get("new")));
    }

    #[test]
    fn test_retired_flavor_does_not_satisfy_its_replacements() {
        let flavors = NodeFlavors::from_config(&FlavorsConfig {
            flavor: vec![
                flavor("a", &[], false),
                flavor("b", &["a"], true),
                flavor("c", &["b"], false),
            ],
        })
        .unwrap();
        let get = |name| flavors.get_flavor(name).unwrap();
        assert!(!flavors.satisfies(get("b"), get("a")));
        assert!(!flavors.satisfies(get("c"), get("a")));
        assert!(flavors.satisfies(get("c"), get("b")));
    }

    #[test]
    fn test_canonical_names() {
        let flavors = catalog();
        let get = |name| flavors.get_flavor(name).unwrap();
        assert_eq!(flavors.canonical_name(get("alias")), "old");
        assert_eq!(flavors.canonical_name(get("big")), "big");
        assert_eq!(flavors.canonical_names(), vec!["big", "old"]);
    }

    #[test]
    fn test_unknown_flavor_lists_canonical_names() {
        let err = catalog().get_flavor_or_err("huge").unwrap_err();
        assert_eq!(
            err,
            ProvisionError::UnknownFlavor {
                name: "huge".into(),
                known: vec!["big".into(), "old".into()],
            }
        );
    }

    #[test]
    fn test_invalid_catalogs() {
        let dangling = FlavorsConfig {
            flavor: vec![flavor("a", &["missing"], false)],
        };
        assert!(matches!(
            NodeFlavors::from_config(&dangling),
            Err(ProvisionError::UnknownReplacement { .. })
        ));

        let orphan = FlavorsConfig {
            flavor: vec![flavor("a", &[], true)],
        };
        assert_eq!(
            NodeFlavors::from_config(&orphan).unwrap_err(),
            ProvisionError::RetiredWithoutReplacement("a".into())
        );
    }

    #[test]
    fn test_is_larger_than() {
        let small = FlavorConfig {
            min_cpu_cores: 2.0,
            min_main_memory_available_gb: 8.0,
            min_disk_available_gb: 100.0,
            fast_disk: false,
            ..FlavorConfig::new("small")
        };
        let large = FlavorConfig {
            min_cpu_cores: 1.0,
            fast_disk: true,
            ..FlavorConfig::new("large")
        };
        let flavors = NodeFlavors::from_config(&FlavorsConfig {
            flavor: vec![small, large],
        })
        .unwrap();
        let small = flavors.get_flavor("small").unwrap();
        let large = flavors.get_flavor("large").unwrap();
        // fewer resources, even with a fast disk, is not larger
        assert!(!large.is_larger_than(small));
        assert!(small.is_larger_than(small));
        assert!(!small.is_larger_than(large));
    }

    #[test]
    fn test_from_json() {
        let config = FlavorsConfig::from_json(
            r#"{"flavor":[{"name":"d-2-8-50","environment":"DOCKER_CONTAINER","min_cpu_cores":2.0}]}"#,
        )
        .unwrap();
        let flavors = NodeFlavors::from_config(&config).unwrap();
        let flavor = flavors.get_flavor("d-2-8-50").unwrap();
        assert!(flavor.is_docker());
        assert!(flavor.is_stock());
        assert_eq!(flavor.min_cpu_cores(), 2.0);
    }
}
