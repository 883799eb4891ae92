//! # Site Configuration
//!
//! Per-site configuration dictionaries. Each site (keyed by domain) carries a
//! free-form JSON object; services read named sub-dictionaries from it, the
//! way the entitlement endpoint reads `ENTITLEMENT_POLICY`.
//!
//! Unknown sites fall back to the registry's default site, so a request whose
//! `Host` does not match any configured domain still sees a configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PolicyError;

/// A site served by the deployment, identified by its domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    pub domain: String,
}

impl Site {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.domain)
    }
}

/// Configuration values for one site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteConfiguration {
    values: Map<String, Value>,
}

impl SiteConfiguration {
    /// Wrap an existing JSON object.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Look up a raw value.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Return the named sub-dictionary.
    ///
    /// An absent entry yields an empty dictionary, so callers detect missing
    /// configuration on the first key they read. An entry that is present
    /// but not an object is an error.
    pub fn get_dict(&self, name: &str) -> Result<Map<String, Value>, PolicyError> {
        match self.values.get(name) {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(PolicyError::NotAnObject(name.to_string())),
        }
    }

    /// Set a value, replacing any previous one.
    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

/// All configured sites plus the domain used when a request names none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRegistry {
    pub default_domain: String,
    #[serde(default)]
    pub configurations: BTreeMap<String, SiteConfiguration>,
}

impl SiteRegistry {
    /// Create a registry with only the default site, unconfigured.
    pub fn new(default_domain: impl Into<String>) -> Self {
        Self {
            default_domain: default_domain.into(),
            configurations: BTreeMap::new(),
        }
    }

    /// Resolve a site by domain, falling back to the default site.
    ///
    /// A port suffix on the domain (`example.com:8000`) is ignored.
    pub fn resolve(&self, domain: Option<&str>) -> (Site, SiteConfiguration) {
        let requested = domain.map(|d| d.split(':').next().unwrap_or(d));
        let domain = match requested {
            Some(d) if self.configurations.contains_key(d) => d,
            _ => self.default_domain.as_str(),
        };
        let configuration = self
            .configurations
            .get(domain)
            .cloned()
            .unwrap_or_default();
        (Site::new(domain), configuration)
    }

    /// Insert or replace a site's configuration.
    pub fn configure(&mut self, domain: impl Into<String>, configuration: SiteConfiguration) {
        self.configurations.insert(domain.into(), configuration);
    }
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new("example.com")
    }
}
