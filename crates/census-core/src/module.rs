// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Edge module records (supervisors, publishers, gateways, discoverers).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::identity::ContentEq;
use crate::types::{GenerationId, ModuleId, OperationContext};

/// Kind of edge module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Hosts twins and manages sessions.
    Supervisor,
    /// Publishes telemetry.
    Publisher,
    /// Fronts a site.
    Gateway,
    /// Sweeps networks for applications.
    Discoverer,
}

impl ModuleKind {
    /// All kinds.
    pub const ALL: [ModuleKind; 4] = [
        ModuleKind::Supervisor,
        ModuleKind::Publisher,
        ModuleKind::Gateway,
        ModuleKind::Discoverer,
    ];

    /// Returns the name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Publisher => "publisher",
            Self::Gateway => "gateway",
            Self::Discoverer => "discoverer",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted module record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module id.
    pub id: ModuleId,
    /// Kind.
    pub kind: ModuleKind,
    /// Site the module runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    /// Reported software version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether the module is currently connected.
    #[serde(default)]
    pub connected: bool,
    /// Free-form reported properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Concurrency token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<GenerationId>,
    /// Registration context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<OperationContext>,
    /// Last update context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<OperationContext>,
}

impl ModuleInfo {
    /// Creates a module record.
    pub fn new(id: impl Into<ModuleId>, kind: ModuleKind) -> Self {
        Self {
            id: id.into(),
            kind,
            site_id: None,
            version: None,
            connected: false,
            properties: BTreeMap::new(),
            generation_id: None,
            created: None,
            updated: None,
        }
    }

    /// Sets the site.
    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Marks the module connected.
    pub fn connected(mut self) -> Self {
        self.connected = true;
        self
    }

    /// Adds a reported property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Checks the record.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(RegistryError::invalid_argument("id", "cannot be empty"));
        }
        Ok(())
    }
}

impl ContentEq for ModuleInfo {
    fn content_eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.site_id == other.site_id
            && self.version == other.version
            && self.connected == other.connected
            && self.properties == other.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_eq_ignores_generation() {
        let a = ModuleInfo::new("sup-1", ModuleKind::Supervisor).with_version("1.0");
        let mut b = a.clone();
        b.generation_id = Some(GenerationId::next());
        assert!(a.content_eq(&b));
        b.connected = true;
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn test_validate() {
        assert!(ModuleInfo::new(" ", ModuleKind::Gateway).validate().is_err());
        assert!(ModuleInfo::new("gw", ModuleKind::Gateway).validate().is_ok());
    }
}
