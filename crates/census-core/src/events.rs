// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry change events.
//!
//! Every persisted change produces one [`RegistryEvent`]. In-process listeners
//! receive the typed record; cross-process subscribers receive the event
//! serialized onto the registry events topic.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::ApplicationInfo;
use crate::endpoint::EndpointInfo;
use crate::module::{ModuleInfo, ModuleKind};
use crate::twin::TwinInfo;
use crate::types::OperationContext;

/// Kind of entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Application.
    Application,
    /// Endpoint.
    Endpoint,
    /// Twin.
    Twin,
    /// Supervisor module.
    Supervisor,
    /// Publisher module.
    Publisher,
    /// Gateway module.
    Gateway,
    /// Discoverer module.
    Discoverer,
}

impl EntityKind {
    /// Returns the name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Endpoint => "endpoint",
            Self::Twin => "twin",
            Self::Supervisor => "supervisor",
            Self::Publisher => "publisher",
            Self::Gateway => "gateway",
            Self::Discoverer => "discoverer",
        }
    }
}

impl From<ModuleKind> for EntityKind {
    fn from(kind: ModuleKind) -> Self {
        match kind {
            ModuleKind::Supervisor => Self::Supervisor,
            ModuleKind::Publisher => Self::Publisher,
            ModuleKind::Gateway => Self::Gateway,
            ModuleKind::Discoverer => Self::Discoverer,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entity created.
    New,
    /// Entity content changed.
    Updated,
    /// Entity explicitly removed.
    Deleted,
    /// Stale entity seen again.
    Found,
    /// Live entity no longer seen.
    Lost,
    /// Twin activated.
    Activated,
    /// Twin deactivated.
    Deactivated,
}

impl ChangeKind {
    /// Returns the name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Found => "found",
            Self::Lost => "lost",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Record carried by an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum EventPayload {
    /// Application record.
    Application(ApplicationInfo),
    /// Endpoint record.
    Endpoint(EndpointInfo),
    /// Twin record.
    Twin(TwinInfo),
    /// Module record.
    Module(ModuleInfo),
}

impl EventPayload {
    /// Entity kind of the record.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Application(_) => EntityKind::Application,
            Self::Endpoint(_) => EntityKind::Endpoint,
            Self::Twin(_) => EntityKind::Twin,
            Self::Module(m) => m.kind.into(),
        }
    }

    /// Id of the record.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Application(a) => a.application_id.as_str(),
            Self::Endpoint(e) => e.id.as_str(),
            Self::Twin(t) => t.id.as_str(),
            Self::Module(m) => m.id.as_str(),
        }
    }
}

/// Envelope published for every registry change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// Unique event id. Consumers deduplicate on it.
    pub event_id: String,
    /// Change classification.
    pub change: ChangeKind,
    /// Who made the change and when.
    pub context: OperationContext,
    /// Record after the change, or last known state for removals.
    pub payload: EventPayload,
}

impl RegistryEvent {
    /// Creates an event.
    pub fn new(change: ChangeKind, payload: EventPayload, context: &OperationContext) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            change,
            context: context.clone(),
            payload,
        }
    }

    /// Entity kind.
    pub fn entity_kind(&self) -> EntityKind {
        self.payload.entity_kind()
    }

    /// Entity id.
    pub fn entity_id(&self) -> &str {
        self.payload.entity_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApplicationType;

    #[test]
    fn test_envelope_shape() {
        let app = ApplicationInfo::new("urn:x", ApplicationType::Server);
        let event = RegistryEvent::new(
            ChangeKind::New,
            EventPayload::Application(app.clone()),
            &OperationContext::system(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["change"], "new");
        assert_eq!(json["payload"]["entity"], "application");
        assert_eq!(json["payload"]["record"]["application_uri"], "urn:x");
        assert_eq!(event.entity_id(), app.application_id.as_str());
    }

    #[test]
    fn test_module_entity_kind() {
        let payload = EventPayload::Module(ModuleInfo::new("gw-1", ModuleKind::Gateway));
        assert_eq!(payload.entity_kind(), EntityKind::Gateway);
    }
}
