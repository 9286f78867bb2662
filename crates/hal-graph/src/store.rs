//! Configuration store: the ports, configs, routes and patches of one module.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::model::{AudioPatch, AudioPort, AudioPortConfig, AudioProfile, AudioRoute};
use crate::profile::{negotiate, resolve_default};
use crate::{PatchId, PortId};

/// Complete routing state of a hardware module.
///
/// Ports and port configs share one id space so that a config id can never be
/// mistaken for a port id in the patch index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub ports: Vec<AudioPort>,
    #[serde(default)]
    pub port_configs: Vec<AudioPortConfig>,
    /// Configs created at startup or connect time, restored by a reset.
    #[serde(default)]
    pub initial_configs: Vec<AudioPortConfig>,
    /// Template port id to the profiles reported when a device is connected in
    /// simulation mode.
    #[serde(default)]
    pub connected_profiles: BTreeMap<PortId, Vec<AudioProfile>>,
    #[serde(default)]
    pub routes: Vec<AudioRoute>,
    #[serde(default)]
    pub patches: Vec<AudioPatch>,
    #[serde(default = "first_id")]
    pub next_port_id: PortId,
    #[serde(default = "first_id")]
    pub next_patch_id: PatchId,
}

fn first_id() -> i32 {
    1
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            port_configs: Vec::new(),
            initial_configs: Vec::new(),
            connected_profiles: BTreeMap::new(),
            routes: Vec::new(),
            patches: Vec::new(),
            next_port_id: first_id(),
            next_patch_id: first_id(),
        }
    }
}

/// Outcome of a port config request: the suggestion is returned even when rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct PortConfigOutcome {
    pub suggested: AudioPortConfig,
    pub applied: bool,
}

impl Configuration {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data).map_err(std::io::Error::from)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn allocate_port_id(&mut self) -> PortId {
        let id = self.next_port_id;
        self.next_port_id += 1;
        id
    }

    pub fn allocate_patch_id(&mut self) -> PatchId {
        let id = self.next_patch_id;
        self.next_patch_id += 1;
        id
    }

    pub fn port(&self, id: PortId) -> Result<&AudioPort> {
        self.ports
            .iter()
            .find(|port| port.id == id)
            .ok_or(GraphError::UnknownPort(id))
    }

    pub fn port_mut(&mut self, id: PortId) -> Result<&mut AudioPort> {
        self.ports
            .iter_mut()
            .find(|port| port.id == id)
            .ok_or(GraphError::UnknownPort(id))
    }

    pub fn port_config(&self, id: PortId) -> Result<&AudioPortConfig> {
        self.port_configs
            .iter()
            .find(|config| config.id == id)
            .ok_or(GraphError::UnknownPortConfig(id))
    }

    pub fn initial_config(&self, id: PortId) -> Option<&AudioPortConfig> {
        self.initial_configs.iter().find(|config| config.id == id)
    }

    pub fn patch(&self, id: PatchId) -> Result<&AudioPatch> {
        self.patches
            .iter()
            .find(|patch| patch.id == id)
            .ok_or(GraphError::UnknownPatch(id))
    }

    pub fn patch_position(&self, id: PatchId) -> Option<usize> {
        self.patches.iter().position(|patch| patch.id == id)
    }

    /// Resolves every id or reports the first one that is missing.
    pub fn select_port_configs(&self, ids: &[PortId]) -> Result<Vec<AudioPortConfig>> {
        ids.iter()
            .map(|&id| self.port_config(id).cloned())
            .collect()
    }

    /// Routes that have `port_id` either as sink or among their sources.
    pub fn routes_for_port(&self, port_id: PortId) -> Vec<AudioRoute> {
        self.routes
            .iter()
            .filter(|route| route.involves(port_id))
            .cloned()
            .collect()
    }

    /// Ports at the other end of every route that involves `port_id`.
    pub fn routable_port_ids(&self, port_id: PortId) -> Vec<PortId> {
        let mut ids = Vec::new();
        for route in &self.routes {
            if route.sink_port_id == port_id {
                ids.extend(route.source_port_ids.iter().copied());
            } else if route.source_port_ids.contains(&port_id) {
                ids.push(route.sink_port_id);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Validates `requested` against its port and installs it when acceptable.
    ///
    /// A new config needs every field to be specified and valid; an existing
    /// config is updated whenever the supplied fields are valid.
    pub fn set_port_config(&mut self, requested: &AudioPortConfig) -> Result<PortConfigOutcome> {
        let existing = if requested.id != 0 {
            Some(self.port_config(requested.id)?.clone())
        } else {
            None
        };
        let port_id = existing
            .as_ref()
            .map_or(requested.port_id, |config| config.port_id);
        if port_id == 0 {
            return Err(GraphError::InvalidRequest(
                "port config does not specify a port id".into(),
            ));
        }
        let port = self.port(port_id)?;
        let base = match existing.clone() {
            Some(config) => config,
            None => resolve_default(port)?,
        };
        let negotiation = negotiate(port, base, requested)?;

        let applied = match &existing {
            None if negotiation.is_valid && negotiation.is_fully_specified => {
                let mut created = negotiation.suggested.clone();
                created.id = self.allocate_port_id();
                self.port_configs.push(created.clone());
                tracing::debug!(id = created.id, port_id, "created new port config");
                return Ok(PortConfigOutcome {
                    suggested: created,
                    applied: true,
                });
            }
            Some(config) if negotiation.is_valid => {
                if let Some(slot) = self.port_configs.iter_mut().find(|c| c.id == config.id) {
                    *slot = negotiation.suggested.clone();
                }
                tracing::debug!(id = config.id, port_id, "updated port config");
                true
            }
            _ => {
                tracing::debug!(
                    existing = existing.is_some(),
                    valid = negotiation.is_valid,
                    fully_specified = negotiation.is_fully_specified,
                    "port config not applied"
                );
                false
            }
        };
        Ok(PortConfigOutcome {
            suggested: negotiation.suggested,
            applied,
        })
    }

    /// Restores an initial config or erases a client-created one.
    ///
    /// Callers check that no stream or patch uses the config first.
    pub fn reset_port_config(&mut self, id: PortId) -> Result<()> {
        let position = self
            .port_configs
            .iter()
            .position(|config| config.id == id)
            .ok_or(GraphError::UnknownPortConfig(id))?;
        match self.initial_config(id).cloned() {
            None => {
                self.port_configs.remove(position);
                tracing::debug!(id, "erased port config");
            }
            Some(initial) if self.port_configs[position] != initial => {
                self.port_configs[position] = initial;
                tracing::debug!(id, "reset port config");
            }
            Some(_) => {}
        }
        Ok(())
    }
}
