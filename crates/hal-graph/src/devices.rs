//! Bookkeeping for hot-plugged device ports.
//!
//! Connecting is split in two phases so the caller can populate the profiles of
//! the prepared port (from a driver probe or a canned table) before anything in
//! the graph changes.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GraphError, Result};
use crate::model::{has_dynamic_profiles_only, AudioPort, AudioRoute, PortExt};
use crate::profile::resolve_default;
use crate::store::Configuration;
use crate::PortId;

/// Connected device port ids, each with the mix ports whose profiles it populated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedDevicePorts {
    ports: BTreeMap<PortId, BTreeSet<PortId>>,
}

impl ConnectedDevicePorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn contains(&self, port_id: PortId) -> bool {
        self.ports.contains_key(&port_id)
    }

    pub fn port_ids(&self) -> impl Iterator<Item = PortId> + '_ {
        self.ports.keys().copied()
    }

    /// Mix ports attributed to the connection at `port_id`.
    pub fn owned_mix_ports(&self, port_id: PortId) -> Option<&BTreeSet<PortId>> {
        self.ports.get(&port_id)
    }

    /// Validates a connection request and returns the concrete port to populate.
    ///
    /// The returned port is a copy of the template carrying the requested address;
    /// it has no id yet and the graph is untouched.
    pub fn prepare_connection(
        &self,
        config: &Configuration,
        requested: &AudioPort,
    ) -> Result<AudioPort> {
        let template_id = requested.id;
        let template = config.port(template_id)?;
        let Some(template_ext) = template.ext.device() else {
            return Err(GraphError::InvalidRequest(format!(
                "port id {template_id} is not a device port"
            )));
        };
        if template_ext.device.connection.is_empty() {
            return Err(GraphError::NotHotPluggable(template_id));
        }
        let Some(requested_ext) = requested.ext.device() else {
            return Err(GraphError::InvalidRequest(
                "connection request does not describe a device".into(),
            ));
        };
        if self.contains(template_id) {
            return Err(GraphError::AlreadyConnected(template_id));
        }

        let mut connected = template.clone();
        let mut device_ext = template_ext.clone();
        device_ext.device.address = requested_ext.device.address.clone();
        connected.ext = PortExt::Device(device_ext.clone());

        for &connected_id in self.ports.keys() {
            let existing = config.port(connected_id)?;
            if existing.ext.device().map(|ext| &ext.device) == Some(&device_ext.device) {
                tracing::error!(port_id = connected_id, "device is already connected");
                return Err(GraphError::DuplicateDevice(connected_id));
            }
        }
        Ok(connected)
    }

    /// A port left with dynamic profiles is only acceptable when every mix port it
    /// routes to can supply a static profile itself.
    pub fn check_profiles(
        &self,
        config: &Configuration,
        template_id: PortId,
        port: &AudioPort,
    ) -> Result<()> {
        if !has_dynamic_profiles_only(&port.profiles) {
            return Ok(());
        }
        let routable = config.routable_port_ids(template_id);
        let mut mix_ports = config
            .ports
            .iter()
            .filter(|candidate| candidate.is_mix() && routable.contains(&candidate.id))
            .peekable();
        if mix_ports.peek().is_none() {
            return Err(GraphError::NoStaticProfiles(template_id));
        }
        for mix in mix_ports {
            if has_dynamic_profiles_only(&mix.profiles) {
                tracing::error!(
                    template_id,
                    mix_port_id = mix.id,
                    "connected port and routable mix port both have dynamic profiles only"
                );
                return Err(GraphError::NoStaticProfiles(template_id));
            }
        }
        Ok(())
    }

    /// Assigns an id, appends the port, extends routes and shares static profiles
    /// with routable mix ports.
    pub fn commit_connection(
        &mut self,
        config: &mut Configuration,
        template_id: PortId,
        mut port: AudioPort,
    ) -> AudioPort {
        port.id = config.allocate_port_id();
        let mut owned = BTreeSet::new();

        let mut routable = BTreeSet::new();
        let mut cloned_routes = Vec::new();
        for route in config.routes.iter_mut() {
            if route.sink_port_id == template_id {
                cloned_routes.push(AudioRoute {
                    source_port_ids: route.source_port_ids.clone(),
                    sink_port_id: port.id,
                    is_exclusive: route.is_exclusive,
                });
                routable.extend(route.source_port_ids.iter().copied());
            } else if route.source_port_ids.contains(&template_id) {
                route.source_port_ids.push(port.id);
                routable.insert(route.sink_port_id);
            }
        }
        config.routes.extend(cloned_routes);

        if !has_dynamic_profiles_only(&port.profiles) {
            for mix in config
                .ports
                .iter_mut()
                .filter(|candidate| candidate.is_mix() && routable.contains(&candidate.id))
            {
                if has_dynamic_profiles_only(&mix.profiles) {
                    mix.profiles = port.profiles.clone();
                    owned.insert(mix.id);
                } else if self.ports.values().any(|mixes| mixes.contains(&mix.id)) {
                    // Populated by an earlier connection; cleared together with it.
                    owned.insert(mix.id);
                }
            }
        }

        config.ports.push(port.clone());
        if let Ok(mut initial) = resolve_default(&port) {
            initial.id = config.allocate_port_id();
            config.port_configs.push(initial.clone());
            config.initial_configs.push(initial);
        }
        tracing::debug!(
            port_id = port.id,
            template_id,
            owned = owned.len(),
            "connected external device"
        );
        self.ports.insert(port.id, owned);
        port
    }

    /// Checks that `port_id` is a connected device port with only initial configs,
    /// none of which is part of a patch.
    pub fn check_disconnect(&self, config: &Configuration, port_id: PortId) -> Result<()> {
        let port = config.port(port_id)?;
        if !port.is_device() {
            return Err(GraphError::InvalidRequest(format!(
                "port id {port_id} is not a device port"
            )));
        }
        if !self.contains(port_id) {
            return Err(GraphError::NotConnected(port_id));
        }
        let has_custom_config = config
            .port_configs
            .iter()
            .filter(|pc| pc.port_id == port_id)
            .any(|pc| config.initial_config(pc.id) != Some(pc));
        if has_custom_config {
            return Err(GraphError::PortHasConfigs(port_id));
        }
        let patched = config.patches.iter().any(|patch| {
            patch
                .source_port_config_ids
                .iter()
                .chain(&patch.sink_port_config_ids)
                .any(|&id| config.port_config(id).is_ok_and(|pc| pc.port_id == port_id))
        });
        if patched {
            return Err(GraphError::PortIsPatched(port_id));
        }
        Ok(())
    }

    /// Removes the port, its route participation and the profiles it lent to mix
    /// ports nobody else shares. Returns the removed port.
    pub fn commit_disconnect(
        &mut self,
        config: &mut Configuration,
        port_id: PortId,
    ) -> Result<AudioPort> {
        let position = config
            .ports
            .iter()
            .position(|port| port.id == port_id)
            .ok_or(GraphError::UnknownPort(port_id))?;
        let owned = self.ports.remove(&port_id).ok_or(GraphError::NotConnected(port_id))?;
        let removed = config.ports.remove(position);

        config.routes.retain(|route| route.sink_port_id != port_id);
        for route in config.routes.iter_mut() {
            route.source_port_ids.retain(|&id| id != port_id);
        }
        config.port_configs.retain(|pc| pc.port_id != port_id);
        config.initial_configs.retain(|pc| pc.port_id != port_id);

        for mix_id in owned {
            let shared = self.ports.values().any(|mixes| mixes.contains(&mix_id));
            if shared {
                continue;
            }
            if let Ok(mix) = config.port_mut(mix_id) {
                mix.profiles.clear();
            }
        }
        tracing::debug!(port_id, "disconnected external device");
        Ok(removed)
    }
}
