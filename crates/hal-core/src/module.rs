//! Routing coordinator: the public face of one audio hardware module.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use hal_graph::patch::{
    allowed_sink_ports, buffer_size_frames, check_sinks, connected_port_config_ids,
    latency_reference, validate_patch_request,
};
use hal_graph::{
    AudioDevice, AudioPatch, AudioPort, AudioPortConfig, AudioRoute, Configuration,
    ConnectedDevicePorts, Direction, GraphError, IoFlags, PatchId, PatchIndex, PortConfigOutcome,
    PortExt, PortId,
};
use parking_lot::Mutex;

use crate::config::{ModuleConfig, ModuleDebug, QueueConfig, VendorDebug};
use crate::error::{HalError, Result};
use crate::latency::{LatencyMetrics, MAX_STREAM_BUFFER_BYTES};
use crate::registry::StreamRegistry;
use crate::stream::{OpenStreamArgs, StreamContext, StreamSession};
use crate::variant::{ModuleKind, ModuleVariant};

/// Routing graph plus the bookkeeping derived from it.
struct Graph {
    config: Configuration,
    index: PatchIndex,
    connected: ConnectedDevicePorts,
}

impl Graph {
    fn new(config: Configuration) -> Self {
        let mut index = PatchIndex::new();
        for patch in &config.patches {
            index.register(patch, &config.port_configs);
        }
        Self {
            config,
            index,
            connected: ConnectedDevicePorts::new(),
        }
    }
}

struct Settings {
    debug: ModuleDebug,
    vendor_debug: VendorDebug,
    queues: QueueConfig,
    master_mute: bool,
    master_volume: f32,
    mic_mute: bool,
}

struct ModuleState {
    variant: Box<dyn ModuleVariant>,
    graph: Option<Graph>,
    streams: StreamRegistry,
    settings: Settings,
}

impl ModuleState {
    /// Splits the state into its parts, loading the configuration on first use.
    fn parts(&mut self) -> (&mut Graph, &dyn ModuleVariant, &mut StreamRegistry, &mut Settings) {
        let variant = &*self.variant;
        let graph = self.graph.get_or_insert_with(|| {
            tracing::debug!(kind = %variant.kind(), "loading module configuration");
            Graph::new(variant.configuration())
        });
        (graph, variant, &mut self.streams, &mut self.settings)
    }

    fn graph(&mut self) -> &mut Graph {
        self.parts().0
    }
}

/// One audio hardware module.
///
/// Every control-plane call takes the module lock for its whole duration, so
/// calls are applied one at a time. Stream workers never take this lock.
pub struct Module {
    state: Mutex<ModuleState>,
}

impl Module {
    pub fn new(kind: ModuleKind) -> Self {
        Self::from_config(ModuleConfig::default().with_kind(kind))
    }

    pub fn from_config(config: ModuleConfig) -> Self {
        let variant = config.kind.variant();
        Self::with_variant(variant, config)
    }

    /// Builds a module around a custom variant. `config.kind` is ignored.
    pub fn with_variant(variant: Box<dyn ModuleVariant>, config: ModuleConfig) -> Self {
        tracing::info!(kind = %variant.kind(), "creating module");
        Self {
            state: Mutex::new(ModuleState {
                variant,
                graph: None,
                streams: StreamRegistry::default(),
                settings: Settings {
                    debug: config.debug,
                    vendor_debug: config.vendor_debug,
                    queues: config.queues,
                    master_mute: false,
                    master_volume: 1.0,
                    mic_mute: false,
                },
            }),
        }
    }

    /// Replaces the variant's built-in table with `configuration`.
    pub fn with_configuration(self, configuration: Configuration) -> Self {
        self.state.lock().graph = Some(Graph::new(configuration));
        self
    }

    pub fn kind(&self) -> ModuleKind {
        self.state.lock().variant.kind()
    }

    pub fn audio_ports(&self) -> Vec<AudioPort> {
        self.state.lock().graph().config.ports.clone()
    }

    pub fn audio_port(&self, port_id: PortId) -> Result<AudioPort> {
        Ok(self.state.lock().graph().config.port(port_id)?.clone())
    }

    pub fn audio_port_configs(&self) -> Vec<AudioPortConfig> {
        self.state.lock().graph().config.port_configs.clone()
    }

    pub fn audio_routes(&self) -> Vec<AudioRoute> {
        self.state.lock().graph().config.routes.clone()
    }

    pub fn audio_routes_for_port(&self, port_id: PortId) -> Result<Vec<AudioRoute>> {
        let mut state = self.state.lock();
        let graph = state.graph();
        graph.config.port(port_id)?;
        Ok(graph.config.routes_for_port(port_id))
    }

    pub fn audio_patches(&self) -> Vec<AudioPatch> {
        self.state.lock().graph().config.patches.clone()
    }

    /// Snapshot of the reverse index from port and port config ids to patches.
    pub fn patch_index(&self) -> PatchIndex {
        self.state.lock().graph().index.clone()
    }

    /// Snapshot of the whole routing graph.
    pub fn configuration(&self) -> Configuration {
        self.state.lock().graph().config.clone()
    }

    /// Creates or updates a port config. A suggestion is returned even when the
    /// request is not applied.
    pub fn set_audio_port_config(&self, requested: &AudioPortConfig) -> Result<PortConfigOutcome> {
        Ok(self.state.lock().graph().config.set_port_config(requested)?)
    }

    pub fn reset_audio_port_config(&self, port_config_id: PortId) -> Result<()> {
        let mut state = self.state.lock();
        let (graph, _, streams, _) = state.parts();
        graph.config.port_config(port_config_id)?;
        if streams.has_open_stream(port_config_id) {
            return Err(HalError::state(format!(
                "port config {port_config_id} has an open stream"
            )));
        }
        if graph.index.contains(port_config_id) {
            return Err(HalError::state(format!(
                "port config {port_config_id} is used by a patch"
            )));
        }
        graph.config.reset_port_config(port_config_id)?;
        Ok(())
    }

    /// Installs a new patch (`id == 0`) or replaces an existing one.
    ///
    /// Nothing changes when an error is returned, except for streams that lost
    /// their previous connection.
    pub fn set_audio_patch(&self, requested: &AudioPatch) -> Result<AudioPatch> {
        let mut state = self.state.lock();
        let (graph, variant, streams, _) = state.parts();

        validate_patch_request(requested)?;
        let sources = graph.config.select_port_configs(&requested.source_port_config_ids)?;
        let sinks = graph.config.select_port_configs(&requested.sink_port_config_ids)?;
        let existing = match requested.id {
            0 => None,
            id => Some(graph.config.patch(id)?.clone()),
        };

        let allowed = allowed_sink_ports(&graph.config.routes, &sources);
        if let Some(sink) = sinks.iter().find(|sink| !allowed.contains_key(&sink.port_id)) {
            return Err(GraphError::NoRoute(sink.port_id).into());
        }
        variant.check_patch_endpoints_match(&sources, &sinks)?;

        let backup = graph.index.clone();
        if let Some(old) = &existing {
            graph.index.unregister(old.id);
        }
        if let Err(err) = check_sinks(&allowed, &sinks, &graph.index) {
            graph.index = backup;
            return Err(err.into());
        }

        let mut patch = requested.clone();
        patch.minimum_stream_buffer_size_frames = 0;
        patch.latencies_ms.clear();
        if let Some(reference) = latency_reference(&sources, &sinks) {
            let latency_ms = variant.nominal_latency_ms(reference);
            let rate = reference.sample_rate.unwrap_or(0);
            patch.minimum_stream_buffer_size_frames = buffer_size_frames(latency_ms, rate);
            patch.latencies_ms = vec![i32::try_from(latency_ms).unwrap_or(i32::MAX); sinks.len()];
        }

        let position = existing
            .as_ref()
            .and_then(|old| graph.config.patch_position(old.id));
        match position {
            Some(position) => graph.config.patches[position] = patch.clone(),
            None => {
                patch.id = graph.config.allocate_patch_id();
                graph.config.patches.push(patch.clone());
            }
        }
        graph.index.register(&patch, &graph.config.port_configs);

        let updated =
            update_streams_connected_state(graph, streams, existing.as_ref(), Some(&patch));
        if let Err(err) = updated {
            graph.index = backup;
            match (position, existing) {
                (Some(position), Some(old)) => graph.config.patches[position] = old,
                _ => {
                    graph.config.patches.pop();
                }
            }
            return Err(err);
        }
        tracing::info!(
            patch_id = patch.id,
            sources = ?patch.source_port_config_ids,
            sinks = ?patch.sink_port_config_ids,
            minimum_buffer_frames = patch.minimum_stream_buffer_size_frames,
            "installed patch"
        );
        Ok(patch)
    }

    pub fn reset_audio_patch(&self, patch_id: PatchId) -> Result<()> {
        let mut state = self.state.lock();
        let (graph, _, streams, _) = state.parts();
        let position = graph
            .config
            .patch_position(patch_id)
            .ok_or(GraphError::UnknownPatch(patch_id))?;
        let old = graph.config.patches[position].clone();
        let backup = graph.index.clone();
        graph.index.unregister(patch_id);
        if let Err(err) = update_streams_connected_state(graph, streams, Some(&old), None) {
            graph.index = backup;
            return Err(err);
        }
        graph.config.patches.remove(position);
        tracing::info!(patch_id, "removed patch");
        Ok(())
    }

    pub fn open_input_stream(&self, args: OpenStreamArgs) -> Result<Arc<StreamSession>> {
        self.open_stream(args, Direction::Input)
    }

    pub fn open_output_stream(&self, args: OpenStreamArgs) -> Result<Arc<StreamSession>> {
        self.open_stream(args, Direction::Output)
    }

    fn open_stream(
        &self,
        args: OpenStreamArgs,
        direction: Direction,
    ) -> Result<Arc<StreamSession>> {
        let mut state = self.state.lock();
        let (graph, variant, streams, settings) = state.parts();
        let port_config_id = args.port_config_id;

        let config = graph.config.port_config(port_config_id)?.clone();
        let port = graph.config.port(config.port_id)?;
        let Some(mix) = port.ext.mix() else {
            return Err(HalError::argument(format!(
                "port config {port_config_id} does not belong to a mix port"
            )));
        };
        if port.direction() != direction {
            return Err(HalError::argument(format!(
                "port config {port_config_id} has the wrong direction for a {direction:?} stream"
            )));
        }
        if direction == Direction::Input && args.callback.is_some() {
            return Err(HalError::argument("input streams do not accept a callback"));
        }
        if streams.has_open_stream(port_config_id) {
            return Err(HalError::state(format!(
                "port config {port_config_id} already has an open stream"
            )));
        }
        let max_open = usize::try_from(mix.max_open_stream_count).unwrap_or(usize::MAX);
        if max_open != 0 && streams.open_count_for_mix(port.id) >= max_open {
            return Err(HalError::state(format!(
                "mix port {} has reached its limit of {max_open} open streams",
                port.id
            )));
        }

        let frame_size = config.frame_size();
        if frame_size == 0 {
            return Err(HalError::argument(format!(
                "port config {port_config_id} has no frame size"
            )));
        }
        let buffer_size_frames = usize::try_from(args.buffer_size_frames)
            .ok()
            .filter(|&frames| frames > 0)
            .ok_or_else(|| {
                HalError::argument(format!(
                    "invalid buffer size {} frames",
                    args.buffer_size_frames
                ))
            })?;
        let sample_rate = config.sample_rate.unwrap_or(0);
        let latency = LatencyMetrics::new(
            sample_rate,
            variant.nominal_latency_ms(&config),
            buffer_size_frames,
        );
        if buffer_size_frames < latency.minimum_buffer_frames {
            return Err(HalError::argument(format!(
                "buffer of {buffer_size_frames} frames is below the minimum of {}",
                latency.minimum_buffer_frames
            )));
        }
        if frame_size
            .checked_mul(buffer_size_frames)
            .map_or(true, |bytes| bytes > MAX_STREAM_BUFFER_BYTES)
        {
            return Err(HalError::argument(format!(
                "buffer of {buffer_size_frames} frames of {frame_size} bytes is too large"
            )));
        }
        let flags = config.flags.unwrap_or(port.flags);
        if flags.is_output_with(IoFlags::OUTPUT_COMPRESS_OFFLOAD) && args.offload_info.is_none() {
            return Err(HalError::argument("offloaded output requires offload info"));
        }
        if flags.is_output_with(IoFlags::OUTPUT_NON_BLOCKING) && args.callback.is_none() {
            return Err(HalError::argument("non-blocking output requires a callback"));
        }

        let context = StreamContext {
            port_config_id,
            mix_port_id: port.id,
            direction,
            format: config.format.clone().unwrap_or_default(),
            channel_mask: config.channel_mask.unwrap_or_default(),
            sample_rate,
            flags,
            frame_size,
            buffer_size_frames,
            latency,
            transient_state_delay: Duration::from_millis(u64::from(
                settings.debug.stream_transient_state_delay_ms,
            )),
            vendor_debug: settings.vendor_debug,
            queues: settings.queues,
            callback: args.callback,
            offload_info: args.offload_info,
        };
        let driver = match direction {
            Direction::Input => variant.create_input_driver(&context)?,
            Direction::Output => variant.create_output_driver(&context)?,
        };
        let session = StreamSession::open(context, driver)?;

        let devices = find_connected_devices(graph, port_config_id)?;
        if !devices.is_empty() {
            if let Err(err) = session.set_connected_devices(&devices) {
                if let Err(close_err) = session.close() {
                    tracing::warn!(%close_err, "failed to close rejected stream");
                }
                return Err(err);
            }
        }
        streams.insert(&session);
        Ok(session)
    }

    /// Connects an external device using the device port at `requested.id` as
    /// the template. Returns the new port.
    pub fn connect_external_device(&self, requested: &AudioPort) -> Result<AudioPort> {
        let mut state = self.state.lock();
        let (graph, variant, _, settings) = state.parts();
        let template_id = requested.id;

        let mut port = graph.connected.prepare_connection(&graph.config, requested)?;
        if settings.debug.simulate_device_connections {
            if let Some(profiles) = graph.config.connected_profiles.get(&template_id) {
                port.profiles = profiles.clone();
            }
        } else {
            variant.populate_connected_device_port(&mut port)?;
        }
        graph.connected.check_profiles(&graph.config, template_id, &port)?;

        let port = graph
            .connected
            .commit_connection(&mut graph.config, template_id, port);
        variant.on_external_device_connection_changed(&port, true);
        tracing::info!(port_id = port.id, template_id, "connected external device");
        Ok(port)
    }

    pub fn disconnect_external_device(&self, port_id: PortId) -> Result<()> {
        let mut state = self.state.lock();
        let (graph, variant, _, _) = state.parts();
        graph.connected.check_disconnect(&graph.config, port_id)?;
        let port = graph.config.port(port_id)?.clone();
        variant.on_external_device_connection_changed(&port, false);
        graph.connected.commit_disconnect(&mut graph.config, port_id)?;
        tracing::info!(port_id, "disconnected external device");
        Ok(())
    }

    pub fn prepare_to_disconnect_external_device(&self, port_id: PortId) -> Result<()> {
        let mut state = self.state.lock();
        let (graph, variant, _, _) = state.parts();
        let port = graph.config.port(port_id)?;
        if !port.is_device() {
            return Err(HalError::argument(format!("port id {port_id} is not a device port")));
        }
        if !graph.connected.contains(port_id) {
            return Err(GraphError::NotConnected(port_id).into());
        }
        variant.on_prepare_to_disconnect_external_device(port);
        Ok(())
    }

    pub fn module_debug(&self) -> ModuleDebug {
        self.state.lock().settings.debug
    }

    pub fn set_module_debug(&self, debug: ModuleDebug) -> Result<()> {
        let mut state = self.state.lock();
        let (graph, _, _, settings) = state.parts();
        if settings.debug.simulate_device_connections != debug.simulate_device_connections
            && !graph.connected.is_empty()
        {
            return Err(HalError::state(
                "connection simulation cannot change while external devices are connected",
            ));
        }
        settings.debug = debug;
        Ok(())
    }

    pub fn vendor_debug(&self) -> VendorDebug {
        self.state.lock().settings.vendor_debug
    }

    /// Applies to streams opened afterwards.
    pub fn set_vendor_debug(&self, vendor_debug: VendorDebug) {
        self.state.lock().settings.vendor_debug = vendor_debug;
    }

    pub fn master_mute(&self) -> bool {
        self.state.lock().settings.master_mute
    }

    pub fn set_master_mute(&self, mute: bool) {
        self.state.lock().settings.master_mute = mute;
    }

    pub fn master_volume(&self) -> f32 {
        self.state.lock().settings.master_volume
    }

    pub fn set_master_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(HalError::argument(format!("master volume {volume} is out of range")));
        }
        self.state.lock().settings.master_volume = volume;
        Ok(())
    }

    pub fn mic_mute(&self) -> bool {
        self.state.lock().settings.mic_mute
    }

    pub fn set_mic_mute(&self, mute: bool) {
        self.state.lock().settings.mic_mute = mute;
    }
}

/// Mix port config with an open stream, mapped to the port configs on the
/// other side of the patch.
type Connections = BTreeMap<PortId, BTreeSet<PortId>>;

fn stream_connections(patch: Option<&AudioPatch>, streams: &StreamRegistry) -> Connections {
    let mut connections = Connections::new();
    let Some(patch) = patch else {
        return connections;
    };
    let sinks_have_streams = patch
        .sink_port_config_ids
        .iter()
        .any(|&id| streams.has_open_stream(id));
    let (mix_side, device_side) = if sinks_have_streams {
        (&patch.sink_port_config_ids, &patch.source_port_config_ids)
    } else {
        (&patch.source_port_config_ids, &patch.sink_port_config_ids)
    };
    for &mix_id in mix_side {
        if streams.has_open_stream(mix_id) {
            connections.insert(mix_id, device_side.iter().copied().collect());
        }
    }
    connections
}

/// Tells the streams touched by a patch change about their new device lists.
///
/// Lost connections are applied first and never undone. When establishing a
/// connection fails, the streams connected so far in this call are
/// disconnected again before the error is returned.
fn update_streams_connected_state(
    graph: &Graph,
    streams: &StreamRegistry,
    old: Option<&AudioPatch>,
    new: Option<&AudioPatch>,
) -> Result<()> {
    let old_connections = stream_connections(old, streams);
    let new_connections = stream_connections(new, streams);

    for (mix_id, devices) in &old_connections {
        if new_connections.get(mix_id) == Some(devices) {
            continue;
        }
        for stream in streams.streams_for_config(*mix_id) {
            match stream.set_connected_devices(&[]) {
                Ok(()) => tracing::debug!(port_config_id = mix_id, "stream disconnected"),
                Err(err) => {
                    tracing::warn!(%err, port_config_id = mix_id, "failed to disconnect stream")
                }
            }
        }
    }

    let mut connected_now: Vec<Arc<StreamSession>> = Vec::new();
    let result = new_connections
        .iter()
        .filter(|(mix_id, devices)| old_connections.get(*mix_id) != Some(*devices))
        .try_for_each(|(&mix_id, _)| {
            let devices = find_connected_devices(graph, mix_id)?;
            if devices.is_empty() {
                tracing::error!(port_config_id = mix_id, "patched stream has no connected devices");
                return Err(HalError::Internal(format!(
                    "no devices found for connected port config {mix_id}"
                )));
            }
            for stream in streams.streams_for_config(mix_id) {
                stream.set_connected_devices(&devices)?;
                tracing::debug!(
                    port_config_id = mix_id,
                    devices = devices.len(),
                    "stream connected"
                );
                connected_now.push(stream);
            }
            Ok(())
        });

    if let Err(err) = result {
        for stream in connected_now {
            if let Err(disconnect_err) = stream.set_connected_devices(&[]) {
                tracing::warn!(%disconnect_err, "failed to roll back stream connection");
            }
        }
        return Err(err);
    }
    Ok(())
}

/// Devices at the far end of every patch that uses `port_config_id`.
fn find_connected_devices(graph: &Graph, port_config_id: PortId) -> Result<Vec<AudioDevice>> {
    let mut devices = Vec::new();
    for id in connected_port_config_ids(&graph.config, &graph.index, port_config_id)? {
        if let PortExt::Device(ext) = &graph.config.port_config(id)?.ext {
            if !devices.contains(&ext.device) {
                devices.push(ext.device.clone());
            }
        }
    }
    Ok(devices)
}
