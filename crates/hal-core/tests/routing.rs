use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hal_core::{
    tables, ErrorKind, Module, ModuleConfig, ModuleKind, ModuleVariant, OpenStreamArgs,
    StreamContext,
};
use hal_graph::{
    AudioDevice, AudioFormat, AudioPatch, AudioPort, AudioPortConfig, AudioProfile, AudioRoute,
    ChannelLayout, Configuration, DevicePortExt, DeviceType, IoFlags, MixPortExt, PatchId, PortExt,
    PortId,
};
use hal_io::{Driver, DriverError, StubDriver, Transfer};
use hal_rt::{DrainMode, Position};
use proptest::prelude::*;

const SPEAKER: PortId = 1;
const MIC: PortId = 2;
const PRIMARY_OUT: PortId = 6;

fn primary_output_config(module: &Module) -> AudioPortConfig {
    let outcome = module
        .set_audio_port_config(&AudioPortConfig {
            port_id: PRIMARY_OUT,
            format: Some(AudioFormat::PCM_16),
            channel_mask: Some(ChannelLayout::STEREO),
            sample_rate: Some(48_000),
            flags: Some(IoFlags::Output(IoFlags::OUTPUT_PRIMARY)),
            ..AudioPortConfig::default()
        })
        .unwrap();
    assert!(outcome.applied);
    outcome.suggested
}

#[test]
fn patch_reports_latency_and_minimum_buffer() {
    let module = Module::new(ModuleKind::Default);
    let config = primary_output_config(&module);
    let patch = module
        .set_audio_patch(&AudioPatch::new(&[config.id], &[SPEAKER]))
        .unwrap();
    assert_ne!(patch.id, 0);
    assert_eq!(patch.minimum_stream_buffer_size_frames, 480);
    assert_eq!(patch.latencies_ms, vec![10]);
    assert_eq!(module.audio_patches(), vec![patch.clone()]);

    let index = module.patch_index();
    for id in [config.id, PRIMARY_OUT, SPEAKER] {
        assert_eq!(index.first_patch_for(id), Some(patch.id));
    }

    let mut update = patch.clone();
    update.minimum_stream_buffer_size_frames = 1;
    let updated = module.set_audio_patch(&update).unwrap();
    assert_eq!(updated, patch);
    assert_eq!(module.audio_patches().len(), 1);

    module.reset_audio_patch(patch.id).unwrap();
    assert!(module.audio_patches().is_empty());
    assert!(module.patch_index().is_empty());
    assert_eq!(
        module.reset_audio_patch(patch.id).unwrap_err().kind(),
        ErrorKind::IllegalArgument
    );
}

#[test]
fn malformed_patches_are_argument_errors() {
    let module = Module::new(ModuleKind::Default);
    let config = primary_output_config(&module);
    let requests = [
        AudioPatch::new(&[], &[SPEAKER]),
        AudioPatch::new(&[config.id], &[]),
        AudioPatch::new(&[config.id, config.id], &[SPEAKER]),
        AudioPatch::new(&[999], &[SPEAKER]),
        AudioPatch::new(&[config.id], &[MIC]),
        AudioPatch {
            id: 77,
            ..AudioPatch::new(&[config.id], &[SPEAKER])
        },
    ];
    for request in requests {
        let err = module.set_audio_patch(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument, "{request:?}");
    }
    assert!(module.audio_patches().is_empty());
    assert!(module.patch_index().is_empty());
}

#[test]
fn routes_for_port_require_a_known_port() {
    let module = Module::new(ModuleKind::Default);
    assert_eq!(
        module.audio_routes_for_port(PRIMARY_OUT).unwrap(),
        vec![AudioRoute::new(&[PRIMARY_OUT], SPEAKER)]
    );
    assert_eq!(
        module.audio_routes_for_port(999).unwrap_err().kind(),
        ErrorKind::IllegalArgument
    );
    assert_eq!(module.audio_port(SPEAKER).unwrap().name, "Speaker");
}

#[test]
fn remote_submix_patch_endpoints_must_match() {
    let module = Module::new(ModuleKind::RSubmix);
    let template = module.audio_port(1).unwrap();
    let connected = module.connect_external_device(&template).unwrap();
    let device_config = module
        .audio_port_configs()
        .into_iter()
        .find(|pc| pc.port_id == connected.id)
        .unwrap();
    assert_eq!(device_config.format, Some(AudioFormat::PCM_FLOAT));

    let mix_config = |format, mask, rate| {
        module
            .set_audio_port_config(&AudioPortConfig {
                port_id: 3,
                format: Some(format),
                channel_mask: Some(mask),
                sample_rate: Some(rate),
                flags: Some(IoFlags::Output(0)),
                ..AudioPortConfig::default()
            })
            .unwrap()
            .suggested
    };
    let mismatched = mix_config(AudioFormat::PCM_16, ChannelLayout::STEREO, 48_000);
    let err = module
        .set_audio_patch(&AudioPatch::new(&[mismatched.id], &[device_config.id]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);

    let matched = mix_config(AudioFormat::PCM_FLOAT, ChannelLayout::MONO, 8_000);
    module
        .set_audio_patch(&AudioPatch::new(&[matched.id], &[device_config.id]))
        .unwrap();
}

fn device_port(id: PortId, address: &str) -> AudioPort {
    AudioPort {
        id,
        name: format!("out {id}"),
        flags: IoFlags::Output(0),
        profiles: vec![AudioProfile::new(AudioFormat::PCM_16, &[ChannelLayout::STEREO], &[48_000])],
        ext: PortExt::Device(DevicePortExt {
            device: AudioDevice::builtin(DeviceType::OutDevice).with_address(address),
            flags: 0,
        }),
    }
}

fn mix_port(id: PortId) -> AudioPort {
    AudioPort {
        id,
        name: format!("mix {id}"),
        flags: IoFlags::Output(0),
        profiles: vec![AudioProfile::new(AudioFormat::PCM_16, &[ChannelLayout::STEREO], &[48_000])],
        ext: PortExt::Mix(MixPortExt::default()),
    }
}

fn config_for(port: &AudioPort, id: PortId) -> AudioPortConfig {
    AudioPortConfig {
        id,
        port_id: port.id,
        format: Some(AudioFormat::PCM_16),
        channel_mask: Some(ChannelLayout::STEREO),
        sample_rate: Some(48_000),
        flags: Some(port.flags),
        gain: None,
        ext: port.ext.clone(),
    }
}

// Configs 1 and 2 live on devices 1 and 2; configs 5 and 6 on mixes 3 and 4.
// Device 2 is only reachable from mix 3, exclusively.
const SHARED_SINK: PortId = 1;
const EXCLUSIVE_SINK: PortId = 2;
const MIX_CONFIGS: [PortId; 2] = [5, 6];
const SINK_CONFIGS: [PortId; 2] = [SHARED_SINK, EXCLUSIVE_SINK];

fn exclusive_fixture() -> Configuration {
    let ports = vec![
        device_port(1, "shared"),
        device_port(2, "exclusive"),
        mix_port(3),
        mix_port(4),
    ];
    let initial_configs = vec![config_for(&ports[0], 1), config_for(&ports[1], 2)];
    let mut port_configs = initial_configs.clone();
    port_configs.push(config_for(&ports[2], 5));
    port_configs.push(config_for(&ports[3], 6));
    Configuration {
        ports,
        port_configs,
        initial_configs,
        routes: vec![
            AudioRoute::new(&[3, 4], SHARED_SINK),
            AudioRoute::new(&[3], EXCLUSIVE_SINK).exclusive(),
        ],
        next_port_id: 7,
        ..Configuration::default()
    }
}

fn fixture_port_of(config_id: PortId) -> PortId {
    match config_id {
        5 => 3,
        6 => 4,
        id => id,
    }
}

fn expected_index(patches: &[AudioPatch]) -> BTreeSet<(PortId, PatchId)> {
    let mut pairs = BTreeSet::new();
    for patch in patches {
        for id in patch.port_config_ids() {
            pairs.insert((id, patch.id));
            pairs.insert((fixture_port_of(id), patch.id));
        }
    }
    pairs
}

#[test]
fn exclusive_sink_admits_one_patch() {
    let module = Module::new(ModuleKind::Default).with_configuration(exclusive_fixture());
    let first = module
        .set_audio_patch(&AudioPatch::new(&[5], &[EXCLUSIVE_SINK]))
        .unwrap();
    let before = module.patch_index();

    let err = module
        .set_audio_patch(&AudioPatch::new(&[5], &[EXCLUSIVE_SINK]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(module.patch_index(), before);
    assert_eq!(module.audio_patches(), vec![first.clone()]);

    // Replacing the owner itself is fine.
    let replaced = module
        .set_audio_patch(&AudioPatch {
            id: first.id,
            ..AudioPatch::new(&[5], &[EXCLUSIVE_SINK, SHARED_SINK])
        })
        .unwrap();
    assert_eq!(replaced.latencies_ms, vec![10, 10]);

    // The shared sink is reachable through a non-exclusive route.
    module
        .set_audio_patch(&AudioPatch::new(&[6], &[SHARED_SINK]))
        .unwrap();
    let err = module
        .set_audio_patch(&AudioPatch::new(&[6], &[EXCLUSIVE_SINK]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
}

#[test]
fn claimed_exclusive_sink_blocks_other_patches_from_its_source() {
    let module = Module::new(ModuleKind::Default).with_configuration(exclusive_fixture());
    let first = module
        .set_audio_patch(&AudioPatch::new(&[5], &[EXCLUSIVE_SINK]))
        .unwrap();
    let index = module.patch_index();

    let err = module
        .set_audio_patch(&AudioPatch::new(&[5], &[SHARED_SINK]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(module.patch_index(), index);
    assert_eq!(module.audio_patches(), vec![first.clone()]);

    // Mix 4 has no route to the exclusive sink.
    module
        .set_audio_patch(&AudioPatch::new(&[6], &[SHARED_SINK]))
        .unwrap();

    module.reset_audio_patch(first.id).unwrap();
    module
        .set_audio_patch(&AudioPatch::new(&[5], &[SHARED_SINK]))
        .unwrap();
}

#[derive(Debug, Clone)]
enum PatchOp {
    Install { sources: u8, sinks: u8 },
    Replace { slot: usize, sources: u8, sinks: u8 },
    Reset { slot: usize },
}

fn pick(mask: u8, choices: [PortId; 2]) -> Vec<PortId> {
    choices
        .into_iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, id)| id)
        .collect()
}

fn patch_op() -> impl Strategy<Value = PatchOp> {
    prop_oneof![
        (0u8..4, 0u8..4).prop_map(|(sources, sinks)| PatchOp::Install { sources, sinks }),
        (0usize..4, 0u8..4, 0u8..4)
            .prop_map(|(slot, sources, sinks)| PatchOp::Replace { slot, sources, sinks }),
        (0usize..4).prop_map(|slot| PatchOp::Reset { slot }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn index_is_the_union_of_active_patches(ops in prop::collection::vec(patch_op(), 1..24)) {
        let module = Module::new(ModuleKind::Default).with_configuration(exclusive_fixture());
        for op in ops {
            let patches = module.audio_patches();
            let index = module.patch_index();
            let result = match op {
                PatchOp::Install { sources, sinks } => module
                    .set_audio_patch(&AudioPatch::new(
                        &pick(sources, MIX_CONFIGS),
                        &pick(sinks, SINK_CONFIGS),
                    ))
                    .map(|_| ()),
                PatchOp::Replace { slot, sources, sinks } => match patches.get(slot) {
                    Some(existing) => module
                        .set_audio_patch(&AudioPatch {
                            id: existing.id,
                            ..AudioPatch::new(
                                &pick(sources, MIX_CONFIGS),
                                &pick(sinks, SINK_CONFIGS),
                            )
                        })
                        .map(|_| ()),
                    None => Ok(()),
                },
                PatchOp::Reset { slot } => match patches.get(slot) {
                    Some(existing) => module.reset_audio_patch(existing.id),
                    None => Ok(()),
                },
            };
            if result.is_err() {
                prop_assert_eq!(module.patch_index(), index);
                prop_assert_eq!(module.audio_patches(), patches);
            }

            let active = module.audio_patches();
            prop_assert_eq!(module.patch_index().pairs(), expected_index(&active));
            let claims = active
                .iter()
                .filter(|patch| patch.sink_port_config_ids.contains(&EXCLUSIVE_SINK))
                .count();
            prop_assert!(claims <= 1);
        }
    }
}

/// Stub driver that refuses device lists once armed, for streams opened after
/// the first `reject_from` streams.
struct RejectingDriver {
    inner: StubDriver,
    armed: Arc<AtomicBool>,
    rejects: bool,
}

impl Driver for RejectingDriver {
    fn init(&mut self) -> hal_io::Result<()> {
        self.inner.init()
    }

    fn drain(&mut self, mode: DrainMode) -> hal_io::Result<()> {
        self.inner.drain(mode)
    }

    fn flush(&mut self) -> hal_io::Result<()> {
        self.inner.flush()
    }

    fn pause(&mut self) -> hal_io::Result<()> {
        self.inner.pause()
    }

    fn standby(&mut self) -> hal_io::Result<()> {
        self.inner.standby()
    }

    fn start(&mut self) -> hal_io::Result<()> {
        self.inner.start()
    }

    fn transfer(&mut self, buffer: &mut [u8], frame_count: usize) -> hal_io::Result<Transfer> {
        self.inner.transfer(buffer, frame_count)
    }

    fn refine_position(&mut self, position: &mut Position) -> hal_io::Result<()> {
        self.inner.refine_position(position)
    }

    fn set_connected_devices(&mut self, devices: &[AudioDevice]) -> hal_io::Result<()> {
        if self.rejects && self.armed.load(Ordering::SeqCst) && !devices.is_empty() {
            return Err(DriverError::DeviceUnavailable("device refused".into()));
        }
        self.inner.set_connected_devices(devices)
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

struct RejectingModule {
    armed: Arc<AtomicBool>,
    opened: AtomicUsize,
    reject_from: usize,
}

impl ModuleVariant for RejectingModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Default
    }

    fn configuration(&self) -> Configuration {
        tables::default_configuration()
    }

    fn create_output_driver(&self, context: &StreamContext) -> hal_core::Result<Box<dyn Driver>> {
        let index = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RejectingDriver {
            inner: StubDriver::new(context.stub_driver_config()),
            armed: Arc::clone(&self.armed),
            rejects: index >= self.reject_from,
        }))
    }
}

fn rejecting_module(reject_from: usize) -> (Module, Arc<AtomicBool>) {
    let armed = Arc::new(AtomicBool::new(false));
    let variant = RejectingModule {
        armed: Arc::clone(&armed),
        opened: AtomicUsize::new(0),
        reject_from,
    };
    (Module::with_variant(Box::new(variant), ModuleConfig::default()), armed)
}

#[test]
fn lost_connections_are_not_restored_on_failure() {
    let (module, armed) = rejecting_module(0);
    let config = primary_output_config(&module);
    let stream = module
        .open_output_stream(OpenStreamArgs::new(config.id, 480))
        .unwrap();
    let patch = module
        .set_audio_patch(&AudioPatch::new(&[config.id], &[SPEAKER]))
        .unwrap();
    assert!(stream.is_connected());

    // A second, dynamic config on the speaker gives the stream a new device set.
    let speaker_config = module
        .set_audio_port_config(&AudioPortConfig {
            port_id: SPEAKER,
            format: Some(AudioFormat::Default),
            channel_mask: Some(ChannelLayout::None),
            sample_rate: Some(0),
            flags: Some(IoFlags::Output(0)),
            ..AudioPortConfig::default()
        })
        .unwrap();
    assert!(speaker_config.applied);

    let index = module.patch_index();
    armed.store(true, Ordering::SeqCst);
    let err = module
        .set_audio_patch(&AudioPatch {
            id: patch.id,
            ..AudioPatch::new(&[config.id], &[speaker_config.suggested.id])
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert_eq!(module.audio_patches(), vec![patch.clone()]);
    assert_eq!(module.patch_index(), index);
    assert!(!stream.is_connected());

    armed.store(false, Ordering::SeqCst);
    module.reset_audio_patch(patch.id).unwrap();
    stream.close().unwrap();
}

#[test]
fn new_connections_are_rolled_back_on_failure() {
    let (module, armed) = rejecting_module(1);
    let first = primary_output_config(&module);
    let second = primary_output_config(&module);
    let accepting = module
        .open_output_stream(OpenStreamArgs::new(first.id, 480))
        .unwrap();
    let refusing = module
        .open_output_stream(OpenStreamArgs::new(second.id, 480))
        .unwrap();

    armed.store(true, Ordering::SeqCst);
    let err = module
        .set_audio_patch(&AudioPatch::new(&[first.id, second.id], &[SPEAKER]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert!(!accepting.is_connected());
    assert!(!refusing.is_connected());
    assert!(module.audio_patches().is_empty());
    assert!(module.patch_index().is_empty());

    armed.store(false, Ordering::SeqCst);
    module
        .set_audio_patch(&AudioPatch::new(&[first.id, second.id], &[SPEAKER]))
        .unwrap();
    assert!(accepting.is_connected());
    assert!(refusing.is_connected());

    accepting.close().unwrap();
    refusing.close().unwrap();
}
