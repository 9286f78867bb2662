use hal_core::{tables, ErrorKind, Module, ModuleConfig, ModuleDebug, ModuleKind, OpenStreamArgs};
use hal_graph::{
    has_dynamic_profiles_only, AudioFormat, AudioPatch, AudioPort, AudioPortConfig, AudioProfile,
    ChannelLayout, DevicePortExt, IoFlags, PortExt, PortId,
};

// Port ids of the USB module table.
const USB_DEVICE_OUT: PortId = 1;
const USB_HEADSET_OUT: PortId = 2;
const USB_OUT_MIX: PortId = 5;

// Port ids of the Bluetooth module table.
const BT_A2DP_OUT: PortId = 1;
const BT_HEARING_AID: PortId = 4;
const BT_A2DP_MIX: PortId = 5;

fn request(module: &Module, template_id: PortId, address: &str) -> AudioPort {
    let mut port = module.audio_port(template_id).unwrap();
    if let PortExt::Device(DevicePortExt { device, .. }) = &mut port.ext {
        device.address = address.to_owned();
    }
    port
}

fn simulating() -> ModuleConfig {
    ModuleConfig::default().with_debug(ModuleDebug {
        simulate_device_connections: true,
        stream_transient_state_delay_ms: 0,
    })
}

#[test]
fn dynamic_device_needs_a_static_mix_port() {
    // The primary variant probes nothing, so the connected port stays dynamic.
    let module = Module::new(ModuleKind::Default).with_configuration(tables::usb_configuration());
    let ports = module.audio_ports();
    let err = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "card=1;device=0"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(module.audio_ports(), ports);

    let mut table = tables::usb_configuration();
    let mix = table.port_mut(USB_OUT_MIX).unwrap();
    mix.profiles = vec![AudioProfile::new(
        AudioFormat::PCM_16,
        &[ChannelLayout::STEREO],
        &[48_000],
    )];
    let mix_profiles = mix.profiles.clone();
    let module = Module::new(ModuleKind::Default).with_configuration(table);
    let port = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "card=1;device=0"))
        .unwrap();
    assert!(has_dynamic_profiles_only(&port.profiles));
    assert_eq!(module.audio_ports().len(), ports.len() + 1);
    assert_eq!(module.audio_port(USB_OUT_MIX).unwrap().profiles, mix_profiles);
    assert!(module
        .audio_routes_for_port(port.id)
        .unwrap()
        .iter()
        .any(|route| route.sink_port_id == port.id && route.source_port_ids == vec![USB_OUT_MIX]));
}

#[test]
fn usb_connection_populates_and_clears_mix_profiles() {
    let module = Module::new(ModuleKind::Usb);
    let err = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "not-an-address"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);

    let port = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "card=1;device=0"))
        .unwrap();
    assert_eq!(port.profiles, tables::usb_profiles());
    assert_eq!(module.audio_port(USB_OUT_MIX).unwrap().profiles, port.profiles);

    let err = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "card=1;device=0"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    let err = module.connect_external_device(&port).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);

    module.disconnect_external_device(port.id).unwrap();
    assert!(module.audio_port(USB_OUT_MIX).unwrap().profiles.is_empty());
    assert!(module.audio_port(port.id).is_err());
}

#[test]
fn disconnect_is_idempotent_in_its_failure() {
    let module = Module::from_config(simulating().with_kind(ModuleKind::Usb));
    let before = module.configuration();
    let first = module.disconnect_external_device(USB_HEADSET_OUT).unwrap_err();
    let second = module.disconnect_external_device(USB_HEADSET_OUT).unwrap_err();
    assert_eq!(first.kind(), ErrorKind::IllegalArgument);
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(module.configuration(), before);

    let port = module
        .connect_external_device(&request(&module, USB_HEADSET_OUT, "card=2;device=0"))
        .unwrap();
    module.disconnect_external_device(port.id).unwrap();
    let first = module.disconnect_external_device(port.id).unwrap_err();
    let second = module.disconnect_external_device(port.id).unwrap_err();
    assert_eq!(first.kind(), ErrorKind::IllegalArgument);
    assert_eq!(first.to_string(), second.to_string());

    let after = module.configuration();
    assert_eq!(after.ports, before.ports);
    assert_eq!(after.routes, before.routes);
    assert_eq!(after.port_configs, before.port_configs);
}

#[test]
fn custom_config_blocks_disconnect() {
    let module = Module::from_config(simulating().with_kind(ModuleKind::Usb));
    let port = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "card=1;device=0"))
        .unwrap();
    let custom = module
        .set_audio_port_config(&AudioPortConfig {
            port_id: port.id,
            format: Some(AudioFormat::PCM_24),
            channel_mask: Some(ChannelLayout::STEREO),
            sample_rate: Some(44_100),
            flags: Some(IoFlags::Output(0)),
            ..AudioPortConfig::default()
        })
        .unwrap();
    assert!(custom.applied);

    let err = module.disconnect_external_device(port.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    module.reset_audio_port_config(custom.suggested.id).unwrap();
    module.disconnect_external_device(port.id).unwrap();
}

#[test]
fn patched_device_stays_connected() {
    let module = Module::new(ModuleKind::Usb);
    let port = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, "card=1;device=0"))
        .unwrap();
    let device_config = module
        .audio_port_configs()
        .into_iter()
        .find(|pc| pc.port_id == port.id)
        .unwrap();
    let mix_config = module
        .set_audio_port_config(&AudioPortConfig {
            port_id: USB_OUT_MIX,
            format: device_config.format.clone(),
            channel_mask: device_config.channel_mask,
            sample_rate: device_config.sample_rate,
            flags: Some(IoFlags::Output(0)),
            ..AudioPortConfig::default()
        })
        .unwrap()
        .suggested;
    let patch = module
        .set_audio_patch(&AudioPatch::new(&[mix_config.id], &[device_config.id]))
        .unwrap();

    let err = module.disconnect_external_device(port.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(module.audio_patches(), vec![patch.clone()]);
    assert_eq!(module.audio_port_configs().len(), 2);

    let stream = module
        .open_output_stream(OpenStreamArgs::new(mix_config.id, 480))
        .unwrap();
    assert!(stream.is_connected());
    stream.close().unwrap();

    module.reset_audio_patch(patch.id).unwrap();
    module.reset_audio_port_config(mix_config.id).unwrap();
    module.disconnect_external_device(port.id).unwrap();
}

#[test]
fn simulation_cannot_toggle_while_connected() {
    let module = Module::from_config(simulating().with_kind(ModuleKind::Usb));
    let port = module
        .connect_external_device(&request(&module, USB_DEVICE_OUT, ""))
        .unwrap();
    assert!(!port.profiles.is_empty());

    let err = module.set_module_debug(ModuleDebug::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    module
        .set_module_debug(ModuleDebug {
            simulate_device_connections: true,
            stream_transient_state_delay_ms: 30,
        })
        .unwrap();

    module.disconnect_external_device(port.id).unwrap();
    module.set_module_debug(ModuleDebug::default()).unwrap();
    assert_eq!(module.module_debug(), ModuleDebug::default());
}

#[test]
fn prepare_to_disconnect_checks_the_port() {
    let module = Module::new(ModuleKind::Bluetooth);
    let err = module.prepare_to_disconnect_external_device(BT_A2DP_OUT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    let err = module.prepare_to_disconnect_external_device(BT_A2DP_MIX).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalArgument);

    let port = module
        .connect_external_device(&request(&module, BT_A2DP_OUT, "00:11:22:33:44:55"))
        .unwrap();
    module.prepare_to_disconnect_external_device(port.id).unwrap();
    module.disconnect_external_device(port.id).unwrap();
}

#[test]
fn bluetooth_patches_use_the_bluetooth_latency() {
    let module = Module::new(ModuleKind::Bluetooth);
    let port = module
        .connect_external_device(&request(&module, BT_A2DP_OUT, "00:11:22:33:44:55"))
        .unwrap();
    let device_config = module
        .audio_port_configs()
        .into_iter()
        .find(|pc| pc.port_id == port.id)
        .unwrap();
    let mix_config = module
        .set_audio_port_config(&AudioPortConfig {
            port_id: BT_A2DP_MIX,
            format: Some(AudioFormat::PCM_16),
            channel_mask: Some(ChannelLayout::STEREO),
            sample_rate: Some(48_000),
            flags: Some(IoFlags::Output(0)),
            ..AudioPortConfig::default()
        })
        .unwrap();
    assert!(mix_config.applied);

    let patch = module
        .set_audio_patch(&AudioPatch::new(&[mix_config.suggested.id], &[device_config.id]))
        .unwrap();
    assert_eq!(patch.latencies_ms, vec![200]);
    assert_eq!(patch.minimum_stream_buffer_size_frames, 9_600);

    let hearing_aid = module
        .connect_external_device(&request(&module, BT_HEARING_AID, "hearing-aid"))
        .unwrap();
    assert_eq!(hearing_aid.profiles[0].sample_rates, vec![16_000]);
}

#[test]
fn master_controls_validate_volume() {
    let module = Module::new(ModuleKind::Default);
    assert_eq!(module.master_volume(), 1.0);
    module.set_master_volume(0.25).unwrap();
    assert_eq!(module.master_volume(), 0.25);
    for volume in [-0.1, 1.5, f32::NAN] {
        let err = module.set_master_volume(volume).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    }
    assert_eq!(module.master_volume(), 0.25);

    module.set_master_mute(true);
    module.set_mic_mute(true);
    assert!(module.master_mute());
    assert!(module.mic_mute());
}
