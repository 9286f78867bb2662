//! Built-in port, profile and route tables of every module variant.

use hal_graph::{
    connection, AudioDevice, AudioFormat, AudioPort, AudioPortConfig, AudioProfile, AudioRoute,
    ChannelLayout, Configuration, DevicePortExt, DeviceType, IoFlags, MixPortExt, PortExt, PortId,
};

const STANDARD_RATES: &[u32] = &[8_000, 11_025, 16_000, 32_000, 44_100, 48_000];
const MONO_STEREO: &[ChannelLayout] = &[ChannelLayout::MONO, ChannelLayout::STEREO];

struct TableBuilder {
    config: Configuration,
}

impl TableBuilder {
    fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Built-in device that is present from startup. Its initial config shares
    /// the port id.
    fn attached_device(
        &mut self,
        name: &str,
        flags: IoFlags,
        device: AudioDevice,
        device_flags: u32,
        initial: (AudioFormat, ChannelLayout, u32),
    ) -> PortId {
        let ext = PortExt::Device(DevicePortExt {
            device,
            flags: device_flags,
        });
        let id = self.push_port(name, flags, Vec::new(), ext.clone());
        let (format, mask, rate) = initial;
        self.config.initial_configs.push(AudioPortConfig {
            id,
            port_id: id,
            format: Some(format),
            channel_mask: Some(mask),
            sample_rate: Some(rate),
            flags: Some(flags),
            gain: None,
            ext,
        });
        id
    }

    /// Hot-pluggable device template. `connected` lists the profiles reported
    /// when a connection is simulated; an empty list keeps the template's own.
    fn templated_device(
        &mut self,
        name: &str,
        flags: IoFlags,
        device: AudioDevice,
        profiles: Vec<AudioProfile>,
        connected: Vec<AudioProfile>,
    ) -> PortId {
        let ext = PortExt::Device(DevicePortExt { device, flags: 0 });
        let id = self.push_port(name, flags, profiles, ext);
        if !connected.is_empty() {
            self.config.connected_profiles.insert(id, connected);
        }
        id
    }

    fn mix(
        &mut self,
        name: &str,
        flags: IoFlags,
        max_streams: u32,
        profiles: Vec<AudioProfile>,
    ) -> PortId {
        let handle = self.config.next_port_id;
        let ext = PortExt::Mix(MixPortExt {
            handle,
            max_open_stream_count: max_streams,
            max_active_stream_count: max_streams,
        });
        self.push_port(name, flags, profiles, ext)
    }

    fn route(&mut self, sources: &[PortId], sink: PortId) {
        self.config.routes.push(AudioRoute::new(sources, sink));
    }

    fn push_port(
        &mut self,
        name: &str,
        flags: IoFlags,
        profiles: Vec<AudioProfile>,
        ext: PortExt,
    ) -> PortId {
        let id = self.config.allocate_port_id();
        self.config.ports.push(AudioPort {
            id,
            name: name.to_owned(),
            flags,
            profiles,
            ext,
        });
        id
    }

    fn build(mut self) -> Configuration {
        self.config.port_configs = self.config.initial_configs.clone();
        self.config
    }
}

fn out(bits: u32) -> IoFlags {
    IoFlags::Output(bits)
}

fn input() -> IoFlags {
    IoFlags::Input(0)
}

fn pcm16_standard() -> Vec<AudioProfile> {
    vec![AudioProfile::new(AudioFormat::PCM_16, MONO_STEREO, STANDARD_RATES)]
}

/// Primary module: speaker, microphone, telephony and FM tuner.
pub fn default_configuration() -> Configuration {
    let mut t = TableBuilder::new();
    let speaker = t.attached_device(
        "Speaker",
        out(0),
        AudioDevice::builtin(DeviceType::OutSpeaker),
        DevicePortExt::FLAG_DEFAULT_DEVICE,
        (AudioFormat::PCM_16, ChannelLayout::STEREO, 48_000),
    );
    let mic = t.attached_device(
        "Built-In Mic",
        input(),
        AudioDevice::builtin(DeviceType::InMicrophone).with_address("bottom"),
        DevicePortExt::FLAG_DEFAULT_DEVICE,
        (AudioFormat::PCM_16, ChannelLayout::MONO, 48_000),
    );
    let telephony_tx = t.attached_device(
        "Telephony Tx",
        out(0),
        AudioDevice::builtin(DeviceType::OutTelephonyTx),
        0,
        (AudioFormat::PCM_16, ChannelLayout::MONO, 48_000),
    );
    let telephony_rx = t.attached_device(
        "Telephony Rx",
        input(),
        AudioDevice::builtin(DeviceType::InTelephonyRx),
        0,
        (AudioFormat::PCM_16, ChannelLayout::MONO, 48_000),
    );
    let fm_tuner = t.attached_device(
        "FM Tuner",
        input(),
        AudioDevice::builtin(DeviceType::InFmTuner),
        0,
        (AudioFormat::PCM_16, ChannelLayout::STEREO, 48_000),
    );

    let primary_out = t.mix("primary output", out(IoFlags::OUTPUT_PRIMARY), 0, pcm16_standard());
    let primary_in = t.mix("primary input", input(), 0, pcm16_standard());
    let telephony_tx_mix = t.mix("telephony_tx", out(0), 1, pcm16_standard());
    let telephony_rx_mix = t.mix("telephony_rx", input(), 1, pcm16_standard());
    let fm_tuner_mix = t.mix("fm_tuner", input(), 1, pcm16_standard());

    t.route(&[primary_out], speaker);
    t.route(&[mic], primary_in);
    t.route(&[telephony_rx], telephony_rx_mix);
    t.route(&[telephony_tx_mix], telephony_tx);
    t.route(&[fm_tuner], fm_tuner_mix);
    t.build()
}

/// PCM formats carried by the remote submix, best first.
pub fn r_submix_profiles() -> Vec<AudioProfile> {
    [
        AudioFormat::PCM_FLOAT,
        AudioFormat::PCM_32,
        AudioFormat::PCM_24,
        AudioFormat::PCM_16,
    ]
    .into_iter()
    .map(|format| AudioProfile::new(format, MONO_STEREO, STANDARD_RATES))
    .collect()
}

/// Remote submix: virtual devices whose capabilities mirror the mix ports.
pub fn r_submix_configuration() -> Configuration {
    let profiles = r_submix_profiles();
    let mut t = TableBuilder::new();
    let out_device = t.templated_device(
        "Remote Submix Out",
        out(0),
        AudioDevice::external(DeviceType::OutSubmix, connection::VIRTUAL),
        Vec::new(),
        profiles.clone(),
    );
    let in_device = t.templated_device(
        "Remote Submix In",
        input(),
        AudioDevice::external(DeviceType::InSubmix, connection::VIRTUAL),
        Vec::new(),
        profiles.clone(),
    );
    let out_mix = t.mix("r_submix output", out(0), 0, profiles.clone());
    let in_mix = t.mix("r_submix input", input(), 0, profiles);
    t.route(&[out_mix], out_device);
    t.route(&[in_device], in_mix);
    t.build()
}

/// Capabilities reported by USB devices.
pub fn usb_profiles() -> Vec<AudioProfile> {
    let masks = [
        ChannelLayout::MONO,
        ChannelLayout::STEREO,
        ChannelLayout::INDEX_MASK_1,
        ChannelLayout::INDEX_MASK_2,
    ];
    vec![
        AudioProfile::new(AudioFormat::PCM_16, &masks, &[44_100, 48_000]),
        AudioProfile::new(AudioFormat::PCM_24, &masks, &[44_100, 48_000]),
    ]
}

/// USB module: templated devices and mix ports that learn their profiles on connection.
pub fn usb_configuration() -> Configuration {
    let mut t = TableBuilder::new();
    let usb = |kind| AudioDevice::external(kind, connection::USB);
    let device_out = t.templated_device(
        "USB Device Out",
        out(0),
        usb(DeviceType::OutDevice),
        Vec::new(),
        usb_profiles(),
    );
    let headset_out = t.templated_device(
        "USB Headset Out",
        out(0),
        usb(DeviceType::OutHeadset),
        Vec::new(),
        usb_profiles(),
    );
    let device_in = t.templated_device(
        "USB Device In",
        input(),
        usb(DeviceType::InDevice),
        Vec::new(),
        usb_profiles(),
    );
    let headset_in = t.templated_device(
        "USB Headset In",
        input(),
        usb(DeviceType::InHeadset),
        Vec::new(),
        usb_profiles(),
    );

    let out_mix = t.mix("usb_device output", out(0), 1, Vec::new());
    let in_mix = t.mix("usb_device input", input(), 1, Vec::new());
    t.route(&[out_mix], device_out);
    t.route(&[out_mix], headset_out);
    t.route(&[device_in, headset_in], in_mix);
    t.build()
}

/// Stub module used by tests: test devices and a compressed offload output.
pub fn stub_configuration() -> Configuration {
    let mut t = TableBuilder::new();
    let test_out = t.attached_device(
        "Test Out",
        out(0),
        AudioDevice::builtin(DeviceType::OutDevice),
        0,
        (AudioFormat::PCM_24, ChannelLayout::STEREO, 48_000),
    );
    let headset_out = t.templated_device(
        "Wired Headset",
        out(0),
        AudioDevice::external(DeviceType::OutHeadset, connection::ANALOG),
        vec![AudioProfile::new(AudioFormat::PCM_24, &[ChannelLayout::STEREO], &[48_000])],
        Vec::new(),
    );
    let test_in = t.attached_device(
        "Test In",
        input(),
        AudioDevice::builtin(DeviceType::InDevice),
        0,
        (AudioFormat::PCM_24, ChannelLayout::MONO, 48_000),
    );
    let headset_in = t.templated_device(
        "Wired Headset Mic",
        input(),
        AudioDevice::external(DeviceType::InHeadset, connection::ANALOG),
        vec![AudioProfile::new(AudioFormat::PCM_24, &[ChannelLayout::MONO], &[48_000])],
        Vec::new(),
    );

    let test_out_mix = t.mix(
        "test output",
        out(0),
        1,
        vec![AudioProfile::new(AudioFormat::PCM_24, MONO_STEREO, STANDARD_RATES)],
    );
    let fast_out_mix = t.mix(
        "test fast output",
        out(IoFlags::OUTPUT_FAST),
        1,
        vec![AudioProfile::new(AudioFormat::PCM_24, &[ChannelLayout::STEREO], &[44_100, 48_000])],
    );
    let offload_mix = t.mix(
        "test compressed offload",
        out(
            IoFlags::OUTPUT_DIRECT
                | IoFlags::OUTPUT_COMPRESS_OFFLOAD
                | IoFlags::OUTPUT_NON_BLOCKING,
        ),
        1,
        vec![AudioProfile::new(AudioFormat::encoded("audio/mpeg"), MONO_STEREO, &[44_100, 48_000])],
    );
    let in_rates = &[8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000];
    let in_masks = &[ChannelLayout::MONO, ChannelLayout::STEREO, ChannelLayout::FRONT_BACK];
    let test_in_mix = t.mix(
        "test input",
        input(),
        2,
        vec![
            AudioProfile::new(AudioFormat::PCM_16, in_masks, in_rates),
            AudioProfile::new(AudioFormat::PCM_24, in_masks, in_rates),
        ],
    );

    t.route(&[test_out_mix, fast_out_mix, offload_mix], test_out);
    t.route(&[test_out_mix], headset_out);
    t.route(&[test_in, headset_in], test_in_mix);
    t.build()
}

/// Capabilities of A2DP sinks.
pub fn a2dp_profiles() -> Vec<AudioProfile> {
    vec![AudioProfile::new(
        AudioFormat::PCM_16,
        &[ChannelLayout::STEREO],
        &[44_100, 48_000, 88_200, 96_000],
    )]
}

/// Capabilities of hearing aids.
pub fn hearing_aid_profiles() -> Vec<AudioProfile> {
    vec![AudioProfile::new(AudioFormat::PCM_16, &[ChannelLayout::STEREO], &[16_000])]
}

/// Bluetooth module: A2DP sinks and a hearing aid.
pub fn bluetooth_configuration() -> Configuration {
    let mut t = TableBuilder::new();
    let a2dp = |kind| AudioDevice::external(kind, connection::BT_A2DP);
    let bt_out = t.templated_device(
        "BT A2DP Out",
        out(0),
        a2dp(DeviceType::OutDevice),
        a2dp_profiles(),
        a2dp_profiles(),
    );
    let headphones = t.templated_device(
        "BT A2DP Headphones",
        out(0),
        a2dp(DeviceType::OutHeadphone),
        a2dp_profiles(),
        a2dp_profiles(),
    );
    let speaker = t.templated_device(
        "BT A2DP Speaker",
        out(0),
        a2dp(DeviceType::OutSpeaker),
        a2dp_profiles(),
        a2dp_profiles(),
    );
    let hearing_aid = t.templated_device(
        "BT Hearing Aid Out",
        out(0),
        AudioDevice::external(DeviceType::OutHearingAid, connection::WIRELESS),
        Vec::new(),
        hearing_aid_profiles(),
    );

    let a2dp_mix = t.mix("a2dp output", out(0), 1, Vec::new());
    let hearing_mix = t.mix(
        "hearing aid output",
        out(0),
        1,
        vec![AudioProfile::new(AudioFormat::PCM_16, &[ChannelLayout::STEREO], &[16_000, 24_000])],
    );
    t.route(&[a2dp_mix], bt_out);
    t.route(&[a2dp_mix], headphones);
    t.route(&[a2dp_mix], speaker);
    t.route(&[hearing_mix], hearing_aid);
    t.build()
}
