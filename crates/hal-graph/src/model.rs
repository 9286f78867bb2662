//! Ports, profiles, configs, routes and patches.

use serde::{Deserialize, Serialize};

use crate::{PatchId, PortId};

/// Sample representation of linear PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcmType {
    UInt8Bit,
    Int16Bit,
    Int24Bit,
    Int32Bit,
    Float32Bit,
}

impl PcmType {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PcmType::UInt8Bit => 1,
            PcmType::Int16Bit => 2,
            PcmType::Int24Bit => 3,
            PcmType::Int32Bit | PcmType::Float32Bit => 4,
        }
    }
}

/// Audio format. `Default` is the "unspecified" sentinel used by dynamic profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioFormat {
    #[default]
    Default,
    Pcm(PcmType),
    /// Compressed or otherwise encoded stream, identified by its MIME type.
    Encoded(String),
}

impl AudioFormat {
    pub const PCM_16: AudioFormat = AudioFormat::Pcm(PcmType::Int16Bit);
    pub const PCM_24: AudioFormat = AudioFormat::Pcm(PcmType::Int24Bit);
    pub const PCM_32: AudioFormat = AudioFormat::Pcm(PcmType::Int32Bit);
    pub const PCM_FLOAT: AudioFormat = AudioFormat::Pcm(PcmType::Float32Bit);

    pub fn encoded(mime: &str) -> Self {
        AudioFormat::Encoded(mime.to_owned())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, AudioFormat::Default)
    }
}

/// Channel layout. `None` is the "unspecified" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelLayout {
    #[default]
    None,
    /// Positional layout, bit per speaker position.
    Layout(u32),
    /// Index mask, bit per channel index.
    Index(u32),
}

impl ChannelLayout {
    pub const FRONT_LEFT: u32 = 1 << 0;
    pub const FRONT_RIGHT: u32 = 1 << 1;
    pub const FRONT_CENTER: u32 = 1 << 2;
    pub const BACK_CENTER: u32 = 1 << 8;

    pub const MONO: ChannelLayout = ChannelLayout::Layout(Self::FRONT_LEFT);
    pub const STEREO: ChannelLayout = ChannelLayout::Layout(Self::FRONT_LEFT | Self::FRONT_RIGHT);
    pub const FRONT_BACK: ChannelLayout =
        ChannelLayout::Layout(Self::FRONT_CENTER | Self::BACK_CENTER);
    pub const INDEX_MASK_1: ChannelLayout = ChannelLayout::Index(0b1);
    pub const INDEX_MASK_2: ChannelLayout = ChannelLayout::Index(0b11);

    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::None => 0,
            ChannelLayout::Layout(bits) | ChannelLayout::Index(bits) => bits.count_ones() as usize,
        }
    }
}

/// Size of one frame in bytes, zero when it cannot be derived.
pub fn frame_size_bytes(format: &AudioFormat, layout: ChannelLayout) -> usize {
    match format {
        AudioFormat::Pcm(pcm) => pcm.bytes_per_sample() * layout.channel_count(),
        AudioFormat::Encoded(_) => 1,
        AudioFormat::Default => 0,
    }
}

/// A supported combination of format, channel masks and sample rates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default)]
    pub channel_masks: Vec<ChannelLayout>,
    #[serde(default)]
    pub sample_rates: Vec<u32>,
}

impl AudioProfile {
    pub fn new(format: AudioFormat, channel_masks: &[ChannelLayout], sample_rates: &[u32]) -> Self {
        Self {
            name: String::new(),
            format,
            channel_masks: channel_masks.to_vec(),
            sample_rates: sample_rates.to_vec(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.format.is_default() || self.channel_masks.is_empty() || self.sample_rates.is_empty()
    }
}

/// True when no profile can supply a concrete configuration.
pub fn has_dynamic_profiles_only(profiles: &[AudioProfile]) -> bool {
    profiles.iter().all(AudioProfile::is_dynamic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// I/O flags of a port; the variant encodes the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoFlags {
    Input(u32),
    Output(u32),
}

impl IoFlags {
    pub const OUTPUT_DIRECT: u32 = 1 << 0;
    pub const OUTPUT_PRIMARY: u32 = 1 << 1;
    pub const OUTPUT_FAST: u32 = 1 << 2;
    pub const OUTPUT_COMPRESS_OFFLOAD: u32 = 1 << 4;
    pub const OUTPUT_NON_BLOCKING: u32 = 1 << 5;
    pub const INPUT_FAST: u32 = 1 << 0;

    pub fn direction(self) -> Direction {
        match self {
            IoFlags::Input(_) => Direction::Input,
            IoFlags::Output(_) => Direction::Output,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            IoFlags::Input(bits) | IoFlags::Output(bits) => bits,
        }
    }

    pub fn is_output_with(self, flag: u32) -> bool {
        matches!(self, IoFlags::Output(bits) if bits & flag != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    InDefault,
    InMicrophone,
    InTelephonyRx,
    InFmTuner,
    InSubmix,
    InDevice,
    InHeadset,
    OutDefault,
    OutSpeaker,
    OutTelephonyTx,
    OutSubmix,
    OutDevice,
    OutHeadset,
    OutHeadphone,
    OutHearingAid,
}

/// Connection tags of hot-pluggable devices. Built-in devices use an empty tag.
pub mod connection {
    pub const ANALOG: &str = "analog";
    pub const BT_A2DP: &str = "bt-a2dp";
    pub const USB: &str = "usb";
    pub const VIRTUAL: &str = "virtual";
    pub const WIRELESS: &str = "wireless";
}

/// Identifies a concrete device: type, connection and address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioDevice {
    pub kind: DeviceType,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub address: String,
}

impl AudioDevice {
    pub fn builtin(kind: DeviceType) -> Self {
        Self {
            kind,
            connection: String::new(),
            address: String::new(),
        }
    }

    pub fn external(kind: DeviceType, connection: &str) -> Self {
        Self {
            kind,
            connection: connection.to_owned(),
            address: String::new(),
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_owned();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePortExt {
    pub device: AudioDevice,
    #[serde(default)]
    pub flags: u32,
}

impl DevicePortExt {
    pub const FLAG_DEFAULT_DEVICE: u32 = 1 << 0;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MixPortExt {
    #[serde(default)]
    pub handle: i32,
    /// Zero means unbounded.
    #[serde(default)]
    pub max_open_stream_count: u32,
    #[serde(default)]
    pub max_active_stream_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PortExt {
    #[default]
    Unspecified,
    Device(DevicePortExt),
    Mix(MixPortExt),
}

impl PortExt {
    pub fn device(&self) -> Option<&DevicePortExt> {
        match self {
            PortExt::Device(ext) => Some(ext),
            _ => None,
        }
    }

    pub fn mix(&self) -> Option<&MixPortExt> {
        match self {
            PortExt::Mix(ext) => Some(ext),
            _ => None,
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self, PortExt::Device(_))
    }

    pub fn is_mix(&self) -> bool {
        matches!(self, PortExt::Mix(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPort {
    pub id: PortId,
    pub name: String,
    pub flags: IoFlags,
    #[serde(default)]
    pub profiles: Vec<AudioProfile>,
    pub ext: PortExt,
}

impl AudioPort {
    pub fn is_device(&self) -> bool {
        self.ext.is_device()
    }

    pub fn is_mix(&self) -> bool {
        self.ext.is_mix()
    }

    pub fn direction(&self) -> Direction {
        self.flags.direction()
    }

    /// Profile whose format equals `format`. Static profiles are preferred over
    /// dynamic ones, otherwise declaration order decides.
    pub fn find_profile(&self, format: &AudioFormat) -> Option<&AudioProfile> {
        let mut matching = self.profiles.iter().filter(|profile| &profile.format == format);
        let first = matching.clone().next();
        matching.find(|profile| !profile.is_dynamic()).or(first)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GainConfig {
    pub index: i32,
    pub mode: u32,
    pub values: Vec<i32>,
    pub ramp_duration_ms: i32,
}

/// A concrete instantiation of a port. Fields left as `None` are unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioPortConfig {
    pub id: PortId,
    pub port_id: PortId,
    #[serde(default)]
    pub format: Option<AudioFormat>,
    #[serde(default)]
    pub channel_mask: Option<ChannelLayout>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub flags: Option<IoFlags>,
    #[serde(default)]
    pub gain: Option<GainConfig>,
    #[serde(default)]
    pub ext: PortExt,
}

impl AudioPortConfig {
    /// Frame size derived from the configured format and channel mask.
    pub fn frame_size(&self) -> usize {
        match (&self.format, self.channel_mask) {
            (Some(format), Some(mask)) => frame_size_bytes(format, mask),
            _ => 0,
        }
    }
}

/// Directed many-to-one reachability relation between ports.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioRoute {
    pub source_port_ids: Vec<PortId>,
    pub sink_port_id: PortId,
    #[serde(default)]
    pub is_exclusive: bool,
}

impl AudioRoute {
    pub fn new(source_port_ids: &[PortId], sink_port_id: PortId) -> Self {
        Self {
            source_port_ids: source_port_ids.to_vec(),
            sink_port_id,
            is_exclusive: false,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.is_exclusive = true;
        self
    }

    pub fn involves(&self, port_id: PortId) -> bool {
        self.sink_port_id == port_id || self.source_port_ids.contains(&port_id)
    }
}

/// Live binding of source port configs to sink port configs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioPatch {
    pub id: PatchId,
    pub source_port_config_ids: Vec<PortId>,
    pub sink_port_config_ids: Vec<PortId>,
    #[serde(default)]
    pub minimum_stream_buffer_size_frames: i32,
    #[serde(default)]
    pub latencies_ms: Vec<i32>,
}

impl AudioPatch {
    pub fn new(sources: &[PortId], sinks: &[PortId]) -> Self {
        Self {
            source_port_config_ids: sources.to_vec(),
            sink_port_config_ids: sinks.to_vec(),
            ..Self::default()
        }
    }

    pub fn port_config_ids(&self) -> impl Iterator<Item = PortId> + '_ {
        self.source_port_config_ids
            .iter()
            .chain(self.sink_port_config_ids.iter())
            .copied()
    }
}
