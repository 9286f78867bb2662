use std::time::Duration;

use hal_graph::{AudioFormat, ChannelLayout, Direction, IoFlags, PortId};
use hal_io::StubDriverConfig;
use hal_rt::CallbackHandle;

use crate::config::{QueueConfig, VendorDebug};
use crate::latency::LatencyMetrics;

/// Compressed offload parameters supplied with an offloaded output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffloadInfo {
    pub bit_rate: u32,
    pub duration_us: i64,
}

/// Arguments of `open_input_stream` and `open_output_stream`.
#[derive(Clone, Default)]
pub struct OpenStreamArgs {
    pub port_config_id: PortId,
    pub buffer_size_frames: i64,
    /// Only output streams accept a callback.
    pub callback: Option<CallbackHandle>,
    pub offload_info: Option<OffloadInfo>,
}

impl OpenStreamArgs {
    pub fn new(port_config_id: PortId, buffer_size_frames: i64) -> Self {
        Self {
            port_config_id,
            buffer_size_frames,
            ..Self::default()
        }
    }

    pub fn with_callback(mut self, callback: CallbackHandle) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_offload_info(mut self, info: OffloadInfo) -> Self {
        self.offload_info = Some(info);
        self
    }
}

/// Everything a stream worker and its driver need to know about the stream.
#[derive(Clone)]
pub struct StreamContext {
    pub port_config_id: PortId,
    pub mix_port_id: PortId,
    pub direction: Direction,
    pub format: AudioFormat,
    pub channel_mask: ChannelLayout,
    pub sample_rate: u32,
    pub flags: IoFlags,
    pub frame_size: usize,
    pub buffer_size_frames: usize,
    pub latency: LatencyMetrics,
    pub transient_state_delay: Duration,
    pub vendor_debug: VendorDebug,
    pub queues: QueueConfig,
    pub callback: Option<CallbackHandle>,
    pub offload_info: Option<OffloadInfo>,
}

impl StreamContext {
    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn buffer_size_bytes(&self) -> usize {
        self.frame_size * self.buffer_size_frames
    }

    pub fn nominal_latency_ms(&self) -> i32 {
        i32::try_from(self.latency.nominal_ms).unwrap_or(i32::MAX)
    }

    pub fn stub_driver_config(&self) -> StubDriverConfig {
        StubDriverConfig {
            frame_size: self.frame_size,
            sample_rate: self.sample_rate,
            nominal_latency_ms: self.nominal_latency_ms(),
            is_input: self.is_input(),
            simulate_timing: true,
        }
    }
}
