pub const DEFAULT_NOMINAL_LATENCY_MS: u32 = 10;
pub const BLUETOOTH_NOMINAL_LATENCY_MS: u32 = 200;

/// Upper bound on the data queue of a single stream.
pub const MAX_STREAM_BUFFER_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyMetrics {
    pub nominal_ms: u32,
    /// Smallest buffer that holds one nominal period, rounded up to whole frames.
    pub minimum_buffer_frames: usize,
    /// Duration of the buffer the stream was opened with.
    pub buffer_ms: f32,
}

impl LatencyMetrics {
    pub fn new(sample_rate: u32, nominal_ms: u32, buffer_frames: usize) -> Self {
        let minimum = hal_graph::patch::buffer_size_frames(nominal_ms, sample_rate);
        let buffer_ms = if sample_rate == 0 {
            0.0
        } else {
            buffer_frames as f32 / sample_rate as f32 * 1000.0
        };
        Self {
            nominal_ms,
            minimum_buffer_frames: usize::try_from(minimum).unwrap_or(0),
            buffer_ms,
        }
    }
}
