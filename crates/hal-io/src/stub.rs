use std::thread;
use std::time::Duration;

use hal_graph::AudioDevice;
use hal_rt::DrainMode;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{Driver, DriverError, Result, Transfer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubDriverConfig {
    pub frame_size: usize,
    pub sample_rate: u32,
    pub nominal_latency_ms: i32,
    /// Capture drivers produce data, playback drivers consume it.
    pub is_input: bool,
    /// Sleep for the real-time duration of each transfer.
    pub simulate_timing: bool,
}

impl Default for StubDriverConfig {
    fn default() -> Self {
        Self {
            frame_size: 4,
            sample_rate: 48_000,
            nominal_latency_ms: 10,
            is_input: false,
            simulate_timing: true,
        }
    }
}

/// Simulated driver: produces noise on capture and swallows data on playback,
/// pacing itself like a device running at the configured sample rate.
pub struct StubDriver {
    config: StubDriverConfig,
    initialized: bool,
    devices: Vec<AudioDevice>,
}

impl StubDriver {
    pub fn new(config: StubDriverConfig) -> Self {
        Self {
            config,
            initialized: false,
            devices: Vec::new(),
        }
    }

    pub fn connected_devices(&self) -> &[AudioDevice] {
        &self.devices
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(DriverError::NotInitialized)
        }
    }
}

impl Driver for StubDriver {
    fn init(&mut self) -> Result<()> {
        if self.config.frame_size == 0 {
            return Err(DriverError::Status(crate::STATUS_NO_INIT));
        }
        self.initialized = true;
        Ok(())
    }

    fn drain(&mut self, mode: DrainMode) -> Result<()> {
        tracing::trace!(?mode, "stub drain");
        self.ensure_initialized()
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_initialized()
    }

    fn pause(&mut self) -> Result<()> {
        self.ensure_initialized()
    }

    fn standby(&mut self) -> Result<()> {
        self.ensure_initialized()
    }

    fn start(&mut self) -> Result<()> {
        self.ensure_initialized()
    }

    fn transfer(&mut self, buffer: &mut [u8], frame_count: usize) -> Result<Transfer> {
        self.ensure_initialized()?;
        let frames = frame_count.min(buffer.len() / self.config.frame_size);
        if self.config.is_input {
            rand::thread_rng().fill_bytes(&mut buffer[..frames * self.config.frame_size]);
        }
        if self.config.simulate_timing && self.config.sample_rate > 0 && frames > 0 {
            let micros = frames as u64 * 1_000_000 / u64::from(self.config.sample_rate);
            thread::sleep(Duration::from_micros(micros));
        }
        Ok(Transfer {
            actual_frames: frames,
            latency_ms: self.config.nominal_latency_ms,
        })
    }

    fn set_connected_devices(&mut self, devices: &[AudioDevice]) -> Result<()> {
        self.devices = devices.to_vec();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        self.devices.clear();
    }
}
