//! Module variants: the configuration table and the hooks that differ between
//! the primary, remote submix, stub, USB and Bluetooth modules.

use std::fmt;
use std::str::FromStr;

use hal_graph::{connection, AudioPort, AudioPortConfig, Configuration, DeviceType, PortExt};
use hal_io::{Driver, StubDriver};
use serde::{Deserialize, Serialize};

use crate::error::{HalError, Result};
use crate::latency::{BLUETOOTH_NOMINAL_LATENCY_MS, DEFAULT_NOMINAL_LATENCY_MS};
use crate::stream::StreamContext;
use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    #[default]
    Default,
    RSubmix,
    Stub,
    Usb,
    Bluetooth,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 5] = [
        ModuleKind::Default,
        ModuleKind::RSubmix,
        ModuleKind::Stub,
        ModuleKind::Usb,
        ModuleKind::Bluetooth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Default => "default",
            ModuleKind::RSubmix => "r_submix",
            ModuleKind::Stub => "stub",
            ModuleKind::Usb => "usb",
            ModuleKind::Bluetooth => "bluetooth",
        }
    }

    pub fn variant(self) -> Box<dyn ModuleVariant> {
        match self {
            ModuleKind::Default => Box::new(DefaultModule),
            ModuleKind::RSubmix => Box::new(RSubmixModule),
            ModuleKind::Stub => Box::new(StubModule),
            ModuleKind::Usb => Box::new(UsbModule),
            ModuleKind::Bluetooth => Box::new(BluetoothModule),
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleKind {
    type Err = HalError;

    fn from_str(value: &str) -> Result<Self> {
        ModuleKind::ALL
            .into_iter()
            .find(|kind| kind.name() == value)
            .ok_or_else(|| HalError::argument(format!("unknown module kind '{value}'")))
    }
}

/// Behaviour that a concrete module plugs into the routing coordinator.
///
/// Hooks run with the module lock held and must not call back into the module.
pub trait ModuleVariant: Send {
    fn kind(&self) -> ModuleKind;

    /// Port, route and initial config table. Asked for once, on first access.
    fn configuration(&self) -> Configuration;

    /// Fills the profiles of a device port that is about to be connected.
    fn populate_connected_device_port(&self, _port: &mut AudioPort) -> Result<()> {
        Ok(())
    }

    /// Extra checks on the endpoints of a patch before it is installed.
    fn check_patch_endpoints_match(
        &self,
        _sources: &[AudioPortConfig],
        _sinks: &[AudioPortConfig],
    ) -> Result<()> {
        Ok(())
    }

    fn on_external_device_connection_changed(&self, _port: &AudioPort, _connected: bool) {}

    fn on_prepare_to_disconnect_external_device(&self, _port: &AudioPort) {}

    fn nominal_latency_ms(&self, _config: &AudioPortConfig) -> u32 {
        DEFAULT_NOMINAL_LATENCY_MS
    }

    fn create_input_driver(&self, context: &StreamContext) -> Result<Box<dyn Driver>> {
        Ok(Box::new(StubDriver::new(context.stub_driver_config())))
    }

    fn create_output_driver(&self, context: &StreamContext) -> Result<Box<dyn Driver>> {
        Ok(Box::new(StubDriver::new(context.stub_driver_config())))
    }
}

/// Both sides must agree on format, channel mask and sample rate.
fn check_endpoints_agree(sources: &[AudioPortConfig], sinks: &[AudioPortConfig]) -> Result<()> {
    for source in sources {
        for sink in sinks {
            if source.format != sink.format
                || source.channel_mask != sink.channel_mask
                || source.sample_rate != sink.sample_rate
            {
                tracing::error!(
                    source_id = source.id,
                    sink_id = sink.id,
                    "patch endpoints do not match"
                );
                return Err(HalError::argument(format!(
                    "port configs {} and {} do not match",
                    source.id, sink.id
                )));
            }
        }
    }
    Ok(())
}

fn device_of(port: &AudioPort) -> Result<&hal_graph::AudioDevice> {
    match &port.ext {
        PortExt::Device(ext) => Ok(&ext.device),
        _ => Err(HalError::argument(format!("port {} is not a device port", port.id))),
    }
}

pub struct DefaultModule;

impl ModuleVariant for DefaultModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Default
    }

    fn configuration(&self) -> Configuration {
        tables::default_configuration()
    }
}

pub struct StubModule;

impl ModuleVariant for StubModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Stub
    }

    fn configuration(&self) -> Configuration {
        tables::stub_configuration()
    }
}

pub struct RSubmixModule;

impl ModuleVariant for RSubmixModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::RSubmix
    }

    fn configuration(&self) -> Configuration {
        tables::r_submix_configuration()
    }

    fn populate_connected_device_port(&self, port: &mut AudioPort) -> Result<()> {
        if port.profiles.is_empty() {
            port.profiles = tables::r_submix_profiles();
        }
        Ok(())
    }

    fn check_patch_endpoints_match(
        &self,
        sources: &[AudioPortConfig],
        sinks: &[AudioPortConfig],
    ) -> Result<()> {
        check_endpoints_agree(sources, sinks)
    }
}

/// Parses a USB address of the form `card=N;device=M`.
fn parse_usb_address(address: &str) -> Option<(u32, u32)> {
    let mut card = None;
    let mut device = None;
    for part in address.split(';') {
        let (key, value) = part.split_once('=')?;
        let value = value.trim().parse().ok()?;
        match key.trim() {
            "card" => card = Some(value),
            "device" => device = Some(value),
            _ => return None,
        }
    }
    Some((card?, device?))
}

pub struct UsbModule;

impl ModuleVariant for UsbModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Usb
    }

    fn configuration(&self) -> Configuration {
        tables::usb_configuration()
    }

    fn populate_connected_device_port(&self, port: &mut AudioPort) -> Result<()> {
        let device = device_of(port)?;
        let Some((card, device_number)) = parse_usb_address(&device.address) else {
            return Err(HalError::argument(format!(
                "invalid USB address '{}'",
                device.address
            )));
        };
        tracing::debug!(card, device = device_number, "probed USB device");
        port.profiles = tables::usb_profiles();
        Ok(())
    }

    fn check_patch_endpoints_match(
        &self,
        sources: &[AudioPortConfig],
        sinks: &[AudioPortConfig],
    ) -> Result<()> {
        check_endpoints_agree(sources, sinks)
    }

    fn on_external_device_connection_changed(&self, port: &AudioPort, connected: bool) {
        tracing::info!(port_id = port.id, connected, "USB device connection changed");
    }
}

pub struct BluetoothModule;

impl ModuleVariant for BluetoothModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Bluetooth
    }

    fn configuration(&self) -> Configuration {
        tables::bluetooth_configuration()
    }

    fn populate_connected_device_port(&self, port: &mut AudioPort) -> Result<()> {
        let device = device_of(port)?;
        if device.connection == connection::BT_A2DP {
            port.profiles = tables::a2dp_profiles();
        } else if device.kind == DeviceType::OutHearingAid
            && device.connection == connection::WIRELESS
        {
            port.profiles = tables::hearing_aid_profiles();
        } else {
            return Err(HalError::argument(format!(
                "unsupported Bluetooth device {:?} over '{}'",
                device.kind, device.connection
            )));
        }
        Ok(())
    }

    fn on_prepare_to_disconnect_external_device(&self, port: &AudioPort) {
        tracing::info!(port_id = port.id, "suspended Bluetooth session");
    }

    fn nominal_latency_ms(&self, _config: &AudioPortConfig) -> u32 {
        BLUETOOTH_NOMINAL_LATENCY_MS
    }
}
