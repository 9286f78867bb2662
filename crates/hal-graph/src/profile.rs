//! Profile resolution: default configs and validation of client requests.

use crate::error::{GraphError, Result};
use crate::model::{AudioFormat, AudioPort, AudioPortConfig, ChannelLayout};

/// Synthesizes the default config of `port`.
///
/// The first non-dynamic profile in declaration order wins and supplies its
/// first channel mask and first sample rate. Device ports without such a
/// profile get a zeroed dynamic config; mix ports fail.
pub fn resolve_default(port: &AudioPort) -> Result<AudioPortConfig> {
    let mut config = AudioPortConfig {
        port_id: port.id,
        flags: Some(port.flags),
        ext: port.ext.clone(),
        ..AudioPortConfig::default()
    };
    if let Some(profile) = port.profiles.iter().find(|profile| !profile.is_dynamic()) {
        config.format = Some(profile.format.clone());
        config.channel_mask = profile.channel_masks.first().copied();
        config.sample_rate = profile.sample_rates.first().copied();
        return Ok(config);
    }
    if port.is_device() {
        config.format = Some(AudioFormat::Default);
        config.channel_mask = Some(ChannelLayout::None);
        config.sample_rate = Some(0);
        return Ok(config);
    }
    tracing::error!(port_id = port.id, "port has no profile usable for a default config");
    Err(GraphError::NoDefaultConfig(port.id))
}

/// Result of merging a client request into a base config.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiation {
    pub suggested: AudioPortConfig,
    /// Every supplied field was acceptable.
    pub is_valid: bool,
    /// Flags, format, channel mask and sample rate were all supplied.
    pub is_fully_specified: bool,
}

/// Validates each supplied field of `requested` independently and merges the
/// acceptable ones into `base`.
///
/// A rejected field marks the request invalid without stopping the merge, so
/// the suggestion shows everything that would have been accepted.
pub fn negotiate(
    port: &AudioPort,
    base: AudioPortConfig,
    requested: &AudioPortConfig,
) -> Result<Negotiation> {
    let allow_dynamic = port.is_device();
    let mut suggested = base;
    let mut is_valid = true;
    let mut is_fully_specified = true;

    match requested.flags {
        Some(flags) if flags != port.flags => {
            tracing::warn!(port_id = port.id, ?flags, "requested flags do not match the port");
            is_valid = false;
        }
        Some(_) => {}
        None => is_fully_specified = false,
    }

    match &requested.format {
        Some(format) => {
            if (format.is_default() && allow_dynamic) || port.find_profile(format).is_some() {
                suggested.format = Some(format.clone());
            } else {
                tracing::warn!(
                    port_id = port.id,
                    ?format,
                    "requested format is not in the port profiles"
                );
                is_valid = false;
            }
        }
        None => is_fully_specified = false,
    }

    let format = suggested.format.clone().unwrap_or_default();
    let profile = port.find_profile(&format);
    if profile.is_none() && !allow_dynamic {
        tracing::error!(port_id = port.id, ?format, "port does not support the format anymore");
        return Err(GraphError::FormatNoLongerSupported { port: port.id });
    }

    match requested.channel_mask {
        Some(mask) => {
            let supported = profile.map_or(false, |p| p.channel_masks.contains(&mask));
            if (mask == ChannelLayout::None && allow_dynamic) || supported {
                suggested.channel_mask = Some(mask);
            } else {
                tracing::warn!(
                    port_id = port.id,
                    ?mask,
                    "requested channel mask is not supported for the format"
                );
                is_valid = false;
            }
        }
        None => is_fully_specified = false,
    }

    match requested.sample_rate {
        Some(rate) => {
            let supported = profile.map_or(false, |p| p.sample_rates.contains(&rate));
            if (rate == 0 && allow_dynamic) || supported {
                suggested.sample_rate = Some(rate);
            } else {
                tracing::warn!(
                    port_id = port.id,
                    rate,
                    "requested sample rate is not supported for the format"
                );
                is_valid = false;
            }
        }
        None => is_fully_specified = false,
    }

    if let Some(gain) = &requested.gain {
        // Gain is never rejected.
        suggested.gain = Some(gain.clone());
    }

    Ok(Negotiation {
        suggested,
        is_valid,
        is_fully_specified,
    })
}

/// True when `config` only carries values drawn from one profile of `port`.
pub fn config_matches_port(port: &AudioPort, config: &AudioPortConfig) -> bool {
    let (Some(format), Some(mask), Some(rate)) =
        (&config.format, config.channel_mask, config.sample_rate)
    else {
        return false;
    };
    port.profiles.iter().any(|profile| {
        &profile.format == format
            && profile.channel_masks.contains(&mask)
            && profile.sample_rates.contains(&rate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioProfile, IoFlags, MixPortExt, PortExt};

    fn mix_port(profiles: Vec<AudioProfile>) -> AudioPort {
        AudioPort {
            id: 7,
            name: "mix".into(),
            flags: IoFlags::Output(0),
            profiles,
            ext: PortExt::Mix(MixPortExt::default()),
        }
    }

    #[test]
    fn first_static_profile_wins_positionally() {
        let port = mix_port(vec![
            AudioProfile::new(AudioFormat::PCM_16, &[], &[48_000]),
            AudioProfile::new(
                AudioFormat::PCM_24,
                &[ChannelLayout::STEREO, ChannelLayout::MONO],
                &[44_100, 48_000],
            ),
            AudioProfile::new(AudioFormat::PCM_FLOAT, &[ChannelLayout::STEREO], &[96_000]),
        ]);
        let config = resolve_default(&port).unwrap();
        assert_eq!(config.format, Some(AudioFormat::PCM_24));
        assert_eq!(config.channel_mask, Some(ChannelLayout::STEREO));
        assert_eq!(config.sample_rate, Some(44_100));
        assert_eq!(config.port_id, 7);
    }

    #[test]
    fn dynamic_mix_port_has_no_default() {
        let port = mix_port(Vec::new());
        assert_eq!(resolve_default(&port), Err(GraphError::NoDefaultConfig(7)));
    }

    #[test]
    fn partial_request_reports_unspecified_fields() {
        let port = mix_port(vec![AudioProfile::new(
            AudioFormat::PCM_16,
            &[ChannelLayout::MONO, ChannelLayout::STEREO],
            &[16_000, 48_000],
        )]);
        let base = resolve_default(&port).unwrap();
        let requested = AudioPortConfig {
            port_id: 7,
            sample_rate: Some(16_000),
            ..AudioPortConfig::default()
        };
        let outcome = negotiate(&port, base, &requested).unwrap();
        assert!(outcome.is_valid);
        assert!(!outcome.is_fully_specified);
        assert_eq!(outcome.suggested.sample_rate, Some(16_000));
    }
}
