//! Patch validation rules and the reverse index from ports to patches.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GraphError, Result};
use crate::model::{AudioPatch, AudioPortConfig, AudioRoute};
use crate::store::Configuration;
use crate::{PatchId, PortId};

/// Multimap from port ids and port config ids to the patches that use them.
///
/// Cloning is the rollback mechanism: take a snapshot before mutating and
/// assign it back on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchIndex {
    entries: BTreeMap<PortId, BTreeSet<PatchId>>,
}

impl PatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every source and sink config of `patch` and their owning ports.
    pub fn register(&mut self, patch: &AudioPatch, configs: &[AudioPortConfig]) {
        for config_id in patch.port_config_ids() {
            let Some(config) = configs.iter().find(|config| config.id == config_id) else {
                continue;
            };
            self.entries.entry(config_id).or_default().insert(patch.id);
            if config.port_id != config_id {
                self.entries.entry(config.port_id).or_default().insert(patch.id);
            }
        }
    }

    /// Drops every entry that points at `patch_id`.
    pub fn unregister(&mut self, patch_id: PatchId) {
        self.entries.retain(|_, patches| {
            patches.remove(&patch_id);
            !patches.is_empty()
        });
    }

    pub fn contains(&self, id: PortId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn patches_for(&self, id: PortId) -> impl Iterator<Item = PatchId> + '_ {
        self.entries.get(&id).into_iter().flatten().copied()
    }

    pub fn first_patch_for(&self, id: PortId) -> Option<PatchId> {
        self.patches_for(id).next()
    }

    /// Flattened `(id, patch)` pairs in key order.
    pub fn pairs(&self) -> BTreeSet<(PortId, PatchId)> {
        self.entries
            .iter()
            .flat_map(|(&id, patches)| patches.iter().map(move |&patch| (id, patch)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rejects empty lists and duplicate ids in a patch request.
pub fn validate_patch_request(patch: &AudioPatch) -> Result<()> {
    check_id_list("sources", &patch.source_port_config_ids)?;
    check_id_list("sinks", &patch.sink_port_config_ids)
}

fn check_id_list(what: &str, ids: &[PortId]) -> Result<()> {
    if ids.is_empty() {
        return Err(GraphError::InvalidRequest(format!("requested patch has empty {what} list")));
    }
    let unique: BTreeSet<_> = ids.iter().collect();
    if unique.len() != ids.len() {
        return Err(GraphError::InvalidRequest(format!(
            "requested patch has duplicate ids in the {what} list"
        )));
    }
    Ok(())
}

/// Sink ports reachable from the owning ports of `sources`.
///
/// The flag is true when at least one reaching route is non-exclusive.
pub fn allowed_sink_ports(
    routes: &[AudioRoute],
    sources: &[AudioPortConfig],
) -> BTreeMap<PortId, bool> {
    let mut allowed = BTreeMap::new();
    for source in sources {
        for route in routes.iter().filter(|r| r.source_port_ids.contains(&source.port_id)) {
            let non_exclusive = allowed.entry(route.sink_port_id).or_insert(false);
            *non_exclusive |= !route.is_exclusive;
        }
    }
    allowed
}

/// Checks that every sink is routable and that no sink reachable from the
/// sources only through exclusive routes is claimed by a patch still present
/// in `index`.
pub fn check_sinks(
    allowed: &BTreeMap<PortId, bool>,
    sinks: &[AudioPortConfig],
    index: &PatchIndex,
) -> Result<()> {
    for sink in sinks {
        if !allowed.contains_key(&sink.port_id) {
            return Err(GraphError::NoRoute(sink.port_id));
        }
    }
    for (&port_id, &non_exclusive) in allowed {
        if !non_exclusive && index.contains(port_id) {
            tracing::error!(sink_port_id = port_id, "exclusive sink port is in use");
            return Err(GraphError::ExclusiveSinkInUse(port_id));
        }
    }
    Ok(())
}

/// Picks the config whose sample rate drives the patch latency.
///
/// Mix configs on the side indicated by the first source are preferred; when that
/// side has none, every participant is considered.
pub fn latency_reference<'a>(
    sources: &'a [AudioPortConfig],
    sinks: &'a [AudioPortConfig],
) -> Option<&'a AudioPortConfig> {
    let mix_side = match sources.first() {
        Some(first) if first.ext.is_mix() => sources,
        _ => sinks,
    };
    let highest = |configs: &'a [AudioPortConfig], mix_only: bool| {
        configs
            .iter()
            .filter(|config| !mix_only || config.ext.is_mix())
            .max_by_key(|config| config.sample_rate.unwrap_or(0))
    };
    highest(mix_side, true).or_else(|| {
        sources
            .iter()
            .chain(sinks.iter())
            .max_by_key(|config| config.sample_rate.unwrap_or(0))
    })
}

/// Frames needed to hold `latency_ms` of audio at `sample_rate`, rounded up.
pub fn buffer_size_frames(latency_ms: u32, sample_rate: u32) -> i32 {
    let frames = (u64::from(latency_ms) * u64::from(sample_rate)).div_ceil(1000);
    i32::try_from(frames).unwrap_or(i32::MAX)
}

/// Port config ids at the other end of every patch that uses `port_config_id`.
pub fn connected_port_config_ids(
    config: &Configuration,
    index: &PatchIndex,
    port_config_id: PortId,
) -> Result<BTreeSet<PortId>> {
    let mut result = BTreeSet::new();
    for patch_id in index.patches_for(port_config_id) {
        let patch = config.patch(patch_id)?;
        if patch.source_port_config_ids.contains(&port_config_id) {
            result.extend(patch.sink_port_config_ids.iter().copied());
        } else {
            result.extend(patch.source_port_config_ids.iter().copied());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MixPortExt, PortExt};

    fn config(id: PortId, port_id: PortId, rate: u32, mix: bool) -> AudioPortConfig {
        AudioPortConfig {
            id,
            port_id,
            sample_rate: Some(rate),
            ext: if mix { PortExt::Mix(MixPortExt::default()) } else { PortExt::Unspecified },
            ..AudioPortConfig::default()
        }
    }

    #[test]
    fn non_exclusive_route_wins() {
        let routes = vec![
            AudioRoute::new(&[1], 10).exclusive(),
            AudioRoute::new(&[2], 10),
            AudioRoute::new(&[1], 11).exclusive(),
        ];
        let sources = vec![config(100, 1, 48_000, true), config(101, 2, 48_000, true)];
        let allowed = allowed_sink_ports(&routes, &sources);
        assert_eq!(allowed.get(&10), Some(&true));
        assert_eq!(allowed.get(&11), Some(&false));
    }

    #[test]
    fn claimed_exclusive_sink_blocks_every_sink_of_the_source() {
        let routes = vec![AudioRoute::new(&[1], 10).exclusive(), AudioRoute::new(&[1], 11)];
        let sources = vec![config(100, 1, 48_000, true)];
        let allowed = allowed_sink_ports(&routes, &sources);
        let shared = vec![config(111, 11, 48_000, false)];

        let mut index = PatchIndex::new();
        assert_eq!(check_sinks(&allowed, &shared, &index), Ok(()));
        let configs = vec![sources[0].clone(), config(110, 10, 48_000, false)];
        let patch = AudioPatch {
            id: 1,
            ..AudioPatch::new(&[100], &[110])
        };
        index.register(&patch, &configs);
        assert_eq!(
            check_sinks(&allowed, &shared, &index),
            Err(GraphError::ExclusiveSinkInUse(10))
        );
    }

    #[test]
    fn buffer_size_rounds_up() {
        assert_eq!(buffer_size_frames(10, 48_000), 480);
        assert_eq!(buffer_size_frames(10, 44_100), 441);
        assert_eq!(buffer_size_frames(3, 11_025), 34);
        assert_eq!(buffer_size_frames(10, 0), 0);
    }

    #[test]
    fn latency_reference_prefers_highest_mix_rate() {
        let sources = vec![config(1, 1, 16_000, true), config(2, 2, 48_000, true)];
        let sinks = vec![config(3, 3, 96_000, false)];
        assert_eq!(latency_reference(&sources, &sinks).map(|c| c.id), Some(2));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let patch = AudioPatch::new(&[1, 1], &[2]);
        assert!(matches!(validate_patch_request(&patch), Err(GraphError::InvalidRequest(_))));
        let patch = AudioPatch::new(&[1], &[]);
        assert!(validate_patch_request(&patch).is_err());
    }
}
