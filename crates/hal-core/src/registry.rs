use std::sync::{Arc, Weak};

use hal_graph::PortId;

use crate::stream::StreamSession;

struct Entry {
    port_config_id: PortId,
    mix_port_id: PortId,
    session: Weak<StreamSession>,
}

/// Weak references to the streams opened by a module, keyed by port config.
///
/// Entries of closed or dropped sessions are ignored and pruned on insert.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    entries: Vec<Entry>,
}

impl StreamRegistry {
    pub(crate) fn insert(&mut self, session: &Arc<StreamSession>) {
        self.entries.retain(|entry| live(entry).is_some());
        self.entries.push(Entry {
            port_config_id: session.port_config_id(),
            mix_port_id: session.context().mix_port_id,
            session: Arc::downgrade(session),
        });
    }

    pub(crate) fn streams_for_config(&self, port_config_id: PortId) -> Vec<Arc<StreamSession>> {
        self.entries
            .iter()
            .filter(|entry| entry.port_config_id == port_config_id)
            .filter_map(live)
            .collect()
    }

    pub(crate) fn has_open_stream(&self, port_config_id: PortId) -> bool {
        !self.streams_for_config(port_config_id).is_empty()
    }

    pub(crate) fn open_count_for_mix(&self, mix_port_id: PortId) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.mix_port_id == mix_port_id)
            .filter_map(live)
            .count()
    }
}

fn live(entry: &Entry) -> Option<Arc<StreamSession>> {
    entry.session.upgrade().filter(|session| !session.is_closed())
}
