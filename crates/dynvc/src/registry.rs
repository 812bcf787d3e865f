use std::collections::BTreeMap;

use slab::Slab;

use dynvc_pdu::ChannelId;

use crate::channel::{Channel, ChannelState, SharedCallback};
use crate::{DvcError, DvcErrorExt as _, DvcResult};

/// Channel id → channel state, plus server-side id allocation.
///
/// One registry per connection, guarded by the connection's mutex. All
/// operations are O(log n) map manipulation; plugin callbacks are never
/// invoked from in here — lookups hand out [`SharedCallback`] clones for the
/// caller to drive once the lock is dropped.
pub(crate) struct ChannelRegistry {
    channels: BTreeMap<ChannelId, Channel>,
    /// Ids handed out by the server side. Reclaimed only once CLOSE completes.
    ids: Slab<()>,
    /// Creation order, for reverse-order teardown.
    order: Vec<ChannelId>,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            ids: Slab::new(),
            order: Vec::new(),
        }
    }

    /// Registers a channel under `id`. At most one channel per id may exist.
    pub(crate) fn insert(&mut self, channel: Channel) -> DvcResult<()> {
        let id = channel.id;
        if self.channels.contains_key(&id) {
            return Err(DvcError::duplicate_channel("ChannelRegistry::insert", id));
        }
        self.channels.insert(id, channel);
        self.order.push(id);
        Ok(())
    }

    pub(crate) fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    /// Releases the channel, returning its callback for the final `on_close`.
    pub(crate) fn remove(&mut self, id: ChannelId) -> Option<(ChannelState, Option<SharedCallback>)> {
        let channel = self.channels.remove(&id)?;
        self.order.retain(|&existing| existing != id);
        Some((channel.state, channel.callback))
    }

    /// Snapshot of currently open channel ids, in creation order.
    pub(crate) fn list_open(&self) -> Vec<ChannelId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.channels.get(id).is_some_and(Channel::is_open))
            .collect()
    }

    /// Snapshot of every live channel id, in creation order.
    pub(crate) fn list_all(&self) -> Vec<ChannelId> {
        self.order.clone()
    }

    /// Allocates a fresh server-side channel id.
    ///
    /// Id zero is valid on the wire but never produced by the allocator, so
    /// the slab index is offset by one.
    pub(crate) fn allocate_id(&mut self) -> ChannelId {
        let index = self.ids.insert(());
        u32::try_from(index).unwrap_or(u32::MAX).wrapping_add(1)
    }

    /// Returns a previously allocated id to the pool.
    pub(crate) fn release_id(&mut self, id: ChannelId) {
        let Some(index) = id.checked_sub(1) else {
            return;
        };
        let index = index as usize;
        if self.ids.contains(index) {
            self.ids.remove(index);
        }
    }
}
