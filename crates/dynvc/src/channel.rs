use std::sync::{Arc, Mutex};

use dynvc_pdu::ChannelId;

use crate::plugin::ChannelCallback;
use crate::reassembly::Reassembly;

/// Per-channel lifecycle.
///
/// ```text
///            CREATE accepted
/// Announcing ───────────────► Open ───► Closing ───► Closed
///     │                        │
///     │ CREATE rejected        │ reassembly / plugin error
///     ▼                        ▼
///   Closed                   Failed
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// CREATE seen (or sent), outcome not yet settled.
    Announcing,
    /// Data may flow in both directions.
    Open,
    /// A local CLOSE went out; waiting for the peer to confirm.
    Closing,
    Closed,
    /// Condemned by a per-channel error; a CLOSE went out.
    Failed,
}

pub(crate) type SharedCallback = Arc<Mutex<Box<dyn ChannelCallback>>>;

/// One live dynamic channel.
///
/// Owned by the [`ChannelRegistry`](crate::ChannelRegistry); the callback
/// object is shared with the dispatch code through an `Arc` so that it can be
/// invoked after the registry lock is released.
pub(crate) struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) name: String,
    pub(crate) state: ChannelState,
    pub(crate) reassembly: Reassembly,
    pub(crate) callback: Option<SharedCallback>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, name: String, callback: Box<dyn ChannelCallback>) -> Self {
        Self {
            id,
            name,
            state: ChannelState::Announcing,
            reassembly: Reassembly::new(),
            callback: Some(Arc::new(Mutex::new(callback))),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// The callback handle, cloned for invocation outside the registry lock.
    pub(crate) fn callback(&self) -> Option<SharedCallback> {
        self.callback.clone()
    }
}

impl core::fmt::Debug for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
