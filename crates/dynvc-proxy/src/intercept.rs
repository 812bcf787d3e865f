use dynvc_pdu::ChannelId;

/// Which way a PDU is travelling through the proxy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Verdict returned by [`DvcInterceptor::dyn_channel_intercept`].
#[derive(Debug, PartialEq, Eq)]
pub enum InterceptResult {
    /// Forward the fragment unchanged.
    Pass,
    /// Suppress the fragment (and, on a first fragment, the rest of its
    /// message).
    Drop,
    /// Replace the fragment's payload before forwarding.
    Rewrite(Vec<u8>),
}

/// Proxy policy hooks.
///
/// `static_channel_to_intercept` decides whether DRDYNVC terminates at the
/// proxy at all; once it does, `dyn_channel_to_intercept` is asked once per
/// CREATE and `dyn_channel_intercept` once per data fragment, both
/// directions.
pub trait DvcInterceptor: Send {
    /// Whether the named static channel should terminate at the proxy
    /// rather than pass through raw. Only `drdynvc` is meaningful here.
    fn static_channel_to_intercept(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case("drdynvc")
    }

    /// Whether the named dynamic channel should be intercepted.
    fn dyn_channel_to_intercept(&self, name: &str) -> bool;

    /// Per-fragment verdict for an intercepted channel.
    fn dyn_channel_intercept(
        &mut self,
        direction: Direction,
        name: &str,
        data: &[u8],
        is_first: bool,
    ) -> InterceptResult;
}

dynvc_core::assert_obj_safe!(DvcInterceptor);

/// Bookkeeping for a multi-fragment message being silently dropped.
///
/// Recorded when [`InterceptResult::Drop`] is returned for the first
/// fragment of a fragmented message; subsequent DATA PDUs on the channel are
/// consumed without forwarding until `skipped` reaches `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionEntry {
    pub channel_id: ChannelId,
    /// Total announced by the dropped DATA_FIRST.
    pub total: usize,
    /// Payload bytes consumed so far, the dropped first fragment included.
    pub skipped: usize,
}

impl InterceptionEntry {
    pub(crate) fn new(channel_id: ChannelId, total: usize, skipped: usize) -> Self {
        Self {
            channel_id,
            total,
            skipped,
        }
    }

    /// Consumes one more fragment; true once the whole message was skipped.
    pub(crate) fn consume(&mut self, len: usize) -> bool {
        self.skipped = self.skipped.saturating_add(len);
        self.skipped >= self.total
    }
}
