use dynvc_pdu::ChannelId;

use crate::{DvcError, DvcErrorExt as _, DvcResult};

/// Reassembles a fragmented DATA_FIRST + DATA sequence into one message.
///
/// `total` is the length announced by the last DATA_FIRST; the message is
/// complete when the accumulated buffer reaches it exactly. Overrunning it is
/// a protocol violation that condemns the channel.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Reassembly {
    total: usize,
    buffer: Vec<u8>,
}

impl Reassembly {
    pub(crate) fn new() -> Self {
        Self {
            total: 0,
            buffer: Vec::new(),
        }
    }

    /// Whether a DATA_FIRST sequence is currently in flight.
    pub(crate) fn in_progress(&self) -> bool {
        self.total != 0 || !self.buffer.is_empty()
    }

    /// Handles a DATA_FIRST fragment announcing `total_length` message bytes.
    pub(crate) fn process_first(
        &mut self,
        id: ChannelId,
        total_length: usize,
        chunk: &[u8],
    ) -> DvcResult<Option<Vec<u8>>> {
        if self.in_progress() {
            warn!(channel_id = id, "DATA_FIRST interrupted an incomplete message; dropping it");
            self.reset();
        }

        if chunk.len() > total_length {
            self.reset();
            return Err(DvcError::reassembly_mismatch("Reassembly::process_first", id));
        }

        if chunk.len() == total_length {
            // Message fits a single DATA_FIRST; a zero-length announcement
            // completes right away with an empty message.
            return Ok(Some(chunk.to_vec()));
        }

        self.total = total_length;
        self.buffer = chunk.to_vec();
        Ok(None)
    }

    /// Handles a DATA fragment.
    ///
    /// Without a DATA_FIRST in flight the chunk is a complete standalone
    /// message and is returned as-is.
    pub(crate) fn process_next(&mut self, id: ChannelId, chunk: &[u8]) -> DvcResult<Option<Vec<u8>>> {
        if !self.in_progress() {
            return Ok(Some(chunk.to_vec()));
        }

        let Some(accumulated) = self.buffer.len().checked_add(chunk.len()) else {
            self.reset();
            return Err(DvcError::reassembly_mismatch("Reassembly::process_next", id));
        };

        if accumulated > self.total {
            self.reset();
            return Err(DvcError::reassembly_mismatch("Reassembly::process_next", id));
        }

        self.buffer.extend_from_slice(chunk);

        if accumulated == self.total {
            self.total = 0;
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.total = 0;
        self.buffer.clear();
    }
}
