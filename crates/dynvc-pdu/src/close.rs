use dynvc_core::{ensure_size, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

use crate::{ChannelId, Cmd, Header};

/// 2.2.4 Closing a DVC (DYNVC_CLOSE)
///
/// Sent by either peer, both to request a close and to confirm one.
///
/// [2.2.4]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/c02dfd21-ccbc-4254-985b-3ef6dd115dec
#[derive(Debug, PartialEq)]
pub struct ClosePdu {
    header: Header,
    pub channel_id: ChannelId,
}

impl ClosePdu {
    const NAME: &'static str = "DYNVC_CLOSE";

    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            header: Header::new(channel_id, 0, Cmd::Close),
            channel_id,
        }
    }

    pub(crate) fn decode(header: Header, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: header.cb_id().size_of_val());
        let channel_id = header.cb_id().decode_val(src)?;
        Ok(Self { header, channel_id })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        self.header.encode(dst)?;
        self.header.cb_id().encode_val(self.channel_id, dst)?;
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        Self::NAME
    }

    pub(crate) fn size(&self) -> usize {
        Header::size() + self.header.cb_id().size_of_val()
    }
}
