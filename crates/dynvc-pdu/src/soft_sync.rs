use bitflags::bitflags;
use dynvc_core::{cast_length, ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

use crate::{ChannelId, Cmd, Header};

bitflags! {
    /// Flags of a DYNVC_SOFT_SYNC_REQUEST.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SoftSyncFlags: u16 {
        /// All in-flight TCP data has been flushed before the switch.
        const TCP_FLUSHED = 0x0001;
        /// One or more channel lists follow the fixed part.
        const CHANNEL_LIST_PRESENT = 0x0002;
    }
}

/// Transport tunnel selector used during soft-sync channel migration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TunnelType(pub u32);

impl TunnelType {
    pub const UDP_FECR: Self = Self(0x0000_0001);
    pub const UDP_FECL: Self = Self(0x0000_0003);
}

/// One DYNVC_SOFT_SYNC_CHANNEL_LIST: the channels to migrate onto a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftSyncChannelList {
    pub tunnel_type: TunnelType,
    pub channel_ids: Vec<ChannelId>,
}

impl SoftSyncChannelList {
    const NAME: &'static str = "DYNVC_SOFT_SYNC_CHANNEL_LIST";

    const FIXED_PART_SIZE: usize = 4 /* TunnelType */ + 2 /* NumberOfDVCs */;

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: Self::FIXED_PART_SIZE);
        let tunnel_type = TunnelType(src.read_u32());
        let count = usize::from(src.read_u16());
        ensure_size!(in: src, size: count * 4);
        let mut channel_ids = Vec::with_capacity(count);
        for _ in 0..count {
            channel_ids.push(src.read_u32());
        }
        Ok(Self {
            tunnel_type,
            channel_ids,
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        dst.write_u32(self.tunnel_type.0);
        dst.write_u16(cast_length!("NumberOfDVCs", self.channel_ids.len())?);
        for id in &self.channel_ids {
            dst.write_u32(*id);
        }
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.channel_ids.len() * 4
    }
}

/// 2.2.5.1 Soft-Sync Request PDU (DYNVC_SOFT_SYNC_REQUEST)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftSyncRequestPdu {
    pub flags: SoftSyncFlags,
    pub channel_lists: Vec<SoftSyncChannelList>,
}

impl SoftSyncRequestPdu {
    const NAME: &'static str = "DYNVC_SOFT_SYNC_REQUEST";

    const HEADERLESS_FIXED_PART_SIZE: usize = 1 /* Pad */ + 4 /* Length */ + 2 /* Flags */ + 2 /* NumberOfTunnels */;

    pub fn new(flags: SoftSyncFlags, channel_lists: Vec<SoftSyncChannelList>) -> Self {
        Self { flags, channel_lists }
    }

    pub(crate) fn decode(_header: Header, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: Self::HEADERLESS_FIXED_PART_SIZE);
        let _pad = src.read_u8();
        let length = src.read_u32();
        let flags = SoftSyncFlags::from_bits_truncate(src.read_u16());
        let tunnel_count = usize::from(src.read_u16());

        let mut channel_lists = Vec::with_capacity(tunnel_count);
        if flags.contains(SoftSyncFlags::CHANNEL_LIST_PRESENT) {
            for _ in 0..tunnel_count {
                channel_lists.push(SoftSyncChannelList::decode(src)?);
            }
        }

        let pdu = Self { flags, channel_lists };
        if length as usize != pdu.size() {
            return Err(invalid_field_err(Self::NAME, "Length", "does not match PDU size"));
        }
        Ok(pdu)
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        Header::new(0, 0, Cmd::SoftSyncRequest).encode(dst)?;
        dst.write_u8(0x00); // Pad
        dst.write_u32(cast_length!("Length", self.size())?);
        dst.write_u16(self.flags.bits());
        dst.write_u16(cast_length!("NumberOfTunnels", self.channel_lists.len())?);
        for list in &self.channel_lists {
            list.encode(dst)?;
        }
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        Self::NAME
    }

    pub(crate) fn size(&self) -> usize {
        Header::FIXED_PART_SIZE
            + Self::HEADERLESS_FIXED_PART_SIZE
            + self.channel_lists.iter().map(SoftSyncChannelList::size).sum::<usize>()
    }
}

/// 2.2.5.2 Soft-Sync Response PDU (DYNVC_SOFT_SYNC_RESPONSE)
///
/// Echoes, in order, the tunnel types the sender switched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftSyncResponsePdu {
    pub tunnels_to_switch: Vec<TunnelType>,
}

impl SoftSyncResponsePdu {
    const NAME: &'static str = "DYNVC_SOFT_SYNC_RESPONSE";

    const HEADERLESS_FIXED_PART_SIZE: usize = 1 /* Pad */ + 4 /* NumberOfTunnels */;

    pub fn new(tunnels_to_switch: Vec<TunnelType>) -> Self {
        Self { tunnels_to_switch }
    }

    pub(crate) fn decode(_header: Header, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: Self::HEADERLESS_FIXED_PART_SIZE);
        let _pad = src.read_u8();
        let count = src.read_u32() as usize;
        ensure_size!(in: src, size: count * 4);
        let mut tunnels_to_switch = Vec::with_capacity(count);
        for _ in 0..count {
            tunnels_to_switch.push(TunnelType(src.read_u32()));
        }
        Ok(Self { tunnels_to_switch })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        Header::new(0, 0, Cmd::SoftSyncResponse).encode(dst)?;
        dst.write_u8(0x00); // Pad
        dst.write_u32(cast_length!("NumberOfTunnels", self.tunnels_to_switch.len())?);
        for tunnel in &self.tunnels_to_switch {
            dst.write_u32(tunnel.0);
        }
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        Self::NAME
    }

    pub(crate) fn size(&self) -> usize {
        Header::FIXED_PART_SIZE + Self::HEADERLESS_FIXED_PART_SIZE + self.tunnels_to_switch.len() * 4
    }
}
