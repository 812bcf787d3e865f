use dynvc_core::{ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

use crate::{ChannelId, Cmd, Header};

/// Longest channel name accepted on the wire, NUL terminator included.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 255;

/// 2.2.2.1 DVC Create Request PDU (DYNVC_CREATE_REQ)
///
/// [2.2.2.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/4448ba4d-9a72-429f-8b65-6f4ec44f2985
#[derive(Debug, PartialEq)]
pub struct CreateRequestPdu {
    header: Header,
    pub channel_id: ChannelId,
    pub channel_name: String,
}

impl CreateRequestPdu {
    const NAME: &'static str = "DYNVC_CREATE_REQ";

    pub fn new(channel_id: ChannelId, channel_name: String) -> Self {
        Self {
            header: Header::new(channel_id, 0, Cmd::Create),
            channel_id,
            channel_name,
        }
    }

    pub(crate) fn decode(header: Header, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: header.cb_id().size_of_val());
        let channel_id = header.cb_id().decode_val(src)?;
        let channel_name = read_channel_name(src)?;
        Ok(Self {
            header,
            channel_id,
            channel_name,
        })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        self.header.encode(dst)?;
        self.header.cb_id().encode_val(self.channel_id, dst)?;
        dst.write_slice(self.channel_name.as_bytes());
        dst.write_u8(0); // NUL terminator
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        Self::NAME
    }

    pub(crate) fn size(&self) -> usize {
        Header::size() +
        self.header.cb_id().size_of_val() + // ChannelId
        self.channel_name.len() + 1 // ChannelName + NUL terminator
    }
}

/// Reads a NUL-terminated UTF-8 channel name.
///
/// An empty name and a name past [`MAX_CHANNEL_NAME_LENGTH`] are both
/// protocol violations.
fn read_channel_name(src: &mut ReadCursor<'_>) -> DecodeResult<String> {
    let remaining = src.remaining();
    let nul = remaining
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| invalid_field_err("DYNVC_CREATE_REQ", "ChannelName", "missing NUL terminator"))?;

    if nul == 0 {
        return Err(invalid_field_err("DYNVC_CREATE_REQ", "ChannelName", "empty name"));
    }

    if nul + 1 > MAX_CHANNEL_NAME_LENGTH {
        return Err(invalid_field_err("DYNVC_CREATE_REQ", "ChannelName", "name too long"));
    }

    let name = core::str::from_utf8(&remaining[..nul])
        .map_err(|_| invalid_field_err("DYNVC_CREATE_REQ", "ChannelName", "not valid UTF-8"))?
        .to_owned();

    src.advance(nul + 1);
    Ok(name)
}

/// 2.2.2.2 DVC Create Response PDU (DYNVC_CREATE_RSP)
///
/// [2.2.2.2]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/8f284ea3-54f3-4c24-8168-8a001c63b581
#[derive(Debug, PartialEq)]
pub struct CreateResponsePdu {
    header: Header,
    pub channel_id: ChannelId,
    pub creation_status: CreationStatus,
}

impl CreateResponsePdu {
    const NAME: &'static str = "DYNVC_CREATE_RSP";

    pub fn new(channel_id: ChannelId, creation_status: CreationStatus) -> Self {
        Self {
            header: Header::new(channel_id, 0, Cmd::Create),
            channel_id,
            creation_status,
        }
    }

    pub(crate) fn decode(header: Header, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: header.cb_id().size_of_val() + CreationStatus::size());
        let channel_id = header.cb_id().decode_val(src)?;
        let creation_status = CreationStatus(src.read_u32());
        Ok(Self {
            header,
            channel_id,
            creation_status,
        })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        self.header.encode(dst)?;
        self.header.cb_id().encode_val(self.channel_id, dst)?;
        self.creation_status.encode(dst)?;
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        Self::NAME
    }

    pub(crate) fn size(&self) -> usize {
        Header::size() +
        self.header.cb_id().size_of_val() + // ChannelId
        CreationStatus::size() // CreationStatus
    }
}

/// Status carried by a CREATE_RESPONSE; zero means the channel was accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CreationStatus(pub u32);

impl CreationStatus {
    pub const OK: Self = Self(0x00000000);
    pub const NO_LISTENER: Self = Self(0xC0000001);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    fn encode(self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        dst.write_u32(self.0);
        Ok(())
    }

    pub(crate) fn size() -> usize {
        4
    }
}

impl From<CreationStatus> for u32 {
    fn from(val: CreationStatus) -> Self {
        val.0
    }
}
