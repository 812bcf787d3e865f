use dynvc_core::{cast_length, ensure_size, invalid_field_err, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

use crate::{ChannelId, Cmd, Header};

/// DATA_FIRST / DATA PDUs, both plain and compressed.
///
/// These are the only PDUs that carry channel payload; the payload is
/// borrowed from the input buffer, the decoder does not copy it.
#[derive(Debug, PartialEq)]
pub enum DvcDataPdu<'a> {
    DataFirst(DataFirstPdu<'a>),
    Data(DataPdu<'a>),
}

impl<'a> DvcDataPdu<'a> {
    pub fn channel_id(&self) -> ChannelId {
        match self {
            DvcDataPdu::DataFirst(pdu) => pdu.channel_id,
            DvcDataPdu::Data(pdu) => pdu.channel_id,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        match self {
            DvcDataPdu::DataFirst(pdu) => pdu.data,
            DvcDataPdu::Data(pdu) => pdu.data,
        }
    }

    /// True for the `DATA_FIRST_COMPRESSED` / `DATA_COMPRESSED` flavors.
    pub fn is_compressed(&self) -> bool {
        match self {
            DvcDataPdu::DataFirst(pdu) => pdu.is_compressed(),
            DvcDataPdu::Data(pdu) => pdu.is_compressed(),
        }
    }

    pub(crate) fn decode(header: Header, src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        match header.cmd() {
            Cmd::DataFirst | Cmd::DataFirstCompressed => {
                Ok(DvcDataPdu::DataFirst(DataFirstPdu::decode(header, src)?))
            }
            _ => Ok(DvcDataPdu::Data(DataPdu::decode(header, src)?)),
        }
    }
}

impl Encode for DvcDataPdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            DvcDataPdu::DataFirst(pdu) => pdu.encode(dst),
            DvcDataPdu::Data(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DvcDataPdu::DataFirst(pdu) => pdu.name(),
            DvcDataPdu::Data(pdu) => pdu.name(),
        }
    }

    fn size(&self) -> usize {
        match self {
            DvcDataPdu::DataFirst(pdu) => pdu.size(),
            DvcDataPdu::Data(pdu) => pdu.size(),
        }
    }
}

/// 2.2.3.1 DVC Data First PDU (DYNVC_DATA_FIRST)
///
/// [2.2.3.1]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/69377767-56a6-4ab8-996b-7758676e9261
#[derive(Debug, PartialEq)]
pub struct DataFirstPdu<'a> {
    header: Header,
    pub channel_id: ChannelId,
    /// Total length of the message, including the data carried by subsequent
    /// DATA PDUs on the same channel.
    pub total_length: u32,
    /// The data carried by this PDU alone.
    pub data: &'a [u8],
}

impl<'a> DataFirstPdu<'a> {
    const NAME: &'static str = "DYNVC_DATA_FIRST";

    /// Create a new `DataFirstPdu`.
    ///
    /// `total_length` is the length of the whole message, including the data
    /// that will be sent by subsequent `DataPdu`s; `data` is only this PDU's
    /// chunk of it.
    pub fn new(channel_id: ChannelId, total_length: u32, data: &'a [u8]) -> Self {
        Self {
            header: Header::new(channel_id, total_length, Cmd::DataFirst),
            channel_id,
            total_length,
            data,
        }
    }

    /// Same as [`DataFirstPdu::new`] but flagged as carrying compressed data.
    pub fn new_compressed(channel_id: ChannelId, total_length: u32, data: &'a [u8]) -> Self {
        Self {
            header: Header::new(channel_id, total_length, Cmd::DataFirstCompressed),
            channel_id,
            total_length,
            data,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.header.cmd() == Cmd::DataFirstCompressed
    }

    pub(crate) fn decode(header: Header, src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        if !header.sp().is_valid() {
            return Err(invalid_field_err(Self::NAME, "Sp", "reserved length width"));
        }
        ensure_size!(in: src, size: header.cb_id().size_of_val() + header.sp().size_of_val());
        let channel_id = header.cb_id().decode_val(src)?;
        let total_length = header.sp().decode_val(src)?;
        let data = src.read_remaining();
        Ok(Self {
            header,
            channel_id,
            total_length,
            data,
        })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        self.header.encode(dst)?;
        self.header.cb_id().encode_val(self.channel_id, dst)?;
        self.header
            .sp()
            .encode_val(cast_length!("Length", self.total_length)?, dst)?;
        dst.write_slice(self.data);
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        if self.is_compressed() {
            "DYNVC_DATA_FIRST_COMPRESSED"
        } else {
            Self::NAME
        }
    }

    pub(crate) fn size(&self) -> usize {
        Header::size() +
        self.header.cb_id().size_of_val() + // ChannelId
        self.header.sp().size_of_val() + // Length
        self.data.len() // Data
    }
}

/// 2.2.3.2 DVC Data PDU (DYNVC_DATA)
///
/// [2.2.3.2]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/15b59886-db44-47f1-8da3-47c8fcd82803
#[derive(Debug, PartialEq)]
pub struct DataPdu<'a> {
    header: Header,
    pub channel_id: ChannelId,
    pub data: &'a [u8],
}

impl<'a> DataPdu<'a> {
    const NAME: &'static str = "DYNVC_DATA";

    pub fn new(channel_id: ChannelId, data: &'a [u8]) -> Self {
        Self {
            header: Header::new(channel_id, 0, Cmd::Data),
            channel_id,
            data,
        }
    }

    /// Same as [`DataPdu::new`] but flagged as carrying compressed data.
    pub fn new_compressed(channel_id: ChannelId, data: &'a [u8]) -> Self {
        Self {
            header: Header::new(channel_id, 0, Cmd::DataCompressed),
            channel_id,
            data,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.header.cmd() == Cmd::DataCompressed
    }

    pub(crate) fn decode(header: Header, src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: header.cb_id().size_of_val());
        let channel_id = header.cb_id().decode_val(src)?;
        let data = src.read_remaining();
        Ok(Self {
            header,
            channel_id,
            data,
        })
    }

    pub(crate) fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());
        self.header.encode(dst)?;
        self.header.cb_id().encode_val(self.channel_id, dst)?;
        dst.write_slice(self.data);
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        if self.is_compressed() {
            "DYNVC_DATA_COMPRESSED"
        } else {
            Self::NAME
        }
    }

    pub(crate) fn size(&self) -> usize {
        Header::size() +
        self.header.cb_id().size_of_val() + // ChannelId
        self.data.len() // Data
    }
}
