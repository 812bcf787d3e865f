use dynvc_core::{
    cast_length, ensure_size, invalid_field_err, unexpected_message_type_err, DecodeError, DecodeResult, EncodeResult,
    ReadCursor, WriteCursor,
};

/// [2.2] Message Syntax
///
/// Every DRDYNVC PDU starts with a single byte `Cmd:4 | Sp:2 | cbChId:2`.
///
/// [2.2]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/0b07a750-bf51-4042-bcf2-a991b6729d6e
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    cb_id: FieldType, // 2 bit
    sp: FieldType,    // 2 bit; meaning depends on the cmd field
    cmd: Cmd,         // 4 bit
}

impl Header {
    pub const NAME: &'static str = "DYNVC_HEADER";

    pub const FIXED_PART_SIZE: usize = 1;

    /// Create a new `Header` with the minimum field widths for `cb_id_val`
    /// and `sp_val`.
    ///
    /// If `cb_id_val` or `sp_val` is not relevant for a given `cmd`, it
    /// should be set to 0 respectively.
    pub fn new(cb_id_val: u32, sp_val: u32, cmd: Cmd) -> Self {
        Self {
            cb_id: FieldType::for_val(cb_id_val),
            sp: FieldType::for_val(sp_val),
            cmd,
        }
    }

    pub fn cmd(&self) -> Cmd {
        self.cmd
    }

    pub fn cb_id(&self) -> FieldType {
        self.cb_id
    }

    /// The `Sp` field. For DATA_FIRST PDUs this selects the width of the
    /// Length field; elsewhere it is unused padding.
    pub fn sp(&self) -> FieldType {
        self.sp
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: Self::size());
        dst.write_u8((self.cmd as u8) << 4 | u8::from(self.sp) << 2 | u8::from(self.cb_id));
        Ok(())
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: Self::size());
        let byte = src.read_u8();
        let cmd = Cmd::try_from(byte >> 4)?;
        let sp = FieldType::from((byte >> 2) & 0b11);
        let cb_id = FieldType::from(byte & 0b11);
        if !cb_id.is_valid() {
            return Err(invalid_field_err(Self::NAME, "cbChId", "reserved channel id width"));
        }
        Ok(Self { cb_id, sp, cmd })
    }

    pub fn size() -> usize {
        Self::FIXED_PART_SIZE
    }
}

/// [2.2] Message Syntax
///
/// [2.2]: https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpedyc/0b07a750-bf51-4042-bcf2-a991b6729d6e
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cmd {
    Create = 0x01,
    DataFirst = 0x02,
    Data = 0x03,
    Close = 0x04,
    Capability = 0x05,
    DataFirstCompressed = 0x06,
    DataCompressed = 0x07,
    SoftSyncRequest = 0x08,
    SoftSyncResponse = 0x09,
}

impl TryFrom<u8> for Cmd {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Self::Create),
            0x02 => Ok(Self::DataFirst),
            0x03 => Ok(Self::Data),
            0x04 => Ok(Self::Close),
            0x05 => Ok(Self::Capability),
            0x06 => Ok(Self::DataFirstCompressed),
            0x07 => Ok(Self::DataCompressed),
            0x08 => Ok(Self::SoftSyncRequest),
            0x09 => Ok(Self::SoftSyncResponse),
            _ => Err(unexpected_message_type_err("Cmd", byte)),
        }
    }
}

impl From<Cmd> for u8 {
    fn from(cmd: Cmd) -> Self {
        cmd as u8
    }
}

/// Width selector for the variable-width integer fields of the wire format
/// (channel id, DATA_FIRST length, SOFT_SYNC sizes).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldType(u8);

impl FieldType {
    pub const NAME: &'static str = "FieldType";

    pub const U8: Self = Self(0x00);
    pub const U16: Self = Self(0x01);
    pub const U32: Self = Self(0x02);

    pub fn encode_val(&self, value: u32, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size_of_val());
        match *self {
            FieldType::U8 => dst.write_u8(cast_length!("value", value)?),
            FieldType::U16 => dst.write_u16(cast_length!("value", value)?),
            FieldType::U32 => dst.write_u32(value),
            _ => return Err(invalid_field_err(Self::NAME, "width", "reserved field width")),
        };
        Ok(())
    }

    pub fn decode_val(&self, src: &mut ReadCursor<'_>) -> DecodeResult<u32> {
        ensure_size!(in: src, size: self.size_of_val());
        match *self {
            FieldType::U8 => Ok(u32::from(src.read_u8())),
            FieldType::U16 => Ok(u32::from(src.read_u16())),
            FieldType::U32 => Ok(src.read_u32()),
            _ => Err(invalid_field_err(Self::NAME, "width", "reserved field width")),
        }
    }

    /// Returns the size of the value in bytes.
    pub fn size_of_val(&self) -> usize {
        match *self {
            FieldType::U8 => 1,
            FieldType::U16 => 2,
            FieldType::U32 => 4,
            _ => 0,
        }
    }

    /// Picks the minimum width able to represent `value`.
    pub fn for_val(value: u32) -> Self {
        if value <= u32::from(u8::MAX) {
            FieldType::U8
        } else if value <= u32::from(u16::MAX) {
            FieldType::U16
        } else {
            FieldType::U32
        }
    }

    /// `0b11` is reserved by the protocol.
    pub fn is_valid(&self) -> bool {
        self.0 <= 0x02
    }
}

impl From<u8> for FieldType {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => Self::U8,
            0x01 => Self::U16,
            0x02 => Self::U32,
            _ => Self(byte),
        }
    }
}

impl From<FieldType> for u8 {
    fn from(field_type: FieldType) -> Self {
        field_type.0
    }
}
