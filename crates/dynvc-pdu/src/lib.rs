#![cfg_attr(doc, doc = include_str!("../README.md"))]
#![allow(clippy::cast_possible_truncation)]

#[cfg(test)]
mod tests;

mod caps;
mod close;
mod create;
mod data;
mod header;
mod soft_sync;

pub use self::caps::{CapabilitiesRequestPdu, CapabilitiesResponsePdu, CapsVersion};
pub use self::close::ClosePdu;
pub use self::create::{CreateRequestPdu, CreateResponsePdu, CreationStatus, MAX_CHANNEL_NAME_LENGTH};
pub use self::data::{DataFirstPdu, DataPdu, DvcDataPdu};
pub use self::header::{Cmd, FieldType, Header};
pub use self::soft_sync::{
    SoftSyncChannelList, SoftSyncFlags, SoftSyncRequestPdu, SoftSyncResponsePdu, TunnelType,
};

use dynvc_core::{unexpected_message_type_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

/// A dynamic channel id, unique within one connection.
///
/// Encoded on the wire in 1, 2 or 4 bytes depending on the `cbChId` bits of
/// the command byte.
pub type ChannelId = u32;

/// Dynamic virtual channel PDUs sent by the server.
#[derive(Debug, PartialEq)]
pub enum ServerPdu<'a> {
    CapabilitiesRequest(CapabilitiesRequestPdu),
    CreateRequest(CreateRequestPdu),
    Data(DvcDataPdu<'a>),
    Close(ClosePdu),
    SoftSyncRequest(SoftSyncRequestPdu),
}

impl Encode for ServerPdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ServerPdu::CapabilitiesRequest(pdu) => pdu.encode(dst),
            ServerPdu::CreateRequest(pdu) => pdu.encode(dst),
            ServerPdu::Data(pdu) => pdu.encode(dst),
            ServerPdu::Close(pdu) => pdu.encode(dst),
            ServerPdu::SoftSyncRequest(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ServerPdu::CapabilitiesRequest(pdu) => pdu.name(),
            ServerPdu::CreateRequest(pdu) => pdu.name(),
            ServerPdu::Data(pdu) => pdu.name(),
            ServerPdu::Close(pdu) => pdu.name(),
            ServerPdu::SoftSyncRequest(pdu) => pdu.name(),
        }
    }

    fn size(&self) -> usize {
        match self {
            ServerPdu::CapabilitiesRequest(pdu) => pdu.size(),
            ServerPdu::CreateRequest(pdu) => pdu.size(),
            ServerPdu::Data(pdu) => pdu.size(),
            ServerPdu::Close(pdu) => pdu.size(),
            ServerPdu::SoftSyncRequest(pdu) => pdu.size(),
        }
    }
}

impl<'de> Decode<'de> for ServerPdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let header = Header::decode(src)?;
        match header.cmd() {
            Cmd::Create => Ok(Self::CreateRequest(CreateRequestPdu::decode(header, src)?)),
            Cmd::DataFirst | Cmd::Data | Cmd::DataFirstCompressed | Cmd::DataCompressed => {
                Ok(Self::Data(DvcDataPdu::decode(header, src)?))
            }
            Cmd::Close => Ok(Self::Close(ClosePdu::decode(header, src)?)),
            Cmd::Capability => Ok(Self::CapabilitiesRequest(CapabilitiesRequestPdu::decode(header, src)?)),
            Cmd::SoftSyncRequest => Ok(Self::SoftSyncRequest(SoftSyncRequestPdu::decode(header, src)?)),
            cmd => Err(unexpected_message_type_err("ServerPdu", cmd.into())),
        }
    }
}

/// Dynamic virtual channel PDUs sent by the client.
#[derive(Debug, PartialEq)]
pub enum ClientPdu<'a> {
    CapabilitiesResponse(CapabilitiesResponsePdu),
    CreateResponse(CreateResponsePdu),
    Data(DvcDataPdu<'a>),
    Close(ClosePdu),
    SoftSyncResponse(SoftSyncResponsePdu),
}

impl Encode for ClientPdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ClientPdu::CapabilitiesResponse(pdu) => pdu.encode(dst),
            ClientPdu::CreateResponse(pdu) => pdu.encode(dst),
            ClientPdu::Data(pdu) => pdu.encode(dst),
            ClientPdu::Close(pdu) => pdu.encode(dst),
            ClientPdu::SoftSyncResponse(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ClientPdu::CapabilitiesResponse(pdu) => pdu.name(),
            ClientPdu::CreateResponse(pdu) => pdu.name(),
            ClientPdu::Data(pdu) => pdu.name(),
            ClientPdu::Close(pdu) => pdu.name(),
            ClientPdu::SoftSyncResponse(pdu) => pdu.name(),
        }
    }

    fn size(&self) -> usize {
        match self {
            ClientPdu::CapabilitiesResponse(pdu) => pdu.size(),
            ClientPdu::CreateResponse(pdu) => pdu.size(),
            ClientPdu::Data(pdu) => pdu.size(),
            ClientPdu::Close(pdu) => pdu.size(),
            ClientPdu::SoftSyncResponse(pdu) => pdu.size(),
        }
    }
}

impl<'de> Decode<'de> for ClientPdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let header = Header::decode(src)?;
        match header.cmd() {
            Cmd::Create => Ok(Self::CreateResponse(CreateResponsePdu::decode(header, src)?)),
            Cmd::DataFirst | Cmd::Data | Cmd::DataFirstCompressed | Cmd::DataCompressed => {
                Ok(Self::Data(DvcDataPdu::decode(header, src)?))
            }
            Cmd::Close => Ok(Self::Close(ClosePdu::decode(header, src)?)),
            Cmd::Capability => Ok(Self::CapabilitiesResponse(CapabilitiesResponsePdu::decode(header, src)?)),
            Cmd::SoftSyncResponse => Ok(Self::SoftSyncResponse(SoftSyncResponsePdu::decode(header, src)?)),
            cmd => Err(unexpected_message_type_err("ClientPdu", cmd.into())),
        }
    }
}
