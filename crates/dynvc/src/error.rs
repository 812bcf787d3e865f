use core::fmt;

use dynvc_core::{DecodeError, EncodeError};
use dynvc_pdu::ChannelId;

pub type DvcResult<T> = Result<T, DvcError>;

pub type DvcError = dynvc_core::Error<DvcErrorKind>;

/// Protocol-level failure taxonomy.
///
/// Kinds split into two fatality classes (see [`DvcErrorExt::is_fatal`]):
/// errors that condemn the whole connection, and errors confined to one
/// channel.
#[non_exhaustive]
#[derive(Debug)]
pub enum DvcErrorKind {
    /// A frame ended before the declared field widths were satisfied.
    Truncated,
    /// The command nibble is not a known DRDYNVC command.
    UnknownCommand { cmd: u8 },
    /// A reserved field value was used by the peer.
    ReservedField,
    /// CREATE_REQUEST carried a channel id that is already live.
    DuplicateChannel { id: ChannelId },
    /// DATA addressed a channel id with no live channel.
    UnknownChannel { id: ChannelId },
    /// Reassembled length disagrees with the DATA_FIRST announcement.
    ReassemblyMismatch { id: ChannelId },
    /// No listener accepted the channel name.
    ListenerRejected,
    /// A plugin callback failed.
    PluginError,
    /// Compressed data arrived but no decompressor is configured.
    UnsupportedCompression,
    /// The transport failed.
    TransportError,
    /// The stop event was set.
    Cancelled,
    Decode(DecodeError),
    Encode(EncodeError),
    Other { description: &'static str },
}

impl fmt::Display for DvcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated PDU"),
            Self::UnknownCommand { cmd } => write!(f, "unknown command ({cmd:#x})"),
            Self::ReservedField => write!(f, "reserved field value"),
            Self::DuplicateChannel { id } => write!(f, "duplicate channel id ({id})"),
            Self::UnknownChannel { id } => write!(f, "unknown channel id ({id})"),
            Self::ReassemblyMismatch { id } => write!(f, "reassembly length mismatch on channel {id}"),
            Self::ListenerRejected => write!(f, "no listener accepted the channel"),
            Self::PluginError => write!(f, "plugin error"),
            Self::UnsupportedCompression => write!(f, "compressed data is not supported"),
            Self::TransportError => write!(f, "transport error"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Decode(_) => write!(f, "decode error"),
            Self::Encode(_) => write!(f, "encode error"),
            Self::Other { description } => write!(f, "{description}"),
        }
    }
}


impl std::error::Error for DvcErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

pub trait DvcErrorExt {
    /// Whether this error condemns the whole connection.
    ///
    /// Per-channel failures (reassembly mismatch, plugin errors, rejected
    /// listeners, unknown channels, unsupported compression) close the
    /// offending channel only; everything else tears the connection down.
    fn is_fatal(&self) -> bool;

    fn truncated(context: &'static str) -> Self;
    fn unknown_command(context: &'static str, cmd: u8) -> Self;
    fn reserved_field(context: &'static str) -> Self;
    fn duplicate_channel(context: &'static str, id: ChannelId) -> Self;
    fn unknown_channel(context: &'static str, id: ChannelId) -> Self;
    fn reassembly_mismatch(context: &'static str, id: ChannelId) -> Self;
    fn listener_rejected(context: &'static str) -> Self;
    fn plugin<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
    fn transport<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
    fn cancelled(context: &'static str) -> Self;
    fn decode(error: DecodeError) -> Self;
    fn encode(error: EncodeError) -> Self;
    fn other(context: &'static str, description: &'static str) -> Self;
}

impl DvcErrorExt for DvcError {
    fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            DvcErrorKind::UnknownCommand { .. }
                | DvcErrorKind::UnknownChannel { .. }
                | DvcErrorKind::ReassemblyMismatch { .. }
                | DvcErrorKind::ListenerRejected
                | DvcErrorKind::PluginError
                | DvcErrorKind::UnsupportedCompression
        )
    }

    fn truncated(context: &'static str) -> Self {
        Self::new(context, DvcErrorKind::Truncated)
    }

    fn unknown_command(context: &'static str, cmd: u8) -> Self {
        Self::new(context, DvcErrorKind::UnknownCommand { cmd })
    }

    fn reserved_field(context: &'static str) -> Self {
        Self::new(context, DvcErrorKind::ReservedField)
    }

    fn duplicate_channel(context: &'static str, id: ChannelId) -> Self {
        Self::new(context, DvcErrorKind::DuplicateChannel { id })
    }

    fn unknown_channel(context: &'static str, id: ChannelId) -> Self {
        Self::new(context, DvcErrorKind::UnknownChannel { id })
    }

    fn reassembly_mismatch(context: &'static str, id: ChannelId) -> Self {
        Self::new(context, DvcErrorKind::ReassemblyMismatch { id })
    }

    fn listener_rejected(context: &'static str) -> Self {
        Self::new(context, DvcErrorKind::ListenerRejected)
    }

    fn plugin<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, DvcErrorKind::PluginError).with_source(e)
    }

    fn transport<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, DvcErrorKind::TransportError).with_source(e)
    }

    fn cancelled(context: &'static str) -> Self {
        Self::new(context, DvcErrorKind::Cancelled)
    }

    fn decode(error: DecodeError) -> Self {
        Self::new("decode error", DvcErrorKind::Decode(error))
    }

    fn encode(error: EncodeError) -> Self {
        Self::new("encode error", DvcErrorKind::Encode(error))
    }

    fn other(context: &'static str, description: &'static str) -> Self {
        Self::new(context, DvcErrorKind::Other { description })
    }
}

