use dynvc_core::{cast_length, encode_vec, invalid_field_err, EncodeError};
use dynvc_pdu::{ChannelId, DataFirstPdu, DataPdu, DvcDataPdu, FieldType, Header};

use crate::{DvcError, DvcErrorExt as _, DvcResult};

/// Splits one logical message into wire frames no larger than `mtu`.
///
/// A message that fits a single PDU is emitted as one DATA frame; otherwise a
/// DATA_FIRST announcing the total length is followed by DATA frames until
/// the payload is drained. The caller must hold the transport write lock
/// across the whole returned sequence so that frames of one message are never
/// interleaved with other writes on the same channel.
pub fn fragment_message(channel_id: ChannelId, payload: &[u8], mtu: usize) -> DvcResult<Vec<Vec<u8>>> {
    let data_overhead = Header::size() + FieldType::for_val(channel_id).size_of_val();
    let total: u32 = cast_length!(ctx: "fragment_message", "payload length", payload.len())
        .map_err(|e: EncodeError| DvcError::encode(e))?;
    let first_overhead = data_overhead + FieldType::for_val(total).size_of_val();

    if mtu <= first_overhead {
        return Err(DvcError::encode(invalid_field_err(
            "fragment_message",
            "mtu",
            "smaller than the PDU header",
        )));
    }

    if payload.len() + data_overhead <= mtu {
        let pdu = DvcDataPdu::Data(DataPdu::new(channel_id, payload));
        return Ok(vec![encode_vec(&pdu).map_err(DvcError::encode)?]);
    }

    let mut frames = Vec::new();
    let mut off = 0;

    while off < payload.len() {
        let first = off == 0;
        let budget = if first { mtu - first_overhead } else { mtu - data_overhead };
        let end = core::cmp::min(off + budget, payload.len());

        let pdu = if first {
            DvcDataPdu::DataFirst(DataFirstPdu::new(channel_id, total, &payload[off..end]))
        } else {
            DvcDataPdu::Data(DataPdu::new(channel_id, &payload[off..end]))
        };

        frames.push(encode_vec(&pdu).map_err(DvcError::encode)?);
        off = end;
    }

    Ok(frames)
}
