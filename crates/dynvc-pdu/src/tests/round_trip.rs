use dynvc_core::{Decode as _, Encode as _, ReadCursor, WriteCursor};
use proptest::prelude::*;

use crate::{ClosePdu, CreateRequestPdu, DataFirstPdu, DataPdu, DvcDataPdu, ServerPdu};

fn encode_pdu(pdu: &ServerPdu<'_>) -> Vec<u8> {
    let mut buffer = vec![0x00; pdu.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    pdu.encode(&mut cursor).unwrap();
    assert_eq!(cursor.pos(), buffer.len());
    buffer
}

proptest! {
    #[test]
    fn data_round_trip(channel_id in any::<u32>(), payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let pdu = ServerPdu::Data(DvcDataPdu::Data(DataPdu::new(channel_id, &payload)));
        let buffer = encode_pdu(&pdu);

        let mut src = ReadCursor::new(&buffer);
        let decoded = ServerPdu::decode(&mut src).unwrap();
        prop_assert_eq!(pdu, decoded);
    }

    #[test]
    fn data_first_round_trip(
        channel_id in any::<u32>(),
        total_length in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let pdu = ServerPdu::Data(DvcDataPdu::DataFirst(DataFirstPdu::new(channel_id, total_length, &payload)));
        let buffer = encode_pdu(&pdu);

        let mut src = ReadCursor::new(&buffer);
        let decoded = ServerPdu::decode(&mut src).unwrap();
        prop_assert_eq!(pdu, decoded);
    }

    #[test]
    fn create_request_round_trip(channel_id in any::<u32>(), name in "[A-Za-z0-9_:]{1,32}") {
        let pdu = ServerPdu::CreateRequest(CreateRequestPdu::new(channel_id, name));
        let buffer = encode_pdu(&pdu);

        let mut src = ReadCursor::new(&buffer);
        let decoded = ServerPdu::decode(&mut src).unwrap();
        prop_assert_eq!(pdu, decoded);
    }

    #[test]
    fn close_round_trip(channel_id in any::<u32>()) {
        let pdu = ServerPdu::Close(ClosePdu::new(channel_id));
        let buffer = encode_pdu(&pdu);

        let mut src = ReadCursor::new(&buffer);
        let decoded = ServerPdu::decode(&mut src).unwrap();
        prop_assert_eq!(pdu, decoded);
    }
}
