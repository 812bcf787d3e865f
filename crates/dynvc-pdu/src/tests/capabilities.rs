use dynvc_core::{Decode as _, Encode as _, ReadCursor, WriteCursor};
use lazy_static::lazy_static;

use crate::{CapabilitiesRequestPdu, CapabilitiesResponsePdu, CapsVersion, ClientPdu, ServerPdu};

const REQ_V1_ENCODED: [u8; 4] = [0x50, 0x00, 0x01, 0x00];
const REQ_V2_ENCODED: [u8; 12] = [0x50, 0x00, 0x02, 0x00, 0x33, 0x33, 0x11, 0x11, 0x3d, 0x0a, 0xa7, 0x04];
const RESP_V1_ENCODED: [u8; 4] = [0x50, 0x00, 0x01, 0x00];

lazy_static! {
    static ref REQ_V1_DECODED: ServerPdu<'static> =
        ServerPdu::CapabilitiesRequest(CapabilitiesRequestPdu::new(CapsVersion::V1));
    static ref RESP_V1_DECODED: ClientPdu<'static> =
        ClientPdu::CapabilitiesResponse(CapabilitiesResponsePdu::new(CapsVersion::V1));
}

#[test]
fn decodes_request_v1() {
    let mut src = ReadCursor::new(&REQ_V1_ENCODED);
    let pdu = ServerPdu::decode(&mut src).unwrap();
    assert_eq!(*REQ_V1_DECODED, pdu);
}

#[test]
fn encodes_request_v1() {
    let data = &*REQ_V1_DECODED;
    let mut buffer = vec![0x00; data.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    data.encode(&mut cursor).unwrap();
    assert_eq!(REQ_V1_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn decodes_request_v2_with_priority_charges() {
    let mut src = ReadCursor::new(&REQ_V2_ENCODED);
    match ServerPdu::decode(&mut src).unwrap() {
        ServerPdu::CapabilitiesRequest(CapabilitiesRequestPdu::V2 { charges, .. }) => {
            assert_eq!(charges, [0x3333, 0x1111, 0x0a3d, 0x04a7]);
        }
        _ => panic!("Expected V2 CapabilitiesRequest"),
    }
}

#[test]
fn request_v2_round_trips() {
    let mut src = ReadCursor::new(&REQ_V2_ENCODED);
    let decoded = ServerPdu::decode(&mut src).unwrap();

    let mut buffer = vec![0x00; decoded.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    decoded.encode(&mut cursor).unwrap();
    assert_eq!(REQ_V2_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn decodes_response_v1() {
    let mut src = ReadCursor::new(&RESP_V1_ENCODED);
    let pdu = ClientPdu::decode(&mut src).unwrap();
    assert_eq!(*RESP_V1_DECODED, pdu);
}

#[test]
fn encodes_response_v1() {
    let data = &*RESP_V1_DECODED;
    let mut buffer = vec![0x00; data.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    data.encode(&mut cursor).unwrap();
    assert_eq!(RESP_V1_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn rejects_unknown_version() {
    let encoded = [0x50, 0x00, 0x09, 0x00];
    let mut src = ReadCursor::new(&encoded);
    assert!(ServerPdu::decode(&mut src).is_err());
}

#[test]
fn version_ordering_enables_soft_sync() {
    assert!(!CapsVersion::V1.supports_soft_sync());
    assert!(!CapsVersion::V2.supports_soft_sync());
    assert!(CapsVersion::V3.supports_soft_sync());
}
