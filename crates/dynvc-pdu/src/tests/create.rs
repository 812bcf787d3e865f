use dynvc_core::{Decode as _, Encode as _, ReadCursor, WriteCursor};
use lazy_static::lazy_static;

use crate::{ClientPdu, CreateRequestPdu, CreateResponsePdu, CreationStatus, ServerPdu};

const CHANNEL_ID: u32 = 0x0000_0003;
const REQ_ENCODED: [u8; 7] = [0x10, 0x03, 0x54, 0x45, 0x53, 0x54, 0x00];
const RESP_ENCODED: [u8; 6] = [0x10, 0x03, 0x00, 0x00, 0x00, 0x00];

lazy_static! {
    static ref REQ_DECODED: ServerPdu<'static> =
        ServerPdu::CreateRequest(CreateRequestPdu::new(CHANNEL_ID, String::from("TEST")));
    static ref RESP_DECODED: ClientPdu<'static> =
        ClientPdu::CreateResponse(CreateResponsePdu::new(CHANNEL_ID, CreationStatus::OK));
}

#[test]
fn decodes_create_request() {
    let mut src = ReadCursor::new(&REQ_ENCODED);
    let pdu = ServerPdu::decode(&mut src).unwrap();
    assert_eq!(*REQ_DECODED, pdu);
}

#[test]
fn encodes_create_request() {
    let data = &*REQ_DECODED;
    let mut buffer = vec![0x00; data.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    data.encode(&mut cursor).unwrap();
    assert_eq!(REQ_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn decodes_create_response() {
    let mut src = ReadCursor::new(&RESP_ENCODED);
    let pdu = ClientPdu::decode(&mut src).unwrap();
    assert_eq!(*RESP_DECODED, pdu);
}

#[test]
fn encodes_create_response() {
    let data = &*RESP_DECODED;
    let mut buffer = vec![0x00; data.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    data.encode(&mut cursor).unwrap();
    assert_eq!(RESP_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn rejects_empty_channel_name() {
    let encoded = [0x10, 0x03, 0x00];
    let mut src = ReadCursor::new(&encoded);
    assert!(ServerPdu::decode(&mut src).is_err());
}

#[test]
fn rejects_unterminated_channel_name() {
    let encoded = [0x10, 0x03, 0x54, 0x45];
    let mut src = ReadCursor::new(&encoded);
    assert!(ServerPdu::decode(&mut src).is_err());
}

#[test]
fn four_byte_channel_id_boundaries() {
    for id in [0u32, 0xFFFF_FFFF] {
        let pdu = ServerPdu::CreateRequest(CreateRequestPdu::new(id, String::from("GFX")));
        let mut buffer = vec![0x00; pdu.size()];
        let mut cursor = WriteCursor::new(&mut buffer);
        pdu.encode(&mut cursor).unwrap();

        let mut src = ReadCursor::new(&buffer);
        match ServerPdu::decode(&mut src).unwrap() {
            ServerPdu::CreateRequest(decoded) => assert_eq!(decoded.channel_id, id),
            _ => panic!("Expected CreateRequest"),
        }
    }
}
