use dynvc_core::{Decode as _, Encode as _, ReadCursor, WriteCursor};
use lazy_static::lazy_static;

use crate::{
    ClientPdu, ServerPdu, SoftSyncChannelList, SoftSyncFlags, SoftSyncRequestPdu, SoftSyncResponsePdu, TunnelType,
};

#[rustfmt::skip]
const REQ_ENCODED: [u8; 24] = [
    0x80, // header
    0x00, // pad
    0x18, 0x00, 0x00, 0x00, // length
    0x03, 0x00, // flags: TCP_FLUSHED | CHANNEL_LIST_PRESENT
    0x01, 0x00, // number of tunnels
    0x01, 0x00, 0x00, 0x00, // tunnel type: UDPFECR
    0x02, 0x00, // number of DVCs
    0x05, 0x00, 0x00, 0x00, // channel id 5
    0x09, 0x00, 0x00, 0x00, // channel id 9
];

#[rustfmt::skip]
const RESP_ENCODED: [u8; 10] = [
    0x90, // header
    0x00, // pad
    0x01, 0x00, 0x00, 0x00, // number of tunnels
    0x01, 0x00, 0x00, 0x00, // tunnel type: UDPFECR
];

lazy_static! {
    static ref REQ_DECODED: ServerPdu<'static> = ServerPdu::SoftSyncRequest(SoftSyncRequestPdu::new(
        SoftSyncFlags::TCP_FLUSHED | SoftSyncFlags::CHANNEL_LIST_PRESENT,
        vec![SoftSyncChannelList {
            tunnel_type: TunnelType::UDP_FECR,
            channel_ids: vec![5, 9],
        }],
    ));
    static ref RESP_DECODED: ClientPdu<'static> =
        ClientPdu::SoftSyncResponse(SoftSyncResponsePdu::new(vec![TunnelType::UDP_FECR]));
}

#[test]
fn decodes_soft_sync_request() {
    let mut src = ReadCursor::new(&REQ_ENCODED);
    let pdu = ServerPdu::decode(&mut src).unwrap();
    assert_eq!(*REQ_DECODED, pdu);
}

#[test]
fn encodes_soft_sync_request() {
    let data = &*REQ_DECODED;
    let mut buffer = vec![0x00; data.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    data.encode(&mut cursor).unwrap();
    assert_eq!(REQ_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn decodes_soft_sync_response() {
    let mut src = ReadCursor::new(&RESP_ENCODED);
    let pdu = ClientPdu::decode(&mut src).unwrap();
    assert_eq!(*RESP_DECODED, pdu);
}

#[test]
fn encodes_soft_sync_response() {
    let data = &*RESP_DECODED;
    let mut buffer = vec![0x00; data.size()];
    let mut cursor = WriteCursor::new(&mut buffer);
    data.encode(&mut cursor).unwrap();
    assert_eq!(RESP_ENCODED.as_slice(), buffer.as_slice());
}

#[test]
fn rejects_request_with_bad_length() {
    let mut encoded = REQ_ENCODED;
    encoded[2] = 0x10; // claim a shorter PDU than was sent
    let mut src = ReadCursor::new(&encoded);
    assert!(ServerPdu::decode(&mut src).is_err());
}
