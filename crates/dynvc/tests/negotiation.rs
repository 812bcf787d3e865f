use std::sync::{Arc, Mutex};

use dynvc::{
    ChannelCallback, ChannelHandle, DvcClient, DvcEngine as _, DvcErrorExt as _, DvcResult, NewChannel, Plugin,
    PluginHost, TransportWrite,
};
use dynvc_core::decode;
use dynvc_pdu::{CapsVersion, ClientPdu};

#[derive(Clone, Default)]
struct CaptureTransport {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CaptureTransport {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }
}

impl TransportWrite for CaptureTransport {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) {}
}

struct NullPlugin;

struct Null;

dynvc_core::impl_as_any!(NullPlugin);
dynvc_core::impl_as_any!(Null);

impl ChannelCallback for Null {
    fn on_data_received(&mut self, _channel: &ChannelHandle, _data: &[u8]) -> DvcResult<()> {
        Ok(())
    }
}

impl Plugin for NullPlugin {
    fn name(&self) -> &str {
        "null"
    }

    fn init(&mut self, host: &mut PluginHost) -> DvcResult<()> {
        host.create_listener("TEST", |_: &NewChannel| Some(Box::new(Null) as Box<dyn ChannelCallback>));
        Ok(())
    }
}

fn client() -> (DvcClient, CaptureTransport) {
    let transport = CaptureTransport::default();
    let mut host = PluginHost::new();
    host.add_plugin(NullPlugin);
    let client = DvcClient::new(Box::new(transport.clone()), 1024, host).unwrap();
    (client, transport)
}

const CAPS_V2_REQUEST: [u8; 12] = [0x50, 0x00, 0x02, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
const CAPS_V3_REQUEST: [u8; 12] = [0x50, 0x00, 0x03, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];

#[rustfmt::skip]
const SOFT_SYNC_REQUEST: [u8; 24] = [
    0x80, 0x00,
    0x18, 0x00, 0x00, 0x00, // length
    0x03, 0x00, // TCP_FLUSHED | CHANNEL_LIST_PRESENT
    0x01, 0x00, // one tunnel
    0x01, 0x00, 0x00, 0x00, // UDPFECR
    0x02, 0x00, // two DVCs
    0x05, 0x00, 0x00, 0x00,
    0x09, 0x00, 0x00, 0x00,
];

#[test]
fn capabilities_clamp_to_requested_version() {
    let (mut client, transport) = client();

    client.process_frame(&CAPS_V2_REQUEST).unwrap();
    assert_eq!(client.negotiated_version(), Some(CapsVersion::V2));

    let response = transport.frames().into_iter().find_map(|frame| {
        match decode::<ClientPdu<'_>>(&frame) {
            Ok(ClientPdu::CapabilitiesResponse(response)) => Some(response.version),
            _ => None,
        }
    });
    assert_eq!(response, Some(CapsVersion::V2));
}

#[test]
fn soft_sync_is_acknowledged_on_v3() {
    let (mut client, transport) = client();

    client.process_frame(&CAPS_V3_REQUEST).unwrap();
    assert_eq!(client.negotiated_version(), Some(CapsVersion::V3));

    client.process_frame(&SOFT_SYNC_REQUEST).unwrap();

    let acknowledged = transport
        .frames()
        .iter()
        .any(|frame| matches!(decode::<ClientPdu<'_>>(frame), Ok(ClientPdu::SoftSyncResponse(_))));
    assert!(acknowledged);
}

#[test]
fn soft_sync_without_v3_is_a_protocol_error() {
    let (mut client, _transport) = client();

    client.process_frame(&CAPS_V2_REQUEST).unwrap();
    let error = client.process_frame(&SOFT_SYNC_REQUEST).unwrap_err();
    assert!(error.is_fatal());
}
