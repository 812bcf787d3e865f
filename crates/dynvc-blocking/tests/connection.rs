use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use dynvc::{ChannelCallback, ChannelHandle, DvcClient, DvcResult, NewChannel, Plugin, PluginHost};
use dynvc_blocking::{Connection, FramedReader, FramedWriter, StopEvent};
use dynvc_core::decode;
use dynvc_pdu::ClientPdu;

struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.pending.extend(bytes),
                Err(_) => return Ok(0), // peer hung up: EOF
            }
        }
        let n = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer hung up"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = channel();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            pending: VecDeque::new(),
        },
    )
}

#[derive(Clone, Default)]
struct Recorder {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
}

dynvc_core::impl_as_any!(Recorder);

impl ChannelCallback for Recorder {
    fn on_data_received(&mut self, _channel: &ChannelHandle, data: &[u8]) -> DvcResult<()> {
        self.messages.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn on_close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct RecorderPlugin {
    recorder: Recorder,
    terminated: Arc<AtomicUsize>,
}

dynvc_core::impl_as_any!(RecorderPlugin);

impl Plugin for RecorderPlugin {
    fn name(&self) -> &str {
        "recorder"
    }

    fn init(&mut self, host: &mut PluginHost) -> DvcResult<()> {
        let recorder = self.recorder.clone();
        host.create_listener("TEST", move |_: &NewChannel| {
            Some(Box::new(recorder.clone()) as Box<dyn ChannelCallback>)
        });
        Ok(())
    }

    fn terminate(&mut self, _host: &mut PluginHost) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    to_client: FramedWriter<PipeWriter>,
    from_client: FramedReader<PipeReader>,
    recorder: Recorder,
    terminated: Arc<AtomicUsize>,
    handle: dynvc_blocking::ConnectionHandle,
}

fn start_harness() -> Harness {
    let (server_tx, client_rx) = pipe();
    let (client_tx, server_rx) = pipe();

    let recorder = Recorder::default();
    let terminated = Arc::new(AtomicUsize::new(0));

    let mut host = PluginHost::new();
    host.add_plugin(RecorderPlugin {
        recorder: recorder.clone(),
        terminated: Arc::clone(&terminated),
    });

    let engine = DvcClient::new(Box::new(FramedWriter::new(client_tx)), 1024, host).unwrap();
    let stop = StopEvent::new();
    let handle = Connection::spawn(FramedReader::new(client_rx), engine, stop).unwrap();

    Harness {
        to_client: FramedWriter::new(server_tx),
        from_client: FramedReader::new(server_rx),
        recorder,
        terminated,
        handle,
    }
}

fn create_request(id: u8, name: &str) -> Vec<u8> {
    let mut frame = vec![0x10, id];
    frame.extend_from_slice(name.as_bytes());
    frame.push(0x00);
    frame
}

#[test]
fn dispatch_loop_delivers_and_tears_down_on_eof() {
    let mut harness = start_harness();

    harness.to_client.write_frame(&[0x50, 0x00, 0x01, 0x00]).unwrap(); // caps V1
    harness.to_client.write_frame(&create_request(3, "TEST")).unwrap();
    harness.to_client.write_frame(&[0x30, 0x03, 0x01, 0x02, 0x03]).unwrap();

    // Hang up the server side; the dispatch loop sees EOF and tears down.
    drop(harness.to_client);

    harness.handle.join().unwrap();

    assert_eq!(*harness.recorder.messages.lock().unwrap(), vec![vec![1, 2, 3]]);
    // The open channel got its on_close during teardown, and the plugin its
    // terminate.
    assert_eq!(harness.recorder.closes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.terminated.load(Ordering::SeqCst), 1);

    // The client responded to the handshake and the create.
    let mut saw_caps_response = false;
    let mut saw_create_response = false;
    while let Ok(Some(frame)) = harness.from_client.read_frame() {
        match decode::<ClientPdu<'_>>(&frame) {
            Ok(ClientPdu::CapabilitiesResponse(_)) => saw_caps_response = true,
            Ok(ClientPdu::CreateResponse(response)) => {
                assert!(response.creation_status.is_ok());
                saw_create_response = true;
            }
            _ => {}
        }
    }
    assert!(saw_caps_response);
    assert!(saw_create_response);
}

#[test]
fn echo_plugin_sends_every_message_back() {
    let (server_tx, client_rx) = pipe();
    let (client_tx, server_rx) = pipe();

    let mut host = PluginHost::new();
    host.add_plugin(dynvc_echo::EchoPlugin::new());

    let engine = DvcClient::new(Box::new(FramedWriter::new(client_tx)), 1024, host).unwrap();
    let handle = Connection::spawn(FramedReader::new(client_rx), engine, StopEvent::new()).unwrap();

    let mut to_client = FramedWriter::new(server_tx);
    to_client.write_frame(&[0x50, 0x00, 0x01, 0x00]).unwrap(); // caps V1
    to_client.write_frame(&create_request(7, "ECHO")).unwrap();
    to_client.write_frame(&[0x30, 0x07, 0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

    let mut from_client = FramedReader::new(server_rx);
    let mut echoed = None;
    while let Ok(Some(frame)) = from_client.read_frame() {
        if let Ok(ClientPdu::Data(pdu)) = decode::<ClientPdu<'_>>(&frame) {
            echoed = Some(pdu.data().to_vec());
            break;
        }
    }
    assert_eq!(echoed, Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));

    drop(to_client);
    handle.join().unwrap();
}

#[test]
fn stop_event_cancels_a_blocked_dispatch_loop() {
    let Harness {
        mut to_client,
        mut from_client,
        recorder,
        handle,
        ..
    } = start_harness();

    to_client.write_frame(&create_request(3, "TEST")).unwrap();

    // Wait for the create response so the channel is provably open before
    // the stop request goes out.
    loop {
        let frame = from_client.read_frame().unwrap().expect("client hung up");
        if matches!(decode::<ClientPdu<'_>>(&frame), Ok(ClientPdu::CreateResponse(_))) {
            break;
        }
    }

    let stop = handle.stop_event();
    let mut handle = handle.with_shutdown(move || drop(to_client));
    handle.stop();

    handle.join().unwrap();
    assert!(stop.is_set());
    assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    drop(from_client);
}
