use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dynvc_core::Encode;
use dynvc_pdu::{CapsVersion, ChannelId, ClientPdu, ClosePdu, DvcDataPdu, ServerPdu};

use crate::channel::{ChannelState, SharedCallback};
use crate::fragment::fragment_message;
use crate::plugin::ChannelCallback;
use crate::registry::ChannelRegistry;
use crate::{DvcError, DvcErrorExt as _, DvcResult};

/// Write half of the security transport.
///
/// One frame per call; the transport owns record boundaries. Implementations
/// may block until the peer drains its socket, which is how backpressure
/// reaches plugin writers.
pub trait TransportWrite: Send {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;

    fn close(&mut self);
}

dynvc_core::assert_obj_safe!(TransportWrite);

/// Decompresses DATA_COMPRESSED / DATA_FIRST_COMPRESSED payloads.
///
/// The algorithm is keyed by the negotiated capability version; connections
/// configured without a decompressor treat compressed traffic as a
/// per-channel failure.
pub trait BulkDecompressor: Send {
    fn decompress(&mut self, version: CapsVersion, data: &[u8]) -> DvcResult<Vec<u8>>;
}

/// Which end of the DRDYNVC channel this connection engine represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// State shared between a connection engine, its channel handles, and any
/// plugin thread that writes.
pub(crate) struct ConnectionShared {
    pub(crate) registry: Mutex<ChannelRegistry>,
    writer: Mutex<Box<dyn TransportWrite>>,
    mtu: usize,
    role: Role,
}

impl ConnectionShared {
    pub(crate) fn new(writer: Box<dyn TransportWrite>, mtu: usize, role: Role) -> Self {
        Self {
            registry: Mutex::new(ChannelRegistry::new()),
            writer: Mutex::new(writer),
            mtu,
            role,
        }
    }

    /// Encodes and writes one control PDU.
    pub(crate) fn send_pdu(&self, pdu: &dyn Encode) -> DvcResult<()> {
        let frame = dynvc_core::encode_vec(pdu).map_err(DvcError::encode)?;
        let mut writer = lock(&self.writer);
        writer
            .write_frame(&frame)
            .map_err(|e| DvcError::transport("ConnectionShared::send_pdu", e))
    }

    /// Emits a CLOSE for `id`, in this role's direction.
    pub(crate) fn send_close(&self, id: ChannelId) -> DvcResult<()> {
        match self.role {
            Role::Client => self.send_pdu(&ClientPdu::Close(ClosePdu::new(id))),
            Role::Server => self.send_pdu(&ServerPdu::Close(ClosePdu::new(id))),
        }
    }

    /// Writes one logical message, fragmenting as needed.
    ///
    /// The transport write lock is held across the whole message so that its
    /// frames are never interleaved with other writers.
    pub(crate) fn write_message(&self, id: ChannelId, data: &[u8]) -> DvcResult<()> {
        {
            let registry = lock(&self.registry);
            match registry.get(id) {
                Some(channel) if channel.is_open() => {}
                Some(_) => {
                    return Err(DvcError::other(
                        "ConnectionShared::write_message",
                        "channel is not open",
                    ))
                }
                None => return Err(DvcError::unknown_channel("ConnectionShared::write_message", id)),
            }
        }

        let frames = fragment_message(id, data, self.mtu)?;
        let mut writer = lock(&self.writer);
        for frame in &frames {
            writer
                .write_frame(frame)
                .map_err(|e| DvcError::transport("ConnectionShared::write_message", e))?;
        }
        Ok(())
    }

    /// Closes the transport write half.
    pub(crate) fn close_transport(&self) {
        lock(&self.writer).close();
    }

    /// Runs `f` against the channel's concrete callback object, when the
    /// channel is live and its callback is a `T`.
    pub(crate) fn with_channel_callback<T, R, F>(&self, id: ChannelId, f: F) -> Option<R>
    where
        T: ChannelCallback,
        F: FnOnce(&T) -> R,
    {
        let callback = lock(&self.registry).get(id).and_then(|channel| channel.callback())?;
        let guard = lock(&callback);
        let concrete = guard.as_any().downcast_ref::<T>()?;
        Some(f(concrete))
    }

    /// Initiates a local close. Idempotent: only the transition out of `Open`
    /// emits a CLOSE and delivers `on_close`.
    pub(crate) fn close_channel(&self, id: ChannelId) -> DvcResult<()> {
        let callback = {
            let mut registry = lock(&self.registry);
            let Some(channel) = registry.get_mut(id) else {
                return Ok(());
            };
            if channel.state != ChannelState::Open {
                return Ok(());
            }
            channel.state = ChannelState::Closing;
            channel.callback.take()
        };

        self.send_close(id)?;
        run_on_close(callback);
        Ok(())
    }

    /// Condemns a channel after a per-channel error: emits a CLOSE, releases
    /// the registry entry, and delivers the final `on_close`.
    pub(crate) fn fail_channel(&self, id: ChannelId, error: &DvcError) {
        warn!(channel_id = id, %error, "Closing channel after error");

        let callback = {
            let mut registry = lock(&self.registry);
            let Some(channel) = registry.get_mut(id) else {
                return;
            };
            channel.state = ChannelState::Failed;
            let callback = channel.callback.take();
            registry.remove(id);
            callback
        };

        if let Err(send_error) = self.send_close(id) {
            warn!(channel_id = id, error = %send_error, "Failed to send CLOSE for condemned channel");
        }
        run_on_close(callback);
    }
}

pub(crate) fn run_on_close(callback: Option<SharedCallback>) {
    if let Some(callback) = callback {
        lock(&callback).on_close();
    }
}

/// Handle to one open channel, usable from any thread.
///
/// Holds only a weak reference to the connection: callbacks own their handle,
/// the registry owns the callbacks, and dropping the connection must not be
/// kept alive by plugin-held handles.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Weak<ConnectionShared>,
    id: ChannelId,
}

impl ChannelHandle {
    pub(crate) fn new(shared: &Arc<ConnectionShared>, id: ChannelId) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            id,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Blocking write of one logical message; fragmentation is handled here.
    ///
    /// Permitted only while the channel is `Open`.
    pub fn write(&self, data: &[u8]) -> DvcResult<()> {
        let shared = self
            .shared
            .upgrade()
            .ok_or_else(|| DvcError::cancelled("ChannelHandle::write"))?;
        shared.write_message(self.id, data)
    }

    /// Initiates a local close of this channel. Idempotent.
    pub fn close(&self) -> DvcResult<()> {
        let shared = self
            .shared
            .upgrade()
            .ok_or_else(|| DvcError::cancelled("ChannelHandle::close"))?;
        shared.close_channel(self.id)
    }
}

impl core::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelHandle").field("id", &self.id).finish()
    }
}

/// Outcome of feeding one frame to a connection engine.
///
/// Fatal errors are returned as `Err`; per-channel failures are handled
/// internally (the channel is condemned, the connection lives on).
pub trait DvcEngine: Send {
    /// Messages to emit before any peer traffic (e.g. the server's
    /// capability exchange).
    fn start(&mut self) -> DvcResult<()> {
        Ok(())
    }

    /// Processes one transport frame.
    fn process_frame(&mut self, frame: &[u8]) -> DvcResult<()>;

    /// Releases every channel (reverse creation order) and runs plugin
    /// terminators. Invoked exactly once when the dispatch loop exits.
    fn teardown(&mut self);
}

dynvc_core::assert_obj_safe!(DvcEngine);

/// Shared DATA / DATA_FIRST handling for both engine roles.
pub(crate) fn handle_data_pdu(
    shared: &Arc<ConnectionShared>,
    pdu: &DvcDataPdu<'_>,
    negotiated: Option<CapsVersion>,
    decompressor: Option<&mut Box<dyn BulkDecompressor>>,
) -> DvcResult<()> {
    let id = pdu.channel_id();

    let decompressed;
    let payload: &[u8] = if pdu.is_compressed() {
        let known = lock(&shared.registry).contains(id);
        if !known {
            debug!(channel_id = id, "Compressed data for unknown channel; ignoring");
            return Ok(());
        }
        match (decompressor, negotiated) {
            (Some(decompressor), Some(version)) => {
                match decompressor.decompress(version, pdu.data()) {
                    Ok(data) => {
                        decompressed = data;
                        &decompressed
                    }
                    Err(error) => {
                        shared.fail_channel(id, &error);
                        return Ok(());
                    }
                }
            }
            _ => {
                let error = DvcError::new(
                    "handle_data_pdu",
                    crate::DvcErrorKind::UnsupportedCompression,
                );
                shared.fail_channel(id, &error);
                return Ok(());
            }
        }
    } else {
        pdu.data()
    };

    let (message, callback, handle) = {
        let mut registry = lock(&shared.registry);
        let Some(channel) = registry.get_mut(id) else {
            debug!(channel_id = id, "Data for unknown channel; ignoring");
            return Ok(());
        };

        if !channel.is_open() {
            debug!(channel_id = id, state = ?channel.state, "Data for channel that is not open; ignoring");
            return Ok(());
        }

        let reassembled = match pdu {
            DvcDataPdu::DataFirst(first) => {
                channel
                    .reassembly
                    .process_first(id, first.total_length as usize, payload)
            }
            DvcDataPdu::Data(_) => channel.reassembly.process_next(id, payload),
        };

        match reassembled {
            Ok(Some(message)) => {
                let callback = channel.callback();
                drop(registry);
                (message, callback, ChannelHandle::new(shared, id))
            }
            Ok(None) => return Ok(()),
            Err(error) => {
                drop(registry);
                shared.fail_channel(id, &error);
                return Ok(());
            }
        }
    };

    if let Some(callback) = callback {
        let result = lock(&callback).on_data_received(&handle, &message);
        if let Err(error) = result {
            let error = DvcError::plugin("handle_data_pdu", error);
            shared.fail_channel(id, &error);
        }
    }

    Ok(())
}

/// Shared handling of a CLOSE received from the peer.
pub(crate) fn handle_remote_close(shared: &Arc<ConnectionShared>, id: ChannelId) -> DvcResult<()> {
    let (confirmed, callback) = {
        let mut registry = lock(&shared.registry);
        match registry.get(id).map(|channel| channel.state) {
            None => {
                debug!(channel_id = id, "CLOSE for unknown channel; ignoring");
                return Ok(());
            }
            // The peer is confirming a close we initiated; `on_close`
            // already ran when the channel left `Open`.
            Some(ChannelState::Closing | ChannelState::Failed) => {
                let removed = registry.remove(id);
                (true, removed.and_then(|(_, callback)| callback))
            }
            Some(_) => {
                let removed = registry.remove(id);
                (false, removed.and_then(|(_, callback)| callback))
            }
        }
    };

    if !confirmed {
        // Peer-initiated close: confirm it on the wire.
        shared.send_close(id)?;
    }
    run_on_close(callback);
    Ok(())
}
