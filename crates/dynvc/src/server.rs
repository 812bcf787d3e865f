use std::sync::Arc;

use dynvc_core::DecodeErrorKind;
use dynvc_pdu::{
    CapabilitiesRequestPdu, CapsVersion, ChannelId, ClientPdu, CreateRequestPdu, ServerPdu, SoftSyncFlags,
    SoftSyncRequestPdu,
};

use crate::channel::{Channel, ChannelState};
use crate::connection::{
    handle_data_pdu, handle_remote_close, lock, run_on_close, BulkDecompressor, ConnectionShared, Role,
};
use crate::plugin::ChannelCallback;
use crate::{ChannelHandle, DvcEngine, DvcError, DvcErrorExt as _, DvcResult, TransportWrite};

/// Server-side DVC connection engine.
///
/// The server end owns channel creation: it allocates channel ids, announces
/// channels with CREATE_REQUEST, and opens them once the client accepts.
pub struct DvcServer {
    shared: Arc<ConnectionShared>,
    negotiated: Option<CapsVersion>,
    decompressor: Option<Box<dyn BulkDecompressor>>,
    /// Channels queued with [`with_channel`](Self::with_channel), announced
    /// once the capability handshake settles.
    pending: Vec<(String, Box<dyn ChannelCallback>)>,
    torn_down: bool,
}

impl DvcServer {
    pub fn new(writer: Box<dyn TransportWrite>, mtu: usize) -> Self {
        Self {
            shared: Arc::new(ConnectionShared::new(writer, mtu, Role::Server)),
            negotiated: None,
            decompressor: None,
            pending: Vec::new(),
            torn_down: false,
        }
    }

    /// Queues a channel to announce as soon as the client reports its
    /// capabilities.
    #[must_use]
    pub fn with_channel<C: ChannelCallback + 'static>(mut self, name: &str, callback: C) -> Self {
        self.pending.push((name.to_owned(), Box::new(callback)));
        self
    }

    /// Installs the decompressor consulted for DATA_*_COMPRESSED traffic.
    #[must_use]
    pub fn with_decompressor(mut self, decompressor: Box<dyn BulkDecompressor>) -> Self {
        self.decompressor = Some(decompressor);
        self
    }

    pub fn negotiated_version(&self) -> Option<CapsVersion> {
        self.negotiated
    }

    pub fn channel_handle(&self, id: ChannelId) -> Option<ChannelHandle> {
        lock(&self.shared.registry)
            .contains(id)
            .then(|| ChannelHandle::new(&self.shared, id))
    }

    pub fn channel_state(&self, id: ChannelId) -> Option<ChannelState> {
        lock(&self.shared.registry).get(id).map(|channel| channel.state)
    }

    /// Runs `f` against the channel's concrete callback object, when the
    /// channel is live and its callback is a `T`.
    pub fn with_channel_callback<T, R, F>(&self, id: ChannelId, f: F) -> Option<R>
    where
        T: ChannelCallback,
        F: FnOnce(&T) -> R,
    {
        self.shared.with_channel_callback(id, f)
    }

    /// Announces a new channel: allocates an id and sends CREATE_REQUEST.
    ///
    /// The channel stays `Announcing` until the client responds.
    pub fn open_channel(&mut self, name: &str, callback: Box<dyn ChannelCallback>) -> DvcResult<ChannelId> {
        if self.negotiated.is_none() {
            return Err(DvcError::other(
                "DvcServer::open_channel",
                "capability handshake not finished",
            ));
        }

        let id = {
            let mut registry = lock(&self.shared.registry);
            let id = registry.allocate_id();
            registry.insert(Channel::new(id, name.to_owned(), callback))?;
            id
        };

        debug!(channel_id = id, channel_name = name, "Announcing dynamic channel");
        self.shared
            .send_pdu(&ServerPdu::CreateRequest(CreateRequestPdu::new(id, name.to_owned())))?;
        Ok(id)
    }

    /// Starts a soft-sync exchange (requires a v3 peer).
    pub fn request_soft_sync(&mut self, request: SoftSyncRequestPdu) -> DvcResult<()> {
        match self.negotiated {
            Some(version) if version.supports_soft_sync() => {
                self.shared.send_pdu(&ServerPdu::SoftSyncRequest(request))
            }
            _ => Err(DvcError::other(
                "DvcServer::request_soft_sync",
                "peer does not support soft-sync",
            )),
        }
    }

    /// Convenience for the common "flush and switch everything" request.
    pub fn request_soft_sync_flush(&mut self) -> DvcResult<()> {
        self.request_soft_sync(SoftSyncRequestPdu::new(SoftSyncFlags::TCP_FLUSHED, Vec::new()))
    }

    fn handle_capabilities_response(&mut self, version: CapsVersion) -> DvcResult<()> {
        debug!(?version, "Got DVC capabilities response");
        self.negotiated = Some(version);

        for (name, callback) in std::mem::take(&mut self.pending) {
            self.open_channel(&name, callback)?;
        }
        Ok(())
    }

    fn handle_create_response(&mut self, id: ChannelId, status_ok: bool, status: u32) -> DvcResult<()> {
        let open_callback = {
            let mut registry = lock(&self.shared.registry);
            let Some(channel) = registry.get_mut(id) else {
                debug!(channel_id = id, "CREATE_RESPONSE for unknown channel; ignoring");
                return Ok(());
            };
            if channel.state != ChannelState::Announcing {
                debug!(channel_id = id, state = ?channel.state, "Unexpected CREATE_RESPONSE; ignoring");
                return Ok(());
            }

            if status_ok {
                channel.state = ChannelState::Open;
                channel.callback()
            } else {
                warn!(channel_id = id, status, "Client rejected dynamic channel");
                registry.remove(id);
                registry.release_id(id);
                return Ok(());
            }
        };

        if let Some(callback) = open_callback {
            let handle = ChannelHandle::new(&self.shared, id);
            let result = lock(&callback).on_open(&handle);
            if let Err(error) = result {
                let error = DvcError::plugin("DvcServer::handle_create_response", error);
                self.shared.fail_channel(id, &error);
            }
        }
        Ok(())
    }
}

impl DvcEngine for DvcServer {
    fn start(&mut self) -> DvcResult<()> {
        let request = CapabilitiesRequestPdu::new(crate::client::LOCAL_CAPS_VERSION);
        debug!(version = ?crate::client::LOCAL_CAPS_VERSION, "Sending DVC capabilities request");
        self.shared.send_pdu(&ServerPdu::CapabilitiesRequest(request))
    }

    fn process_frame(&mut self, frame: &[u8]) -> DvcResult<()> {
        let pdu = match dynvc_core::decode::<ClientPdu<'_>>(frame) {
            Ok(pdu) => pdu,
            Err(error) => {
                return match error.kind() {
                    DecodeErrorKind::UnexpectedMessageType { got } => {
                        warn!(cmd = got, "Skipping frame with unknown DVC command");
                        Ok(())
                    }
                    DecodeErrorKind::NotEnoughBytes { .. } => {
                        Err(DvcError::truncated("DvcServer::process_frame").with_source(error))
                    }
                    DecodeErrorKind::InvalidField { reason, .. } if reason.starts_with("reserved") => {
                        Err(DvcError::reserved_field("DvcServer::process_frame").with_source(error))
                    }
                    _ => Err(DvcError::decode(error)),
                };
            }
        };

        match pdu {
            ClientPdu::CapabilitiesResponse(response) => self.handle_capabilities_response(response.version),
            ClientPdu::CreateResponse(response) => self.handle_create_response(
                response.channel_id,
                response.creation_status.is_ok(),
                response.creation_status.into(),
            ),
            ClientPdu::Data(data) => handle_data_pdu(
                &self.shared,
                &data,
                self.negotiated,
                self.decompressor.as_mut(),
            ),
            ClientPdu::Close(close) => {
                let id = close.channel_id;
                let result = handle_remote_close(&self.shared, id);
                lock(&self.shared.registry).release_id(id);
                result
            }
            ClientPdu::SoftSyncResponse(response) => {
                debug!(tunnels = response.tunnels_to_switch.len(), "Got soft-sync response");
                Ok(())
            }
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let ids = {
            let registry = lock(&self.shared.registry);
            registry.list_all()
        };
        for id in ids.into_iter().rev() {
            let callback = lock(&self.shared.registry)
                .remove(id)
                .and_then(|(_, callback)| callback);
            run_on_close(callback);
        }

        self.shared.close_transport();
    }
}

impl Drop for DvcServer {
    fn drop(&mut self) {
        self.teardown();
    }
}
