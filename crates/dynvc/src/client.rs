use std::sync::Arc;

use dynvc_core::DecodeErrorKind;
use dynvc_pdu::{
    CapabilitiesResponsePdu, CapsVersion, ChannelId, ClientPdu, CreateRequestPdu, CreateResponsePdu, CreationStatus,
    ServerPdu, SoftSyncRequestPdu, SoftSyncResponsePdu,
};

use crate::channel::{Channel, ChannelState};
use crate::connection::{
    handle_data_pdu, handle_remote_close, lock, run_on_close, BulkDecompressor, ConnectionShared, Role,
};
use crate::plugin::{ChannelCallback, NewChannel, PluginHost};
use crate::{ChannelHandle, DvcEngine, DvcError, DvcErrorExt as _, DvcResult, TransportWrite};

/// Highest capability version this implementation speaks.
pub const LOCAL_CAPS_VERSION: CapsVersion = CapsVersion::V3;

/// Client-side DVC connection engine.
///
/// Consumes server PDUs one frame at a time, drives the channel lifecycle,
/// and upcalls into plugin callbacks. Channels are created by the server;
/// the client's contribution is its listener table.
pub struct DvcClient {
    shared: Arc<ConnectionShared>,
    host: PluginHost,
    negotiated: Option<CapsVersion>,
    decompressor: Option<Box<dyn BulkDecompressor>>,
    torn_down: bool,
}

impl DvcClient {
    /// Builds the engine and runs every plugin's `init`.
    pub fn new(writer: Box<dyn TransportWrite>, mtu: usize, mut host: PluginHost) -> DvcResult<Self> {
        host.init_plugins()?;
        Ok(Self {
            shared: Arc::new(ConnectionShared::new(writer, mtu, Role::Client)),
            host,
            negotiated: None,
            decompressor: None,
            torn_down: false,
        })
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

    /// A write handle for an existing channel.
    pub fn channel_handle(&self, id: ChannelId) -> Option<ChannelHandle> {
        lock(&self.shared.registry)
            .contains(id)
            .then(|| ChannelHandle::new(&self.shared, id))
    }

    /// Current lifecycle state of a channel, if it is live.
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

    pub fn plugin_host(&self) -> &PluginHost {
        &self.host
    }

    pub fn plugin_host_mut(&mut self) -> &mut PluginHost {
        &mut self.host
    }

    fn respond_capabilities(&mut self, requested: CapsVersion) -> DvcResult<()> {
        let version = requested.min(LOCAL_CAPS_VERSION);
        debug!(?requested, ?version, "Sending DVC capabilities response");
        self.negotiated = Some(version);
        self.shared
            .send_pdu(&ClientPdu::CapabilitiesResponse(CapabilitiesResponsePdu::new(version)))
    }

    fn handle_create_request(&mut self, request: CreateRequestPdu) -> DvcResult<()> {
        debug!(channel_id = request.channel_id, channel_name = %request.channel_name, "Got DVC create request");

        if self.negotiated.is_none() {
            // Some servers send CREATE before the capability handshake
            // settles; answer the handshake first at the lowest version.
            debug!("Create request before capabilities exchange; responding with V1 capabilities first");
            self.respond_capabilities(CapsVersion::V1)?;
        }

        let id = request.channel_id;
        if lock(&self.shared.registry).contains(id) {
            return Err(DvcError::duplicate_channel("DvcClient::handle_create_request", id));
        }

        let new_channel = NewChannel {
            id,
            name: request.channel_name.clone(),
        };

        let callback = self
            .host
            .lookup_listener(&request.channel_name)
            .and_then(|(listener, plugin_name)| {
                trace!(channel_name = %request.channel_name, plugin_name, "Consulting listener");
                listener.accept(&new_channel)
            });

        let Some(callback) = callback else {
            debug!(channel_name = %request.channel_name, "No listener accepted the channel");
            return self.shared.send_pdu(&ClientPdu::CreateResponse(CreateResponsePdu::new(
                id,
                CreationStatus::NO_LISTENER,
            )));
        };

        let open_callback = {
            let mut registry = lock(&self.shared.registry);
            let mut channel = Channel::new(id, request.channel_name, callback);
            channel.state = ChannelState::Open;
            let open_callback = channel.callback();
            registry.insert(channel)?;
            open_callback
        };

        self.shared
            .send_pdu(&ClientPdu::CreateResponse(CreateResponsePdu::new(id, CreationStatus::OK)))?;

        if let Some(callback) = open_callback {
            let handle = ChannelHandle::new(&self.shared, id);
            let result = lock(&callback).on_open(&handle);
            if let Err(error) = result {
                let error = DvcError::plugin("DvcClient::handle_create_request", error);
                self.shared.fail_channel(id, &error);
            }
        }

        Ok(())
    }

    fn handle_soft_sync_request(&mut self, request: SoftSyncRequestPdu) -> DvcResult<()> {
        let Some(version) = self.negotiated else {
            return Err(DvcError::reserved_field("DvcClient::handle_soft_sync_request"));
        };
        if !version.supports_soft_sync() {
            return Err(DvcError::reserved_field("DvcClient::handle_soft_sync_request"));
        }

        debug!(?request.flags, tunnels = request.channel_lists.len(), "Acknowledging soft-sync request");
        let tunnels = request
            .channel_lists
            .iter()
            .map(|list| list.tunnel_type)
            .collect::<Vec<_>>();
        self.shared
            .send_pdu(&ClientPdu::SoftSyncResponse(SoftSyncResponsePdu::new(tunnels)))
    }
}

impl DvcEngine for DvcClient {
    fn process_frame(&mut self, frame: &[u8]) -> DvcResult<()> {
        let pdu = match dynvc_core::decode::<ServerPdu<'_>>(frame) {
            Ok(pdu) => pdu,
            Err(error) => {
                return match error.kind() {
                    DecodeErrorKind::UnexpectedMessageType { got } => {
                        // Best-effort: skip the frame, keep the connection.
                        warn!(cmd = got, "Skipping frame with unknown DVC command");
                        Ok(())
                    }
                    DecodeErrorKind::NotEnoughBytes { .. } => {
                        Err(DvcError::truncated("DvcClient::process_frame").with_source(error))
                    }
                    DecodeErrorKind::InvalidField { reason, .. } if reason.starts_with("reserved") => {
                        Err(DvcError::reserved_field("DvcClient::process_frame").with_source(error))
                    }
                    _ => Err(DvcError::decode(error)),
                };
            }
        };

        match pdu {
            ServerPdu::CapabilitiesRequest(request) => {
                debug!(version = ?request.version(), "Got DVC capabilities request");
                self.respond_capabilities(request.version())
            }
            ServerPdu::CreateRequest(request) => self.handle_create_request(request),
            ServerPdu::Data(data) => handle_data_pdu(
                &self.shared,
                &data,
                self.negotiated,
                self.decompressor.as_mut(),
            ),
            ServerPdu::Close(close) => handle_remote_close(&self.shared, close.channel_id),
            ServerPdu::SoftSyncRequest(request) => self.handle_soft_sync_request(request),
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        // Channels go down in reverse creation order, then the plugins.
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

        self.host.terminate_plugins();
        self.shared.close_transport();
    }
}

impl Drop for DvcClient {
    fn drop(&mut self) {
        self.teardown();
    }
}
