#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

use dynvc::{ChannelCallback, ChannelHandle, DvcResult, NewChannel, Plugin, PluginHost};
use dynvc_core::impl_as_any;

/// ECHO dynamic virtual channel name per MS-RDPEECO.
pub const CHANNEL_NAME: &str = "ECHO";

/// Plugin registering a listener for the well-known `ECHO` channel.
#[derive(Debug, Default)]
pub struct EchoPlugin;

impl_as_any!(EchoPlugin);

impl EchoPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }

    fn init(&mut self, host: &mut PluginHost) -> DvcResult<()> {
        host.create_listener(CHANNEL_NAME, |channel: &NewChannel| {
            debug!(channel_id = channel.id, "Accepting ECHO channel");
            Some(Box::new(EchoCallback) as Box<dyn ChannelCallback>)
        });
        Ok(())
    }
}

/// Writes every received message straight back on the same channel.
#[derive(Debug, Default)]
pub struct EchoCallback;

impl_as_any!(EchoCallback);

impl ChannelCallback for EchoCallback {
    fn on_open(&mut self, channel: &ChannelHandle) -> DvcResult<()> {
        debug!(channel_id = channel.id(), "ECHO channel open");
        Ok(())
    }

    fn on_data_received(&mut self, channel: &ChannelHandle, data: &[u8]) -> DvcResult<()> {
        trace!(channel_id = channel.id(), size = data.len(), "Echoing message");
        channel.write(data)
    }

    fn on_close(&mut self) {
        debug!("ECHO channel closed");
    }
}
