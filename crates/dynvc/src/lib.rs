#![cfg_attr(doc, doc = include_str!("../README.md"))]
#![allow(clippy::cast_possible_truncation)]

#[macro_use]
extern crate tracing;

// Re-export the wire-format crate for convenience
#[rustfmt::skip] // do not re-order this pub use
pub use dynvc_pdu;

mod channel;
mod client;
mod connection;
mod error;
mod fragment;
mod plugin;
mod provider;
mod reassembly;
mod registry;
mod server;

pub use self::channel::ChannelState;
pub use self::client::{DvcClient, LOCAL_CAPS_VERSION};
pub use self::connection::{BulkDecompressor, ChannelHandle, DvcEngine, TransportWrite};
pub use self::error::{DvcError, DvcErrorExt, DvcErrorKind, DvcResult};
pub use self::fragment::fragment_message;
pub use self::plugin::{ChannelCallback, Listener, NewChannel, Plugin, PluginHost, WELL_KNOWN_CHANNELS};
#[cfg(feature = "dlopen")]
pub use self::provider::{load_plugin, PLUGIN_API_VERSION};
pub use self::provider::{PluginConstructor, PluginDescriptor, PluginProvider, PluginProviderBuilder};
pub use self::server::DvcServer;

/// A dynamic channel id, re-exported from the wire format.
pub type ChannelId = dynvc_pdu::ChannelId;
