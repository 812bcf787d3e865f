use std::any::Any;
use std::collections::BTreeMap;

use dynvc_core::AsAny;

use crate::{ChannelHandle, DvcResult};

/// Channel names that match case-insensitively, per RDP convention.
/// Everything else compares case-sensitively.
pub const WELL_KNOWN_CHANNELS: &[&str] = &["RDPGFX", "AUDIO_INPUT", "AUDIO_PLAYBACK", "SSHAGENT", "ECHO", "DISPLAY"];

fn names_match(registered: &str, requested: &str) -> bool {
    if registered == requested {
        return true;
    }
    WELL_KNOWN_CHANNELS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(registered) && registered.eq_ignore_ascii_case(requested))
}

/// Per-channel callback object, produced by a [`Listener`] when it accepts a
/// channel.
///
/// Invocations for one channel are serial: `on_open` happens-before any
/// `on_data_received`, which happens-before `on_close`. Across channels no
/// ordering is guaranteed and callbacks must tolerate interleaving.
///
/// The [`AsAny`] bound lets owners recover the concrete callback type, e.g.
/// through [`DvcClient::with_channel_callback`](crate::DvcClient::with_channel_callback).
pub trait ChannelCallback: AsAny + Send {
    /// The channel reached the `Open` state.
    fn on_open(&mut self, _channel: &ChannelHandle) -> DvcResult<()> {
        Ok(())
    }

    /// One complete (reassembled) message arrived.
    fn on_data_received(&mut self, channel: &ChannelHandle, data: &[u8]) -> DvcResult<()>;

    /// The channel is gone. Always the last call; invoked exactly once.
    fn on_close(&mut self) {}
}

dynvc_core::assert_obj_safe!(ChannelCallback);

/// Snapshot of a pending channel handed to listeners at CREATE time.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub id: dynvc_pdu::ChannelId,
    pub name: String,
}

/// Factory consulted for every incoming CREATE_REQUEST whose name matches.
///
/// Returning `None` rejects the channel; the peer sees a CREATE_RESPONSE
/// with a nonzero status.
pub trait Listener: Send {
    fn accept(&self, channel: &NewChannel) -> Option<Box<dyn ChannelCallback>>;
}

impl<F> Listener for F
where
    F: Fn(&NewChannel) -> Option<Box<dyn ChannelCallback>> + Send,
{
    fn accept(&self, channel: &NewChannel) -> Option<Box<dyn ChannelCallback>> {
        self(channel)
    }
}

/// A DVC plugin: a named bundle of listeners with a per-connection lifecycle.
///
/// `init` runs once per connection before any traffic and is where listeners
/// are registered; `terminate` runs once at connection teardown, after every
/// channel saw its `on_close`. [`AsAny`] lets
/// [`PluginHost::plugin_downcast_ref`] hand the instance back to code that
/// knows its concrete type.
pub trait Plugin: AsAny + Send {
    fn name(&self) -> &str;

    fn init(&mut self, host: &mut PluginHost) -> DvcResult<()>;

    fn terminate(&mut self, _host: &mut PluginHost) {}
}

dynvc_core::assert_obj_safe!(Plugin);

struct RegisteredListener {
    channel_name: String,
    plugin_name: String,
    listener: Box<dyn Listener>,
}

/// Per-connection plugin host: owns the plugin instances, their listener
/// table, and the keyed scratchpad plugins use for per-connection state.
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Box<dyn Plugin>>,
    listeners: Vec<RegisteredListener>,
    /// Which plugin is currently running `init`, so `create_listener` can
    /// attribute the listener.
    current_plugin: Option<String>,
    data: BTreeMap<(String, String), Box<dyn Any + Send>>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin instance to this connection.
    ///
    /// Usable both for statically registered plugins and for programmatic
    /// (test) injection.
    pub fn add_plugin<P: Plugin + 'static>(&mut self, plugin: P) {
        self.plugins.push(Box::new(plugin));
    }

    pub(crate) fn add_boxed_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Installs a listener for `channel_name` on behalf of the plugin whose
    /// `init` is currently running.
    pub fn create_listener<L: Listener + 'static>(&mut self, channel_name: &str, listener: L) {
        let plugin_name = self.current_plugin.clone().unwrap_or_default();
        debug!(channel_name, plugin_name, "Registering DVC listener");
        self.listeners.push(RegisteredListener {
            channel_name: channel_name.to_owned(),
            plugin_name,
            listener: Box::new(listener),
        });
    }

    /// Runs every plugin's `init`, letting each register listeners.
    pub fn init_plugins(&mut self) -> DvcResult<()> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let mut result = Ok(());
        for plugin in &mut plugins {
            self.current_plugin = Some(plugin.name().to_owned());
            result = plugin.init(self);
            if result.is_err() {
                break;
            }
        }
        self.current_plugin = None;
        self.plugins = plugins;
        result
    }

    /// Runs every plugin's `terminate`, in reverse registration order.
    pub fn terminate_plugins(&mut self) {
        let mut plugins = std::mem::take(&mut self.plugins);
        for plugin in plugins.iter_mut().rev() {
            plugin.terminate(self);
        }
        self.plugins = plugins;
    }

    /// Resolves the listener for a channel name, along with the owning
    /// plugin's name.
    pub(crate) fn lookup_listener(&self, channel_name: &str) -> Option<(&dyn Listener, &str)> {
        self.listeners
            .iter()
            .find(|entry| names_match(&entry.channel_name, channel_name))
            .map(|entry| (entry.listener.as_ref(), entry.plugin_name.as_str()))
    }

    /// Borrows the plugin instance registered under `name`.
    pub fn get_plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .map(|boxed| boxed.as_ref())
    }

    /// Recovers a plugin instance by its concrete type.
    pub fn plugin_downcast_ref<T: Plugin>(&self) -> Option<&T> {
        self.plugins.iter().find_map(|plugin| plugin.as_any().downcast_ref())
    }

    /// Stores a per-connection value for `(plugin_name, key)`.
    pub fn set_plugin_data(&mut self, plugin_name: &str, key: &str, value: Box<dyn Any + Send>) {
        self.data.insert((plugin_name.to_owned(), key.to_owned()), value);
    }

    /// Fetches a per-connection value previously stored by `set_plugin_data`.
    pub fn get_plugin_data(&self, plugin_name: &str, key: &str) -> Option<&(dyn Any + Send)> {
        self.data
            .get(&(plugin_name.to_owned(), key.to_owned()))
            .map(|boxed| boxed.as_ref())
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder;

    dynvc_core::impl_as_any!(Recorder);

    impl ChannelCallback for Recorder {
        fn on_data_received(&mut self, _channel: &ChannelHandle, _data: &[u8]) -> DvcResult<()> {
            Ok(())
        }
    }

    struct TestPlugin {
        channel: &'static str,
    }

    dynvc_core::impl_as_any!(TestPlugin);

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            "test"
        }

        fn init(&mut self, host: &mut PluginHost) -> DvcResult<()> {
            host.create_listener(self.channel, |_: &NewChannel| {
                Some(Box::new(Recorder) as Box<dyn ChannelCallback>)
            });
            Ok(())
        }
    }

    #[test]
    fn listener_is_registered_under_initializing_plugin() {
        let mut host = PluginHost::new();
        host.add_plugin(TestPlugin { channel: "TEST" });
        host.init_plugins().unwrap();

        let (_, plugin_name) = host.lookup_listener("TEST").unwrap();
        assert_eq!(plugin_name, "test");
    }

    #[test]
    fn well_known_names_match_case_insensitively() {
        let mut host = PluginHost::new();
        host.add_plugin(TestPlugin { channel: "SSHAGENT" });
        host.init_plugins().unwrap();

        assert!(host.lookup_listener("sshagent").is_some());
        assert!(host.lookup_listener("SshAgent").is_some());
    }

    #[test]
    fn other_names_match_case_sensitively() {
        let mut host = PluginHost::new();
        host.add_plugin(TestPlugin {
            channel: "Contoso::Widget",
        });
        host.init_plugins().unwrap();

        assert!(host.lookup_listener("Contoso::Widget").is_some());
        assert!(host.lookup_listener("contoso::widget").is_none());
    }

    #[test]
    fn plugins_can_be_recovered_by_name_and_type() {
        let mut host = PluginHost::new();
        host.add_plugin(TestPlugin { channel: "TEST" });

        assert!(host.get_plugin("test").is_some());
        assert!(host.get_plugin("other").is_none());

        let concrete = host.plugin_downcast_ref::<TestPlugin>().unwrap();
        assert_eq!(concrete.channel, "TEST");
    }

    #[test]
    fn plugin_data_round_trips() {
        let mut host = PluginHost::new();
        host.set_plugin_data("test", "counter", Box::new(41u32));

        let value = host
            .get_plugin_data("test", "counter")
            .and_then(|any| any.downcast_ref::<u32>())
            .copied();
        assert_eq!(value, Some(41));
    }
}
