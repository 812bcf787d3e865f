use std::sync::OnceLock;

use crate::plugin::{Plugin, PluginHost};
use crate::{DvcError, DvcErrorExt as _, DvcResult};

/// Builds a fresh plugin instance for each connection.
pub type PluginConstructor = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// One registered plugin: its name plus a per-connection constructor.
///
/// Descriptors come from three places: build-time registration through
/// [`PluginProviderBuilder`], programmatic construction in tests, and the
/// `dlopen` loader (see [`load_plugin`]) when that feature is enabled.
pub struct PluginDescriptor {
    name: String,
    constructor: PluginConstructor,
    // Keeps a dynamically loaded library alive for as long as the
    // descriptor; plugin code must not outlive its mapping.
    #[cfg(feature = "dlopen")]
    _library: Option<libloading::Library>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, constructor: PluginConstructor) -> Self {
        Self {
            name: name.into(),
            constructor,
            #[cfg(feature = "dlopen")]
            _library: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Box<dyn Plugin> {
        (self.constructor)()
    }
}

impl core::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginDescriptor").field("name", &self.name).finish()
    }
}

/// The process-wide plugin table: sealed once at startup, immutable after.
pub struct PluginProvider {
    descriptors: Vec<PluginDescriptor>,
}

static PROVIDER: OnceLock<PluginProvider> = OnceLock::new();

impl PluginProvider {
    pub fn builder() -> PluginProviderBuilder {
        PluginProviderBuilder {
            descriptors: Vec::new(),
        }
    }

    /// The installed provider, if [`PluginProviderBuilder::install`] ran.
    pub fn global() -> Option<&'static PluginProvider> {
        PROVIDER.get()
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Instantiates every registered plugin into a fresh per-connection
    /// [`PluginHost`].
    pub fn new_host(&self) -> PluginHost {
        let mut host = PluginHost::new();
        for descriptor in &self.descriptors {
            host.add_boxed_plugin(descriptor.instantiate());
        }
        host
    }
}

/// Append-only registration of plugins, sealed with [`install`](Self::install).
pub struct PluginProviderBuilder {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginProviderBuilder {
    /// Registers a statically linked plugin.
    #[must_use]
    pub fn register<P, F>(mut self, name: &str, constructor: F) -> Self
    where
        P: Plugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.descriptors.push(PluginDescriptor::new(
            name,
            Box::new(move || Box::new(constructor()) as Box<dyn Plugin>),
        ));
        self
    }

    /// Registers an already built descriptor (e.g. from the dynamic loader).
    #[must_use]
    pub fn register_descriptor(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Seals the table as the process-global provider.
    ///
    /// Fails when a provider was already installed.
    pub fn install(self) -> DvcResult<()> {
        info!(count = self.descriptors.len(), "Installing process-global plugin provider");
        PROVIDER
            .set(PluginProvider {
                descriptors: self.descriptors,
            })
            .map_err(|_| {
                DvcError::other("PluginProviderBuilder::install", "provider already installed")
            })
    }
}

#[cfg(feature = "dlopen")]
pub use self::dlopen::{load_plugin, PLUGIN_API_VERSION};

#[cfg(feature = "dlopen")]
mod dlopen {
    use std::path::Path;

    use super::{PluginConstructor, PluginDescriptor};
    use crate::plugin::Plugin;
    use crate::{DvcError, DvcErrorExt as _, DvcResult};

    /// ABI revision expected from a loadable plugin.
    pub const PLUGIN_API_VERSION: u32 = 1;

    /// Symbol reporting the plugin's ABI revision.
    const API_VERSION_SYMBOL: &[u8] = b"dynvc_plugin_api_version";
    /// Default entry symbol; yields a fresh plugin instance per call.
    const DEFAULT_ENTRY_SYMBOL: &[u8] = b"dynvc_plugin_entry";

    type ApiVersionFn = unsafe extern "C" fn() -> u32;
    type EntryFn = fn() -> Box<dyn Plugin>;

    fn loading_err(context: &'static str, e: libloading::Error) -> DvcError {
        DvcError::other(context, "plugin library error").with_source(e)
    }

    /// Loads a plugin from a dynamic library.
    ///
    /// The library must export `dynvc_plugin_api_version` matching
    /// [`PLUGIN_API_VERSION`] and an entry function (default
    /// `dynvc_plugin_entry`) returning a boxed [`Plugin`]. The library stays
    /// mapped for as long as the returned descriptor lives.
    pub fn load_plugin(path: &Path, entry_symbol: Option<&[u8]>) -> DvcResult<PluginDescriptor> {
        info!(?path, "Loading DVC plugin");

        // SAFETY: loading a library runs its initializers; the plugin is
        // operator-supplied trusted code, same trust level as the host.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| loading_err("load_plugin", e))?;

        // SAFETY: the symbol's type is part of the plugin ABI contract.
        let version_symbol: libloading::Symbol<'_, ApiVersionFn> =
            unsafe { library.get(API_VERSION_SYMBOL) }.map_err(|e| loading_err("load_plugin", e))?;
        // SAFETY: the declared signature takes no arguments and returns u32.
        let api_version = unsafe { version_symbol() };

        if api_version != PLUGIN_API_VERSION {
            return Err(DvcError::other(
                "load_plugin",
                "plugin ABI version mismatch",
            ));
        }

        // SAFETY: the entry function signature is part of the versioned ABI
        // checked just above.
        let entry_symbol: libloading::Symbol<'_, EntryFn> =
            unsafe { library.get(entry_symbol.unwrap_or(DEFAULT_ENTRY_SYMBOL)) }
                .map_err(|e| loading_err("load_plugin", e))?;
        let entry: EntryFn = *entry_symbol;
        drop(entry_symbol);

        let probe = entry();
        let name = probe.name().to_owned();
        drop(probe);

        let constructor: PluginConstructor = Box::new(move || entry());

        let mut descriptor = PluginDescriptor::new(name, constructor);
        descriptor._library = Some(library);
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPlugin;

    dynvc_core::impl_as_any!(CountingPlugin);

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }

        fn init(&mut self, _host: &mut crate::PluginHost) -> DvcResult<()> {
            Ok(())
        }
    }

    #[test]
    fn descriptor_builds_fresh_instances() {
        let descriptor = PluginDescriptor::new(
            "counting",
            Box::new(|| Box::new(CountingPlugin) as Box<dyn Plugin>),
        );
        assert_eq!(descriptor.name(), "counting");
        assert_eq!(descriptor.instantiate().name(), "counting");
        assert_eq!(descriptor.instantiate().name(), "counting");
    }
}
