//! # Decoder Plugins
//!
//! The entry point codec implementations provide, and a registry to pick
//! one for a stream.

use crate::client::DecoderClient;
use crate::error::Result;
use crate::input::InputStream;
use std::sync::Arc;
use tracing::debug;

/// A codec implementation.
///
/// `stream_decode` runs on the worker thread. It must call
/// [`DecoderClient::ready`] once, then read through
/// [`crate::stream_access`] and submit decoded PCM until the stream ends
/// or a stop command arrives. Returning `Ok(())` finishes the session;
/// returning [`crate::DecoderError::Stopped`] acknowledges a stop.
pub trait DecoderPlugin: Send + Sync {
    /// Short unique name, e.g. `"pcm"`.
    fn name(&self) -> &str;

    /// File name suffixes this plugin handles, lowercase without the dot.
    fn suffixes(&self) -> &[&str] {
        &[]
    }

    /// MIME types this plugin handles.
    fn mime_types(&self) -> &[&str] {
        &[]
    }

    /// Decode `input` until it ends or the session is stopped.
    fn stream_decode(
        &self,
        client: &mut dyn DecoderClient,
        input: &mut dyn InputStream,
    ) -> Result<()>;

    /// Returns `true` if `suffix` (without the dot) is handled.
    fn supports_suffix(&self, suffix: &str) -> bool {
        self.suffixes()
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(suffix))
    }

    /// Returns `true` if `mime_type` is handled. Parameters such as
    /// `;rate=44100` are ignored.
    fn supports_mime_type(&self, mime_type: &str) -> bool {
        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        self.mime_types()
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(essence))
    }
}

/// Ordered collection of plugins. Earlier registrations win lookups.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn DecoderPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the plugins that ship with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::plugins::PcmDecoderPlugin::default()));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn DecoderPlugin>) {
        debug!(plugin = plugin.name(), "Registering decoder plugin");
        self.plugins.push(plugin);
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn DecoderPlugin>> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .cloned()
    }

    pub fn find_by_suffix(&self, suffix: &str) -> Option<Arc<dyn DecoderPlugin>> {
        let suffix = suffix.trim_start_matches('.');
        self.plugins
            .iter()
            .find(|plugin| plugin.supports_suffix(suffix))
            .cloned()
    }

    pub fn find_by_mime_type(&self, mime_type: &str) -> Option<Arc<dyn DecoderPlugin>> {
        self.plugins
            .iter()
            .find(|plugin| plugin.supports_mime_type(mime_type))
            .cloned()
    }

    /// Pick a plugin for `uri` by its file name suffix.
    pub fn find_for_uri(&self, uri: &str) -> Option<Arc<dyn DecoderPlugin>> {
        let path = uri.split(['?', '#']).next().unwrap_or_default();
        let name = path.rsplit('/').next().unwrap_or_default();
        let (_, suffix) = name.rsplit_once('.')?;
        self.find_by_suffix(suffix)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
