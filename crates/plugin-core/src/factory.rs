use std::sync::Arc;

use crate::{Plugin, PluginSpec};

/// Builds a plugin and contributes its default spec.
pub trait PluginFactory {
    /// Pushes the plugin's default spec, including its config template.
    ///
    /// # Arguments
    ///
    /// * `specs` - Collected defaults; the host merges them under the
    ///   user-provided specs.
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>);

    /// Builds the plugin instance.
    #[must_use]
    fn build(&self) -> Arc<dyn Plugin>;
}
