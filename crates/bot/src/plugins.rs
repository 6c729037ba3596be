use std::{collections::HashMap, path::Path, sync::Arc};

use plugin_core::{Plugin, PluginRegistry, PluginSpec, factory::PluginFactory};
use tracing::{info, warn};

use crate::BotConfig;

fn factories() -> Vec<Box<dyn PluginFactory>> {
    vec![Box::new(plugin_fbxnano::FbxNanoPlugin)]
}

/// Builds the registry from plugin defaults, `config.yaml` specs and
/// `<plugins_dir>/<id>/config.yaml`, in increasing precedence.
pub async fn build_registry(config: &BotConfig, plugins_dir: &Path) -> Arc<PluginRegistry> {
    let factories = factories();
    let mut defaults = Vec::new();
    for factory in &factories {
        factory.register_defaults(&mut defaults);
    }
    // Plugins keep no per-room state; one instance serves every room.
    let plugins: HashMap<&'static str, Arc<dyn Plugin>> = factories
        .iter()
        .map(|f| {
            let plugin = f.build();
            (plugin.id(), plugin)
        })
        .collect();

    let mut specs = config.plugins.clone().unwrap_or_default();
    for default in defaults {
        merge_default_spec(&mut specs, default);
    }

    let registry = Arc::new(PluginRegistry::new());
    for mut spec in specs {
        let Some(plugin) = plugins.get(spec.id.as_str()).map(Arc::clone) else {
            warn!("Unknown plugin ID: {}", spec.id);
            continue;
        };
        if let Some(file_cfg) = load_plugin_config(plugins_dir, &spec.id) {
            spec.config = merge_yaml(file_cfg, spec.config);
        }
        if let Err(e) = plugin.activate(&spec) {
            warn!(plugin = %spec.id, error = %e, "Plugin refused activation");
            continue;
        }
        info!(plugin = %spec.id, commands = ?spec.triggers.commands, "Registered plugin");
        registry.register(spec, plugin).await;
    }

    registry
}

/// Merges `high` over `low`: mappings key-wise, sequences concatenated,
/// scalars from `high`. A null `high` keeps `low`.
pub fn merge_yaml(high: serde_yaml::Value, low: serde_yaml::Value) -> serde_yaml::Value {
    use serde_yaml::Value::{Mapping, Null, Sequence};
    match (high, low) {
        (Mapping(mut a), Mapping(b)) => {
            for (k, v_b) in b {
                match a.get_mut(&k) {
                    Some(v_a) => {
                        let merged = merge_yaml(v_a.clone(), v_b);
                        *v_a = merged;
                    }
                    None => {
                        a.insert(k, v_b);
                    }
                }
            }
            Mapping(a)
        }
        (Sequence(mut a), Sequence(b)) => {
            a.extend(b);
            Sequence(a)
        }
        (Null, b) => b,
        (a, _b) => a,
    }
}

fn load_plugin_config(root: &Path, id: &str) -> Option<serde_yaml::Value> {
    let path = root.join(id).join("config.yaml");
    match std::fs::read_to_string(&path) {
        Ok(s) => match serde_yaml::from_str::<serde_yaml::Value>(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to parse plugin config YAML");
                None
            }
        },
        Err(e) => {
            if path.exists() {
                warn!(plugin = %id, file = %path.display(), error = %e, "Failed to read plugin config file");
            }
            None
        }
    }
}

/// Folds a plugin's default spec into the user-provided one: missing
/// commands are added and the config template fills unset keys.
fn merge_default_spec(specs: &mut Vec<PluginSpec>, default: PluginSpec) {
    if let Some(existing) = specs.iter_mut().find(|s| s.id == default.id) {
        for cmd in default.triggers.commands {
            if !existing
                .triggers
                .commands
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&cmd))
            {
                existing.triggers.commands.push(cmd);
            }
        }
        let user_cfg = core::mem::take(&mut existing.config);
        existing.config = merge_yaml(user_cfg, default.config);
    } else {
        specs.push(default);
    }
}
