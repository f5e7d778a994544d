pub mod lookup;
pub mod proxy;

pub use lookup::LookupCommand;
pub use proxy::ProxyCommand;

use anyhow::Context;
use gatehouse_core::GatehouseSettings;
use std::path::Path;

/// Settings from an optional YAML file, defaults otherwise
pub(crate) fn load_settings(path: Option<&Path>) -> anyhow::Result<GatehouseSettings> {
    match path {
        Some(path) => GatehouseSettings::from_yaml_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(GatehouseSettings::default()),
    }
}
