//! Single entry point for loading [`RobotoConfig`].

use config::builder::DefaultState;
use config::ConfigBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::merge::merge_policy;
use crate::config::sources::{environment, explicit_file, global_file};
use crate::config::RobotoConfig;
use crate::error::ApiError;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from every source and validate it.
    ///
    /// Precedence (highest last): defaults, global file, `explicit` file, `ROBOTO_*`
    /// environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<RobotoConfig, ApiError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            debug!(config_path = %path.display(), "Loading explicit configuration file");
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = environment::add_to_builder(builder);
        build_validated(builder)
    }

    /// Load a single file over the defaults, ignoring the global file and environment.
    pub fn load_from_file(path: &Path) -> Result<RobotoConfig, ApiError> {
        let builder = explicit_file::add_to_builder(merge_policy::builder_with_defaults()?, path)?;
        build_validated(builder)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}

fn build_validated(builder: ConfigBuilder<DefaultState>) -> Result<RobotoConfig, ApiError> {
    let config: RobotoConfig = builder.build()?.try_deserialize()?;
    config.ensure_valid()?;
    Ok(config)
}
