use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Loads configuration into a struct from an optional file overlaid with
/// environment variables.
///
/// The file format (TOML, YAML, JSON, ...) follows its extension. Environment
/// variables are read as `<PREFIX>_<FIELD>`, e.g. `FAUCET_CHAIN_ID`, and win
/// over file values. Fields absent from both sources fall back to the
/// struct's serde defaults.
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: Option<P>, env_prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        let path_str = path.as_ref().to_str().context("Invalid config path")?;
        builder = builder.add_source(File::with_name(path_str));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_origins"),
        )
        .build()
        .context("Failed to build configuration")?;

    settings.try_deserialize::<T>().context("Failed to deserialize configuration")
}
