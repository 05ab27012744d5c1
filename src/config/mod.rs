mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    FilterSettings, LogSettings, MessageSettings, QueueSettings, RelaySettings, ServerSettings,
    Settings,
};

/// Prefix for environment overrides, e.g. `POPRELAY_QUEUE__MAX_RETRIES=5`.
pub const ENV_PREFIX: &str = "POPRELAY";

/// Loads the configuration from `config/default` and the environment,
/// merged over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default", false)
}

/// Loads the configuration from `path` (extension optional) and the environment.
///
/// When `required` is false a missing file is silently skipped.
/// A `.env` file in the working directory is applied to the environment first.
pub fn load_config_from(path: &str, required: bool) -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name(path).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
