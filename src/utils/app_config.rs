use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use config::{Environment, Source};
use lazy_static::lazy_static;

use super::error::Result;

static DEFAULT_CONFIG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/resources/default_config.toml"));

/// A new type to impl `config::Source`
#[derive(Debug, Clone, serde::Deserialize)]
struct Preset(HashMap<String, config::Value>);

impl config::Source for Preset {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<HashMap<String, config::Value>, config::ConfigError> {
        let mut kv = self.0.clone();
        // a preset must not bring in more presets
        kv.remove("presets");
        Ok(kv)
    }
}

/// Layered application config. Later layers win: embedded defaults, `DAQSIM_*`
/// environment variables, a config file, presets, then explicit overrides.
pub struct AppConfig(config::Config);

impl AppConfig {
    fn new() -> Self {
        Self(config::Config::new())
    }

    pub fn setup(&mut self) -> Result<&mut Self> {
        self.0
            .merge(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))?;
        // DAQSIM_RUN__HORIZON_DAYS sets run.horizon_days
        self.0.merge(Environment::with_prefix("DAQSIM").separator("__"))?;
        Ok(self)
    }

    /// Load config from a file
    pub fn use_file(&mut self, path: &Path) -> Result<&mut Self> {
        self.0.merge(config::File::from(path))?;
        Ok(self)
    }

    /// Load preset
    pub fn use_preset(&mut self, name: &str) -> Result<&mut Self> {
        let preset: Preset = self.get(format!("presets.{}", name))?;
        self.0.merge(preset)?;
        Ok(self)
    }

    /// Force a single value, taking precedence over every other layer
    pub fn set_override<K, V>(&mut self, key: K, value: V) -> Result<&mut Self>
    where
        K: AsRef<str>,
        V: Into<config::Value>,
    {
        self.0.set(key.as_ref(), value)?;
        Ok(self)
    }

    /// Get a single value and deserialize to the given type
    pub fn get<T, K>(&self, key: K) -> Result<T>
    where
        // the global config sits behind a RwLock that is released before returning,
        // so T must not borrow from it
        T: serde::de::DeserializeOwned,
        K: AsRef<str>,
    {
        Ok(self.0.get(key.as_ref())?)
    }

    /// Deserialize the whole config into the given type
    pub fn fetch<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let t = self.0.clone().try_into()?;
        Ok(t)
    }
}

lazy_static! {
    /// global AppConfig instance
    static ref CONFIG: RwLock<AppConfig> = RwLock::new(AppConfig::new());
}

pub fn setup() -> Result<()> {
    config_mut().setup()?;
    Ok(())
}

/// global AppConfig instance
pub fn config() -> RwLockReadGuard<'static, AppConfig> {
    CONFIG.read().unwrap()
}

/// mutable global AppConfig instance
pub fn config_mut() -> RwLockWriteGuard<'static, AppConfig> {
    CONFIG.write().unwrap()
}

pub mod prelude {
    pub use super::{config, config_mut};
}
