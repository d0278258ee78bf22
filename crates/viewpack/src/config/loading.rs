use crate::config::ViewpackConfig;
use crate::error::{BuildError, Result};
use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized, Toml},
};
use std::path::Path;

/// Config file names probed in the project root, lowest priority first.
pub const CONFIG_FILES: &[&str] = &["viewpack.toml", "viewpack.json"];

impl ViewpackConfig {
    /// Load configuration for a project rooted at `root`.
    /// Priority: environment variables > config files > defaults
    pub fn load(root: &Path) -> Result<Self> {
        Self::from_figment(Self::figment(root))
    }

    /// Layered provider chain used by [`ViewpackConfig::load`].
    ///
    /// `NODE_ENV` is read verbatim; everything else comes from `VIEWPACK_*`
    /// variables, with `__` separating nested keys
    /// (`VIEWPACK_RESTART__MAX_RESTARTS=3`).
    pub fn figment(root: &Path) -> Figment {
        Self::file_figment(root)
            .merge(Env::raw().only(&["NODE_ENV"]))
            .merge(Env::prefixed("VIEWPACK_").split("__"))
    }

    /// Defaults merged with whichever config files exist under `root`.
    pub fn file_figment(root: &Path) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let toml_path = root.join(CONFIG_FILES[0]);
        if toml_path.exists() {
            figment = figment.merge(Toml::file(toml_path));
        }

        let json_path = root.join(CONFIG_FILES[1]);
        if json_path.exists() {
            figment = figment.merge(Json::file(json_path));
        }

        figment
    }

    /// Extract and validate a configuration.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| BuildError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
