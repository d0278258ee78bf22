//! Build flag resolution.
//!
//! The four booleans that shape a build are derived from the node
//! environment plus an option string such as `"+production -minimize"`.
//! Tokens may carry a `+` (enable, the default) or `-` (disable) prefix.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved build switches, sent with every job and echoed in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildFlags {
    /// Production build (NODE_ENV-derived unless overridden)
    pub is_production_build: bool,
    /// Emit inline source maps
    pub enable_source_maps: bool,
    /// Add the minification transform
    pub minimize_bundle: bool,
    /// Produce the HTML visualization report next to the bundle
    pub use_disc: bool,
}

/// Explicit overrides parsed from an option string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagOverrides(BTreeMap<String, bool>);

impl FlagOverrides {
    /// Parse a whitespace-separated option string.
    ///
    /// Keys are lowercased and runs of non-alphanumeric characters become `_`,
    /// so `+Source-Maps` and `source_maps` name the same switch.
    pub fn parse(opts: &str) -> Self {
        let mut map = BTreeMap::new();
        for token in opts.split_whitespace() {
            let mut value = true;
            let mut key = token;
            while let Some(first) = key.chars().next() {
                match first {
                    '+' => key = &key[1..],
                    '-' => {
                        value = false;
                        key = &key[1..];
                    }
                    _ => break,
                }
            }
            let key = normalize_key(key);
            if key.is_empty() {
                continue;
            }
            map.insert(key, value);
        }
        Self(map)
    }

    /// Value of an explicit override, if the option string named it.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }
}

fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        } else if !in_separator {
            out.push('_');
            in_separator = true;
        }
    }
    out.trim_matches('_').to_string()
}

impl BuildFlags {
    /// Resolve flags from the node environment and explicit overrides.
    ///
    /// Precedence: `development` beats `production`; source maps and the
    /// visualization follow development mode, minification follows production
    /// mode, and each can be forced on or off individually.
    pub fn resolve(node_env_production: bool, overrides: &FlagOverrides) -> Self {
        let mut production = node_env_production;
        match overrides.get("production") {
            Some(true) => production = true,
            Some(false) => production = false,
            None => {}
        }

        let mut development = !production;
        match overrides.get("development") {
            Some(true) => {
                development = true;
                production = false;
            }
            Some(false) => {
                development = false;
                production = true;
            }
            None => {}
        }

        Self {
            is_production_build: production,
            enable_source_maps: overrides.get("source_maps").unwrap_or(development),
            minimize_bundle: overrides.get("minimize").unwrap_or(production),
            use_disc: overrides.get("use_disc").unwrap_or(development),
        }
    }

    /// Value for `NODE_ENV` handed to the bundling engine.
    pub fn node_env(&self) -> &'static str {
        if self.is_production_build {
            "production"
        } else {
            "development"
        }
    }

    /// Human-readable summary, e.g. `mode=production, minimize=true`.
    pub fn feature_summary(&self) -> String {
        let mut features = vec![format!("mode={}", self.node_env())];
        if self.enable_source_maps {
            features.push("source_maps=true".to_string());
        }
        if self.minimize_bundle {
            features.push("minimize=true".to_string());
        }
        if self.use_disc {
            features.push("disc=true".to_string());
        }
        features.join(", ")
    }
}
