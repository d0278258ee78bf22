/// Module name the materialized manifest is exposed under inside a bundle.
pub const MANIFEST_MODULE: &str = "viewpack-self";

/// Shims of the pipeline itself; always excluded so a bundle never pulls in
/// the code that builds it.
pub const PIPELINE_SELF_MODULES: &[&str] = &[
    "search-and-require.js",
    "require-browserify.js",
    "./search-and-require.js",
    "./require-browserify.js",
    "viewpack-loader",
];

pub fn default_pool_size() -> usize {
    1
}

pub fn default_job_timeout_secs() -> u64 {
    300
}

pub fn default_bundler_program() -> String {
    "browserify".to_string()
}

pub fn default_disc_program() -> String {
    "discify".to_string()
}

pub fn default_server_modules() -> Vec<String> {
    ["disc", "ansi", "temp", "browserify"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}
