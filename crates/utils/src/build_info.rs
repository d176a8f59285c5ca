use serde::Serialize;

/// Identifies the running binary in health output and startup logs.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_timestamp: &'static str,
}

macro_rules! option_env_or {
    ($name:expr, $default:expr) => {
        match option_env!($name) {
            Some(v) => v,
            None => $default,
        }
    };
}

/// Filled in by `build.rs`; "unknown" when git or date were unavailable.
pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    git_commit: option_env_or!("GARDEN_GIT_COMMIT", "unknown"),
    build_timestamp: option_env_or!("GARDEN_BUILD_TIMESTAMP", "unknown"),
};
