//! Constants used across the Loadorder workspace.

/// The filename for Loadorder's extension declarations.
pub const CONFIG_FILE: &str = "loadorder.toml";
