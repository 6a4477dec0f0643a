//! Schema versioning for machine-readable output and config files.

/// Schema version carried by every JSON payload and config file.
///
/// Bump the major component on any breaking change to field names or
/// semantics.
pub const SCHEMA_VERSION: &str = "1.0.0";
