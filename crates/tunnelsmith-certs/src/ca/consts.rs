use tunnelsmith_shared::time::Duration;

/// The default CA validity time span of roughly ten years (3650 days).
pub const DEFAULT_CA_VALIDITY: Duration = Duration::from_days_unchecked(3650);

/// Prefix of the synthesized common name of CAs created without an explicit
/// common name. A random UUID is appended to avoid collisions across runs.
pub const CA_COMMON_NAME_PREFIX: &str = "CA-";
