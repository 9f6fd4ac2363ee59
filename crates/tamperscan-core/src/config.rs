//! Audit configuration.

use crate::baseline::BaselinePolicy;
use crate::exclusion::ExclusionPolicy;

/// Directories searched for a package database, in probe order.
pub const DEFAULT_DATABASE_DIRS: &[&str] = &["var/lib/rpm", "usr/lib/sysimage/rpm"];

/// Database file names probed in each directory, in order.
pub const DATABASE_FILE_NAMES: &[&str] = &["rpmdb.sqlite", "Packages"];

/// Audit configuration.
///
/// # Examples
///
/// ```
/// use tamperscan_core::AuditConfig;
/// use tamperscan_core::BaselinePolicy;
///
/// // Standard audit
/// let config = AuditConfig::default();
///
/// // Track every installed file, including config and docs
/// let strict = AuditConfig {
///     baseline_policy: BaselinePolicy::Unfiltered,
///     ..AuditConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Which installed files enter the baseline.
    pub baseline_policy: BaselinePolicy,

    /// Paths exempt from reporting.
    pub exclusions: ExclusionPolicy,

    /// Directories searched for a package database, in probe order.
    pub database_dirs: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            baseline_policy: BaselinePolicy::default(),
            exclusions: ExclusionPolicy::default(),
            database_dirs: DEFAULT_DATABASE_DIRS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditConfig::default();
        assert_eq!(config.baseline_policy, BaselinePolicy::FlagFiltered);
        assert_eq!(config.database_dirs, ["var/lib/rpm", "usr/lib/sysimage/rpm"]);
        assert_eq!(config.exclusions, ExclusionPolicy::default());
    }
}
