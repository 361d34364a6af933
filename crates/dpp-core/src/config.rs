use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WORKFLOW_COMMAND: &str = "dags list -o json";
pub const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// ProbeConfig
// ---------------------------------------------------------------------------

/// Settings shared by every service backend for one run. Built once by the
/// caller and lent to each backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Bound on every probe except the identity check.
    pub timeout: Duration,
    pub identity_timeout: Duration,
    /// Provider CLI used by `AwsCli`; resolved through `PATH` when relative.
    pub aws_bin: PathBuf,
    pub workflow_command: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            timeout: PROBE_TIMEOUT,
            identity_timeout: IDENTITY_TIMEOUT,
            aws_bin: PathBuf::from("aws"),
            workflow_command: DEFAULT_WORKFLOW_COMMAND.to_string(),
        }
    }
}

impl ProbeConfig {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_aws_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.aws_bin = bin.into();
        self
    }

    pub fn with_workflow_command(mut self, command: impl Into<String>) -> Self {
        self.workflow_command = command.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ProbeConfig::default();
        assert_eq!(cfg.identity_timeout, Duration::from_secs(5));
        assert_eq!(cfg.workflow_command, "dags list -o json");
        assert_eq!(cfg.aws_bin, PathBuf::from("aws"));
        assert!(cfg.region.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let cfg = ProbeConfig::default()
            .with_region("eu-west-1")
            .with_profile("ci")
            .with_timeout(Duration::from_secs(3))
            .with_workflow_command("version");
        assert_eq!(cfg.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.profile.as_deref(), Some("ci"));
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.workflow_command, "version");
    }
}
