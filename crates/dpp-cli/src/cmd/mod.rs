pub mod check;
pub mod probe;
pub mod spec;

use anyhow::Context;
use dpp_core::config::ProbeConfig;
use dpp_core::spec::DeploymentSpec;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every subcommand.
pub struct Globals {
    pub spec_path: PathBuf,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub timeout: Duration,
    pub aws_bin: PathBuf,
    pub json: bool,
}

impl Globals {
    pub fn load_spec(&self) -> anyhow::Result<DeploymentSpec> {
        DeploymentSpec::load(&self.spec_path).context("failed to load deployment spec")
    }

    /// Probe settings for this run. An explicit region wins over the first
    /// region the spec declares.
    pub fn probe_config(&self, spec: Option<&DeploymentSpec>) -> ProbeConfig {
        let mut config = ProbeConfig::default()
            .with_timeout(self.timeout)
            .with_aws_bin(self.aws_bin.clone());
        let region = self
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| spec.and_then(DeploymentSpec::default_region));
        if let Some(region) = region {
            config = config.with_region(region);
        }
        if let Some(profile) = self.profile.as_deref().filter(|p| !p.is_empty()) {
            config = config.with_profile(profile);
        }
        config
    }
}
