//! Resource probes.
//!
//! Each external service is reached through a narrow trait. The probe
//! functions in this module are the only callers the orchestrator and CLI
//! use: they validate the declared parameters first and only then touch the
//! service, so an empty name never produces a network call.

use crate::error::{DppError, Result};
use crate::types::{
    ArtifactDomain, CallerIdentity, ImageDetail, ImageId, ImageRepository, PackageFormat,
    PackageVersionDescriptor, PackageVersionDetail, StoredObject,
};
use crate::workflow::CliToken;

// ---------------------------------------------------------------------------
// Service traits
// ---------------------------------------------------------------------------

pub trait IdentityService {
    fn caller_identity(&self) -> Result<CallerIdentity>;
}

pub trait StorageService {
    /// First page of objects under `prefix`.
    fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<StoredObject>>;
}

/// Coordinates of a package inside an artifact repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef<'a> {
    pub domain: &'a str,
    /// Account owning the domain; empty means the caller's account.
    pub domain_owner: &'a str,
    pub repository: &'a str,
    pub format: PackageFormat,
    pub package: &'a str,
}

pub trait ArtifactService {
    fn list_domains(&self) -> Result<Vec<ArtifactDomain>>;
    fn list_package_versions(&self, package: &PackageRef<'_>)
        -> Result<Vec<PackageVersionDescriptor>>;
    /// Fails with `NotFound` when the version does not exist.
    fn describe_package_version(
        &self,
        package: &PackageRef<'_>,
        version: &str,
    ) -> Result<PackageVersionDetail>;
}

pub trait ImageService {
    fn list_repositories(&self) -> Result<Vec<ImageRepository>>;
    fn list_images(&self, repository: &str) -> Result<Vec<ImageId>>;
    fn describe_images(&self, repository: &str) -> Result<Vec<ImageDetail>>;
}

pub trait WorkflowService {
    fn mint_cli_token(&self, environment: &str) -> Result<CliToken>;
    /// Run one CLI command through the proxy; returns the raw response body.
    fn execute(&self, token: &CliToken, command: &str) -> Result<String>;
}

/// The set of service handles one verification run talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub identity: &'a dyn IdentityService,
    pub storage: &'a dyn StorageService,
    pub artifacts: &'a dyn ArtifactService,
    pub images: &'a dyn ImageService,
    pub workflow: &'a dyn WorkflowService,
}

// ---------------------------------------------------------------------------
// Probe functions
// ---------------------------------------------------------------------------

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DppError::InvalidArgument(format!("empty {what}")));
    }
    Ok(())
}

/// Any identity failure, including a timeout, surfaces as `Auth`.
pub fn caller_identity(svc: &dyn IdentityService) -> Result<CallerIdentity> {
    svc.caller_identity().map_err(|e| match e {
        DppError::Auth(msg)
        | DppError::Upstream(msg)
        | DppError::NotFound(msg)
        | DppError::InvalidArgument(msg) => DppError::Auth(msg),
        other => DppError::Auth(other.to_string()),
    })
}

pub fn list_objects(
    svc: &dyn StorageService,
    container: &str,
    prefix: &str,
) -> Result<Vec<StoredObject>> {
    require(container, "storage container name")?;
    svc.list_objects(container, prefix)
}

pub fn resolve_format(token: &str) -> Result<PackageFormat> {
    token.parse()
}

pub fn list_domains(svc: &dyn ArtifactService) -> Result<Vec<ArtifactDomain>> {
    svc.list_domains()
}

fn require_package(package: &PackageRef<'_>) -> Result<()> {
    require(package.domain, "artifact domain")?;
    require(package.repository, "artifact repository name")?;
    require(package.package, "package name")
}

pub fn list_package_versions(
    svc: &dyn ArtifactService,
    package: &PackageRef<'_>,
) -> Result<Vec<PackageVersionDescriptor>> {
    require_package(package)?;
    svc.list_package_versions(package)
}

pub fn describe_package_version(
    svc: &dyn ArtifactService,
    package: &PackageRef<'_>,
    version: &str,
) -> Result<PackageVersionDetail> {
    require_package(package)?;
    require(version, "package version")?;
    svc.describe_package_version(package, version)
}

pub fn list_repositories(svc: &dyn ImageService) -> Result<Vec<ImageRepository>> {
    svc.list_repositories()
}

pub fn list_images(svc: &dyn ImageService, repository: &str) -> Result<Vec<ImageId>> {
    require(repository, "container repository name")?;
    svc.list_images(repository)
}

pub fn describe_images(svc: &dyn ImageService, repository: &str) -> Result<Vec<ImageDetail>> {
    require(repository, "container repository name")?;
    svc.describe_images(repository)
}

pub fn mint_cli_token(svc: &dyn WorkflowService, environment: &str) -> Result<CliToken> {
    require(environment, "workflow environment name")?;
    svc.mint_cli_token(environment)
}

pub fn execute_command(svc: &dyn WorkflowService, token: &CliToken, command: &str) -> Result<String> {
    require(command, "workflow CLI command")?;
    svc.execute(token, command)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
