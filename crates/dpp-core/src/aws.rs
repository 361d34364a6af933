//! AWS service backend that delegates to the `aws` CLI.
//!
//! Every call runs `aws <service> <operation> ... --output json` as a
//! subprocess and decodes stdout with serde. The CLI owns credentials,
//! signing and the wire protocol; this module only builds argument lists,
//! bounds the call in time and classifies failures from stderr.
//!
//! List operations pass `--no-paginate`, so they return the first page only.

use crate::config::ProbeConfig;
use crate::error::{DppError, Result};
use crate::probe::{
    ArtifactService, IdentityService, ImageService, PackageRef, StorageService,
};
use crate::types::{
    ArtifactDomain, CallerIdentity, ImageDetail, ImageId, ImageRepository, PackageOrigin,
    PackageVersionDescriptor, PackageVersionDetail, StoredObject,
};
use crate::workflow::CliToken;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

const AUTH_MARKERS: &[&str] = &[
    "AccessDenied",
    "UnauthorizedOperation",
    "ExpiredToken",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
    "Unable to locate credentials",
    "Error loading SSO Token",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "ResourceNotFoundException",
    "RepositoryNotFoundException",
    "NoSuchBucket",
];

// ---------------------------------------------------------------------------
// AwsCli
// ---------------------------------------------------------------------------

pub struct AwsCli<'a> {
    config: &'a ProbeConfig,
}

impl<'a> AwsCli<'a> {
    pub fn new(config: &'a ProbeConfig) -> Self {
        Self { config }
    }

    fn binary(&self) -> Result<PathBuf> {
        let bin = &self.config.aws_bin;
        if bin.components().count() > 1 {
            return Ok(bin.clone());
        }
        which::which(bin).map_err(|_| {
            DppError::Upstream(format!("'{}' not found on PATH", bin.display()))
        })
    }

    /// Full argument list for one CLI call, global options last.
    pub fn args(
        &self,
        service: &str,
        operation: &str,
        extra: &[&str],
        timeout: Duration,
    ) -> Vec<String> {
        let secs = timeout.as_secs().max(1).to_string();
        let mut args: Vec<String> = [service, operation]
            .into_iter()
            .chain(extra.iter().copied())
            .map(str::to_string)
            .collect();
        args.extend(
            [
                "--output",
                "json",
                "--cli-connect-timeout",
                secs.as_str(),
                "--cli-read-timeout",
                secs.as_str(),
            ]
            .map(str::to_string),
        );
        if let Some(region) = &self.config.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        if let Some(profile) = &self.config.profile {
            args.extend(["--profile".to_string(), profile.clone()]);
        }
        args
    }

    fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        extra: &[&str],
        timeout: Duration,
    ) -> Result<T> {
        let label = format!("aws {service} {operation}");
        let args = self.args(service, operation, extra, timeout);
        let output = self.run(&label, &args, timeout)?;
        if !output.status.success() {
            return Err(classify_failure(&label, output.status, &output.stderr));
        }
        let body = if output.stdout.iter().all(u8::is_ascii_whitespace) {
            b"{}".as_slice()
        } else {
            output.stdout.as_slice()
        };
        serde_json::from_slice(body)
            .map_err(|e| DppError::Upstream(format!("unexpected output from {label}: {e}")))
    }

    fn run(&self, label: &str, args: &[String], timeout: Duration) -> Result<CliOutput> {
        let bin = self.binary()?;
        debug!(bin = %bin.display(), ?args, "running provider CLI");

        let mut child = Command::new(&bin)
            .args(args)
            .env("AWS_PAGER", "")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DppError::Upstream(format!("failed to start {}: {e}", bin.display())))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    abandon(&mut child);
                    return Err(e.into());
                }
            }
            if Instant::now() >= deadline {
                abandon(&mut child);
                return Err(DppError::Upstream(format!(
                    "{label} timed out after {}s",
                    timeout.as_secs_f32()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(CliOutput {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

struct CliOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Kill and reap a child we stopped waiting on.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Map a failed CLI call to the error taxonomy using the service error code
/// the CLI prints on stderr.
pub fn classify_failure(label: &str, status: ExitStatus, stderr: &[u8]) -> DppError {
    let stderr = String::from_utf8_lossy(stderr);
    let detail = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output");
    let code = status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let message = format!("{label} failed (exit {code}): {detail}");

    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        DppError::Auth(message)
    } else if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        DppError::NotFound(message)
    } else {
        DppError::Upstream(message)
    }
}

/// Timestamps come back as ISO strings or epoch numbers depending on the
/// CLI version; keep whichever form was printed.
fn text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

mod wire {
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct CallerIdentity {
        #[serde(default)]
        pub user_id: String,
        #[serde(default)]
        pub account: String,
        #[serde(default)]
        pub arn: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct ListObjects {
        pub contents: Vec<Object>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Object {
        pub key: String,
        #[serde(default)]
        pub size: u64,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct ListDomains {
        pub domains: Vec<Domain>,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct Domain {
        pub name: String,
        pub status: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct Origin {
        pub domain_entry_point: DomainEntryPoint,
        pub origin_type: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct DomainEntryPoint {
        pub repository_name: String,
        pub external_connection_name: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct ListPackageVersions {
        pub versions: Vec<PackageVersionSummary>,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct PackageVersionSummary {
        pub version: String,
        pub revision: String,
        pub status: String,
        pub origin: Origin,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct DescribePackageVersion {
        pub package_version: PackageVersionDescription,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct PackageVersionDescription {
        pub package_name: String,
        pub display_name: String,
        pub version: String,
        pub namespace: String,
        pub home_page: String,
        pub source_code_repository: String,
        pub published_time: serde_json::Value,
        pub licenses: Vec<License>,
        pub revision: String,
        pub status: String,
        pub origin: Origin,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct License {
        pub name: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct DescribeRepositories {
        pub repositories: Vec<Repository>,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct Repository {
        pub repository_name: String,
        pub repository_uri: String,
        pub repository_arn: String,
        pub created_at: serde_json::Value,
        pub image_tag_mutability: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct ListImages {
        pub image_ids: Vec<ImageIdentifier>,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct ImageIdentifier {
        pub image_tag: String,
        pub image_digest: String,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct DescribeImages {
        pub image_details: Vec<ImageDetail>,
    }

    #[derive(Deserialize, Default)]
    #[serde(rename_all = "camelCase", default)]
    pub struct ImageDetail {
        pub image_tags: Vec<String>,
        pub image_digest: String,
        pub image_pushed_at: serde_json::Value,
        pub image_size_in_bytes: u64,
        pub artifact_media_type: String,
        pub image_manifest_media_type: String,
        pub image_scan_status: ScanStatus,
        pub last_recorded_pull_time: serde_json::Value,
    }

    #[derive(Deserialize, Default)]
    #[serde(default)]
    pub struct ScanStatus {
        pub status: String,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct CliToken {
        pub cli_token: String,
        pub web_server_hostname: String,
    }
}

impl From<wire::Origin> for PackageOrigin {
    fn from(o: wire::Origin) -> Self {
        Self {
            connection: o.domain_entry_point.external_connection_name,
            repository: o.domain_entry_point.repository_name,
            origin_type: o.origin_type,
        }
    }
}

fn package_args<'p>(package: &'p PackageRef<'_>, format: &'p str) -> Vec<&'p str> {
    let mut args = vec![
        "--domain",
        package.domain,
        "--repository",
        package.repository,
        "--format",
        format,
        "--package",
        package.package,
    ];
    if !package.domain_owner.is_empty() {
        args.extend(["--domain-owner", package.domain_owner]);
    }
    args
}

// ---------------------------------------------------------------------------
// Service impls
// ---------------------------------------------------------------------------

impl IdentityService for AwsCli<'_> {
    fn caller_identity(&self) -> Result<CallerIdentity> {
        let out: wire::CallerIdentity = self.call(
            "sts",
            "get-caller-identity",
            &[],
            self.config.identity_timeout,
        )?;
        Ok(CallerIdentity {
            user_id: out.user_id,
            account: out.account,
            arn: out.arn,
        })
    }
}

impl StorageService for AwsCli<'_> {
    fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut extra = vec!["--bucket", container, "--no-paginate"];
        if !prefix.is_empty() {
            extra.extend(["--prefix", prefix]);
        }
        let out: wire::ListObjects =
            self.call("s3api", "list-objects-v2", &extra, self.config.timeout)?;
        Ok(out
            .contents
            .into_iter()
            .map(|o| StoredObject {
                key: o.key,
                size: o.size,
            })
            .collect())
    }
}

impl ArtifactService for AwsCli<'_> {
    fn list_domains(&self) -> Result<Vec<ArtifactDomain>> {
        let out: wire::ListDomains = self.call(
            "codeartifact",
            "list-domains",
            &["--no-paginate"],
            self.config.timeout,
        )?;
        Ok(out
            .domains
            .into_iter()
            .map(|d| ArtifactDomain {
                name: d.name,
                status: d.status,
            })
            .collect())
    }

    fn list_package_versions(
        &self,
        package: &PackageRef<'_>,
    ) -> Result<Vec<PackageVersionDescriptor>> {
        let mut extra = package_args(package, package.format.as_str());
        extra.push("--no-paginate");
        let out: wire::ListPackageVersions = self.call(
            "codeartifact",
            "list-package-versions",
            &extra,
            self.config.timeout,
        )?;
        Ok(out
            .versions
            .into_iter()
            .map(|v| PackageVersionDescriptor {
                package_name: package.package.to_string(),
                version: v.version,
                status: v.status,
                revision: v.revision,
                origin: v.origin.into(),
            })
            .collect())
    }

    fn describe_package_version(
        &self,
        package: &PackageRef<'_>,
        version: &str,
    ) -> Result<PackageVersionDetail> {
        let mut extra = package_args(package, package.format.as_str());
        extra.extend(["--package-version", version]);
        let out: wire::DescribePackageVersion = self.call(
            "codeartifact",
            "describe-package-version",
            &extra,
            self.config.timeout,
        )?;
        let pv = out.package_version;
        if pv.version.is_empty() {
            return Err(DppError::NotFound(format!(
                "{}@{version} in {}/{}",
                package.package, package.domain, package.repository
            )));
        }
        let package_name = if pv.package_name.is_empty() {
            package.package.to_string()
        } else {
            pv.package_name
        };
        Ok(PackageVersionDetail {
            descriptor: PackageVersionDescriptor {
                package_name,
                version: pv.version,
                status: pv.status,
                revision: pv.revision,
                origin: pv.origin.into(),
            },
            display_name: pv.display_name,
            home_page: pv.home_page,
            namespace: pv.namespace,
            source_code_repository: pv.source_code_repository,
            published_time: text(&pv.published_time),
            licenses: pv.licenses.into_iter().map(|l| l.name).collect(),
        })
    }
}

impl ImageService for AwsCli<'_> {
    fn list_repositories(&self) -> Result<Vec<ImageRepository>> {
        let out: wire::DescribeRepositories = self.call(
            "ecr",
            "describe-repositories",
            &["--no-paginate"],
            self.config.timeout,
        )?;
        Ok(out
            .repositories
            .into_iter()
            .map(|r| ImageRepository {
                name: r.repository_name,
                uri: r.repository_uri,
                arn: r.repository_arn,
                created_at: text(&r.created_at),
                tag_mutability: r.image_tag_mutability,
            })
            .collect())
    }

    fn list_images(&self, repository: &str) -> Result<Vec<ImageId>> {
        let out: wire::ListImages = self.call(
            "ecr",
            "list-images",
            &["--repository-name", repository, "--no-paginate"],
            self.config.timeout,
        )?;
        Ok(out
            .image_ids
            .into_iter()
            .map(|i| ImageId {
                tag: i.image_tag,
                digest: i.image_digest,
            })
            .collect())
    }

    fn describe_images(&self, repository: &str) -> Result<Vec<ImageDetail>> {
        let out: wire::DescribeImages = self.call(
            "ecr",
            "describe-images",
            &["--repository-name", repository, "--no-paginate"],
            self.config.timeout,
        )?;
        Ok(out
            .image_details
            .into_iter()
            .map(|d| ImageDetail {
                tags: d.image_tags,
                digest: d.image_digest,
                pushed_at: text(&d.image_pushed_at),
                size_bytes: d.image_size_in_bytes,
                artifact_media_type: d.artifact_media_type,
                manifest_media_type: d.image_manifest_media_type,
                scan_status: d.image_scan_status.status,
                last_recorded_pull_time: text(&d.last_recorded_pull_time),
            })
            .collect())
    }
}

impl AwsCli<'_> {
    /// Mint a short-lived token for the managed Airflow CLI endpoint.
    pub fn create_cli_token(&self, environment: &str) -> Result<CliToken> {
        let out: wire::CliToken = self.call(
            "mwaa",
            "create-cli-token",
            &["--name", environment],
            self.config.timeout,
        )?;
        Ok(CliToken::new(out.web_server_hostname, out.cli_token))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
