use crate::error::DppError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PackageFormat
// ---------------------------------------------------------------------------

/// Package format of an artifact repository, as the registry names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageFormat {
    Npm,
    Pypi,
    Maven,
    Nuget,
    Generic,
    Swift,
    Ruby,
    Cargo,
}

impl PackageFormat {
    pub fn all() -> &'static [PackageFormat] {
        &[
            PackageFormat::Npm,
            PackageFormat::Pypi,
            PackageFormat::Maven,
            PackageFormat::Nuget,
            PackageFormat::Generic,
            PackageFormat::Swift,
            PackageFormat::Ruby,
            PackageFormat::Cargo,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageFormat::Npm => "npm",
            PackageFormat::Pypi => "pypi",
            PackageFormat::Maven => "maven",
            PackageFormat::Nuget => "nuget",
            PackageFormat::Generic => "generic",
            PackageFormat::Swift => "swift",
            PackageFormat::Ruby => "ruby",
            PackageFormat::Cargo => "cargo",
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PackageFormat {
    type Err = DppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageFormat::all()
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| DppError::UnknownFormat(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ResourceKind / ResourceProbeResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Identity,
    StorageContainer,
    ArtifactRepository,
    ContainerRepository,
    WorkflowEnvironment,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Identity => "identity",
            ResourceKind::StorageContainer => "storage_container",
            ResourceKind::ArtifactRepository => "artifact_repository",
            ResourceKind::ContainerRepository => "container_repository",
            ResourceKind::WorkflowEnvironment => "workflow_environment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one probe call observed, reduced to a line the report can show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProbeResult {
    pub resource_kind: ResourceKind,
    pub identifier: String,
    pub status_summary: String,
}

impl ResourceProbeResult {
    pub fn new(
        resource_kind: ResourceKind,
        identifier: impl Into<String>,
        status_summary: impl Into<String>,
    ) -> Self {
        Self {
            resource_kind,
            identifier: identifier.into(),
            status_summary: status_summary.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity / storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
    pub account: String,
    pub arn: String,
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UserId={} Account={} Arn={}",
            self.user_id, self.account, self.arn
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

impl fmt::Display for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key={} size={}", self.key, self.size)
    }
}

// ---------------------------------------------------------------------------
// Artifact registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOrigin {
    /// External connection the version was pulled through, if any.
    pub connection: String,
    pub repository: String,
    pub origin_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionDescriptor {
    pub package_name: String,
    pub version: String,
    pub status: String,
    pub revision: String,
    pub origin: PackageOrigin,
}

impl fmt::Display for PackageVersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pkg-name={} Version={} Status={} Revision={} Origin=(domain-entry-point={}, repository-name={}, origin-type={})",
            self.package_name,
            self.version,
            self.status,
            self.revision,
            self.origin.connection,
            self.origin.repository,
            self.origin.origin_type
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersionDetail {
    #[serde(flatten)]
    pub descriptor: PackageVersionDescriptor,
    pub display_name: String,
    pub home_page: String,
    pub namespace: String,
    pub source_code_repository: String,
    pub published_time: String,
    pub licenses: Vec<String>,
}

impl fmt::Display for PackageVersionDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Display-name={} Homepage={} Namespace={} Source-code-repo={} Published-time={} Licenses=[{}]",
            self.descriptor,
            self.display_name,
            self.home_page,
            self.namespace,
            self.source_code_repository,
            self.published_time,
            self.licenses.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDomain {
    pub name: String,
    pub status: String,
}

impl fmt::Display for ArtifactDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name={} Status={}", self.name, self.status)
    }
}

// ---------------------------------------------------------------------------
// Image registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageId {
    pub tag: String,
    pub digest: String,
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image-tag={} Image-digest={}", self.tag, self.digest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetail {
    pub tags: Vec<String>,
    pub digest: String,
    pub pushed_at: String,
    pub size_bytes: u64,
    pub artifact_media_type: String,
    pub manifest_media_type: String,
    pub scan_status: String,
    pub last_recorded_pull_time: String,
}

impl fmt::Display for ImageDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Image-tags=[{}] Image-digest={} Image-pushed-at={} Image-size-in-bytes={} Artifact-media-type={} Last-recorded-pull-time={} Image-manifest-media-type={} Image-scan-status={}",
            self.tags.join(", "),
            self.digest,
            self.pushed_at,
            self.size_bytes,
            self.artifact_media_type,
            self.last_recorded_pull_time,
            self.manifest_media_type,
            self.scan_status
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRepository {
    pub name: String,
    pub uri: String,
    pub arn: String,
    pub created_at: String,
    pub tag_mutability: String,
}

impl fmt::Display for ImageRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name={} Created-at={} Image-tag-mutability={} repoUri={} Registry-arn={}",
            self.name, self.created_at, self.tag_mutability, self.uri, self.arn
        )
    }
}

// ---------------------------------------------------------------------------
// WorkflowRecord
// ---------------------------------------------------------------------------

/// One DAG as listed by the workflow CLI (`dags list -o json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    #[serde(rename = "dag_id")]
    pub id: String,
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub owner: String,
    /// Airflow prints `"True"`/`"False"`; booleans are accepted too.
    #[serde(default, deserialize_with = "paused_flag")]
    pub paused: Option<bool>,
}

impl fmt::Display for WorkflowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paused = match self.paused {
            Some(true) => "true",
            Some(false) => "false",
            None => "unknown",
        };
        write!(
            f,
            "dag_id={} filepath={} owner={} paused={}",
            self.id, self.filepath, self.owner, paused
        )
    }
}

fn paused_flag<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(d)? {
        Some(Flag::Bool(b)) => Some(b),
        Some(Flag::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        None => None,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
