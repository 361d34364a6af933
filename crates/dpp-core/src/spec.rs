//! Deployment specification: the declared state a deployment is checked against.
//!
//! The document is YAML. Every section and every field is optional; anything
//! absent (or explicitly null) reads as an empty string so that a partial
//! spec can still drive the checks it has parameters for. Numeric scalars
//! such as account ids are kept as their textual form.

use crate::error::{DppError, Result};
use crate::types::PackageFormat;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// SpecWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(alias = "env", deserialize_with = "lenient")]
    pub environment: String,
    #[serde(deserialize_with = "lenient")]
    pub project: String,
    #[serde(alias = "git_url", deserialize_with = "lenient")]
    pub repository_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Module {
    #[serde(deserialize_with = "lenient")]
    pub stack: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyPin {
    #[serde(deserialize_with = "lenient")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageContainer {
    #[serde(deserialize_with = "lenient")]
    pub provider: String,
    #[serde(deserialize_with = "lenient")]
    pub region: String,
    #[serde(alias = "acct_id", deserialize_with = "lenient")]
    pub account_id: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactRepository {
    #[serde(deserialize_with = "lenient")]
    pub provider: String,
    #[serde(deserialize_with = "lenient")]
    pub region: String,
    #[serde(alias = "acct_id", deserialize_with = "lenient")]
    pub account_id: String,
    #[serde(deserialize_with = "lenient")]
    pub domain: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerRepository {
    #[serde(deserialize_with = "lenient")]
    pub provider: String,
    #[serde(deserialize_with = "lenient")]
    pub region: String,
    #[serde(alias = "acct_id", deserialize_with = "lenient")]
    pub account_id: String,
    #[serde(deserialize_with = "lenient")]
    pub domain: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
}

/// Managed workflow environment (e.g. an MWAA/Airflow environment).
///
/// The DAG selector may be written flat (`dag_name_pattern`, `dag_tag`) or
/// nested (`dag: {name_pattern, tag}`); the flat form wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawWorkflowEnvironment")]
pub struct WorkflowEnvironment {
    pub provider: String,
    pub region: String,
    pub account_id: String,
    pub domain: String,
    pub dag_name_pattern: String,
    pub dag_tag: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawWorkflowEnvironment {
    #[serde(deserialize_with = "lenient")]
    provider: String,
    #[serde(deserialize_with = "lenient")]
    region: String,
    #[serde(alias = "acct_id", deserialize_with = "lenient")]
    account_id: String,
    #[serde(deserialize_with = "lenient")]
    domain: String,
    #[serde(deserialize_with = "lenient")]
    dag_name_pattern: String,
    #[serde(deserialize_with = "lenient")]
    dag_tag: String,
    #[serde(deserialize_with = "section")]
    dag: DagSelector,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DagSelector {
    #[serde(deserialize_with = "lenient")]
    name_pattern: String,
    #[serde(deserialize_with = "lenient")]
    tag: String,
}

impl From<RawWorkflowEnvironment> for WorkflowEnvironment {
    fn from(raw: RawWorkflowEnvironment) -> Self {
        let pick = |flat: String, nested: String| if flat.is_empty() { nested } else { flat };
        Self {
            provider: raw.provider,
            region: raw.region,
            account_id: raw.account_id,
            domain: raw.domain,
            dag_name_pattern: pick(raw.dag_name_pattern, raw.dag.name_pattern),
            dag_tag: pick(raw.dag_tag, raw.dag.tag),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeEngine {
    #[serde(deserialize_with = "lenient")]
    pub provider: String,
    #[serde(deserialize_with = "lenient")]
    pub region: String,
    #[serde(alias = "acct_id", deserialize_with = "lenient")]
    pub account_id: String,
    /// Engine flavour, e.g. `emr-serverless` or `databricks`.
    #[serde(deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesTarget {
    #[serde(deserialize_with = "lenient")]
    pub provider: String,
    #[serde(deserialize_with = "lenient")]
    pub region: String,
    #[serde(alias = "acct_id", deserialize_with = "lenient")]
    pub account_id: String,
    #[serde(deserialize_with = "lenient")]
    pub cluster: String,
    #[serde(deserialize_with = "lenient")]
    pub namespace: String,
    #[serde(deserialize_with = "lenient")]
    pub context: String,
}

// ---------------------------------------------------------------------------
// DeploymentSpec (top-level)
// ---------------------------------------------------------------------------

/// A whole deployment spec.
///
/// `module` and `dependencies` may also be nested under `container:`; the
/// top-level fields win per key when both are set. Dumps are always flat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDeploymentSpec")]
pub struct DeploymentSpec {
    pub metadata: Metadata,
    pub module: Module,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, DependencyPin>,
    pub storage_container: StorageContainer,
    pub artifact_repository: ArtifactRepository,
    pub container_repository: ContainerRepository,
    pub workflow_environment: WorkflowEnvironment,
    pub compute_engine: ComputeEngine,
    pub kubernetes_target: KubernetesTarget,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDeploymentSpec {
    #[serde(deserialize_with = "section")]
    metadata: Metadata,
    #[serde(deserialize_with = "section")]
    module: Module,
    #[serde(deserialize_with = "pins")]
    dependencies: BTreeMap<String, DependencyPin>,
    #[serde(deserialize_with = "section")]
    container: ContainerSection,
    #[serde(deserialize_with = "section")]
    storage_container: StorageContainer,
    #[serde(alias = "artifact_repo", deserialize_with = "section")]
    artifact_repository: ArtifactRepository,
    #[serde(alias = "container_repo", deserialize_with = "section")]
    container_repository: ContainerRepository,
    #[serde(alias = "airflow", deserialize_with = "section")]
    workflow_environment: WorkflowEnvironment,
    #[serde(deserialize_with = "section")]
    compute_engine: ComputeEngine,
    #[serde(alias = "kubernetes", deserialize_with = "section")]
    kubernetes_target: KubernetesTarget,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ContainerSection {
    #[serde(deserialize_with = "section")]
    module: Module,
    #[serde(deserialize_with = "pins")]
    dependencies: BTreeMap<String, DependencyPin>,
}

impl From<RawDeploymentSpec> for DeploymentSpec {
    fn from(raw: RawDeploymentSpec) -> Self {
        let pick = |top: String, nested: String| if top.is_empty() { nested } else { top };
        let nested = raw.container;
        let module = Module {
            stack: pick(raw.module.stack, nested.module.stack),
            name: pick(raw.module.name, nested.module.name),
            version: pick(raw.module.version, nested.module.version),
        };
        let mut dependencies = nested.dependencies;
        dependencies.extend(raw.dependencies);
        Self {
            metadata: raw.metadata,
            module,
            dependencies,
            storage_container: raw.storage_container,
            artifact_repository: raw.artifact_repository,
            container_repository: raw.container_repository,
            workflow_environment: raw.workflow_environment,
            compute_engine: raw.compute_engine,
            kubernetes_target: raw.kubernetes_target,
        }
    }
}

impl DeploymentSpec {
    /// Parse a YAML document. A document with no content (blank or only
    /// comments) is an empty spec; anything that is not a mapping of the
    /// expected shape is `MalformedSpec`.
    pub fn parse(document: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(document)
            .map_err(|e| DppError::MalformedSpec(format!("document is not UTF-8: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| DppError::MalformedSpec(e.to_string()))?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).map_err(|e| DppError::MalformedSpec(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| DppError::SpecRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&data)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// First region declared by any resource section, in check order.
    pub fn default_region(&self) -> Option<&str> {
        [
            self.storage_container.region.as_str(),
            self.artifact_repository.region.as_str(),
            self.container_repository.region.as_str(),
            self.workflow_environment.region.as_str(),
            self.compute_engine.region.as_str(),
            self.kubernetes_target.region.as_str(),
        ]
        .into_iter()
        .find(|r| !r.is_empty())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<SpecWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(SpecWarning { level, message })
        };

        if self.storage_container.name.is_empty() {
            warn(
                WarnLevel::Warning,
                "storage_container.name is empty; the storage check will fail".to_string(),
            );
        }

        let artifact = &self.artifact_repository;
        if artifact.format.is_empty() {
            warn(
                WarnLevel::Warning,
                "artifact_repository.format is empty; the artifact check will fail".to_string(),
            );
        } else if artifact.format.parse::<PackageFormat>().is_err() {
            let known: Vec<&str> = PackageFormat::all().iter().map(|f| f.as_str()).collect();
            warn(
                WarnLevel::Error,
                format!(
                    "artifact_repository.format '{}' is not a known format; valid: {}",
                    artifact.format,
                    known.join(", ")
                ),
            );
        }
        if artifact.domain.is_empty() || artifact.name.is_empty() {
            warn(
                WarnLevel::Warning,
                "artifact_repository needs both domain and name".to_string(),
            );
        }
        if self.module.name.is_empty() || self.module.version.is_empty() {
            warn(
                WarnLevel::Warning,
                "module.name and module.version select the package version to describe; one is empty"
                    .to_string(),
            );
        }

        if self.container_repository.name.is_empty() {
            warn(
                WarnLevel::Warning,
                "container_repository.name is empty; the registry check will fail".to_string(),
            );
        }

        let workflow = &self.workflow_environment;
        if workflow.domain.is_empty() {
            warn(
                WarnLevel::Warning,
                "workflow_environment.domain is empty; workflow checks will be skipped".to_string(),
            );
        }
        if let Err(e) = Regex::new(&workflow.dag_name_pattern) {
            warn(
                WarnLevel::Warning,
                format!(
                    "workflow_environment.dag_name_pattern is not a valid regex and will be matched literally: {e}"
                ),
            );
        }

        let accounts: BTreeSet<&str> = [
            self.storage_container.account_id.as_str(),
            artifact.account_id.as_str(),
            self.container_repository.account_id.as_str(),
            workflow.account_id.as_str(),
        ]
        .into_iter()
        .filter(|a| !a.is_empty())
        .collect();
        if accounts.len() > 1 {
            let list: Vec<&str> = accounts.into_iter().collect();
            warn(
                WarnLevel::Warning,
                format!("resources span several accounts: {}", list.join(", ")),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Lenient field helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::UInt(u) => u.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Scalar (or null) as text.
fn lenient<'de, D>(d: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(d)?
        .map(Scalar::into_text)
        .unwrap_or_default())
}

/// A section written as `key:` with nothing under it reads as empty.
fn section<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Dependency pins: `spark: {version: "3.5.0"}`, `spark: "3.5.0"` or `spark:`.
fn pins<'de, D>(d: D) -> std::result::Result<BTreeMap<String, DependencyPin>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pin {
        Table(DependencyPin),
        Bare(Scalar),
    }

    let raw: Option<BTreeMap<String, Option<Pin>>> = Option::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, pin)| {
            let pin = match pin {
                Some(Pin::Table(p)) => p,
                Some(Pin::Bare(s)) => DependencyPin {
                    version: s.into_text(),
                },
                None => DependencyPin::default(),
            };
            (name, pin)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
