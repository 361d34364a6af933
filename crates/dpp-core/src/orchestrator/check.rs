use super::phase::{Phase, PhaseOutcome, PhaseReport, VerificationReport};
use crate::config::DEFAULT_WORKFLOW_COMMAND;
use crate::error::Result;
use crate::extract::CliResponse;
use crate::filter::filter_records;
use crate::probe::{self, PackageRef, Services};
use crate::spec::DeploymentSpec;
use crate::types::{ResourceKind, ResourceProbeResult, WorkflowRecord};
use crate::workflow::CliToken;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run every phase against `spec` and return the full report.
pub fn run_check(
    spec: &DeploymentSpec,
    services: Services<'_>,
    workflow_command: &str,
) -> VerificationReport {
    Verifier::new(spec, services)
        .with_workflow_command(workflow_command)
        .run()
}

pub struct Verifier<'a> {
    spec: &'a DeploymentSpec,
    services: Services<'a>,
    workflow_command: &'a str,
}

impl<'a> Verifier<'a> {
    pub fn new(spec: &'a DeploymentSpec, services: Services<'a>) -> Self {
        Self {
            spec,
            services,
            workflow_command: DEFAULT_WORKFLOW_COMMAND,
        }
    }

    pub fn with_workflow_command(mut self, command: &'a str) -> Self {
        self.workflow_command = command;
        self
    }

    pub fn run(&self) -> VerificationReport {
        let mut report = VerificationReport::begin(self.spec);
        info!(
            project = %report.project,
            environment = %report.environment,
            "starting verification"
        );

        self.record(&mut report, Phase::IdentityCheck, "caller", || {
            self.identity()
        });
        self.record(&mut report, Phase::StorageCheck, &self.storage_id(), || {
            self.storage()
        });
        self.record(&mut report, Phase::ArtifactCheck, &self.package_id(), || {
            self.artifact()
        });
        let repo = &self.spec.container_repository.name;
        self.record(&mut report, Phase::RegistryCheck, repo, || self.registry());

        self.workflow(&mut report);

        report.finish();
        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "verification finished"
        );
        report
    }

    // -----------------------------------------------------------------------
    // Phase bookkeeping
    // -----------------------------------------------------------------------

    fn record<T>(
        &self,
        report: &mut VerificationReport,
        phase: Phase,
        resource: &str,
        f: impl FnOnce() -> Result<(T, PhaseOutcome)>,
    ) -> Option<T> {
        info!(phase = %phase, resource, "phase started");
        let started = Instant::now();
        let (value, outcome) = match f() {
            Ok((value, outcome)) => {
                info!(phase = %phase, resource, summary = outcome.message(), "phase passed");
                (Some(value), outcome)
            }
            Err(e) => {
                warn!(phase = %phase, resource, error = %e, "phase failed");
                (None, PhaseOutcome::Failed { error: e.to_string() })
            }
        };
        report.phases.push(PhaseReport {
            phase,
            resource: resource.to_string(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        value
    }

    fn skip(&self, report: &mut VerificationReport, phase: Phase, resource: &str, cause: Phase) {
        let reason = format!("{cause} did not succeed");
        warn!(phase = %phase, resource, reason = %reason, "phase skipped");
        report.phases.push(PhaseReport {
            phase,
            resource: resource.to_string(),
            outcome: PhaseOutcome::Skipped { reason },
            duration_ms: 0,
        });
    }

    fn storage_id(&self) -> String {
        let s = &self.spec.storage_container;
        if s.prefix.is_empty() {
            s.name.clone()
        } else {
            format!("{}/{}", s.name, s.prefix)
        }
    }

    /// `domain/repository/package@version`, leaving out undeclared parts.
    fn package_id(&self) -> String {
        let a = &self.spec.artifact_repository;
        let m = &self.spec.module;
        let mut id = [a.domain.as_str(), a.name.as_str(), m.name.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if !m.version.is_empty() {
            id = format!("{id}@{}", m.version);
        }
        if id.is_empty() {
            id = "(undeclared package)".to_string();
        }
        id
    }

    // -----------------------------------------------------------------------
    // Resource phases
    // -----------------------------------------------------------------------

    fn identity(&self) -> Result<((), PhaseOutcome)> {
        let id = probe::caller_identity(self.services.identity)?;
        let outcome = PhaseOutcome::Passed {
            summary: format!("authenticated as {} (account {})", id.arn, id.account),
            results: vec![ResourceProbeResult::new(
                ResourceKind::Identity,
                &id.arn,
                format!("account={}", id.account),
            )],
            details: vec![id.to_string()],
        };
        Ok(((), outcome))
    }

    fn storage(&self) -> Result<((), PhaseOutcome)> {
        let s = &self.spec.storage_container;
        let objects = probe::list_objects(self.services.storage, &s.name, &s.prefix)?;
        let summary = format!("{} object(s) under '{}'", objects.len(), s.prefix);
        let outcome = PhaseOutcome::Passed {
            results: vec![ResourceProbeResult::new(
                ResourceKind::StorageContainer,
                self.storage_id(),
                &summary,
            )],
            summary,
            details: objects.iter().map(ToString::to_string).collect(),
        };
        Ok(((), outcome))
    }

    /// Resolve format, list versions, then describe the declared version.
    fn artifact(&self) -> Result<((), PhaseOutcome)> {
        let a = &self.spec.artifact_repository;
        let m = &self.spec.module;
        let package = PackageRef {
            domain: &a.domain,
            domain_owner: &a.account_id,
            repository: &a.name,
            format: probe::resolve_format(&a.format)?,
            package: &m.name,
        };
        let versions = probe::list_package_versions(self.services.artifacts, &package)?;
        let detail =
            probe::describe_package_version(self.services.artifacts, &package, &m.version)?;

        let summary = format!(
            "{}@{} is {} ({} version(s) listed)",
            m.name,
            m.version,
            detail.descriptor.status,
            versions.len()
        );
        let mut details: Vec<String> = versions.iter().map(ToString::to_string).collect();
        details.push(detail.to_string());
        let outcome = PhaseOutcome::Passed {
            results: vec![ResourceProbeResult::new(
                ResourceKind::ArtifactRepository,
                self.package_id(),
                &summary,
            )],
            summary,
            details,
        };
        Ok(((), outcome))
    }

    /// List image ids, then describe them.
    fn registry(&self) -> Result<((), PhaseOutcome)> {
        let repo = &self.spec.container_repository.name;
        let images = probe::list_images(self.services.images, repo)?;
        let described = probe::describe_images(self.services.images, repo)?;

        let version = &self.spec.module.version;
        let tagged = !version.is_empty()
            && described.iter().any(|d| d.tags.iter().any(|t| t == version));
        let mut summary = format!("{} image(s), {} described", images.len(), described.len());
        if !version.is_empty() {
            let state = if tagged { "present" } else { "absent" };
            summary.push_str(&format!(", tag '{version}' {state}"));
        }

        let mut details: Vec<String> = images.iter().map(ToString::to_string).collect();
        details.extend(described.iter().map(ToString::to_string));
        let outcome = PhaseOutcome::Passed {
            results: vec![ResourceProbeResult::new(
                ResourceKind::ContainerRepository,
                repo,
                &summary,
            )],
            summary,
            details,
        };
        Ok(((), outcome))
    }

    // -----------------------------------------------------------------------
    // Workflow phases
    // -----------------------------------------------------------------------

    /// Token, exec, extract, filter. Each step consumes the previous one's
    /// output, so a failure skips everything after it.
    fn workflow(&self, report: &mut VerificationReport) {
        let w = &self.spec.workflow_environment;
        let command = self.workflow_command;
        let pattern = w.dag_name_pattern.as_str();

        let token = self.record(report, Phase::WorkflowTokenAcquire, &w.domain, || {
            let token = probe::mint_cli_token(self.services.workflow, &w.domain)?;
            let outcome = PhaseOutcome::Passed {
                summary: format!("CLI token issued for {}", token.hostname()),
                results: vec![ResourceProbeResult::new(
                    ResourceKind::WorkflowEnvironment,
                    &w.domain,
                    format!("web server {}", token.hostname()),
                )],
                details: Vec::new(),
            };
            Ok((token, outcome))
        });
        let Some(token) = token else {
            let cause = Phase::WorkflowTokenAcquire;
            self.skip(report, Phase::WorkflowCommandExec, command, cause);
            self.skip(report, Phase::WorkflowOutputExtract, command, cause);
            self.skip(report, Phase::WorkflowFilter, pattern, cause);
            return;
        };

        let body = self.record(report, Phase::WorkflowCommandExec, command, || {
            self.execute(&token, command)
        });
        let Some(body) = body else {
            let cause = Phase::WorkflowCommandExec;
            self.skip(report, Phase::WorkflowOutputExtract, command, cause);
            self.skip(report, Phase::WorkflowFilter, pattern, cause);
            return;
        };

        let records = self.record(report, Phase::WorkflowOutputExtract, command, || {
            extract(&body)
        });
        let Some(records) = records else {
            self.skip(report, Phase::WorkflowFilter, pattern, Phase::WorkflowOutputExtract);
            return;
        };

        let matching = self.record(report, Phase::WorkflowFilter, pattern, || {
            let total = records.len();
            let matching = filter_records(records, pattern);
            let outcome = PhaseOutcome::Passed {
                summary: format!("{} of {total} DAG(s) match '{pattern}'", matching.len()),
                results: Vec::new(),
                details: matching.iter().map(ToString::to_string).collect(),
            };
            Ok((matching, outcome))
        });
        report.matching_dags = matching.unwrap_or_default();
    }

    fn execute(&self, token: &CliToken, command: &str) -> Result<(String, PhaseOutcome)> {
        let body = probe::execute_command(self.services.workflow, token, command)?;
        let outcome = PhaseOutcome::passed(format!("{} byte(s) returned", body.len()));
        Ok((body, outcome))
    }
}

fn extract(body: &str) -> Result<(Vec<WorkflowRecord>, PhaseOutcome)> {
    let response = CliResponse::parse(body)?;
    match response.decoded_stderr() {
        Ok(stderr) if !stderr.trim().is_empty() => debug!(%stderr, "workflow CLI stderr"),
        Ok(_) => {}
        Err(e) => debug!(error = %e, "workflow CLI stderr not decodable"),
    }
    let stdout = response.decoded_stdout()?;
    let records = crate::extract::parse_dag_list(&stdout)?;
    let outcome = PhaseOutcome::passed(format!("{} DAG(s) listed", records.len()));
    Ok((records, outcome))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DppError;
    use crate::probe::{
        ArtifactService, IdentityService, ImageService, StorageService, WorkflowService,
    };
    use crate::types::{
        ArtifactDomain, CallerIdentity, ImageDetail, ImageId, ImageRepository,
        PackageOrigin, PackageVersionDescriptor, PackageVersionDetail, StoredObject,
    };
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use std::cell::Cell;

    const SPEC: &str = r#"
metadata:
  environment: dev
  project: orders
module:
  stack: python
  name: orders-etl
  version: 1.4.0
storage_container:
  provider: aws
  name: orders-dev-data
  prefix: raw
artifact_repository:
  domain: acme
  name: pypi-store
  format: pypi
container_repository:
  name: orders-etl
workflow_environment:
  domain: orders-dev-airflow
  dag_name_pattern: "^etl_"
"#;

    fn spec() -> DeploymentSpec {
        DeploymentSpec::parse(SPEC.as_bytes()).unwrap()
    }

    #[derive(Default)]
    struct FakeCloud {
        identity_fails: bool,
        token_fails: bool,
        exec_fails: bool,
        stdout: Option<String>,
        storage_calls: Cell<u32>,
        image_calls: Cell<u32>,
        exec_calls: Cell<u32>,
    }

    impl FakeCloud {
        fn services(&self) -> Services<'_> {
            Services {
                identity: self,
                storage: self,
                artifacts: self,
                images: self,
                workflow: self,
            }
        }
    }

    impl IdentityService for FakeCloud {
        fn caller_identity(&self) -> Result<CallerIdentity> {
            if self.identity_fails {
                return Err(DppError::Upstream("timed out after 5s".to_string()));
            }
            Ok(CallerIdentity {
                user_id: "AIDA".to_string(),
                account: "123456789012".to_string(),
                arn: "arn:aws:iam::123456789012:user/ci".to_string(),
            })
        }
    }

    impl StorageService for FakeCloud {
        fn list_objects(&self, _container: &str, prefix: &str) -> Result<Vec<StoredObject>> {
            self.storage_calls.set(self.storage_calls.get() + 1);
            Ok(vec![StoredObject {
                key: format!("{prefix}/orders.csv"),
                size: 42,
            }])
        }
    }

    fn descriptor(version: &str) -> PackageVersionDescriptor {
        PackageVersionDescriptor {
            package_name: "orders-etl".to_string(),
            version: version.to_string(),
            status: "Published".to_string(),
            revision: "r1".to_string(),
            origin: PackageOrigin::default(),
        }
    }

    impl ArtifactService for FakeCloud {
        fn list_domains(&self) -> Result<Vec<ArtifactDomain>> {
            Ok(Vec::new())
        }

        fn list_package_versions(
            &self,
            _package: &PackageRef<'_>,
        ) -> Result<Vec<PackageVersionDescriptor>> {
            Ok(vec![descriptor("1.3.0"), descriptor("1.4.0")])
        }

        fn describe_package_version(
            &self,
            _package: &PackageRef<'_>,
            version: &str,
        ) -> Result<PackageVersionDetail> {
            Ok(PackageVersionDetail {
                descriptor: descriptor(version),
                display_name: "orders-etl".to_string(),
                home_page: String::new(),
                namespace: String::new(),
                source_code_repository: String::new(),
                published_time: "2024-05-01T10:00:00Z".to_string(),
                licenses: vec!["MIT".to_string()],
            })
        }
    }

    impl ImageService for FakeCloud {
        fn list_repositories(&self) -> Result<Vec<ImageRepository>> {
            Ok(Vec::new())
        }

        fn list_images(&self, _repository: &str) -> Result<Vec<ImageId>> {
            self.image_calls.set(self.image_calls.get() + 1);
            Ok(vec![ImageId {
                tag: "1.4.0".to_string(),
                digest: "sha256:abc".to_string(),
            }])
        }

        fn describe_images(&self, _repository: &str) -> Result<Vec<ImageDetail>> {
            Ok(vec![ImageDetail {
                tags: vec!["1.4.0".to_string()],
                digest: "sha256:abc".to_string(),
                pushed_at: String::new(),
                size_bytes: 1024,
                artifact_media_type: String::new(),
                manifest_media_type: String::new(),
                scan_status: "COMPLETE".to_string(),
                last_recorded_pull_time: String::new(),
            }])
        }
    }

    impl WorkflowService for FakeCloud {
        fn mint_cli_token(&self, _environment: &str) -> Result<CliToken> {
            if self.token_fails {
                return Err(DppError::Auth("AccessDeniedException".to_string()));
            }
            Ok(CliToken::new("web.example.com", "tok"))
        }

        fn execute(&self, _token: &CliToken, _command: &str) -> Result<String> {
            self.exec_calls.set(self.exec_calls.get() + 1);
            if self.exec_fails {
                return Err(DppError::Upstream("POST returned 502".to_string()));
            }
            let stdout = self.stdout.clone().unwrap_or_else(|| {
                "Loading DAGs...\n[{\"dag_id\": \"etl_daily\"}, {\"dag_id\": \"report_daily\"}, {\"dag_id\": \"etl_weekly\"}]\n"
                    .to_string()
            });
            Ok(serde_json::json!({ "stderr": "", "stdout": STANDARD.encode(stdout) }).to_string())
        }
    }

    fn statuses(report: &VerificationReport) -> Vec<(Phase, &'static str)> {
        report
            .phases
            .iter()
            .map(|p| (p.phase, p.outcome.status()))
            .collect()
    }

    #[test]
    fn all_phases_pass_against_healthy_services() {
        let cloud = FakeCloud::default();
        let spec = spec();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);

        let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(phases, Phase::all());
        assert!(report.phases.iter().all(|p| p.outcome.is_passed()));
        assert!(!report.has_failures());
        assert!(report.finished_at.is_some());

        let ids: Vec<_> = report.matching_dags.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["etl_daily", "etl_weekly"]);

        let artifact = report.phase(Phase::ArtifactCheck).unwrap();
        assert!(artifact.outcome.message().contains("orders-etl@1.4.0 is Published"));
        assert_eq!(artifact.resource, "acme/pypi-store/orders-etl@1.4.0");
        let registry = report.phase(Phase::RegistryCheck).unwrap();
        assert!(registry.outcome.message().contains("tag '1.4.0' present"));
    }

    #[test]
    fn identity_failure_does_not_stop_later_phases() {
        let cloud = FakeCloud {
            identity_fails: true,
            ..Default::default()
        };
        let spec = spec();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);

        let s = statuses(&report);
        assert_eq!(s[0], (Phase::IdentityCheck, "failed"));
        assert!(s[1..].iter().all(|(_, status)| *status == "passed"));
        assert!(report.phases[0].outcome.message().contains("authentication failed"));
        assert_eq!(cloud.storage_calls.get(), 1);
        assert_eq!(cloud.image_calls.get(), 1);
        assert!(report.has_failures());
    }

    #[test]
    fn token_failure_skips_remaining_workflow_phases() {
        let cloud = FakeCloud {
            token_fails: true,
            ..Default::default()
        };
        let spec = spec();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);

        assert_eq!(
            statuses(&report)[4..],
            [
                (Phase::WorkflowTokenAcquire, "failed"),
                (Phase::WorkflowCommandExec, "skipped"),
                (Phase::WorkflowOutputExtract, "skipped"),
                (Phase::WorkflowFilter, "skipped"),
            ]
        );
        assert_eq!(cloud.exec_calls.get(), 0);
        assert!(report.matching_dags.is_empty());
        let exec = report.phase(Phase::WorkflowCommandExec).unwrap();
        assert!(exec.outcome.message().contains("workflow_token_acquire"));
    }

    #[test]
    fn exec_failure_skips_extract_and_filter() {
        let cloud = FakeCloud {
            exec_fails: true,
            ..Default::default()
        };
        let spec = spec();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);
        assert_eq!(
            statuses(&report)[5..],
            [
                (Phase::WorkflowCommandExec, "failed"),
                (Phase::WorkflowOutputExtract, "skipped"),
                (Phase::WorkflowFilter, "skipped"),
            ]
        );
    }

    #[test]
    fn output_without_dag_list_fails_extract() {
        let cloud = FakeCloud {
            stdout: Some("Traceback (most recent call last): ...".to_string()),
            ..Default::default()
        };
        let spec = spec();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);
        let extract = report.phase(Phase::WorkflowOutputExtract).unwrap();
        assert!(extract.outcome.message().contains("no structured output"));
        assert!(report.phase(Phase::WorkflowFilter).unwrap().outcome.is_skipped());
    }

    #[test]
    fn invalid_declarations_fail_their_phase_only() {
        let mut spec = spec();
        spec.storage_container.name.clear();
        spec.artifact_repository.format = "gem".to_string();
        let cloud = FakeCloud::default();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);

        let s = statuses(&report);
        assert_eq!(s[1], (Phase::StorageCheck, "failed"));
        assert_eq!(s[2], (Phase::ArtifactCheck, "failed"));
        assert_eq!(s[3], (Phase::RegistryCheck, "passed"));
        assert_eq!(cloud.storage_calls.get(), 0);
        assert!(report.phases[2].outcome.message().contains("'gem'"));
        assert_eq!(report.phases.len(), Phase::all().len());
    }

    #[test]
    fn undeclared_package_gets_a_readable_resource_label() {
        let mut spec = spec();
        spec.artifact_repository = Default::default();
        spec.module = Default::default();
        let cloud = FakeCloud::default();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);

        let artifact = report.phase(Phase::ArtifactCheck).unwrap();
        assert!(artifact.outcome.is_failed());
        assert_eq!(artifact.resource, "(undeclared package)");

        spec.module.name = "orders-etl".to_string();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);
        assert_eq!(report.phase(Phase::ArtifactCheck).unwrap().resource, "orders-etl");
    }

    #[test]
    fn empty_pattern_keeps_every_dag() {
        let mut spec = spec();
        spec.workflow_environment.dag_name_pattern.clear();
        let cloud = FakeCloud::default();
        let report = run_check(&spec, cloud.services(), DEFAULT_WORKFLOW_COMMAND);
        assert_eq!(report.matching_dags.len(), 3);
    }
}
