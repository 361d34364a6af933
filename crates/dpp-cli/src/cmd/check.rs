use super::Globals;
use crate::output::{print_json, print_table};
use anyhow::Context;
use dpp_core::aws::AwsCli;
use dpp_core::orchestrator::{run_check, PhaseOutcome, VerificationReport};
use dpp_core::probe::Services;
use dpp_core::workflow::MwaaWorkflow;

pub fn run(globals: &Globals, strict: bool, command: Option<String>) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let mut config = globals.probe_config(Some(&spec));
    if let Some(command) = command {
        config = config.with_workflow_command(command);
    }

    let aws = AwsCli::new(&config);
    let workflow = MwaaWorkflow::new(&config).context("failed to set up workflow proxy")?;
    let services = Services {
        identity: &aws,
        storage: &aws,
        artifacts: &aws,
        images: &aws,
        workflow: &workflow,
    };

    let report = run_check(&spec, services, &config.workflow_command);

    if globals.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if strict && report.has_failures() {
        anyhow::bail!(
            "{} of {} phases failed",
            report.failed(),
            report.phases.len()
        );
    }
    Ok(())
}

fn print_report(report: &VerificationReport) {
    let name = if report.project.is_empty() {
        "(unnamed project)"
    } else {
        report.project.as_str()
    };
    if report.environment.is_empty() {
        println!("Verification: {name}");
    } else {
        println!("Verification: {name} [{}]", report.environment);
    }
    println!(
        "Started: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    let rows = report
        .phases
        .iter()
        .map(|p| {
            vec![
                p.phase.to_string(),
                p.outcome.status().to_string(),
                p.resource.clone(),
                p.outcome.message().to_string(),
            ]
        })
        .collect();
    print_table(&["PHASE", "STATUS", "RESOURCE", "RESULT"], rows);

    for p in &report.phases {
        if let PhaseOutcome::Passed { details, .. } = &p.outcome {
            if details.is_empty() {
                continue;
            }
            println!();
            println!("{}:", p.phase);
            for line in details {
                println!("  {line}");
            }
        }
    }

    if !report.matching_dags.is_empty() {
        println!();
        let rows = report
            .matching_dags
            .iter()
            .map(|d| {
                let paused = match d.paused {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "-",
                };
                vec![
                    d.id.clone(),
                    d.owner.clone(),
                    paused.to_string(),
                    d.filepath.clone(),
                ]
            })
            .collect();
        print_table(&["DAG", "OWNER", "PAUSED", "FILE"], rows);
    }

    println!();
    let elapsed = report
        .finished_at
        .map(|end| (end - report.started_at).num_milliseconds())
        .unwrap_or_default();
    println!(
        "{} passed, {} failed, {} skipped in {elapsed}ms",
        report.passed(),
        report.failed(),
        report.skipped()
    );
}
