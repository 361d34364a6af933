use super::Globals;
use crate::output::{print_json, print_lines, print_table};
use anyhow::Context;
use clap::Subcommand;
use dpp_core::aws::AwsCli;
use dpp_core::extract::extract_records;
use dpp_core::filter::filter_records;
use dpp_core::probe::{self, PackageRef};
use dpp_core::spec::DeploymentSpec;
use dpp_core::workflow::MwaaWorkflow;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ProbeSubcommand {
    /// Show the caller identity
    Identity,

    /// List objects in the storage container
    Objects {
        /// Container name (default: storage_container.name)
        #[arg(long)]
        bucket: Option<String>,
        /// Key prefix (default: storage_container.prefix)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// List artifact domains
    Domains,

    /// List versions of the module package
    Packages,

    /// Describe one version of the module package
    Package {
        /// Version (default: module.version)
        #[arg(long)]
        version: Option<String>,
    },

    /// List container image repositories
    Repositories,

    /// List and describe images in the container repository
    Images {
        /// Repository name (default: container_repository.name)
        #[arg(long)]
        repository: Option<String>,
    },

    /// Run a workflow CLI command and list the DAGs it reports
    Dags {
        /// Workflow CLI command (default: "dags list -o json")
        #[arg(long)]
        command: Option<String>,
        /// DAG name pattern (default: workflow_environment.dag_name_pattern)
        #[arg(long)]
        pattern: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(globals: &Globals, subcmd: ProbeSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ProbeSubcommand::Identity => identity(globals),
        ProbeSubcommand::Objects { bucket, prefix } => objects(globals, bucket, prefix),
        ProbeSubcommand::Domains => domains(globals),
        ProbeSubcommand::Packages => packages(globals),
        ProbeSubcommand::Package { version } => package(globals, version),
        ProbeSubcommand::Repositories => repositories(globals),
        ProbeSubcommand::Images { repository } => images(globals, repository),
        ProbeSubcommand::Dags { command, pattern } => dags(globals, command, pattern),
    }
}

// ---------------------------------------------------------------------------
// Account-wide probes (no spec needed)
// ---------------------------------------------------------------------------

fn identity(globals: &Globals) -> anyhow::Result<()> {
    let config = globals.probe_config(None);
    let id = probe::caller_identity(&AwsCli::new(&config))?;
    if globals.json {
        print_json(&id)?;
    } else {
        println!("{id}");
    }
    Ok(())
}

fn domains(globals: &Globals) -> anyhow::Result<()> {
    let config = globals.probe_config(None);
    let domains = probe::list_domains(&AwsCli::new(&config)).context("listing artifact domains")?;
    if globals.json {
        print_json(&domains)?;
    } else {
        print_lines(&domains, "No artifact domains.");
    }
    Ok(())
}

fn repositories(globals: &Globals) -> anyhow::Result<()> {
    let config = globals.probe_config(None);
    let repos = probe::list_repositories(&AwsCli::new(&config))
        .context("listing container repositories")?;
    if globals.json {
        print_json(&repos)?;
    } else {
        print_lines(&repos, "No container repositories.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Spec-driven probes
// ---------------------------------------------------------------------------

fn objects(
    globals: &Globals,
    bucket: Option<String>,
    prefix: Option<String>,
) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let config = globals.probe_config(Some(&spec));
    let bucket = bucket.unwrap_or_else(|| spec.storage_container.name.clone());
    let prefix = prefix.unwrap_or_else(|| spec.storage_container.prefix.clone());

    let objects = probe::list_objects(&AwsCli::new(&config), &bucket, &prefix)
        .with_context(|| format!("listing objects in '{bucket}'"))?;
    if globals.json {
        print_json(&objects)?;
    } else {
        print_lines(&objects, "No objects.");
    }
    Ok(())
}

fn package_ref(spec: &DeploymentSpec) -> anyhow::Result<PackageRef<'_>> {
    let a = &spec.artifact_repository;
    Ok(PackageRef {
        domain: &a.domain,
        domain_owner: &a.account_id,
        repository: &a.name,
        format: probe::resolve_format(&a.format)?,
        package: &spec.module.name,
    })
}

fn packages(globals: &Globals) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let config = globals.probe_config(Some(&spec));
    let package = package_ref(&spec)?;

    let versions = probe::list_package_versions(&AwsCli::new(&config), &package)
        .with_context(|| format!("listing versions of '{}'", package.package))?;
    if globals.json {
        print_json(&versions)?;
    } else {
        print_lines(&versions, "No package versions.");
    }
    Ok(())
}

fn package(globals: &Globals, version: Option<String>) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let config = globals.probe_config(Some(&spec));
    let package = package_ref(&spec)?;
    let version = version.unwrap_or_else(|| spec.module.version.clone());

    let detail = probe::describe_package_version(&AwsCli::new(&config), &package, &version)
        .with_context(|| format!("describing {}@{version}", package.package))?;
    if globals.json {
        print_json(&detail)?;
    } else {
        println!("{detail}");
    }
    Ok(())
}

fn images(globals: &Globals, repository: Option<String>) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let config = globals.probe_config(Some(&spec));
    let repo = repository.unwrap_or_else(|| spec.container_repository.name.clone());
    let aws = AwsCli::new(&config);

    let ids = probe::list_images(&aws, &repo).with_context(|| format!("listing images in '{repo}'"))?;
    let details = probe::describe_images(&aws, &repo)
        .with_context(|| format!("describing images in '{repo}'"))?;
    if globals.json {
        print_json(&serde_json::json!({
            "repository": repo,
            "images": ids,
            "details": details,
        }))?;
    } else {
        print_lines(&ids, "No images.");
        for d in &details {
            println!("{d}");
        }
    }
    Ok(())
}

fn dags(
    globals: &Globals,
    command: Option<String>,
    pattern: Option<String>,
) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let mut config = globals.probe_config(Some(&spec));
    if let Some(command) = command {
        config = config.with_workflow_command(command);
    }
    let environment = &spec.workflow_environment.domain;
    let pattern = pattern.unwrap_or_else(|| spec.workflow_environment.dag_name_pattern.clone());

    let workflow = MwaaWorkflow::new(&config).context("failed to set up workflow proxy")?;
    let token = probe::mint_cli_token(&workflow, environment)
        .with_context(|| format!("minting CLI token for '{environment}'"))?;
    let body = probe::execute_command(&workflow, &token, &config.workflow_command)
        .with_context(|| format!("running '{}'", config.workflow_command))?;
    let records = filter_records(extract_records(&body)?, &pattern);

    if globals.json {
        print_json(&records)?;
        return Ok(());
    }
    if records.is_empty() {
        println!("No DAGs match '{pattern}'.");
        return Ok(());
    }
    let rows = records
        .iter()
        .map(|d| {
            vec![
                d.id.clone(),
                d.owner.clone(),
                d.paused.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                d.filepath.clone(),
            ]
        })
        .collect();
    print_table(&["DAG", "OWNER", "PAUSED", "FILE"], rows);
    Ok(())
}
