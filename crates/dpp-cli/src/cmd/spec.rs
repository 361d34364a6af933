use super::Globals;
use crate::output::print_json;
use clap::Subcommand;
use dpp_core::spec::WarnLevel;

#[derive(Subcommand)]
pub enum SpecSubcommand {
    /// Print the parsed spec
    Show,

    /// Check the spec for declarations the probes cannot use
    Validate,
}

pub fn run(globals: &Globals, subcmd: SpecSubcommand) -> anyhow::Result<()> {
    match subcmd {
        SpecSubcommand::Show => show(globals),
        SpecSubcommand::Validate => validate(globals),
    }
}

fn show(globals: &Globals) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    if globals.json {
        print_json(&spec)?;
    } else {
        print!("{}", spec.to_yaml()?);
    }
    Ok(())
}

fn validate(globals: &Globals) -> anyhow::Result<()> {
    let spec = globals.load_spec()?;
    let warnings = spec.validate();

    if globals.json {
        let value = serde_json::json!({
            "spec": globals.spec_path,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Spec is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("spec validation found errors");
    }
    Ok(())
}
