//! `formgen validate`

use crate::load_definition;
use anyhow::Context;
use clap::Args;
use formgen_definition::{
    FormDefinition, FormIntegrityValidator, FormStats, IntegrityReport, RepairSummary,
    ResponseProcessor,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub(crate) struct ValidateArgs {
    /// Definition JSON file
    file: PathBuf,

    /// Write the repaired definition back to FILE
    #[arg(long)]
    fix: bool,

    /// Write the repaired definition here instead
    #[arg(long, value_name = "FILE", conflicts_with = "fix")]
    output: Option<PathBuf>,

    /// Validate as is, without repairing first
    #[arg(long, conflicts_with_all = ["fix", "output"])]
    raw: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationOutput {
    file: String,
    valid: bool,
    errors: Vec<String>,
    repairs: Vec<String>,
    stats: FormStats,
}

/// Outcome of checking one definition
#[derive(Debug)]
pub(crate) struct Checked {
    pub(crate) definition: FormDefinition,
    pub(crate) repairs: RepairSummary,
    pub(crate) report: IntegrityReport,
}

/// Repair unless `raw`, then validate
pub(crate) fn check(mut definition: FormDefinition, raw: bool) -> Checked {
    let repairs = if raw {
        RepairSummary::default()
    } else {
        ResponseProcessor::new().process(&mut definition)
    };
    let report = FormIntegrityValidator::new().validate_form_integrity(&definition);
    Checked {
        definition,
        repairs,
        report,
    }
}

pub(crate) fn run(args: &ValidateArgs) -> anyhow::Result<bool> {
    let checked = check(load_definition(&args.file)?, args.raw);
    tracing::debug!(
        file = %args.file.display(),
        repairs = checked.repairs.len(),
        errors = checked.report.errors.len(),
        "definition checked"
    );

    let target = if args.fix {
        Some(&args.file)
    } else {
        args.output.as_ref()
    };
    if let Some(output) = target {
        let json = serde_json::to_string_pretty(&checked.definition)?;
        std::fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
        tracing::info!(output = %output.display(), "definition written");
    }

    let output = ValidationOutput {
        file: args.file.display().to_string(),
        valid: checked.report.is_valid,
        errors: checked.report.errors.iter().map(ToString::to_string).collect(),
        repairs: checked.repairs.repairs.iter().map(ToString::to_string).collect(),
        stats: FormStats::of(&checked.definition),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(output.valid)
}

fn print_text(output: &ValidationOutput) {
    println!("{}", output.file);
    println!(
        "  pages: {}  components: {}  conditions: {}  lists: {}",
        output.stats.page_count,
        output.stats.component_count,
        output.stats.condition_count,
        output.stats.list_count
    );
    if !output.repairs.is_empty() {
        println!("  repaired ({}):", output.repairs.len());
        for repair in &output.repairs {
            println!("    - {repair}");
        }
    }
    if output.valid {
        println!("  valid");
    } else {
        println!("  invalid ({} errors):", output.errors.len());
        for error in &output.errors {
            println!("    - {error}");
        }
    }
}
