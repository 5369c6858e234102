//! Dry run of a program manifest: every entry is assembled, hydrated and bound
//! on the headless driver, and the outcome is reported per program.
use std::path::Path;

use anyhow::{Context, Result};
use progconfig::FatalMode;
use serde::Serialize;
use shaderpack::{build_program, ProgramPack};
use shaderprog::{FatalPolicy, HeadlessDriver, ProgramRegistry, ShaderProgram};

use crate::cli::CheckArgs;
use crate::run::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Unresolved,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct ProgramReport {
    pub name: String,
    pub status: Status,
    pub vertex: String,
    pub fragment: String,
    pub uniforms: usize,
    pub samplers: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lighting_block: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    pub manifest: String,
    pub fatal: FatalMode,
    pub programs: Vec<ProgramReport>,
}

impl CheckReport {
    pub fn count(&self, status: Status) -> usize {
        self.programs
            .iter()
            .filter(|program| program.status == status)
            .count()
    }
}

pub fn check(workspace: &Workspace, args: &CheckArgs) -> Result<()> {
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| workspace.manifest_path());
    let report = build_report(workspace, &manifest_path)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        );
    } else {
        print_report(&report);
    }

    let failed = report.count(Status::Failed);
    let unresolved = report.count(Status::Unresolved);
    if failed > 0 {
        anyhow::bail!("{failed} of {} programs failed", report.programs.len());
    }
    if args.strict && unresolved > 0 {
        anyhow::bail!(
            "{unresolved} of {} programs declare names the driver does not report",
            report.programs.len()
        );
    }
    Ok(())
}

pub fn build_report(workspace: &Workspace, manifest_path: &Path) -> Result<CheckReport> {
    let pack = ProgramPack::from_manifest_path(manifest_path)
        .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;

    // Failures are collected per program rather than escalated.
    let mut registry =
        ProgramRegistry::new(FatalPolicy::Propagate).with_validation(workspace.config.validate_programs());
    let mut driver = HeadlessDriver::new();
    let mut programs = Vec::new();

    for entry in pack.programs() {
        let mut report = ProgramReport {
            name: entry.name.clone(),
            status: Status::Failed,
            vertex: entry.vertex.clone(),
            fragment: entry.fragment.clone(),
            uniforms: entry.uniforms.len(),
            samplers: entry.samplers.len(),
            unresolved: Vec::new(),
            lighting_block: None,
            error: None,
        };

        let id = match registry.insert_with(entry.name.clone(), |id| {
            build_program(id, entry, &workspace.loader)
        }) {
            Ok(id) => id,
            Err(err) => {
                report.error = Some(format!("{:#}", anyhow::Error::from(err)));
                programs.push(report);
                continue;
            }
        };

        match registry.ensure_bound(id, &mut driver) {
            Ok(true) => {
                if let Some(program) = registry.get(id) {
                    fill_bound(&mut report, program);
                }
            }
            Ok(false) => report.error = Some("program could not be bound".to_string()),
            Err(err) => report.error = Some(err.to_string()),
        }
        tracing::debug!(program = %report.name, status = ?report.status, "checked program");
        programs.push(report);
    }

    registry.shutdown(&mut driver);
    Ok(CheckReport {
        config: workspace
            .config_path
            .as_ref()
            .map(|path| path.display().to_string()),
        manifest: manifest_path.display().to_string(),
        fatal: workspace.config.fatal_mode(),
        programs,
    })
}

fn fill_bound(report: &mut ProgramReport, program: &ShaderProgram) {
    report.unresolved = program
        .unresolved_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    report.lighting_block = program.lighting_block_index();
    report.status = if report.unresolved.is_empty() {
        Status::Ok
    } else {
        Status::Unresolved
    };
}

fn print_report(report: &CheckReport) {
    if let Some(config) = &report.config {
        println!("Config:   {config}");
    }
    println!("Manifest: {}", report.manifest);
    for program in &report.programs {
        let label = match program.status {
            Status::Ok => "ok",
            Status::Unresolved => "warn",
            Status::Failed => "FAILED",
        };
        println!(
            "  {label:<8} {:<24} {} + {} ({} uniforms, {} samplers)",
            program.name, program.vertex, program.fragment, program.uniforms, program.samplers
        );
        if !program.unresolved.is_empty() {
            println!("           not in linked program: {}", program.unresolved.join(", "));
        }
        if let Some(error) = &program.error {
            for line in error.lines() {
                println!("           {line}");
            }
        }
    }
    println!(
        "{} ok, {} with unresolved names, {} failed",
        report.count(Status::Ok),
        report.count(Status::Unresolved),
        report.count(Status::Failed)
    );
}
