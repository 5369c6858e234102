use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use progconfig::RuntimeConfig;
use shaderpack::{DirectoryLoader, ProgramPack};
use shaderprog::{HeadlessDriver, ProgramRegistry};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, HydrateArgs, InflateArgs};

/// Configuration plus the loader it describes.
#[derive(Debug)]
pub struct Workspace {
    pub config: RuntimeConfig,
    pub config_path: Option<PathBuf>,
    pub base: PathBuf,
    pub loader: DirectoryLoader,
}

impl Workspace {
    pub fn load(cli: &Cli) -> Result<Self> {
        let (config, config_path, base) = match &cli.config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                let config = RuntimeConfig::from_toml_str(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?;
                let base = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                (config, Some(path.clone()), base)
            }
            None => (RuntimeConfig::default(), None, PathBuf::from(".")),
        };

        let mut loader = DirectoryLoader::new(
            config.resolved_roots(&base),
            config.library.extension.clone(),
        );
        for root in &cli.roots {
            loader.push_root(root);
        }
        tracing::debug!(
            config = ?config_path,
            roots = ?loader.roots(),
            extension = %loader.extension(),
            "resolved shader library"
        );

        Ok(Self {
            config,
            config_path,
            base,
            loader,
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.resolved_manifest(&self.base)
    }
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

pub fn inflate(workspace: &Workspace, args: &InflateArgs) -> Result<()> {
    let source = shaderprog::load_and_inflate(&workspace.loader, &args.name)
        .with_context(|| format!("failed to inflate shader '{}'", args.name))?;

    match &args.output {
        Some(path) => {
            fs::write(path, &source)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(shader = %args.name, output = %path.display(), "wrote inflated source");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(source.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn hydrate(workspace: &Workspace, args: &HydrateArgs) -> Result<()> {
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| workspace.manifest_path());
    let pack = ProgramPack::from_manifest_path(&manifest_path)
        .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;
    pack.ensure_sources(&workspace.loader)
        .context("manifest names missing shader sources")?;

    let policy = workspace.config.fatal_policy();
    let mut registry =
        ProgramRegistry::new(policy).with_validation(workspace.config.validate_programs());
    let ids = pack
        .register_all(&mut registry, &workspace.loader)
        .context("failed to assemble programs")?;
    tracing::info!(programs = ids.len(), ?policy, "hydrating program manifest");

    let mut driver = HeadlessDriver::new();
    let outcome = registry.hydrate_all(&mut driver).and_then(|summary| {
        for &id in &ids {
            registry.ensure_bound(id, &mut driver)?;
        }
        Ok(summary)
    });
    registry.shutdown(&mut driver);

    let summary = outcome.context("program hydration failed")?;
    println!(
        "{} linked, {} deferred, {} failed",
        summary.linked, summary.deferred, summary.failed
    );
    Ok(())
}
