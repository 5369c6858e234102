use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "progctl",
    author,
    version,
    about = "Inspect shader libraries and dry-run program manifests"
)]
pub struct Cli {
    /// Runtime configuration file; relative paths inside it resolve against its directory.
    #[arg(long, short, global = true, value_name = "FILE", env = "PROGCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Extra shader search root, searched after the configured roots (repeatable).
    #[arg(long = "root", global = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a shader source with every `#include` expanded.
    Inflate(InflateArgs),
    /// Build every program in the manifest on a headless driver and report problems.
    Check(CheckArgs),
    /// Register and hydrate the manifest the way a host starts up, applying the
    /// configured `[programs] fatal` policy to compile and link failures.
    Hydrate(HydrateArgs),
}

#[derive(Args, Debug)]
pub struct InflateArgs {
    /// Logical shader name (file extension implied).
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Write the inflated source to a file instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Program manifest to check instead of the configured one.
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Treat declared uniforms or samplers missing from the linked program as failures.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct HydrateArgs {
    /// Program manifest to hydrate instead of the configured one.
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
