mod check;
mod cli;
mod run;

use anyhow::Result;
use cli::Command;
use run::Workspace;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let workspace = Workspace::load(&cli)?;
    match &cli.command {
        Command::Inflate(args) => run::inflate(&workspace, args),
        Command::Check(args) => check::check(&workspace, args),
        Command::Hydrate(args) => run::hydrate(&workspace, args),
    }
}
