//! Scenario generation.
//!
//! Parses and resolves a netlist, then writes one folder per alteration
//! scenario below the output directory, each holding the rewritten netlist
//! and the included netlists the alteration touched.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use radnet::alter::{AlterArgs, Mode, alter_main};
//!
//! let args = AlterArgs {
//!     input: "top.scs".into(),
//!     output: "scenarios".into(),
//!     config: Some("radiation.yaml".into()),
//!     permissive: false,
//!     mode: Mode::Injection,
//!     listed_only: false,
//!     prune_analyses: true,
//!     report: None,
//! };
//!
//! alter_main(args)?;
//! # Ok(())
//! # }
//! ```

use std::{fs, io::Write, path::PathBuf};

use anyhow::*;
use clap::{Parser, ValueEnum};
use prettytable::*;

use crate::resolver::resolve;
use crate::transform::{
    AlterationMode, InjectionScope, RadiationLibrary, TransformOptions, TransformationEngine,
    write_scenarios,
};
use crate::{read_config, read_netlist};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Wire a radiation source to each node
    Injection,
    /// Replace each alterable master by its substitute
    Substitution,
}

/// Command-line arguments for the alter command.
#[derive(Parser, Debug)]
pub struct AlterArgs {
    /// Top-level netlist
    pub input: PathBuf,

    /// Directory receiving one folder per scenario
    #[clap(long, short)]
    pub output: PathBuf,

    /// YAML vocabulary and radiation configuration
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Accept unterminated blocks and mismatched block names
    #[clap(long)]
    pub permissive: bool,

    #[clap(long, value_enum, default_value = "injection")]
    pub mode: Mode,

    /// Inject only at nodes of statements listed as injectable
    #[clap(long)]
    pub listed_only: bool,

    /// Keep only the main transient analysis in scenarios
    #[clap(long)]
    pub prune_analyses: bool,

    /// Scenario list (default: stdout)
    #[clap(long, short)]
    pub report: Option<PathBuf>,
}

pub fn alter_main(args: AlterArgs) -> Result<()> {
    let AlterArgs {
        input,
        output,
        config,
        permissive,
        mode,
        listed_only,
        prune_analyses,
        report,
    } = args;

    let mut writer: Box<dyn Write> = match report {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    let mode = match (mode, listed_only) {
        (Mode::Injection, false) => AlterationMode::Injection(InjectionScope::All),
        (Mode::Injection, true) => AlterationMode::Injection(InjectionScope::Listed),
        (Mode::Substitution, false) => AlterationMode::Substitution,
        (Mode::Substitution, true) => bail!("--listed-only only applies to injection"),
    };

    let config = read_config(config.as_deref())?;
    let (mut golden, mut tables, _) = read_netlist(&input, &config, permissive)?;
    let library = RadiationLibrary::from_config(&config.radiation, &mut tables)?;
    resolve(&mut golden, &tables);

    let options = TransformOptions {
        mode,
        prune_analyses,
    };
    let generation = TransformationEngine::new(&tables, &library, options).generate(&mut golden)?;

    fs::create_dir_all(&output)?;
    let written = write_scenarios(&generation.scenarios, &output);

    let mut table = Table::new();
    table.set_titles(row!["#", "Folder", "Description"]);
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    let mut failed = 0;
    for (scenario, result) in generation.scenarios.iter().zip(&written) {
        if result.is_err() {
            failed += 1;
            continue;
        }
        table.add_row(row![r->scenario.index, scenario.folder, scenario.description]);
    }
    table.print(&mut writer)?;

    writeln!(
        writer,
        "{} scenarios written to {}, {} targets failed, {} scenarios not written",
        generation.scenarios.len() - failed,
        output.display(),
        generation.failed,
        failed
    )?;

    Ok(())
}
