//! Netlist inspection.
//!
//! Parses a netlist with everything it includes, resolves its dependencies and
//! reports what was found:
//!
//! - statement counts per kind,
//! - statements whose master names nothing, and dependency cycles,
//! - optionally, the hierarchical path of every instance.
//!
//! The golden export and the dependency graph can be written alongside.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use radnet::inspect::{InspectArgs, inspect_main};
//!
//! let args = InspectArgs {
//!     input: "top.scs".into(),
//!     config: None,
//!     permissive: true,
//!     report: None,
//!     ancestry: true,
//!     dot: Some("dependencies.dot".into()),
//!     golden: Some("golden.scs".into()),
//! };
//!
//! inspect_main(args)?;
//! # Ok(())
//! # }
//! ```

use std::{fs, io::Write, path::PathBuf};

use anyhow::*;
use clap::Parser;
use petgraph::dot;
use prettytable::*;

use crate::netlist::{Kind, StatementKind};
use crate::resolver::{dependency_graph, resolve};
use crate::{read_config, read_netlist};

/// Command-line arguments for the inspect command.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Top-level netlist
    pub input: PathBuf,

    /// YAML vocabulary and radiation configuration
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Accept unterminated blocks and mismatched block names
    #[clap(long)]
    pub permissive: bool,

    /// Report file (default: stdout)
    #[clap(long, short)]
    pub report: Option<PathBuf>,

    /// List the hierarchical path of every instance
    #[clap(long)]
    pub ancestry: bool,

    /// DOT file of the statement dependency graph
    #[clap(long)]
    pub dot: Option<PathBuf>,

    /// Write the parsed netlist back as text
    #[clap(long)]
    pub golden: Option<PathBuf>,
}

pub fn inspect_main(args: InspectArgs) -> Result<()> {
    let InspectArgs {
        input,
        config,
        permissive,
        report,
        ancestry,
        dot,
        golden,
    } = args;

    let mut writer: Box<dyn Write> = match report {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    let config = read_config(config.as_deref())?;
    let (mut netlist, tables, parse_report) = read_netlist(&input, &config, permissive)?;
    let resolution = resolve(&mut netlist, &tables);

    writeln!(
        writer,
        "{} statements parsed in {} files, {} dropped, {} warnings",
        parse_report.parsed, parse_report.files, parse_report.dropped, parse_report.warnings
    )?;

    let mut table = Table::new();
    table.set_titles(row!["Kind", "Count"]);
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    for kind in Kind::ALL.iter().filter(|k| **k != Kind::Circuit) {
        let count = netlist.iter_kind(*kind).count();
        if count > 0 {
            table.add_row(row![kind, r->count]);
        }
    }
    table.print(&mut writer)?;

    writeln!(
        writer,
        "\n{} instances reach a subcircuit, {} unresolved, {} cycles",
        resolution.resolved,
        resolution.unresolved.len(),
        resolution.cycles.len()
    )?;

    if !resolution.unresolved.is_empty() {
        let mut table = Table::new();
        table.set_titles(row!["Statement", "Kind", "Master", "File", "Line"]);
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        for id in &resolution.unresolved {
            let statement = &netlist[*id];
            table.add_row(row![
                statement.name,
                statement.kind(),
                statement.master_name,
                netlist[statement.circuit].name,
                r->statement.line,
            ]);
        }
        table.print(&mut writer)?;
    }

    for cycle in &resolution.cycles {
        let names: Vec<_> = cycle.iter().map(|id| netlist[*id].name.to_string()).collect();
        writeln!(writer, "Cycle: {}", names.join(" -> "))?;
    }

    if ancestry {
        let mut table = Table::new();
        table.set_titles(row!["Instance", "Master", "Subcircuit", "Path"]);
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        for id in netlist.iter_kind(Kind::Instance) {
            let statement = &netlist[id];
            let StatementKind::Instance(data) = &statement.kind else {
                continue;
            };
            let subcircuit = statement
                .dependency
                .global_parent
                .map(|s| netlist[s].name.to_string())
                .unwrap_or_else(|| "-".to_string());
            for path in &data.ancestry {
                table.add_row(row![statement.name, statement.master_name, subcircuit, path]);
            }
        }
        writeln!(writer)?;
        table.print(&mut writer)?;
    }

    if let Some(filename) = dot {
        fs::write(filename, format!("{:?}", dot::Dot::new(&dependency_graph(&netlist))))?;
    }

    if let Some(filename) = golden {
        fs::write(filename, netlist.export())?;
    }

    Ok(())
}
