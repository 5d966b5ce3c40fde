//! Radiation-effect alteration of Spectre netlists
//!
//! This library parses analog circuit netlists written in the Spectre
//! language, works out which subcircuit every instance ultimately
//! instantiates, and produces altered copies of the circuit in which a
//! radiation source is injected at a node, or a statement's master is
//! substituted by a radiation-hardened or radiation-aware model.
//!
//! # Overview
//!
//! Processing goes through four stages:
//!
//! 1. **Parsing** ([`parser`]): netlist text, and every netlist it includes,
//!    becomes a tree of typed statements held in a [`netlist::Netlist`] arena.
//!    Which kind a statement is gets decided by the [`classifier`], from
//!    vocabularies loaded at runtime ([`config`]).
//! 2. **Resolution** ([`resolver`]): models, analog models and instances are
//!    linked to the statement their master names, and every instance to the
//!    subcircuit it ends up instantiating.
//! 3. **Transformation** ([`transform`]): one scenario per alteration target,
//!    each an independent copy of the golden arena.
//! 4. **Export** ([`netlist::export`], [`transform::scenario`]): scenarios are
//!    written back as netlist text, one folder each.
//!
//! # Usage Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use radnet::config::Config;
//! use radnet::read_netlist;
//! use radnet::resolver::resolve;
//! use std::path::Path;
//!
//! let config = Config::default();
//! let (mut netlist, tables, report) = read_netlist(Path::new("top.scs"), &config, false)?;
//! let resolution = resolve(&mut netlist, &tables);
//! println!("{} statements, {} unresolved", report.parsed, resolution.unresolved.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - **[`netlist`]**: statement arena, node scopes, export and subtree copies
//! - **[`classifier`]**: statement classification from runtime vocabularies
//! - **[`parser`]**: line reading, block handling and per-kind parse routines
//! - **[`resolver`]**: dependency resolution and instance ancestry
//! - **[`transform`]**: injection and substitution scenarios
//! - **[`inspect`]**, **[`alter`]**: the command-line front-ends

use std::path::Path;

use anyhow::Result;
use clap::Parser;

pub mod alter;
pub mod classifier;
pub mod config;
pub mod error;
pub mod inspect;
pub mod netlist;
pub mod parser;
pub mod resolver;
pub mod transform;

#[cfg(test)]
mod test_helpers;

pub use alter::{AlterArgs, alter_main};
pub use error::Error;
pub use inspect::{InspectArgs, inspect_main};

/// Interned statement, master and node names.
pub type Symbol = string_cache::DefaultAtom;

/// Reads the configuration file, or the built-in Spectre vocabulary without one.
pub fn read_config(path: Option<&Path>) -> Result<config::Config> {
    Ok(match path {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    })
}

/// Parses a netlist file and everything it includes.
///
/// Returns the arena, the classifier tables it was parsed with (vocabularies
/// may grow while parsing) and the parse statistics.
pub fn read_netlist(
    path: &Path,
    config: &config::Config,
    permissive: bool,
) -> Result<(netlist::Netlist, classifier::ClassifierTables, parser::ParseReport)> {
    let mut tables = classifier::ClassifierTables::from_config(config)?;
    let parsed = parser::parse_file(path, &mut tables, parser::ParseOptions { permissive })?;
    Ok((parsed.netlist, tables, parsed.report))
}

/// Command-line interface arguments for the radnet tools.
///
/// - `Inspect`: parse and resolve a netlist, report what was found
/// - `Alter`: generate injection or substitution scenarios
#[derive(Debug, Parser)]
#[clap(
    name = "radnet",
    about = "Radiation source injection and substitution for Spectre netlists"
)]
pub enum CLIArguments {
    /// Report statement counts, unresolved dependencies and instance paths.
    Inspect(InspectArgs),
    /// Write one altered netlist per injection or substitution target.
    Alter(AlterArgs),
}
