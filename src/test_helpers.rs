//! Fixtures shared by the unit tests.
//!
//! Netlists parsed from text are named `top.scs`, so their root circuit is
//! called `top`.

use std::path::Path;

use crate::classifier::ClassifierTables;
use crate::config::Config;
use crate::netlist::Netlist;
use crate::parser::{ParseOptions, parse_file, parse_str};
use crate::resolver::resolve;
use crate::transform::RadiationLibrary;

/// Parse with the default vocabulary.
pub fn parse_netlist(text: &str) -> (Netlist, ClassifierTables) {
    parse_netlist_with(text, &Config::default())
}

pub fn parse_netlist_with(text: &str, config: &Config) -> (Netlist, ClassifierTables) {
    let mut tables = ClassifierTables::from_config(config).unwrap();
    let parsed = parse_str(text, Path::new("top.scs"), &mut tables, ParseOptions::default()).unwrap();
    (parsed.netlist, tables)
}

pub fn parse_file_netlist(path: &Path) -> (Netlist, ClassifierTables) {
    let mut tables = ClassifierTables::from_config(&Config::default()).unwrap();
    let parsed = parse_file(path, &mut tables, ParseOptions::default()).unwrap();
    (parsed.netlist, tables)
}

/// Parse and resolve, with the radiation sources of `config` loaded.
pub fn resolved_netlist_with(text: &str, config: &Config) -> (Netlist, ClassifierTables, RadiationLibrary) {
    let mut tables = ClassifierTables::from_config(config).unwrap();
    let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();
    let mut netlist = parse_str(text, Path::new("top.scs"), &mut tables, ParseOptions::default())
        .unwrap()
        .netlist;
    resolve(&mut netlist, &tables);
    (netlist, tables, library)
}
