//! Scenario output.
//!
//! A scenario is written to its own folder, `<index>_<label>`. The root
//! netlist keeps its file name; every included circuit the alteration touched
//! is written next to it and the include statements pointing to it are
//! re-pointed to the local copy. Untouched includes keep referencing the
//! original files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::netlist::{Exporter, Kind, Netlist, StatementId, StatementKind};

lazy_static! {
    static ref NON_IDENTIFIER: Regex = Regex::new(r"[^a-zA-Z0-9_]").unwrap();
}

/// One altered copy of the golden netlist.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub index: usize,
    pub folder: String,
    pub description: String,
    pub netlist: Netlist,
}

impl Scenario {
    pub fn new(index: usize, label: &str, description: String, netlist: Netlist) -> Self {
        Self {
            index,
            folder: folder_name(index, label),
            description,
            netlist,
        }
    }

    /// Text of the root netlist.
    pub fn export(&self) -> String {
        self.netlist.export()
    }

    /// Write the scenario below `dir`, returning its folder.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let folder = dir.join(&self.folder);
        fs::create_dir_all(&folder)?;

        let netlist = &self.netlist;
        let root = netlist.root();
        let mut used = HashSet::new();
        let root_file = file_name(netlist, root, &mut used);

        let altered: Vec<(StatementId, String)> = netlist
            .circuits()
            .filter(|c| *c != root)
            .filter(|c| netlist[*c].circuit_data().is_some_and(|data| data.altered))
            .map(|c| (c, file_name(netlist, c, &mut used)))
            .collect();

        let mut exporter = Exporter::new(netlist);
        for include in netlist.iter_kind(Kind::Include) {
            if let StatementKind::Include(data) = &netlist[include].kind {
                if let Some((_, file)) = altered.iter().find(|(c, _)| Some(*c) == data.circuit) {
                    exporter.redirect_include(include, folder.join(file).to_string_lossy().to_string());
                }
            }
        }

        for (circuit, file) in std::iter::once((root, root_file)).chain(altered) {
            let mut text = String::new();
            exporter.write_circuit(circuit, &mut text)?;
            fs::write(folder.join(&file), text)?;
            debug!("Scenario {}: wrote {}", self.index, file);
        }
        Ok(folder)
    }
}

/// Replace anything but letters, digits and `_`.
pub fn sanitize(text: &str) -> String {
    NON_IDENTIFIER.replace_all(text, "_").into_owned()
}

/// `<index>_<label>`, sanitized.
pub fn folder_name(index: usize, label: &str) -> String {
    let label = sanitize(label);
    if label.is_empty() {
        index.to_string()
    } else {
        format!("{}_{}", index, label)
    }
}

/// File name of a circuit, made unique among the names already `used`.
fn file_name(netlist: &Netlist, circuit: StatementId, used: &mut HashSet<String>) -> String {
    let name = netlist[circuit]
        .circuit_data()
        .and_then(|data| data.path.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "netlist.scs".to_string());
    let name = if used.contains(&name) {
        format!("{}_{}", circuit.0, name)
    } else {
        name
    };
    used.insert(name.clone());
    name
}

/// Write scenarios concurrently, one result per scenario in input order.
pub fn write_scenarios(scenarios: &[Scenario], dir: &Path) -> Vec<Result<PathBuf>> {
    scenarios
        .par_iter()
        .map(|scenario| {
            let result = scenario.write_to(dir);
            if let Err(e) = &result {
                warn!("Scenario {} not written: {}", scenario.folder, e);
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn folder_names_are_sanitised() {
        assert_eq!(folder_name(3, "inj_top_n1"), "3_inj_top_n1");
        assert_eq!(folder_name(12, "inj_amp_gnd!.x"), "12_inj_amp_gnd__x");
        assert_eq!(folder_name(4, ""), "4");
    }

    #[test]
    fn root_netlist_is_written_under_its_name() {
        let (netlist, _) = parse_netlist("r1 (a b) resistor r=1k\n");
        let scenario = Scenario::new(1, "copy", "plain copy".to_string(), netlist);
        let dir = tempfile::tempdir().unwrap();

        let folder = scenario.write_to(dir.path()).unwrap();
        assert_eq!(folder, dir.path().join("1_copy"));
        let text = fs::read_to_string(folder.join("top.scs")).unwrap();
        assert_eq!(text, scenario.export());
        assert_eq!(text, "r1 (a b) resistor r=1k\n");
    }

    #[test]
    fn altered_includes_are_written_locally() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cells.scs"), "r9 (x y) resistor\n").unwrap();
        fs::write(dir.path().join("other.scs"), "r8 (x y) resistor\n").unwrap();
        let top = dir.path().join("top.scs");
        fs::write(&top, "include \"cells.scs\"\ninclude \"other.scs\"\nr1 (a b) resistor\n").unwrap();

        let (mut netlist, _) = parse_file_netlist(&top);
        let r9 = netlist.find(Kind::Instance, "r9").unwrap();
        netlist[r9].master_name = "capacitor".into();
        netlist.mark_altered(r9);

        let out = dir.path().join("out");
        let results = write_scenarios(&[Scenario::new(7, "sub", String::new(), netlist)], &out);
        let folder = results.into_iter().next().unwrap().unwrap();

        let cells = fs::read_to_string(folder.join("cells.scs")).unwrap();
        assert_eq!(cells, "r9 (x y) capacitor\n");
        assert!(!folder.join("other.scs").exists());

        let top = fs::read_to_string(folder.join("top.scs")).unwrap();
        let local = folder.join("cells.scs").to_string_lossy().to_string();
        assert!(top.contains(&format!("include \"{}\"", local)));
        assert!(top.contains("other.scs"));
    }
}
