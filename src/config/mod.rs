//! Vocabulary and alteration configuration.
//!
//! The classifier is driven entirely by vocabularies known only at runtime:
//! which master names are primitives, which are analyses or control
//! statements, which nodes and statements must never be altered, and which
//! statements may be substituted by what. They are read from a YAML document:
//!
//! ```yaml
//! primitives: [resistor, capacitor, bsim4]
//! analyses:
//!   - name: tran
//!   - name: sweep
//!     advanced: true
//! controls:
//!   - name: save
//!     special_syntax: true
//! unalterable_nodes: ["0", gnd]
//! alterable_statements:
//!   - master_name: nch
//!     inject: true
//!     substitute: nch_rad
//! radiation:
//!   injection:
//!     definition: |
//!       subckt rad_pulse (inj ref)
//!       i0 (inj ref) isource type=exp val0=0 val1=1m
//!       ends rad_pulse
//!     reference_nodes: ["0"]
//! ```
//!
//! Every section is optional; missing sections keep the built-in Spectre
//! vocabulary of [`Config::default`].

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_primitives")]
    pub primitives: Vec<String>,
    #[serde(default = "default_reserved_words")]
    pub reserved_words: Vec<String>,
    #[serde(default = "default_analyses")]
    pub analyses: Vec<AnalysisEntry>,
    #[serde(default = "default_controls")]
    pub controls: Vec<ControlEntry>,
    /// Primitive masters whose instances are transistors.
    #[serde(default = "default_transistors")]
    pub transistors: Vec<String>,
    #[serde(default = "default_unalterable_nodes")]
    pub unalterable_nodes: Vec<String>,
    #[serde(default = "default_unalterable_statements")]
    pub unalterable_statements: Vec<String>,
    /// Netlists below these folders are parsed but never altered.
    #[serde(default)]
    pub excluded_folders: Vec<PathBuf>,
    #[serde(default)]
    pub alterable_statements: Vec<AlterableEntry>,
    /// Master name of the analysis kept when scenarios are pruned.
    #[serde(default = "default_main_transient")]
    pub main_transient: String,
    #[serde(default)]
    pub radiation: RadiationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub name: String,
    /// Advanced analyses carry a body of nested analyses (sweep, montecarlo).
    #[serde(default)]
    pub advanced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEntry {
    pub name: String,
    #[serde(default)]
    pub advanced: bool,
    /// Written `master args...` instead of `name master params...`.
    #[serde(default)]
    pub special_syntax: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterableEntry {
    pub master_name: String,
    #[serde(default)]
    pub inject: bool,
    #[serde(default)]
    pub substitute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiationConfig {
    #[serde(default = "default_injection")]
    pub injection: InjectionSource,
    /// Subcircuit definitions that substitute masters are expected to name.
    #[serde(default)]
    pub substitutions: Vec<String>,
}

impl Default for RadiationConfig {
    fn default() -> Self {
        Self {
            injection: default_injection(),
            substitutions: Vec::new(),
        }
    }
}

/// Template of the source instantiated by injection scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionSource {
    /// Netlist text of the subcircuit; its first pin is wired to the target node.
    pub definition: String,
    /// Nodes the remaining pins are wired to, in order.
    #[serde(default = "default_reference_nodes")]
    pub reference_nodes: Vec<String>,
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,
    /// Parameter overrides written on every injector instance.
    #[serde(default)]
    pub parameters: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primitives: default_primitives(),
            reserved_words: default_reserved_words(),
            analyses: default_analyses(),
            controls: default_controls(),
            transistors: default_transistors(),
            unalterable_nodes: default_unalterable_nodes(),
            unalterable_statements: default_unalterable_statements(),
            excluded_folders: Vec::new(),
            alterable_statements: Vec::new(),
            main_transient: default_main_transient(),
            radiation: RadiationConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::MissingInputFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_primitives() -> Vec<String> {
    strings(&[
        "resistor", "capacitor", "inductor", "mutual_inductor", "vsource", "isource",
        "vcvs", "vccs", "ccvs", "cccs", "pvcvs", "pvccs", "bsource", "diode", "bjt",
        "vbic", "jfet", "mos1", "mos2", "mos3", "bsim3", "bsim3v3", "bsim4",
        "bsimsoi", "bsimcmg", "psp102", "psp103", "hisim2", "switch", "relay",
        "iprobe", "port", "tline", "msline",
    ])
}

fn default_reserved_words() -> Vec<String> {
    strings(&["simulator", "statistics", "process", "mismatch", "correlate", "truncate", "vary"])
}

fn default_analyses() -> Vec<AnalysisEntry> {
    let simple = [
        "dc", "ac", "tran", "noise", "xf", "sp", "pz", "stb", "pss", "pac", "pnoise",
        "hb", "hbac", "envlp", "sens", "fourier", "dcmatch",
    ];
    let advanced = ["sweep", "montecarlo"];
    simple
        .iter()
        .map(|name| (name, false))
        .chain(advanced.iter().map(|name| (name, true)))
        .map(|(name, advanced)| AnalysisEntry {
            name: name.to_string(),
            advanced,
        })
        .collect()
}

fn default_controls() -> Vec<ControlEntry> {
    let entry = |name: &str, advanced, special_syntax| ControlEntry {
        name: name.to_string(),
        advanced,
        special_syntax,
    };
    vec![
        entry("options", false, false),
        entry("set", false, false),
        entry("info", false, false),
        entry("alter", false, false),
        entry("shell", false, false),
        entry("check", false, false),
        entry("checklimit", false, false),
        entry("altergroup", true, false),
        entry("save", false, true),
        entry("ic", false, true),
        entry("nodeset", false, true),
    ]
}

fn default_transistors() -> Vec<String> {
    strings(&[
        "mos1", "mos2", "mos3", "bsim3", "bsim3v3", "bsim4", "bsimsoi", "bsimcmg",
        "psp102", "psp103", "hisim2", "bjt", "vbic", "jfet",
    ])
}

fn default_unalterable_nodes() -> Vec<String> {
    strings(&["0", "gnd", "gnd!"])
}

fn default_unalterable_statements() -> Vec<String> {
    strings(&["vsource", "isource", "iprobe", "port"])
}

fn default_main_transient() -> String {
    "tran".to_string()
}

fn default_reference_nodes() -> Vec<String> {
    strings(&["0"])
}

fn default_instance_prefix() -> String {
    "rad_inj".to_string()
}

fn default_injection() -> InjectionSource {
    InjectionSource {
        definition: [
            "subckt rad_pulse (inj ref)",
            "parameters q=100f tau_r=5p tau_f=200p td=1n",
            "i0 (inj ref) isource type=exp val0=0 val1=q/tau_f td1=td tau1=tau_r td2=td+tau_r tau2=tau_f",
            "ends rad_pulse",
        ]
        .join("\n"),
        reference_nodes: default_reference_nodes(),
        instance_prefix: default_instance_prefix(),
        parameters: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.analyses.iter().any(|a| a.name == "sweep" && a.advanced));
    }

    #[test]
    fn partial_document_overrides_sections() {
        let config = Config::from_yaml(
            r#"
primitives: [resistor]
alterable_statements:
  - master_name: nch
    inject: true
    substitute: nch_rad
radiation:
  injection:
    definition: "subckt src (a b)\nends src"
  substitutions:
    - "subckt nch_rad (d g s b)\nends nch_rad"
"#,
        )
        .unwrap();

        assert_eq!(config.primitives, vec!["resistor".to_string()]);
        assert_eq!(config.alterable_statements[0].substitute.as_deref(), Some("nch_rad"));
        assert_eq!(config.radiation.injection.reference_nodes, vec!["0".to_string()]);
        assert_eq!(config.radiation.injection.instance_prefix, "rad_inj");
        assert_eq!(config.radiation.substitutions.len(), 1);
        // untouched sections keep the built-in vocabulary
        assert_eq!(config.controls, default_controls());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = Config::from_yaml("primitives: {not: [a list").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(Path::new("/nonexistent/radnet.yaml")).unwrap_err();
        assert!(matches!(err, Error::MissingInputFile { .. }));
    }
}
