//! Statement classification from runtime vocabularies.
//!
//! Whether `x1 (a b) foo p=1` is an analysis, a control statement, a
//! transistor or a plain instance depends only on what `foo` was registered
//! as. [`ClassifierTables`] holds those vocabularies and the composite
//! patterns compiled from them. Each registration is idempotent and rebuilds
//! only the pattern of the vocabulary it touches.
//!
//! # Dispatch order
//!
//! [`ClassifierTables::classify`] tries the statement shapes in a fixed
//! order and the first match wins:
//!
//! 1. `parameters` keyword
//! 2. `global` keyword
//! 3. `model` keyword
//! 4. analog model (`analogmodel modelname=` marker)
//! 5. `subckt` / `inline subckt`
//! 6. user function (`real name(`)
//! 7. `library` / `section`
//! 8. `if` / `else`
//! 9. `include` / `ahdl_include`
//! 10. `name paramtest`
//! 11. control statement, special syntax first
//! 12. analysis
//! 13. transistor
//! 14. simple statement (reserved first word or a single token)
//! 15. instance
//!
//! Shapes from 11 onwards are textually identical to an instance and are only
//! told apart by the registered master names.
//!
//! # Example
//!
//! ```
//! use radnet::classifier::{ClassifierTables, StatementClass};
//! use radnet::config::Config;
//!
//! let tables = ClassifierTables::from_config(&Config::default()).unwrap();
//! assert!(matches!(tables.classify("tran1 tran stop=1u"), StatementClass::Analysis { .. }));
//! assert!(matches!(tables.classify("x1 (a b) inverter"), StatementClass::Instance));
//! ```

pub mod patterns;

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use tracing::debug;

use crate::Symbol;
use crate::config::Config;
use crate::error::Result;
use crate::netlist::NodePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisKind {
    pub advanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlKind {
    pub advanced: bool,
    pub special_syntax: bool,
}

/// What may be done to statements instantiating a master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alteration {
    pub inject: bool,
    /// Master name written in place of the original by substitution.
    pub substitute: Option<Symbol>,
}

/// Statement kind decided for one logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementClass {
    Parameters,
    Global,
    Model,
    AnalogModel { master: String },
    Subcircuit { inline: bool },
    UserFunction,
    Library,
    Section,
    Conditional,
    Include { ahdl: bool },
    ParamTest,
    Control { master: String, special_syntax: bool },
    Analysis { master: String },
    Transistor { master: String },
    Simple,
    Instance,
}

/// Vocabularies and compiled patterns driving classification.
#[derive(Debug, Clone)]
pub struct ClassifierTables {
    primitives: IndexSet<String>,
    reserved: IndexSet<String>,
    analyses: IndexMap<String, AnalysisKind>,
    controls: IndexMap<String, ControlKind>,
    transistors: IndexSet<String>,
    unalterable_nodes: IndexSet<String>,
    unalterable_statements: IndexSet<String>,
    excluded_folders: Vec<PathBuf>,
    alterations: IndexMap<String, Alteration>,
    main_transient: String,

    analysis_pattern: Option<Regex>,
    control_pattern: Option<Regex>,
    special_control_pattern: Option<Regex>,
    transistor_pattern: Option<Regex>,
}

impl ClassifierTables {
    /// Tables with empty vocabularies. Everything classifies as an instance or a simple statement.
    pub fn new(main_transient: &str) -> Self {
        Self {
            primitives: IndexSet::new(),
            reserved: IndexSet::new(),
            analyses: IndexMap::new(),
            controls: IndexMap::new(),
            transistors: IndexSet::new(),
            unalterable_nodes: IndexSet::new(),
            unalterable_statements: IndexSet::new(),
            excluded_folders: Vec::new(),
            alterations: IndexMap::new(),
            main_transient: main_transient.to_string(),
            analysis_pattern: None,
            control_pattern: None,
            special_control_pattern: None,
            transistor_pattern: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut tables = Self::new(&config.main_transient);
        for name in &config.primitives {
            tables.register_primitive(name);
        }
        for name in &config.reserved_words {
            tables.register_reserved(name);
        }
        for entry in &config.analyses {
            tables.register_analysis(&entry.name, entry.advanced)?;
        }
        for entry in &config.controls {
            tables.register_control(&entry.name, entry.advanced, entry.special_syntax)?;
        }
        for name in &config.transistors {
            tables.register_transistor(name)?;
        }
        for name in &config.unalterable_nodes {
            tables.register_unalterable_node(name);
        }
        for name in &config.unalterable_statements {
            tables.register_unalterable_statement(name);
        }
        for folder in &config.excluded_folders {
            tables.register_excluded_folder(folder);
        }
        for entry in &config.alterable_statements {
            tables.register_alterable(&entry.master_name, entry.inject, entry.substitute.as_deref());
        }
        Ok(tables)
    }

    pub fn register_primitive(&mut self, name: &str) -> bool {
        self.primitives.insert(name.to_string())
    }

    pub fn register_reserved(&mut self, name: &str) -> bool {
        self.reserved.insert(name.to_string())
    }

    /// Returns `true` when the vocabulary changed.
    pub fn register_analysis(&mut self, name: &str, advanced: bool) -> Result<bool> {
        let kind = AnalysisKind { advanced };
        if self.analyses.get(name) == Some(&kind) {
            return Ok(false);
        }
        self.analyses.insert(name.to_string(), kind);
        self.analysis_pattern = patterns::composite(self.analyses.keys().map(String::as_str))?;
        Ok(true)
    }

    pub fn register_control(&mut self, name: &str, advanced: bool, special_syntax: bool) -> Result<bool> {
        let kind = ControlKind {
            advanced,
            special_syntax,
        };
        if self.controls.get(name) == Some(&kind) {
            return Ok(false);
        }
        self.controls.insert(name.to_string(), kind);
        self.control_pattern = patterns::composite(
            self.controls
                .iter()
                .filter(|(_, k)| !k.special_syntax)
                .map(|(n, _)| n.as_str()),
        )?;
        self.special_control_pattern = patterns::leading(
            self.controls
                .iter()
                .filter(|(_, k)| k.special_syntax)
                .map(|(n, _)| n.as_str()),
        )?;
        Ok(true)
    }

    /// Register a master whose instances are transistors.
    ///
    /// Called by the parser for every model of a transistor primitive.
    pub fn register_transistor(&mut self, name: &str) -> Result<bool> {
        if !self.transistors.insert(name.to_string()) {
            return Ok(false);
        }
        debug!("Registered transistor master {}", name);
        self.transistor_pattern = patterns::composite(self.transistors.iter().map(String::as_str))?;
        Ok(true)
    }

    pub fn register_unalterable_node(&mut self, name: &str) -> bool {
        self.unalterable_nodes.insert(name.to_string())
    }

    pub fn register_unalterable_statement(&mut self, name: &str) -> bool {
        self.unalterable_statements.insert(name.to_string())
    }

    pub fn register_alterable(&mut self, master: &str, inject: bool, substitute: Option<&str>) -> bool {
        let alteration = Alteration {
            inject,
            substitute: substitute.map(Symbol::from),
        };
        self.alterations.insert(master.to_string(), alteration.clone()) != Some(alteration)
    }

    pub fn register_excluded_folder(&mut self, folder: &Path) -> bool {
        if self.excluded_folders.iter().any(|f| f == folder) {
            return false;
        }
        self.excluded_folders.push(folder.to_path_buf());
        true
    }

    /// Decide the statement kind of a logical line, without its block opener.
    pub fn classify(&self, line: &str) -> StatementClass {
        use patterns::*;

        if PARAMETERS.is_match(line) {
            return StatementClass::Parameters;
        }
        if GLOBAL.is_match(line) {
            return StatementClass::Global;
        }
        if MODEL.is_match(line) {
            return StatementClass::Model;
        }
        if let Some(caps) = ANALOG_MODEL.captures(line) {
            return StatementClass::AnalogModel {
                master: caps["master"].to_string(),
            };
        }
        if let Some(caps) = SUBCKT.captures(line) {
            return StatementClass::Subcircuit {
                inline: caps.name("inline").is_some(),
            };
        }
        if USER_FUNCTION.is_match(line) {
            return StatementClass::UserFunction;
        }
        if LIBRARY.is_match(line) {
            return StatementClass::Library;
        }
        if SECTION.is_match(line) {
            return StatementClass::Section;
        }
        if CONDITIONAL.is_match(line) {
            return StatementClass::Conditional;
        }
        if let Some(caps) = INCLUDE.captures(line) {
            return StatementClass::Include {
                ahdl: caps.name("ahdl").is_some(),
            };
        }
        if PARAM_TEST.is_match(line) {
            return StatementClass::ParamTest;
        }
        if let Some(caps) = capture(&self.special_control_pattern, line) {
            return StatementClass::Control {
                master: caps["master"].to_string(),
                special_syntax: true,
            };
        }
        if let Some(caps) = capture(&self.control_pattern, line) {
            return StatementClass::Control {
                master: caps["master"].to_string(),
                special_syntax: false,
            };
        }
        if let Some(caps) = capture(&self.analysis_pattern, line) {
            return StatementClass::Analysis {
                master: caps["master"].to_string(),
            };
        }
        if let Some(caps) = capture(&self.transistor_pattern, line) {
            return StatementClass::Transistor {
                master: caps["master"].to_string(),
            };
        }

        let mut words = line.split_whitespace();
        let first = words.next().unwrap_or_default();
        if self.reserved.contains(first) || words.next().is_none() {
            return StatementClass::Simple;
        }
        StatementClass::Instance
    }

    pub fn is_primitive(&self, master: &str) -> bool {
        self.primitives.contains(master)
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved.contains(word)
    }

    pub fn is_unalterable_statement(&self, master: &str) -> bool {
        self.unalterable_statements.contains(master)
    }

    /// Files below an excluded folder are never altered.
    pub fn is_excluded_path(&self, path: &Path) -> bool {
        self.excluded_folders.iter().any(|folder| path.starts_with(folder))
    }

    pub fn analysis(&self, master: &str) -> Option<AnalysisKind> {
        self.analyses.get(master).copied()
    }

    pub fn control(&self, master: &str) -> Option<ControlKind> {
        self.controls.get(master).copied()
    }

    pub fn is_transistor(&self, master: &str) -> bool {
        self.transistors.contains(master)
    }

    pub fn alteration(&self, master: &str) -> Option<&Alteration> {
        self.alterations.get(master)
    }

    /// Registered alterations, in registration order.
    pub fn alterations(&self) -> impl Iterator<Item = (&str, &Alteration)> {
        self.alterations.iter().map(|(master, alteration)| (master.as_str(), alteration))
    }

    pub fn main_transient(&self) -> &str {
        &self.main_transient
    }

    pub fn is_main_transient(&self, master: &str) -> bool {
        self.main_transient == master
    }
}

impl NodePolicy for ClassifierTables {
    fn is_unalterable_node(&self, name: &str) -> bool {
        self.unalterable_nodes.contains(name)
    }
}

fn capture<'t>(pattern: &Option<Regex>, line: &'t str) -> Option<regex::Captures<'t>> {
    pattern.as_ref().and_then(|re| re.captures(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> ClassifierTables {
        ClassifierTables::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn keywords_take_precedence() {
        let tables = tables();
        let cases = [
            ("parameters vdd=1.2", StatementClass::Parameters),
            ("global 0 vdd!", StatementClass::Global),
            ("model nch bsim4 type=n", StatementClass::Model),
            ("subckt inv (a y)", StatementClass::Subcircuit { inline: false }),
            ("inline subckt res (a b)", StatementClass::Subcircuit { inline: true }),
            ("real gain(real a, real b)", StatementClass::UserFunction),
            ("library models", StatementClass::Library),
            ("section tt", StatementClass::Section),
            ("if (mode == 1)", StatementClass::Conditional),
            ("else if (mode == 2)", StatementClass::Conditional),
            ("include \"models.scs\" section=tt", StatementClass::Include { ahdl: false }),
            ("ahdl_include \"res.va\"", StatementClass::Include { ahdl: true }),
            ("pt1 paramtest errorif=(w<0)", StatementClass::ParamTest),
        ];
        for (line, expected) in cases {
            assert_eq!(tables.classify(line), expected, "{}", line);
        }
    }

    #[test]
    fn analog_model_marker_wins_over_instance_shape() {
        let tables = tables();
        assert_eq!(
            tables.classify("r1 (a b) analogmodel modelname=res_va r=1k"),
            StatementClass::AnalogModel {
                master: "res_va".to_string()
            }
        );
    }

    #[test]
    fn vocabulary_shapes_are_told_apart_by_master() {
        let tables = tables();
        assert_eq!(
            tables.classify("save out in:p"),
            StatementClass::Control {
                master: "save".to_string(),
                special_syntax: true
            }
        );
        assert_eq!(
            tables.classify("opts options reltol=1e-4"),
            StatementClass::Control {
                master: "options".to_string(),
                special_syntax: false
            }
        );
        assert_eq!(
            tables.classify("tran1 tran stop=1u"),
            StatementClass::Analysis {
                master: "tran".to_string()
            }
        );
        assert_eq!(
            tables.classify("m1 (d g s b) bsim4 w=1u"),
            StatementClass::Transistor {
                master: "bsim4".to_string()
            }
        );
        assert_eq!(tables.classify("x1 (a b) inverter"), StatementClass::Instance);
        assert_eq!(tables.classify("simulator lang=spectre"), StatementClass::Simple);
        assert_eq!(tables.classify("endrun"), StatementClass::Simple);
    }

    #[test]
    fn bare_node_named_like_an_analysis_stays_a_node() {
        let tables = tables();
        assert_eq!(tables.classify("r1 tran 0 resistor r=1k"), StatementClass::Instance);
        assert_eq!(tables.classify("c1 out dc capacitor"), StatementClass::Instance);
        assert_eq!(
            tables.classify("dc1 dc"),
            StatementClass::Analysis {
                master: "dc".to_string()
            }
        );
    }

    #[test]
    fn control_with_nodes_is_not_an_instance() {
        let tables = tables();
        assert_eq!(
            tables.classify("opts (a b) options"),
            StatementClass::Control {
                master: "options".to_string(),
                special_syntax: false
            }
        );
    }

    #[test]
    fn registration_is_idempotent() {
        let mut tables = ClassifierTables::new("tran");
        assert_eq!(tables.classify("n1 (d g s b) nch"), StatementClass::Instance);

        assert!(tables.register_transistor("nch").unwrap());
        let once = tables.classify("n1 (d g s b) nch");
        assert!(!tables.register_transistor("nch").unwrap());
        assert_eq!(tables.classify("n1 (d g s b) nch"), once);
        assert_eq!(
            once,
            StatementClass::Transistor {
                master: "nch".to_string()
            }
        );

        assert!(tables.register_analysis("dc", false).unwrap());
        assert!(!tables.register_analysis("dc", false).unwrap());
        assert!(tables.register_analysis("dc", true).unwrap());
        assert_eq!(tables.analysis("dc"), Some(AnalysisKind { advanced: true }));

        assert!(tables.register_alterable("nch", true, Some("nch_rad")));
        assert!(!tables.register_alterable("nch", true, Some("nch_rad")));
    }

    #[test]
    fn lookups_follow_configuration() {
        let mut config = Config::default();
        config.excluded_folders = vec![PathBuf::from("/pdk")];
        config.alterable_statements = vec![crate::config::AlterableEntry {
            master_name: "inv".to_string(),
            inject: true,
            substitute: None,
        }];
        let tables = ClassifierTables::from_config(&config).unwrap();

        assert!(tables.is_primitive("resistor"));
        assert!(!tables.is_primitive("inv"));
        assert!(tables.is_unalterable_node("0"));
        assert!(!tables.is_unalterable_node("out"));
        assert!(tables.is_unalterable_statement("vsource"));
        assert!(tables.is_excluded_path(Path::new("/pdk/models/nch.scs")));
        assert!(!tables.is_excluded_path(Path::new("/work/top.scs")));
        assert!(tables.alteration("inv").unwrap().inject);
        assert!(tables.is_main_transient("tran"));
        assert_eq!(
            tables.control("save"),
            Some(ControlKind {
                advanced: false,
                special_syntax: true
            })
        );
    }
}
