//! Radiation-source templates.
//!
//! Scenarios reference subcircuit definitions that are not part of the
//! golden netlist: the source instantiated by injection and the substitute
//! masters named by substitution. Their text comes from the configuration,
//! is parsed once into a private arena and grafted into every scenario that
//! needs it.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::Symbol;
use crate::classifier::ClassifierTables;
use crate::config::RadiationConfig;
use crate::error::Result;
use crate::netlist::{Kind, Netlist, NodePolicy, Parameter, StatementId, StatementKind};
use crate::parser::{ParseOptions, parse_str};

/// How injector instances are wired and parameterised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injector {
    /// Template instantiated by every injector.
    pub source: Symbol,
    pub reference_nodes: Vec<String>,
    pub prefix: String,
    pub parameters: Vec<Parameter>,
}

/// Parsed radiation-source definitions.
#[derive(Debug, Clone)]
pub struct RadiationLibrary {
    netlist: Netlist,
    sources: HashMap<Symbol, StatementId>,
    injector: Option<Injector>,
}

impl RadiationLibrary {
    /// Parse the injection template and the substitution templates.
    ///
    /// The first subcircuit of the injection definition is the injector.
    pub fn from_config(config: &RadiationConfig, tables: &mut ClassifierTables) -> Result<Self> {
        let injection = config.injection.definition.trim();
        let mut text = injection.to_string();
        for substitution in &config.substitutions {
            text.push('\n');
            text.push_str(substitution);
        }
        text.push('\n');

        let parsed = parse_str(
            &text,
            Path::new("radiation.scs"),
            tables,
            ParseOptions { permissive: true },
        )?;
        let mut netlist = parsed.netlist;

        let definitions: Vec<_> = netlist.iter_kind(Kind::Subcircuit).collect();
        let mut sources = HashMap::new();
        for id in &definitions {
            let StatementKind::Subcircuit(data) = netlist[*id].kind.clone() else {
                continue;
            };
            netlist.set_kind(*id, StatementKind::RadiationSource(data));
            if sources.insert(netlist[*id].name.clone(), *id).is_some() {
                warn!("Radiation source `{}` defined twice, keeping the last", netlist[*id].name);
            }
        }

        let injector = match definitions.first() {
            Some(first) if !injection.is_empty() => {
                let source = netlist[*first].name.clone();
                let pins = netlist[*first].nodes.len();
                let reference_nodes = config.injection.reference_nodes.clone();
                if pins < reference_nodes.len() + 1 {
                    warn!(
                        "Injection source `{}` has {} pins for {} connections",
                        source,
                        pins,
                        reference_nodes.len() + 1
                    );
                }
                Some(Injector {
                    source,
                    reference_nodes,
                    prefix: config.injection.instance_prefix.clone(),
                    parameters: config
                        .injection
                        .parameters
                        .iter()
                        .map(|(name, value)| Parameter::new(name, Some(value.as_str())))
                        .collect(),
                })
            }
            _ => None,
        };
        debug!("{} radiation sources loaded", sources.len());

        Ok(Self {
            netlist,
            sources,
            injector,
        })
    }

    pub fn injector(&self) -> Option<&Injector> {
        self.injector.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(&Symbol::from(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &Symbol> {
        self.sources.keys()
    }

    /// Definition called `name` in `netlist`, grafted into its root circuit if missing.
    ///
    /// `None` when neither the netlist nor the library defines it.
    pub fn ensure(&self, netlist: &mut Netlist, name: &str, policy: &dyn NodePolicy) -> Option<StatementId> {
        if let Some(existing) = netlist
            .find(Kind::RadiationSource, name)
            .or_else(|| netlist.find(Kind::Subcircuit, name))
        {
            return Some(existing);
        }
        let source = *self.sources.get(&Symbol::from(name))?;
        let root = netlist.root();
        let map = netlist.graft(&self.netlist, source, root, policy);
        map.statement(source).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn default_injection_template() {
        let config = Config::default();
        let mut tables = ClassifierTables::from_config(&config).unwrap();
        let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();

        let injector = library.injector().unwrap();
        assert_eq!(injector.source.as_ref(), "rad_pulse");
        assert_eq!(injector.reference_nodes, vec!["0"]);
        assert!(library.contains("rad_pulse"));
    }

    #[test]
    fn substitution_templates_are_sources_too() {
        let mut config = Config::default();
        config.radiation.substitutions =
            vec!["subckt inv_rad (a y)\nr1 (a y) resistor r=1k\nends inv_rad".to_string()];
        let mut tables = ClassifierTables::from_config(&config).unwrap();
        let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();

        assert!(library.contains("inv_rad"));
        assert_eq!(library.injector().unwrap().source.as_ref(), "rad_pulse");
    }

    #[test]
    fn no_injector_without_injection_definition() {
        let mut config = Config::default();
        config.radiation.injection.definition = String::new();
        config.radiation.substitutions = vec!["subckt inv_rad (a y)\nends inv_rad".to_string()];
        let mut tables = ClassifierTables::from_config(&config).unwrap();
        let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();
        assert!(library.injector().is_none());
    }

    #[test]
    fn ensure_grafts_once() {
        let config = Config::default();
        let mut tables = ClassifierTables::from_config(&config).unwrap();
        let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();
        let mut netlist = Netlist::new("top.scs".into());

        let first = library.ensure(&mut netlist, "rad_pulse", &tables).unwrap();
        let second = library.ensure(&mut netlist, "rad_pulse", &tables).unwrap();
        assert_eq!(first, second);
        assert_eq!(netlist[first].kind(), Kind::RadiationSource);
        assert_eq!(netlist.iter_kind(Kind::RadiationSource).count(), 1);
        assert!(netlist.export().starts_with("subckt rad_pulse (inj ref)"));
        assert!(library.ensure(&mut netlist, "missing", &tables).is_none());
    }
}
