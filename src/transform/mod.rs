//! Circuit transformation.
//!
//! Given a resolved golden netlist, the engine produces one altered copy per
//! alteration target, a *scenario*:
//!
//! - **Injection** wires an instance of the injection source to one node.
//! - **Substitution** replaces the master of one statement by its configured
//!   substitute.
//!
//! # Simple and propagated targets
//!
//! A target declared at circuit level is altered in place in a clone of the
//! whole arena. A target inside a subcircuit `S` cannot be altered in place,
//! since every instance of `S` would see the change. Instead `S` is
//! duplicated as `S_altered` and the target is altered inside the copy. Then,
//! for each instance of the original `S`, in its own arena clone:
//!
//! 1. every model or analog model wrapper between the instance and `S` is
//!    duplicated as `<wrapper>_altered` and re-pointed to the altered copy,
//! 2. the instance is re-pointed to the altered chain,
//! 3. if the instance itself sits in a subcircuit `T`, `T` is duplicated and
//!    the same procedure repeats one level up; otherwise the clone is a
//!    finished scenario.
//!
//! The golden netlist is only read while scenarios are built. Afterwards the
//! targets are flagged `injected` or `altered` on it, so a later run skips
//! them.
//!
//! # Example
//!
//! ```
//! use radnet::classifier::ClassifierTables;
//! use radnet::config::Config;
//! use radnet::parser::{ParseOptions, parse_str};
//! use radnet::resolver::resolve;
//! use radnet::transform::{
//!     AlterationMode, InjectionScope, RadiationLibrary, TransformOptions, TransformationEngine,
//! };
//! use std::path::Path;
//!
//! let config = Config::default();
//! let mut tables = ClassifierTables::from_config(&config).unwrap();
//! let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();
//! let mut golden = parse_str(
//!     "r1 (a b) resistor\nr2 (b 0) resistor\n",
//!     Path::new("top.scs"),
//!     &mut tables,
//!     ParseOptions::default(),
//! )
//! .unwrap()
//! .netlist;
//! resolve(&mut golden, &tables);
//!
//! let options = TransformOptions {
//!     mode: AlterationMode::Injection(InjectionScope::All),
//!     prune_analyses: false,
//! };
//! let mut engine = TransformationEngine::new(&tables, &library, options);
//! let generation = engine.generate(&mut golden).unwrap();
//! // `a` and `b`; `0` is never altered
//! assert_eq!(generation.scenarios.len(), 2);
//! ```

pub mod radiation;
pub mod scenario;

pub use radiation::{Injector, RadiationLibrary};
pub use scenario::{Scenario, write_scenarios};

use std::collections::HashSet;
use std::fmt;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::Symbol;
use crate::classifier::ClassifierTables;
use crate::error::{Error, Result};
use crate::netlist::{
    InstanceData, Kind, Netlist, NodeId, ScopeId, Statement, StatementId, StatementKind,
};
use crate::resolver::dependency_chain;

/// Nodes considered by injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionScope {
    /// Every injectable node.
    #[default]
    All,
    /// Only nodes connected to a statement whose master is listed as injectable.
    Listed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterationMode {
    Injection(InjectionScope),
    Substitution,
}

impl fmt::Display for AlterationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlterationMode::Injection(InjectionScope::All) => write!(f, "injection"),
            AlterationMode::Injection(InjectionScope::Listed) => write!(f, "listed injection"),
            AlterationMode::Substitution => write!(f, "substitution"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub mode: AlterationMode,
    /// Drop every analysis but the main transient and the advanced analyses enclosing it.
    pub prune_analyses: bool,
}

/// What a scenario alters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Node { scope: ScopeId, node: NodeId },
    Statement(StatementId),
}

/// Scenarios of one [`TransformationEngine::generate`] run.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub scenarios: Vec<Scenario>,
    pub targets: usize,
    /// Targets whose scenarios could not be built.
    pub failed: usize,
}

/// A scenario before it is numbered.
#[derive(Debug, Clone)]
struct Draft {
    netlist: Netlist,
    label: String,
    description: String,
}

pub struct TransformationEngine<'a> {
    tables: &'a ClassifierTables,
    library: &'a RadiationLibrary,
    options: TransformOptions,
    next_index: usize,
}

impl<'a> TransformationEngine<'a> {
    pub fn new(tables: &'a ClassifierTables, library: &'a RadiationLibrary, options: TransformOptions) -> Self {
        Self {
            tables,
            library,
            options,
            next_index: 1,
        }
    }

    /// Check that the mode can produce anything with the loaded templates.
    fn check_mode(&self) -> Result<()> {
        match self.options.mode {
            AlterationMode::Injection(_) if self.library.injector().is_none() => Err(
                Error::UnresolvableMode("injection needs an injection source definition".to_string()),
            ),
            AlterationMode::Substitution
                if !self.tables.alterations().any(|(_, a)| a.substitute.is_some()) =>
            {
                Err(Error::UnresolvableMode(
                    "substitution needs at least one alterable statement with a substitute".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Alteration targets of the golden netlist, in declaration order.
    pub fn plan(&self, golden: &Netlist) -> Vec<Target> {
        let alterable_circuits: HashSet<StatementId> = golden
            .circuits()
            .filter(|c| golden[*c].circuit_data().is_some_and(|data| !data.unalterable))
            .collect();
        let alterable = |id: StatementId| {
            alterable_circuits.contains(&golden[id].circuit) && !golden[id].flags.unalterable
        };

        match self.options.mode {
            AlterationMode::Injection(scope) => {
                let listed: Option<HashSet<(ScopeId, NodeId)>> = (scope == InjectionScope::Listed)
                    .then(|| {
                        [Kind::Instance, Kind::Transistor]
                            .iter()
                            .flat_map(|kind| golden.iter_kind(*kind))
                            .filter(|id| alterable(*id) && golden[*id].flags.can_be_injected)
                            .flat_map(|id| golden[id].nodes.iter().map(move |n| (golden[id].scope, *n)))
                            .collect()
                    });

                let mut bodies: Vec<StatementId> = alterable_circuits.iter().copied().collect();
                bodies.sort();
                bodies.extend(golden.iter_kind(Kind::Subcircuit).filter(|id| alterable(*id)));

                bodies
                    .into_iter()
                    .flat_map(|body| {
                        let scope = golden[body].scope;
                        golden
                            .scope(scope)
                            .nodes()
                            .filter(|(_, node)| node.injectable && !node.injected && !node.pin_in_subcircuit)
                            .map(move |(node, _)| (scope, node))
                            .collect::<Vec<_>>()
                    })
                    .filter(|key| listed.as_ref().is_none_or(|listed| listed.contains(key)))
                    .map(|(scope, node)| Target::Node { scope, node })
                    .collect()
            }
            AlterationMode::Substitution => [Kind::Instance, Kind::Transistor]
                .iter()
                .flat_map(|kind| golden.iter_kind(*kind))
                .filter(|id| {
                    let flags = &golden[*id].flags;
                    alterable(*id)
                        && flags.can_be_substituted
                        && !flags.altered
                        && flags.substitute_master_name.is_some()
                })
                .map(Target::Statement)
                .collect(),
        }
    }

    /// Scenarios of every target, in parallel. Targets that fail are logged and skipped.
    pub fn build(&mut self, golden: &Netlist, targets: &[Target]) -> Generation {
        let results: Vec<Result<Vec<Draft>>> = targets
            .par_iter()
            .map(|target| self.build_target(golden, *target))
            .collect();

        let mut generation = Generation {
            targets: targets.len(),
            ..Default::default()
        };
        for (target, result) in targets.iter().zip(results) {
            match result {
                Ok(drafts) => {
                    for mut draft in drafts {
                        if self.options.prune_analyses {
                            let pruned = draft.netlist.prune_analyses();
                            debug!("{} analyses pruned from `{}`", pruned, draft.label);
                        }
                        let index = self.next_index;
                        self.next_index += 1;
                        generation
                            .scenarios
                            .push(Scenario::new(index, &draft.label, draft.description, draft.netlist));
                    }
                }
                Err(e) => {
                    warn!("Alteration of {} failed: {}", self.describe(golden, *target), e);
                    generation.failed += 1;
                }
            }
        }
        generation
    }

    /// Plan, build and flag the targets as done on the golden netlist.
    pub fn generate(&mut self, golden: &mut Netlist) -> Result<Generation> {
        self.check_mode()?;
        let targets = self.plan(golden);
        info!("{} targets planned for {}", targets.len(), self.options.mode);

        let generation = self.build(golden, &targets);
        for target in &targets {
            match *target {
                Target::Node { scope, node } => golden.scope_mut(scope).node_mut(node).injected = true,
                Target::Statement(id) => golden[id].flags.altered = true,
            }
        }

        info!(
            "{} scenarios generated from {} targets, {} failed",
            generation.scenarios.len(),
            generation.targets,
            generation.failed
        );
        Ok(generation)
    }

    fn describe(&self, netlist: &Netlist, target: Target) -> String {
        match target {
            Target::Node { scope, node } => {
                let owner = &netlist[netlist.scope(scope).owner];
                format!(
                    "node `{}` of {} `{}`",
                    netlist.scope(scope).name(node),
                    owner.kind(),
                    owner.name
                )
            }
            Target::Statement(id) => format!("{} `{}`", netlist[id].kind(), netlist[id].name),
        }
    }

    fn label(&self, netlist: &Netlist, target: Target) -> String {
        match target {
            Target::Node { scope, node } => format!(
                "inj_{}_{}",
                netlist[netlist.scope(scope).owner].name,
                netlist.scope(scope).name(node)
            ),
            Target::Statement(id) => {
                let body = netlist
                    .enclosing_subcircuit(id)
                    .unwrap_or(netlist[id].circuit);
                format!("sub_{}_{}", netlist[body].name, netlist[id].name)
            }
        }
    }

    /// Body a target is declared in, and whether it is a subcircuit.
    fn location(&self, golden: &Netlist, target: Target) -> Option<StatementId> {
        match target {
            Target::Node { scope, .. } => {
                let scope = golden.scope(scope);
                scope.is_subcircuit_scope.then_some(scope.owner)
            }
            Target::Statement(id) => golden.enclosing_subcircuit(id),
        }
    }

    fn build_target(&self, golden: &Netlist, target: Target) -> Result<Vec<Draft>> {
        let label = self.label(golden, target);
        let description = format!("{} of {}", self.options.mode, self.describe(golden, target));
        let mut netlist = golden.clone();

        match self.location(golden, target) {
            None => {
                self.alter(&mut netlist, target)?;
                Ok(vec![Draft {
                    netlist,
                    label,
                    description,
                }])
            }
            Some(subcircuit) => {
                let name = format!("{}_altered", golden[subcircuit].name);
                let root = netlist.root();
                let map = netlist.duplicate(subcircuit, root, &name, self.tables);
                let copy = map.statement(subcircuit)?;
                let moved = match target {
                    Target::Node { scope, node } => Target::Node {
                        scope: map.scope(scope).ok_or_else(|| {
                            Error::TransformationTargetMissing(format!("scope of `{}`", name))
                        })?,
                        node,
                    },
                    Target::Statement(id) => Target::Statement(map.statement(id)?),
                };
                self.alter(&mut netlist, moved)?;

                let mut drafts = Vec::new();
                let trail = Trail {
                    label,
                    description,
                    visited: vec![subcircuit],
                };
                self.propagate(&netlist, subcircuit, copy, &trail, &mut drafts);
                if drafts.is_empty() {
                    debug!("`{}` is never instantiated, no scenario", golden[subcircuit].name);
                }
                Ok(drafts)
            }
        }
    }

    /// Apply the alteration at a target of `netlist`.
    fn alter(&self, netlist: &mut Netlist, target: Target) -> Result<()> {
        match target {
            Target::Node { scope, node } => {
                let injector = self.library.injector().ok_or_else(|| {
                    Error::UnresolvableMode("no injection source definition".to_string())
                })?;
                let source = self
                    .library
                    .ensure(netlist, &injector.source, self.tables)
                    .ok_or_else(|| Error::TransformationTargetMissing(injector.source.to_string()))?;
                let body = netlist.scope(scope).owner;
                let id = self.add_injector(netlist, body, node, injector);
                netlist[id].dependency.parent = Some(source);
                netlist[id].dependency.global_parent = Some(source);
                if let Some(data) = netlist[source].subcircuit_mut() {
                    data.progeny.push(id);
                }
            }
            Target::Statement(id) => {
                let substitute = netlist[id].flags.substitute_master_name.clone().ok_or_else(|| {
                    Error::TransformationTargetMissing(format!("substitute of `{}`", netlist[id].name))
                })?;
                if self.library.ensure(netlist, &substitute, self.tables).is_none() {
                    warn!(
                        "Substitute `{}` of `{}` is defined neither in the netlist nor in the radiation sources",
                        substitute, netlist[id].name
                    );
                }
                debug!("`{}`: `{}` -> `{}`", netlist[id].name, netlist[id].master_name, substitute);
                netlist[id].master_name = substitute;
                netlist.mark_altered(id);
            }
        }
        Ok(())
    }

    /// Wire a new injector instance to `node`, declared last in `body`.
    fn add_injector(&self, netlist: &mut Netlist, body: StatementId, node: NodeId, injector: &Injector) -> StatementId {
        let circuit = if netlist[body].kind() == Kind::Circuit {
            body
        } else {
            netlist[body].circuit
        };
        let scope = netlist[body].scope;
        let node_name = netlist.scope(scope).name(node).clone();

        let mut statement = Statement::new(
            StatementKind::Instance(InstanceData {
                bracketed: true,
                ..Default::default()
            }),
            circuit,
            scope,
        );
        statement.name = Symbol::from(scenario::sanitize(&format!("{}_{}", injector.prefix, node_name)));
        statement.master_name = injector.source.clone();
        statement.parameters = injector.parameters.clone();
        statement.serial = netlist[body]
            .children
            .iter()
            .map(|c| netlist[*c].serial)
            .max()
            .unwrap_or(0)
            + 1;
        statement.nodes.push(node);
        for reference in &injector.reference_nodes {
            let (id, _) = netlist.scope_mut(scope).add_node(reference, self.tables);
            statement.nodes.push(id);
        }

        let id = netlist.alloc(statement);
        netlist.attach(body, id);
        netlist.register(id);
        netlist.scope_mut(scope).node_mut(node).injected = true;
        netlist.mark_altered(id);
        id
    }

    /// Re-point every instance of `original` to `altered`, one scenario per top-level occurrence.
    ///
    /// An instance whose chain cannot be followed is logged and skipped.
    fn propagate(
        &self,
        netlist: &Netlist,
        original: StatementId,
        altered: StatementId,
        trail: &Trail,
        drafts: &mut Vec<Draft>,
    ) {
        let progeny = netlist[original]
            .subcircuit()
            .map(|data| data.progeny.clone())
            .unwrap_or_default();

        for instance in progeny {
            if let Err(e) = self.propagate_instance(netlist, original, altered, instance, trail, drafts) {
                warn!("`{}` skipped for {}: {}", netlist[instance].name, trail.label, e);
            }
        }
    }

    fn propagate_instance(
        &self,
        netlist: &Netlist,
        original: StatementId,
        altered: StatementId,
        instance: StatementId,
        trail: &Trail,
        drafts: &mut Vec<Draft>,
    ) -> Result<()> {
        let mut branch = netlist.clone();
        let root = branch.root();

        let chain = dependency_chain(&branch, instance);
        if chain.last() != Some(&original) {
            return Err(Error::TransformationTargetMissing(format!(
                "dependency chain of `{}`",
                branch[instance].name
            )));
        }
        let mut head = altered;
        for wrapper in chain[1..chain.len() - 1].iter().rev() {
            let name = format!("{}_altered", branch[*wrapper].name);
            let copy = branch
                .duplicate(*wrapper, root, &name, self.tables)
                .statement(*wrapper)?;
            branch[copy].master_name = branch[head].name.clone();
            branch[copy].dependency.parent = Some(head);
            branch[copy].dependency.global_parent = Some(altered);
            branch[copy].flags.altered = true;
            head = copy;
        }

        let hop = branch[instance].name.to_string();
        match branch.enclosing_subcircuit(instance) {
            Some(outer) if trail.visited.contains(&outer) => {
                warn!("`{}` instantiates itself, skipping", branch[outer].name);
            }
            Some(outer) => {
                let name = format!("{}_altered", branch[outer].name);
                let map = branch.duplicate(outer, root, &name, self.tables);
                let outer_copy = map.statement(outer)?;
                repoint(&mut branch, map.statement(instance)?, head, altered);
                let trail = trail.hop(&hop, outer);
                self.propagate(&branch, outer, outer_copy, &trail, drafts);
            }
            None => {
                repoint(&mut branch, instance, head, altered);
                let path = match &branch[instance].kind {
                    StatementKind::Instance(data) => data.ancestry.first().cloned(),
                    _ => None,
                }
                .unwrap_or_else(|| hop.clone());
                drafts.push(Draft {
                    label: format!("{}_{}", trail.label, hop),
                    description: format!("{} through {}", trail.description, path),
                    netlist: branch,
                });
            }
        }
        Ok(())
    }
}

/// Labels accumulated while propagating outwards.
struct Trail {
    label: String,
    description: String,
    visited: Vec<StatementId>,
}

impl Trail {
    fn hop(&self, instance: &str, outer: StatementId) -> Trail {
        let mut visited = self.visited.clone();
        visited.push(outer);
        Trail {
            label: format!("{}_{}", self.label, instance),
            description: self.description.clone(),
            visited,
        }
    }
}

fn repoint(netlist: &mut Netlist, instance: StatementId, head: StatementId, altered: StatementId) {
    netlist[instance].master_name = netlist[head].name.clone();
    netlist[instance].dependency.parent = Some(head);
    netlist[instance].dependency.global_parent = Some(altered);
    if let Some(data) = netlist[altered].subcircuit_mut() {
        data.progeny.push(instance);
    }
    netlist.mark_altered(instance);
}
