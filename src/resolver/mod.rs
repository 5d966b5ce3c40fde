//! Dependency resolution.
//!
//! After parsing, every model, analog model and instance only knows the name
//! of its master. Resolution links each of them to the statement that name
//! refers to, then follows those links from every instance until a
//! subcircuit is reached:
//!
//! 1. **Direct pass**: for each non-primitive model, analog model and
//!    instance, look the master up among subcircuits, then analog models,
//!    then models. The first declared match becomes the dependency parent.
//!    With no match the statement becomes its own parent and a warning is
//!    logged.
//! 2. **Global pass**: from each instance, walk dependency parents until a
//!    subcircuit (success), a primitive, a self-terminated statement or a
//!    cycle. On success the subcircuit records the instance as progeny and
//!    the instance inherits the subcircuit's alteration flags unless it has
//!    its own.
//! 3. **Ancestry**: dotted paths from the root circuit to every instance,
//!    e.g. `top.x1[amp].r3`, for reports and scenario descriptions.
//!
//! Nothing here is fatal: unresolved statements and cycles are logged and
//! counted in the [`ResolutionReport`].
//!
//! # Example
//!
//! ```
//! use radnet::classifier::ClassifierTables;
//! use radnet::config::Config;
//! use radnet::netlist::Kind;
//! use radnet::parser::{ParseOptions, parse_str};
//! use radnet::resolver::resolve;
//! use std::path::Path;
//!
//! let mut tables = ClassifierTables::from_config(&Config::default()).unwrap();
//! let mut netlist = parse_str(
//!     "subckt inv (a y)\nr1 (a y) resistor\nends inv\nx1 (in out) inv\n",
//!     Path::new("top.scs"),
//!     &mut tables,
//!     ParseOptions::default(),
//! )
//! .unwrap()
//! .netlist;
//!
//! let report = resolve(&mut netlist, &tables);
//! let inv = netlist.find(Kind::Subcircuit, "inv").unwrap();
//! let x1 = netlist.find(Kind::Instance, "x1").unwrap();
//! assert_eq!(netlist[x1].dependency.global_parent, Some(inv));
//! assert_eq!(report.resolved, 1);
//! ```

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, warn};

use crate::Symbol;
use crate::classifier::ClassifierTables;
use crate::netlist::{Kind, Netlist, StatementId, StatementKind};

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Instances whose dependency chain reaches a subcircuit.
    pub resolved: usize,
    /// Statements whose master matches nothing.
    pub unresolved: Vec<StatementId>,
    /// Dependency chains that loop, starting at the instance walked from.
    pub cycles: Vec<Vec<StatementId>>,
}

/// Run both passes and compute ancestry paths.
pub fn resolve(netlist: &mut Netlist, tables: &ClassifierTables) -> ResolutionReport {
    let unresolved = resolve_direct(netlist);
    let (resolved, cycles) = resolve_global(netlist, tables);
    compute_ancestry(netlist);

    info!(
        "Dependency of {} instances analyzed: {} reach a subcircuit, {} unresolved, {} cycles",
        netlist.iter_kind(Kind::Instance).count(),
        resolved,
        unresolved.len(),
        cycles.len()
    );
    ResolutionReport {
        resolved,
        unresolved,
        cycles,
    }
}

/// First declared statement of each name among `kinds`.
fn pool(netlist: &Netlist, kinds: &[Kind]) -> HashMap<Symbol, StatementId> {
    let mut pool = HashMap::new();
    for id in kinds.iter().flat_map(|kind| netlist.iter_kind(*kind)) {
        pool.entry(netlist[id].name.clone()).or_insert(id);
    }
    pool
}

/// Link statements to the entity their master names. Returns the unresolved ones.
pub fn resolve_direct(netlist: &mut Netlist) -> Vec<StatementId> {
    let pools = [
        pool(netlist, &[Kind::Subcircuit, Kind::RadiationSource]),
        pool(netlist, &[Kind::AnalogModel]),
        pool(netlist, &[Kind::Model]),
    ];
    let dependents: Vec<StatementId> = [Kind::Model, Kind::AnalogModel, Kind::Instance]
        .iter()
        .flat_map(|kind| netlist.iter_kind(*kind).collect::<Vec<_>>())
        .filter(|id| !netlist[*id].is_primitive())
        .collect();

    let mut unresolved = Vec::new();
    for id in dependents {
        let master = &netlist[id].master_name;
        let parent = pools
            .iter()
            .filter_map(|pool| pool.get(master).copied())
            .find(|candidate| *candidate != id);
        match parent {
            Some(parent) => {
                debug!("{} `{}` depends on `{}`", netlist[id].kind(), netlist[id].name, master);
                netlist[id].dependency.parent = Some(parent);
            }
            None => {
                warn!(
                    "Dependency of {} `{}` unresolved: nothing is called `{}`",
                    netlist[id].kind(),
                    netlist[id].name,
                    master
                );
                netlist[id].dependency.parent = Some(id);
                unresolved.push(id);
            }
        }
    }
    unresolved
}

/// Where a dependency walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Walk {
    Subcircuit(StatementId),
    Terminated,
    Cycle(Vec<StatementId>),
}

fn walk(netlist: &Netlist, instance: StatementId) -> Walk {
    let mut path = vec![instance];
    let mut visited = HashSet::from([instance]);
    let mut current = netlist[instance].dependency.parent;

    while let Some(id) = current {
        if id == instance && path.len() == 1 {
            return Walk::Terminated;
        }
        if !visited.insert(id) {
            path.push(id);
            return Walk::Cycle(path);
        }
        path.push(id);
        let statement = &netlist[id];
        match statement.kind() {
            Kind::Subcircuit | Kind::RadiationSource => return Walk::Subcircuit(id),
            Kind::Model | Kind::AnalogModel | Kind::Instance => {
                if statement.is_primitive() || statement.dependency.parent == Some(id) {
                    return Walk::Terminated;
                }
                current = statement.dependency.parent;
            }
            _ => return Walk::Terminated,
        }
    }
    Walk::Terminated
}

/// Link instances to the subcircuit their chain reaches.
///
/// Returns the number of such instances and the cycles met.
pub fn resolve_global(netlist: &mut Netlist, tables: &ClassifierTables) -> (usize, Vec<Vec<StatementId>>) {
    let subcircuits: Vec<_> = [Kind::Subcircuit, Kind::RadiationSource]
        .iter()
        .flat_map(|kind| netlist.iter_kind(*kind))
        .collect();
    for id in subcircuits {
        if let Some(data) = netlist[id].subcircuit_mut() {
            data.progeny.clear();
        }
    }

    let instances: Vec<_> = netlist.iter_kind(Kind::Instance).collect();
    let mut resolved = 0;
    let mut cycles = Vec::new();
    for instance in instances {
        netlist[instance].dependency.scanned_for_instances_dependency = true;
        match walk(netlist, instance) {
            Walk::Subcircuit(subcircuit) => {
                resolved += 1;
                if let Some(data) = netlist[subcircuit].subcircuit_mut() {
                    data.progeny.push(instance);
                }
                let alteration = tables.alteration(&netlist[subcircuit].name).cloned();
                let statement = &mut netlist[instance];
                statement.dependency.global_parent = Some(subcircuit);
                if let Some(alteration) = alteration {
                    if !statement.flags.can_be_injected && !statement.flags.can_be_substituted {
                        statement.flags.can_be_injected = alteration.inject;
                        statement.flags.can_be_substituted = alteration.substitute.is_some();
                        statement.flags.substitute_master_name = alteration.substitute;
                    }
                }
            }
            Walk::Cycle(path) => {
                let names: Vec<_> = path.iter().map(|id| netlist[*id].name.to_string()).collect();
                warn!("Dependency cycle: {}", names.join(" -> "));
                cycles.push(path);
            }
            Walk::Terminated => {}
        }
    }
    (resolved, cycles)
}

/// Dependency chain from `id` up to its global parent, both ends included.
///
/// Empty when `id` does not reach a subcircuit.
pub fn dependency_chain(netlist: &Netlist, id: StatementId) -> Vec<StatementId> {
    let Some(target) = netlist[id].dependency.global_parent else {
        return Vec::new();
    };
    let mut chain = vec![id];
    let mut current = netlist[id].dependency.parent;
    while let Some(next) = current {
        if chain.contains(&next) {
            return Vec::new();
        }
        chain.push(next);
        if next == target {
            return chain;
        }
        current = netlist[next].dependency.parent;
    }
    Vec::new()
}

/// Fill the ancestry paths of every instance reachable from the root circuit.
pub fn compute_ancestry(netlist: &mut Netlist) {
    for id in netlist.iter_kind(Kind::Instance).collect::<Vec<_>>() {
        if let StatementKind::Instance(data) = &mut netlist[id].kind {
            data.ancestry.clear();
        }
    }

    let root = netlist.root();
    let mut found = Vec::new();
    let mut stack = Vec::new();
    collect_ancestry(netlist, root, netlist[root].name.to_string(), &mut stack, &mut found);

    for (id, path) in found {
        if let StatementKind::Instance(data) = &mut netlist[id].kind {
            if !data.ancestry.contains(&path) {
                data.ancestry.push(path);
            }
        }
    }
}

fn collect_ancestry(
    netlist: &Netlist,
    body: StatementId,
    prefix: String,
    stack: &mut Vec<StatementId>,
    found: &mut Vec<(StatementId, String)>,
) {
    for child in &netlist[body].children {
        let statement = &netlist[*child];
        match &statement.kind {
            StatementKind::Instance(_) => {
                let path = format!("{}.{}", prefix, statement.name);
                found.push((*child, path.clone()));
                if let Some(subcircuit) = statement.dependency.global_parent {
                    if !stack.contains(&subcircuit) {
                        stack.push(subcircuit);
                        let prefix = format!("{}[{}]", path, netlist[subcircuit].name);
                        collect_ancestry(netlist, subcircuit, prefix, stack, found);
                        stack.pop();
                    }
                }
            }
            StatementKind::Include(data) => {
                if let Some(circuit) = data.circuit {
                    let prefix = format!("{}.{}", prefix, netlist[circuit].name);
                    collect_ancestry(netlist, circuit, prefix, stack, found);
                }
            }
            StatementKind::Subcircuit(_) | StatementKind::RadiationSource(_) => {}
            _ => collect_ancestry(netlist, *child, prefix.clone(), stack, found),
        }
    }
}

/// Statements and their direct (`master`) and global (`global`) dependency edges.
pub fn dependency_graph(netlist: &Netlist) -> DiGraph<String, &'static str> {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<StatementId, NodeIndex> = HashMap::new();
    let mut node = |graph: &mut DiGraph<String, &'static str>, id: StatementId| {
        *nodes
            .entry(id)
            .or_insert_with(|| graph.add_node(format!("{} {}", netlist[id].kind(), netlist[id].name)))
    };

    for (id, statement) in netlist.statements() {
        let dependency = &statement.dependency;
        if let Some(parent) = dependency.parent.filter(|p| *p != id) {
            let (a, b) = (node(&mut graph, id), node(&mut graph, parent));
            graph.add_edge(a, b, "master");
        }
        if let Some(global) = dependency.global_parent.filter(|g| Some(*g) != dependency.parent) {
            let (a, b) = (node(&mut graph, id), node(&mut graph, global));
            graph.add_edge(a, b, "global");
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn direct_subcircuit_dependency() {
        let (mut netlist, tables) = parse_netlist(
            "subckt inv (a y)\nr1 (a y) resistor\nends inv\nx1 (in out) inv\n",
        );
        let report = resolve(&mut netlist, &tables);

        let inv = netlist.find(Kind::Subcircuit, "inv").unwrap();
        let x1 = netlist.find(Kind::Instance, "x1").unwrap();
        assert_eq!(netlist[x1].dependency.parent, Some(inv));
        assert_eq!(netlist[x1].dependency.global_parent, Some(inv));
        assert_eq!(netlist[inv].subcircuit().unwrap().progeny, vec![x1]);
        assert!(netlist[x1].dependency.scanned_for_instances_dependency);
        assert_eq!(report.resolved, 1);
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn dependency_through_a_model() {
        let (mut netlist, tables) = parse_netlist(
            "subckt core (a b)\nr1 (a b) resistor\nends core\nmodel wrap core\nx1 (p q) wrap\n",
        );
        resolve(&mut netlist, &tables);

        let core = netlist.find(Kind::Subcircuit, "core").unwrap();
        let wrap = netlist.find(Kind::Model, "wrap").unwrap();
        let x1 = netlist.find(Kind::Instance, "x1").unwrap();
        assert_eq!(netlist[x1].dependency.parent, Some(wrap));
        assert_eq!(netlist[x1].dependency.global_parent, Some(core));
        assert!(netlist[core].subcircuit().unwrap().progeny.contains(&x1));
        assert_eq!(dependency_chain(&netlist, x1), vec![x1, wrap, core]);
    }

    #[test]
    fn subcircuits_win_over_models() {
        let (mut netlist, tables) =
            parse_netlist("model amp bsim4\nsubckt amp (a b)\nends amp\nx1 (p q) amp\n");
        resolve(&mut netlist, &tables);
        let amp = netlist.find(Kind::Subcircuit, "amp").unwrap();
        let x1 = netlist.find(Kind::Instance, "x1").unwrap();
        assert_eq!(netlist[x1].dependency.parent, Some(amp));
    }

    #[test]
    fn unresolved_masters_terminate_on_themselves() {
        let (mut netlist, tables) = parse_netlist("x1 (a b) nowhere\nr1 (a b) resistor\n");
        let report = resolve(&mut netlist, &tables);
        let x1 = netlist.find(Kind::Instance, "x1").unwrap();
        let r1 = netlist.find(Kind::Instance, "r1").unwrap();
        assert_eq!(report.unresolved, vec![x1]);
        assert_eq!(netlist[x1].dependency.parent, Some(x1));
        assert_eq!(netlist[x1].dependency.global_parent, None);
        // primitives are not resolved at all
        assert_eq!(netlist[r1].dependency.parent, None);
    }

    #[test]
    fn model_cycles_are_reported() {
        let (mut netlist, tables) = parse_netlist("model a b\nmodel b a\nx1 (p q) a\n");
        let report = resolve(&mut netlist, &tables);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.resolved, 0);
    }

    #[test]
    fn ancestry_paths_follow_hierarchy() {
        let (mut netlist, tables) = parse_netlist(
            "subckt inv (a y)\nr3 (a y) resistor\nends inv\nsubckt amp (i o)\nx2 (i o) inv\nends amp\nx1 (in out) amp\nx9 (in out) inv\n",
        );
        resolve(&mut netlist, &tables);

        let r3 = netlist.find(Kind::Instance, "r3").unwrap();
        let StatementKind::Instance(data) = &netlist[r3].kind else {
            unreachable!()
        };
        assert_eq!(
            data.ancestry,
            vec!["top.x1[amp].x2[inv].r3".to_string(), "top.x9[inv].r3".to_string()]
        );
    }

    #[test]
    fn alteration_flags_are_inherited_from_subcircuit() {
        let mut config = crate::config::Config::default();
        config.alterable_statements = vec![crate::config::AlterableEntry {
            master_name: "inv".to_string(),
            inject: false,
            substitute: Some("inv_rad".to_string()),
        }];
        let (mut netlist, tables) = parse_netlist_with(
            "subckt inv (a y)\nends inv\nmodel w inv\nx1 (a b) w\n",
            &config,
        );
        resolve(&mut netlist, &tables);
        let x1 = netlist.find(Kind::Instance, "x1").unwrap();
        assert!(netlist[x1].flags.can_be_substituted);
        assert_eq!(netlist[x1].flags.substitute_master_name.as_deref(), Some("inv_rad"));
    }

    #[test]
    fn graph_has_direct_and_global_edges() {
        let (mut netlist, tables) = parse_netlist(
            "subckt core (a b)\nends core\nmodel wrap core\nx1 (p q) wrap\n",
        );
        resolve(&mut netlist, &tables);
        let graph = dependency_graph(&netlist);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        let dot = format!("{:?}", petgraph::dot::Dot::new(&graph));
        assert!(dot.contains("instance x1"));
    }
}
