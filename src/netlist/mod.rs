//! Arena-owned statement tree of a parsed netlist.
//!
//! A [`Netlist`] owns every [`Statement`] and every [`Scope`] produced while
//! parsing a top-level netlist and all the netlists it includes. Statements
//! refer to each other (parent, children, owning circuit, dependency parents)
//! and to their scope through plain indices, so cloning a `Netlist` yields a
//! fully isolated copy: nothing in the copy can point back into the original.
//!
//! # Layout
//!
//! - Statement `0` is the root [`StatementKind::Circuit`] of the top-level file.
//! - Each included file adds one more circuit, referenced from its include
//!   statement and recorded in the including circuit's `includes`.
//! - Circuits, subcircuits and radiation sources own a scope; every other
//!   statement resolves its nodes in the scope of the body it was declared in.
//!
//! # Example
//!
//! ```
//! use radnet::netlist::{Kind, Netlist};
//!
//! let netlist = Netlist::new("top.scs".into());
//! assert_eq!(netlist[netlist.root()].kind(), Kind::Circuit);
//! assert_eq!(netlist.iter_kind(Kind::Instance).count(), 0);
//! ```

pub mod export;
pub mod scope;
pub mod statement;
pub mod subtree;

pub use export::Exporter;
pub use scope::{Node, NodeId, NodePolicy, Scope};
pub use statement::*;
pub use subtree::{IdMap, Subtree};

use std::ops::{Index, IndexMut};
use std::path::PathBuf;

use indexmap::IndexSet;

use crate::Symbol;

/// Index of a statement in its [`Netlist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub usize);

/// Index of a scope in its [`Netlist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

/// Arena sizes captured before a speculative parse, see [`Netlist::rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaMark {
    statements: usize,
    scopes: usize,
    /// Node count of every scope alive at the mark.
    nodes: Vec<usize>,
    globals: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Netlist {
    statements: Vec<Statement>,
    scopes: Vec<Scope>,
    root: StatementId,
    global_nodes: IndexSet<Symbol>,
}

impl Index<StatementId> for Netlist {
    type Output = Statement;

    fn index(&self, id: StatementId) -> &Statement {
        &self.statements[id.0]
    }
}

impl IndexMut<StatementId> for Netlist {
    fn index_mut(&mut self, id: StatementId) -> &mut Statement {
        &mut self.statements[id.0]
    }
}

impl Netlist {
    /// Create an arena holding only the root circuit of `path`.
    pub fn new(path: PathBuf) -> Self {
        let mut netlist = Netlist {
            statements: Vec::new(),
            scopes: Vec::new(),
            root: StatementId(0),
            global_nodes: IndexSet::new(),
        };
        netlist.root = netlist.new_circuit(path, None);
        netlist
    }

    pub fn root(&self) -> StatementId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn get(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(id.0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// All statements, attached or not, in allocation order.
    pub fn statements(&self) -> impl Iterator<Item = (StatementId, &Statement)> {
        self.statements
            .iter()
            .enumerate()
            .map(|(i, s)| (StatementId(i), s))
    }

    /// Circuits in allocation order: the root first, then included files as they were read.
    pub fn circuits(&self) -> impl Iterator<Item = StatementId> + '_ {
        self.statements()
            .filter(|(_, s)| s.kind() == Kind::Circuit)
            .map(|(id, _)| id)
    }

    /// Registered statements of `kind` across every circuit, in declaration order.
    pub fn iter_kind(&self, kind: Kind) -> impl Iterator<Item = StatementId> + '_ {
        self.circuits().flat_map(move |c| {
            self[c]
                .circuit_data()
                .map(|data| data.index.bucket(kind).to_vec())
                .unwrap_or_default()
        })
    }

    /// First registered statement of `kind` called `name`.
    pub fn find(&self, kind: Kind, name: &str) -> Option<StatementId> {
        self.iter_kind(kind).find(|id| self[*id].name.as_ref() == name)
    }

    /// Names declared by `global` statements.
    pub fn global_nodes(&self) -> &IndexSet<Symbol> {
        &self.global_nodes
    }

    /// Record a global node name, returning `true` the first time it is seen.
    pub fn declare_global(&mut self, name: &str) -> bool {
        self.global_nodes.insert(Symbol::from(name))
    }

    /// Allocate a circuit statement with its own top-level scope.
    pub fn new_circuit(&mut self, path: PathBuf, included_by: Option<StatementId>) -> StatementId {
        let id = StatementId(self.statements.len());
        let scope = self.new_scope(id, false);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut circuit = Statement::new(
            StatementKind::Circuit(CircuitData {
                path,
                index: KindIndex::default(),
                includes: Vec::new(),
                included_by,
                unalterable: false,
                altered: false,
            }),
            id,
            scope,
        );
        circuit.name = Symbol::from(name.as_str());
        circuit.master_name = circuit.name.clone();
        self.statements.push(circuit);
        id
    }

    pub fn new_scope(&mut self, owner: StatementId, is_subcircuit_scope: bool) -> ScopeId {
        self.scopes.push(Scope::new(owner, is_subcircuit_scope));
        ScopeId(self.scopes.len() - 1)
    }

    /// Move a statement into the arena without attaching it anywhere.
    pub fn alloc(&mut self, statement: Statement) -> StatementId {
        self.statements.push(statement);
        StatementId(self.statements.len() - 1)
    }

    /// Append `child` to the children of `parent`.
    pub fn attach(&mut self, parent: StatementId, child: StatementId) {
        self[child].parent = Some(parent);
        self[parent].children.push(child);
    }

    /// Insert `child` into the children of `parent` right after `sibling`.
    pub fn attach_after(&mut self, parent: StatementId, sibling: StatementId, child: StatementId) {
        self[child].parent = Some(parent);
        let children = &mut self[parent].children;
        match children.iter().position(|c| *c == sibling) {
            Some(pos) => children.insert(pos + 1, child),
            None => children.push(child),
        }
    }

    /// Register a statement in the kind index of the circuit it belongs to.
    pub fn register(&mut self, id: StatementId) {
        let kind = self[id].kind();
        let circuit = self[id].circuit;
        if let Some(bucket) = self[circuit]
            .circuit_data_mut()
            .and_then(|data| data.index.bucket_mut(kind))
        {
            bucket.push(id);
        }
    }

    /// Replace the payload of a registered statement, moving it to the bucket of its new kind.
    pub fn set_kind(&mut self, id: StatementId, kind: StatementKind) {
        let circuit = self[id].circuit;
        if let Some(data) = self[circuit].circuit_data_mut() {
            data.index.retain(|c| c != id);
        }
        self[id].kind = kind;
        self.register(id);
    }

    /// Remove a statement from its parent and from its circuit's index.
    ///
    /// The statement stays in the arena, unreachable.
    pub fn detach(&mut self, id: StatementId) {
        if let Some(parent) = self[id].parent.take() {
            self[parent].children.retain(|c| *c != id);
        }
        let circuit = self[id].circuit;
        if let Some(data) = self[circuit].circuit_data_mut() {
            data.index.retain(|c| c != id);
        }
    }

    /// The statement and all its descendants, parents before children.
    pub fn descendants(&self, id: StatementId) -> Vec<StatementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self[next].children.iter().rev().copied());
        }
        out
    }

    /// Subcircuit whose body the statement was declared in.
    pub fn enclosing_subcircuit(&self, id: StatementId) -> Option<StatementId> {
        let statement = &self[id];
        let scope_id = if statement.owns_scope() {
            statement.parent.map(|p| self[p].scope)?
        } else {
            statement.scope
        };
        let scope = self.scope(scope_id);
        scope.is_subcircuit_scope.then_some(scope.owner)
    }

    /// Names of the nodes a statement connects, in order.
    pub fn node_names(&self, id: StatementId) -> Vec<Symbol> {
        let statement = &self[id];
        let scope = self.scope(statement.scope);
        statement
            .nodes
            .iter()
            .map(|n| scope.name(*n).clone())
            .collect()
    }

    /// Mark a statement altered, along with its circuit and every circuit including it.
    pub fn mark_altered(&mut self, id: StatementId) {
        self[id].flags.altered = true;
        let mut circuit = self[id].circuit;
        loop {
            let Some(data) = self[circuit].circuit_data_mut() else {
                break;
            };
            data.altered = true;
            let included_by = data.included_by;
            match included_by {
                Some(include) => circuit = self[include].circuit,
                None => break,
            }
        }
    }

    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            statements: self.statements.len(),
            scopes: self.scopes.len(),
            nodes: self.scopes.iter().map(Scope::len).collect(),
            globals: self.global_nodes.len(),
        }
    }

    /// Drop everything allocated since `mark` and every reference to it.
    pub fn rollback(&mut self, mark: ArenaMark) {
        self.statements.truncate(mark.statements);
        self.scopes.truncate(mark.scopes);
        for (scope, len) in self.scopes.iter_mut().zip(&mark.nodes) {
            scope.truncate(*len);
        }
        self.global_nodes.truncate(mark.globals);
        let alive = |id: &StatementId| id.0 < mark.statements;
        for statement in self.statements.iter_mut() {
            statement.children.retain(alive);
            match &mut statement.kind {
                StatementKind::Circuit(data) => {
                    data.index.retain(|id| alive(&id));
                    data.includes.retain(alive);
                }
                StatementKind::Subcircuit(data) | StatementKind::RadiationSource(data) => {
                    data.progeny.retain(alive)
                }
                StatementKind::Conditional(data) => {
                    data.next = data.next.filter(alive);
                }
                StatementKind::Include(data) => {
                    data.circuit = data.circuit.filter(alive);
                }
                _ => {}
            }
        }
    }

    /// Flag the main transient analysis and the advanced analyses enclosing it as essential.
    pub fn mark_essential_analyses(&mut self, main_transient: &str) {
        let Some(main) = self
            .iter_kind(Kind::Analysis)
            .find(|id| self[*id].master_name.as_ref() == main_transient)
        else {
            return;
        };
        let mut current = Some(main);
        let mut first = true;
        while let Some(id) = current {
            if let StatementKind::Analysis(data) = &mut self[id].kind {
                if first {
                    data.main_transient = true;
                    data.essential = true;
                } else if data.advanced {
                    data.essential = true;
                }
            }
            first = false;
            current = self[id].parent;
        }
    }

    /// Detach every analysis that is not essential, returning how many were removed.
    pub fn prune_analyses(&mut self) -> usize {
        let doomed: Vec<_> = self
            .iter_kind(Kind::Analysis)
            .filter(|id| matches!(&self[*id].kind, StatementKind::Analysis(data) if !data.essential))
            .collect();
        for id in &doomed {
            self.detach(*id);
        }
        doomed.len()
    }

    /// Structural summary of a statement tree, see [`Outline`].
    pub fn outline(&self, id: StatementId) -> Outline {
        let statement = &self[id];
        let detail = match &statement.kind {
            StatementKind::Subcircuit(data) | StatementKind::RadiationSource(data) => {
                if data.is_inline { "inline".to_string() } else { String::new() }
            }
            StatementKind::Conditional(data) => format!("{:?} {}", data.branch, data.condition),
            StatementKind::Control(data) => data.arguments.join(" "),
            StatementKind::Include(data) => data
                .section
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            StatementKind::Model(data) => data.bins.join(" "),
            StatementKind::Simple { text } => text.clone(),
            StatementKind::UserFunction(data) => data.body.join(" "),
            _ => String::new(),
        };
        Outline {
            kind: statement.kind(),
            name: statement.name.to_string(),
            master: statement.master_name.to_string(),
            parameters: statement.parameters.iter().map(|p| p.to_string()).collect(),
            nodes: self.node_names(id).iter().map(|n| n.to_string()).collect(),
            detail,
            children: statement
                .children
                .iter()
                .map(|c| self.outline(*c))
                .collect(),
        }
    }
}

/// Structural view of a statement tree, free of arena indices and serials.
///
/// Two trees with equal outlines declare the same statements with the same
/// names, masters, parameters, connections and nesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub kind: Kind,
    pub name: String,
    pub master: String,
    pub parameters: Vec<String>,
    pub nodes: Vec<String>,
    pub detail: String,
    pub children: Vec<Outline>,
}
