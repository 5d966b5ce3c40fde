//! Detached copies of statement subtrees.
//!
//! Scenario construction duplicates subcircuits and model wrappers inside a
//! scenario arena and grafts radiation-source definitions coming from another
//! arena. Both go through a [`Subtree`]: an owned snapshot of a statement, its
//! descendants and the scopes they own, which can be inserted anywhere.
//! Insertion re-roots every parent, circuit, scope and intra-subtree link onto
//! the new copy.

use std::collections::HashMap;

use super::{
    Netlist, NodePolicy, Scope, ScopeId, Statement, StatementId, StatementKind,
};
use crate::Symbol;
use crate::error::{Error, Result};

/// Owned snapshot of a statement tree.
#[derive(Debug, Clone)]
pub struct Subtree {
    statements: Vec<(StatementId, Statement)>,
    scopes: Vec<(ScopeId, Scope)>,
    /// Node names of statements whose scope lies outside the subtree.
    external_nodes: HashMap<StatementId, Vec<Symbol>>,
}

impl Subtree {
    pub fn root(&self) -> StatementId {
        self.statements[0].0
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Correspondence between original and copied indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    pub statements: HashMap<StatementId, StatementId>,
    pub scopes: HashMap<ScopeId, ScopeId>,
}

impl IdMap {
    /// Copy of `original`, or `TransformationTargetMissing`.
    pub fn statement(&self, original: StatementId) -> Result<StatementId> {
        self.statements
            .get(&original)
            .copied()
            .ok_or_else(|| Error::TransformationTargetMissing(format!("#{}", original.0)))
    }

    pub fn scope(&self, original: ScopeId) -> Option<ScopeId> {
        self.scopes.get(&original).copied()
    }
}

impl Netlist {
    /// Snapshot `id` and its descendants.
    pub fn extract_subtree(&self, id: StatementId) -> Subtree {
        let ids = self.descendants(id);
        let scopes: Vec<(ScopeId, Scope)> = ids
            .iter()
            .filter(|s| self[**s].owns_scope() && self[**s].kind() != super::Kind::Circuit)
            .map(|s| (self[*s].scope, self.scope(self[*s].scope).clone()))
            .collect();
        let external_nodes = ids
            .iter()
            .filter(|s| !scopes.iter().any(|(scope, _)| *scope == self[**s].scope))
            .map(|s| (*s, self.node_names(*s)))
            .collect();
        Subtree {
            statements: ids.iter().map(|s| (*s, self[*s].clone())).collect(),
            scopes,
            external_nodes,
        }
    }

    /// Insert a snapshot as the last child of `parent`.
    ///
    /// Statements whose scope was not part of the snapshot are reconnected by
    /// node name in the scope of `parent`.
    pub fn insert_subtree(
        &mut self,
        subtree: Subtree,
        parent: StatementId,
        policy: &dyn NodePolicy,
    ) -> IdMap {
        self.insert(subtree, parent, policy, true)
    }

    /// Links leaving the subtree are kept only when it comes from this arena.
    fn insert(
        &mut self,
        subtree: Subtree,
        parent: StatementId,
        policy: &dyn NodePolicy,
        same_arena: bool,
    ) -> IdMap {
        let circuit = if self[parent].kind() == super::Kind::Circuit {
            parent
        } else {
            self[parent].circuit
        };
        let target_scope = self[parent].scope;

        let mut map = IdMap::default();
        for (offset, (old, _)) in subtree.statements.iter().enumerate() {
            map.statements.insert(*old, StatementId(self.len() + offset));
        }
        for (offset, (old, _)) in subtree.scopes.iter().enumerate() {
            map.scopes.insert(*old, ScopeId(self.scope_count() + offset));
        }

        let root = subtree.root();
        let Subtree {
            statements,
            scopes,
            external_nodes,
        } = subtree;

        for (_, mut scope) in scopes {
            scope.owner = map.statements[&scope.owner];
            self.scopes.push(scope);
        }

        for (old, mut statement) in statements {
            let remap = |id: StatementId| map.statements.get(&id).copied().unwrap_or(id);
            statement.children = statement.children.iter().map(|c| remap(*c)).collect();
            statement.parent = if old == root {
                Some(parent)
            } else {
                statement.parent.map(remap)
            };
            statement.circuit = circuit;
            let outward = |id: StatementId| {
                map.statements
                    .get(&id)
                    .copied()
                    .or(same_arena.then_some(id))
            };
            statement.dependency.parent = statement.dependency.parent.and_then(outward);
            statement.dependency.global_parent =
                statement.dependency.global_parent.and_then(outward);
            match &mut statement.kind {
                StatementKind::Subcircuit(data) | StatementKind::RadiationSource(data) => {
                    data.progeny.clear();
                }
                StatementKind::Conditional(data) => {
                    data.next = data.next.map(remap);
                }
                _ => {}
            }

            match map.scope(statement.scope) {
                Some(scope) => statement.scope = scope,
                None => {
                    statement.scope = target_scope;
                    let names = external_nodes.get(&old).cloned().unwrap_or_default();
                    statement.nodes = names
                        .iter()
                        .map(|name| self.scope_mut(target_scope).add_node(name, policy).0)
                        .collect();
                }
            }
            self.statements.push(statement);
        }

        let new_root = map.statements[&root];
        self.attach(parent, new_root);
        let mut copies: Vec<_> = map.statements.values().copied().collect();
        copies.sort();
        for copy in copies {
            self.register(copy);
        }
        map
    }

    /// Duplicate `id` under `parent` with a new name.
    pub fn duplicate(
        &mut self,
        id: StatementId,
        parent: StatementId,
        name: &str,
        policy: &dyn NodePolicy,
    ) -> IdMap {
        let subtree = self.extract_subtree(id);
        let map = self.insert_subtree(subtree, parent, policy);
        let copy = map.statements[&id];
        self[copy].name = Symbol::from(name);
        if self[copy].subcircuit().is_some() {
            self[copy].master_name = Symbol::from(name);
        }
        map
    }

    /// Copy `id` from another arena under `parent`.
    pub fn graft(
        &mut self,
        source: &Netlist,
        id: StatementId,
        parent: StatementId,
        policy: &dyn NodePolicy,
    ) -> IdMap {
        self.insert(source.extract_subtree(id), parent, policy, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{InstanceData, Kind, SubcircuitData};

    struct Policy;

    impl NodePolicy for Policy {
        fn is_unalterable_node(&self, name: &str) -> bool {
            name == "0"
        }
    }

    /// `subckt inv (a y)` holding one instance, declared in the root circuit.
    fn subcircuit(netlist: &mut Netlist) -> (StatementId, StatementId) {
        let root = netlist.root();
        let mut sub = Statement::new(
            StatementKind::Subcircuit(SubcircuitData {
                is_inline: false,
                progeny: vec![StatementId(99)],
            }),
            root,
            ScopeId(0),
        );
        sub.name = Symbol::from("inv");
        sub.master_name = Symbol::from("inv");
        let sub = netlist.alloc(sub);
        let scope = netlist.new_scope(sub, true);
        netlist[sub].scope = scope;
        let pins = vec![
            netlist.scope_mut(scope).add_pin("a", &Policy),
            netlist.scope_mut(scope).add_pin("y", &Policy),
        ];
        netlist[sub].nodes = pins.clone();

        let mut inner = Statement::new(StatementKind::Instance(InstanceData::default()), root, scope);
        inner.name = Symbol::from("r0");
        inner.master_name = Symbol::from("resistor");
        inner.nodes = pins;
        let inner = netlist.alloc(inner);
        netlist.attach(sub, inner);
        netlist.attach(root, sub);
        netlist.register(sub);
        netlist.register(inner);
        (sub, inner)
    }

    #[test]
    fn duplicate_reroots_copy() {
        let mut netlist = Netlist::new("top.scs".into());
        let (sub, inner) = subcircuit(&mut netlist);
        let root = netlist.root();

        let map = netlist.duplicate(sub, root, "inv_altered", &Policy);
        let copy = map.statement(sub).unwrap();
        let inner_copy = map.statement(inner).unwrap();

        assert_ne!(copy, sub);
        assert_eq!(netlist[copy].name.as_ref(), "inv_altered");
        assert_eq!(netlist[copy].parent, Some(root));
        assert_eq!(netlist[copy].children, vec![inner_copy]);
        assert_eq!(netlist[inner_copy].parent, Some(copy));
        assert_ne!(netlist[copy].scope, netlist[sub].scope);
        assert_eq!(netlist[inner_copy].scope, netlist[copy].scope);
        assert_eq!(netlist.scope(netlist[copy].scope).owner, copy);
        assert!(netlist[copy].subcircuit().unwrap().progeny.is_empty());
        assert_eq!(netlist.iter_kind(Kind::Subcircuit).count(), 2);

        // the copy's scope is independent from the original's
        let copy_scope = netlist[copy].scope;
        let a = netlist.scope(copy_scope).get_node("a").unwrap();
        netlist.scope_mut(copy_scope).node_mut(a).injected = true;
        let original = netlist.scope(netlist[sub].scope);
        assert!(!original.node(original.get_node("a").unwrap()).injected);
    }

    #[test]
    fn graft_reconnects_external_nodes_by_name() {
        let mut source = Netlist::new("lib.scs".into());
        let (_, inner) = subcircuit(&mut source);

        let mut target = Netlist::new("top.scs".into());
        let root = target.root();
        let map = target.graft(&source, inner, root, &Policy);
        let copy = map.statement(inner).unwrap();

        assert_eq!(target[copy].scope, target[root].scope);
        let names: Vec<_> = target.node_names(copy).iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["a", "y"]);
        assert_eq!(target.scope(target[root].scope).len(), 2);
    }

    #[test]
    fn missing_lookup_is_a_transformation_error() {
        let map = IdMap::default();
        assert!(matches!(
            map.statement(StatementId(7)),
            Err(Error::TransformationTargetMissing(_))
        ));
    }
}
