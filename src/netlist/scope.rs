//! Node namespaces of circuits and subcircuits.

use indexmap::IndexMap;

use super::StatementId;
use crate::Symbol;

/// Index of a node inside its [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Decides which node names may never carry an alteration.
pub trait NodePolicy {
    fn is_unalterable_node(&self, name: &str) -> bool;
}

/// A named connection point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: Symbol,
    /// May receive an injected radiation source.
    pub injectable: bool,
    /// Already received one.
    pub injected: bool,
    /// Boundary pin of the subcircuit owning the scope.
    pub pin_in_subcircuit: bool,
    /// Declared by a `global` statement.
    pub global: bool,
}

/// Namespace of nodes belonging to one circuit or subcircuit body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Circuit, subcircuit or radiation source owning this scope.
    pub owner: StatementId,
    pub is_subcircuit_scope: bool,
    nodes: IndexMap<Symbol, Node>,
}

impl Scope {
    pub fn new(owner: StatementId, is_subcircuit_scope: bool) -> Self {
        Self {
            owner,
            is_subcircuit_scope,
            nodes: IndexMap::new(),
        }
    }

    /// Register `name`, returning the existing node if it is already known.
    ///
    /// The boolean is `true` on first registration only.
    pub fn add_node(&mut self, name: &str, policy: &dyn NodePolicy) -> (NodeId, bool) {
        let key = Symbol::from(name);
        if let Some(index) = self.nodes.get_index_of(&key) {
            return (NodeId(index), false);
        }
        let node = Node {
            name: key,
            injectable: !policy.is_unalterable_node(name),
            injected: false,
            pin_in_subcircuit: false,
            global: false,
        };
        let (index, _) = self.nodes.insert_full(node.name.clone(), node);
        (NodeId(index), true)
    }

    /// Register a subcircuit boundary pin.
    pub fn add_pin(&mut self, name: &str, policy: &dyn NodePolicy) -> NodeId {
        let (id, _) = self.add_node(name, policy);
        self.nodes[id.0].pin_in_subcircuit = true;
        id
    }

    pub fn get_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.get_index_of(&Symbol::from(name)).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn name(&self, id: NodeId) -> &Symbol {
        &self.nodes[id.0].name
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.values().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forget every node registered after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ground;

    impl NodePolicy for Ground {
        fn is_unalterable_node(&self, name: &str) -> bool {
            name == "0"
        }
    }

    const GROUND: Ground = Ground;

    #[test]
    fn add_node_is_idempotent() {
        let mut scope = Scope::new(StatementId(0), false);
        let (a, new_a) = scope.add_node("a", &GROUND);
        let (again, new_again) = scope.add_node("a", &GROUND);
        assert!(new_a);
        assert!(!new_again);
        assert_eq!(a, again);
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn unalterable_nodes_are_not_injectable() {
        let mut scope = Scope::new(StatementId(0), false);
        let (gnd, _) = scope.add_node("0", &GROUND);
        let (out, _) = scope.add_node("out", &GROUND);
        assert!(!scope.node(gnd).injectable);
        assert!(scope.node(out).injectable);
    }

    #[test]
    fn pins_keep_registration_order() {
        let mut scope = Scope::new(StatementId(3), true);
        scope.add_pin("in", &GROUND);
        scope.add_node("mid", &GROUND);
        scope.add_pin("out", &GROUND);

        let names: Vec<_> = scope.nodes().map(|(_, n)| n.name.to_string()).collect();
        assert_eq!(names, vec!["in", "mid", "out"]);
        assert!(scope.node(scope.get_node("out").unwrap()).pin_in_subcircuit);
        assert!(!scope.node(scope.get_node("mid").unwrap()).pin_in_subcircuit);
        assert_eq!(scope.get_node("missing"), None);
    }
}
