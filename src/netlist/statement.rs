//! Statement entities and their kind-specific payloads.

use std::fmt;
use std::path::PathBuf;

use super::{NodeId, ScopeId, StatementId};
use crate::Symbol;

/// `name[=value]` entry of a parameter list. Values are kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: Symbol,
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: &str, value: Option<&str>) -> Self {
        Self {
            name: Symbol::from(name),
            value: value.map(str::to_string),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

/// What may be done to a statement when generating scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlterationFlags {
    pub unalterable: bool,
    pub can_be_injected: bool,
    pub can_be_substituted: bool,
    pub substitute_master_name: Option<Symbol>,
    /// Already altered by a generated scenario.
    pub altered: bool,
}

/// Results of dependency resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    /// Entity `master_name` resolves to. Points to the statement itself when unresolved.
    pub parent: Option<StatementId>,
    /// Subcircuit the dependency chain finally reaches.
    pub global_parent: Option<StatementId>,
    pub scanned_for_instances_dependency: bool,
}

/// Statements of each kind registered in a circuit, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindIndex {
    pub subcircuits: Vec<StatementId>,
    pub instances: Vec<StatementId>,
    pub transistors: Vec<StatementId>,
    pub models: Vec<StatementId>,
    pub analog_models: Vec<StatementId>,
    pub analyses: Vec<StatementId>,
    pub controls: Vec<StatementId>,
    pub conditionals: Vec<StatementId>,
    pub globals: Vec<StatementId>,
    pub includes: Vec<StatementId>,
    pub libraries: Vec<StatementId>,
    pub sections: Vec<StatementId>,
    pub parameters: Vec<StatementId>,
    pub param_tests: Vec<StatementId>,
    pub simple: Vec<StatementId>,
    pub user_functions: Vec<StatementId>,
    pub radiation_sources: Vec<StatementId>,
}

impl KindIndex {
    pub fn bucket(&self, kind: Kind) -> &[StatementId] {
        match kind {
            Kind::Subcircuit => &self.subcircuits,
            Kind::Instance => &self.instances,
            Kind::Transistor => &self.transistors,
            Kind::Model => &self.models,
            Kind::AnalogModel => &self.analog_models,
            Kind::Analysis => &self.analyses,
            Kind::Control => &self.controls,
            Kind::Conditional => &self.conditionals,
            Kind::Global => &self.globals,
            Kind::Include => &self.includes,
            Kind::Library => &self.libraries,
            Kind::Section => &self.sections,
            Kind::Parameters => &self.parameters,
            Kind::ParamTest => &self.param_tests,
            Kind::Simple => &self.simple,
            Kind::UserFunction => &self.user_functions,
            Kind::RadiationSource => &self.radiation_sources,
            Kind::Circuit => &[],
        }
    }

    pub(crate) fn bucket_mut(&mut self, kind: Kind) -> Option<&mut Vec<StatementId>> {
        Some(match kind {
            Kind::Subcircuit => &mut self.subcircuits,
            Kind::Instance => &mut self.instances,
            Kind::Transistor => &mut self.transistors,
            Kind::Model => &mut self.models,
            Kind::AnalogModel => &mut self.analog_models,
            Kind::Analysis => &mut self.analyses,
            Kind::Control => &mut self.controls,
            Kind::Conditional => &mut self.conditionals,
            Kind::Global => &mut self.globals,
            Kind::Include => &mut self.includes,
            Kind::Library => &mut self.libraries,
            Kind::Section => &mut self.sections,
            Kind::Parameters => &mut self.parameters,
            Kind::ParamTest => &mut self.param_tests,
            Kind::Simple => &mut self.simple,
            Kind::UserFunction => &mut self.user_functions,
            Kind::RadiationSource => &mut self.radiation_sources,
            Kind::Circuit => return None,
        })
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(StatementId) -> bool) {
        for bucket in [
            &mut self.subcircuits,
            &mut self.instances,
            &mut self.transistors,
            &mut self.models,
            &mut self.analog_models,
            &mut self.analyses,
            &mut self.controls,
            &mut self.conditionals,
            &mut self.globals,
            &mut self.includes,
            &mut self.libraries,
            &mut self.sections,
            &mut self.parameters,
            &mut self.param_tests,
            &mut self.simple,
            &mut self.user_functions,
            &mut self.radiation_sources,
        ] {
            bucket.retain(|id| keep(*id));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitData {
    /// File the circuit was read from.
    pub path: PathBuf,
    pub index: KindIndex,
    /// Circuits pulled in by include statements of this circuit.
    pub includes: Vec<StatementId>,
    /// Include statement that pulled this circuit in.
    pub included_by: Option<StatementId>,
    /// Read from an excluded folder.
    pub unalterable: bool,
    /// Modified by the scenario it belongs to.
    pub altered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcircuitData {
    pub is_inline: bool,
    /// Instances known to instantiate this subcircuit.
    pub progeny: Vec<StatementId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceData {
    /// Node list written between brackets.
    pub bracketed: bool,
    /// Master is a built-in primitive device.
    pub primitive: bool,
    /// Hierarchical paths from the root circuit, filled by the resolver.
    pub ancestry: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelData {
    pub primitive: bool,
    /// Raw body of a binned model.
    pub bins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisData {
    pub advanced: bool,
    pub main_transient: bool,
    pub essential: bool,
    pub bracketed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlData {
    pub advanced: bool,
    pub special_syntax: bool,
    /// Positional arguments of special-syntax controls (`save a b:p`).
    pub arguments: Vec<String>,
    pub bracketed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionalBranch {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalData {
    pub branch: ConditionalBranch,
    pub condition: String,
    /// Following `else if`/`else` branch of the chain.
    pub next: Option<StatementId>,
    /// Body written between braces.
    pub braced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeData {
    /// Path as written in the netlist.
    pub path: String,
    pub resolved: Option<PathBuf>,
    pub section: Option<Symbol>,
    /// `ahdl_include`: recorded, never parsed.
    pub ahdl: bool,
    /// Circuit parsed from the included file.
    pub circuit: Option<StatementId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunctionData {
    pub return_type: String,
    pub arguments: Vec<(String, String)>,
    pub body: Vec<String>,
}

/// Kind tag with the kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Circuit(CircuitData),
    Subcircuit(SubcircuitData),
    Instance(InstanceData),
    Transistor { bracketed: bool },
    Model(ModelData),
    AnalogModel(ModelData),
    Analysis(AnalysisData),
    Control(ControlData),
    Conditional(ConditionalData),
    Global,
    Include(IncludeData),
    Library { active: bool },
    Section { active: bool },
    Parameters,
    ParamTest,
    Simple { text: String },
    RadiationSource(SubcircuitData),
    UserFunction(UserFunctionData),
}

/// Payload-free kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Circuit,
    Subcircuit,
    Instance,
    Transistor,
    Model,
    AnalogModel,
    Analysis,
    Control,
    Conditional,
    Global,
    Include,
    Library,
    Section,
    Parameters,
    ParamTest,
    Simple,
    RadiationSource,
    UserFunction,
}

impl Kind {
    pub const ALL: [Kind; 18] = [
        Kind::Circuit,
        Kind::Subcircuit,
        Kind::Instance,
        Kind::Transistor,
        Kind::Model,
        Kind::AnalogModel,
        Kind::Analysis,
        Kind::Control,
        Kind::Conditional,
        Kind::Global,
        Kind::Include,
        Kind::Library,
        Kind::Section,
        Kind::Parameters,
        Kind::ParamTest,
        Kind::Simple,
        Kind::RadiationSource,
        Kind::UserFunction,
    ];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Circuit => "circuit",
            Kind::Subcircuit => "subcircuit",
            Kind::Instance => "instance",
            Kind::Transistor => "transistor",
            Kind::Model => "model",
            Kind::AnalogModel => "analog model",
            Kind::Analysis => "analysis",
            Kind::Control => "control",
            Kind::Conditional => "conditional",
            Kind::Global => "global",
            Kind::Include => "include",
            Kind::Library => "library",
            Kind::Section => "section",
            Kind::Parameters => "parameters",
            Kind::ParamTest => "paramtest",
            Kind::Simple => "simple",
            Kind::RadiationSource => "radiation source",
            Kind::UserFunction => "user function",
        };
        f.write_str(name)
    }
}

impl StatementKind {
    pub fn kind(&self) -> Kind {
        match self {
            StatementKind::Circuit(_) => Kind::Circuit,
            StatementKind::Subcircuit(_) => Kind::Subcircuit,
            StatementKind::Instance(_) => Kind::Instance,
            StatementKind::Transistor { .. } => Kind::Transistor,
            StatementKind::Model(_) => Kind::Model,
            StatementKind::AnalogModel(_) => Kind::AnalogModel,
            StatementKind::Analysis(_) => Kind::Analysis,
            StatementKind::Control(_) => Kind::Control,
            StatementKind::Conditional(_) => Kind::Conditional,
            StatementKind::Global => Kind::Global,
            StatementKind::Include(_) => Kind::Include,
            StatementKind::Library { .. } => Kind::Library,
            StatementKind::Section { .. } => Kind::Section,
            StatementKind::Parameters => Kind::Parameters,
            StatementKind::ParamTest => Kind::ParamTest,
            StatementKind::Simple { .. } => Kind::Simple,
            StatementKind::RadiationSource(_) => Kind::RadiationSource,
            StatementKind::UserFunction(_) => Kind::UserFunction,
        }
    }
}

/// One entity of the parsed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Parse order within its file, assigned once the statement is complete.
    pub serial: u32,
    /// First source line.
    pub line: usize,
    pub name: Symbol,
    pub master_name: Symbol,
    pub parameters: Vec<Parameter>,
    /// Connections, indices into `scope`.
    pub nodes: Vec<NodeId>,
    pub children: Vec<StatementId>,
    pub parent: Option<StatementId>,
    /// Circuit the statement was declared in.
    pub circuit: StatementId,
    /// Scope the node references resolve in. Circuits and subcircuits own theirs.
    pub scope: ScopeId,
    pub flags: AlterationFlags,
    pub dependency: Dependency,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind, circuit: StatementId, scope: ScopeId) -> Self {
        Self {
            serial: 0,
            line: 0,
            name: Symbol::from(""),
            master_name: Symbol::from(""),
            parameters: Vec::new(),
            nodes: Vec::new(),
            children: Vec::new(),
            parent: None,
            circuit,
            scope,
            flags: AlterationFlags::default(),
            dependency: Dependency::default(),
            kind,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind.kind()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name.as_ref() == name)
    }

    /// Models, analog models and instances whose master is a built-in primitive.
    pub fn is_primitive(&self) -> bool {
        match &self.kind {
            StatementKind::Model(data) | StatementKind::AnalogModel(data) => data.primitive,
            StatementKind::Instance(data) => data.primitive,
            _ => false,
        }
    }

    pub fn subcircuit(&self) -> Option<&SubcircuitData> {
        match &self.kind {
            StatementKind::Subcircuit(data) | StatementKind::RadiationSource(data) => Some(data),
            _ => None,
        }
    }

    pub fn subcircuit_mut(&mut self) -> Option<&mut SubcircuitData> {
        match &mut self.kind {
            StatementKind::Subcircuit(data) | StatementKind::RadiationSource(data) => Some(data),
            _ => None,
        }
    }

    pub fn circuit_data(&self) -> Option<&CircuitData> {
        match &self.kind {
            StatementKind::Circuit(data) => Some(data),
            _ => None,
        }
    }

    pub fn circuit_data_mut(&mut self) -> Option<&mut CircuitData> {
        match &mut self.kind {
            StatementKind::Circuit(data) => Some(data),
            _ => None,
        }
    }

    /// Statements owning the scope their node references resolve in.
    pub fn owns_scope(&self) -> bool {
        matches!(
            self.kind,
            StatementKind::Circuit(_) | StatementKind::Subcircuit(_) | StatementKind::RadiationSource(_)
        )
    }
}
