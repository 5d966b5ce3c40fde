//! Serialisation of statement trees back to netlist text.
//!
//! The output is written in the same grammar the parser reads, so parsing an
//! exported circuit yields the same tree. It is not byte-identical to the
//! source: comments are gone, continuation lines are joined and bodies are
//! re-indented.
//!
//! ```
//! use radnet::netlist::Netlist;
//!
//! let netlist = Netlist::new("top.scs".into());
//! assert_eq!(netlist.export(), "");
//! ```

use std::collections::HashMap;
use std::fmt::{self, Write};

use itertools::Itertools;

use super::{ConditionalBranch, Netlist, StatementId, StatementKind};

const INDENT: &str = "    ";

/// Writes circuits of one arena.
pub struct Exporter<'a> {
    netlist: &'a Netlist,
    /// Replacement paths for include statements, used when a scenario writes
    /// its own copies of altered included circuits.
    include_targets: HashMap<StatementId, String>,
}

impl<'a> Exporter<'a> {
    pub fn new(netlist: &'a Netlist) -> Self {
        Self {
            netlist,
            include_targets: HashMap::new(),
        }
    }

    /// Write `path` instead of the include statement's own path.
    pub fn redirect_include(&mut self, include: StatementId, path: String) {
        self.include_targets.insert(include, path);
    }

    /// Write every statement of a circuit, one per line.
    pub fn write_circuit<W: fmt::Write>(&self, circuit: StatementId, writer: &mut W) -> fmt::Result {
        self.write_body(circuit, 0, writer)
    }

    /// Write one statement and its body at the given nesting depth.
    pub fn write_statement<W: fmt::Write>(
        &self,
        id: StatementId,
        depth: usize,
        writer: &mut W,
    ) -> fmt::Result {
        let netlist = self.netlist;
        let statement = &netlist[id];
        let pad = INDENT.repeat(depth);
        let name = &statement.name;
        let master = &statement.master_name;

        match &statement.kind {
            StatementKind::Circuit(_) => self.write_body(id, depth, writer),
            StatementKind::Subcircuit(data) | StatementKind::RadiationSource(data) => {
                writer.write_str(&pad)?;
                if data.is_inline {
                    writer.write_str("inline ")?;
                }
                write!(writer, "subckt {} ({})", name, self.nodes(id))?;
                self.write_parameters(id, writer)?;
                writer.write_char('\n')?;
                self.write_body(id, depth + 1, writer)?;
                writeln!(writer, "{}ends {}", pad, name)
            }
            StatementKind::Instance(data) => {
                write!(writer, "{}{} ", pad, name)?;
                self.write_connections(id, data.bracketed, writer)?;
                write!(writer, "{}", master)?;
                self.write_parameters(id, writer)?;
                writer.write_char('\n')
            }
            StatementKind::Transistor { bracketed } => {
                write!(writer, "{}{} ", pad, name)?;
                self.write_connections(id, *bracketed, writer)?;
                write!(writer, "{}", master)?;
                self.write_parameters(id, writer)?;
                writer.write_char('\n')
            }
            StatementKind::Model(data) => {
                write!(writer, "{}model {} {}", pad, name, master)?;
                self.write_parameters(id, writer)?;
                if data.bins.is_empty() {
                    writer.write_char('\n')
                } else {
                    writer.write_str(" {\n")?;
                    for line in &data.bins {
                        writeln!(writer, "{}{}{}", pad, INDENT, line)?;
                    }
                    writeln!(writer, "{}}}", pad)
                }
            }
            StatementKind::AnalogModel(_) => {
                write!(writer, "{}{} ", pad, name)?;
                self.write_connections(id, true, writer)?;
                write!(writer, "analogmodel modelname={}", master)?;
                self.write_parameters(id, writer)?;
                writer.write_char('\n')
            }
            StatementKind::Analysis(data) => {
                write!(writer, "{}{} ", pad, name)?;
                self.write_connections(id, data.bracketed, writer)?;
                write!(writer, "{}", master)?;
                self.write_parameters(id, writer)?;
                self.write_braced_body(id, data.advanced, depth, writer)
            }
            StatementKind::Control(data) => {
                writer.write_str(&pad)?;
                if data.special_syntax {
                    write!(writer, "{}", master)?;
                    for argument in &data.arguments {
                        write!(writer, " {}", argument)?;
                    }
                } else {
                    write!(writer, "{} ", name)?;
                    self.write_connections(id, data.bracketed, writer)?;
                    write!(writer, "{}", master)?;
                }
                self.write_parameters(id, writer)?;
                self.write_braced_body(id, data.advanced, depth, writer)
            }
            StatementKind::Conditional(_) => self.write_conditional_chain(id, depth, writer),
            StatementKind::Global => {
                writeln!(writer, "{}global {}", pad, self.nodes(id))
            }
            StatementKind::Include(data) => {
                let keyword = if data.ahdl { "ahdl_include" } else { "include" };
                let path = self
                    .include_targets
                    .get(&id)
                    .cloned()
                    .or_else(|| data.resolved.as_ref().map(|p| p.display().to_string()))
                    .unwrap_or_else(|| data.path.clone());
                write!(writer, "{}{} \"{}\"", pad, keyword, path)?;
                if let Some(section) = &data.section {
                    write!(writer, " section={}", section)?;
                }
                writer.write_char('\n')
            }
            StatementKind::Library { .. } => {
                writeln!(writer, "{}library {}", pad, name)?;
                self.write_body(id, depth + 1, writer)?;
                writeln!(writer, "{}endlibrary {}", pad, name)
            }
            StatementKind::Section { .. } => {
                writeln!(writer, "{}section {}", pad, name)?;
                self.write_body(id, depth + 1, writer)?;
                writeln!(writer, "{}endsection {}", pad, name)
            }
            StatementKind::Parameters => {
                write!(writer, "{}parameters", pad)?;
                self.write_parameters(id, writer)?;
                writer.write_char('\n')
            }
            StatementKind::ParamTest => {
                write!(writer, "{}{} paramtest", pad, name)?;
                self.write_parameters(id, writer)?;
                writer.write_char('\n')
            }
            StatementKind::Simple { text } => {
                for line in text.lines() {
                    writeln!(writer, "{}{}", pad, line)?;
                }
                Ok(())
            }
            StatementKind::UserFunction(data) => {
                let arguments = data
                    .arguments
                    .iter()
                    .map(|(ty, arg)| format!("{} {}", ty, arg))
                    .join(", ");
                writeln!(writer, "{}{} {}({}) {{", pad, data.return_type, name, arguments)?;
                for line in &data.body {
                    writeln!(writer, "{}{}{}", pad, INDENT, line)?;
                }
                writeln!(writer, "{}}}", pad)
            }
        }
    }

    fn write_body<W: fmt::Write>(&self, id: StatementId, depth: usize, writer: &mut W) -> fmt::Result {
        for child in &self.netlist[id].children {
            // else branches are written by the branch preceding them
            if let StatementKind::Conditional(data) = &self.netlist[*child].kind {
                if data.branch != ConditionalBranch::If {
                    continue;
                }
            }
            self.write_statement(*child, depth, writer)?;
        }
        Ok(())
    }

    fn write_braced_body<W: fmt::Write>(
        &self,
        id: StatementId,
        braced: bool,
        depth: usize,
        writer: &mut W,
    ) -> fmt::Result {
        if !braced {
            return writer.write_char('\n');
        }
        writer.write_str(" {\n")?;
        self.write_body(id, depth + 1, writer)?;
        writeln!(writer, "{}}}", INDENT.repeat(depth))
    }

    /// `if (a) { .. } else if (b) { .. } else { .. }`
    fn write_conditional_chain<W: fmt::Write>(
        &self,
        first: StatementId,
        depth: usize,
        writer: &mut W,
    ) -> fmt::Result {
        let pad = INDENT.repeat(depth);
        writer.write_str(&pad)?;
        let mut current = Some(first);
        while let Some(id) = current {
            let StatementKind::Conditional(data) = &self.netlist[id].kind else {
                break;
            };
            match data.branch {
                ConditionalBranch::If => writeln!(writer, "if ({}) {{", data.condition)?,
                ConditionalBranch::ElseIf => writeln!(writer, " else if ({}) {{", data.condition)?,
                ConditionalBranch::Else => writer.write_str(" else {\n")?,
            }
            self.write_body(id, depth + 1, writer)?;
            write!(writer, "{}}}", pad)?;
            current = data.next;
        }
        writer.write_char('\n')
    }

    fn nodes(&self, id: StatementId) -> String {
        self.netlist.node_names(id).iter().join(" ")
    }

    fn write_connections<W: fmt::Write>(
        &self,
        id: StatementId,
        bracketed: bool,
        writer: &mut W,
    ) -> fmt::Result {
        let nodes = self.nodes(id);
        if bracketed {
            write!(writer, "({}) ", nodes)
        } else if nodes.is_empty() {
            Ok(())
        } else {
            write!(writer, "{} ", nodes)
        }
    }

    fn write_parameters<W: fmt::Write>(&self, id: StatementId, writer: &mut W) -> fmt::Result {
        for parameter in &self.netlist[id].parameters {
            write!(writer, " {}", parameter)?;
        }
        Ok(())
    }
}

impl Netlist {
    /// Text of the root circuit.
    pub fn export(&self) -> String {
        self.export_circuit(self.root())
    }

    /// Text of one circuit, included circuits excluded.
    pub fn export_circuit(&self, circuit: StatementId) -> String {
        let mut out = String::new();
        Exporter::new(self)
            .write_circuit(circuit, &mut out)
            .expect("writing to a String");
        out
    }

    /// Text of one statement and its body.
    pub fn export_statement(&self, id: StatementId) -> String {
        let mut out = String::new();
        Exporter::new(self)
            .write_statement(id, 0, &mut out)
            .expect("writing to a String");
        out
    }
}
