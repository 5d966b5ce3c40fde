//! Parse routines, one per statement kind.

use std::path::Path;

use tracing::{info, warn};

use super::lines::LogicalLine;
use super::tokens::{self, Shape};
use super::{FileContext, NetlistParser, Terminator};
use crate::Symbol;
use crate::classifier::StatementClass;
use crate::classifier::patterns::{LIBRARY, SECTION, USER_FUNCTION};
use crate::error::{Error, Result};
use crate::netlist::{
    AnalysisData, ConditionalBranch, ConditionalData, ControlData, IncludeData, InstanceData, ModelData,
    StatementId, StatementKind, SubcircuitData, UserFunctionData,
};

impl NetlistParser<'_> {
    /// Run the routine of the kind `line` classifies as.
    ///
    /// `block` tells whether the line opened a brace body that has not been
    /// read yet.
    pub(super) fn dispatch(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: LogicalLine,
        block: bool,
    ) -> Result<()> {
        match self.tables.classify(&line.text) {
            StatementClass::Parameters => self.parse_parameters(ctx, parent, &line, block),
            StatementClass::Global => self.parse_global(ctx, parent, &line, block),
            StatementClass::Model => self.parse_model(ctx, parent, &line, block),
            StatementClass::AnalogModel { master } => self.parse_analog_model(ctx, parent, &line, block, &master),
            StatementClass::Subcircuit { inline } => self.parse_subcircuit(ctx, parent, &line, inline),
            StatementClass::UserFunction => self.parse_user_function(ctx, parent, &line, block),
            StatementClass::Library => self.parse_library(ctx, parent, &line),
            StatementClass::Section => self.parse_section(ctx, parent, &line),
            StatementClass::Conditional => self.parse_conditional(ctx, parent, &line, block),
            StatementClass::Include { ahdl } => self.parse_include(ctx, parent, &line, block, ahdl),
            StatementClass::ParamTest => self.parse_param_test(ctx, parent, &line, block),
            StatementClass::Control { master, special_syntax } => {
                self.parse_control(ctx, parent, &line, block, &master, special_syntax)
            }
            StatementClass::Analysis { master } => self.parse_analysis(ctx, parent, &line, block, &master),
            StatementClass::Transistor { .. } => self.parse_transistor(ctx, parent, &line, block),
            StatementClass::Simple => self.parse_simple(ctx, parent, &line, block),
            StatementClass::Instance => self.parse_instance(ctx, parent, &line, block),
        }
    }

    /// Kinds without a body: skip the block and fail.
    fn reject_block(&mut self, ctx: &mut FileContext, line: &LogicalLine, block: bool) -> Result<()> {
        if block {
            self.capture_block(ctx, line.line, &line.text)?;
            return Err(Error::parse(line.line, format!("`{}` cannot open a block", line.text)));
        }
        Ok(())
    }

    /// Allocate an instance-shaped statement, connecting its nodes.
    fn alloc_shaped(
        &mut self,
        ctx: &FileContext,
        parent: StatementId,
        kind: StatementKind,
        shape: Shape,
        line: usize,
    ) -> StatementId {
        let mut statement = self.statement(ctx, parent, kind, line);
        let scope = statement.scope;
        statement.name = Symbol::from(shape.name.as_str());
        statement.master_name = Symbol::from(shape.master.as_str());
        statement.parameters = shape.parameters;
        statement.nodes = self.add_nodes(scope, &shape.nodes);
        self.netlist.alloc(statement)
    }

    /// Read the brace body of `id`, if it has one.
    fn parse_braced_body(
        &mut self,
        ctx: &mut FileContext,
        id: StatementId,
        block: bool,
        line: &LogicalLine,
    ) -> Result<()> {
        if block {
            self.parse_body(ctx, id, Terminator::CloseBrace, line.line, &line.text)?;
        }
        Ok(())
    }

    fn parse_parameters(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let tokens = tokens::tokenize(&line.text);
        let mut statement = self.statement(ctx, parent, StatementKind::Parameters, line.line);
        statement.name = Symbol::from("parameters");
        statement.master_name = Symbol::from("parameters");
        for token in &tokens[1..] {
            if !tokens::is_parameter(token) {
                return Err(Error::parse(line.line, format!("`{}` is not an assignment", token)));
            }
            statement.parameters.push(tokens::parameter(token));
        }
        let id = self.netlist.alloc(statement);
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_global(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let tokens = tokens::tokenize(&line.text);
        let mut statement = self.statement(ctx, parent, StatementKind::Global, line.line);
        let scope = statement.scope;
        statement.name = Symbol::from("global");
        statement.master_name = Symbol::from("global");
        for name in &tokens[1..] {
            if self.netlist.declare_global(name) {
                info!("New global node {}", name);
            }
            let node = self.add_node(scope, name);
            self.netlist.scope_mut(scope).node_mut(node).global = true;
            statement.nodes.push(node);
        }
        let id = self.netlist.alloc(statement);
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_model(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        let tokens = tokens::tokenize(&line.text);
        let (Some(name), Some(master)) = (tokens.get(1), tokens.get(2)) else {
            return Err(Error::parse(line.line, "model needs a name and a master"));
        };
        if let Some(stray) = tokens[3..].iter().find(|t| !tokens::is_parameter(t)) {
            return Err(Error::parse(line.line, format!("unexpected `{}` in model", stray)));
        }

        let block = block || self.block_on_next_line(ctx)?;
        let bins = if block {
            self.capture_block(ctx, line.line, &line.text)?
        } else {
            Vec::new()
        };

        let primitive = self.tables.is_primitive(master);
        let mut statement = self.statement(
            ctx,
            parent,
            StatementKind::Model(ModelData { primitive, bins }),
            line.line,
        );
        statement.name = Symbol::from(name.as_str());
        statement.master_name = Symbol::from(master.as_str());
        statement.parameters = tokens[3..].iter().map(|t| tokens::parameter(t)).collect();
        let id = self.netlist.alloc(statement);
        self.close(ctx, parent, id);

        if self.tables.is_transistor(master) {
            self.tables.register_transistor(name)?;
        }
        Ok(())
    }

    fn parse_analog_model(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
        master: &str,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let tokens = tokens::tokenize(&line.text);
        let Some(marker) = tokens.iter().position(|t| t == "analogmodel") else {
            return Err(Error::parse(line.line, "analog model without `analogmodel`"));
        };
        if marker == 0 {
            return Err(Error::parse(line.line, "analog model without a name"));
        }
        let (nodes, bracketed) = match &tokens[1..marker] {
            [group] if group.starts_with('(') => (tokens::group_items(group), true),
            bare => (bare.to_vec(), false),
        };
        let parameters = tokens[marker + 1..]
            .iter()
            .filter(|t| tokens::is_parameter(t))
            .map(|t| tokens::parameter(t))
            .filter(|p| p.name.as_ref() != "modelname")
            .collect();
        let shape = Shape {
            name: tokens[0].clone(),
            nodes,
            bracketed,
            master: master.to_string(),
            parameters,
        };
        let kind = StatementKind::AnalogModel(ModelData {
            primitive: self.tables.is_primitive(master),
            bins: Vec::new(),
        });
        let id = self.alloc_shaped(ctx, parent, kind, shape, line.line);
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_subcircuit(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        inline: bool,
    ) -> Result<()> {
        let tokens = tokens::tokenize(&line.text);
        let start = if inline { 2 } else { 1 };
        let Some(name) = tokens.get(start) else {
            return Err(Error::parse(line.line, "subcircuit without a name"));
        };
        let rest = &tokens[start + 1..];
        let (pins, parameters): (Vec<String>, Vec<_>) = match rest.first() {
            Some(group) if group.starts_with('(') => (
                tokens::group_items(group),
                rest[1..].iter().map(|t| tokens::parameter(t)).collect(),
            ),
            _ => (
                rest.iter().filter(|t| !tokens::is_parameter(t)).cloned().collect(),
                rest.iter()
                    .filter(|t| tokens::is_parameter(t))
                    .map(|t| tokens::parameter(t))
                    .collect(),
            ),
        };

        let mut statement = self.statement(
            ctx,
            parent,
            StatementKind::Subcircuit(SubcircuitData {
                is_inline: inline,
                progeny: Vec::new(),
            }),
            line.line,
        );
        statement.name = Symbol::from(name.as_str());
        statement.master_name = statement.name.clone();
        statement.parameters = parameters;
        let id = self.netlist.alloc(statement);
        let scope = self.netlist.new_scope(id, true);
        self.netlist[id].scope = scope;
        let nodes = pins
            .iter()
            .map(|pin| self.netlist.scope_mut(scope).add_pin(pin, &*self.tables))
            .collect();
        self.netlist[id].nodes = nodes;

        let opener = format!("subckt {}", name);
        self.parse_body(ctx, id, Terminator::Ends(Symbol::from(name.as_str())), line.line, &opener)?;
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_user_function(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        let Some(caps) = USER_FUNCTION.captures(&line.text) else {
            return Err(Error::parse(line.line, "malformed function header"));
        };
        let arguments = caps["args"]
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| match a.split_once(char::is_whitespace) {
                Some((ty, name)) => (ty.to_string(), name.trim().to_string()),
                None => ("real".to_string(), a.to_string()),
            })
            .collect();
        let return_type = caps["ty"].to_string();
        let name = caps["name"].to_string();

        if !(block || self.block_on_next_line(ctx)?) {
            return Err(Error::parse(line.line, format!("function `{}` has no body", name)));
        }
        let body = self.capture_block(ctx, line.line, &line.text)?;

        let mut statement = self.statement(
            ctx,
            parent,
            StatementKind::UserFunction(UserFunctionData {
                return_type: return_type.clone(),
                arguments,
                body,
            }),
            line.line,
        );
        statement.name = Symbol::from(name.as_str());
        statement.master_name = Symbol::from(return_type.as_str());
        let id = self.netlist.alloc(statement);
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_library(&mut self, ctx: &mut FileContext, parent: StatementId, line: &LogicalLine) -> Result<()> {
        let Some(caps) = LIBRARY.captures(&line.text) else {
            return Err(Error::parse(line.line, "library without a name"));
        };
        let name = Symbol::from(&caps["name"]);
        let mut statement = self.statement(ctx, parent, StatementKind::Library { active: true }, line.line);
        statement.name = name.clone();
        statement.master_name = Symbol::from("library");
        let id = self.netlist.alloc(statement);

        let opener = format!("library {}", name);
        self.parse_body(ctx, id, Terminator::EndLibrary(name), line.line, &opener)?;
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_section(&mut self, ctx: &mut FileContext, parent: StatementId, line: &LogicalLine) -> Result<()> {
        let Some(caps) = SECTION.captures(&line.text) else {
            return Err(Error::parse(line.line, "section without a name"));
        };
        let name = Symbol::from(&caps["name"]);
        let active = ctx.section.as_ref().is_none_or(|wanted| *wanted == name);
        let mut statement = self.statement(ctx, parent, StatementKind::Section { active }, line.line);
        statement.name = name.clone();
        statement.master_name = Symbol::from("section");
        let id = self.netlist.alloc(statement);

        let outer = ctx.inactive;
        ctx.inactive = outer || !active;
        let opener = format!("section {}", name);
        let result = self.parse_body(ctx, id, Terminator::EndSection(name), line.line, &opener);
        ctx.inactive = outer;
        result?;

        self.close(ctx, parent, id);
        if !active {
            self.netlist[id].flags.unalterable = true;
        }
        Ok(())
    }

    fn parse_conditional(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        let text = line.text.trim();
        let (branch, rest) = match strip_word(text, "else") {
            Some(rest) => match strip_word(rest.trim_start(), "if") {
                Some(rest) => (ConditionalBranch::ElseIf, rest),
                None => (ConditionalBranch::Else, rest),
            },
            None => match strip_word(text, "if") {
                Some(rest) => (ConditionalBranch::If, rest),
                None => return Err(Error::parse(line.line, "malformed conditional")),
            },
        };
        let (condition, inline_body) = match branch {
            ConditionalBranch::Else => (String::new(), rest.trim()),
            _ => match tokens::leading_group(rest) {
                Some((condition, after)) => (condition.trim().to_string(), after.trim()),
                None => return Err(Error::parse(line.line, "condition must be parenthesised")),
            },
        };

        // the branch an else continues: the chain tail right before it
        let previous = self.netlist[parent].children.last().copied().filter(|c| {
            matches!(
                &self.netlist[*c].kind,
                StatementKind::Conditional(data)
                    if data.next.is_none() && data.branch != ConditionalBranch::Else
            )
        });
        let previous = match branch {
            ConditionalBranch::If => None,
            _ => Some(previous),
        };

        let braced = block || (inline_body.is_empty() && self.block_on_next_line(ctx)?);
        let mut statement = self.statement(
            ctx,
            parent,
            StatementKind::Conditional(ConditionalData {
                branch,
                condition,
                next: None,
                braced,
            }),
            line.line,
        );
        statement.name = Symbol::from(if branch == ConditionalBranch::If { "if" } else { "else" });
        statement.master_name = statement.name.clone();
        let id = self.netlist.alloc(statement);

        if braced {
            self.parse_body(ctx, id, Terminator::CloseBrace, line.line, &line.text)?;
        } else if !inline_body.is_empty() {
            let body = LogicalLine::new(inline_body, line.line);
            self.parse_statement(ctx, id, body)?;
        } else {
            match ctx.reader.next_statement()? {
                Some(body) => self.parse_statement(ctx, id, body)?,
                None => self.unterminated(line.line, &line.text)?,
            }
        }

        match previous {
            // the body was read so that it is dropped along with the branch
            Some(None) => Err(Error::parse(line.line, "`else` without a preceding `if`")),
            Some(Some(previous)) => {
                self.finish(ctx, id);
                self.netlist.attach_after(parent, previous, id);
                if let StatementKind::Conditional(data) = &mut self.netlist[previous].kind {
                    data.next = Some(id);
                }
                self.register(ctx, id);
                Ok(())
            }
            None => {
                self.close(ctx, parent, id);
                Ok(())
            }
        }
    }

    fn parse_include(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
        ahdl: bool,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let tokens = tokens::tokenize(&line.text);
        let Some(path) = tokens.get(1).map(|t| tokens::unquote(t).to_string()) else {
            return Err(Error::parse(line.line, "include without a path"));
        };
        let section = tokens[2..]
            .iter()
            .map(|t| tokens::parameter(t))
            .find(|p| p.name.as_ref() == "section")
            .and_then(|p| p.value)
            .map(|v| Symbol::from(tokens::unquote(&v)));

        let directory = ctx.path.parent().unwrap_or(Path::new(""));
        let resolved = directory.join(&path);
        let mut statement = self.statement(
            ctx,
            parent,
            StatementKind::Include(IncludeData {
                path,
                resolved: Some(resolved.clone()),
                section: section.clone(),
                ahdl,
                circuit: None,
            }),
            line.line,
        );
        statement.name = Symbol::from(if ahdl { "ahdl_include" } else { "include" });
        statement.master_name = statement.name.clone();

        if ahdl {
            let id = self.netlist.alloc(statement);
            self.close(ctx, parent, id);
            return Ok(());
        }
        if self.open_files.contains(&resolved) {
            return Err(Error::parse(
                line.line,
                format!("{} includes itself", resolved.display()),
            ));
        }

        let reader = super::open(&resolved)?;
        let mark = self.netlist.mark();
        let parsed = self.report.parsed;
        let include = self.netlist.alloc(statement);
        let circuit = self.netlist.new_circuit(resolved.clone(), Some(include));
        let unalterable = ctx.unalterable || self.tables.is_excluded_path(&resolved);
        if let Some(data) = self.netlist[circuit].circuit_data_mut() {
            data.unalterable = unalterable;
        }
        let mut included = FileContext {
            reader,
            path: resolved.clone(),
            circuit,
            counter: 0,
            foreign: false,
            section,
            inactive: false,
            unalterable,
        };

        match self.parse_file_body(&mut included) {
            Ok(()) => {
                if let StatementKind::Include(data) = &mut self.netlist[include].kind {
                    data.circuit = Some(circuit);
                }
                if let Some(data) = self.netlist[ctx.circuit].circuit_data_mut() {
                    data.includes.push(circuit);
                }
                self.close(ctx, parent, include);
                Ok(())
            }
            Err(err) if err.is_structural() => {
                self.netlist.rollback(mark);
                self.report.parsed = parsed;
                warn!("{}: {}, include dropped", resolved.display(), err);
                self.report.dropped += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn parse_param_test(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let tokens = tokens::tokenize(&line.text);
        let shape = tokens::instance_shape(&tokens, line.line)?;
        let id = self.alloc_shaped(ctx, parent, StatementKind::ParamTest, shape, line.line);
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_control(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
        master: &str,
        special_syntax: bool,
    ) -> Result<()> {
        let tokens = tokens::tokenize(&line.text);
        let advanced = self.tables.control(master).is_some_and(|k| k.advanced);
        let block = block || (advanced && self.block_on_next_line(ctx)?);

        let id = if special_syntax {
            let (parameters, arguments): (Vec<_>, Vec<_>) =
                tokens[1..].iter().partition(|t| tokens::is_parameter(t));
            let kind = StatementKind::Control(ControlData {
                advanced: advanced || block,
                special_syntax,
                arguments: arguments.into_iter().cloned().collect(),
                bracketed: false,
            });
            let mut statement = self.statement(ctx, parent, kind, line.line);
            statement.name = Symbol::from(master);
            statement.master_name = Symbol::from(master);
            statement.parameters = parameters.into_iter().map(|t| tokens::parameter(t)).collect();
            self.netlist.alloc(statement)
        } else {
            let shape = tokens::instance_shape(&tokens, line.line)?;
            let kind = StatementKind::Control(ControlData {
                advanced: advanced || block,
                special_syntax,
                arguments: Vec::new(),
                bracketed: shape.bracketed,
            });
            self.alloc_shaped(ctx, parent, kind, shape, line.line)
        };

        self.parse_braced_body(ctx, id, block, line)?;
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_analysis(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
        master: &str,
    ) -> Result<()> {
        let tokens = tokens::tokenize(&line.text);
        let shape = tokens::instance_shape(&tokens, line.line)?;
        let advanced = self.tables.analysis(master).is_some_and(|k| k.advanced);
        let block = block || (advanced && self.block_on_next_line(ctx)?);
        let kind = StatementKind::Analysis(AnalysisData {
            advanced: advanced || block,
            main_transient: false,
            essential: false,
            bracketed: shape.bracketed,
        });
        let id = self.alloc_shaped(ctx, parent, kind, shape, line.line);
        self.parse_braced_body(ctx, id, block, line)?;
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_transistor(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let shape = tokens::instance_shape(&tokens::tokenize(&line.text), line.line)?;
        let kind = StatementKind::Transistor {
            bracketed: shape.bracketed,
        };
        let id = self.alloc_shaped(ctx, parent, kind, shape, line.line);
        self.close(ctx, parent, id);
        Ok(())
    }

    fn parse_simple(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        let first = line.text.split_whitespace().next().unwrap_or_default();
        let block = block || (self.tables.is_reserved(first) && self.block_on_next_line(ctx)?);
        if !block {
            self.add_simple(ctx, parent, line);
            return Ok(());
        }
        let body = self.capture_block(ctx, line.line, &line.text)?;
        let mut text = format!("{} {{\n", line.text);
        for body_line in body {
            text.push_str("    ");
            text.push_str(&body_line);
            text.push('\n');
        }
        text.push('}');
        self.add_simple(ctx, parent, &LogicalLine::new(text, line.line));
        Ok(())
    }

    fn parse_instance(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        line: &LogicalLine,
        block: bool,
    ) -> Result<()> {
        self.reject_block(ctx, line, block)?;
        let shape = tokens::instance_shape(&tokens::tokenize(&line.text), line.line)?;
        let kind = StatementKind::Instance(InstanceData {
            bracketed: shape.bracketed,
            primitive: self.tables.is_primitive(&shape.master),
            ancestry: Vec::new(),
        });
        let id = self.alloc_shaped(ctx, parent, kind, shape, line.line);
        self.close(ctx, parent, id);
        Ok(())
    }
}

/// `text` without a leading keyword, if it starts with it as a whole word.
fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(word)?;
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        _ => Some(rest),
    }
}
