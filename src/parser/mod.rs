//! Netlist parser.
//!
//! Parsing is an explicit state machine over the logical lines of a file.
//! [`NetlistParser`] holds what lives for the whole run (the arena, the
//! classifier tables, the options and the running report) and every file,
//! the top-level one and each included one, gets its own [`FileContext`]:
//! a line reader, the statement counter, the foreign-dialect flag and the
//! section the including statement asked for.
//!
//! Each logical line is classified and handed to the routine of its kind.
//! Routines of kinds with a body read the following lines themselves, until
//! `ends`, `endsection`, `endlibrary` or the closing brace.
//!
//! # Failure handling
//!
//! - A statement that does not have the shape of its kind is logged and
//!   dropped; parsing continues with the next one.
//! - A block closed by the wrong name, or never closed, fails the file in
//!   strict mode. Permissive mode logs a warning and accepts the block as is.
//! - A failing included file is rolled back and its include statement
//!   dropped. A missing file stops the run.
//!
//! # Example
//!
//! ```
//! use radnet::classifier::ClassifierTables;
//! use radnet::config::Config;
//! use radnet::netlist::Kind;
//! use radnet::parser::{ParseOptions, parse_str};
//! use std::path::Path;
//!
//! let mut tables = ClassifierTables::from_config(&Config::default()).unwrap();
//! let parsed = parse_str(
//!     "subckt inv (a y)\nm1 (y a 0 0) bsim4\nends inv\nx1 (in out) inv\n",
//!     Path::new("top.scs"),
//!     &mut tables,
//!     ParseOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(parsed.netlist.iter_kind(Kind::Subcircuit).count(), 1);
//! assert_eq!(parsed.report.parsed, 3);
//! ```

pub mod lines;
mod statements;
pub mod tokens;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::Symbol;
use crate::classifier::ClassifierTables;
use crate::error::{Error, Result};
use crate::netlist::{Netlist, NodeId, ScopeId, Statement, StatementId, StatementKind};

use lines::{LineReader, LogicalLine};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Accept blocks left open at end of file and blocks closed by the wrong name.
    pub permissive: bool,
}

/// Statistics of one parse run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub parsed: usize,
    pub dropped: usize,
    pub warnings: usize,
    pub files: usize,
}

/// A parsed netlist with its statistics.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub netlist: Netlist,
    pub report: ParseReport,
}

/// Parse a netlist file and every file it includes.
pub fn parse_file(path: &Path, tables: &mut ClassifierTables, options: ParseOptions) -> Result<Parsed> {
    let reader = open(path)?;
    NetlistParser::new(tables, options, path).run(reader, path)
}

/// Parse netlist text. Includes are resolved relative to `path`.
pub fn parse_str(
    text: &str,
    path: &Path,
    tables: &mut ClassifierTables,
    options: ParseOptions,
) -> Result<Parsed> {
    NetlistParser::new(tables, options, path).run(LineReader::from_text(text), path)
}

fn open(path: &Path) -> Result<LineReader> {
    let file = File::open(path).map_err(|source| Error::MissingInputFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LineReader::new(Box::new(BufReader::new(file))))
}

/// How a body ends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminator {
    EndOfFile,
    Ends(Symbol),
    EndSection(Symbol),
    EndLibrary(Symbol),
    CloseBrace,
}

impl Terminator {
    fn keyword(&self) -> &'static str {
        match self {
            Terminator::EndOfFile => "end of file",
            Terminator::Ends(_) => "ends",
            Terminator::EndSection(_) => "endsection",
            Terminator::EndLibrary(_) => "endlibrary",
            Terminator::CloseBrace => "}",
        }
    }

    fn name(&self) -> Option<&Symbol> {
        match self {
            Terminator::Ends(name) | Terminator::EndSection(name) | Terminator::EndLibrary(name) => {
                Some(name)
            }
            _ => None,
        }
    }
}

/// Parsing state of one file.
pub struct FileContext {
    reader: LineReader,
    path: PathBuf,
    circuit: StatementId,
    counter: u32,
    /// Inside a `simulator lang=` region of another dialect.
    foreign: bool,
    /// Section requested by the including statement.
    section: Option<Symbol>,
    /// Inside a section that was not requested.
    inactive: bool,
    /// Read from an excluded folder.
    unalterable: bool,
}

impl FileContext {
    fn next_serial(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }
}

pub struct NetlistParser<'t> {
    tables: &'t mut ClassifierTables,
    options: ParseOptions,
    netlist: Netlist,
    report: ParseReport,
    /// Files being parsed, outermost first.
    open_files: Vec<PathBuf>,
}

impl<'t> NetlistParser<'t> {
    pub fn new(tables: &'t mut ClassifierTables, options: ParseOptions, path: &Path) -> Self {
        Self {
            tables,
            options,
            netlist: Netlist::new(path.to_path_buf()),
            report: ParseReport::default(),
            open_files: Vec::new(),
        }
    }

    fn run(mut self, reader: LineReader, path: &Path) -> Result<Parsed> {
        let root = self.netlist.root();
        let unalterable = self.tables.is_excluded_path(path);
        if let Some(data) = self.netlist[root].circuit_data_mut() {
            data.unalterable = unalterable;
        }
        let mut ctx = FileContext {
            reader,
            path: path.to_path_buf(),
            circuit: root,
            counter: 0,
            foreign: false,
            section: None,
            inactive: false,
            unalterable,
        };
        self.parse_file_body(&mut ctx)?;

        let main_transient = self.tables.main_transient().to_string();
        self.netlist.mark_essential_analyses(&main_transient);
        info!(
            "{} statements parsed ({} dropped, {} warnings, {} files)",
            self.report.parsed, self.report.dropped, self.report.warnings, self.report.files
        );
        Ok(Parsed {
            netlist: self.netlist,
            report: self.report,
        })
    }

    fn parse_file_body(&mut self, ctx: &mut FileContext) -> Result<()> {
        self.open_files.push(ctx.path.clone());
        self.report.files += 1;
        let circuit = ctx.circuit;
        let result = self.parse_body(ctx, circuit, Terminator::EndOfFile, 0, "");
        self.open_files.pop();
        result
    }

    /// Parse statements into `parent` until `terminator`.
    fn parse_body(
        &mut self,
        ctx: &mut FileContext,
        parent: StatementId,
        terminator: Terminator,
        opener_line: usize,
        opener: &str,
    ) -> Result<()> {
        loop {
            let Some(line) = ctx.reader.next_statement()? else {
                if terminator == Terminator::EndOfFile {
                    return Ok(());
                }
                return self.unterminated(opener_line, opener);
            };

            if let Some(caps) = crate::classifier::patterns::SIMULATOR_LANG.captures(&line.text) {
                ctx.foreign = &caps["lang"] != "spectre";
                self.add_simple(ctx, parent, &line);
                continue;
            }
            if ctx.foreign {
                self.add_simple(ctx, parent, &line);
                continue;
            }

            if let Some(rest) = line.text.strip_prefix('}') {
                if terminator == Terminator::CloseBrace {
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        ctx.reader.push_back(LogicalLine::new(rest, line.line));
                    }
                    return Ok(());
                }
                self.drop_statement(&Error::parse(line.line, "unmatched `}`"));
                let rest = rest.trim();
                if !rest.is_empty() {
                    ctx.reader.push_back(LogicalLine::new(rest, line.line));
                }
                continue;
            }

            let mut words = line.text.split_whitespace();
            let first = words.next().unwrap_or_default();
            if matches!(first, "ends" | "endsection" | "endlibrary") {
                let found = words.next();
                if first == terminator.keyword() {
                    self.check_end_name(&terminator, found, line.line)?;
                    return Ok(());
                }
                let err = Error::StructuralEndMismatch {
                    line: line.line,
                    expected: terminator.keyword().to_string(),
                    found: first.to_string(),
                };
                if terminator == Terminator::EndOfFile {
                    self.drop_statement(&Error::parse(line.line, format!("`{}` outside a block", first)));
                } else {
                    self.structural(err)?;
                }
                continue;
            }

            if let Some(close) = tokens::unmatched_close(&line.text) {
                let (content, rest) = line.text.split_at(close);
                ctx.reader.push_back(LogicalLine::new(rest, line.line));
                ctx.reader.push_back(LogicalLine::new(content.trim(), line.line));
                continue;
            }

            let mark = self.netlist.mark();
            let (counter, parsed) = (ctx.counter, self.report.parsed);
            match self.parse_statement(ctx, parent, line) {
                Ok(()) => {}
                Err(err @ Error::Parse { .. }) => {
                    self.netlist.rollback(mark);
                    ctx.counter = counter;
                    self.report.parsed = parsed;
                    self.drop_statement(&err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn check_end_name(&mut self, terminator: &Terminator, found: Option<&str>, line: usize) -> Result<()> {
        match (terminator.name(), found) {
            (Some(expected), Some(found)) if expected.as_ref() != found => {
                self.structural(Error::StructuralEndMismatch {
                    line,
                    expected: expected.to_string(),
                    found: found.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Fail in strict mode, warn in permissive mode.
    fn structural(&mut self, err: Error) -> Result<()> {
        if self.options.permissive {
            warn!("{}", err);
            self.report.warnings += 1;
            Ok(())
        } else {
            Err(err)
        }
    }

    fn unterminated(&mut self, line: usize, opener: &str) -> Result<()> {
        self.structural(Error::UnterminatedBlock {
            line,
            opener: opener.to_string(),
        })
    }

    fn drop_statement(&mut self, err: &Error) {
        warn!("{}, statement dropped", err);
        self.report.dropped += 1;
    }

    /// Classify one logical line and run the routine of its kind.
    fn parse_statement(&mut self, ctx: &mut FileContext, parent: StatementId, line: LogicalLine) -> Result<()> {
        let (header, block) = match tokens::block_opener(&line.text) {
            Some(at) => {
                let rest = line.text[at + 1..].trim();
                if !rest.is_empty() {
                    ctx.reader.push_back(LogicalLine::new(rest, line.line));
                }
                (line.text[..at].trim().to_string(), true)
            }
            None => (line.text.clone(), false),
        };
        if header.is_empty() {
            return Err(Error::parse(line.line, "block without a statement"));
        }
        let line = LogicalLine::new(header, line.line);
        self.dispatch(ctx, parent, line, block)
    }

    /// Consume a `{` standing alone at the start of the next line.
    fn block_on_next_line(&mut self, ctx: &mut FileContext) -> Result<bool> {
        let Some(next) = ctx.reader.next_statement()? else {
            return Ok(false);
        };
        match next.text.strip_prefix('{') {
            Some(rest) => {
                let rest = rest.trim();
                if !rest.is_empty() {
                    ctx.reader.push_back(LogicalLine::new(rest, next.line));
                }
                Ok(true)
            }
            None => {
                ctx.reader.push_back(next);
                Ok(false)
            }
        }
    }

    /// Raw lines of a brace body, up to the matching `}`.
    fn capture_block(&mut self, ctx: &mut FileContext, opener_line: usize, opener: &str) -> Result<Vec<String>> {
        let mut body = Vec::new();
        let mut depth = 1i32;
        while let Some(line) = ctx.reader.next_statement()? {
            let mut quoted = false;
            for (i, c) in line.text.char_indices() {
                match c {
                    '"' => quoted = !quoted,
                    '{' if !quoted => depth += 1,
                    '}' if !quoted => {
                        depth -= 1;
                        if depth == 0 {
                            let content = line.text[..i].trim();
                            let rest = line.text[i + 1..].trim();
                            if !content.is_empty() {
                                body.push(content.to_string());
                            }
                            if !rest.is_empty() {
                                ctx.reader.push_back(LogicalLine::new(rest, line.line));
                            }
                            return Ok(body);
                        }
                    }
                    _ => {}
                }
            }
            body.push(line.text);
        }
        self.unterminated(opener_line, opener)?;
        Ok(body)
    }

    fn add_simple(&mut self, ctx: &mut FileContext, parent: StatementId, line: &LogicalLine) {
        let mut statement = self.statement(ctx, parent, StatementKind::Simple { text: line.text.clone() }, line.line);
        let first = line.text.split_whitespace().next().unwrap_or_default();
        statement.name = Symbol::from(first);
        statement.master_name = Symbol::from(first);
        let id = self.netlist.alloc(statement);
        self.close(ctx, parent, id);
    }

    /// New statement belonging to the scope of `parent`.
    fn statement(&self, ctx: &FileContext, parent: StatementId, kind: StatementKind, line: usize) -> Statement {
        let mut statement = Statement::new(kind, ctx.circuit, self.netlist[parent].scope);
        statement.line = line;
        statement
    }

    /// Register a node name in `scope`.
    ///
    /// Global names are flagged, and are not injectable inside subcircuits.
    fn add_node(&mut self, scope: ScopeId, name: &str) -> NodeId {
        let global = self.netlist.global_nodes().contains(&Symbol::from(name));
        let in_subcircuit = self.netlist.scope(scope).is_subcircuit_scope;
        let (id, new) = self.netlist.scope_mut(scope).add_node(name, &*self.tables);
        if new && global {
            let node = self.netlist.scope_mut(scope).node_mut(id);
            node.global = true;
            if in_subcircuit {
                node.injectable = false;
            }
        }
        id
    }

    fn add_nodes(&mut self, scope: ScopeId, names: &[String]) -> Vec<NodeId> {
        names.iter().map(|n| self.add_node(scope, n)).collect()
    }

    /// Finish a statement: serial, alteration flags, attachment and registration.
    fn close(&mut self, ctx: &mut FileContext, parent: StatementId, id: StatementId) {
        self.finish(ctx, id);
        self.netlist.attach(parent, id);
        self.register(ctx, id);
    }

    fn finish(&mut self, ctx: &mut FileContext, id: StatementId) {
        let serial = ctx.next_serial();
        let master = self.netlist[id].master_name.clone();
        let alteration = self.tables.alteration(&master).cloned();
        let unalterable =
            ctx.unalterable || ctx.inactive || self.tables.is_unalterable_statement(&master);

        let statement = &mut self.netlist[id];
        statement.serial = serial;
        statement.flags.unalterable = unalterable;
        if let Some(alteration) = alteration {
            statement.flags.can_be_injected = alteration.inject;
            statement.flags.can_be_substituted = alteration.substitute.is_some();
            statement.flags.substitute_master_name = alteration.substitute;
        }
        self.report.parsed += 1;
        tracing::debug!(
            "{}:{} {} `{}` #{}",
            ctx.path.display(),
            statement.line,
            statement.kind(),
            statement.name,
            serial
        );
    }

    /// Statements of unselected sections are kept in the tree but not indexed.
    fn register(&mut self, ctx: &FileContext, id: StatementId) {
        if !ctx.inactive {
            self.netlist.register(id);
        }
    }
}
