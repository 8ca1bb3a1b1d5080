//! The tree-walking evaluator (`spec.md` §4.5). Runs a checked [Program]
//! statement by statement against a [store::Store], producing OUTPUT text
//! and reading INPUT tokens through a pair of caller-supplied streams.
//!
//! Everything the checker already proved (names resolve, types line up,
//! `RETURN` shapes match) is trusted here without re-checking; this module's
//! only job is to carry out what the checker already approved, and to raise
//! the handful of errors that are inherently runtime (division by zero,
//! array bounds, null dereference, file state, recursion depth).

use crate::ast::{
    BinOp, Block, CaseLabel, ClassMemberKind, Decl, Expr, Item, Param, ParamMode, Program, Stmt,
    TypeNode, UnOp,
};
use crate::checker::{self, CheckResult};
use crate::config::RunConfig;
use crate::date::Date;
use crate::error::{PrResult, PrescribeError};
use crate::fileio::{self, FileHandle, FileMode, FileTable, RandomFileHandle, TextFileHandle};
use crate::numeric;
use crate::stdlib::{self, Rng};
use crate::store::{read_pointee, ClassObject, Cell, Lvalue, Store};
use crate::symbol::{ClassInfo, SymbolKind};
use crate::types::Type;
use crate::util::Spanned;
use crate::value::{self, Value};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

/// Everything one `run` needs from the outside world: where INPUT tokens
/// come from, where OUTPUT text goes, and the guard rails on runaway
/// programs.
pub struct RunConfigured<'a> {
    pub config: &'a RunConfig,
}

/// One line of input, already split on whitespace boundaries is not
/// assumed — `INPUT`/`READFILE` both consume one whitespace-delimited
/// token at a time from this stream, per `spec.md` §4.6.
pub trait InputSource {
    /// Returns the next whitespace-delimited token, or `None` at end of
    /// input.
    fn next_token(&mut self) -> Option<String>;
}

/// Splits on any ASCII whitespace, matching the external interface's stdin
/// contract: tokens, not lines.
pub struct WhitespaceTokenizer<'a> {
    tokens: std::collections::VecDeque<&'a str>,
}

impl<'a> WhitespaceTokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { tokens: source.split_ascii_whitespace().collect() }
    }
}

impl<'a> InputSource for WhitespaceTokenizer<'a> {
    fn next_token(&mut self) -> Option<String> {
        self.tokens.pop_front().map(str::to_string)
    }
}

/// The result of running one program: everything OUTPUT produced,
/// concatenated in order.
pub struct RunOutcome {
    pub output: String,
}

/// Checks and runs `program` to completion. `input` feeds `INPUT`; OUTPUT
/// text accumulates in the returned [RunOutcome].
pub fn run(program: &Program, input: &mut dyn InputSource, config: &RunConfig) -> PrResult<RunOutcome> {
    let check_result = checker::check(program)?;
    let index = ProgramIndex::build(program);
    let mut interp = Interp::new(&check_result, &index, input, config);
    interp.run_program(program)?;
    Ok(RunOutcome { output: interp.output })
}

// -----------------------------------------------------------------------
// Program index — locates callable bodies the checker's CheckResult only
// summarizes (it has signatures/types, not the AST).
// -----------------------------------------------------------------------

/// Top-level-only index from name to AST body. Nested declarations (a
/// `PROCEDURE` declared inside another procedure's body, say) are a legal
/// parse per the grammar but are never reachable through any call site the
/// checker accepts, since the checker also only predeclares at block scope
/// where the call appears — so indexing just the program's top level
/// mirrors the checker's own reach exactly.
struct ProgramIndex<'a> {
    procedures: HashMap<&'a str, (&'a [Param], &'a Block)>,
    functions: HashMap<&'a str, (&'a [Param], &'a Block)>,
    type_decls: HashMap<&'a str, &'a TypeNode>,
    /// class name -> method name -> (params, body)
    class_methods: HashMap<&'a str, HashMap<&'a str, (&'a [Param], &'a Block)>>,
    /// class name -> (params, body), absent if the class has no constructor
    class_constructors: HashMap<&'a str, (&'a [Param], &'a Block)>,
}

impl<'a> ProgramIndex<'a> {
    fn build(program: &'a Program) -> Self {
        let mut idx = ProgramIndex {
            procedures: HashMap::new(),
            functions: HashMap::new(),
            type_decls: HashMap::new(),
            class_methods: HashMap::new(),
            class_constructors: HashMap::new(),
        };
        for item in &program.body {
            if let Item::Decl(decl) = &item.value {
                match decl {
                    Decl::Procedure { name, params, body } => {
                        idx.procedures.insert(name.as_str(), (params.as_slice(), body));
                    }
                    Decl::Function { name, params, body, .. } => {
                        idx.functions.insert(name.as_str(), (params.as_slice(), body));
                    }
                    Decl::TypeDecl { name, ty } => {
                        idx.type_decls.insert(name.as_str(), ty);
                    }
                    Decl::Class { name, members, .. } => {
                        let mut methods = HashMap::new();
                        for member in members {
                            match &member.value.kind {
                                ClassMemberKind::Method { name: mname, params, body, .. } => {
                                    methods.insert(mname.as_str(), (params.as_slice(), body));
                                }
                                ClassMemberKind::Constructor { params, body } => {
                                    idx.class_constructors.insert(name.as_str(), (params.as_slice(), body));
                                }
                                ClassMemberKind::Field(_) => {}
                            }
                        }
                        idx.class_methods.insert(name.as_str(), methods);
                    }
                    Decl::Var { .. } | Decl::Const { .. } => {}
                }
            }
        }
        idx
    }
}

/// What a `RETURN`/fallthrough resolved to, propagated up through nested
/// blocks. There is no `BREAK`/`CONTINUE` in the grammar, so `Return` is
/// the only non-local control flow and loops need no special-casing beyond
/// "stop and propagate".
enum Flow {
    Normal,
    Return(Option<Value>),
}

/// An already-evaluated call argument, bound before the callee's frame is
/// pushed. `Alias` names where a BYREF argument's real storage lives so
/// the callee's parameter cell can chase it lazily on every access.
enum BoundArg {
    Value(Value),
    Alias(Lvalue),
}

/// Overwrites the `.line` field of any error bubbling out of `store.rs`,
/// whose internal error paths mostly hardcode `line: 0` since `Lvalue`
/// resolution is structural and doesn't carry a line except at `Deref`.
fn with_line<T>(line: usize, r: PrResult<T>) -> PrResult<T> {
    r.map_err(|mut e| {
        e.line = line;
        e
    })
}

struct Interp<'a> {
    checked: &'a CheckResult,
    index: &'a ProgramIndex<'a>,
    store: Store,
    /// Parallel to `store.frames`: the declared/parameter type of every
    /// bound name in the same frame, consulted by `static_type_of_lvalue`
    /// to disambiguate `Value::Integer` (plain integer) from an enum
    /// member ordinal when `INPUT`/`READFILE` parses a token.
    var_types: Vec<HashMap<String, Type>>,
    files: FileTable,
    input: &'a mut dyn InputSource,
    output: String,
    rng: Rng,
    config: &'a RunConfig,
    call_depth: usize,
    heap_allocations: usize,
    current_class: Option<String>,
    current_object: Option<usize>,
    /// Memoizes `@lvalue` so repeated address-of on the same cell returns
    /// the same pointer id instead of minting a fresh heap alias each time.
    address_cache: HashMap<Lvalue, usize>,
}

impl<'a> Interp<'a> {
    fn new(checked: &'a CheckResult, index: &'a ProgramIndex<'a>, input: &'a mut dyn InputSource, config: &'a RunConfig) -> Self {
        Self {
            checked,
            index,
            store: Store::new(),
            var_types: vec![HashMap::new()],
            files: FileTable::new(),
            input,
            output: String::new(),
            rng: Rng::new(),
            config,
            call_depth: 0,
            heap_allocations: 0,
            current_class: None,
            current_object: None,
            address_cache: HashMap::new(),
        }
    }

    fn push_frame(&mut self) {
        self.store.push_frame();
        self.var_types.push(HashMap::new());
    }

    fn pop_frame(&mut self) {
        self.store.pop_frame();
        self.var_types.pop();
    }

    fn top_frame(&self) -> usize {
        self.store.top_frame_index()
    }

    fn declare_typed(&mut self, name: &str, ty: Type, value: Value) {
        let frame = self.top_frame();
        self.store.frame_mut(frame).declare(name, value);
        self.var_types[frame].insert(name.to_string(), ty);
    }

    fn alloc_pointee(&mut self, line: usize, value: Value) -> PrResult<usize> {
        self.heap_allocations += 1;
        if self.heap_allocations > self.config.max_heap_allocations {
            return Err(PrescribeError::runtime(line, "exceeded the maximum number of heap allocations"));
        }
        Ok(self.store.heap.alloc_pointee(value))
    }

    fn alloc_object(&mut self, line: usize, object: ClassObject) -> PrResult<usize> {
        self.heap_allocations += 1;
        if self.heap_allocations > self.config.max_heap_allocations {
            return Err(PrescribeError::runtime(line, "exceeded the maximum number of heap allocations"));
        }
        Ok(self.store.heap.alloc_object(object))
    }

    fn alloc_alias(&mut self, line: usize, target: Lvalue) -> PrResult<usize> {
        self.heap_allocations += 1;
        if self.heap_allocations > self.config.max_heap_allocations {
            return Err(PrescribeError::runtime(line, "exceeded the maximum number of heap allocations"));
        }
        Ok(self.store.heap.alloc_alias(target))
    }

    fn emit(&mut self, line: usize, text: &str) -> PrResult<()> {
        if self.output.len() + text.len() > self.config.max_output_bytes {
            return Err(PrescribeError::runtime(line, "program output exceeded the configured limit"));
        }
        self.output.push_str(text);
        Ok(())
    }

    // -------------------------------------------------------------
    // Program entry
    // -------------------------------------------------------------

    fn run_program(&mut self, program: &Program) -> PrResult<()> {
        match self.exec_block(&program.body)? {
            Flow::Normal | Flow::Return(None) => Ok(()),
            Flow::Return(Some(_)) => Err(PrescribeError::runtime(0, "RETURN with a value outside of a function")),
        }
    }

    // -------------------------------------------------------------
    // Blocks / items / declarations
    // -------------------------------------------------------------

    fn exec_block(&mut self, block: &Block) -> PrResult<Flow> {
        for item in block {
            match self.exec_item(item)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_item(&mut self, item: &Spanned<Item>) -> PrResult<Flow> {
        let line = item.span.start_line;
        match &item.value {
            Item::Decl(decl) => {
                self.exec_decl(decl, line)?;
                Ok(Flow::Normal)
            }
            Item::Stmt(stmt) => self.exec_stmt(stmt, line),
        }
    }

    fn exec_decl(&mut self, decl: &Decl, line: usize) -> PrResult<()> {
        match decl {
            Decl::Var { name, ty } => {
                let value = self.default_value_for_type_node(ty, line)?;
                let sty = self.type_node_to_type(ty, line)?;
                self.declare_typed(name, sty, value);
                Ok(())
            }
            Decl::Const { name, .. } => {
                // Already folded by the checker; nothing to do at runtime
                // beyond making it visible as a typed name for
                // `static_type_of_lvalue` (it's never a write target).
                if let Some(v) = self.checked.const_values.get(name) {
                    let ty = value_runtime_type(v);
                    let frame = self.top_frame();
                    self.var_types[frame].insert(name.clone(), ty);
                }
                Ok(())
            }
            Decl::TypeDecl { .. } => Ok(()),
            Decl::Procedure { .. } | Decl::Function { .. } | Decl::Class { .. } => Ok(()),
        }
    }

    // -------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------

    fn exec_stmt(&mut self, stmt: &Stmt, line: usize) -> PrResult<Flow> {
        match stmt {
            Stmt::Assign { target, value } => {
                let lv = self.resolve_lvalue(target)?;
                let v = self.eval_expr(value)?;
                with_line(line, lv.set(&mut self.store, v))?;
                Ok(Flow::Normal)
            }
            Stmt::If { cond, then_body, else_body } => {
                if self.eval_expr(cond)?.as_boolean().expect("checker guaranteed BOOLEAN") {
                    self.exec_block(then_body)
                } else if let Some(b) = else_body {
                    self.exec_block(b)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Case { scrutinee, arms, otherwise } => self.exec_case(scrutinee, arms, otherwise),
            Stmt::For { var, start, end, step, body, .. } => self.exec_for(var, start, end, step.as_ref(), body, line),
            Stmt::While { cond, body } => self.exec_while(cond, body),
            Stmt::Repeat { body, cond } => self.exec_repeat(body, cond),
            Stmt::Call { callee, args } => {
                self.call_callable(callee, args, line)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let v = value.as_ref().map(|e| self.eval_expr(e)).transpose()?;
                Ok(Flow::Return(v))
            }
            Stmt::Input(target) => {
                self.exec_input(target, line)?;
                Ok(Flow::Normal)
            }
            Stmt::Output(expr) => {
                let v = self.eval_expr(expr)?;
                let text = v.to_output_string().ok_or_else(|| PrescribeError::type_error(line, format!("cannot OUTPUT a {}", v.type_name())))?;
                self.emit(line, &text)?;
                self.emit(line, "\n")?;
                Ok(Flow::Normal)
            }
            Stmt::OpenFile { handle, path, mode } => {
                self.exec_openfile(handle, path, mode, line)?;
                Ok(Flow::Normal)
            }
            Stmt::CloseFile { handle } => {
                self.exec_closefile(handle, line)?;
                Ok(Flow::Normal)
            }
            Stmt::ReadFile { handle, target } => {
                self.exec_readfile(handle, target, line)?;
                Ok(Flow::Normal)
            }
            Stmt::WriteFile { handle, value } => {
                self.exec_writefile(handle, value, line)?;
                Ok(Flow::Normal)
            }
            Stmt::Seek { handle, position } => {
                self.exec_seek(handle, position, line)?;
                Ok(Flow::Normal)
            }
            Stmt::GetRecord { handle, target } => {
                self.exec_getrecord(handle, target, line)?;
                Ok(Flow::Normal)
            }
            Stmt::PutRecord { handle, value } => {
                self.exec_putrecord(handle, value, line)?;
                Ok(Flow::Normal)
            }
            Stmt::SuperCall { args } => {
                self.exec_super_call(args, line)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_case(&mut self, scrutinee: &Spanned<Expr>, arms: &[crate::ast::CaseArm], otherwise: &Option<Block>) -> PrResult<Flow> {
        let sv = self.eval_expr(scrutinee)?;
        for arm in arms {
            for label in &arm.labels {
                let matched = match label {
                    CaseLabel::Value(e) => self.eval_expr(e)? == sv,
                    CaseLabel::Range(lo, hi) => {
                        let lo_v = self.eval_expr(lo)?;
                        let hi_v = self.eval_expr(hi)?;
                        value_in_range(&sv, &lo_v, &hi_v)
                    }
                };
                if matched {
                    return self.exec_block(&arm.body);
                }
            }
        }
        if let Some(b) = otherwise {
            self.exec_block(b)
        } else {
            Ok(Flow::Normal)
        }
    }

    fn exec_for(&mut self, var: &str, start: &Spanned<Expr>, end: &Spanned<Expr>, step: Option<&Spanned<Expr>>, body: &Block, line: usize) -> PrResult<Flow> {
        let start_v = self.eval_expr(start)?.as_integer().expect("checker guaranteed INTEGER");
        let end_v = self.eval_expr(end)?.as_integer().expect("checker guaranteed INTEGER");
        let step_v = match step {
            Some(e) => self.eval_expr(e)?.as_integer().expect("checker guaranteed INTEGER"),
            None => 1,
        };
        if step_v == 0 {
            return Err(PrescribeError::runtime(line, "FOR step must not be zero"));
        }
        let frame = self.top_frame();
        let already_existed = self.store.frame(frame).has(var);
        if !already_existed {
            self.declare_typed(var, Type::Integer, Value::Integer(start_v));
        } else {
            let lv = Lvalue::Var { frame, name: var.to_string() };
            with_line(line, lv.set(&mut self.store, Value::Integer(start_v)))?;
        }
        let mut i = start_v;
        let flow = loop {
            if (step_v > 0 && i > end_v) || (step_v < 0 && i < end_v) {
                break Flow::Normal;
            }
            let lv = Lvalue::Var { frame, name: var.to_string() };
            with_line(line, lv.set(&mut self.store, Value::Integer(i)))?;
            self.store.frame_mut(frame).lock(var);
            let result = self.exec_block(body);
            self.store.frame_mut(frame).unlock(var);
            match result? {
                Flow::Normal => {}
                flow => break flow,
            }
            i = match numeric::add_i32(line, i, step_v) {
                Ok(n) => n,
                Err(_) => break Flow::Normal,
            };
        };
        if !already_existed {
            self.store.frame_mut(frame).remove(var);
        }
        Ok(flow)
    }

    fn exec_while(&mut self, cond: &Spanned<Expr>, body: &Block) -> PrResult<Flow> {
        loop {
            if !self.eval_expr(cond)?.as_boolean().expect("checker guaranteed BOOLEAN") {
                return Ok(Flow::Normal);
            }
            match self.exec_block(body)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
    }

    fn exec_repeat(&mut self, body: &Block, cond: &Spanned<Expr>) -> PrResult<Flow> {
        loop {
            match self.exec_block(body)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
            if self.eval_expr(cond)?.as_boolean().expect("checker guaranteed BOOLEAN") {
                return Ok(Flow::Normal);
            }
        }
    }

    fn exec_input(&mut self, target: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let lv = self.resolve_lvalue(target)?;
        let ty = self.static_type_of_lvalue(target, line)?;
        let token = self.input.next_token().ok_or_else(|| PrescribeError::runtime(line, "INPUT: no more input available"))?;
        let enum_members = match &ty {
            Type::Enum(name) => self.checked.enum_members.get(name).map(|v| v.as_slice()),
            _ => None,
        };
        let v = stdlib::parse_input_token(line, &token, &ty, enum_members)?;
        with_line(line, lv.set(&mut self.store, v))?;
        Ok(())
    }

    // -------------------------------------------------------------
    // File statements
    // -------------------------------------------------------------

    fn handle_lvalue(&self, handle: &str) -> Lvalue {
        Lvalue::Var { frame: self.top_frame(), name: handle.to_string() }
    }

    fn exec_openfile(&mut self, handle: &str, path: &Spanned<Expr>, mode: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let path_v = self.eval_expr(path)?;
        let path_s = path_v.as_string().expect("checker guaranteed STRING").to_string();
        let mode_v = self.eval_expr(mode)?;
        let mode_s = mode_v.as_string().expect("checker guaranteed STRING").to_string();
        let ty = self.static_type_of_lvalue_name(handle, line)?;
        let id = match ty {
            Type::TextFile => {
                let fmode = FileMode::parse(line, &mode_s)?;
                let h = TextFileHandle::open(line, &path_s, fmode)?;
                self.files.insert(FileHandle::Text(h))
            }
            Type::RandomFile(elem) => {
                if !mode_s.eq_ignore_ascii_case("RANDOM") {
                    return Err(PrescribeError::file(line, "RANDOMFILE must be opened with mode RANDOM"));
                }
                let template = self.default_value_for_type(&elem, line)?;
                let record_size = fileio::record_byte_size(&template)
                    .ok_or_else(|| PrescribeError::runtime(line, "record type has no fixed byte size"))?;
                self.files.insert(FileHandle::Random(RandomFileHandle::open(&path_s, record_size.max(1))))
            }
            other => return Err(PrescribeError::type_error(line, format!("`{}` is not a file handle type", other))),
        };
        let lv = self.handle_lvalue(handle);
        let value = match ty {
            Type::TextFile => Value::TextFile(Some(id)),
            _ => Value::RandomFile(Some(id)),
        };
        with_line(line, lv.set(&mut self.store, value))?;
        Ok(())
    }

    fn file_id(&self, handle: &str, line: usize) -> PrResult<(usize, bool)> {
        let lv = self.handle_lvalue(handle);
        match with_line(line, lv.get(&self.store))? {
            Value::TextFile(Some(id)) => Ok((id, false)),
            Value::RandomFile(Some(id)) => Ok((id, true)),
            Value::TextFile(None) | Value::RandomFile(None) => Err(PrescribeError::file(line, format!("`{}` has not been opened", handle))),
            _ => Err(PrescribeError::runtime(line, format!("`{}` is not a file handle", handle))),
        }
    }

    fn exec_closefile(&mut self, handle: &str, line: usize) -> PrResult<()> {
        let (id, is_random) = self.file_id(handle, line)?;
        if is_random {
            self.files.random_mut(line, id)?.close(line)?;
        } else {
            self.files.text_mut(line, id)?.close(line)?;
        }
        let lv = self.handle_lvalue(handle);
        let closed = if is_random { Value::RandomFile(None) } else { Value::TextFile(None) };
        with_line(line, lv.set(&mut self.store, closed))?;
        Ok(())
    }

    fn exec_readfile(&mut self, handle: &str, target: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let (id, _) = self.file_id(handle, line)?;
        let text = self.files.text_mut(line, id)?.read_line(line)?;
        let lv = self.resolve_lvalue(target)?;
        let ty = self.static_type_of_lvalue(target, line)?;
        let enum_members = match &ty {
            Type::Enum(name) => self.checked.enum_members.get(name).map(|v| v.as_slice()),
            _ => None,
        };
        let v = stdlib::parse_input_token(line, &text, &ty, enum_members)?;
        with_line(line, lv.set(&mut self.store, v))?;
        Ok(())
    }

    fn exec_writefile(&mut self, handle: &str, value: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let (id, _) = self.file_id(handle, line)?;
        let v = self.eval_expr(value)?;
        let text = v.to_output_string().ok_or_else(|| PrescribeError::type_error(line, format!("cannot WRITEFILE a {}", v.type_name())))?;
        self.files.text_mut(line, id)?.write_line(line, text)?;
        Ok(())
    }

    fn exec_seek(&mut self, handle: &str, position: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let (id, _) = self.file_id(handle, line)?;
        let k = self.eval_expr(position)?.as_integer().expect("checker guaranteed INTEGER");
        self.files.random_mut(line, id)?.seek(line, k)
    }

    fn exec_getrecord(&mut self, handle: &str, target: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let (id, _) = self.file_id(handle, line)?;
        let lv = self.resolve_lvalue(target)?;
        let template = with_line(line, lv.get(&self.store))?;
        let v = self.files.random_mut(line, id)?.get_record(line, &template)?;
        with_line(line, lv.set(&mut self.store, v))?;
        Ok(())
    }

    fn exec_putrecord(&mut self, handle: &str, value: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let (id, _) = self.file_id(handle, line)?;
        let v = self.eval_expr(value)?;
        self.files.random_mut(line, id)?.put_record(line, &v)
    }

    // -------------------------------------------------------------
    // SUPER(...) — constructor chaining
    // -------------------------------------------------------------

    fn exec_super_call(&mut self, args: &[Spanned<Expr>], line: usize) -> PrResult<()> {
        let class_name = self.current_class.clone().expect("checker guaranteed SUPER only inside a constructor");
        let base = self.checked.classes[&class_name].base.clone().expect("checker guaranteed a base class exists");
        let (params, body) = self
            .index
            .class_constructors
            .get(base.as_str())
            .copied()
            .map(|(p, b)| (p.to_vec(), b))
            .unwrap_or((Vec::new(), EMPTY_BLOCK.as_ref()));
        self.invoke(&params, body, None, args, Some(base), self.current_object, line)?;
        Ok(())
    }

    // -------------------------------------------------------------
    // Calls — free procedures/functions, implicit/explicit/SUPER methods
    // -------------------------------------------------------------

    fn call_callable(&mut self, callee: &Spanned<Expr>, args: &[Spanned<Expr>], line: usize) -> PrResult<Option<Value>> {
        match &callee.value {
            Expr::Name(fname) if is_builtin_name(fname) => self.eval_builtin(fname, args, line).map(Some),
            Expr::Name(fname) => {
                if let Some((params, body)) = self.index.procedures.get(fname.as_str()).copied() {
                    return self.invoke(params, body, None, args, None, None, line);
                }
                if let Some((params, body)) = self.index.functions.get(fname.as_str()).copied() {
                    let return_ty = function_return_ty(self.checked, fname);
                    return self.invoke(params, body, return_ty, args, None, None, line);
                }
                // Implicit bare-name method call inside a method body:
                // virtual dispatch starting at the receiver's actual
                // runtime class, same as `obj.Method()` would be.
                let object_id = self.current_object.expect("checker guaranteed this name resolves somewhere");
                let runtime_class = self.store.heap.object(object_id).expect("object still alive").class_name.clone();
                self.dispatch_method(&runtime_class, fname, object_id, args, line)
            }
            Expr::Field { base, name } => {
                if matches!(&base.value, Expr::Name(n) if n == "SUPER") {
                    let class_name = self.current_class.clone().expect("checker guaranteed SUPER inside a class");
                    let base_class = self.checked.classes[&class_name].base.clone().expect("checker guaranteed a base class");
                    let object_id = self.current_object.expect("checker guaranteed SUPER inside a method");
                    return self.dispatch_method(&base_class, name, object_id, args, line);
                }
                let base_v = self.eval_expr(base)?;
                let object_id = match base_v {
                    Value::ClassRef(Some(id), _) => id,
                    Value::ClassRef(None, _) => return Err(PrescribeError::runtime(line, "method call on a NULL object reference")),
                    other => return Err(PrescribeError::runtime(line, format!("cannot call a method on a {}", other.type_name()))),
                };
                let runtime_class = self.store.heap.object(object_id).expect("object still alive").class_name.clone();
                self.dispatch_method(&runtime_class, name, object_id, args, line)
            }
            _ => Err(PrescribeError::runtime(line, "expression is not callable")),
        }
    }

    fn dispatch_method(&mut self, start_class: &str, method_name: &str, object_id: usize, args: &[Spanned<Expr>], line: usize) -> PrResult<Option<Value>> {
        let (m, owner) = checker::find_method(&self.checked.classes, start_class, method_name)
            .ok_or_else(|| PrescribeError::name(line, format!("`{}` has no method `{}`", start_class, method_name)))?;
        let (params, body) = self.index.class_methods[owner.as_str()][method_name];
        self.invoke(params, body, m.return_ty.as_ref(), args, Some(owner), Some(object_id), line)
    }

    /// Evaluates arguments in the caller's frame, pushes a new frame, binds
    /// parameters (copying BYVALUE, aliasing BYREF), swaps in the callable's
    /// class/object context, runs its body, and reconciles the resulting
    /// `Flow` against `return_ty`.
    fn invoke(
        &mut self,
        params: &[Param],
        body: &Block,
        return_ty: Option<&Type>,
        args: &[Spanned<Expr>],
        new_current_class: Option<String>,
        new_current_object: Option<usize>,
        line: usize,
    ) -> PrResult<Option<Value>> {
        self.call_depth += 1;
        if self.call_depth > self.config.max_call_depth {
            self.call_depth -= 1;
            return Err(PrescribeError::runtime(line, "exceeded the maximum call depth"));
        }
        let bound: Vec<BoundArg> = params
            .iter()
            .zip(args)
            .map(|(p, a)| -> PrResult<BoundArg> {
                match p.mode {
                    ParamMode::ByValue => Ok(BoundArg::Value(self.eval_expr(a)?)),
                    ParamMode::ByReference => Ok(BoundArg::Alias(self.resolve_lvalue(a)?)),
                }
            })
            .collect::<PrResult<_>>()?;

        self.push_frame();
        let frame = self.top_frame();
        for (p, b) in params.iter().zip(bound) {
            let ty = self.type_node_to_type(&p.ty, line)?;
            match b {
                BoundArg::Value(v) => {
                    self.store.frame_mut(frame).declare(&p.name, v);
                }
                BoundArg::Alias(lv) => {
                    self.store.frame_mut(frame).declare_alias(&p.name, lv);
                }
            }
            self.var_types[frame].insert(p.name.clone(), ty);
        }

        let prev_class = std::mem::replace(&mut self.current_class, new_current_class);
        let prev_object = std::mem::replace(&mut self.current_object, new_current_object);
        let result = self.exec_block(body);
        self.current_class = prev_class;
        self.current_object = prev_object;
        self.pop_frame();
        self.call_depth -= 1;

        let flow = result?;
        match (return_ty, flow) {
            (Some(_), Flow::Return(Some(v))) => Ok(Some(v)),
            (Some(_), _) => Err(PrescribeError::runtime(line, "function reached the end of its body without executing RETURN")),
            (None, Flow::Return(Some(_))) => Err(PrescribeError::runtime(line, "procedure returned a value")),
            (None, _) => Ok(None),
        }
    }

    // -------------------------------------------------------------
    // Object construction
    // -------------------------------------------------------------

    fn construct_object(&mut self, class_name: &str, args: &Option<Vec<Spanned<Expr>>>, line: usize) -> PrResult<Value> {
        let mut fields = HashMap::new();
        let mut chain = Vec::new();
        let mut cur = Some(class_name.to_string());
        while let Some(c) = cur {
            let info = self.checked.classes.get(&c).expect("checker guaranteed the class exists");
            chain.push((c.clone(), info.clone()));
            cur = info.base.clone();
        }
        for (_, info) in chain.iter().rev() {
            for (fname, fty, _) in &info.fields {
                let v = self.default_value_for_type(fty, line)?;
                fields.insert(fname.clone(), v);
            }
        }
        let object_id = self.alloc_object(line, ClassObject { class_name: class_name.to_string(), fields })?;
        let has_own_ctor = self.checked.classes[class_name].constructor.is_some();
        if has_own_ctor {
            let (params, body) = self.index.class_constructors[class_name];
            self.invoke(params, body, None, args.as_deref().unwrap_or(&[]), Some(class_name.to_string()), Some(object_id), line)?;
        }
        Ok(Value::ClassRef(Some(object_id), class_name.to_string()))
    }

    // -------------------------------------------------------------
    // Lvalues
    // -------------------------------------------------------------

    fn resolve_lvalue(&mut self, expr: &Spanned<Expr>) -> PrResult<Lvalue> {
        let line = expr.span.start_line;
        match &expr.value {
            Expr::Name(name) => self.resolve_name_lvalue(name, line),
            Expr::Index { base, indices } => {
                let base_lv = self.resolve_lvalue(base)?;
                let idx_values: Vec<i32> = indices
                    .iter()
                    .map(|i| self.eval_expr(i).map(|v| v.as_integer().expect("checker guaranteed INTEGER")))
                    .collect::<PrResult<_>>()?;
                Ok(Lvalue::Index { base: Box::new(base_lv), indices: idx_values })
            }
            Expr::Field { base, name } => {
                // A field access through a class reference targets the
                // object's own heap-resident fields directly, bypassing
                // the record-field `Lvalue::Field` path (which expects the
                // base to resolve to a `Value::Record`, not a
                // `Value::ClassRef`).
                let bt = self.static_expr_type(base, line)?;
                if matches!(bt, Type::Class(_)) {
                    let base_v = self.eval_expr(base)?;
                    let object_id = match base_v {
                        Value::ClassRef(Some(id), _) => id,
                        Value::ClassRef(None, _) => return Err(PrescribeError::runtime(line, "field access on a NULL object reference")),
                        other => return Err(PrescribeError::runtime(line, format!("cannot access a field on a {}", other.type_name()))),
                    };
                    Ok(Lvalue::ClassField { object_id, name: name.clone() })
                } else {
                    let base_lv = self.resolve_lvalue(base)?;
                    Ok(Lvalue::Field { base: Box::new(base_lv), name: name.clone() })
                }
            }
            Expr::Deref(inner) => {
                let inner_lv = self.resolve_lvalue(inner)?;
                Ok(Lvalue::Deref { pointer: Box::new(inner_lv), line })
            }
            _ => Err(PrescribeError::runtime(line, "expression is not an lvalue")),
        }
    }

    /// Bare names resolve three ways: a local/parameter cell in the current
    /// frame, an implicit `self`-field inside a method body, or (for
    /// `SUPER` field targets, handled by callers directly) nothing here.
    fn resolve_name_lvalue(&mut self, name: &str, line: usize) -> PrResult<Lvalue> {
        let frame = self.top_frame();
        if self.store.frame(frame).has(name) {
            return Ok(Lvalue::Var { frame, name: name.to_string() });
        }
        if let Some(object_id) = self.current_object {
            let class_name = self.current_class.clone().expect("an object implies a current class");
            if checker::find_field(&self.checked.classes, &class_name, name).is_some() {
                return Ok(Lvalue::ClassField { object_id, name: name.to_string() });
            }
        }
        Err(PrescribeError::name(line, format!("`{}` is not defined", name)))
    }

    // -------------------------------------------------------------
    // Expression evaluation
    // -------------------------------------------------------------

    fn eval_expr(&mut self, expr: &Spanned<Expr>) -> PrResult<Value> {
        let line = expr.span.start_line;
        match &expr.value {
            Expr::IntLit(n) => Ok(Value::Integer(*n)),
            Expr::RealLit(x) => Ok(Value::Real(*x)),
            Expr::BoolLit(b) => Ok(Value::Boolean(*b)),
            Expr::CharLit(c) => Ok(Value::Char(*c)),
            Expr::StrLit(s) => Ok(Value::String(s.clone())),
            Expr::DateLit(s) => Ok(Value::Date(Date::parse(line, s)?)),
            Expr::Null => Ok(Value::Pointer(None)),
            Expr::Name(name) => self.eval_name(name, line),
            Expr::Binary { op, lhs, rhs } => {
                // Never short-circuits: both operands are always evaluated,
                // including for AND/OR.
                let lv = self.eval_expr(lhs)?;
                let rv = self.eval_expr(rhs)?;
                self.eval_binary(line, *op, lv, rv)
            }
            Expr::Unary { op, operand } => self.eval_unary(line, *op, operand),
            // Index/Field/Deref are read here by evaluating the base as a
            // plain value rather than through `resolve_lvalue`: the base
            // need not itself be an lvalue (`Func().Field` is a legal read
            // even though it is not a legal assignment target), and
            // evaluating it exactly once here avoids ever running a
            // side-effecting base expression twice.
            Expr::Deref(inner) => {
                let ptr_v = self.eval_expr(inner)?;
                match ptr_v {
                    Value::Pointer(Some(id)) => with_line(line, read_pointee(&self.store, id, line)),
                    Value::Pointer(None) => Err(PrescribeError::runtime(line, "null dereference")),
                    other => Err(PrescribeError::runtime(line, format!("cannot dereference a {}", other.type_name()))),
                }
            }
            Expr::Index { base, indices } => {
                let base_v = self.eval_expr(base)?;
                let idx_values: Vec<i32> = indices
                    .iter()
                    .map(|i| self.eval_expr(i).map(|v| v.as_integer().expect("checker guaranteed INTEGER")))
                    .collect::<PrResult<_>>()?;
                match base_v {
                    Value::Array { dims, elems } => {
                        let offset = value::flat_index(line, &dims, &idx_values)?;
                        Ok(elems[offset].clone())
                    }
                    other => Err(PrescribeError::runtime(line, format!("cannot index a {}", other.type_name()))),
                }
            }
            Expr::Field { base, name } => {
                let base_v = self.eval_expr(base)?;
                match base_v {
                    Value::Record(fields) => fields
                        .into_iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| PrescribeError::name(line, format!("no field `{}`", name))),
                    Value::ClassRef(Some(id), _) => self
                        .store
                        .heap
                        .object(id)
                        .and_then(|o| o.fields.get(name))
                        .cloned()
                        .ok_or_else(|| PrescribeError::name(line, format!("no field `{}`", name))),
                    Value::ClassRef(None, _) => Err(PrescribeError::runtime(line, "field access on a NULL object reference")),
                    other => Err(PrescribeError::runtime(line, format!("cannot access a field on a {}", other.type_name()))),
                }
            }
            Expr::Call { callee, args } => self
                .call_callable(callee, args, line)?
                .ok_or_else(|| PrescribeError::runtime(line, "call does not produce a value")),
            Expr::New { type_name, args } => self.eval_new(type_name, args, line),
            Expr::Eof(handle) => {
                let hname = match &handle.value {
                    Expr::Name(n) => n.clone(),
                    _ => return Err(PrescribeError::runtime(line, "EOF expects a bare file handle")),
                };
                let (id, is_random) = self.file_id(&hname, line)?;
                let eof = if is_random {
                    self.files.random_mut(line, id)?.is_eof()
                } else {
                    self.files.text_mut(line, id)?.is_eof()
                };
                Ok(Value::Boolean(eof))
            }
        }
    }

    fn eval_name(&mut self, name: &str, line: usize) -> PrResult<Value> {
        // Enum member constants (and CONSTANT declarations) have no
        // backing Frame cell — the checker folds them straight into
        // `const_values` with no `Decl::Const`-shaped counterpart for an
        // enum member, so they must be checked before frame lookup.
        if let Some(v) = self.checked.const_values.get(name) {
            if !self.store.frame(self.top_frame()).has(name) {
                return Ok(v.clone());
            }
        }
        let lv = self.resolve_name_lvalue(name, line)?;
        with_line(line, lv.get(&self.store))
    }

    fn eval_unary(&mut self, line: usize, op: UnOp, operand: &Spanned<Expr>) -> PrResult<Value> {
        if op == UnOp::AddressOf {
            // `@lvalue` aliases the operand's own storage rather than
            // copying it: the cell→id mapping is memoized so repeated
            // `@X` returns the same pointer, and a write through it
            // (`^p <- ...`) is visible by reading `X` afterward.
            let lv = self.resolve_lvalue(operand)?;
            if let Some(&id) = self.address_cache.get(&lv) {
                return Ok(Value::Pointer(Some(id)));
            }
            let id = self.alloc_alias(line, lv.clone())?;
            self.address_cache.insert(lv, id);
            return Ok(Value::Pointer(Some(id)));
        }
        let v = self.eval_expr(operand)?;
        match (op, v) {
            (UnOp::Plus, Value::Integer(n)) => Ok(Value::Integer(n)),
            (UnOp::Plus, Value::Real(x)) => Ok(Value::Real(x)),
            (UnOp::Neg, Value::Integer(n)) => Ok(Value::Integer(numeric::neg_i32(line, n)?)),
            (UnOp::Neg, Value::Real(x)) => Ok(Value::Real(numeric::neg_real(line, x)?)),
            (UnOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (op, v) => Err(PrescribeError::runtime(line, format!("{:?} is not defined for a {}", op, v.type_name()))),
        }
    }

    fn eval_binary(&mut self, line: usize, op: BinOp, l: Value, r: Value) -> PrResult<Value> {
        use Value::*;
        match (op, l, r) {
            (BinOp::Add, Integer(a), Integer(b)) => Ok(Integer(numeric::add_i32(line, a, b)?)),
            (BinOp::Add, Real(a), Real(b)) => Ok(Real(numeric::add_real(line, a, b)?)),
            (BinOp::Sub, Integer(a), Integer(b)) => Ok(Integer(numeric::sub_i32(line, a, b)?)),
            (BinOp::Sub, Real(a), Real(b)) => Ok(Real(numeric::sub_real(line, a, b)?)),
            (BinOp::Mul, Integer(a), Integer(b)) => Ok(Integer(numeric::mul_i32(line, a, b)?)),
            (BinOp::Mul, Real(a), Real(b)) => Ok(Real(numeric::mul_real(line, a, b)?)),
            (BinOp::Div, Integer(a), Integer(b)) => Ok(Real(numeric::div_real(line, a as f64, b as f64)?)),
            (BinOp::Div, Real(a), Real(b)) => Ok(Real(numeric::div_real(line, a, b)?)),
            (BinOp::IDiv, Integer(a), Integer(b)) => Ok(Integer(numeric::euclid_div_mod(line, a, b)?.0)),
            (BinOp::Mod, Integer(a), Integer(b)) => Ok(Integer(numeric::euclid_div_mod(line, a, b)?.1)),
            (BinOp::Concat, a, b) => {
                let at = a.to_output_string().ok_or_else(|| PrescribeError::runtime(line, "operand is not concatenable"))?;
                let bt = b.to_output_string().ok_or_else(|| PrescribeError::runtime(line, "operand is not concatenable"))?;
                Ok(String(format!("{}{}", at, bt)))
            }
            (BinOp::And, Boolean(a), Boolean(b)) => Ok(Boolean(a && b)),
            (BinOp::Or, Boolean(a), Boolean(b)) => Ok(Boolean(a || b)),
            (BinOp::Eq, a, b) => self.compare_values(line, &a, &b).map(|o| Boolean(o == std::cmp::Ordering::Equal)),
            (BinOp::Ne, a, b) => self.compare_values(line, &a, &b).map(|o| Boolean(o != std::cmp::Ordering::Equal)),
            (BinOp::Lt, a, b) => self.compare_values(line, &a, &b).map(|o| Boolean(o == std::cmp::Ordering::Less)),
            (BinOp::Le, a, b) => self.compare_values(line, &a, &b).map(|o| Boolean(o != std::cmp::Ordering::Greater)),
            (BinOp::Gt, a, b) => self.compare_values(line, &a, &b).map(|o| Boolean(o == std::cmp::Ordering::Greater)),
            (BinOp::Ge, a, b) => self.compare_values(line, &a, &b).map(|o| Boolean(o != std::cmp::Ordering::Less)),
            (BinOp::In, Integer(member), Set { members, .. }) => Ok(Boolean(members.contains(&member))),
            (BinOp::Union, Set { base_enum, members: a }, Set { members: b, .. }) => {
                Ok(Set { base_enum, members: a.union(&b).copied().collect() })
            }
            (BinOp::Intersect, Set { base_enum, members: a }, Set { members: b, .. }) => {
                Ok(Set { base_enum, members: a.intersection(&b).copied().collect() })
            }
            (BinOp::Diff, Set { base_enum, members: a }, Set { members: b, .. }) => {
                Ok(Set { base_enum, members: a.difference(&b).copied().collect() })
            }
            (op, a, b) => Err(PrescribeError::runtime(line, format!("{:?} is not defined for {} and {}", op, a.type_name(), b.type_name()))),
        }
    }

    fn compare_values(&self, line: usize, a: &Value, b: &Value) -> PrResult<std::cmp::Ordering> {
        use Value::*;
        match (a, b) {
            (Integer(x), Integer(y)) => Ok(x.cmp(y)),
            (Real(x), Real(y)) => x.partial_cmp(y).ok_or_else(|| PrescribeError::runtime(line, "cannot compare NaN")),
            (Char(x), Char(y)) => Ok(x.cmp(y)),
            (String(x), String(y)) => Ok(x.cmp(y)),
            (Date(x), Date(y)) => Ok(x.cmp(y)),
            (Boolean(x), Boolean(y)) => Ok(x.cmp(y)),
            _ => Err(PrescribeError::runtime(line, format!("{} and {} are not comparable", a.type_name(), b.type_name()))),
        }
    }

    fn eval_new(&mut self, type_name: &str, args: &Option<Vec<Spanned<Expr>>>, line: usize) -> PrResult<Value> {
        if self.checked.classes.contains_key(type_name) {
            return self.construct_object(type_name, args, line);
        }
        let inner_ty = self
            .checked
            .type_aliases
            .get(type_name)
            .cloned()
            .or_else(|| basic_type_by_keyword(type_name))
            .ok_or_else(|| PrescribeError::name(line, format!("unknown type `{}`", type_name)))?;
        let inner_value = self.default_value_for_type(&inner_ty, line)?;
        let id = self.alloc_pointee(line, inner_value)?;
        Ok(Value::Pointer(Some(id)))
    }

    // -------------------------------------------------------------
    // Built-in functions
    // -------------------------------------------------------------

    fn eval_builtin(&mut self, name: &str, args: &[Spanned<Expr>], line: usize) -> PrResult<Value> {
        if name == "ENUMVALUE" {
            let type_name = match &args[0].value {
                Expr::Name(n) => n.clone(),
                _ => return Err(PrescribeError::runtime(line, "ENUMVALUE's first argument must be an enum type name")),
            };
            let member_count = self.checked.enum_members.get(&type_name).map(|m| m.len()).unwrap_or(0);
            let k = self.eval_expr(&args[1])?.as_integer().expect("checker guaranteed INTEGER");
            return stdlib::enum_value(line, member_count, k);
        }
        let vals: Vec<Value> = args.iter().map(|a| self.eval_expr(a)).collect::<PrResult<_>>()?;
        match (name, vals.as_slice()) {
            ("LENGTH", [Value::String(s)]) => Ok(stdlib::length(s)),
            ("RIGHT", [Value::String(s), Value::Integer(n)]) => stdlib::right(line, s, *n),
            ("MID", [Value::String(s), Value::Integer(start), Value::Integer(n)]) => stdlib::mid(line, s, *start, *n),
            ("LCASE", [Value::String(s)]) => Ok(stdlib::lcase(s)),
            ("UCASE", [Value::String(s)]) => Ok(stdlib::ucase(s)),
            ("INT", [Value::Real(x)]) => Ok(stdlib::int_of_real(*x)),
            ("REAL", [Value::Integer(n)]) => Ok(stdlib::real_of_int(*n)),
            ("STRING", [v]) => stdlib::string_of(line, v),
            ("CHAR", [Value::Integer(n)]) => stdlib::char_of(line, *n),
            ("BOOLEAN", [Value::String(s)]) => stdlib::boolean_of(line, s),
            ("DATE", [Value::String(s)]) => stdlib::date_of(line, s),
            ("ORD", [Value::Integer(n)]) => Ok(stdlib::ord_of_enum(*n)),
            ("SIZE", [Value::Set { members, .. }]) => Ok(stdlib::size_of_set(members)),
            ("RAND", []) => Ok(Value::Real(self.rng.next())),
            _ => Err(PrescribeError::runtime(line, format!("{} called with the wrong argument types", name))),
        }
    }

    // -------------------------------------------------------------
    // Static-type bookkeeping (for INPUT/READFILE enum disambiguation)
    // -------------------------------------------------------------

    fn static_type_of_lvalue_name(&self, name: &str, line: usize) -> PrResult<Type> {
        let frame = self.top_frame();
        if let Some(t) = self.var_types[frame].get(name) {
            return Ok(t.clone());
        }
        if let Some(object_id) = self.current_object {
            let class_name = self.current_class.clone().expect("an object implies a current class");
            if let Some((ty, _, _)) = checker::find_field(&self.checked.classes, &class_name, name) {
                let _ = object_id;
                return Ok(ty);
            }
        }
        Err(PrescribeError::name(line, format!("`{}` has no recorded type", name)))
    }

    /// Mirrors the checker's lvalue-type resolution in miniature, but
    /// against the interpreter's runtime `var_types` table instead of a
    /// `SymbolTable` (which only has top-level/global entries once
    /// checking finishes, not a live local scope for the code currently
    /// executing).
    fn static_type_of_lvalue(&mut self, expr: &Spanned<Expr>, line: usize) -> PrResult<Type> {
        match &expr.value {
            Expr::Name(n) => self.static_type_of_lvalue_name(n, line),
            Expr::Index { base, .. } => match self.static_type_of_lvalue(base, line)? {
                Type::Array { elem, .. } => Ok(*elem),
                other => Err(PrescribeError::runtime(line, format!("cannot index a {}", other))),
            },
            Expr::Field { base, name } => match self.static_type_of_lvalue(base, line)? {
                Type::Record(fields) => fields
                    .into_iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, t)| t)
                    .ok_or_else(|| PrescribeError::name(line, format!("no field `{}`", name))),
                Type::Class(class_name) => checker::find_field(&self.checked.classes, &class_name, name)
                    .map(|(t, _, _)| t)
                    .ok_or_else(|| PrescribeError::name(line, format!("`{}` has no field `{}`", class_name, name))),
                other => Err(PrescribeError::runtime(line, format!("cannot access a field on a {}", other))),
            },
            Expr::Deref(inner) => match self.static_type_of_lvalue(inner, line)? {
                Type::Pointer(inner_ty) => Ok(*inner_ty),
                other => Err(PrescribeError::runtime(line, format!("cannot dereference a {}", other))),
            },
            _ => Err(PrescribeError::runtime(line, "expression is not an lvalue")),
        }
    }

    fn static_expr_type(&mut self, expr: &Spanned<Expr>, line: usize) -> PrResult<Type> {
        self.static_type_of_lvalue(expr, line).or_else(|_| {
            // Non-lvalue bases (e.g. a function call returning an object)
            // still need their type for field/method dispatch; re-derive it
            // structurally the cheap way, from the runtime value itself.
            let v = self.eval_expr(expr)?;
            Ok(value_runtime_type(&v))
        })
    }

    // -------------------------------------------------------------
    // Type / default-value resolution from the AST
    // -------------------------------------------------------------

    fn type_node_to_type(&mut self, tn: &TypeNode, line: usize) -> PrResult<Type> {
        match tn {
            TypeNode::Basic(b) => Ok(checker::basic_to_type(*b)),
            TypeNode::Array { dims, elem } => {
                let elem_ty = self.type_node_to_type(elem, line)?;
                Ok(Type::Array { rank: dims.len(), elem: Box::new(elem_ty) })
            }
            TypeNode::Record(fields) => {
                let mut out = Vec::new();
                for f in fields {
                    out.push((f.name.clone(), self.type_node_to_type(&f.ty, line)?));
                }
                Ok(Type::Record(out))
            }
            TypeNode::Enum(_) => Err(PrescribeError::runtime(line, "an inline enum literal has no standalone type")),
            TypeNode::SetOfEnum(base) => Ok(Type::SetOfEnum(base.clone())),
            TypeNode::Pointer(inner) => Ok(Type::Pointer(Box::new(self.type_node_to_type(inner, line)?))),
            TypeNode::TextFile => Ok(Type::TextFile),
            TypeNode::RandomFile(inner) => Ok(Type::RandomFile(Box::new(self.type_node_to_type(inner, line)?))),
            TypeNode::Named(name) => {
                if let Some(t) = self.checked.type_aliases.get(name) {
                    return Ok(t.clone());
                }
                if self.checked.classes.contains_key(name) {
                    return Ok(Type::Class(name.clone()));
                }
                Err(PrescribeError::name(line, format!("`{}` is not a known type", name)))
            }
        }
    }

    /// Builds the default-valued runtime `Value` for a `TypeNode` exactly
    /// as written at its declaration site, re-evaluating `ARRAY` bound
    /// expressions fresh (they may reference runtime variables, not just
    /// compile-time constants) — needed because the semantic `Type::Array`
    /// alone has lost the original bound expressions by the time this
    /// runs (see `types.rs`: it tracks only rank).
    fn default_value_for_type_node(&mut self, tn: &TypeNode, line: usize) -> PrResult<Value> {
        match tn {
            TypeNode::Array { dims, elem } => {
                let mut bounds = Vec::with_capacity(dims.len());
                for (lo, hi) in dims {
                    let lo_v = self.eval_expr(lo)?.as_integer().expect("checker guaranteed INTEGER");
                    let hi_v = self.eval_expr(hi)?.as_integer().expect("checker guaranteed INTEGER");
                    bounds.push((lo_v, hi_v));
                }
                let elem_ty = self.type_node_to_type(elem, line)?;
                let count: usize = bounds.iter().map(|(lo, hi)| (*hi - *lo + 1).max(0) as usize).product();
                let mut elems = Vec::with_capacity(count);
                for _ in 0..count {
                    elems.push(self.default_value_for_type_node(elem, line)?);
                }
                let _ = elem_ty;
                Ok(Value::Array { dims: bounds, elems })
            }
            TypeNode::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    out.push((f.name.clone(), self.default_value_for_type_node(&f.ty, line)?));
                }
                Ok(Value::Record(out))
            }
            TypeNode::Named(name) => {
                if let Some(inner) = self.index.type_decls.get(name.as_str()).copied() {
                    return self.default_value_for_type_node(inner, line);
                }
                if self.checked.classes.contains_key(name) {
                    return Ok(Value::ClassRef(None, name.clone()));
                }
                let ty = self.type_node_to_type(tn, line)?;
                self.default_value_for_type(&ty, line)
            }
            other => {
                let ty = self.type_node_to_type(other, line)?;
                self.default_value_for_type(&ty, line)
            }
        }
    }

    /// Default value from a semantic `Type`. Never called directly on an
    /// array-shaped type — array defaults always go through
    /// `default_value_for_type_node`, which has the bound expressions;
    /// `value::default_for_type` intentionally panics on `Type::Array` to
    /// catch exactly this mistake.
    fn default_value_for_type(&mut self, ty: &Type, line: usize) -> PrResult<Value> {
        match ty {
            Type::Array { .. } => Err(PrescribeError::runtime(line, "array type has no bounds outside its declaration site")),
            Type::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, fty) in fields {
                    out.push((name.clone(), self.default_value_for_type(fty, line)?));
                }
                Ok(Value::Record(out))
            }
            Type::Class(name) => Ok(Value::ClassRef(None, name.clone())),
            other => Ok(value::default_for_type(other)),
        }
    }
}

fn value_in_range(v: &Value, lo: &Value, hi: &Value) -> bool {
    use Value::*;
    match (v, lo, hi) {
        (Integer(v), Integer(lo), Integer(hi)) => lo <= v && v <= hi,
        (Char(v), Char(lo), Char(hi)) => lo <= v && v <= hi,
        (Date(v), Date(lo), Date(hi)) => lo <= v && v <= hi,
        _ => false,
    }
}

fn value_runtime_type(v: &Value) -> Type {
    match v {
        Value::Integer(_) => Type::Integer,
        Value::Real(_) => Type::Real,
        Value::Boolean(_) => Type::Boolean,
        Value::Char(_) => Type::Char,
        Value::String(_) => Type::String,
        Value::Date(_) => Type::Date,
        Value::Array { elems, .. } => Type::Array { rank: 1, elem: Box::new(elems.first().map(value_runtime_type).unwrap_or(Type::Integer)) },
        Value::Record(fields) => Type::Record(fields.iter().map(|(n, v)| (n.clone(), value_runtime_type(v))).collect()),
        Value::Set { base_enum, .. } => Type::SetOfEnum(base_enum.clone()),
        Value::Pointer(_) => Type::Pointer(Box::new(Type::Null)),
        Value::ClassRef(_, name) => Type::Class(name.clone()),
        Value::TextFile(_) => Type::TextFile,
        Value::RandomFile(_) => Type::RandomFile(Box::new(Type::Null)),
    }
}

fn basic_type_by_keyword(name: &str) -> Option<Type> {
    Some(match name {
        "INTEGER" => Type::Integer,
        "REAL" => Type::Real,
        "BOOLEAN" => Type::Boolean,
        "CHAR" => Type::Char,
        "STRING" => Type::String,
        "DATE" => Type::Date,
        _ => return None,
    })
}

fn function_return_ty<'a>(checked: &'a CheckResult, name: &str) -> Option<&'a Type> {
    let sym = checked.globals.lookup(name)?;
    if sym.kind == SymbolKind::Func {
        sym.ty.as_ref()
    } else {
        None
    }
}

fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "LENGTH" | "RIGHT" | "MID" | "LCASE" | "UCASE" | "INT" | "REAL" | "STRING" | "CHAR" | "BOOLEAN" | "DATE" | "ORD" | "ENUMVALUE" | "SIZE" | "RAND"
    )
}

thread_local! {
    static EMPTY_BLOCK: Vec<Spanned<Item>> = Vec::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;

    fn run_src(src: &str, stdin: &str) -> PrResult<String> {
        let tokens = lexer::tokenize(src).expect("lex should succeed");
        let program = parser::parse(&tokens).expect("parse should succeed");
        let config = RunConfig::default();
        let mut input = WhitespaceTokenizer::new(stdin);
        run(&program, &mut input, &config).map(|o| o.output)
    }

    #[test]
    fn test_output_integer() {
        let out = run_src("PROGRAM P\nOUTPUT 42\nENDPROGRAM\n", "").unwrap();
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_average_of_n_scores() {
        let src = "PROGRAM P\n\
                   DECLARE N : INTEGER\n\
                   DECLARE Total : INTEGER\n\
                   DECLARE I : INTEGER\n\
                   DECLARE Score : INTEGER\n\
                   INPUT N\n\
                   Total <- 0\n\
                   FOR I <- 1 TO N\n\
                   INPUT Score\n\
                   Total <- Total + Score\n\
                   NEXT I\n\
                   OUTPUT Total / N\n\
                   ENDPROGRAM\n";
        let out = run_src(src, "3 10 20 30").unwrap();
        assert_eq!(out, "20\n");
    }

    #[test]
    fn test_euclidean_mod_is_always_nonnegative() {
        let out = run_src("PROGRAM P\nOUTPUT -7 MOD 3\nENDPROGRAM\n", "").unwrap();
        assert_eq!(out, "2\n");
    }

    #[test]
    fn test_and_or_do_not_short_circuit() {
        let src = "PROGRAM P\n\
                   FUNCTION Boom() RETURNS BOOLEAN\n\
                   OUTPUT \"boom\"\n\
                   RETURN TRUE\n\
                   ENDFUNCTION\n\
                   IF FALSE AND Boom() THEN\n\
                   OUTPUT \"unreachable\"\n\
                   ENDIF\n\
                   ENDPROGRAM\n";
        let out = run_src(src, "").unwrap();
        assert_eq!(out, "boom\n");
    }

    #[test]
    fn test_null_dereference_is_runtime_error() {
        let src = "PROGRAM P\nDECLARE P : POINTER TO INTEGER\nOUTPUT ^P\nENDPROGRAM\n";
        let err = run_src(src, "").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::RuntimeError);
    }

    #[test]
    fn test_address_of_aliases_the_original_variable() {
        let src = "PROGRAM P\n\
                   DECLARE X : INTEGER\n\
                   DECLARE Ptr : POINTER TO INTEGER\n\
                   X <- 5\n\
                   Ptr <- @X\n\
                   ^Ptr <- 99\n\
                   OUTPUT X\n\
                   ENDPROGRAM\n";
        let out = run_src(src, "").unwrap();
        assert_eq!(out, "99\n");
    }

    #[test]
    fn test_address_of_is_memoized_across_evaluations() {
        let src = "PROGRAM P\n\
                   DECLARE X : INTEGER\n\
                   DECLARE A : POINTER TO INTEGER\n\
                   DECLARE B : POINTER TO INTEGER\n\
                   X <- 1\n\
                   A <- @X\n\
                   B <- @X\n\
                   ^A <- 7\n\
                   OUTPUT ^B\n\
                   ENDPROGRAM\n";
        let out = run_src(src, "").unwrap();
        assert_eq!(out, "7\n");
    }

    #[test]
    fn test_class_dispatch_is_virtual() {
        let src = "PROGRAM P\n\
                   CLASS Animal\n\
                   PUBLIC\n\
                   FUNCTION Speak() RETURNS STRING\n\
                   RETURN \"...\"\n\
                   ENDFUNCTION\n\
                   FUNCTION Greet() RETURNS STRING\n\
                   RETURN Speak()\n\
                   ENDFUNCTION\n\
                   ENDCLASS\n\
                   CLASS Dog EXTENDS Animal\n\
                   PUBLIC\n\
                   FUNCTION Speak() RETURNS STRING\n\
                   RETURN \"Woof\"\n\
                   ENDFUNCTION\n\
                   ENDCLASS\n\
                   DECLARE A : Dog\n\
                   A <- NEW Dog()\n\
                   OUTPUT A.Greet()\n\
                   ENDPROGRAM\n";
        let out = run_src(src, "").unwrap();
        assert_eq!(out, "Woof\n");
    }

    #[test]
    fn test_for_loop_counter_locked_against_byref_alias() {
        let src = "PROGRAM P\n\
                   PROCEDURE Bump(BYREF X : INTEGER)\n\
                   X <- X + 1\n\
                   ENDPROCEDURE\n\
                   FOR I <- 1 TO 3\n\
                   CALL Bump(I)\n\
                   NEXT I\n\
                   ENDPROGRAM\n";
        let err = run_src(src, "").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AccessError);
    }

    #[test]
    fn test_random_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("prescribe_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("records.dat");
        let path_str = path.to_string_lossy().replace('\\', "\\\\");
        let src = format!(
            "PROGRAM P\n\
             TYPE Rec = RECORD\n\
             DECLARE N : INTEGER\n\
             ENDRECORD\n\
             DECLARE F : RANDOMFILE OF Rec\n\
             DECLARE R : Rec\n\
             OPENFILE(F, \"{path}\", \"RANDOM\")\n\
             R.N <- 42\n\
             SEEK(F, 1)\n\
             PUTRECORD(F, R)\n\
             SEEK(F, 1)\n\
             GETRECORD(F, R)\n\
             OUTPUT R.N\n\
             CLOSEFILE(F)\n\
             ENDPROGRAM\n",
            path = path_str,
        );
        let out = run_src(&src, "").unwrap();
        assert_eq!(out, "42\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
