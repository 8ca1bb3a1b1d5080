//! Symbol binding and static type checking (`spec.md` §4.4). Two phases per
//! block: pre-declare types/classes/procedures/functions so their bodies
//! may refer to each other, then visit declarations and statements in
//! order. The first violation found anywhere aborts the whole pass — there
//! is no error accumulation, unlike `gdlk::validate`'s style of collecting
//! every `ValidationError` before reporting; one `PrescribeError` out is
//! the contract the rest of the pipeline (and the CLI) was built against.
//!
//! There is no separate per-expression type table: [Checker::check_expr]
//! *returns* the type of every expression node as it walks the program, so
//! the type of any given node is known exactly once, at the point it is
//! needed, rather than being stashed somewhere for later lookup. What the
//! interpreter actually needs after checking — class layouts, enum member
//! lists, type aliases, resolved constant values, and the global scope —
//! comes back as a [CheckResult].

use crate::ast::{
    Access, BasicType, Block, CaseArm, CaseLabel, ClassMemberKind, Decl, Expr, Item, Param,
    ParamMode, Program, Stmt, TypeNode,
};
use crate::consteval::{self, ConstEnv};
use crate::date::Date;
use crate::error::{PrResult, PrescribeError};
use crate::symbol::{ClassInfo, ConstructorInfo, MethodInfo, ParamInfo, Symbol, SymbolKind, SymbolTable};
use crate::types::Type;
use crate::util::{Span, Spanned};
use crate::value::Value;
use std::collections::HashMap;

/// Everything the interpreter needs that the checker alone can establish.
pub struct CheckResult {
    pub globals: SymbolTable,
    pub classes: HashMap<String, ClassInfo>,
    pub enum_members: HashMap<String, Vec<String>>,
    pub type_aliases: HashMap<String, Type>,
    pub const_values: HashMap<String, Value>,
}

pub fn check(program: &Program) -> PrResult<CheckResult> {
    let mut checker = Checker::new();
    checker.check_block_inner(&program.body, &FnContext::Program)?;
    Ok(CheckResult {
        globals: checker.scopes,
        classes: checker.classes,
        enum_members: checker.enum_members,
        type_aliases: checker.type_aliases,
        const_values: checker.const_values,
    })
}

/// What kind of body is currently being checked, for `RETURN`/`SUPER`
/// rules.
#[derive(Clone)]
enum FnContext {
    Program,
    Procedure,
    Function(Type),
    Constructor,
}

#[derive(Clone)]
struct CallableSig {
    params: Vec<ParamInfo>,
    return_ty: Option<Type>,
}

struct Checker {
    scopes: SymbolTable,
    classes: HashMap<String, ClassInfo>,
    enum_members: HashMap<String, Vec<String>>,
    type_aliases: HashMap<String, Type>,
    const_values: HashMap<String, Value>,
    const_env: ConstEnv,
    /// Free (non-method) procedures/functions, keyed by name. Method
    /// signatures live on `ClassInfo` instead.
    callables: HashMap<String, CallableSig>,
    /// The class whose method/constructor body is currently executing, for
    /// access control and implicit field/method resolution.
    current_class: Option<String>,
    /// Names currently locked as FOR-loop counters, innermost last.
    loop_counters: Vec<String>,
}

impl Checker {
    fn new() -> Self {
        Self {
            scopes: SymbolTable::new(),
            classes: HashMap::new(),
            enum_members: HashMap::new(),
            type_aliases: HashMap::new(),
            const_values: HashMap::new(),
            const_env: ConstEnv::new(),
            callables: HashMap::new(),
            current_class: None,
            loop_counters: Vec::new(),
        }
    }

    // -----------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------

    fn check_block(&mut self, block: &Block, fn_ctx: &FnContext) -> PrResult<()> {
        self.scopes.push_scope();
        let result = self.check_block_inner(block, fn_ctx);
        self.scopes.pop_scope();
        result
    }

    fn check_block_inner(&mut self, block: &Block, fn_ctx: &FnContext) -> PrResult<()> {
        for item in block {
            let line = item.span.start_line;
            if let Item::Decl(decl) = &item.value {
                match decl {
                    Decl::TypeDecl { name, ty } => self.predeclare_type(name, ty, line)?,
                    Decl::Procedure { name, params, .. } => {
                        self.predeclare_callable(SymbolKind::Proc, name, params, None, line)?
                    }
                    Decl::Function { name, params, return_ty, .. } => {
                        self.predeclare_callable(SymbolKind::Func, name, params, Some(return_ty), line)?
                    }
                    Decl::Class { name, base, members } => {
                        self.predeclare_class(name, base.as_deref(), members, line)?
                    }
                    Decl::Var { .. } | Decl::Const { .. } => {}
                }
            }
        }
        for item in block {
            self.check_item(item, fn_ctx)?;
        }
        Ok(())
    }

    fn check_item(&mut self, item: &Spanned<Item>, fn_ctx: &FnContext) -> PrResult<()> {
        let line = item.span.start_line;
        match &item.value {
            Item::Decl(decl) => self.check_decl(decl, line),
            Item::Stmt(stmt) => self.check_stmt(stmt, line, fn_ctx),
        }
    }

    // -----------------------------------------------------------------
    // Declarations — pre-declare pass
    // -----------------------------------------------------------------

    fn predeclare_type(&mut self, name: &str, ty: &TypeNode, line: usize) -> PrResult<()> {
        match ty {
            TypeNode::Enum(members) => {
                for m in members {
                    if !self
                        .scopes
                        .define(Symbol::new(m, SymbolKind::EnumMember, Span::at_line(line)).with_type(Type::Enum(name.to_string())))
                    {
                        return Err(PrescribeError::name(line, format!("`{}` is already declared", m)));
                    }
                }
                for (i, m) in members.iter().enumerate() {
                    self.const_values.insert(m.clone(), Value::Integer(i as i32));
                    self.const_env.define(m.clone(), Value::Integer(i as i32));
                }
                self.enum_members.insert(name.to_string(), members.clone());
                self.type_aliases.insert(name.to_string(), Type::Enum(name.to_string()));
            }
            other => {
                let resolved = self.resolve_type(other, line)?;
                self.type_aliases.insert(name.to_string(), resolved);
            }
        }
        if !self.scopes.define(Symbol::new(name, SymbolKind::Type, Span::at_line(line))) {
            return Err(PrescribeError::name(line, format!("`{}` is already declared", name)));
        }
        Ok(())
    }

    fn predeclare_callable(
        &mut self,
        kind: SymbolKind,
        name: &str,
        params: &[Param],
        return_ty: Option<&TypeNode>,
        line: usize,
    ) -> PrResult<()> {
        let mut param_infos = Vec::new();
        for p in params {
            let t = self.resolve_type(&p.ty, line)?;
            param_infos.push(ParamInfo { name: p.name.clone(), ty: t, mode: p.mode });
        }
        let ret = match return_ty {
            Some(tn) => Some(self.resolve_type(tn, line)?),
            None => None,
        };
        self.callables.insert(name.to_string(), CallableSig { params: param_infos, return_ty: ret.clone() });
        let mut sym = Symbol::new(name, kind, Span::at_line(line));
        if let Some(r) = ret {
            sym = sym.with_type(r);
        }
        if !self.scopes.define(sym) {
            return Err(PrescribeError::name(line, format!("`{}` is already declared", name)));
        }
        Ok(())
    }

    /// Classes are pre-declared in source order; a class's `base` must
    /// already be registered, so — unlike types/procedures/functions,
    /// which may forward-reference each other freely — `EXTENDS` requires
    /// the base class to appear earlier in the same block.
    fn predeclare_class(
        &mut self,
        name: &str,
        base: Option<&str>,
        members: &[Spanned<crate::ast::ClassMember>],
        line: usize,
    ) -> PrResult<()> {
        if self.classes.contains_key(name) {
            return Err(PrescribeError::name(line, format!("`{}` is already declared", name)));
        }
        if let Some(b) = base {
            if !self.classes.contains_key(b) {
                return Err(PrescribeError::name(line, format!("base class `{}` must be declared before `{}`", b, name)));
            }
        }
        let mut info = ClassInfo { base: base.map(|b| b.to_string()), ..ClassInfo::default() };
        for member in members {
            let mline = member.span.start_line;
            let access = member.value.access;
            match &member.value.kind {
                ClassMemberKind::Field(fd) => {
                    if info.own_field(&fd.name).is_some() {
                        return Err(PrescribeError::name(mline, format!("duplicate field `{}`", fd.name)));
                    }
                    let t = self.resolve_type(&fd.ty, mline)?;
                    info.fields.push((fd.name.clone(), t, access));
                }
                ClassMemberKind::Method { name: mname, params, return_ty, .. } => {
                    if info.own_method(mname).is_some() {
                        return Err(PrescribeError::name(mline, format!("duplicate method `{}`", mname)));
                    }
                    let params = self.resolve_params(params, mline)?;
                    let ret = match return_ty {
                        Some(tn) => Some(self.resolve_type(tn, mline)?),
                        None => None,
                    };
                    info.methods.push(MethodInfo { name: mname.clone(), access, params, return_ty: ret });
                }
                ClassMemberKind::Constructor { params, .. } => {
                    if info.constructor.is_some() {
                        return Err(PrescribeError::syntax(mline, format!("`{}` already has a constructor", name)));
                    }
                    let params = self.resolve_params(params, mline)?;
                    info.constructor = Some(ConstructorInfo { params });
                }
            }
        }
        self.classes.insert(name.to_string(), info);
        if !self.scopes.define(Symbol::new(name, SymbolKind::Class, Span::at_line(line))) {
            return Err(PrescribeError::name(line, format!("`{}` is already declared", name)));
        }
        Ok(())
    }

    fn resolve_params(&mut self, params: &[Param], line: usize) -> PrResult<Vec<ParamInfo>> {
        params
            .iter()
            .map(|p| Ok(ParamInfo { name: p.name.clone(), ty: self.resolve_type(&p.ty, line)?, mode: p.mode }))
            .collect()
    }

    // -----------------------------------------------------------------
    // Declarations — visit pass
    // -----------------------------------------------------------------

    fn check_decl(&mut self, decl: &Decl, line: usize) -> PrResult<()> {
        match decl {
            Decl::Var { name, ty } => {
                let t = self.resolve_type(ty, line)?;
                if !self.scopes.define(Symbol::new(name, SymbolKind::Var, Span::at_line(line)).with_type(t)) {
                    return Err(PrescribeError::name(line, format!("`{}` is already declared in this scope", name)));
                }
                Ok(())
            }
            Decl::Const { name, value } => {
                let v = consteval::eval_const(value, &self.const_env)?;
                let t = value_type(line, &v)?;
                if !self.scopes.define(Symbol::new(name, SymbolKind::Const, Span::at_line(line)).with_type(t)) {
                    return Err(PrescribeError::name(line, format!("`{}` is already declared in this scope", name)));
                }
                self.const_values.insert(name.clone(), v.clone());
                self.const_env.define(name.clone(), v);
                Ok(())
            }
            Decl::TypeDecl { .. } => Ok(()),
            Decl::Procedure { params, body, .. } => {
                self.check_callable_body(params, body, &FnContext::Procedure, line)
            }
            Decl::Function { params, return_ty, body, .. } => {
                let ret = self.resolve_type(return_ty, line)?;
                self.check_callable_body(params, body, &FnContext::Function(ret), line)
            }
            Decl::Class { name, members, .. } => self.check_class_body(name, members),
        }
    }

    fn check_callable_body(&mut self, params: &[Param], body: &Block, ctx: &FnContext, line: usize) -> PrResult<()> {
        self.scopes.push_scope();
        for p in params {
            let t = self.resolve_type(&p.ty, line)?;
            if !self.scopes.define(Symbol::new(&p.name, SymbolKind::Param, Span::at_line(line)).with_type(t)) {
                self.scopes.pop_scope();
                return Err(PrescribeError::name(line, format!("duplicate parameter `{}`", p.name)));
            }
        }
        let result = self.check_block_inner(body, ctx);
        self.scopes.pop_scope();
        result
    }

    fn check_class_body(&mut self, name: &str, members: &[Spanned<crate::ast::ClassMember>]) -> PrResult<()> {
        let prev_class = self.current_class.replace(name.to_string());
        let mut result = Ok(());
        for member in members {
            let line = member.span.start_line;
            result = match &member.value.kind {
                ClassMemberKind::Field(_) => Ok(()),
                ClassMemberKind::Method { params, return_ty, body, .. } => {
                    let ret = match return_ty {
                        Some(tn) => self.resolve_type(tn, line).map(Some),
                        None => Ok(None),
                    };
                    ret.and_then(|ret| {
                        let ctx = match ret {
                            Some(r) => FnContext::Function(r),
                            None => FnContext::Procedure,
                        };
                        self.check_callable_body(params, body, &ctx, line)
                    })
                }
                ClassMemberKind::Constructor { params, body } => {
                    self.check_callable_body(params, body, &FnContext::Constructor, line)
                }
            };
            if result.is_err() {
                break;
            }
        }
        self.current_class = prev_class;
        result
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn check_stmt(&mut self, stmt: &Stmt, line: usize, fn_ctx: &FnContext) -> PrResult<()> {
        match stmt {
            Stmt::Assign { target, value } => self.check_assign(target, value, line),
            Stmt::If { cond, then_body, else_body } => {
                self.expect_boolean(cond, "IF condition")?;
                self.check_block(then_body, fn_ctx)?;
                if let Some(b) = else_body {
                    self.check_block(b, fn_ctx)?;
                }
                Ok(())
            }
            Stmt::Case { scrutinee, arms, otherwise } => self.check_case(scrutinee, arms, otherwise, fn_ctx),
            Stmt::For { var, start, end, step, next_var, body } => {
                self.check_for(var, start, end, step.as_ref(), next_var, body, line, fn_ctx)
            }
            Stmt::While { cond, body } => {
                self.expect_boolean(cond, "WHILE condition")?;
                self.check_block(body, fn_ctx)
            }
            Stmt::Repeat { body, cond } => {
                self.check_block(body, fn_ctx)?;
                self.expect_boolean(cond, "REPEAT UNTIL condition")
            }
            Stmt::Call { callee, args } => {
                if self.check_call(callee, args, line)?.is_some() {
                    return Err(PrescribeError::type_error(line, "CALL target must be a procedure, not a function"));
                }
                Ok(())
            }
            Stmt::Return(value) => self.check_return(value.as_ref(), line, fn_ctx),
            Stmt::Input(target) => self.check_input(target, line),
            Stmt::Output(expr) => self.check_output(expr, line),
            Stmt::OpenFile { handle, path, mode } => self.check_openfile(handle, path, mode, line),
            Stmt::CloseFile { handle } => self.check_file_handle_type(handle, line).map(|_| ()),
            Stmt::ReadFile { handle, target } => self.check_readfile(handle, target, line),
            Stmt::WriteFile { handle, value } => self.check_writefile(handle, value, line),
            Stmt::Seek { handle, position } => self.check_seek(handle, position, line),
            Stmt::GetRecord { handle, target } => self.check_getrecord(handle, target, line),
            Stmt::PutRecord { handle, value } => self.check_putrecord(handle, value, line),
            Stmt::SuperCall { args } => self.check_super_call(args, line, fn_ctx),
        }
    }

    fn expect_boolean(&mut self, expr: &Spanned<Expr>, what: &str) -> PrResult<()> {
        let t = self.check_expr(expr)?;
        if t != Type::Boolean {
            return Err(PrescribeError::type_error(expr.span.start_line, format!("{} must be BOOLEAN, got {}", what, t)));
        }
        Ok(())
    }

    /// Rejects a write-target name that is a FOR loop counter or a compile-time
    /// constant (plain `CONSTANT` or an enum member). Shared by every statement
    /// that writes into an lvalue: assignment, INPUT, READFILE, GETRECORD.
    fn check_writable_name(&self, n: &str, line: usize) -> PrResult<()> {
        if self.loop_counters.iter().any(|c| c == n) {
            return Err(PrescribeError::access(line, format!("`{}` is a FOR loop counter and cannot be assigned to", n)));
        }
        if matches!(self.scopes.lookup(n), Some(sym) if sym.kind == SymbolKind::Const || sym.kind == SymbolKind::EnumMember) {
            return Err(PrescribeError::access(line, format!("`{}` is a constant and cannot be assigned to", n)));
        }
        Ok(())
    }

    fn check_assign(&mut self, target: &Spanned<Expr>, value: &Spanned<Expr>, line: usize) -> PrResult<()> {
        if !expr_is_lvalue(&target.value) {
            return Err(PrescribeError::type_error(target.span.start_line, "assignment target must be an lvalue"));
        }
        if let Expr::Name(n) = &target.value {
            self.check_writable_name(n, line)?;
        }
        let tt = self.check_expr(target)?;
        let vt = self.check_expr(value)?;
        if !vt.assignable_to(&tt) {
            return Err(PrescribeError::type_error(line, format!("cannot assign {} to a target of type {}", vt, tt)));
        }
        Ok(())
    }

    fn check_return(&mut self, value: Option<&Spanned<Expr>>, line: usize, fn_ctx: &FnContext) -> PrResult<()> {
        match (fn_ctx, value) {
            (FnContext::Function(ret_ty), Some(e)) => {
                let vt = self.check_expr(e)?;
                if !vt.assignable_to(ret_ty) {
                    return Err(PrescribeError::type_error(
                        e.span.start_line,
                        format!("RETURN type {} does not match the declared return type {}", vt, ret_ty),
                    ));
                }
                Ok(())
            }
            (FnContext::Function(_), None) => Err(PrescribeError::type_error(line, "a function must RETURN a value")),
            (_, Some(_)) => Err(PrescribeError::type_error(line, "RETURN with a value is only allowed inside a function")),
            (_, None) => Ok(()),
        }
    }

    fn check_input(&mut self, target: &Spanned<Expr>, line: usize) -> PrResult<()> {
        if !expr_is_lvalue(&target.value) {
            return Err(PrescribeError::type_error(line, "INPUT target must be an lvalue"));
        }
        if let Expr::Name(n) = &target.value {
            self.check_writable_name(n, line)?;
        }
        let t = self.check_expr(target)?;
        if !io_scalar(&t) {
            return Err(PrescribeError::type_error(line, format!("cannot INPUT into a {}", t)));
        }
        Ok(())
    }

    fn check_output(&mut self, expr: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let t = self.check_expr(expr)?;
        if !io_output_scalar(&t) {
            return Err(PrescribeError::type_error(line, format!("cannot OUTPUT a {}", t)));
        }
        Ok(())
    }

    fn check_case(&mut self, scrutinee: &Spanned<Expr>, arms: &[CaseArm], otherwise: &Option<Block>, fn_ctx: &FnContext) -> PrResult<()> {
        let st = self.check_expr(scrutinee)?;
        if !matches!(st, Type::Integer | Type::Char | Type::Enum(_) | Type::Date) {
            return Err(PrescribeError::type_error(
                scrutinee.span.start_line,
                format!("CASE expression must be INTEGER, CHAR, an enum, or DATE, got {}", st),
            ));
        }
        let mut seen_labels: Vec<Value> = Vec::new();
        for arm in arms {
            for label in &arm.labels {
                match label {
                    CaseLabel::Value(e) => {
                        let lt = self.check_expr(e)?;
                        if lt != st {
                            return Err(PrescribeError::type_error(
                                e.span.start_line,
                                format!("CASE label type {} does not match the expression type {}", lt, st),
                            ));
                        }
                        let v = consteval::eval_const(e, &self.const_env)?;
                        if seen_labels.contains(&v) {
                            return Err(PrescribeError::syntax(e.span.start_line, "duplicate CASE label"));
                        }
                        seen_labels.push(v);
                    }
                    CaseLabel::Range(lo, hi) => {
                        let lo_t = self.check_expr(lo)?;
                        let hi_t = self.check_expr(hi)?;
                        if lo_t != st || hi_t != st {
                            return Err(PrescribeError::type_error(lo.span.start_line, format!("CASE range bounds must be {}", st)));
                        }
                    }
                }
            }
            self.check_block(&arm.body, fn_ctx)?;
        }
        if let Some(b) = otherwise {
            self.check_block(b, fn_ctx)?;
        }
        Ok(())
    }

    fn check_for(
        &mut self,
        var: &str,
        start: &Spanned<Expr>,
        end: &Spanned<Expr>,
        step: Option<&Spanned<Expr>>,
        next_var: &str,
        body: &Block,
        line: usize,
        fn_ctx: &FnContext,
    ) -> PrResult<()> {
        if var != next_var {
            return Err(PrescribeError::syntax(line, format!("FOR {} does not match NEXT {}", var, next_var)));
        }
        let start_ty = self.check_expr(start)?;
        if start_ty != Type::Integer {
            return Err(PrescribeError::type_error(start.span.start_line, "FOR start must be INTEGER"));
        }
        let end_ty = self.check_expr(end)?;
        if end_ty != Type::Integer {
            return Err(PrescribeError::type_error(end.span.start_line, "FOR end must be INTEGER"));
        }
        if let Some(step_expr) = step {
            let step_ty = self.check_expr(step_expr)?;
            if step_ty != Type::Integer {
                return Err(PrescribeError::type_error(step_expr.span.start_line, "FOR step must be INTEGER"));
            }
        }
        // The counter is scoped to the loop body, whether or not it was
        // already declared outside — re-declaring it here keeps the
        // common `FOR i <- 1 TO n` idiom working without a prior DECLARE.
        self.scopes.push_scope();
        self.scopes.define(Symbol::new(var, SymbolKind::Var, Span::at_line(line)).with_type(Type::Integer));
        self.loop_counters.push(var.to_string());
        let result = self.check_block_inner(body, fn_ctx);
        self.loop_counters.pop();
        self.scopes.pop_scope();
        result
    }

    fn check_super_call(&mut self, args: &[Spanned<Expr>], line: usize, fn_ctx: &FnContext) -> PrResult<()> {
        if !matches!(fn_ctx, FnContext::Constructor) {
            return Err(PrescribeError::syntax(line, "SUPER(...) is only legal inside a constructor body"));
        }
        let class_name = self
            .current_class
            .clone()
            .ok_or_else(|| PrescribeError::name(line, "SUPER used outside a class"))?;
        let base = self
            .classes
            .get(&class_name)
            .and_then(|c| c.base.clone())
            .ok_or_else(|| PrescribeError::name(line, format!("`{}` has no base class to call SUPER on", class_name)))?;
        let base_info = self.classes.get(&base).cloned().expect("base class already resolved");
        match &base_info.constructor {
            Some(ctor) => self.check_args_against_params(&ctor.params, args, line),
            None if args.is_empty() => Ok(()),
            None => Err(PrescribeError::type_error(line, format!("`{}` has no constructor but SUPER was called with arguments", base))),
        }
    }

    // -----------------------------------------------------------------
    // File statements — type-level checks only; mode/session checks are
    // the interpreter's job at runtime.
    // -----------------------------------------------------------------

    fn check_file_handle_type(&self, handle: &str, line: usize) -> PrResult<Type> {
        let sym = self
            .scopes
            .lookup(handle)
            .ok_or_else(|| PrescribeError::name(line, format!("`{}` is not a declared file handle", handle)))?;
        match &sym.ty {
            Some(t @ Type::TextFile) | Some(t @ Type::RandomFile(_)) => Ok(t.clone()),
            _ => Err(PrescribeError::type_error(line, format!("`{}` is not a TEXTFILE or RANDOMFILE variable", handle))),
        }
    }

    fn check_openfile(&mut self, handle: &str, path: &Spanned<Expr>, mode: &Spanned<Expr>, line: usize) -> PrResult<()> {
        self.check_file_handle_type(handle, line)?;
        let pt = self.check_expr(path)?;
        if pt != Type::String {
            return Err(PrescribeError::type_error(path.span.start_line, "OPENFILE path must be STRING"));
        }
        let mt = self.check_expr(mode)?;
        if mt != Type::String {
            return Err(PrescribeError::type_error(mode.span.start_line, "OPENFILE mode must be STRING"));
        }
        Ok(())
    }

    fn check_readfile(&mut self, handle: &str, target: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let ft = self.check_file_handle_type(handle, line)?;
        if !matches!(ft, Type::TextFile) {
            return Err(PrescribeError::type_error(line, "READFILE requires a TEXTFILE handle"));
        }
        if !expr_is_lvalue(&target.value) {
            return Err(PrescribeError::type_error(target.span.start_line, "READFILE target must be an lvalue"));
        }
        if let Expr::Name(n) = &target.value {
            self.check_writable_name(n, target.span.start_line)?;
        }
        let tt = self.check_expr(target)?;
        if !io_scalar(&tt) {
            return Err(PrescribeError::type_error(target.span.start_line, format!("cannot READFILE into a {}", tt)));
        }
        Ok(())
    }

    fn check_writefile(&mut self, handle: &str, value: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let ft = self.check_file_handle_type(handle, line)?;
        if !matches!(ft, Type::TextFile) {
            return Err(PrescribeError::type_error(line, "WRITEFILE requires a TEXTFILE handle"));
        }
        let vt = self.check_expr(value)?;
        if !io_output_scalar(&vt) {
            return Err(PrescribeError::type_error(value.span.start_line, format!("cannot WRITEFILE a {}", vt)));
        }
        Ok(())
    }

    fn check_seek(&mut self, handle: &str, position: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let ft = self.check_file_handle_type(handle, line)?;
        if !matches!(ft, Type::RandomFile(_)) {
            return Err(PrescribeError::type_error(line, "SEEK requires a RANDOMFILE handle"));
        }
        let pt = self.check_expr(position)?;
        if pt != Type::Integer {
            return Err(PrescribeError::type_error(position.span.start_line, "SEEK position must be INTEGER"));
        }
        Ok(())
    }

    fn check_getrecord(&mut self, handle: &str, target: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let ft = self.check_file_handle_type(handle, line)?;
        let elem = match ft {
            Type::RandomFile(e) => *e,
            _ => return Err(PrescribeError::type_error(line, "GETRECORD requires a RANDOMFILE handle")),
        };
        if !expr_is_lvalue(&target.value) {
            return Err(PrescribeError::type_error(target.span.start_line, "GETRECORD target must be an lvalue"));
        }
        if let Expr::Name(n) = &target.value {
            self.check_writable_name(n, target.span.start_line)?;
        }
        let tt = self.check_expr(target)?;
        if tt != elem {
            return Err(PrescribeError::type_error(target.span.start_line, format!("GETRECORD target must be {}, got {}", elem, tt)));
        }
        Ok(())
    }

    fn check_putrecord(&mut self, handle: &str, value: &Spanned<Expr>, line: usize) -> PrResult<()> {
        let ft = self.check_file_handle_type(handle, line)?;
        let elem = match ft {
            Type::RandomFile(e) => *e,
            _ => return Err(PrescribeError::type_error(line, "PUTRECORD requires a RANDOMFILE handle")),
        };
        let vt = self.check_expr(value)?;
        if vt != elem {
            return Err(PrescribeError::type_error(value.span.start_line, format!("PUTRECORD value must be {}, got {}", elem, vt)));
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn check_expr(&mut self, expr: &Spanned<Expr>) -> PrResult<Type> {
        let line = expr.span.start_line;
        match &expr.value {
            Expr::IntLit(_) => Ok(Type::Integer),
            Expr::RealLit(_) => Ok(Type::Real),
            Expr::BoolLit(_) => Ok(Type::Boolean),
            Expr::CharLit(_) => Ok(Type::Char),
            Expr::StrLit(_) => Ok(Type::String),
            Expr::DateLit(s) => {
                Date::parse(line, s)?;
                Ok(Type::Date)
            }
            Expr::Null => Ok(Type::Null),
            Expr::Name(name) => self.check_name(name, line),
            Expr::Binary { op, lhs, rhs } => {
                let lt = self.check_expr(lhs)?;
                let rt = self.check_expr(rhs)?;
                binary_result_type(line, *op, &lt, &rt)
            }
            Expr::Unary { op, operand } => {
                let t = self.check_expr(operand)?;
                unary_result_type(line, *op, operand, t)
            }
            Expr::Deref(inner) => match self.check_expr(inner)? {
                Type::Pointer(target) => Ok(*target),
                other => Err(PrescribeError::type_error(line, format!("cannot dereference a {}", other))),
            },
            Expr::Index { base, indices } => self.check_index(base, indices, line),
            Expr::Field { base, name } => self.check_field_expr(base, name, line),
            Expr::Call { callee, args } => self
                .check_call(callee, args, line)?
                .ok_or_else(|| PrescribeError::type_error(line, "this call does not produce a value")),
            Expr::New { type_name, args } => self.check_new(type_name, args, line),
            Expr::Eof(handle) => match self.check_expr(handle)? {
                Type::TextFile | Type::RandomFile(_) => Ok(Type::Boolean),
                other => Err(PrescribeError::type_error(line, format!("EOF expects a file handle, got {}", other))),
            },
        }
    }

    fn check_name(&mut self, name: &str, line: usize) -> PrResult<Type> {
        if name == "SUPER" {
            let cur = self
                .current_class
                .clone()
                .ok_or_else(|| PrescribeError::name(line, "SUPER used outside a class method"))?;
            let base = self
                .classes
                .get(&cur)
                .and_then(|c| c.base.clone())
                .ok_or_else(|| PrescribeError::name(line, format!("`{}` has no base class", cur)))?;
            return Ok(Type::Class(base));
        }
        if let Some(sym) = self.scopes.lookup(name) {
            return sym
                .ty
                .clone()
                .ok_or_else(|| PrescribeError::runtime(line, format!("`{}` has no recorded type", name)));
        }
        if let Some(class_name) = self.current_class.clone() {
            if let Some((ty, access, owner)) = find_field(&self.classes, &class_name, name) {
                self.check_field_access(&owner, access, line)?;
                return Ok(ty);
            }
        }
        Err(PrescribeError::name(line, format!("`{}` is not defined", name)))
    }

    fn check_field_access(&self, owner: &str, access: Access, line: usize) -> PrResult<()> {
        if access == Access::Private && self.current_class.as_deref() != Some(owner) {
            return Err(PrescribeError::access(line, format!("`{}`'s private members are not accessible here", owner)));
        }
        Ok(())
    }

    fn check_index(&mut self, base: &Spanned<Expr>, indices: &[Spanned<Expr>], line: usize) -> PrResult<Type> {
        match self.check_expr(base)? {
            Type::Array { rank, elem } => {
                if indices.len() != rank {
                    return Err(PrescribeError::type_error(line, format!("expected {} indices, got {}", rank, indices.len())));
                }
                for idx in indices {
                    let it = self.check_expr(idx)?;
                    if it != Type::Integer {
                        return Err(PrescribeError::type_error(idx.span.start_line, format!("array index must be INTEGER, got {}", it)));
                    }
                }
                Ok(*elem)
            }
            other => Err(PrescribeError::type_error(line, format!("cannot index a {}", other))),
        }
    }

    fn check_field_expr(&mut self, base: &Spanned<Expr>, name: &str, line: usize) -> PrResult<Type> {
        match self.check_expr(base)? {
            Type::Record(fields) => fields
                .into_iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t)
                .ok_or_else(|| PrescribeError::name(line, format!("record has no field `{}`", name))),
            Type::Class(class_name) => {
                let (ty, access, owner) = find_field(&self.classes, &class_name, name)
                    .ok_or_else(|| PrescribeError::name(line, format!("`{}` has no field `{}`", class_name, name)))?;
                self.check_field_access(&owner, access, line)?;
                Ok(ty)
            }
            other => Err(PrescribeError::type_error(line, format!("cannot access a field on a {}", other))),
        }
    }

    /// Resolves `callee(args)`, checking arity, argument types, and
    /// BYREF-lvalue requirements. Returns the callable's return type
    /// (`None` for a procedure) — callers decide whether that shape fits
    /// where they found it (expression position wants `Some`, the `CALL`
    /// statement wants `None`).
    fn check_call(&mut self, callee: &Spanned<Expr>, args: &[Spanned<Expr>], line: usize) -> PrResult<Option<Type>> {
        match &callee.value {
            Expr::Name(fname) if is_builtin(fname) => self.check_builtin_call(fname, args, line).map(Some),
            Expr::Name(fname) => {
                if let Some(sig) = self.callables.get(fname).cloned() {
                    self.check_args_against_params(&sig.params, args, line)?;
                    return Ok(sig.return_ty);
                }
                if let Some(class_name) = self.current_class.clone() {
                    if let Some((m, owner)) = find_method(&self.classes, &class_name, fname) {
                        self.check_field_access(&owner, m.access, line)?;
                        self.check_args_against_params(&m.params, args, line)?;
                        return Ok(m.return_ty);
                    }
                }
                Err(PrescribeError::name(line, format!("`{}` is not a known procedure or function", fname)))
            }
            Expr::Field { base, name } => match self.check_expr(base)? {
                Type::Class(class_name) => {
                    let (m, owner) = find_method(&self.classes, &class_name, name)
                        .ok_or_else(|| PrescribeError::name(line, format!("`{}` has no method `{}`", class_name, name)))?;
                    self.check_field_access(&owner, m.access, line)?;
                    self.check_args_against_params(&m.params, args, line)?;
                    Ok(m.return_ty)
                }
                other => Err(PrescribeError::type_error(line, format!("cannot call a method on a {}", other))),
            },
            _ => Err(PrescribeError::type_error(line, "expression is not callable")),
        }
    }

    fn check_args_against_params(&mut self, params: &[ParamInfo], args: &[Spanned<Expr>], line: usize) -> PrResult<()> {
        if params.len() != args.len() {
            return Err(PrescribeError::type_error(line, format!("expected {} arguments, got {}", params.len(), args.len())));
        }
        for (p, a) in params.iter().zip(args) {
            let at = self.check_expr(a)?;
            if !at.assignable_to(&p.ty) {
                return Err(PrescribeError::type_error(a.span.start_line, format!("argument `{}` expects {}, got {}", p.name, p.ty, at)));
            }
            if p.mode == ParamMode::ByReference && !expr_is_lvalue(&a.value) {
                return Err(PrescribeError::type_error(a.span.start_line, format!("argument `{}` is BYREF and requires an lvalue", p.name)));
            }
        }
        Ok(())
    }

    fn check_builtin_call(&mut self, name: &str, args: &[Spanned<Expr>], line: usize) -> PrResult<Type> {
        // ENUMVALUE's first argument names a type, so it is never evaluated
        // as an ordinary expression.
        if name == "ENUMVALUE" {
            if args.len() != 2 {
                return Err(PrescribeError::type_error(line, "ENUMVALUE expects 2 arguments"));
            }
            let type_name = match &args[0].value {
                Expr::Name(n) => n.clone(),
                _ => return Err(PrescribeError::syntax(args[0].span.start_line, "ENUMVALUE's first argument must be an enum type name")),
            };
            if !self.enum_members.contains_key(&type_name) {
                return Err(PrescribeError::name(args[0].span.start_line, format!("`{}` is not a known enum type", type_name)));
            }
            let kt = self.check_expr(&args[1])?;
            if kt != Type::Integer {
                return Err(PrescribeError::type_error(args[1].span.start_line, "ENUMVALUE's second argument must be INTEGER"));
            }
            return Ok(Type::Enum(type_name));
        }

        let arg_tys: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect::<PrResult<_>>()?;
        let bad_args = || PrescribeError::type_error(line, format!("{} called with the wrong argument types", name));
        match (name, arg_tys.as_slice()) {
            ("LENGTH", [Type::String]) => Ok(Type::Integer),
            ("RIGHT", [Type::String, Type::Integer]) => Ok(Type::String),
            ("MID", [Type::String, Type::Integer, Type::Integer]) => Ok(Type::String),
            ("LCASE", [Type::String]) => Ok(Type::String),
            ("UCASE", [Type::String]) => Ok(Type::String),
            ("INT", [Type::Real]) => Ok(Type::Integer),
            ("REAL", [Type::Integer]) => Ok(Type::Real),
            ("STRING", [t]) if io_output_scalar(t) => Ok(Type::String),
            ("CHAR", [Type::Integer]) => Ok(Type::Char),
            ("BOOLEAN", [Type::String]) => Ok(Type::Boolean),
            ("DATE", [Type::String]) => Ok(Type::Date),
            ("ORD", [Type::Enum(_)]) => Ok(Type::Integer),
            ("SIZE", [Type::SetOfEnum(_)]) => Ok(Type::Integer),
            ("RAND", []) => Ok(Type::Real),
            _ => Err(bad_args()),
        }
    }

    fn check_new(&mut self, type_name: &str, args: &Option<Vec<Spanned<Expr>>>, line: usize) -> PrResult<Type> {
        if let Some(info) = self.classes.get(type_name).cloned() {
            match (&info.constructor, args) {
                (Some(ctor), Some(arg_exprs)) => self.check_args_against_params(&ctor.params, arg_exprs, line)?,
                (None, Some(arg_exprs)) if arg_exprs.is_empty() => {}
                (None, None) => {}
                (Some(ctor), None) if ctor.params.is_empty() => {}
                _ => return Err(PrescribeError::type_error(line, format!("`{}`'s constructor arguments do not match", type_name))),
            }
            return Ok(Type::Class(type_name.to_string()));
        }
        if args.is_some() {
            return Err(PrescribeError::type_error(line, format!("`{}` is not a class and cannot take constructor arguments", type_name)));
        }
        let inner = if let Some(t) = self.type_aliases.get(type_name) {
            t.clone()
        } else if let Some(basic) = basic_type_by_keyword(type_name) {
            basic
        } else {
            return Err(PrescribeError::name(line, format!("unknown type `{}`", type_name)));
        };
        Ok(Type::Pointer(Box::new(inner)))
    }

    // -----------------------------------------------------------------
    // Type resolution
    // -----------------------------------------------------------------

    /// `line` is threaded through explicitly since `TypeNode` carries no
    /// span of its own — only the expressions nested inside it (array
    /// bounds) do.
    fn resolve_type(&mut self, tn: &TypeNode, line: usize) -> PrResult<Type> {
        match tn {
            TypeNode::Basic(b) => Ok(basic_to_type(*b)),
            TypeNode::Array { dims, elem } => {
                for (lo, hi) in dims {
                    let lt = self.check_expr(lo)?;
                    if lt != Type::Integer {
                        return Err(PrescribeError::type_error(lo.span.start_line, "array bound must be INTEGER"));
                    }
                    let ht = self.check_expr(hi)?;
                    if ht != Type::Integer {
                        return Err(PrescribeError::type_error(hi.span.start_line, "array bound must be INTEGER"));
                    }
                }
                let elem_ty = self.resolve_type(elem, line)?;
                Ok(Type::Array { rank: dims.len(), elem: Box::new(elem_ty) })
            }
            TypeNode::Record(fields) => {
                let mut out = Vec::new();
                for f in fields {
                    out.push((f.name.clone(), self.resolve_type(&f.ty, line)?));
                }
                Ok(Type::Record(out))
            }
            TypeNode::Enum(_) => Err(PrescribeError::syntax(line, "an enum type must be declared via TYPE ... = (...)")),
            TypeNode::SetOfEnum(base) => {
                if !self.enum_members.contains_key(base) {
                    return Err(PrescribeError::name(line, format!("`{}` is not a known enum type", base)));
                }
                Ok(Type::SetOfEnum(base.clone()))
            }
            TypeNode::Pointer(inner) => Ok(Type::Pointer(Box::new(self.resolve_type(inner, line)?))),
            TypeNode::TextFile => Ok(Type::TextFile),
            TypeNode::RandomFile(inner) => {
                let t = self.resolve_type(inner, line)?;
                if !type_is_random_file_eligible(&t) {
                    return Err(PrescribeError::type_error(
                        line,
                        format!("{} is not a valid RANDOMFILE record type (no STRING, SET, POINTER, or CLASS, recursively)", t),
                    ));
                }
                Ok(Type::RandomFile(Box::new(t)))
            }
            TypeNode::Named(name) => {
                if let Some(t) = self.type_aliases.get(name) {
                    return Ok(t.clone());
                }
                if self.classes.contains_key(name) {
                    return Ok(Type::Class(name.clone()));
                }
                Err(PrescribeError::name(line, format!("`{}` is not a known type", name)))
            }
        }
    }
}

// -----------------------------------------------------------------------
// Free helpers — no `&mut self` needed, so they stay out of the impl block
// to keep borrow scopes short in their callers.
// -----------------------------------------------------------------------

fn expr_is_lvalue(e: &Expr) -> bool {
    matches!(e, Expr::Name(_) | Expr::Index { .. } | Expr::Field { .. } | Expr::Deref(_))
}

/// Types `INPUT`/`READFILE` may parse a token into. Enum is included here
/// (per `spec.md`'s INPUT table: "Enum: case-sensitive member name") but not
/// in [io_output_scalar] — the OUTPUT conversion table has no Enum row, so
/// writing an enum value back out as text is not supported.
fn io_scalar(t: &Type) -> bool {
    matches!(t, Type::Integer | Type::Real | Type::Boolean | Type::Char | Type::String | Type::Date | Type::Enum(_))
}

/// Types `OUTPUT`/`WRITEFILE`/`STRING()` may convert to text.
fn io_output_scalar(t: &Type) -> bool {
    matches!(t, Type::Integer | Type::Real | Type::Boolean | Type::Char | Type::String | Type::Date)
}

pub(crate) fn basic_to_type(b: BasicType) -> Type {
    match b {
        BasicType::Integer => Type::Integer,
        BasicType::Real => Type::Real,
        BasicType::Boolean => Type::Boolean,
        BasicType::Char => Type::Char,
        BasicType::String => Type::String,
        BasicType::Date => Type::Date,
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

fn value_type(line: usize, v: &Value) -> PrResult<Type> {
    match v {
        Value::Integer(_) => Ok(Type::Integer),
        Value::Real(_) => Ok(Type::Real),
        Value::Boolean(_) => Ok(Type::Boolean),
        Value::Char(_) => Ok(Type::Char),
        Value::String(_) => Ok(Type::String),
        Value::Date(_) => Ok(Type::Date),
        Value::Pointer(None) => Ok(Type::Null),
        other => Err(PrescribeError::type_error(line, format!("{} is not a valid constant value", other.type_name()))),
    }
}

/// Walks `class_name`'s base chain looking for an own field, returning its
/// type, access, and the name of the class that actually declares it (the
/// "owner" the access-control rule compares against).
pub(crate) fn find_field(classes: &HashMap<String, ClassInfo>, class_name: &str, field_name: &str) -> Option<(Type, Access, String)> {
    let mut cur = Some(class_name.to_string());
    while let Some(c) = cur {
        let info = classes.get(&c)?;
        if let Some((_, ty, access)) = info.own_field(field_name) {
            return Some((ty.clone(), *access, c));
        }
        cur = info.base.clone();
    }
    None
}

pub(crate) fn find_method(classes: &HashMap<String, ClassInfo>, class_name: &str, method_name: &str) -> Option<(MethodInfo, String)> {
    let mut cur = Some(class_name.to_string());
    while let Some(c) = cur {
        let info = classes.get(&c)?;
        if let Some(m) = info.own_method(method_name) {
            return Some((m.clone(), c));
        }
        cur = info.base.clone();
    }
    None
}

/// Mirrors `fileio::record_byte_size`'s shape test but at the `Type` level
/// (no value exists yet at `DECLARE` time) — no `String`, `SET`, `POINTER`,
/// or `CLASS`, recursively.
fn type_is_random_file_eligible(t: &Type) -> bool {
    match t {
        Type::Integer | Type::Real | Type::Boolean | Type::Char | Type::Date => true,
        Type::Array { elem, .. } => type_is_random_file_eligible(elem),
        Type::Record(fields) => fields.iter().all(|(_, ft)| type_is_random_file_eligible(ft)),
        _ => false,
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "LENGTH" | "RIGHT" | "MID" | "LCASE" | "UCASE" | "INT" | "REAL" | "STRING" | "CHAR" | "BOOLEAN" | "DATE" | "ORD" | "ENUMVALUE" | "SIZE" | "RAND"
    )
}

fn binary_result_type(line: usize, op: crate::ast::BinOp, l: &Type, r: &Type) -> PrResult<Type> {
    use crate::ast::BinOp::*;
    let mismatch = || PrescribeError::type_error(line, format!("{:?} is not defined for {} and {}", op, l, r));
    match op {
        Add | Sub | Mul => match (l, r) {
            (Type::Integer, Type::Integer) => Ok(Type::Integer),
            (Type::Real, Type::Real) => Ok(Type::Real),
            _ => Err(mismatch()),
        },
        Div => match (l, r) {
            (Type::Integer, Type::Integer) | (Type::Real, Type::Real) => Ok(Type::Real),
            _ => Err(mismatch()),
        },
        IDiv | Mod => match (l, r) {
            (Type::Integer, Type::Integer) => Ok(Type::Integer),
            _ => Err(mismatch()),
        },
        Concat => {
            let ok = |t: &Type| matches!(t, Type::String | Type::Char);
            if ok(l) && ok(r) {
                Ok(Type::String)
            } else {
                Err(mismatch())
            }
        }
        And | Or => match (l, r) {
            (Type::Boolean, Type::Boolean) => Ok(Type::Boolean),
            _ => Err(mismatch()),
        },
        Eq | Ne => {
            if l == r && l.is_equality_comparable() {
                Ok(Type::Boolean)
            } else {
                Err(mismatch())
            }
        }
        Lt | Le | Gt | Ge => {
            if l == r && l.is_ordered() {
                Ok(Type::Boolean)
            } else {
                Err(mismatch())
            }
        }
        In => match (l, r) {
            (Type::Enum(a), Type::SetOfEnum(b)) if a == b => Ok(Type::Boolean),
            _ => Err(mismatch()),
        },
        Union | Intersect | Diff => match (l, r) {
            (Type::SetOfEnum(a), Type::SetOfEnum(b)) if a == b => Ok(Type::SetOfEnum(a.clone())),
            _ => Err(mismatch()),
        },
    }
}

fn unary_result_type(line: usize, op: crate::ast::UnOp, operand_expr: &Spanned<Expr>, t: Type) -> PrResult<Type> {
    use crate::ast::UnOp::*;
    match op {
        Neg | Plus => match t {
            Type::Integer => Ok(Type::Integer),
            Type::Real => Ok(Type::Real),
            other => Err(PrescribeError::type_error(line, format!("{:?} is not defined for {}", op, other))),
        },
        Not => match t {
            Type::Boolean => Ok(Type::Boolean),
            other => Err(PrescribeError::type_error(line, format!("NOT is not defined for {}", other))),
        },
        AddressOf => {
            if !expr_is_lvalue(&operand_expr.value) {
                return Err(PrescribeError::type_error(line, "@ requires an lvalue"));
            }
            Ok(Type::Pointer(Box::new(t)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;

    fn check_src(src: &str) -> PrResult<CheckResult> {
        let tokens = lexer::tokenize(src).expect("lex should succeed");
        let program = parser::parse(&tokens).expect("parse should succeed");
        check(&program)
    }

    #[test]
    fn test_minimal_program_checks() {
        assert!(check_src("PROGRAM P\nENDPROGRAM\n").is_ok());
    }

    #[test]
    fn test_declare_and_assign_matching_types() {
        assert!(check_src("PROGRAM P\nDECLARE X : INTEGER\nX <- 5\nENDPROGRAM\n").is_ok());
    }

    #[test]
    fn test_assign_type_mismatch_is_type_error() {
        let err = check_src("PROGRAM P\nDECLARE X : INTEGER\nX <- \"hi\"\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn test_assign_to_constant_is_access_error() {
        let err = check_src("PROGRAM P\nCONSTANT Pi = 3.14\nPi <- 1.0\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AccessError);
    }

    #[test]
    fn test_undeclared_name_is_name_error() {
        let err = check_src("PROGRAM P\nX <- 5\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NameError);
    }

    #[test]
    fn test_for_loop_counter_is_locked() {
        let err = check_src("PROGRAM P\nFOR i <- 1 TO 10\ni <- 2\nNEXT i\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AccessError);
    }

    #[test]
    fn test_for_next_name_mismatch_is_syntax_error() {
        let err = check_src("PROGRAM P\nFOR i <- 1 TO 10\nOUTPUT i\nNEXT j\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
    }

    #[test]
    fn test_mixed_integer_real_arithmetic_requires_conversion() {
        let err = check_src("PROGRAM P\nDECLARE X : REAL\nX <- 1 + 2.0\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn test_division_always_produces_real() {
        assert!(check_src("PROGRAM P\nDECLARE X : REAL\nX <- 4 / 2\nENDPROGRAM\n").is_ok());
    }

    #[test]
    fn test_function_without_return_is_type_error() {
        let err = check_src("PROGRAM P\nFUNCTION F() RETURNS INTEGER\nENDFUNCTION\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn test_mutually_recursive_procedures_are_predeclared() {
        let src = "PROGRAM P\n\
                   PROCEDURE A()\n\
                   CALL B()\n\
                   ENDPROCEDURE\n\
                   PROCEDURE B()\n\
                   CALL A()\n\
                   ENDPROCEDURE\n\
                   ENDPROGRAM\n";
        assert!(check_src(src).is_ok());
    }

    #[test]
    fn test_class_private_field_inaccessible_outside_class() {
        let src = "PROGRAM P\n\
                   CLASS Animal\n\
                   PRIVATE\n\
                   DECLARE Name : STRING\n\
                   ENDCLASS\n\
                   DECLARE A : Animal\n\
                   A <- NEW Animal\n\
                   OUTPUT A.Name\n\
                   ENDPROGRAM\n";
        let err = check_src(src).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AccessError);
    }

    #[test]
    fn test_inherited_private_field_still_blocked() {
        let src = "PROGRAM P\n\
                   CLASS Animal\n\
                   PRIVATE\n\
                   DECLARE Name : STRING\n\
                   PUBLIC\n\
                   FUNCTION GetName() RETURNS STRING\n\
                   RETURN Name\n\
                   ENDFUNCTION\n\
                   ENDCLASS\n\
                   CLASS Dog EXTENDS Animal\n\
                   PUBLIC\n\
                   FUNCTION Leak() RETURNS STRING\n\
                   RETURN Name\n\
                   ENDFUNCTION\n\
                   ENDCLASS\n\
                   ENDPROGRAM\n";
        let err = check_src(src).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AccessError);
    }

    #[test]
    fn test_random_file_of_string_record_rejected() {
        let err = check_src("PROGRAM P\nDECLARE F : RANDOMFILE OF STRING\nENDPROGRAM\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn test_duplicate_case_label_is_syntax_error() {
        let src = "PROGRAM P\nDECLARE X : INTEGER\nX <- 1\nCASE OF X\n1: OUTPUT \"one\"\n1: OUTPUT \"one again\"\nENDCASE\nENDPROGRAM\n";
        let err = check_src(src).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
    }
}
