//! Hand-written recursive descent over the flat `Vec<Token>` the lexer
//! produces, implementing the precedence chain and statement/declaration
//! grammar from `spec.md` §4.2/§6.
//!
//! `CASE` arms bind their label list to exactly one following statement —
//! the spec's own EBNF sketch shows a bare `label ":"` with no block
//! terminator, which is also how the style guide's worked examples read;
//! a program that wants more than one statement per label writes a
//! `PROCEDURE` call or nests another block-forming statement.

use crate::ast::*;
use crate::error::{PrResult, PrescribeError};
use crate::token::{Token, TokenKind};
use crate::util::{Span, Spanned};

const BASIC_TYPE_KEYWORDS: &[(&str, BasicType)] = &[
    ("INTEGER", BasicType::Integer),
    ("REAL", BasicType::Real),
    ("BOOLEAN", BasicType::Boolean),
    ("CHAR", BasicType::Char),
    ("STRING", BasicType::String),
    ("DATE", BasicType::Date),
];

pub fn parse(tokens: &[Token]) -> PrResult<Program> {
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek().is_keyword(kw)
    }

    fn at_delim(&self, c: char) -> bool {
        self.peek().is_delim(c)
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_delim(&mut self, c: char) -> bool {
        if self.at_delim(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PrResult<Span> {
        if self.at_keyword(kw) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("expected `{}`", kw)))
        }
    }

    fn expect_delim(&mut self, c: char) -> PrResult<Span> {
        if self.at_delim(c) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("expected `{}`", c)))
        }
    }

    fn expect_op(&mut self, op: &str) -> PrResult<Span> {
        if self.at_op(op) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("expected `{}`", op)))
        }
    }

    fn expect_assign_op(&mut self) -> PrResult<Span> {
        self.expect_op("<-")
    }

    fn expect_ident(&mut self) -> PrResult<(String, Span)> {
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            let span = self.advance().span;
            Ok((name, span))
        } else {
            Err(self.unexpected("expected an identifier"))
        }
    }

    fn unexpected(&self, context: &str) -> PrescribeError {
        PrescribeError::syntax(
            self.current_span().start_line,
            format!("unexpected {} ({})", self.peek().kind, context),
        )
    }

    fn can_start_expr(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Ident(_)
            | TokenKind::Integer(_)
            | TokenKind::Real(_)
            | TokenKind::Str(_)
            | TokenKind::Char(_)
            | TokenKind::Bool(_) => true,
            TokenKind::Delim('(') => true,
            TokenKind::Op(o) if o == "-" || o == "+" || o == "@" || o == "^" => true,
            TokenKind::Keyword(k) => matches!(
                k.as_str(),
                "NOT" | "NEW" | "EOF" | "NULL" | "DATE" | "INTEGER" | "REAL" | "BOOLEAN" | "CHAR"
                    | "STRING" | "SUPER"
            ),
            _ => false,
        }
    }

    // -----------------------------------------------------------------
    // Program / blocks
    // -----------------------------------------------------------------

    fn parse_program(&mut self) -> PrResult<Program> {
        self.expect_keyword("PROGRAM")?;
        let (name, _) = self.expect_ident()?;
        let body = self.parse_block(&["ENDPROGRAM"])?;
        self.expect_keyword("ENDPROGRAM")?;
        Ok(Program { name, body })
    }

    fn at_block_terminator(&self, terminators: &[&str]) -> bool {
        terminators.iter().any(|t| self.at_keyword(t)) || matches!(self.peek().kind, TokenKind::Eof)
    }

    fn parse_block(&mut self, terminators: &[&str]) -> PrResult<Block> {
        let mut items = Vec::new();
        while !self.at_block_terminator(terminators) {
            items.push(self.parse_item()?);
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> PrResult<Spanned<Item>> {
        let start = self.current_span();
        if self.at_keyword("DECLARE") {
            let decl = self.parse_var_decl()?;
            Ok(Spanned::new(Item::Decl(decl), start.to(self.prev_span())))
        } else if self.at_keyword("CONSTANT") {
            let decl = self.parse_const_decl()?;
            Ok(Spanned::new(Item::Decl(decl), start.to(self.prev_span())))
        } else if self.at_keyword("TYPE") {
            let decl = self.parse_type_decl()?;
            Ok(Spanned::new(Item::Decl(decl), start.to(self.prev_span())))
        } else if self.at_keyword("PROCEDURE") {
            let decl = self.parse_procedure_decl()?;
            Ok(Spanned::new(Item::Decl(decl), start.to(self.prev_span())))
        } else if self.at_keyword("FUNCTION") {
            let decl = self.parse_function_decl()?;
            Ok(Spanned::new(Item::Decl(decl), start.to(self.prev_span())))
        } else if self.at_keyword("CLASS") {
            let decl = self.parse_class_decl()?;
            Ok(Spanned::new(Item::Decl(decl), start.to(self.prev_span())))
        } else {
            let stmt = self.parse_stmt()?;
            Ok(Spanned::new(Item::Stmt(stmt.value), stmt.span))
        }
    }

    /// The span of the token just consumed — used to close out a node's
    /// span after a multi-token production.
    fn prev_span(&self) -> Span {
        let idx = self.pos.saturating_sub(1);
        self.tokens[idx].span
    }

    // -----------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------

    fn parse_var_decl(&mut self) -> PrResult<Decl> {
        self.expect_keyword("DECLARE")?;
        let (name, _) = self.expect_ident()?;
        self.expect_delim(':')?;
        let ty = self.parse_type()?;
        Ok(Decl::Var { name, ty })
    }

    fn parse_field_decl(&mut self) -> PrResult<FieldDecl> {
        self.expect_keyword("DECLARE")?;
        let (name, _) = self.expect_ident()?;
        self.expect_delim(':')?;
        let ty = self.parse_type()?;
        Ok(FieldDecl { name, ty })
    }

    fn parse_const_decl(&mut self) -> PrResult<Decl> {
        self.expect_keyword("CONSTANT")?;
        let (name, _) = self.expect_ident()?;
        self.expect_op("=")?;
        let value = self.parse_expr()?;
        Ok(Decl::Const { name, value })
    }

    fn parse_type_decl(&mut self) -> PrResult<Decl> {
        self.expect_keyword("TYPE")?;
        let (name, _) = self.expect_ident()?;
        self.expect_op("=")?;
        if self.at_delim('(') {
            self.advance();
            let mut members = Vec::new();
            loop {
                let (member, _) = self.expect_ident()?;
                members.push(member);
                if !self.eat_delim(',') {
                    break;
                }
            }
            self.expect_delim(')')?;
            Ok(Decl::TypeDecl { name, ty: TypeNode::Enum(members) })
        } else {
            let ty = self.parse_type()?;
            Ok(Decl::TypeDecl { name, ty })
        }
    }

    fn parse_params(&mut self) -> PrResult<Vec<Param>> {
        self.expect_delim('(')?;
        let mut params = Vec::new();
        if !self.at_delim(')') {
            loop {
                let mode = if self.eat_keyword("BYREF") {
                    ParamMode::ByReference
                } else {
                    self.eat_keyword("BYVAL");
                    ParamMode::ByValue
                };
                let (name, _) = self.expect_ident()?;
                self.expect_delim(':')?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty, mode });
                if !self.eat_delim(',') {
                    break;
                }
            }
        }
        self.expect_delim(')')?;
        Ok(params)
    }

    fn parse_procedure_decl(&mut self) -> PrResult<Decl> {
        self.expect_keyword("PROCEDURE")?;
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_block(&["ENDPROCEDURE"])?;
        self.expect_keyword("ENDPROCEDURE")?;
        Ok(Decl::Procedure { name, params, body })
    }

    fn parse_function_decl(&mut self) -> PrResult<Decl> {
        self.expect_keyword("FUNCTION")?;
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        self.expect_keyword("RETURNS")?;
        let return_ty = self.parse_type()?;
        let body = self.parse_block(&["ENDFUNCTION"])?;
        self.expect_keyword("ENDFUNCTION")?;
        Ok(Decl::Function { name, params, return_ty, body })
    }

    fn parse_class_decl(&mut self) -> PrResult<Decl> {
        self.expect_keyword("CLASS")?;
        let (name, _) = self.expect_ident()?;
        let base = if self.eat_keyword("EXTENDS") {
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        let mut members = Vec::new();
        let mut access = Access::Public;
        while !self.at_keyword("ENDCLASS") {
            if self.eat_keyword("PUBLIC") {
                access = Access::Public;
            } else if self.eat_keyword("PRIVATE") {
                access = Access::Private;
            } else if self.at_keyword("DECLARE") {
                let start = self.current_span();
                let field = self.parse_field_decl()?;
                members.push(Spanned::new(
                    ClassMember { access, kind: ClassMemberKind::Field(field) },
                    start.to(self.prev_span()),
                ));
            } else if self.at_keyword("PROCEDURE") {
                let start = self.current_span();
                self.advance();
                let (mname, _) = self.expect_ident()?;
                let params = self.parse_params()?;
                let body = self.parse_block(&["ENDPROCEDURE"])?;
                self.expect_keyword("ENDPROCEDURE")?;
                members.push(Spanned::new(
                    ClassMember {
                        access,
                        kind: ClassMemberKind::Method { name: mname, params, return_ty: None, body },
                    },
                    start.to(self.prev_span()),
                ));
            } else if self.at_keyword("FUNCTION") {
                let start = self.current_span();
                self.advance();
                let (mname, _) = self.expect_ident()?;
                let params = self.parse_params()?;
                self.expect_keyword("RETURNS")?;
                let return_ty = self.parse_type()?;
                let body = self.parse_block(&["ENDFUNCTION"])?;
                self.expect_keyword("ENDFUNCTION")?;
                members.push(Spanned::new(
                    ClassMember {
                        access,
                        kind: ClassMemberKind::Method { name: mname, params, return_ty: Some(return_ty), body },
                    },
                    start.to(self.prev_span()),
                ));
            } else if self.at_keyword("CONSTRUCTOR") {
                let start = self.current_span();
                self.advance();
                let params = self.parse_params()?;
                let body = self.parse_block(&["ENDCONSTRUCTOR"])?;
                self.expect_keyword("ENDCONSTRUCTOR")?;
                members.push(Spanned::new(
                    ClassMember { access, kind: ClassMemberKind::Constructor { params, body } },
                    start.to(self.prev_span()),
                ));
            } else {
                return Err(self.unexpected("expected a class member"));
            }
        }
        self.expect_keyword("ENDCLASS")?;
        Ok(Decl::Class { name, base, members })
    }

    // -----------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------

    fn parse_type(&mut self) -> PrResult<TypeNode> {
        if self.eat_keyword("ARRAY") {
            self.expect_delim('[')?;
            let mut dims = Vec::new();
            loop {
                let lo = self.parse_add()?;
                self.expect_delim(':')?;
                let hi = self.parse_add()?;
                dims.push((lo, hi));
                if !self.eat_delim(',') {
                    break;
                }
            }
            self.expect_delim(']')?;
            self.expect_keyword("OF")?;
            let elem = self.parse_type()?;
            return Ok(TypeNode::Array { dims, elem: Box::new(elem) });
        }
        if self.eat_keyword("POINTER") {
            self.expect_keyword("TO")?;
            let inner = self.parse_type()?;
            return Ok(TypeNode::Pointer(Box::new(inner)));
        }
        if self.eat_keyword("SET") {
            self.expect_keyword("OF")?;
            let (base, _) = self.expect_ident()?;
            return Ok(TypeNode::SetOfEnum(base));
        }
        if self.eat_keyword("RECORD") {
            let mut fields = Vec::new();
            while self.at_keyword("DECLARE") || matches!(self.peek().kind, TokenKind::Ident(_)) {
                let field = if self.at_keyword("DECLARE") {
                    self.parse_field_decl()?
                } else {
                    let (name, _) = self.expect_ident()?;
                    self.expect_delim(':')?;
                    let ty = self.parse_type()?;
                    FieldDecl { name, ty }
                };
                fields.push(field);
            }
            self.expect_keyword("ENDRECORD")?;
            return Ok(TypeNode::Record(fields));
        }
        if self.eat_keyword("TEXTFILE") {
            return Ok(TypeNode::TextFile);
        }
        if self.eat_keyword("RANDOMFILE") {
            self.expect_keyword("OF")?;
            let inner = self.parse_type()?;
            return Ok(TypeNode::RandomFile(Box::new(inner)));
        }
        for (kw, basic) in BASIC_TYPE_KEYWORDS {
            if self.eat_keyword(kw) {
                return Ok(TypeNode::Basic(*basic));
            }
        }
        if let TokenKind::Ident(_) = self.peek().kind {
            let (name, _) = self.expect_ident()?;
            return Ok(TypeNode::Named(name));
        }
        Err(self.unexpected("expected a type"))
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_stmt(&mut self) -> PrResult<Spanned<Stmt>> {
        let start = self.current_span();
        let stmt = if self.at_keyword("IF") {
            self.parse_if()?
        } else if self.at_keyword("CASE") {
            self.parse_case()?
        } else if self.at_keyword("FOR") {
            self.parse_for()?
        } else if self.at_keyword("WHILE") {
            self.parse_while()?
        } else if self.at_keyword("REPEAT") {
            self.parse_repeat()?
        } else if self.at_keyword("CALL") {
            self.parse_call_stmt()?
        } else if self.at_keyword("RETURN") {
            self.advance();
            let value = if self.can_start_expr() { Some(self.parse_expr()?) } else { None };
            Stmt::Return(value)
        } else if self.at_keyword("INPUT") {
            self.advance();
            Stmt::Input(self.parse_unary()?)
        } else if self.at_keyword("OUTPUT") {
            self.advance();
            Stmt::Output(self.parse_expr()?)
        } else if self.at_keyword("OPENFILE") {
            self.parse_openfile()?
        } else if self.at_keyword("CLOSEFILE") {
            self.parse_closefile()?
        } else if self.at_keyword("READFILE") {
            self.parse_readfile()?
        } else if self.at_keyword("WRITEFILE") {
            self.parse_writefile()?
        } else if self.at_keyword("SEEK") {
            self.parse_seek()?
        } else if self.at_keyword("GETRECORD") {
            self.parse_getrecord()?
        } else if self.at_keyword("PUTRECORD") {
            self.parse_putrecord()?
        } else if self.at_keyword("SUPER") {
            self.advance();
            self.expect_delim('(')?;
            let args = self.parse_args()?;
            self.expect_delim(')')?;
            Stmt::SuperCall { args }
        } else {
            let target = self.parse_unary()?;
            self.expect_assign_op()?;
            let value = self.parse_expr()?;
            Stmt::Assign { target, value }
        };
        Ok(Spanned::new(stmt, start.to(self.prev_span())))
    }

    fn parse_if(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("IF")?;
        let cond = self.parse_expr()?;
        self.expect_keyword("THEN")?;
        let then_body = self.parse_block(&["ELSE", "ENDIF"])?;
        let else_body = if self.eat_keyword("ELSE") {
            Some(self.parse_block(&["ENDIF"])?)
        } else {
            None
        };
        self.expect_keyword("ENDIF")?;
        Ok(Stmt::If { cond, then_body, else_body })
    }

    fn parse_case_label(&mut self) -> PrResult<Spanned<Expr>> {
        self.parse_add()
    }

    fn parse_case(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("CASE")?;
        self.expect_keyword("OF")?;
        let scrutinee = self.parse_expr()?;
        let mut arms = Vec::new();
        let mut otherwise = None;
        loop {
            if self.eat_keyword("OTHERWISE") {
                self.expect_delim(':')?;
                otherwise = Some(vec![self.parse_item()?]);
                break;
            }
            if self.at_keyword("ENDCASE") {
                break;
            }
            let mut labels = Vec::new();
            loop {
                let lo = self.parse_case_label()?;
                if self.eat_keyword("TO") {
                    let hi = self.parse_case_label()?;
                    labels.push(CaseLabel::Range(lo, hi));
                } else {
                    labels.push(CaseLabel::Value(lo));
                }
                if !self.eat_delim(',') {
                    break;
                }
            }
            self.expect_delim(':')?;
            let body = vec![self.parse_item()?];
            arms.push(CaseArm { labels, body });
        }
        self.expect_keyword("ENDCASE")?;
        Ok(Stmt::Case { scrutinee, arms, otherwise })
    }

    fn parse_for(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("FOR")?;
        let (var, _) = self.expect_ident()?;
        self.expect_assign_op()?;
        let start = self.parse_expr()?;
        self.expect_keyword("TO")?;
        let end = self.parse_expr()?;
        let step = if self.eat_keyword("STEP") { Some(self.parse_expr()?) } else { None };
        let body = self.parse_block(&["NEXT"])?;
        self.expect_keyword("NEXT")?;
        let (next_var, _) = self.expect_ident()?;
        Ok(Stmt::For { var, start, end, step, next_var, body })
    }

    fn parse_while(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("WHILE")?;
        let cond = self.parse_expr()?;
        self.expect_keyword("DO")?;
        let body = self.parse_block(&["ENDWHILE"])?;
        self.expect_keyword("ENDWHILE")?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_repeat(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("REPEAT")?;
        let body = self.parse_block(&["UNTIL"])?;
        self.expect_keyword("UNTIL")?;
        let cond = self.parse_expr()?;
        Ok(Stmt::Repeat { body, cond })
    }

    fn parse_call_stmt(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("CALL")?;
        let expr = self.parse_postfix()?;
        match expr.value {
            Expr::Call { callee, args } => Ok(Stmt::Call { callee: *callee, args }),
            _ => Err(self.unexpected("expected a procedure call after CALL")),
        }
    }

    fn parse_file_handle_name(&mut self) -> PrResult<String> {
        Ok(self.expect_ident()?.0)
    }

    fn parse_openfile(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("OPENFILE")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(',')?;
        let path = self.parse_expr()?;
        self.expect_delim(',')?;
        let mode = self.parse_expr()?;
        self.expect_delim(')')?;
        Ok(Stmt::OpenFile { handle, path, mode })
    }

    fn parse_closefile(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("CLOSEFILE")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(')')?;
        Ok(Stmt::CloseFile { handle })
    }

    fn parse_readfile(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("READFILE")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(',')?;
        let target = self.parse_unary()?;
        self.expect_delim(')')?;
        Ok(Stmt::ReadFile { handle, target })
    }

    fn parse_writefile(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("WRITEFILE")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(',')?;
        let value = self.parse_expr()?;
        self.expect_delim(')')?;
        Ok(Stmt::WriteFile { handle, value })
    }

    fn parse_seek(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("SEEK")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(',')?;
        let position = self.parse_expr()?;
        self.expect_delim(')')?;
        Ok(Stmt::Seek { handle, position })
    }

    fn parse_getrecord(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("GETRECORD")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(',')?;
        let target = self.parse_unary()?;
        self.expect_delim(')')?;
        Ok(Stmt::GetRecord { handle, target })
    }

    fn parse_putrecord(&mut self) -> PrResult<Stmt> {
        self.expect_keyword("PUTRECORD")?;
        self.expect_delim('(')?;
        let handle = self.parse_file_handle_name()?;
        self.expect_delim(',')?;
        let value = self.parse_expr()?;
        self.expect_delim(')')?;
        Ok(Stmt::PutRecord { handle, value })
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn parse_expr(&mut self) -> PrResult<Spanned<Expr>> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_rel()?;
        while self.eat_keyword("AND") {
            let right = self.parse_rel()?;
            left = binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_rel(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_set_ops()?;
        loop {
            let op = if self.eat_op("=") {
                BinOp::Eq
            } else if self.eat_op("<>") {
                BinOp::Ne
            } else if self.eat_op("<=") {
                BinOp::Le
            } else if self.eat_op(">=") {
                BinOp::Ge
            } else if self.eat_op("<") {
                BinOp::Lt
            } else if self.eat_op(">") {
                BinOp::Gt
            } else if self.eat_keyword("IN") {
                BinOp::In
            } else {
                break;
            };
            let right = self.parse_set_ops()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_set_ops(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_concat()?;
        loop {
            let op = if self.eat_keyword("UNION") {
                BinOp::Union
            } else if self.eat_keyword("INTERSECT") {
                BinOp::Intersect
            } else if self.eat_keyword("DIFF") {
                BinOp::Diff
            } else {
                break;
            };
            let right = self.parse_concat()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_concat(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_add()?;
        while self.eat_op("&") {
            let right = self.parse_add()?;
            left = binary(left, BinOp::Concat, right);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_mul()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            let right = self.parse_mul()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> PrResult<Spanned<Expr>> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_keyword("DIV") {
                BinOp::IDiv
            } else if self.eat_keyword("MOD") {
                BinOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PrResult<Spanned<Expr>> {
        let start = self.current_span();
        if self.eat_op("-") {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Spanned::new(Expr::Unary { op: UnOp::Neg, operand: Box::new(operand) }, span));
        }
        if self.eat_op("+") {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Spanned::new(Expr::Unary { op: UnOp::Plus, operand: Box::new(operand) }, span));
        }
        if self.eat_keyword("NOT") {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Spanned::new(Expr::Unary { op: UnOp::Not, operand: Box::new(operand) }, span));
        }
        if self.eat_op("@") {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Spanned::new(Expr::Unary { op: UnOp::AddressOf, operand: Box::new(operand) }, span));
        }
        if self.eat_op("^") {
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Spanned::new(Expr::Deref(Box::new(operand)), span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PrResult<Spanned<Expr>> {
        let start = self.current_span();
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_delim('(') {
                let args = self.parse_args()?;
                self.expect_delim(')')?;
                let span = start.to(self.prev_span());
                expr = Spanned::new(Expr::Call { callee: Box::new(expr), args }, span);
            } else if self.eat_delim('[') {
                let mut indices = Vec::new();
                loop {
                    indices.push(self.parse_expr()?);
                    if !self.eat_delim(',') {
                        break;
                    }
                }
                self.expect_delim(']')?;
                let span = start.to(self.prev_span());
                expr = Spanned::new(Expr::Index { base: Box::new(expr), indices }, span);
            } else if self.eat_delim('.') {
                let (name, _) = self.expect_ident()?;
                let span = start.to(self.prev_span());
                expr = Spanned::new(Expr::Field { base: Box::new(expr), name }, span);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> PrResult<Vec<Spanned<Expr>>> {
        let mut args = Vec::new();
        if !self.at_delim(')') {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_delim(',') {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn parse_new_type_name(&mut self) -> PrResult<String> {
        for (kw, _) in BASIC_TYPE_KEYWORDS {
            if self.at_keyword(kw) {
                self.advance();
                return Ok((*kw).to_string());
            }
        }
        Ok(self.expect_ident()?.0)
    }

    fn parse_primary(&mut self) -> PrResult<Spanned<Expr>> {
        let start = self.current_span();
        let tok = self.peek().kind.clone();
        match tok {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Spanned::new(Expr::IntLit(n), start))
            }
            TokenKind::Real(x) => {
                self.advance();
                Ok(Spanned::new(Expr::RealLit(x), start))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Spanned::new(Expr::StrLit(s), start))
            }
            TokenKind::Char(c) => {
                self.advance();
                Ok(Spanned::new(Expr::CharLit(c), start))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Spanned::new(Expr::BoolLit(b), start))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Spanned::new(Expr::Name(name), start))
            }
            TokenKind::Keyword(ref k) if k == "SUPER" => {
                self.advance();
                Ok(Spanned::new(Expr::Name("SUPER".to_string()), start))
            }
            TokenKind::Keyword(ref k) if k == "NULL" => {
                self.advance();
                Ok(Spanned::new(Expr::Null, start))
            }
            TokenKind::Keyword(ref k) if k == "NEW" => {
                self.advance();
                let type_name = self.parse_new_type_name()?;
                let args = if self.eat_delim('(') {
                    let a = self.parse_args()?;
                    self.expect_delim(')')?;
                    Some(a)
                } else {
                    None
                };
                let span = start.to(self.prev_span());
                Ok(Spanned::new(Expr::New { type_name, args }, span))
            }
            TokenKind::Keyword(ref k) if k == "EOF" => {
                self.advance();
                self.expect_delim('(')?;
                let handle = self.parse_expr()?;
                self.expect_delim(')')?;
                let span = start.to(self.prev_span());
                Ok(Spanned::new(Expr::Eof(Box::new(handle)), span))
            }
            TokenKind::Keyword(ref k) if k == "DATE" => {
                self.advance();
                if let TokenKind::Str(s) = self.peek().kind.clone() {
                    self.advance();
                    let span = start.to(self.prev_span());
                    Ok(Spanned::new(Expr::DateLit(s), span))
                } else {
                    Ok(Spanned::new(Expr::Name("DATE".to_string()), start))
                }
            }
            TokenKind::Keyword(ref k)
                if BASIC_TYPE_KEYWORDS.iter().any(|(name, _)| name == k) =>
            {
                self.advance();
                Ok(Spanned::new(Expr::Name(k.clone()), start))
            }
            TokenKind::Delim('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_delim(')')?;
                Ok(inner)
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }
}

fn binary(left: Spanned<Expr>, op: BinOp, right: Spanned<Expr>) -> Spanned<Expr> {
    let span = left.span.to(right.span);
    Spanned::new(
        Expr::Binary { op, lhs: Box::new(left), rhs: Box::new(right) },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Program {
        let tokens = tokenize(src).unwrap();
        parse(&tokens).unwrap()
    }

    #[test]
    fn test_minimal_program() {
        let prog = parse_src("PROGRAM Empty\nENDPROGRAM");
        assert_eq!(prog.name, "Empty");
        assert!(prog.body.is_empty());
    }

    #[test]
    fn test_average_scores_example_parses() {
        let src = r#"
PROGRAM AverageScores
  DECLARE Count : INTEGER
  DECLARE Sum : INTEGER
  DECLARE Score : INTEGER
  DECLARE Avg : REAL
  Sum <- 0
  INPUT Count
  FOR i <- 1 TO Count
    INPUT Score
    Sum <- Sum + Score
  NEXT i
  Avg <- REAL(Sum) / REAL(Count)
  OUTPUT "Average = " & STRING(Avg)
ENDPROGRAM
"#;
        let prog = parse_src(src);
        assert_eq!(prog.name, "AverageScores");
        assert_eq!(prog.body.len(), 8);
    }

    #[test]
    fn test_precedence_or_lowest() {
        let prog = parse_src("PROGRAM P\n  OUTPUT TRUE OR FALSE AND FALSE\nENDPROGRAM");
        match &prog.body[0].value {
            Item::Stmt(Stmt::Output(e)) => match &e.value {
                Expr::Binary { op: BinOp::Or, rhs, .. } => {
                    assert!(matches!(rhs.value, Expr::Binary { op: BinOp::And, .. }));
                }
                other => panic!("expected OR at top, got {:?}", other),
            },
            other => panic!("expected OUTPUT, got {:?}", other),
        }
    }

    #[test]
    fn test_euclidean_mod_example_parses() {
        let prog = parse_src("PROGRAM P\n  OUTPUT -7 MOD 3\nENDPROGRAM");
        assert_eq!(prog.body.len(), 1);
    }

    #[test]
    fn test_class_with_extends_and_constructor() {
        let src = r#"
PROGRAM P
  CLASS Animal
    PUBLIC
    FUNCTION Speak() RETURNS STRING
      RETURN "base"
    ENDFUNCTION
  ENDCLASS
  CLASS Dog EXTENDS Animal
    PUBLIC
    FUNCTION Speak() RETURNS STRING
      RETURN "woof"
    ENDFUNCTION
  ENDCLASS
ENDPROGRAM
"#;
        let prog = parse_src(src);
        assert_eq!(prog.body.len(), 2);
        match &prog.body[1].value {
            Item::Decl(Decl::Class { name, base, .. }) => {
                assert_eq!(name, "Dog");
                assert_eq!(base.as_deref(), Some("Animal"));
            }
            other => panic!("expected class decl, got {:?}", other),
        }
    }

    #[test]
    fn test_null_pointer_dereference_example_parses() {
        let src = "PROGRAM P\n  DECLARE P : POINTER TO INTEGER\n  P <- NULL\n  OUTPUT ^P\nENDPROGRAM";
        let prog = parse_src(src);
        assert_eq!(prog.body.len(), 3);
    }

    #[test]
    fn test_case_statement() {
        let src = r#"
PROGRAM P
  CASE OF X
    1: OUTPUT "one"
    2, 3: OUTPUT "two or three"
    4 TO 6: OUTPUT "four to six"
    OTHERWISE: OUTPUT "other"
  ENDCASE
ENDPROGRAM
"#;
        let prog = parse_src(src);
        match &prog.body[0].value {
            Item::Stmt(Stmt::Case { arms, otherwise, .. }) => {
                assert_eq!(arms.len(), 3);
                assert!(otherwise.is_some());
            }
            other => panic!("expected CASE, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected_token_is_syntax_error() {
        let tokens = tokenize("PROGRAM P\n  DECLARE\nENDPROGRAM").unwrap();
        assert!(parse(&tokens).is_err());
    }
}
