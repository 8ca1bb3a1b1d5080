//! Every node type that can appear in a Prescribe program's syntax tree.
//! No behavior lives here, just shapes. Every node that can anchor a
//! diagnostic is wrapped in [Spanned] by the parser.

use crate::util::Spanned;

/// A parsed program: the body between `PROGRAM <name>` and `ENDPROGRAM`.
/// Declarations and statements may be interleaved, so the body is one
/// ordered list of [Item] rather than split lists.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub name: String,
    pub body: Block,
}

/// An ordered sequence of declarations/statements making up one block
/// (program body, procedure/function/constructor body, branch body, loop
/// body).
pub type Block = Vec<Spanned<Item>>;

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Decl(Decl),
    Stmt(Stmt),
}

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    /// `DECLARE Name : Type`
    Var { name: String, ty: TypeNode },
    /// `CONSTANT Name = Expr`
    Const { name: String, value: Spanned<Expr> },
    /// `TYPE Name = ...`, covering all four forms (alias, record, enum,
    /// set-of-enum); which form it is lives in `ty`.
    TypeDecl { name: String, ty: TypeNode },
    Procedure {
        name: String,
        params: Vec<Param>,
        body: Block,
    },
    Function {
        name: String,
        params: Vec<Param>,
        return_ty: TypeNode,
        body: Block,
    },
    Class {
        name: String,
        base: Option<String>,
        members: Vec<Spanned<ClassMember>>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamMode {
    ByValue,
    ByReference,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeNode,
    pub mode: ParamMode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeNode,
}

/// One member of a `CLASS ... ENDCLASS` body, already tagged with the
/// access level (`PUBLIC`/`PRIVATE`) it inherited from the most recent
/// access keyword above it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassMember {
    pub access: Access,
    pub kind: ClassMemberKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClassMemberKind {
    Field(FieldDecl),
    /// A procedure- or function-style method; `return_ty` distinguishes
    /// the two (`None` means it behaves like a procedure — no `RETURN`
    /// with a value is required or permitted).
    Method {
        name: String,
        params: Vec<Param>,
        return_ty: Option<TypeNode>,
        body: Block,
    },
    Constructor { params: Vec<Param>, body: Block },
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign {
        target: Spanned<Expr>,
        value: Spanned<Expr>,
    },
    If {
        cond: Spanned<Expr>,
        then_body: Block,
        else_body: Option<Block>,
    },
    Case {
        scrutinee: Spanned<Expr>,
        arms: Vec<CaseArm>,
        otherwise: Option<Block>,
    },
    For {
        var: String,
        start: Spanned<Expr>,
        end: Spanned<Expr>,
        step: Option<Spanned<Expr>>,
        /// The identifier named on the matching `NEXT`; the parser
        /// records it as-is, the checker verifies it matches `var`.
        next_var: String,
        body: Block,
    },
    While {
        cond: Spanned<Expr>,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Spanned<Expr>,
    },
    Call {
        callee: Spanned<Expr>,
        args: Vec<Spanned<Expr>>,
    },
    Return(Option<Spanned<Expr>>),
    Input(Spanned<Expr>),
    Output(Spanned<Expr>),
    OpenFile {
        handle: String,
        path: Spanned<Expr>,
        mode: Spanned<Expr>,
    },
    CloseFile { handle: String },
    ReadFile {
        handle: String,
        target: Spanned<Expr>,
    },
    WriteFile {
        handle: String,
        value: Spanned<Expr>,
    },
    Seek {
        handle: String,
        position: Spanned<Expr>,
    },
    GetRecord {
        handle: String,
        target: Spanned<Expr>,
    },
    PutRecord {
        handle: String,
        value: Spanned<Expr>,
    },
    /// `SUPER(args)`, legal only inside a constructor body.
    SuperCall { args: Vec<Spanned<Expr>> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaseArm {
    pub labels: Vec<CaseLabel>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaseLabel {
    Value(Spanned<Expr>),
    Range(Spanned<Expr>, Spanned<Expr>),
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Concat,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Union,
    Intersect,
    Diff,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    /// `@e`: address-of, requires `e` to be an lvalue.
    AddressOf,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntLit(i32),
    RealLit(f64),
    BoolLit(bool),
    CharLit(char),
    StrLit(String),
    /// `DATE "YYYY-MM-DD"`; left as raw text, parsed/validated later so
    /// the parser never needs calendar logic.
    DateLit(String),
    Name(String),
    Binary {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Unary {
        op: UnOp,
        operand: Box<Spanned<Expr>>,
    },
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },
    Index {
        base: Box<Spanned<Expr>>,
        indices: Vec<Spanned<Expr>>,
    },
    Field {
        base: Box<Spanned<Expr>>,
        name: String,
    },
    /// `NEW Type` (pointer target) or `NEW Type(args)` (class
    /// construction); the checker tells the two apart from `type_name`.
    New {
        type_name: String,
        args: Option<Vec<Spanned<Expr>>>,
    },
    /// `EOF(F)`, `F` being a file handle name.
    Eof(Box<Spanned<Expr>>),
    Null,
    /// `^p`, parsed at the unary precedence level but its own node since
    /// it is also a valid lvalue.
    Deref(Box<Spanned<Expr>>),
}

// ---------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BasicType {
    Integer,
    Real,
    Boolean,
    Char,
    String,
    Date,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeNode {
    Basic(BasicType),
    Array {
        dims: Vec<(Spanned<Expr>, Spanned<Expr>)>,
        elem: Box<TypeNode>,
    },
    Record(Vec<FieldDecl>),
    Enum(Vec<String>),
    /// `SET OF <EnumName>`.
    SetOfEnum(String),
    Pointer(Box<TypeNode>),
    TextFile,
    RandomFile(Box<TypeNode>),
    /// A bare name referring to a previously declared type alias, record,
    /// enum, set, or class; resolved by the checker.
    Named(String),
}
