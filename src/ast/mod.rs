//! The Dana abstract syntax tree (spec section 4.1).
//!
//! Each node carries its source [`Position`] for diagnostics. The grammar is
//! indentation-sensitive; a `Block` is simply a `Vec<Statement>` once the
//! parser has consumed the `Indent`/`Dedent` pair that delimited it.

use crate::lexer::Position;

pub type Block = Vec<Statement>;

/// A parsed type annotation, e.g. `int`, `list[str]`, `MyStruct`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    Named(String),
    Generic(String, Vec<TypeAnnotation>),
}

impl TypeAnnotation {
    pub fn name(&self) -> &str {
        match self {
            TypeAnnotation::Named(n) => n,
            TypeAnnotation::Generic(n, _) => n,
        }
    }
}

/// The scope an identifier is explicitly prefixed with (`public:x`), or none
/// for a bare name (spec section 3.2/4.4.1: bare assignment always targets
/// `local`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Local,
    Private,
    Public,
    System,
}

impl ScopeKind {
    pub fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "local" => Some(ScopeKind::Local),
            "private" => Some(ScopeKind::Private),
            "public" => Some(ScopeKind::Public),
            "system" => Some(ScopeKind::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopedName {
    pub scope: Option<ScopeKind>,
    pub name: String,
    pub position: Position,
}

/// Assignment targets: bare/scoped names, attribute access, and
/// subscription, each of which may themselves nest (`a[b].c = x`).
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(ScopedName),
    Attribute(Box<Target>, String, Position),
    Subscript(Box<Target>, Box<Expr>, Position),
}

impl Target {
    pub fn position(&self) -> Position {
        match self {
            Target::Name(n) => n.position,
            Target::Attribute(_, _, p) => *p,
            Target::Subscript(_, _, p) => *p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
    In,
    NotIn,
    And,
    Or,
    Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    pub default: Option<Expr>,
}

/// `def (r: Struct) method(...)`: the optional struct-receiver form that
/// gives methods type-directed dispatch (spec section 4.1/4.4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct Receiver {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub receiver: Option<Receiver>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Block,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptClause {
    pub kind: Option<String>,
    pub bind_as: Option<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithBinding {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assignment {
        target: Target,
        annotation: Option<TypeAnnotation>,
        value: Expr,
        position: Position,
    },
    CompoundAssignment {
        target: Target,
        op: CompoundOp,
        value: Expr,
        position: Position,
    },
    Expression(Expr),
    If {
        branches: Vec<(Expr, Block)>,
        else_branch: Option<Block>,
        position: Position,
    },
    While {
        condition: Expr,
        body: Block,
        position: Position,
    },
    For {
        target: Target,
        iterable: Expr,
        body: Block,
        position: Position,
    },
    FunctionDef(std::rc::Rc<FunctionDef>),
    StructDef(StructDef),
    Return {
        value: Option<Expr>,
        position: Position,
    },
    Import {
        path: Vec<String>,
        alias: Option<String>,
        position: Position,
    },
    With {
        bindings: Vec<WithBinding>,
        body: Block,
        position: Position,
    },
    Try {
        body: Block,
        handlers: Vec<ExceptClause>,
        finally: Option<Block>,
        position: Position,
    },
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionClause {
    pub target: Target,
    pub iterable: Box<Expr>,
    pub condition: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal, Position),
    Name(ScopedName),
    List(Vec<Expr>, Position),
    Tuple(Vec<Expr>, Position),
    Set(Vec<Expr>, Position),
    Mapping(Vec<(Expr, Expr)>, Position),
    Comprehension {
        element: Box<Expr>,
        clause: ComprehensionClause,
        position: Position,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
        position: Position,
    },
    Unary(UnaryOp, Box<Expr>, Position),
    Binary(BinOp, Box<Expr>, Box<Expr>, Position),
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        position: Position,
    },
    Attribute(Box<Expr>, String, Position),
    Subscript(Box<Expr>, Box<Expr>, Position),
}

impl Expr {
    pub fn position(&self) -> Position {
        match self {
            Expr::Literal(_, p)
            | Expr::List(_, p)
            | Expr::Tuple(_, p)
            | Expr::Set(_, p)
            | Expr::Mapping(_, p)
            | Expr::Comprehension { position: p, .. }
            | Expr::Lambda { position: p, .. }
            | Expr::Unary(_, _, p)
            | Expr::Binary(_, _, _, p)
            | Expr::Call { position: p, .. }
            | Expr::Attribute(_, _, p)
            | Expr::Subscript(_, _, p) => *p,
            Expr::Name(n) => n.position,
        }
    }
}
