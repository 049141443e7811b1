//! AST node definitions.
//!
//! Each consumer of the tree (checker, code generator, printer) matches on
//! the node enums directly; adding a node kind forces every consumer to be
//! updated.

use crate::ops::{BinaryOp, OverloadOp, Prim, UnaryOp};
use scc_common::{Atom, FileId, Span};

/// Unique id of an AST node within one compilation run.
pub type NodeId = u32;

/// Hands out fresh node ids. One generator is shared by the parser and the
/// template instantiator so ids never collide.
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: NodeId,
}

impl NodeIdGen {
    pub fn new() -> Self {
        NodeIdGen::default()
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// An identifier occurrence.
#[derive(Clone, Debug)]
pub struct Ident {
    pub id: NodeId,
    pub span: Span,
    pub name: Atom,
}

/*******************************************************************************
  Type expressions
*******************************************************************************/

#[derive(Clone, Debug)]
pub struct SecTypeExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: SecTypeExprKind,
}

#[derive(Clone, Debug)]
pub enum SecTypeExprKind {
    Public,
    /// A domain name or a quantified domain variable.
    Named(Ident),
}

impl SecTypeExpr {
    pub fn is_public(&self) -> bool {
        matches!(self.kind, SecTypeExprKind::Public)
    }

    pub fn identifier(&self) -> Option<&Ident> {
        match &self.kind {
            SecTypeExprKind::Public => None,
            SecTypeExprKind::Named(id) => Some(id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DataTypeExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: DataTypeExprKind,
}

#[derive(Clone, Debug)]
pub enum DataTypeExprKind {
    /// A built-in primitive keyword.
    Const(Prim),
    /// A data-type variable, user primitive, or plain struct name.
    Var(Ident),
    /// A struct template application `name<args>`.
    Template(Ident, Vec<TypeArgExpr>),
}

#[derive(Clone, Debug)]
pub struct DimTypeExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: DimTypeExprKind,
}

#[derive(Clone, Debug)]
pub enum DimTypeExprKind {
    Const(u32),
    Var(Ident),
}

#[derive(Clone, Debug)]
pub struct TypeExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeExprKind,
}

#[derive(Clone, Debug)]
pub enum TypeExprKind {
    Void,
    Basic {
        sec: SecTypeExpr,
        data: DataTypeExpr,
        dim: DimTypeExpr,
    },
}

impl TypeExpr {
    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeExprKind::Void)
    }
}

/// A syntactic type argument of a struct template application.
#[derive(Clone, Debug)]
pub struct TypeArgExpr {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeArgExprKind,
}

#[derive(Clone, Debug)]
pub enum TypeArgExprKind {
    /// A type variable of any kind (resolved during checking).
    Var(Ident),
    /// A nested struct template application.
    Template(Ident, Vec<TypeArgExpr>),
    /// A built-in primitive constant.
    DataConst(Prim),
    /// A dimensionality constant.
    DimConst(u32),
    /// The distinguished `public` security type.
    Public,
}

/*******************************************************************************
  Quantifiers
*******************************************************************************/

#[derive(Clone, Debug)]
pub struct Quantifier {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub kind: QuantifierKind,
}

#[derive(Clone, Debug)]
pub enum QuantifierKind {
    /// `domain D` or `domain D : kindName`
    Domain(Option<Ident>),
    /// `type T`
    Data,
    /// `dim N`
    Dim,
}

/*******************************************************************************
  Expressions
*******************************************************************************/

#[derive(Clone, Debug)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    IntLit(u64),
    FloatLit(f64),
    BoolLit(bool),
    StrLit(String),
    /// R-value read of a variable.
    Var(Ident),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `lval = e`, or `lval op= e` when `op` is set.
    Assign {
        op: Option<BinaryOp>,
        lval: Box<LValue>,
        rhs: Box<Expr>,
    },
    /// `++x`, `--x`, `x++`, `x--`
    IncDec {
        lval: Box<LValue>,
        is_inc: bool,
        is_prefix: bool,
    },
    /// `(ty) e`: explicit data-type cast.
    Cast {
        ty: DataTypeExpr,
        expr: Box<Expr>,
    },
    Classify(Box<Expr>),
    Declassify(Box<Expr>),
    /// `__domainid(D)`
    DomainId(Ident),
    ProcCall {
        name: Ident,
        args: Vec<Expr>,
    },
    Index {
        expr: Box<Expr>,
        subs: Vec<Subscript>,
    },
    Shape(Box<Expr>),
    Size(Box<Expr>),
    Reshape {
        expr: Box<Expr>,
        dims: Vec<Expr>,
    },
    Cat {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        /// The axis, when given; defaults to 0.
        dim: Option<Box<Expr>>,
    },
    ToString(Box<Expr>),
    Strlen(Box<Expr>),
    StringFromBytes(Box<Expr>),
    BytesFromString(Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `{ e1, e2, ..., en }`
    ArrayCtor(Vec<Expr>),
    /// `e.field`
    Select {
        expr: Box<Expr>,
        field: Ident,
    },
    /// `e :: quals`: pushes type context onto the sub-expression.
    Qualified {
        expr: Box<Expr>,
        quals: Vec<TypeQual>,
    },
}

#[derive(Clone, Debug)]
pub enum TypeQual {
    Sec(SecTypeExpr),
    Data(DataTypeExpr),
    Dim(DimTypeExpr),
}

#[derive(Clone, Debug)]
pub enum Subscript {
    Index(Expr),
    /// `lo : hi` with either bound optional.
    Slice(Option<Expr>, Option<Expr>),
}

/*******************************************************************************
  LValues
*******************************************************************************/

#[derive(Clone, Debug)]
pub struct LValue {
    pub id: NodeId,
    pub span: Span,
    pub kind: LValueKind,
}

#[derive(Clone, Debug)]
pub enum LValueKind {
    Var(Ident),
    Index {
        lval: Box<LValue>,
        subs: Vec<Subscript>,
    },
    Select {
        lval: Box<LValue>,
        field: Ident,
    },
}

/*******************************************************************************
  Statements
*******************************************************************************/

#[derive(Clone, Debug)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Compound(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<ForInit>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Decl(VarDecl),
    Expr(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    Print(Vec<Expr>),
    Assert(Expr),
}

#[derive(Clone, Debug)]
pub enum ForInit {
    Decl(VarDecl),
    Expr(Expr),
}

/// `ty name(shape) = init, name2 = init2, ...;`
#[derive(Clone, Debug)]
pub struct VarDecl {
    pub id: NodeId,
    pub span: Span,
    pub ty: TypeExpr,
    pub inits: Vec<VarInit>,
}

#[derive(Clone, Debug)]
pub struct VarInit {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub shape: Vec<Expr>,
    pub init: Option<Expr>,
}

/*******************************************************************************
  Declarations
*******************************************************************************/

/// A procedure, operator or cast definition. Operators and casts are
/// resolved through the same overload machinery as procedures and share
/// the definition node.
#[derive(Clone, Debug)]
pub struct ProcDef {
    pub id: NodeId,
    pub span: Span,
    pub kind: ProcDefKind,
    pub name: Ident,
    pub ret: TypeExpr,
    pub params: Vec<VarDecl>,
    pub body: Stmt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcDefKind {
    Proc,
    Operator(OverloadOp),
    Cast,
}

impl ProcDef {
    pub fn is_operator(&self) -> bool {
        !matches!(self.kind, ProcDefKind::Proc)
    }
}

/// `template <quantifiers> procdef`
#[derive(Clone, Debug)]
pub struct TemplateDecl {
    pub id: NodeId,
    pub span: Span,
    pub quantifiers: Vec<Quantifier>,
    pub body: ProcDef,
}

/// `struct name { fields }`, optionally under a template header.
#[derive(Clone, Debug)]
pub struct StructDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub quantifiers: Vec<Quantifier>,
    pub fields: Vec<FieldDecl>,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub id: NodeId,
    pub span: Span,
    pub ty: TypeExpr,
    pub name: Ident,
}

/// A data type declared inside a kind block, with optional per-kind
/// parameters.
#[derive(Clone, Debug)]
pub struct KindTypeDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub public_type: Option<Prim>,
    pub size: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct KindDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub types: Vec<KindTypeDecl>,
}

/// `domain name : kind;`
#[derive(Clone, Debug)]
pub struct DomainDecl {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub kind: Ident,
}

/// Procedure, template and struct declarations are reference-counted so
/// their defining symbols can keep the definition alive independently of
/// the module tree.
#[derive(Clone, Debug)]
pub enum GlobalDecl {
    Kind(KindDecl),
    Domain(DomainDecl),
    Struct(std::rc::Rc<StructDecl>),
    Template(std::rc::Rc<TemplateDecl>),
    Proc(std::rc::Rc<ProcDef>),
    Var(VarDecl),
}

#[derive(Clone, Debug)]
pub struct Import {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
}

/// One parsed module (a source file).
#[derive(Clone, Debug)]
pub struct Module {
    pub id: NodeId,
    pub file: FileId,
    pub name: Option<Ident>,
    pub imports: Vec<Import>,
    pub decls: Vec<GlobalDecl>,
}

/// A whole multi-module program, modules in parse order. The main module
/// is last.
#[derive(Clone, Debug)]
pub struct Program {
    pub modules: Vec<Module>,
}
