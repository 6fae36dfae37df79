//! Syntax tree of definition scripts.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Function(FunctionDef),
    Class(ClassDef),
    Raise(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    /// Shared with every closure compiled from this definition.
    pub body: Arc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub items: Vec<ClassItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassItem {
    pub line: usize,
    pub kind: ClassItemKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassItemKind {
    Method(FunctionDef),
    Value { name: String, expr: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Argument reference.
    Name(String),
    /// The method receiver.
    SelfRef,
    Field {
        target: Box<Expr>,
        name: String,
    },
    /// Call of a function or class of the same unit.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    MethodCall {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `a + b + ...`, at least two terms, folded left to right.
    Sum(Vec<Expr>),
    /// `set self.field = value`
    SetField {
        name: String,
        value: Box<Expr>,
    },
    Raise(Box<Expr>),
}
