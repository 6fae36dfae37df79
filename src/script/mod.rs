//! Definition scripts.
//!
//! A small line-oriented language whose top-level functions and classes are
//! bound through the hot-swap registry:
//!
//! ```text
//! fn greet(name) = "hello " + name
//! class Counter {
//!     start = 0
//!     fn init() = set self.count = self.start
//!     fn bump() = set self.count = self.count + 1
//!     fn reinit() = null
//! }
//! ```

mod ast;
mod eval;
mod lexer;
mod loader;
mod parser;

pub use ast::{ClassDef, ClassItem, ClassItemKind, Expr, FunctionDef, Literal, Program, Stmt, StmtKind};
pub use eval::MAX_CALL_DEPTH;
pub use loader::DefinitionLoader;
pub use parser::{ParseError, ParseResult, parse};

/// File extension of definition scripts.
pub const SCRIPT_EXTENSION: &str = "hr";
