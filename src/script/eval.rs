//! Evaluation of script expressions.
//!
//! Compiled functions and methods capture the registry and their unit name,
//! not other identities: every call by name is resolved when it runs, so it
//! always reaches the current definition.

use std::cell::Cell;
use std::thread::LocalKey;
use std::sync::Arc;

use crate::registry::{CallError, Implementation, Instance, Registry, Value};

use super::ast::{Expr, FunctionDef, Literal};

/// Nested script calls allowed on one thread before a call fails.
pub const MAX_CALL_DEPTH: usize = 128;

/// Expression levels one thread may evaluate at once, calls included.
const MAX_EVAL_DEPTH: usize = 256;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard(&'static LocalKey<Cell<usize>>);

impl DepthGuard {
    fn enter(
        counter: &'static LocalKey<Cell<usize>>,
        limit: usize,
        what: &str,
    ) -> Result<Self, CallError> {
        counter.with(|depth| {
            if depth.get() >= limit {
                return Err(CallError::Raised(format!(
                    "maximum {what} depth of {limit} exceeded"
                )));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard(counter))
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.0.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// What a body can see while it runs.
struct Locals<'a> {
    params: &'a [String],
    args: &'a [Value],
    receiver: Option<&'a Instance>,
}

/// Resolution context shared by everything compiled from one unit.
#[derive(Clone)]
pub(crate) struct Env {
    registry: Arc<Registry>,
    unit: Arc<str>,
}

impl Env {
    pub(crate) fn new(registry: Arc<Registry>, unit: &str) -> Self {
        Self {
            registry,
            unit: Arc::from(unit),
        }
    }

    /// Compile a top-level function.
    pub(crate) fn function(&self, def: &FunctionDef) -> Implementation {
        let env = self.clone();
        let params = def.params.clone();
        let body = def.body.clone();
        let arity = params.len();
        Implementation::new(move |args: &[Value]| {
            let _depth = DepthGuard::enter(&DEPTH, MAX_CALL_DEPTH, "call")?;
            let locals = Locals {
                params: &params,
                args,
                receiver: None,
            };
            env.eval(&body, &locals)
        })
        .with_arity(arity)
    }

    /// Compile a method; `self` is bound to the receiver.
    pub(crate) fn method(&self, def: &FunctionDef) -> Implementation {
        let env = self.clone();
        let params = def.params.clone();
        let body = def.body.clone();
        let arity = params.len();
        Implementation::method(move |this: &Instance, args: &[Value]| {
            let _depth = DepthGuard::enter(&DEPTH, MAX_CALL_DEPTH, "call")?;
            let locals = Locals {
                params: &params,
                args,
                receiver: Some(this),
            };
            env.eval(&body, &locals)
        })
        .with_arity(arity)
    }

    /// Evaluate an expression outside any function, e.g. a class-level value.
    pub(crate) fn evaluate(&self, expr: &Expr) -> Result<Value, CallError> {
        let locals = Locals {
            params: &[],
            args: &[],
            receiver: None,
        };
        self.eval(expr, &locals)
    }

    fn eval(&self, expr: &Expr, locals: &Locals<'_>) -> Result<Value, CallError> {
        let _depth = DepthGuard::enter(&EVAL_DEPTH, MAX_EVAL_DEPTH, "expression")?;
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(x) => Value::Float(*x),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Name(name) => locals
                .params
                .iter()
                .position(|param| param == name)
                .and_then(|index| locals.args.get(index).cloned())
                .ok_or_else(|| CallError::Unbound { name: name.clone() }),
            Expr::SelfRef => locals
                .receiver
                .map(|this| Value::Instance(this.clone()))
                .ok_or(CallError::MissingReceiver),
            Expr::Field { target, name } => {
                let target = self.eval(target, locals)?;
                let instance = expect_instance(&target, name)?;
                instance.get(name).ok_or_else(|| CallError::NoSuchMember {
                    class: instance.class().key().name.clone(),
                    member: name.clone(),
                })
            }
            Expr::Call { name, args } => {
                let args = self.eval_all(args, locals)?;
                self.call(name, &args)
            }
            Expr::MethodCall { target, name, args } => {
                let target = self.eval(target, locals)?;
                let instance = expect_instance(&target, name)?;
                let args = self.eval_all(args, locals)?;
                instance.call_method(name, &args)
            }
            Expr::Sum(terms) => {
                let Some((first, rest)) = terms.split_first() else {
                    return Ok(Value::Null);
                };
                let mut total = self.eval(first, locals)?;
                for term in rest {
                    total = add(total, self.eval(term, locals)?)?;
                }
                Ok(total)
            }
            Expr::SetField { name, value } => {
                let this = locals.receiver.ok_or(CallError::MissingReceiver)?;
                let value = self.eval(value, locals)?;
                this.set(name.clone(), value.clone());
                Ok(value)
            }
            Expr::Raise(message) => {
                let message = self.eval(message, locals)?;
                Err(CallError::Raised(message.to_string()))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr], locals: &Locals<'_>) -> Result<Vec<Value>, CallError> {
        exprs.iter().map(|expr| self.eval(expr, locals)).collect()
    }

    /// Call a function of this unit, or instantiate a class of it.
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        if let Some(function) = self.registry.function(&self.unit, name) {
            return function.call(args);
        }
        if let Some(class) = self.registry.class(&self.unit, name) {
            return class.instantiate(args).map(Value::Instance);
        }
        Err(CallError::Unbound {
            name: name.to_string(),
        })
    }
}

fn expect_instance<'v>(value: &'v Value, member: &str) -> Result<&'v Instance, CallError> {
    value.as_instance().ok_or_else(|| CallError::NoSuchMember {
        class: value.type_name().to_string(),
        member: member.to_string(),
    })
}

fn add(left: Value, right: Value) -> Result<Value, CallError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| CallError::Raised("integer overflow".to_string())),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (left, right) => Err(CallError::TypeMismatch {
            op: "+",
            left: left.type_name(),
            right: right.type_name(),
        }),
    }
}
