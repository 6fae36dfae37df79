//! Dynamic values and swappable implementations.

use std::fmt;
use std::sync::Arc;

use super::class::Instance;
use super::error::CallError;

/// A value passed to or returned from a hot-swappable callable.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Instance(Instance),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Instance(_) => "instance",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Instance(instance) => {
                write!(f, "<{} #{}>", instance.class().key().name, instance.id())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

type NativeFn = dyn Fn(Option<&Instance>, &[Value]) -> Result<Value, CallError> + Send + Sync;

/// Executable behavior stored behind a function identity or a class method.
///
/// Cloning is cheap: the closure is shared.
#[derive(Clone)]
pub struct Implementation {
    body: Arc<NativeFn>,
    arity: Option<usize>,
}

impl Implementation {
    /// A free function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(move |_: Option<&Instance>, args: &[Value]| f(args)),
            arity: None,
        }
    }

    /// A method; invoking it without a receiver fails.
    pub fn method<F>(f: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(move |receiver: Option<&Instance>, args: &[Value]| match receiver {
                Some(this) => f(this, args),
                None => Err(CallError::MissingReceiver),
            }),
            arity: None,
        }
    }

    /// A function that ignores its arguments and returns `value`.
    pub fn constant(value: Value) -> Self {
        Self::new(move |_| Ok(value.clone())).with_arity(0)
    }

    /// Require exactly `arity` arguments (the receiver is not counted).
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn invoke(&self, receiver: Option<&Instance>, args: &[Value]) -> Result<Value, CallError> {
        if let Some(expected) = self.arity {
            if expected != args.len() {
                return Err(CallError::Arity {
                    expected,
                    got: args.len(),
                });
            }
        }
        (self.body)(receiver, args)
    }

    pub fn ptr_eq(&self, other: &Implementation) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
