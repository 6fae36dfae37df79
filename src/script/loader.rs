//! Executes definition scripts into a [`LoadScope`].

use std::path::Path;

use crate::registry::{CallError, ClassIdentity, Member, Members};
use crate::reload::{Frame, LoadError, LoadScope, UnitLoader, UnitSource};

use super::ast::{ClassDef, ClassItemKind, StmtKind};
use super::eval::Env;
use super::parser::parse;

/// [`UnitLoader`] for `.hr` definition scripts.
///
/// The whole script is parsed before anything is registered, so a syntax
/// error leaves every identity untouched. Statements then run top to bottom.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefinitionLoader;

impl DefinitionLoader {
    pub fn new() -> Self {
        Self
    }
}

fn frame(origin: &Path, line: usize, context: impl Into<String>) -> Frame {
    Frame::new(origin, Some(line), context)
}

impl UnitLoader for DefinitionLoader {
    fn load(&self, source: &UnitSource<'_>, scope: &mut LoadScope<'_>) -> Result<(), LoadError> {
        let program = parse(source.text).map_err(|e| {
            LoadError::syntax(
                e.message,
                frame(source.origin, e.line, format!("<unit {}>", source.name)),
            )
        })?;

        let env = Env::new(scope.registry().clone(), source.name);
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::Function(def) => {
                    scope.define_function(&def.name, env.function(def));
                }
                StmtKind::Class(def) => {
                    define_class(source.origin, stmt.line, def, &env, scope)?;
                }
                StmtKind::Raise(expr) => {
                    let context = format!("<unit {}>", source.name);
                    let error = match env.evaluate(expr) {
                        Ok(message) => CallError::Raised(message.to_string()),
                        Err(error) => error,
                    };
                    return Err(LoadError::execution(
                        &error,
                        vec![frame(source.origin, stmt.line, context)],
                    ));
                }
            }
        }

        Ok(())
    }
}

fn define_class(
    origin: &Path,
    line: usize,
    def: &ClassDef,
    env: &Env,
    scope: &mut LoadScope<'_>,
) -> Result<ClassIdentity, LoadError> {
    let context = format!("class {}", def.name);

    let mut bases = Vec::with_capacity(def.bases.len());
    for base in &def.bases {
        let class = scope.class(base).ok_or_else(|| LoadError::Execution {
            message: format!("error: base class '{base}' is not defined"),
            frames: vec![frame(origin, line, context.clone())],
        })?;
        bases.push(class);
    }

    let mut members = Members::new();
    for item in &def.items {
        match &item.kind {
            ClassItemKind::Method(method) => {
                members.insert(method.name.clone(), Member::Method(env.method(method)));
            }
            ClassItemKind::Value { name, expr } => {
                let value = env.evaluate(expr).map_err(|e| {
                    LoadError::execution(&e, vec![frame(origin, item.line, context.clone())])
                })?;
                members.insert(name.clone(), Member::Value(value));
            }
        }
    }

    scope
        .define_class(&def.name, bases, members)
        .map_err(|source| LoadError::Registry {
            source,
            frames: vec![frame(origin, line, context)],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, Value};
    use std::sync::Arc;

    fn run(registry: &Arc<Registry>, text: &str) -> Result<crate::reload::Namespace, LoadError> {
        let origin = Path::new("/src/app.hr");
        let source = UnitSource {
            name: "app",
            origin,
            text,
        };
        let mut scope = LoadScope::new("app", origin, registry);
        DefinitionLoader.load(&source, &mut scope)?;
        Ok(scope.into_namespace())
    }

    #[test]
    fn test_loads_functions_and_classes() {
        let registry = Arc::new(Registry::new());
        let text = "\
fn double(x) = x + x
class Greeter {
    greeting = \"hi \"
    fn init(name) = set self.name = name
    fn greet() = self.greeting + self.name
}
fn make(name) = Greeter(name)
";
        let namespace = run(&registry, text).unwrap();
        let double = namespace.function("double").unwrap();
        assert_eq!(double.call(&[Value::Int(4)]).unwrap(), Value::Int(8));

        let made = namespace.function("make").unwrap().call(&[Value::from("ann")]).unwrap();
        let instance = made.as_instance().unwrap();
        assert_eq!(instance.call_method("greet", &[]).unwrap(), Value::from("hi ann"));
        assert!(instance.class().ptr_eq(&namespace.class("Greeter").unwrap()));
    }

    #[test]
    fn test_syntax_error_registers_nothing() {
        let registry = Arc::new(Registry::new());
        let err = run(&registry, "fn ok() = 1\nfn broken( = 2\n").unwrap_err();
        let frames = err.frames();
        assert_eq!(frames[0].line, Some(2));
        assert_eq!(frames[0].context, "<unit app>");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_top_level_raise_reports_line() {
        let registry = Arc::new(Registry::new());
        let err = run(&registry, "fn f() = 1\n\nraise \"stop\"\n").unwrap_err();
        assert_eq!(err.to_string(), "error: stop");
        assert_eq!(err.frames()[0].line, Some(3));
    }

    #[test]
    fn test_unknown_base_class() {
        let registry = Arc::new(Registry::new());
        let err = run(&registry, "class C: Missing {\n}\n").unwrap_err();
        assert!(err.to_string().contains("base class 'Missing'"));
    }

    #[test]
    fn test_inherited_methods() {
        let registry = Arc::new(Registry::new());
        let text = "class Base {\n  fn hello() = \"base\"\n}\nclass Child: Base {\n}\n";
        let namespace = run(&registry, text).unwrap();
        let child = namespace.class("Child").unwrap().instantiate(&[]).unwrap();
        assert_eq!(child.call_method("hello", &[]).unwrap(), Value::from("base"));
    }

    #[test]
    fn test_reinit_failure_surfaces_as_registry_error() {
        let registry = Arc::new(Registry::new());
        let first = run(&registry, "class C {\n  fn v() = 1\n}\n").unwrap();
        let obj = first.class("C").unwrap().instantiate(&[]).unwrap();

        let err = run(
            &registry,
            "class C {\n  fn v() = 2\n  fn reinit() = raise \"no\"\n}\n",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Registry { .. }));
        assert_eq!(err.frames()[0].context, "class C");
        assert_eq!(obj.call_method("v", &[]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_hostile_sources_fail_on_a_worker_sized_stack() {
        let worker = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let registry = Arc::new(Registry::new());
                let deep = format!("fn f() = {}1{}\n", "(".repeat(5000), ")".repeat(5000));
                let err = run(&registry, &deep).unwrap_err();
                assert!(matches!(err, LoadError::Syntax { .. }), "{err}");
                assert!(registry.is_empty());

                let long = format!("fn f() = 1{}\n", " + 1".repeat(99_999));
                let namespace = run(&registry, &long).unwrap();
                let f = namespace.function("f").unwrap();
                assert_eq!(f.call(&[]).unwrap(), Value::Int(100_000));
            })
            .unwrap();
        worker.join().unwrap();
    }
}
