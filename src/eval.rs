use std::collections::HashMap;
use std::fmt;

use crate::result::Result;
use crate::value::{Record, Value, ValueType};

/// Expression evaluation is a collaborator, not part of the engine: the
/// engine hands expression text plus the data it may reference to an
/// injected `Evaluator` and never parses the text itself.
pub trait Evaluator: fmt::Debug + Send + Sync {
    fn evaluate(
        &self,
        expr: &str,
        record: Option<&Record>,
        context: &EvaluationContext,
        want: ValueType,
    ) -> Result<Value>;
}

/// Named values visible to every expression of one parse/compose call.
/// The engine itself binds `prefix` while resolving object choices;
/// callers may seed anything else between calls.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    vars: HashMap<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }
}

/// The context variable bound to the discriminator read ahead of a
/// polymorphic object.
pub const PREFIX_VAR: &str = "prefix";
