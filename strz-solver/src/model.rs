//! Models of satisfiable problems.
//!
//! A model assigns values to free constants only. Every other term is
//! evaluated from them, which is how the solver validates a model against
//! the asserted formulas.

use rustc_hash::FxHashMap;
use std::fmt;
use strz_core::ast::{TermId, TermKind, TermManager};
use strz_core::sort::SortKind;

/// Value of a term in a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// String value.
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
        }
    }
}

/// Assignment of values to free constants.
#[derive(Debug, Clone, Default)]
pub struct Model {
    strings: FxHashMap<TermId, String>,
    ints: FxHashMap<TermId, i64>,
    bools: FxHashMap<TermId, bool>,
}

impl Model {
    /// Create empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a string constant.
    pub fn assign_string(&mut self, var: TermId, value: String) {
        self.strings.insert(var, value);
    }

    /// Assign an integer constant.
    pub fn assign_int(&mut self, var: TermId, value: i64) {
        self.ints.insert(var, value);
    }

    /// Assign a Boolean constant.
    pub fn assign_bool(&mut self, var: TermId, value: bool) {
        self.bools.insert(var, value);
    }

    /// Value of a string constant.
    pub fn string_value(&self, var: TermId) -> Option<&str> {
        self.strings.get(&var).map(String::as_str)
    }

    /// Value of an integer constant.
    pub fn int_value(&self, var: TermId) -> Option<i64> {
        self.ints.get(&var).copied()
    }

    /// Value of a Boolean constant. Unassigned constants are false.
    pub fn bool_value(&self, var: TermId) -> bool {
        self.bools.get(&var).copied().unwrap_or(false)
    }

    /// String constants and their values.
    pub fn strings(&self) -> impl Iterator<Item = (TermId, &str)> {
        self.strings.iter().map(|(&t, v)| (t, v.as_str()))
    }

    /// Number of assigned constants.
    pub fn len(&self) -> usize {
        self.strings.len() + self.ints.len() + self.bools.len()
    }

    /// Check if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate a term. `None` if it mentions an unassigned string or
    /// integer constant, or if integer arithmetic overflows.
    pub fn eval(&self, tm: &TermManager, term: TermId) -> Option<Value> {
        let value = match tm.kind(term)? {
            TermKind::True => Value::Bool(true),
            TermKind::False => Value::Bool(false),
            TermKind::StringLit(s) => Value::Str(s.clone()),
            TermKind::IntConst(n) => Value::Int(*n),
            TermKind::Var(_) => match tm.sort_kind(term)? {
                SortKind::String => Value::Str(self.strings.get(&term)?.clone()),
                SortKind::Int => Value::Int(*self.ints.get(&term)?),
                SortKind::Bool => Value::Bool(self.bool_value(term)),
            },
            TermKind::StrConcat(a, b) => {
                let mut text = self.eval_str(tm, *a)?;
                text.push_str(&self.eval_str(tm, *b)?);
                Value::Str(text)
            }
            TermKind::StrLen(a) => Value::Int(self.eval_str(tm, *a)?.chars().count() as i64),
            TermKind::Add(args) => {
                let mut sum = 0i64;
                for &arg in args {
                    sum = sum.checked_add(self.eval_int(tm, arg)?)?;
                }
                Value::Int(sum)
            }
            TermKind::Eq(a, b) => Value::Bool(self.eval(tm, *a)? == self.eval(tm, *b)?),
            TermKind::Not(a) => Value::Bool(!self.eval_bool(tm, *a)?),
            TermKind::And(args) => {
                let mut all = true;
                for &arg in args {
                    all &= self.eval_bool(tm, arg)?;
                }
                Value::Bool(all)
            }
            TermKind::Or(args) => {
                let mut any = false;
                for &arg in args {
                    any |= self.eval_bool(tm, arg)?;
                }
                Value::Bool(any)
            }
            TermKind::Implies(p, c) => {
                Value::Bool(!self.eval_bool(tm, *p)? || self.eval_bool(tm, *c)?)
            }
            TermKind::Le(a, b) => Value::Bool(self.eval_int(tm, *a)? <= self.eval_int(tm, *b)?),
            TermKind::Lt(a, b) => Value::Bool(self.eval_int(tm, *a)? < self.eval_int(tm, *b)?),
            TermKind::Ge(a, b) => Value::Bool(self.eval_int(tm, *a)? >= self.eval_int(tm, *b)?),
            TermKind::Gt(a, b) => Value::Bool(self.eval_int(tm, *a)? > self.eval_int(tm, *b)?),
        };
        Some(value)
    }

    fn eval_str(&self, tm: &TermManager, term: TermId) -> Option<String> {
        match self.eval(tm, term)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn eval_int(&self, tm: &TermManager, term: TermId) -> Option<i64> {
        match self.eval(tm, term)? {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    fn eval_bool(&self, tm: &TermManager, term: TermId) -> Option<bool> {
        match self.eval(tm, term)? {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}
