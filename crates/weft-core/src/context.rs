use std::collections::BTreeMap;

use crate::error::ContextError;
use crate::hash::{Fingerprint, Hashable};

pub const FRAME: &str = "frame";
pub const FRAMES_PER_SECOND: &str = "framesPerSecond";

/// Variables with this prefix describe interface state only; they are
/// excluded from [`Context::hash`].
pub const UI_PREFIX: &str = "ui:";

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringVector(Vec<String>),
}

impl ContextValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ContextValue::Bool(_) => "bool",
            ContextValue::Int(_) => "int",
            ContextValue::Float(_) => "float",
            ContextValue::String(_) => "string",
            ContextValue::StringVector(_) => "string vector",
        }
    }
}

impl Hashable for ContextValue {
    fn hash_into(&self, h: &mut Fingerprint) {
        h.append(self.type_name());
        match self {
            ContextValue::Bool(v) => h.append(v),
            ContextValue::Int(v) => h.append(v),
            ContextValue::Float(v) => h.append(v),
            ContextValue::String(v) => h.append(v),
            ContextValue::StringVector(v) => h.append(v),
        };
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Bool(v)
    }
}
impl From<i32> for ContextValue {
    fn from(v: i32) -> Self {
        ContextValue::Int(v.into())
    }
}
impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Int(v)
    }
}
impl From<f32> for ContextValue {
    fn from(v: f32) -> Self {
        ContextValue::Float(v.into())
    }
}
impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        ContextValue::Float(v)
    }
}
impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        ContextValue::String(v.to_string())
    }
}
impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        ContextValue::String(v)
    }
}
impl From<Vec<String>> for ContextValue {
    fn from(v: Vec<String>) -> Self {
        ContextValue::StringVector(v)
    }
}

/// Typed extraction from a [`ContextValue`].
pub trait FromContextValue: Sized {
    const TYPE_NAME: &'static str;
    fn from_context_value(value: &ContextValue) -> Option<Self>;
}

macro_rules! from_context_value {
    ($t:ty, $name:literal, $variant:ident) => {
        impl FromContextValue for $t {
            const TYPE_NAME: &'static str = $name;
            fn from_context_value(value: &ContextValue) -> Option<Self> {
                match value {
                    ContextValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

from_context_value!(bool, "bool", Bool);
from_context_value!(i64, "int", Int);
from_context_value!(f64, "float", Float);
from_context_value!(String, "string", String);
from_context_value!(Vec<String>, "string vector", StringVector);

#[derive(Clone, Debug, PartialEq)]
struct Variable {
    value: ContextValue,
    hash: Fingerprint,
}

/// The named variables a computation is evaluated in.
///
/// Each variable's value fingerprint is computed once, when it is set, so
/// hashing a context and monitoring variable usage never rehash values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    variables: BTreeMap<String, Variable>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ContextValue>) {
        let value = value.into();
        let hash = Fingerprint::of(&value);
        self.variables.insert(name.into(), Variable { value, hash });
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<ContextValue> {
        self.variables.remove(name).map(|v| v.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&ContextValue> {
        self.variables.get(name).map(|v| &v.value)
    }

    pub fn get<T: FromContextValue>(&self, name: &str) -> Result<T, ContextError> {
        let value = self
            .value(name)
            .ok_or_else(|| ContextError::VariableNotFound(name.to_string()))?;
        T::from_context_value(value).ok_or_else(|| ContextError::TypeMismatch {
            name: name.to_string(),
            expected: T::TYPE_NAME,
            actual: value.type_name(),
        })
    }

    /// Like [`get`](Self::get), falling back to `default` when the variable
    /// is missing or holds another type.
    pub fn get_or<T: FromContextValue>(&self, name: &str, default: T) -> T {
        match self.get(name) {
            Ok(v) => v,
            Err(ContextError::VariableNotFound(_)) => default,
            Err(e) => {
                log::warn!("{e}; using default");
                default
            }
        }
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Fingerprint of a single variable's value.
    pub fn variable_hash(&self, name: &str) -> Option<Fingerprint> {
        self.variables.get(name).map(|v| v.hash)
    }

    /// Fingerprint of the whole context, excluding `ui:` variables.
    pub fn hash(&self) -> Fingerprint {
        let mut h = Fingerprint::new();
        for (name, variable) in &self.variables {
            if name.starts_with(UI_PREFIX) {
                continue;
            }
            h.append(name).append(&variable.hash);
        }
        h
    }

    pub fn frame(&self) -> f64 {
        self.get_or(FRAME, 1.0)
    }

    pub fn set_frame(&mut self, frame: f64) {
        self.set(FRAME, frame);
    }

    pub fn frames_per_second(&self) -> f64 {
        self.get_or(FRAMES_PER_SECOND, 24.0)
    }

    pub fn set_frames_per_second(&mut self, fps: f64) {
        self.set(FRAMES_PER_SECOND, fps);
    }

    /// Time in seconds for the current frame.
    pub fn time(&self) -> f64 {
        self.frame() / self.frames_per_second()
    }

    pub fn set_time(&mut self, seconds: f64) {
        let fps = self.frames_per_second();
        self.set_frame(seconds * fps);
    }
}
