//! Runtime values. An [`Instance`] is self-describing: the variant carries
//! everything the executor needs, so no type information survives into the
//! run. Containers own their elements, records own their fields, and
//! function values are just a handle onto the declaration to fire.

use cir::OriginIdx;
use symbol::Symbol;

#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Unit,
    /// The value of `none` and of defaulted nullables
    Null,
    /// Fixed array. The length never changes after construction
    Array(Vec<Instance>),
    /// Growable sequence
    Seq(Vec<Instance>),
    Record {
        class: OriginIdx,
        fields: Vec<(Symbol, Instance)>,
    },
    /// A function used as a value, lambda or named
    Fn(OriginIdx),
}

impl Instance {
    pub fn field(&self, name: Symbol) -> Option<&Instance> {
        match self {
            Instance::Record { fields, .. } => fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub(crate) fn field_mut(&mut self, name: Symbol) -> Option<&mut Instance> {
        match self {
            Instance::Record { fields, .. } => fields
                .iter_mut()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Condition semantics: booleans decide, a `None` is false, and any
    /// other value is true
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Instance::Bool(b) => *b,
            Instance::Null => false,
            _ => true,
        }
    }
}

impl From<i64> for Instance {
    fn from(value: i64) -> Instance {
        Instance::Int(value)
    }
}

impl From<f64> for Instance {
    fn from(value: f64) -> Instance {
        Instance::Float(value)
    }
}

impl From<bool> for Instance {
    fn from(value: bool) -> Instance {
        Instance::Bool(value)
    }
}

impl From<char> for Instance {
    fn from(value: char) -> Instance {
        Instance::Char(value)
    }
}

impl From<&str> for Instance {
    fn from(value: &str) -> Instance {
        Instance::Str(String::from(value))
    }
}

impl From<&String> for Instance {
    fn from(value: &String) -> Instance {
        Instance::from(value.as_str())
    }
}
