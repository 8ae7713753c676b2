use serde::Deserialize;

use crate::keys::{HashKey, RawKey};

/// Result lattice for inferred facts. The middle elements are mutually
/// incomparable; `Bot` is unreachable/contradiction, `Top` is unknown.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Value {
    Bot,
    NotNull,
    Null,
    True,
    False,
    Fail,
    Pure,
    Top,
}

impl Value {
    /// Least upper bound: `Bot` is the identity, distinct middles go to `Top`.
    pub(crate) fn join(self, other: Value) -> Value {
        match (self, other) {
            (a, b) if a == b => a,
            (Value::Bot, b) => b,
            (a, Value::Bot) => a,
            _ => Value::Top,
        }
    }

    /// Greatest lower bound: `Top` is the identity, distinct middles go to `Bot`.
    pub(crate) fn meet(self, other: Value) -> Value {
        match (self, other) {
            (a, b) if a == b => a,
            (Value::Top, b) => b,
            (a, Value::Top) => a,
            _ => Value::Bot,
        }
    }

    /// Inversion applied when a dependency is referenced through a negated key.
    pub(crate) fn negate(self) -> Value {
        match self {
            Value::True => Value::False,
            Value::False => Value::True,
            other => other,
        }
    }
}

/// One conjunctive product of a pending sum: `value` holds if every id does.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Product {
    pub(crate) value: Value,
    pub(crate) ids: Vec<RawKey>,
}

/// Where a call argument's data comes from, used to remap callee effects.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DataValue {
    This,
    Local,
    Param(u16),
    Return,
    Unknown,
}

/// One atomic unit of observable side effect.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EffectQuantum {
    /// Arbitrary, unknown effect.
    Top,
    /// Mutates the receiver.
    ThisChange,
    /// Mutates the data reachable from the parameter.
    ParamChange(u16),
    /// Effects of a callee, pending its own purity solution.
    Call {
        callee: RawKey,
        args: Vec<DataValue>,
        is_static: bool,
    },
}

/// Right-hand side of a raw equation.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Rhs {
    Final(Value),
    Pending(Vec<Product>),
    Effects(Vec<EffectQuantum>),
}

/// One equation over declaration-identity keys, as produced by extraction.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Equation {
    pub(crate) id: RawKey,
    pub(crate) rhs: Rhs,
}

/// Compacted conjunctive product over hash keys.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct HComponent {
    pub(crate) value: Value,
    pub(crate) ids: Vec<HashKey>,
}

/// Compacted effect quantum.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum HEffect {
    Top,
    ThisChange,
    ParamChange(u16),
    Call {
        callee: HashKey,
        args: Vec<DataValue>,
        is_static: bool,
    },
}

/// Compacted right-hand side.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum HRhs {
    Final(Value),
    Pending(Vec<HComponent>),
    Effects(Vec<HEffect>),
}

/// Equation over compact keys; the direction code lives inside the key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct HEquation {
    pub(crate) key: HashKey,
    pub(crate) rhs: HRhs,
}
