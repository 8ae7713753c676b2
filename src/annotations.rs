use std::collections::{BTreeMap, BTreeSet};

use crate::decl::{Declaration, Primitive, TypeRef};
use crate::equations::{HEffect, Value};
use crate::keys::{Direction, HashKey, ParamConstraint};

/// Facts synthesized for one declaration. Every key stored here is the
/// stabilized base form of the declaration's primary key; direction-variant
/// information is folded into the contract string.
#[derive(Debug, Default)]
pub(crate) struct MethodAnnotations {
    pub(crate) not_nulls: BTreeSet<HashKey>,
    pub(crate) pures: BTreeSet<HashKey>,
    pub(crate) contracts: BTreeMap<HashKey, String>,
}

/// One contract clause: a constraint per source parameter plus an outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
struct ContractClause {
    args: Vec<ClauseConstraint>,
    outcome: ClauseOutcome,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ClauseConstraint {
    Any,
    NotNull,
    Null,
    True,
    False,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ClauseOutcome {
    Fail,
    NotNull,
    Null,
    True,
    False,
}

impl ContractClause {
    fn new(arity: usize, param: u16, constraint: ParamConstraint, outcome: ClauseOutcome) -> Self {
        let mut args = vec![ClauseConstraint::Any; arity];
        if let Some(slot) = args.get_mut(usize::from(param)) {
            *slot = match constraint {
                ParamConstraint::NotNull => ClauseConstraint::NotNull,
                ParamConstraint::Null => ClauseConstraint::Null,
                ParamConstraint::True => ClauseConstraint::True,
                ParamConstraint::False => ClauseConstraint::False,
            };
        }
        Self { args, outcome }
    }

    /// All argument positions are wildcards.
    fn is_trivial(&self) -> bool {
        self.args.iter().all(|arg| *arg == ClauseConstraint::Any)
    }

    /// Canonical text: `,`-joined constraints, `->`, outcome. No whitespace.
    fn render(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(|arg| arg.token()).collect();
        format!("{}->{}", args.join(","), self.outcome.token())
    }
}

impl ClauseConstraint {
    fn token(self) -> &'static str {
        match self {
            ClauseConstraint::Any => "_",
            ClauseConstraint::NotNull => "!null",
            ClauseConstraint::Null => "null",
            ClauseConstraint::True => "true",
            ClauseConstraint::False => "false",
        }
    }
}

impl ClauseOutcome {
    fn token(self) -> &'static str {
        match self {
            ClauseOutcome::Fail => "fail",
            ClauseOutcome::NotNull => "!null",
            ClauseOutcome::Null => "null",
            ClauseOutcome::True => "true",
            ClauseOutcome::False => "false",
        }
    }
}

fn clause_outcome(value: Value) -> Option<ClauseOutcome> {
    match value {
        Value::Fail => Some(ClauseOutcome::Fail),
        Value::NotNull => Some(ClauseOutcome::NotNull),
        Value::Null => Some(ClauseOutcome::Null),
        Value::True => Some(ClauseOutcome::True),
        Value::False => Some(ClauseOutcome::False),
        Value::Top | Value::Bot | Value::Pure => None,
    }
}

/// Enumerate the direction-variant keys that must be solved for a declaration:
/// the primary key first, then for every reference parameter the four
/// null-constraint variants, and for every boolean parameter the four
/// truth-constraint variants. Other primitives get none.
pub(crate) fn mk_in_out_keys(declaration: &Declaration, primary: HashKey) -> Vec<HashKey> {
    let mut keys = Vec::with_capacity(declaration.params.len() * 4 + 2);
    keys.push(primary);
    for (index, param_type) in declaration.params.iter().enumerate() {
        let param = index as u16;
        let constraints: &[ParamConstraint] = match param_type {
            TypeRef::Primitive(Primitive::Boolean) => {
                &[ParamConstraint::True, ParamConstraint::False]
            }
            TypeRef::Primitive(_) => continue,
            _ => &[ParamConstraint::NotNull, ParamConstraint::Null],
        };
        for &constraint in constraints {
            keys.push(primary.with_direction(Direction::In { param, constraint }));
        }
        for &constraint in constraints {
            keys.push(primary.with_direction(Direction::InThrow { param, constraint }));
        }
    }
    keys
}

/// Fold the solved values of one declaration's direction variants into
/// annotations. Callers run `add_effect_annotations` first: the `Fail` filter
/// consults the purity facts already recorded.
pub(crate) fn add_method_annotations(
    solution: &BTreeMap<HashKey, Value>,
    annotations: &mut MethodAnnotations,
    method_key: HashKey,
    arity: usize,
) {
    let mut clauses: Vec<ContractClause> = Vec::new();

    for (&entry_key, &value) in solution {
        if value == Value::Top
            || value == Value::Bot
            || (value == Value::Fail && !annotations.pures.contains(&method_key))
        {
            continue;
        }
        // Declaration keys are always stable; equation keys must be stabilized
        // before they can match.
        let entry_key = entry_key.stabilized();
        if entry_key.base() != method_key {
            continue;
        }
        let direction = entry_key.direction();
        if value == Value::NotNull && direction == Direction::Out {
            annotations.not_nulls.insert(method_key);
        } else if value == Value::Pure && direction == Direction::Pure {
            annotations.pures.insert(method_key);
        } else if let Some((param, constraint)) = direction.param_constraint() {
            if let Some(outcome) = clause_outcome(value) {
                clauses.push(ContractClause::new(arity, param, constraint, outcome));
            }
        }
    }

    // An unconditional not-null fact subsumes every conditional clause.
    if annotations.not_nulls.contains(&method_key) || clauses.is_empty() {
        return;
    }

    let (failing, non_failing): (Vec<_>, Vec<_>) = clauses
        .into_iter()
        .partition(|clause| clause.outcome == ClauseOutcome::Fail);
    let failing = squash_clauses(failing);
    let mut non_failing = squash_clauses(non_failing);

    // "null,_->!null;!null,_->!null" squashes to "_,_->!null", which is the
    // plain not-null fact in a cheaper representation.
    if non_failing.len() == 1 {
        let clause = &non_failing[0];
        if clause.outcome == ClauseOutcome::NotNull && clause.is_trivial() {
            non_failing.clear();
            annotations.not_nulls.insert(method_key);
        }
    }

    let mut rendered: Vec<String> = failing.iter().map(ContractClause::render).collect();
    rendered.sort();
    let mut rendered_non_failing: Vec<String> =
        non_failing.iter().map(ContractClause::render).collect();
    rendered_non_failing.sort();
    rendered.extend(rendered_non_failing);

    let joined = rendered.join(";");
    if !joined.is_empty() {
        annotations
            .contracts
            .insert(method_key, format!("\"{joined}\""));
    }
}

/// Single-pass clause squashing: scan ordered pairs, and on the first pair
/// with identical outcome that agrees on wildcards and differs in at most one
/// complementary position, collapse the whole group to the fully-wildcarded
/// clause. Deliberately not a fixpoint; later merge opportunities are left
/// as-is.
fn squash_clauses(clauses: Vec<ContractClause>) -> Vec<ContractClause> {
    for left in 0..clauses.len() {
        for right in (left + 1)..clauses.len() {
            if mergeable(&clauses[left], &clauses[right]) {
                let mut clause = clauses[left].clone();
                clause.args.fill(ClauseConstraint::Any);
                return vec![clause];
            }
        }
    }
    clauses
}

fn mergeable(left: &ContractClause, right: &ContractClause) -> bool {
    if left.outcome != right.outcome {
        return false;
    }
    let mut merge_position = None;
    for (index, (a, b)) in left.args.iter().zip(&right.args).enumerate() {
        if *a == ClauseConstraint::Any && *b == ClauseConstraint::Any {
            continue;
        }
        if merge_position.is_some() {
            return false;
        }
        if complementary(*a, *b) {
            merge_position = Some(index);
        } else {
            return false;
        }
    }
    true
}

fn complementary(left: ClauseConstraint, right: ClauseConstraint) -> bool {
    matches!(
        (left, right),
        (ClauseConstraint::NotNull, ClauseConstraint::Null)
            | (ClauseConstraint::Null, ClauseConstraint::NotNull)
            | (ClauseConstraint::True, ClauseConstraint::False)
            | (ClauseConstraint::False, ClauseConstraint::True)
    )
}

/// Fold solved effect sets into the purity fact. A constructor mutating the
/// object under construction has no externally observable side effect.
pub(crate) fn add_effect_annotations(
    purity_solutions: &BTreeMap<HashKey, BTreeSet<HEffect>>,
    annotations: &mut MethodAnnotations,
    method_key: HashKey,
    is_constructor: bool,
) {
    for (&entry_key, effects) in purity_solutions {
        let entry_key = entry_key.stabilized();
        if entry_key.base() != method_key {
            continue;
        }
        if effects.is_empty()
            || (is_constructor && effects.len() == 1 && effects.contains(&HEffect::ThisChange))
        {
            annotations.pures.insert(method_key);
        }
    }
}
