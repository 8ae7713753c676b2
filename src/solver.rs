use std::collections::{BTreeMap, BTreeSet};

use crate::equations::{DataValue, HComponent, HEffect, HEquation, HRhs, Value};
use crate::keys::HashKey;

/// Fixed-point solver for the value lattice. Equations are normalized into
/// sums of conjunctive products; the solution of a key is the join over its
/// products of (product value meet the solutions of its dependency keys).
pub(crate) struct Solver {
    pending: BTreeMap<HashKey, Vec<HComponent>>,
}

impl Solver {
    pub(crate) fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    /// Register one compacted equation. A `Final` value is one id-free
    /// product; multiple equations for the same key merge into one sum.
    /// Effect equations belong to the purity solver and are ignored here.
    pub(crate) fn add_equation(&mut self, equation: HEquation) {
        let components = match equation.rhs {
            HRhs::Final(value) => vec![HComponent {
                value,
                ids: Vec::new(),
            }],
            HRhs::Pending(components) => components,
            HRhs::Effects(_) => return,
        };
        self.pending
            .entry(equation.key.canonical())
            .or_default()
            .extend(components);
    }

    /// Resolve to a fixed point. Keys left pending after the worklist drains
    /// (unknown dependencies, cycles) fall back to the unknown lattice value.
    pub(crate) fn solve(self) -> BTreeMap<HashKey, Value> {
        let mut dependencies: BTreeMap<HashKey, BTreeSet<HashKey>> = BTreeMap::new();
        let mut pending: BTreeMap<HashKey, Vec<HComponent>> = BTreeMap::new();
        let mut moving: Vec<(HashKey, Value)> = Vec::new();
        let mut solved: BTreeMap<HashKey, Value> = BTreeMap::new();

        for (key, components) in self.pending {
            match finalize(&components) {
                Some(value) => moving.push((key, value)),
                None => {
                    for component in &components {
                        for id in &component.ids {
                            dependencies.entry(id.canonical()).or_default().insert(key);
                        }
                    }
                    pending.insert(key, components);
                }
            }
        }

        while let Some((key, value)) = moving.pop() {
            if solved.contains_key(&key) {
                continue;
            }
            solved.insert(key, value);
            let Some(dependents) = dependencies.remove(&key) else {
                continue;
            };
            for dependent in dependents {
                let Some(components) = pending.remove(&dependent) else {
                    continue;
                };
                let components = substitute(components, key, value);
                match finalize(&components) {
                    Some(resolved) => moving.push((dependent, resolved)),
                    None => {
                        pending.insert(dependent, components);
                    }
                }
            }
        }

        for key in pending.into_keys() {
            solved.entry(key).or_insert(Value::Top);
        }
        solved
    }
}

/// Meet a solved dependency into every product that references it. A product
/// that bottoms out is dropped from the sum; negated references consume the
/// negated value.
fn substitute(components: Vec<HComponent>, solved: HashKey, value: Value) -> Vec<HComponent> {
    let mut remaining = Vec::with_capacity(components.len());
    for mut component in components {
        let mut resolved = component.value;
        component.ids.retain(|id| {
            if id.canonical() == solved {
                let contribution = if id.negated { value.negate() } else { value };
                resolved = resolved.meet(contribution);
                false
            } else {
                true
            }
        });
        component.value = resolved;
        if component.value == Value::Bot {
            continue;
        }
        remaining.push(component);
    }
    remaining
}

/// Join of a fully-resolved sum; `None` while any product still has ids.
fn finalize(components: &[HComponent]) -> Option<Value> {
    if components.iter().any(|component| !component.ids.is_empty()) {
        return None;
    }
    Some(
        components
            .iter()
            .fold(Value::Bot, |acc, component| acc.join(component.value)),
    )
}

/// Fixed-point solver for purity. A key's effect set is final once no call
/// quantum remains; solved callees substitute in by remapping their quanta
/// through the call's argument data.
pub(crate) struct PuritySolver {
    pending: BTreeMap<HashKey, Vec<HEffect>>,
}

impl PuritySolver {
    pub(crate) fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    pub(crate) fn add_equation(&mut self, key: HashKey, effects: Vec<HEffect>) {
        self.pending
            .entry(key.canonical())
            .or_default()
            .extend(effects);
    }

    pub(crate) fn solve(mut self) -> BTreeMap<HashKey, BTreeSet<HEffect>> {
        let mut dependencies: BTreeMap<HashKey, BTreeSet<HashKey>> = BTreeMap::new();
        let mut moving: Vec<HashKey> = Vec::new();
        let mut solved: BTreeMap<HashKey, BTreeSet<HEffect>> = BTreeMap::new();

        for (key, effects) in &self.pending {
            let mut calls = 0usize;
            for effect in effects {
                if let HEffect::Call { callee, .. } = effect {
                    dependencies.entry(callee.canonical()).or_default().insert(*key);
                    calls += 1;
                }
            }
            if calls == 0 {
                moving.push(*key);
            }
        }

        while let Some(key) = moving.pop() {
            if solved.contains_key(&key) {
                continue;
            }
            let Some(effects) = self.pending.remove(&key) else {
                continue;
            };
            let resolved: BTreeSet<HEffect> = effects.into_iter().collect();
            solved.insert(key, resolved.clone());
            let Some(dependents) = dependencies.remove(&key) else {
                continue;
            };
            for dependent in dependents {
                let Some(pending_effects) = self.pending.get_mut(&dependent) else {
                    continue;
                };
                let mut next = Vec::with_capacity(pending_effects.len());
                let mut calls_left = 0usize;
                for effect in pending_effects.drain(..) {
                    match effect {
                        HEffect::Call {
                            callee,
                            args,
                            is_static,
                        } if callee.canonical() == key => {
                            next.extend(remap_call_effects(&resolved, &args, is_static));
                        }
                        HEffect::Call { .. } => {
                            calls_left += 1;
                            next.push(effect);
                        }
                        other => next.push(other),
                    }
                }
                *pending_effects = next;
                if calls_left == 0 {
                    moving.push(dependent);
                }
            }
        }

        // Unknown callees and call cycles never resolve; their effect is
        // conservatively arbitrary.
        for key in self.pending.into_keys() {
            solved
                .entry(key)
                .or_insert_with(|| BTreeSet::from([HEffect::Top]));
        }
        solved
    }
}

/// Translate a solved callee's quanta into caller terms through the call's
/// argument data. Effects landing on callee locals vanish.
fn remap_call_effects(
    effects: &BTreeSet<HEffect>,
    args: &[DataValue],
    is_static: bool,
) -> Vec<HEffect> {
    let shift = usize::from(!is_static);
    let mut remapped = Vec::new();
    for effect in effects {
        match effect {
            HEffect::Top => remapped.push(HEffect::Top),
            HEffect::ThisChange => remapped.extend(data_effect(args.first())),
            HEffect::ParamChange(param) => {
                remapped.extend(data_effect(args.get(shift + usize::from(*param))));
            }
            HEffect::Call { .. } => unreachable!("call quantum in a solved effect set"),
        }
    }
    remapped
}

fn data_effect(data: Option<&DataValue>) -> Option<HEffect> {
    match data {
        Some(DataValue::This) => Some(HEffect::ThisChange),
        Some(DataValue::Param(index)) => Some(HEffect::ParamChange(*index)),
        Some(DataValue::Local) => None,
        Some(DataValue::Return) | Some(DataValue::Unknown) | None => Some(HEffect::Top),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{DigestEngine, Direction, MemberRef, ParamConstraint, RawKey, hash_key};

    fn key(owner: &str, direction: Direction) -> HashKey {
        let raw = RawKey {
            member: MemberRef {
                owner: owner.to_string(),
                name: "m".to_string(),
                descriptor: "(Ljava/lang/Object;)Ljava/lang/Object;".to_string(),
            },
            direction,
            stable: true,
            negated: false,
        };
        hash_key(&raw, &mut DigestEngine::new())
    }

    fn pending(key: HashKey, components: Vec<HComponent>) -> HEquation {
        HEquation {
            key,
            rhs: HRhs::Pending(components),
        }
    }

    fn final_eq(key: HashKey, value: Value) -> HEquation {
        HEquation {
            key,
            rhs: HRhs::Final(value),
        }
    }

    #[test]
    fn final_values_propagate_through_products() {
        let a = key("com/acme/A", Direction::Out);
        let b = key("com/acme/B", Direction::Out);
        let mut solver = Solver::new();
        solver.add_equation(pending(
            a,
            vec![HComponent {
                value: Value::NotNull,
                ids: vec![b],
            }],
        ));
        solver.add_equation(final_eq(b, Value::NotNull));
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&Value::NotNull));
        assert_eq!(solution.get(&b), Some(&Value::NotNull));
    }

    #[test]
    fn contradicting_product_bottoms_out() {
        let a = key("com/acme/A", Direction::Out);
        let b = key("com/acme/B", Direction::Out);
        let mut solver = Solver::new();
        solver.add_equation(pending(
            a,
            vec![HComponent {
                value: Value::NotNull,
                ids: vec![b],
            }],
        ));
        solver.add_equation(final_eq(b, Value::Null));
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&Value::Bot));
    }

    #[test]
    fn sum_joins_resolved_products() {
        let a = key("com/acme/A", Direction::Out);
        let b = key("com/acme/B", Direction::Out);
        let c = key("com/acme/C", Direction::Out);
        let mut solver = Solver::new();
        solver.add_equation(pending(
            a,
            vec![
                HComponent {
                    value: Value::NotNull,
                    ids: vec![b],
                },
                HComponent {
                    value: Value::Null,
                    ids: vec![c],
                },
            ],
        ));
        solver.add_equation(final_eq(b, Value::NotNull));
        solver.add_equation(final_eq(c, Value::Null));
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&Value::Top));
    }

    #[test]
    fn negated_reference_consumes_inverted_value() {
        let a = key("com/acme/A", Direction::Out);
        let b = key("com/acme/B", Direction::Out);
        let mut negated_b = b;
        negated_b.negated = true;
        let mut solver = Solver::new();
        solver.add_equation(pending(
            a,
            vec![HComponent {
                value: Value::True,
                ids: vec![negated_b],
            }],
        ));
        solver.add_equation(final_eq(b, Value::False));
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&Value::True));
    }

    #[test]
    fn dependency_cycles_fall_back_to_top() {
        let a = key("com/acme/A", Direction::Out);
        let b = key("com/acme/B", Direction::Out);
        let mut solver = Solver::new();
        solver.add_equation(pending(
            a,
            vec![HComponent {
                value: Value::NotNull,
                ids: vec![b],
            }],
        ));
        solver.add_equation(pending(
            b,
            vec![HComponent {
                value: Value::NotNull,
                ids: vec![a],
            }],
        ));
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&Value::Top));
        assert_eq!(solution.get(&b), Some(&Value::Top));
    }

    #[test]
    fn conditional_directions_solve_independently() {
        let on_null = key(
            "com/acme/A",
            Direction::In {
                param: 0,
                constraint: ParamConstraint::Null,
            },
        );
        let on_not_null = key(
            "com/acme/A",
            Direction::In {
                param: 0,
                constraint: ParamConstraint::NotNull,
            },
        );
        let mut solver = Solver::new();
        solver.add_equation(final_eq(on_null, Value::Fail));
        solver.add_equation(final_eq(on_not_null, Value::NotNull));
        let solution = solver.solve();
        assert_eq!(solution.get(&on_null), Some(&Value::Fail));
        assert_eq!(solution.get(&on_not_null), Some(&Value::NotNull));
    }

    #[test]
    fn purity_resolves_call_free_sets_immediately() {
        let a = key("com/acme/A", Direction::Pure);
        let mut solver = PuritySolver::new();
        solver.add_equation(a, Vec::new());
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&BTreeSet::new()));
    }

    #[test]
    fn purity_remaps_callee_effects_through_arguments() {
        let caller = key("com/acme/Caller", Direction::Pure);
        let callee = key("com/acme/Callee", Direction::Pure);
        let mut solver = PuritySolver::new();
        solver.add_equation(
            caller,
            vec![HEffect::Call {
                callee,
                args: vec![DataValue::This, DataValue::Param(3)],
                is_static: false,
            }],
        );
        solver.add_equation(callee, vec![HEffect::ThisChange, HEffect::ParamChange(0)]);
        let solution = solver.solve();
        let expected: BTreeSet<HEffect> =
            BTreeSet::from([HEffect::ThisChange, HEffect::ParamChange(3)]);
        assert_eq!(solution.get(&caller), Some(&expected));
    }

    #[test]
    fn purity_drops_effects_on_callee_locals() {
        let caller = key("com/acme/Caller", Direction::Pure);
        let callee = key("com/acme/Callee", Direction::Pure);
        let mut solver = PuritySolver::new();
        solver.add_equation(
            caller,
            vec![HEffect::Call {
                callee,
                args: vec![DataValue::Local],
                is_static: true,
            }],
        );
        solver.add_equation(callee, vec![HEffect::ParamChange(0)]);
        let solution = solver.solve();
        assert_eq!(solution.get(&caller), Some(&BTreeSet::new()));
    }

    #[test]
    fn purity_of_unknown_callee_is_arbitrary() {
        let caller = key("com/acme/Caller", Direction::Pure);
        let callee = key("com/acme/Missing", Direction::Pure);
        let mut solver = PuritySolver::new();
        solver.add_equation(
            caller,
            vec![HEffect::Call {
                callee,
                args: Vec::new(),
                is_static: true,
            }],
        );
        let solution = solver.solve();
        assert_eq!(solution.get(&caller), Some(&BTreeSet::from([HEffect::Top])));
    }

    #[test]
    fn purity_call_cycles_fall_back_to_top() {
        let a = key("com/acme/A", Direction::Pure);
        let b = key("com/acme/B", Direction::Pure);
        let mut solver = PuritySolver::new();
        solver.add_equation(
            a,
            vec![HEffect::Call {
                callee: b,
                args: Vec::new(),
                is_static: true,
            }],
        );
        solver.add_equation(
            b,
            vec![HEffect::Call {
                callee: a,
                args: Vec::new(),
                is_static: true,
            }],
        );
        let solution = solver.solve();
        assert_eq!(solution.get(&a), Some(&BTreeSet::from([HEffect::Top])));
        assert_eq!(solution.get(&b), Some(&BTreeSet::from([HEffect::Top])));
    }
}
