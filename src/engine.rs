use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use opentelemetry::KeyValue;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::annotations::{MethodAnnotations, add_effect_annotations, add_method_annotations, mk_in_out_keys};
use crate::cancel::CancelToken;
use crate::convert::convert_batch;
use crate::decl::Declaration;
use crate::descriptor::{ReturnKind, method_return_kind};
use crate::equations::{HEffect, HRhs, Value};
use crate::keys::{DigestEngine, Direction, HashKey, declaration_key};
use crate::load::Bundle;
use crate::solver::{PuritySolver, Solver};
use crate::telemetry::{Telemetry, with_span};

/// Outcome of one analysis run. A trip of the cancellation token discards all
/// partial work.
pub(crate) enum AnalysisStatus {
    Completed(EngineOutput),
    Cancelled,
}

/// Synthesized facts plus run statistics.
pub(crate) struct EngineOutput {
    pub(crate) facts: Vec<DeclarationFacts>,
    pub(crate) stats: AnalysisStats,
    pub(crate) timings: PhaseTimings,
}

/// Facts for one declaration, in report order.
#[derive(Debug, Serialize)]
pub(crate) struct DeclarationFacts {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) not_null: bool,
    pub(crate) pure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) contract: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalysisStats {
    pub(crate) equations: usize,
    pub(crate) declarations: usize,
    pub(crate) skipped_declarations: usize,
    pub(crate) solved_values: usize,
    pub(crate) solved_effect_sets: usize,
}

/// Wall-clock breakdown of the run's phases.
pub(crate) struct PhaseTimings {
    pub(crate) convert_duration_ms: u128,
    pub(crate) solve_duration_ms: u128,
    pub(crate) synthesize_duration_ms: u128,
}

/// Run the full pipeline over a bundle: compact the equation keys, solve both
/// fixed points, then synthesize per-declaration facts.
pub(crate) fn analyze(
    bundle: &Bundle,
    cancel: &CancelToken,
    telemetry: Option<&Telemetry>,
) -> AnalysisStatus {
    let convert_started_at = Instant::now();
    let converted = with_span(
        telemetry,
        "convert",
        &[KeyValue::new("contrafer.phase", "convert")],
        || convert_batch(&bundle.equations, cancel),
    );
    let Ok(converted) = converted else {
        return AnalysisStatus::Cancelled;
    };
    let convert_duration_ms = convert_started_at.elapsed().as_millis();

    let solve_started_at = Instant::now();
    let (value_solutions, purity_solutions) = with_span(
        telemetry,
        "solve",
        &[KeyValue::new("contrafer.phase", "solve")],
        || solve(converted),
    );
    let solve_duration_ms = solve_started_at.elapsed().as_millis();

    if cancel.is_cancelled() {
        return AnalysisStatus::Cancelled;
    }

    let synthesize_started_at = Instant::now();
    let (mut facts, skipped_declarations) = with_span(
        telemetry,
        "synthesize",
        &[KeyValue::new("contrafer.phase", "synthesize")],
        || synthesize(&bundle.declarations, &value_solutions, &purity_solutions),
    );
    facts.sort_by(|left, right| {
        left.owner
            .cmp(&right.owner)
            .then_with(|| left.name.cmp(&right.name))
            .then_with(|| left.descriptor.cmp(&right.descriptor))
    });
    let synthesize_duration_ms = synthesize_started_at.elapsed().as_millis();

    if cancel.is_cancelled() {
        return AnalysisStatus::Cancelled;
    }

    AnalysisStatus::Completed(EngineOutput {
        stats: AnalysisStats {
            equations: bundle.equations.len(),
            declarations: bundle.declarations.len(),
            skipped_declarations,
            solved_values: value_solutions.len(),
            solved_effect_sets: purity_solutions.len(),
        },
        facts,
        timings: PhaseTimings {
            convert_duration_ms,
            solve_duration_ms,
            synthesize_duration_ms,
        },
    })
}

type ValueSolutions = BTreeMap<HashKey, Value>;
type PuritySolutions = BTreeMap<HashKey, BTreeSet<HEffect>>;

fn solve(converted: Vec<crate::equations::HEquation>) -> (ValueSolutions, PuritySolutions) {
    let mut value_solver = Solver::new();
    let mut purity_solver = PuritySolver::new();
    for equation in converted {
        match equation.rhs {
            HRhs::Effects(effects) => purity_solver.add_equation(equation.key, effects),
            _ => value_solver.add_equation(equation),
        }
    }
    (value_solver.solve(), purity_solver.solve())
}

fn synthesize(
    declarations: &[Declaration],
    value_solutions: &ValueSolutions,
    purity_solutions: &PuritySolutions,
) -> (Vec<DeclarationFacts>, usize) {
    let outcomes: Vec<Option<DeclarationFacts>> = declarations
        .par_iter()
        .map_init(DigestEngine::new, |md, declaration| {
            declaration_facts(declaration, value_solutions, purity_solutions, md)
        })
        .collect();
    let skipped = outcomes.iter().filter(|outcome| outcome.is_none()).count();
    (outcomes.into_iter().flatten().collect(), skipped)
}

/// Facts for one declaration, or `None` when its identity cannot be rendered.
fn declaration_facts(
    declaration: &Declaration,
    value_solutions: &ValueSolutions,
    purity_solutions: &PuritySolutions,
    md: &mut DigestEngine,
) -> Option<DeclarationFacts> {
    let Some(identity) = declaration.identity() else {
        debug!(
            name = %declaration.name,
            "skipping declaration with unresolved types"
        );
        return None;
    };
    let primary = declaration_key(declaration, Direction::Out, md)?;
    let pure_key = primary.with_direction(Direction::Pure);

    // Solver output is keyed canonically, as are declaration-sourced keys, so
    // plain lookups select this declaration's slice of the solution.
    let mut sub_solution: ValueSolutions = BTreeMap::new();
    for key in mk_in_out_keys(declaration, primary) {
        if let Some(&value) = value_solutions.get(&key) {
            sub_solution.insert(key, value);
        }
    }
    if let Some(&value) = value_solutions.get(&pure_key) {
        sub_solution.insert(pure_key, value);
    }

    let mut annotations = MethodAnnotations::default();
    if let Some(effects) = purity_solutions.get(&pure_key) {
        let sub_purity: PuritySolutions = BTreeMap::from([(pure_key, effects.clone())]);
        add_effect_annotations(
            &sub_purity,
            &mut annotations,
            primary,
            declaration.is_constructor(),
        );
    }
    add_method_annotations(&sub_solution, &mut annotations, primary, declaration.arity());

    let returns_reference = matches!(
        method_return_kind(&identity.descriptor),
        Ok(ReturnKind::Reference)
    );
    Some(DeclarationFacts {
        owner: identity.owner,
        name: identity.member_name,
        descriptor: identity.descriptor,
        not_null: returns_reference && annotations.not_nulls.contains(&primary),
        pure: annotations.pures.contains(&primary),
        contract: annotations.contracts.get(&primary).cloned(),
    })
}
