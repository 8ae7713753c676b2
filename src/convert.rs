use rayon::prelude::*;

use crate::cancel::{CancelToken, Cancelled};
use crate::equations::{EffectQuantum, Equation, HComponent, HEffect, HEquation, HRhs, Rhs};
use crate::keys::{DigestEngine, hash_key};

/// Equations converted between cancellation polls.
pub(crate) const CANCEL_CHECK_INTERVAL: usize = 64;

/// Rewrite one equation from declaration-identity keys onto compact hash keys.
/// The result shape mirrors the input; product order is preserved so downstream
/// canonicalization stays reproducible.
pub(crate) fn convert_equation(equation: &Equation, md: &mut DigestEngine) -> HEquation {
    let rhs = match &equation.rhs {
        Rhs::Final(value) => HRhs::Final(*value),
        Rhs::Pending(products) => HRhs::Pending(
            products
                .iter()
                .map(|product| HComponent {
                    value: product.value,
                    ids: product.ids.iter().map(|id| hash_key(id, md)).collect(),
                })
                .collect(),
        ),
        Rhs::Effects(effects) => HRhs::Effects(
            effects
                .iter()
                .map(|effect| match effect {
                    EffectQuantum::Top => HEffect::Top,
                    EffectQuantum::ThisChange => HEffect::ThisChange,
                    EffectQuantum::ParamChange(param) => HEffect::ParamChange(*param),
                    EffectQuantum::Call {
                        callee,
                        args,
                        is_static,
                    } => HEffect::Call {
                        callee: hash_key(callee, md),
                        args: args.clone(),
                        is_static: *is_static,
                    },
                })
                .collect(),
        ),
    };
    HEquation {
        key: hash_key(&equation.id, md),
        rhs,
    }
}

/// Convert a batch in parallel. Each worker owns its digest engine; the token
/// is polled once per chunk and a trip discards all partial output.
pub(crate) fn convert_batch(
    equations: &[Equation],
    cancel: &CancelToken,
) -> Result<Vec<HEquation>, Cancelled> {
    equations
        .par_chunks(CANCEL_CHECK_INTERVAL)
        .map_init(DigestEngine::new, |md, chunk| {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            Ok(chunk
                .iter()
                .map(|equation| convert_equation(equation, md))
                .collect::<Vec<_>>())
        })
        .try_reduce(Vec::new, |mut acc, mut chunk| {
            acc.append(&mut chunk);
            Ok(acc)
        })
}
