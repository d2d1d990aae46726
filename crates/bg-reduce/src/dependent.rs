//! Elimination of dependent states.
//!
//! A storage port in derivative causality does not integrate its state: the
//! network fixes the co-state, so the state is an algebraic function of the
//! independent ones. Inverting `∂H/∂x = v` gives that function and the chain
//! rule gives its rate. The rates of all dependent states are coupled to the
//! independent rates and are found together from one linear system.

use std::collections::BTreeMap;

use bg_expr::{Expr, Var, coefficients, normalize};
use bg_graph::FlatModel;
use tracing::debug;

use crate::equations::StateSlot;
use crate::error::{ReduceError, ReduceResult};

/// Outcome of eliminating the dependent states of one model.
pub(crate) struct Elimination {
    /// Replacements for dependent states and for every `Var::Rate`, in terms
    /// of independent states, inputs and parameters.
    pub subst: BTreeMap<Var, Expr>,
    /// `(slot, value)` for every dependent state.
    pub dependent: Vec<(usize, Expr)>,
}

fn conflict(model: &FlatModel, slot: &StateSlot, reason: impl Into<String>) -> ReduceError {
    ReduceError::CausalityConflict {
        components: vec![model.components[slot.component].path.clone()],
        reason: reason.into(),
    }
}

fn resolved_var(resolved: &BTreeMap<Var, Expr>, v: &Var) -> ReduceResult<Expr> {
    resolved.get(v).cloned().ok_or_else(|| ReduceError::Invariant {
        what: format!("{v} unresolved"),
    })
}

pub(crate) fn eliminate(
    model: &FlatModel,
    states: &[StateSlot],
    resolved: &BTreeMap<Var, Expr>,
) -> ReduceResult<Elimination> {
    let dependent: Vec<usize> = (0..states.len()).filter(|&k| !states[k].integral).collect();
    if dependent.is_empty() {
        return Ok(Elimination {
            subst: BTreeMap::new(),
            dependent: Vec::new(),
        });
    }
    let independent: Vec<usize> = (0..states.len()).filter(|&k| states[k].integral).collect();

    // x_d from co_state(x_d) = network value
    let mut values = Vec::with_capacity(dependent.len());
    for &d in &dependent {
        let slot = &states[d];
        let x = Var::State(d as u32);
        let supplied = resolved_var(resolved, &slot.co_var)?;
        let split = coefficients(&slot.co_state, std::slice::from_ref(&x));
        let slope = &split.linear[0];
        if !split.is_affine_in(std::slice::from_ref(&x)) || slope.is_zero() {
            return Err(conflict(
                model,
                slot,
                format!("co-state of x_{d} cannot be inverted for a dependent state"),
            ));
        }
        let value = normalize(&Expr::div(Expr::sub(supplied, split.rest), slope.clone()));
        for v in value.free_vars() {
            let bad = match v {
                Var::Input(_) => Some("an input"),
                Var::Rate(_) => Some("a rate"),
                Var::State(j) if states.get(j as usize).is_some_and(|s| !s.integral) => {
                    Some("another dependent state")
                }
                _ => None,
            };
            if let Some(what) = bad {
                return Err(conflict(
                    model,
                    slot,
                    format!("dependent state x_{d} is fixed by {what}"),
                ));
            }
        }
        debug!(state = d, %value, "dependent state");
        values.push(value);
    }

    let state_subst: BTreeMap<Var, Expr> = dependent
        .iter()
        .zip(&values)
        .map(|(&d, value)| (Var::State(d as u32), value.clone()))
        .collect();
    let rates: Vec<Expr> = independent
        .iter()
        .map(|&i| {
            resolved_var(resolved, &states[i].rate).map(|r| normalize(&r.substitute(&state_subst)))
        })
        .collect::<ReduceResult<_>>()?;

    // dx_d = Σ_i ∂x_d/∂x_i dx_i, with the dx_i still mentioning dx_d
    let unknowns: Vec<Var> = dependent.iter().map(|&d| Var::Rate(d as u32)).collect();
    let mut matrix = Vec::with_capacity(dependent.len());
    let mut rhs = Vec::with_capacity(dependent.len());
    for (row, (&d, value)) in dependent.iter().zip(&values).enumerate() {
        let chain = normalize(&Expr::sum(
            independent
                .iter()
                .zip(&rates)
                .map(|(&i, rate)| {
                    Expr::product(vec![value.derivative(&Var::State(i as u32)), rate.clone()])
                })
                .collect(),
        ));
        let split = coefficients(&chain, &unknowns);
        if !split.is_affine_in(&unknowns) {
            return Err(conflict(
                model,
                &states[d],
                format!("rate of dependent state x_{d} enters nonlinearly"),
            ));
        }
        let coeffs: Vec<Expr> = split
            .linear
            .iter()
            .enumerate()
            .map(|(col, c)| {
                let diagonal = if col == row { Expr::one() } else { Expr::zero() };
                normalize(&Expr::sub(diagonal, c.clone()))
            })
            .collect();
        matrix.push(coeffs);
        rhs.push(split.rest);
    }

    let solved = solve_linear(matrix, rhs).ok_or_else(|| {
        conflict(
            model,
            &states[dependent[0]],
            "rates of the dependent states are not determined",
        )
    })?;

    let mut subst = state_subst;
    subst.extend(unknowns.into_iter().zip(solved));
    Ok(Elimination {
        subst,
        dependent: dependent.into_iter().zip(values).collect(),
    })
}

/// Gauss-Jordan elimination over normalized expressions; `None` when a
/// column has no non-zero pivot.
fn solve_linear(mut m: Vec<Vec<Expr>>, mut rhs: Vec<Expr>) -> Option<Vec<Expr>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).find(|&r| !m[r][col].is_zero())?;
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        let inv = Expr::powi(m[col][col].clone(), -1);
        for r in 0..n {
            if r == col || m[r][col].is_zero() {
                continue;
            }
            let factor = normalize(&Expr::product(vec![m[r][col].clone(), inv.clone()]));
            for c in col + 1..n {
                let scaled = Expr::product(vec![factor.clone(), m[col][c].clone()]);
                m[r][c] = normalize(&Expr::sub(m[r][c].clone(), scaled));
            }
            m[r][col] = Expr::zero();
            let scaled = Expr::product(vec![factor, rhs[col].clone()]);
            rhs[r] = normalize(&Expr::sub(rhs[r].clone(), scaled));
        }
    }
    Some(
        rhs.into_iter()
            .zip(&m)
            .enumerate()
            .map(|(i, (b, row))| normalize(&Expr::div(b, row[i].clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> Expr {
        Expr::param(name)
    }

    #[test]
    fn solves_a_coupled_pair() {
        // a + b = 3, a - b = 1
        let m = vec![
            vec![Expr::one(), Expr::one()],
            vec![Expr::one(), Expr::int(-1)],
        ];
        let x = solve_linear(m, vec![Expr::int(3), Expr::int(1)]).unwrap();
        assert_eq!(x, vec![Expr::int(2), Expr::int(1)]);
    }

    #[test]
    fn pivots_past_a_zero_diagonal() {
        // b = k, a = 2
        let m = vec![
            vec![Expr::zero(), Expr::one()],
            vec![Expr::one(), Expr::zero()],
        ];
        let x = solve_linear(m, vec![p("k"), Expr::int(2)]).unwrap();
        assert_eq!(x, vec![Expr::int(2), p("k")]);
    }

    #[test]
    fn symbolic_diagonal_is_divided_out() {
        let m = vec![vec![p("a")]];
        let x = solve_linear(m, vec![Expr::product(vec![p("a"), p("b")])]).unwrap();
        assert_eq!(x, vec![p("b")]);
    }

    #[test]
    fn singular_system_is_rejected() {
        let m = vec![
            vec![Expr::one(), Expr::one()],
            vec![Expr::zero(), Expr::zero()],
        ];
        assert!(solve_linear(m, vec![Expr::one(), Expr::zero()]).is_none());
    }
}
