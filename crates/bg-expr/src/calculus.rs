//! Symbolic differentiation.

use crate::expr::{Expr, Func, Var};
use crate::simplify::normalize;

/// Partial derivative of `expr` with respect to `v`, without simplification.
pub fn diff(expr: &Expr, v: &Var) -> Expr {
    if !expr.contains_var(v) {
        return Expr::zero();
    }
    match expr {
        Expr::Num(_) => Expr::zero(),
        Expr::Var(w) => {
            if w == v {
                Expr::one()
            } else {
                Expr::zero()
            }
        }
        Expr::Add(xs) => Expr::sum(xs.iter().map(|x| diff(x, v)).collect()),
        Expr::Mul(xs) => {
            // product rule over n factors
            let terms = xs
                .iter()
                .enumerate()
                .filter(|(_, x)| x.contains_var(v))
                .map(|(i, x)| {
                    let mut factors = Vec::with_capacity(xs.len());
                    factors.push(diff(x, v));
                    factors.extend(
                        xs.iter()
                            .enumerate()
                            .filter(|(j, _)| *j != i)
                            .map(|(_, y)| y.clone()),
                    );
                    Expr::product(factors)
                })
                .collect();
            Expr::sum(terms)
        }
        Expr::Pow(base, n) => {
            if *n == 0 {
                return Expr::zero();
            }
            Expr::product(vec![
                Expr::int(i64::from(*n)),
                Expr::powi((**base).clone(), n - 1),
                diff(base, v),
            ])
        }
        Expr::Call(func, arg) => {
            let inner = diff(arg, v);
            let a = (**arg).clone();
            let outer = match func {
                Func::Exp => Expr::exp(a),
                Func::Ln => Expr::powi(a, -1),
                Func::Sin => Expr::call(Func::Cos, a),
                Func::Cos => Expr::neg(Expr::call(Func::Sin, a)),
                Func::Tanh => Expr::sub(Expr::one(), Expr::powi(Expr::call(Func::Tanh, a), 2)),
            };
            Expr::product(vec![outer, inner])
        }
    }
}

impl Expr {
    /// Normalized partial derivative with respect to `v`.
    pub fn derivative(&self, v: &Var) -> Expr {
        normalize(&diff(self, v))
    }
}
