//! Numeric evaluation.

use std::collections::BTreeMap;

use crate::error::{ExprError, ExprResult};
use crate::expr::{Expr, Func, Var};

fn finite(value: f64) -> ExprResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExprError::NonFinite { value })
    }
}

impl Expr {
    /// Evaluate with variable values supplied by `env`.
    pub fn eval(&self, env: &dyn Fn(&Var) -> Option<f64>) -> ExprResult<f64> {
        match self {
            Expr::Num(r) => Ok(r.to_f64()),
            Expr::Var(v) => env(v).ok_or_else(|| ExprError::UnboundVariable { var: v.to_string() }),
            Expr::Add(xs) => {
                let mut acc = 0.0;
                for x in xs {
                    acc += x.eval(env)?;
                }
                finite(acc)
            }
            Expr::Mul(xs) => {
                let mut acc = 1.0;
                for x in xs {
                    acc *= x.eval(env)?;
                }
                finite(acc)
            }
            Expr::Pow(base, n) => {
                let b = base.eval(env)?;
                if b == 0.0 && *n < 0 {
                    return Err(ExprError::DivisionByZero);
                }
                finite(b.powi(*n))
            }
            Expr::Call(func, arg) => {
                let a = arg.eval(env)?;
                let value = match func {
                    Func::Exp => a.exp(),
                    Func::Ln => {
                        if a <= 0.0 {
                            return Err(ExprError::Domain {
                                func: func.name(),
                                value: a,
                            });
                        }
                        a.ln()
                    }
                    Func::Sin => a.sin(),
                    Func::Cos => a.cos(),
                    Func::Tanh => a.tanh(),
                };
                finite(value)
            }
        }
    }

    /// Evaluate with variable values taken from a map.
    pub fn eval_map(&self, values: &BTreeMap<Var, f64>) -> ExprResult<f64> {
        self.eval(&|v| values.get(v).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_rc_rate() {
        // -x/R + u/R at x = 1, u = 3, R = 2
        let r_inv = Expr::powi(Expr::param("R"), -1);
        let e = Expr::sum(vec![
            Expr::product(vec![Expr::int(-1), Expr::state(0), r_inv.clone()]),
            Expr::product(vec![Expr::input(0), r_inv]),
        ]);
        let values = BTreeMap::from([
            (Var::State(0), 1.0),
            (Var::Input(0), 3.0),
            (Var::param("R"), 2.0),
        ]);
        assert_eq!(e.eval_map(&values), Ok(1.0));
    }

    #[test]
    fn reports_failures() {
        let empty = BTreeMap::new();
        assert!(matches!(
            Expr::state(0).eval_map(&empty),
            Err(ExprError::UnboundVariable { .. })
        ));
        assert_eq!(
            Expr::powi(Expr::zero(), -1).eval_map(&empty),
            Err(ExprError::DivisionByZero)
        );
        assert!(matches!(
            Expr::ln(Expr::int(-1)).eval_map(&empty),
            Err(ExprError::Domain { func: "ln", .. })
        ));
        assert!(matches!(
            Expr::exp(Expr::int(1000)).eval_map(&empty),
            Err(ExprError::NonFinite { .. })
        ));
    }
}
