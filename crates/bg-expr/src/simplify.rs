//! Canonical simplification.
//!
//! An expression is normalized by expanding it into a sum of monomials with
//! exact rational coefficients. A monomial is a product of atoms raised to
//! non-zero integer powers; atoms are variables, function calls with
//! normalized arguments, and (for negative powers of sums) normalized sums.
//!
//! Two expressions that are equal as polynomials in their atoms normalize to
//! the same tree, so identities such as `x/R - x/R = 0` are detected
//! structurally. Rational functions are not put over a common denominator.
//!
//! A coefficient that would leave the `i128` range is not folded: the offending
//! factor stays in the monomial as a numeric atom, so the value is still exact.

use std::collections::BTreeMap;

use bg_core::Rational;

use crate::expr::{Expr, Func, Var};

type Monomial = BTreeMap<Expr, i32>;

/// Multiply `atom^k` into a monomial.
fn bump(m: &mut Monomial, atom: Expr, k: i32) {
    let e = m.entry(atom.clone()).or_insert(0);
    *e += k;
    if *e == 0 {
        m.remove(&atom);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Poly {
    terms: BTreeMap<Monomial, Rational>,
}

impl Poly {
    fn constant(c: Rational) -> Self {
        let mut p = Poly::default();
        p.add_term(Monomial::new(), c);
        p
    }

    fn atom(atom: Expr, exp: i32) -> Self {
        let mut m = Monomial::new();
        if exp != 0 {
            m.insert(atom, exp);
        }
        let mut p = Poly::default();
        p.add_term(m, Rational::ONE);
        p
    }

    fn add_term(&mut self, m: Monomial, c: Rational) {
        if c.is_zero() {
            return;
        }
        let Some(existing) = self.terms.get(&m).copied() else {
            self.terms.insert(m, c);
            return;
        };
        match existing.checked_add(c) {
            Some(sum) if sum.is_zero() => {
                self.terms.remove(&m);
            }
            Some(sum) => {
                self.terms.insert(m, sum);
            }
            None => {
                let mut carried = m;
                bump(&mut carried, Expr::Num(c), 1);
                self.add_term(carried, Rational::ONE);
            }
        }
    }

    fn add(&mut self, other: Poly) {
        for (m, c) in other.terms {
            self.add_term(m, c);
        }
    }

    fn mul(&self, other: &Poly) -> Poly {
        let mut out = Poly::default();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &other.terms {
                let mut m = ma.clone();
                for (atom, k) in mb {
                    bump(&mut m, atom.clone(), *k);
                }
                match ca.checked_mul(*cb) {
                    Some(c) => out.add_term(m, c),
                    None => {
                        bump(&mut m, Expr::Num(*cb), 1);
                        out.add_term(m, *ca);
                    }
                }
            }
        }
        out
    }

    fn powi(&self, n: u32) -> Poly {
        let mut acc = Poly::constant(Rational::ONE);
        for _ in 0..n {
            acc = acc.mul(self);
        }
        acc
    }

    fn single_term(&self) -> Option<(&Monomial, Rational)> {
        if self.terms.len() == 1 {
            self.terms.iter().next().map(|(m, c)| (m, *c))
        } else {
            None
        }
    }

    pub(crate) fn to_expr(&self) -> Expr {
        let mut terms = Vec::with_capacity(self.terms.len());
        for (m, c) in &self.terms {
            let mut factors: Vec<Expr> = m
                .iter()
                .map(|(atom, k)| {
                    if *k == 1 {
                        atom.clone()
                    } else {
                        Expr::powi(atom.clone(), *k)
                    }
                })
                .collect();
            if !c.is_one() || factors.is_empty() {
                factors.insert(0, Expr::Num(*c));
            }
            terms.push(if factors.len() == 1 {
                factors.remove(0)
            } else {
                Expr::Mul(factors)
            });
        }
        match terms.len() {
            0 => Expr::zero(),
            1 => terms.remove(0),
            _ => Expr::Add(terms),
        }
    }
}

pub(crate) fn to_poly(expr: &Expr) -> Poly {
    match expr {
        Expr::Num(c) => Poly::constant(*c),
        Expr::Var(v) => Poly::atom(Expr::Var(v.clone()), 1),
        Expr::Add(xs) => {
            let mut p = Poly::default();
            for x in xs {
                p.add(to_poly(x));
            }
            p
        }
        Expr::Mul(xs) => xs
            .iter()
            .fold(Poly::constant(Rational::ONE), |acc, x| acc.mul(&to_poly(x))),
        Expr::Pow(base, n) => {
            let pb = to_poly(base);
            if *n >= 0 {
                return pb.powi(n.unsigned_abs());
            }
            if pb.terms.is_empty() {
                // 0^-n stays symbolic; evaluation reports the division
                return Poly::atom(Expr::zero(), *n);
            }
            if let Some((m, c)) = pb.single_term() {
                if let Some(cn) = c.pow(*n) {
                    let scaled: Monomial = m.iter().map(|(a, k)| (a.clone(), k * n)).collect();
                    let mut p = Poly::default();
                    p.add_term(scaled, cn);
                    return p;
                }
            }
            Poly::atom(pb.to_expr(), *n)
        }
        Expr::Call(func, arg) => {
            let arg = normalize(arg);
            match (func, &arg) {
                (Func::Exp, a) if a.is_zero() => Poly::constant(Rational::ONE),
                (Func::Ln, Expr::Num(c)) if c.is_one() => Poly::default(),
                (Func::Ln, Expr::Call(Func::Exp, inner)) => to_poly(inner),
                (Func::Sin | Func::Tanh, a) if a.is_zero() => Poly::default(),
                (Func::Cos, a) if a.is_zero() => Poly::constant(Rational::ONE),
                _ => Poly::atom(Expr::Call(*func, Box::new(arg)), 1),
            }
        }
    }
}

/// Canonical form of an expression.
///
/// Normalization is idempotent and insensitive to the order of operands in
/// sums and products.
pub fn normalize(expr: &Expr) -> Expr {
    to_poly(expr).to_expr()
}

/// Linear part of an expression with respect to chosen variables.
///
/// `expr == Σ linear[i] * vars[i] + rest`, where no `linear[i]` mentions any
/// of `vars` and `rest` collects every term that is not linear in exactly one
/// of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    pub linear: Vec<Expr>,
    pub rest: Expr,
}

impl Coefficients {
    /// True when the remainder does not depend on any of `vars`.
    pub fn is_affine_in(&self, vars: &[Var]) -> bool {
        vars.iter().all(|v| !self.rest.contains_var(v))
    }
}

pub fn coefficients(expr: &Expr, vars: &[Var]) -> Coefficients {
    let poly = to_poly(expr);
    let mut linear = vec![Poly::default(); vars.len()];
    let mut rest = Poly::default();

    for (m, c) in poly.terms {
        let mentioning: Vec<&Expr> = m
            .keys()
            .filter(|atom| vars.iter().any(|v| atom.contains_var(v)))
            .collect();
        let slot = match mentioning.as_slice() {
            [Expr::Var(v)] if m.get(&Expr::Var(v.clone())) == Some(&1) => {
                vars.iter().position(|w| w == v)
            }
            _ => None,
        };
        match slot {
            Some(i) => {
                let mut reduced = m.clone();
                reduced.remove(&Expr::Var(vars[i].clone()));
                linear[i].add_term(reduced, c);
            }
            None => rest.add_term(m, c),
        }
    }

    Coefficients {
        linear: linear.iter().map(Poly::to_expr).collect(),
        rest: rest.to_expr(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::state(0)
    }

    fn r() -> Expr {
        Expr::param("R")
    }

    #[test]
    fn cancels_like_terms() {
        let e = Expr::sub(Expr::div(x(), r()), Expr::div(x(), r()));
        assert_eq!(normalize(&e), Expr::zero());
    }

    #[test]
    fn combines_powers() {
        // (x * R) / R = x
        let e = Expr::div(Expr::product(vec![x(), r()]), r());
        assert_eq!(normalize(&e), x());
        // x * x = x^2
        let sq = normalize(&Expr::product(vec![x(), x()]));
        assert_eq!(sq, Expr::powi(x(), 2));
    }

    #[test]
    fn distributes_products() {
        // (x + 1) * 2 = 2 + 2x
        let e = Expr::product(vec![Expr::sum(vec![x(), Expr::one()]), Expr::int(2)]);
        let expected = Expr::sum(vec![Expr::int(2), Expr::product(vec![Expr::int(2), x()])]);
        assert_eq!(normalize(&e), normalize(&expected));
    }

    #[test]
    fn reciprocal_of_monomial() {
        // 1 / (2 x) = 1/2 * x^-1
        let e = Expr::powi(Expr::product(vec![Expr::int(2), x()]), -1);
        assert_eq!(
            normalize(&e),
            Expr::Mul(vec![Expr::ratio(1, 2), Expr::powi(x(), -1)])
        );
    }

    #[test]
    fn oversized_coefficients_stay_exact() {
        // (10^12 x)^4 needs 10^48, beyond i128
        let scaled = Expr::product(vec![Expr::int(1_000_000_000_000), x()]);
        let n = normalize(&Expr::powi(scaled, 4));
        assert_eq!(normalize(&n), n);
        let at_one = n
            .eval(&|v: &Var| (*v == Var::State(0)).then_some(1.0))
            .unwrap();
        assert!((at_one / 1e48 - 1.0).abs() < 1e-12);
        // the sum of two near-maximal coefficients does not wrap either
        let big = Expr::Num(Rational::new(i128::MAX - 1, 1).unwrap());
        let twice = normalize(&Expr::sum(vec![big.clone(), big]));
        let value = twice.eval(&|_: &Var| None).unwrap();
        assert!((value / (2.0 * i128::MAX as f64) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reciprocal_of_sum_is_atomic() {
        let s = Expr::sum(vec![x(), r()]);
        let e = Expr::product(vec![Expr::powi(s.clone(), -1), Expr::powi(s.clone(), -1)]);
        assert_eq!(normalize(&e), Expr::powi(normalize(&s), -2));
    }

    #[test]
    fn function_identities() {
        assert_eq!(normalize(&Expr::exp(Expr::sub(x(), x()))), Expr::one());
        assert_eq!(normalize(&Expr::ln(Expr::exp(x()))), x());
        assert_eq!(normalize(&Expr::ln(Expr::one())), Expr::zero());
    }

    #[test]
    fn coefficient_extraction() {
        // 3x - u/R + R*x^2 + 5
        let u = Expr::input(0);
        let e = Expr::sum(vec![
            Expr::product(vec![Expr::int(3), x()]),
            Expr::neg(Expr::div(u.clone(), r())),
            Expr::product(vec![r(), Expr::powi(x(), 2)]),
            Expr::int(5),
        ]);
        let c = coefficients(&e, &[Var::State(0), Var::Input(0)]);
        assert_eq!(c.linear[0], Expr::int(3));
        assert_eq!(c.linear[1], normalize(&Expr::neg(Expr::powi(r(), -1))));
        assert!(!c.is_affine_in(&[Var::State(0)]));
        assert_eq!(
            c.rest,
            normalize(&Expr::sum(vec![Expr::int(5), Expr::product(vec![r(), Expr::powi(x(), 2)])]))
        );
    }
}
