//! Expression tree and variables.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bg_core::Rational;

/// A symbolic variable.
///
/// Inside a component template the indices are local (port `i`, state `i`,
/// control input `0`) and parameter names are the component's own. The
/// reduction instantiates templates by mapping local variables to global ones.
///
/// The derived ordering (states, inputs, parameters, efforts, flows, rates) is
/// the canonical ordering of terms in normalized expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Var {
    State(u32),
    Input(u32),
    Param(String),
    Effort(u32),
    Flow(u32),
    /// `dx_k/dt`, an unknown while dependent states are eliminated.
    Rate(u32),
}

impl Var {
    pub fn param(name: impl Into<String>) -> Self {
        Var::Param(name.into())
    }

    /// True for port variables (efforts and flows).
    pub fn is_port_variable(&self) -> bool {
        matches!(self, Var::Effort(_) | Var::Flow(_))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::State(i) => write!(f, "x_{i}"),
            Var::Input(i) => write!(f, "u_{i}"),
            Var::Param(name) => write!(f, "{name}"),
            Var::Effort(i) => write!(f, "e_{i}"),
            Var::Flow(i) => write!(f, "f_{i}"),
            Var::Rate(i) => write!(f, "dx_{i}"),
        }
    }
}

/// Elementary functions allowed in constitutive relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Func {
    Exp,
    Ln,
    Sin,
    Cos,
    Tanh,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tanh => "tanh",
        }
    }
}

/// Symbolic expression: an operator together with its operands.
///
/// `Add` and `Mul` are n-ary. Powers are integral; division is a `-1` power.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Num(Rational),
    Var(Var),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, i32),
    Call(Func, Box<Expr>),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Num(Rational::integer(value))
    }

    pub fn zero() -> Self {
        Expr::int(0)
    }

    pub fn one() -> Self {
        Expr::int(1)
    }

    /// `num / den` as an exact constant. A zero denominator yields `0^-1`,
    /// which stays symbolic and fails on evaluation.
    pub fn ratio(num: i64, den: i64) -> Self {
        match Rational::new(num as i128, den as i128) {
            Some(r) => Expr::Num(r),
            None => Expr::powi(Expr::zero(), -1),
        }
    }

    pub fn var(v: Var) -> Self {
        Expr::Var(v)
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Var(Var::Param(name.into()))
    }

    pub fn state(index: u32) -> Self {
        Expr::Var(Var::State(index))
    }

    pub fn input(index: u32) -> Self {
        Expr::Var(Var::Input(index))
    }

    pub fn effort(index: u32) -> Self {
        Expr::Var(Var::Effort(index))
    }

    pub fn flow(index: u32) -> Self {
        Expr::Var(Var::Flow(index))
    }

    /// Sum of terms; nested sums are flattened.
    pub fn sum(terms: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Expr::Add(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::zero(),
            1 => flat.pop().unwrap_or_else(Expr::zero),
            _ => Expr::Add(flat),
        }
    }

    /// Product of factors; nested products are flattened.
    pub fn product(factors: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Expr::Mul(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::one(),
            1 => flat.pop().unwrap_or_else(Expr::one),
            _ => Expr::Mul(flat),
        }
    }

    pub fn neg(e: Expr) -> Self {
        Expr::product(vec![Expr::int(-1), e])
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::sum(vec![a, Expr::neg(b)])
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::product(vec![a, Expr::powi(b, -1)])
    }

    pub fn powi(base: Expr, exp: i32) -> Self {
        Expr::Pow(Box::new(base), exp)
    }

    pub fn call(func: Func, arg: Expr) -> Self {
        Expr::Call(func, Box::new(arg))
    }

    pub fn exp(arg: Expr) -> Self {
        Expr::call(Func::Exp, arg)
    }

    pub fn ln(arg: Expr) -> Self {
        Expr::call(Func::Ln, arg)
    }

    /// Constant value, if this node is a number.
    pub fn as_num(&self) -> Option<Rational> {
        match self {
            Expr::Num(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_num().is_some_and(Rational::is_zero)
    }

    /// All variables referenced by this expression, in canonical order.
    pub fn free_vars(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<Var>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(v) => {
                out.insert(v.clone());
            }
            Expr::Add(xs) | Expr::Mul(xs) => xs.iter().for_each(|x| x.collect_vars(out)),
            Expr::Pow(b, _) => b.collect_vars(out),
            Expr::Call(_, a) => a.collect_vars(out),
        }
    }

    pub fn contains_var(&self, v: &Var) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Var(w) => w == v,
            Expr::Add(xs) | Expr::Mul(xs) => xs.iter().any(|x| x.contains_var(v)),
            Expr::Pow(b, _) => b.contains_var(v),
            Expr::Call(_, a) => a.contains_var(v),
        }
    }

    /// Rebuild the tree with every variable replaced by `f(var)`.
    pub fn map_vars(&self, f: &mut impl FnMut(&Var) -> Expr) -> Expr {
        match self {
            Expr::Num(r) => Expr::Num(*r),
            Expr::Var(v) => f(v),
            Expr::Add(xs) => Expr::Add(xs.iter().map(|x| x.map_vars(f)).collect()),
            Expr::Mul(xs) => Expr::Mul(xs.iter().map(|x| x.map_vars(f)).collect()),
            Expr::Pow(b, n) => Expr::Pow(Box::new(b.map_vars(f)), *n),
            Expr::Call(func, a) => Expr::Call(*func, Box::new(a.map_vars(f))),
        }
    }

    /// Replace variables found in `map`; others are left untouched.
    pub fn substitute(&self, map: &BTreeMap<Var, Expr>) -> Expr {
        self.map_vars(&mut |v| map.get(v).cloned().unwrap_or_else(|| Expr::Var(v.clone())))
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        match self {
            Expr::Num(_) | Expr::Var(_) => 1,
            Expr::Add(xs) | Expr::Mul(xs) => 1 + xs.iter().map(Expr::size).sum::<usize>(),
            Expr::Pow(b, _) => 1 + b.size(),
            Expr::Call(_, a) => 1 + a.size(),
        }
    }
}

impl From<Var> for Expr {
    fn from(v: Var) -> Self {
        Expr::Var(v)
    }
}

impl From<Rational> for Expr {
    fn from(r: Rational) -> Self {
        Expr::Num(r)
    }
}

// Display precedence levels.
const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_POW: u8 = 3;

/// If the term carries a leading negative coefficient, return its magnitude.
fn split_sign(term: &Expr) -> Option<Expr> {
    match term {
        Expr::Num(r) if r.is_negative() => Some(Expr::Num(-*r)),
        Expr::Mul(xs) => match xs.first() {
            Some(Expr::Num(r)) if r.is_negative() => {
                let mut rest: Vec<Expr> = xs[1..].to_vec();
                if !(-*r).is_one() {
                    rest.insert(0, Expr::Num(-*r));
                }
                Some(Expr::product(rest))
            }
            _ => None,
        },
        _ => None,
    }
}

fn write_expr(e: &Expr, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
    match e {
        Expr::Num(r) => {
            if (r.is_negative() || !r.is_integer()) && parent >= PREC_MUL {
                write!(f, "({r})")
            } else {
                write!(f, "{r}")
            }
        }
        Expr::Var(v) => write!(f, "{v}"),
        Expr::Add(terms) => {
            if parent > PREC_ADD {
                write!(f, "(")?;
            }
            for (i, term) in terms.iter().enumerate() {
                match (i, split_sign(term)) {
                    (0, Some(mag)) => {
                        write!(f, "-")?;
                        write_expr(&mag, f, PREC_MUL)?;
                    }
                    (0, None) => write_expr(term, f, PREC_ADD)?,
                    (_, Some(mag)) => {
                        write!(f, " - ")?;
                        write_expr(&mag, f, PREC_MUL)?;
                    }
                    (_, None) => {
                        write!(f, " + ")?;
                        write_expr(term, f, PREC_ADD)?;
                    }
                }
            }
            if parent > PREC_ADD {
                write!(f, ")")?;
            }
            Ok(())
        }
        Expr::Mul(factors) => {
            if let Some(mag) = split_sign(e) {
                if parent > PREC_ADD {
                    write!(f, "(")?;
                }
                write!(f, "-")?;
                write_expr(&mag, f, PREC_MUL)?;
                if parent > PREC_ADD {
                    write!(f, ")")?;
                }
                return Ok(());
            }
            let (den, num): (Vec<&Expr>, Vec<&Expr>) = factors
                .iter()
                .partition(|x| matches!(x, Expr::Pow(_, n) if *n < 0));
            if parent > PREC_MUL {
                write!(f, "(")?;
            }
            if num.is_empty() {
                write!(f, "1")?;
            }
            for (i, x) in num.iter().enumerate() {
                if i > 0 {
                    write!(f, "*")?;
                }
                write_expr(x, f, PREC_MUL)?;
            }
            if !den.is_empty() {
                write!(f, "/")?;
                let flipped: Vec<Expr> = den
                    .iter()
                    .filter_map(|x| match x {
                        Expr::Pow(b, n) if *n == -1 => Some((**b).clone()),
                        Expr::Pow(b, n) => Some(Expr::powi((**b).clone(), -n)),
                        _ => None,
                    })
                    .collect();
                if flipped.len() == 1 {
                    write_expr(&flipped[0], f, PREC_POW)?;
                } else {
                    write_expr(&Expr::Mul(flipped), f, PREC_POW)?;
                }
            }
            if parent > PREC_MUL {
                write!(f, ")")?;
            }
            Ok(())
        }
        Expr::Pow(base, n) => {
            if *n < 0 {
                write!(f, "1/")?;
                return write_expr(&Expr::powi((**base).clone(), -n), f, PREC_POW);
            }
            write_expr(base, f, PREC_POW + 1)?;
            write!(f, "^{n}")
        }
        Expr::Call(func, arg) => {
            write!(f, "{}(", func.name())?;
            write_expr(arg, f, 0)?;
            write!(f, ")")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(self, f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_flatten() {
        let a = Expr::param("a");
        let b = Expr::param("b");
        let c = Expr::param("c");
        let nested = Expr::sum(vec![a.clone(), Expr::sum(vec![b.clone(), c.clone()])]);
        assert_eq!(nested, Expr::Add(vec![a.clone(), b.clone(), c.clone()]));
        assert_eq!(Expr::sum(vec![]), Expr::zero());
        assert_eq!(Expr::product(vec![a.clone()]), a);
    }

    #[test]
    fn free_vars_are_ordered() {
        let e = Expr::sum(vec![Expr::flow(1), Expr::state(0), Expr::param("R")]);
        let vars: Vec<Var> = e.free_vars().into_iter().collect();
        assert_eq!(vars, vec![Var::State(0), Var::param("R"), Var::Flow(1)]);
        assert!(e.contains_var(&Var::Flow(1)));
        assert!(!e.contains_var(&Var::Effort(1)));
    }

    #[test]
    fn substitute_is_pure() {
        let e = Expr::product(vec![Expr::param("R"), Expr::flow(0)]);
        let mut map = BTreeMap::new();
        map.insert(Var::Flow(0), Expr::state(3));
        let s = e.substitute(&map);
        assert_eq!(s, Expr::product(vec![Expr::param("R"), Expr::state(3)]));
        // original untouched
        assert!(e.contains_var(&Var::Flow(0)));
    }

    #[test]
    fn display_basic() {
        let e = Expr::sum(vec![
            Expr::product(vec![Expr::int(-1), Expr::state(0), Expr::powi(Expr::param("R"), -1)]),
            Expr::product(vec![Expr::input(0), Expr::powi(Expr::param("R"), -1)]),
        ]);
        assert_eq!(e.to_string(), "-x_0/R + u_0/R");
        assert_eq!(Expr::exp(Expr::effort(0)).to_string(), "exp(e_0)");
        assert_eq!(Expr::powi(Expr::state(1), 2).to_string(), "x_1^2");
    }
}
