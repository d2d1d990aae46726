//! bg-expr: explicit symbolic expressions for constitutive relations.
//!
//! Provides:
//! - The expression tree (`Expr`) over typed variables (`Var`)
//! - Canonical simplification (`normalize`) with exact rational coefficients
//! - Differentiation, substitution and linear-coefficient extraction
//! - Numeric evaluation for downstream simulators
//!
//! Expressions are plain values. Substitution is a pure tree transformation
//! driven by a caller-owned map; there is no global symbol table.
//!
//! # Example
//!
//! ```
//! use bg_expr::{Expr, Var, normalize};
//!
//! // H = x^2 / 2, dH/dx = x
//! let x = Var::State(0);
//! let h = Expr::product(vec![Expr::ratio(1, 2), Expr::powi(Expr::var(x.clone()), 2)]);
//! assert_eq!(h.derivative(&x), Expr::var(x));
//! assert_eq!(normalize(&Expr::sub(Expr::int(3), Expr::int(3))), Expr::int(0));
//! ```

pub mod calculus;
pub mod error;
pub mod eval;
pub mod expr;
pub mod simplify;

pub use calculus::diff;
pub use error::{ExprError, ExprResult};
pub use expr::{Expr, Func, Var};
pub use simplify::{Coefficients, coefficients, normalize};
