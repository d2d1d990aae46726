//! Reduced state-space model.

use std::collections::BTreeMap;
use std::fmt;

use bg_expr::{Expr, ExprError, ExprResult, Var, coefficients};
use bg_graph::{PortVariable, StorageRole};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    /// `x_k`.
    pub name: String,
    /// Path of the owning storage component.
    pub component: String,
    pub role: StorageRole,
    /// `∂H/∂x_k`.
    pub co_state: Expr,
    /// `dx_k/dt`.
    pub derivative: Expr,
}

/// A store in derivative causality. Its state is not integrated; the network
/// fixes it as a function of the independent states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentState {
    pub component: String,
    pub role: StorageRole,
    /// The state in terms of independent states and parameters.
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputOrigin {
    /// Supplied through a top-level exposed port.
    Boundary { label: String },
    /// Driving a controlled source.
    Source { component: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVariable {
    /// `u_k`.
    pub name: String,
    /// Which port variable the input supplies.
    pub variable: PortVariable,
    pub origin: InputOrigin,
}

/// The variable the interior determines at an exposed port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputVariable {
    pub label: String,
    pub variable: PortVariable,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    /// Qualified name, `path.param`.
    pub name: String,
    pub value: Option<f64>,
}

/// Explicit ODE system `ẋ = f(x, u)` with outputs `y = g(x, u)`.
///
/// All expressions reference only states, inputs and qualified parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpaceModel {
    states: Vec<StateVariable>,
    dependents: Vec<DependentState>,
    inputs: Vec<InputVariable>,
    outputs: Vec<OutputVariable>,
    parameters: Vec<ParameterValue>,
}

/// Affine form `ẋ = A x + B u + a`, `y = C x + D u + c` with symbolic
/// entries.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub a: Vec<Vec<Expr>>,
    pub b: Vec<Vec<Expr>>,
    pub c: Vec<Vec<Expr>>,
    pub d: Vec<Vec<Expr>>,
    pub state_offset: Vec<Expr>,
    pub output_offset: Vec<Expr>,
}

impl StateSpaceModel {
    pub(crate) fn new(
        states: Vec<StateVariable>,
        dependents: Vec<DependentState>,
        inputs: Vec<InputVariable>,
        outputs: Vec<OutputVariable>,
        parameters: Vec<ParameterValue>,
    ) -> Self {
        Self {
            states,
            dependents,
            inputs,
            outputs,
            parameters,
        }
    }

    pub fn states(&self) -> &[StateVariable] {
        &self.states
    }

    pub fn dependent_states(&self) -> &[DependentState] {
        &self.dependents
    }

    pub fn inputs(&self) -> &[InputVariable] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputVariable] {
        &self.outputs
    }

    pub fn parameters(&self) -> &[ParameterValue] {
        &self.parameters
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// `dx_k/dt`.
    pub fn derivative(&self, k: usize) -> Option<&Expr> {
        self.states.get(k).map(|s| &s.derivative)
    }

    pub fn output(&self, label: &str) -> Option<&OutputVariable> {
        self.outputs.iter().find(|o| o.label == label)
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// SHA-256 over the JSON export, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let json = serde_json::to_string(self).unwrap_or_default();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Linear form, if every derivative and output is affine in the states
    /// and inputs.
    pub fn linear_form(&self) -> Option<LinearForm> {
        let xs: Vec<Var> = (0..self.states.len() as u32).map(Var::State).collect();
        let us: Vec<Var> = (0..self.inputs.len() as u32).map(Var::Input).collect();
        let vars: Vec<Var> = xs.iter().chain(&us).cloned().collect();

        let split = |e: &Expr| {
            let c = coefficients(e, &vars);
            if !c.is_affine_in(&vars) {
                return None;
            }
            let (x_part, u_part) = c.linear.split_at(xs.len());
            Some((x_part.to_vec(), u_part.to_vec(), c.rest))
        };

        let mut form = LinearForm {
            a: Vec::new(),
            b: Vec::new(),
            c: Vec::new(),
            d: Vec::new(),
            state_offset: Vec::new(),
            output_offset: Vec::new(),
        };
        for s in &self.states {
            let (a, b, k) = split(&s.derivative)?;
            form.a.push(a);
            form.b.push(b);
            form.state_offset.push(k);
        }
        for o in &self.outputs {
            let (c, d, k) = split(&o.expr)?;
            form.c.push(c);
            form.d.push(d);
            form.output_offset.push(k);
        }
        Some(form)
    }

    fn env<'a>(&'a self, x: &'a [f64], u: &'a [f64]) -> impl Fn(&Var) -> Option<f64> + 'a {
        move |v: &Var| match v {
            Var::State(k) => x.get(*k as usize).copied(),
            Var::Input(k) => u.get(*k as usize).copied(),
            Var::Param(name) => self.parameter(name),
            _ => None,
        }
    }

    /// Numeric `ẋ` at state `x` and input `u`, using the stored parameter
    /// values.
    pub fn evaluate_derivatives(&self, x: &[f64], u: &[f64]) -> ExprResult<Vec<f64>> {
        check_len(x.len(), self.states.len(), "state")?;
        check_len(u.len(), self.inputs.len(), "input")?;
        let env = self.env(x, u);
        self.states.iter().map(|s| s.derivative.eval(&env)).collect()
    }

    /// Numeric outputs at state `x` and input `u`, keyed by label.
    pub fn evaluate_outputs(&self, x: &[f64], u: &[f64]) -> ExprResult<BTreeMap<String, f64>> {
        check_len(x.len(), self.states.len(), "state")?;
        check_len(u.len(), self.inputs.len(), "input")?;
        let env = self.env(x, u);
        self.outputs
            .iter()
            .map(|o| Ok((o.label.clone(), o.expr.eval(&env)?)))
            .collect()
    }
}

fn check_len(got: usize, want: usize, what: &str) -> ExprResult<()> {
    if got < want {
        return Err(ExprError::UnboundVariable {
            var: format!("{what} {got}"),
        });
    }
    if got > want {
        return Err(ExprError::UnusedValues {
            what: what.to_string(),
            got,
            want,
        });
    }
    Ok(())
}

impl fmt::Display for StateSpaceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.states {
            writeln!(f, "d{}/dt = {}    [{}]", s.name, s.derivative, s.component)?;
        }
        for d in &self.dependents {
            writeln!(f, "{} state = {}    (dependent)", d.component, d.value)?;
        }
        for o in &self.outputs {
            writeln!(f, "{}.{} = {}", o.label, o.variable, o.expr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_order() -> StateSpaceModel {
        // dx/dt = -x/R + u/R, y = (u - x)/R
        let r_inv = Expr::powi(Expr::param("R.R"), -1);
        let rate = bg_expr::normalize(&Expr::product(vec![
            Expr::sub(Expr::input(0), Expr::state(0)),
            r_inv,
        ]));
        StateSpaceModel::new(
            vec![StateVariable {
                name: "x_0".into(),
                component: "C".into(),
                role: StorageRole::Capacitive,
                co_state: Expr::state(0),
                derivative: rate.clone(),
            }],
            Vec::new(),
            vec![InputVariable {
                name: "u_0".into(),
                variable: PortVariable::Effort,
                origin: InputOrigin::Boundary { label: "u".into() },
            }],
            vec![OutputVariable {
                label: "u".into(),
                variable: PortVariable::Flow,
                expr: rate,
            }],
            vec![ParameterValue {
                name: "R.R".into(),
                value: Some(2.0),
            }],
        )
    }

    #[test]
    fn fingerprint_is_stable() {
        let m = first_order();
        assert_eq!(m.fingerprint(), m.clone().fingerprint());
        assert_eq!(m.fingerprint().len(), 64);
    }

    #[test]
    fn json_export_round_trips() {
        let m = first_order();
        let json = m.to_json().unwrap();
        let back: StateSpaceModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn linear_form_extracts_matrices() {
        let form = first_order().linear_form().unwrap();
        let minus_g = bg_expr::normalize(&Expr::neg(Expr::powi(Expr::param("R.R"), -1)));
        assert_eq!(form.a, vec![vec![minus_g]]);
        assert_eq!(form.b[0][0], Expr::powi(Expr::param("R.R"), -1));
        assert_eq!(form.state_offset, vec![Expr::zero()]);
        assert_eq!(form.c.len(), 1);
    }

    #[test]
    fn numeric_evaluation() {
        let m = first_order();
        assert_eq!(m.evaluate_derivatives(&[1.0], &[3.0]), Ok(vec![1.0]));
        assert_eq!(m.evaluate_outputs(&[1.0], &[3.0]).unwrap()["u"], 1.0);
        assert!(m.evaluate_derivatives(&[], &[3.0]).is_err());
    }

    #[test]
    fn surplus_values_are_rejected() {
        let m = first_order();
        assert_eq!(
            m.evaluate_derivatives(&[1.0, 5.0], &[3.0]),
            Err(ExprError::UnusedValues {
                what: "state".into(),
                got: 2,
                want: 1,
            })
        );
        assert!(m.evaluate_outputs(&[1.0], &[3.0, 0.0]).is_err());
    }
}
