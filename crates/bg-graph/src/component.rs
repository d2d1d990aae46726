//! Components and their constitutive relations.
//!
//! A component is a template: its relations are expressions over local port
//! variables (`e_i`, `f_i`), local states (`x_i`), a local control input
//! (`u_0`, controlled sources only) and the component's own parameter names.

use std::fmt;

use bg_expr::{Expr, Var};

use crate::error::{GraphError, GraphResult};
use crate::graph::BondGraph;

/// Energy domain of a storage element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageRole {
    /// `e = ∂H/∂x`, `ẋ = f` (capacitors, springs).
    Capacitive,
    /// `f = ∂H/∂x`, `ẋ = e` (inductors, masses).
    Inductive,
}

/// One of the two power variables of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortVariable {
    Effort,
    Flow,
}

impl PortVariable {
    pub fn other(self) -> Self {
        match self {
            PortVariable::Effort => PortVariable::Flow,
            PortVariable::Flow => PortVariable::Effort,
        }
    }
}

impl fmt::Display for PortVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortVariable::Effort => write!(f, "effort"),
            PortVariable::Flow => write!(f, "flow"),
        }
    }
}

/// Constitutive law of a one-port dissipator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DissipativeLaw {
    /// `e_0 = R f_0`; invertible, so either causality is admissible.
    Linear { resistance: Expr },
    /// `e_0 = φ(f_0)`.
    EffortOfFlow(Expr),
    /// `f_0 = φ(e_0)`.
    FlowOfEffort(Expr),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentKind {
    Storage {
        role: StorageRole,
        hamiltonian: Expr,
    },
    Dissipative(DissipativeLaw),
    /// Imposes `variable` on its bond. `value` is a parameter expression or
    /// the control input `u_0`.
    Source {
        variable: PortVariable,
        value: Expr,
    },
    ZeroJunction,
    OneJunction,
    Gyrator {
        ratio: Expr,
    },
    Transformer {
        ratio: Expr,
    },
    /// A nested model; its ports are the inner graph's exposures.
    Composite(Box<BondGraph>),
}

/// Coarse classification of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Storage,
    Dissipative,
    Source,
    ZeroJunction,
    OneJunction,
    Gyrator,
    Transformer,
    Composite,
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KindTag::Storage => "storage",
            KindTag::Dissipative => "dissipative",
            KindTag::Source => "source",
            KindTag::ZeroJunction => "junction-0",
            KindTag::OneJunction => "junction-1",
            KindTag::Gyrator => "gyrator",
            KindTag::Transformer => "transformer",
            KindTag::Composite => "composite",
        };
        write!(f, "{s}")
    }
}

impl ComponentKind {
    pub fn tag(&self) -> KindTag {
        match self {
            ComponentKind::Storage { .. } => KindTag::Storage,
            ComponentKind::Dissipative(_) => KindTag::Dissipative,
            ComponentKind::Source { .. } => KindTag::Source,
            ComponentKind::ZeroJunction => KindTag::ZeroJunction,
            ComponentKind::OneJunction => KindTag::OneJunction,
            ComponentKind::Gyrator { .. } => KindTag::Gyrator,
            ComponentKind::Transformer { .. } => KindTag::Transformer,
            ComponentKind::Composite(_) => KindTag::Composite,
        }
    }
}

/// A port of a component, identified by its local index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Port {
    pub index: u32,
    /// Index for atomic components, exposure label for composites.
    pub name: String,
}

/// A named parameter; `None` keeps it purely symbolic.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub name: String,
    pub value: Option<f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn symbolic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Component {
    name: String,
    kind: ComponentKind,
    ports: Vec<Port>,
    params: Vec<Parameter>,
}

fn indexed_ports(n: usize) -> Vec<Port> {
    (0..n as u32)
        .map(|index| Port {
            index,
            name: index.to_string(),
        })
        .collect()
}

impl Component {
    /// General constructor. Atomic components get `n` ports named by index;
    /// composites take their ports from the inner exposures and ignore `n`.
    pub fn new(
        name: impl Into<String>,
        kind: ComponentKind,
        ports: usize,
        params: Vec<Parameter>,
    ) -> Self {
        let ports = match &kind {
            ComponentKind::Composite(inner) => inner
                .exposures()
                .iter()
                .enumerate()
                .map(|(i, e)| Port {
                    index: i as u32,
                    name: e.label.clone(),
                })
                .collect(),
            _ => indexed_ports(ports),
        };
        Self {
            name: name.into(),
            kind,
            ports,
            params,
        }
    }

    /// Storage element with `n` ports and Hamiltonian over `x_0..x_{n-1}`.
    pub fn storage(
        name: impl Into<String>,
        role: StorageRole,
        n: usize,
        hamiltonian: Expr,
        params: Vec<Parameter>,
    ) -> Self {
        Self::new(name, ComponentKind::Storage { role, hamiltonian }, n, params)
    }

    /// Linear capacitor, `H = x²/2C`.
    pub fn capacitor(name: impl Into<String>, c: f64) -> Self {
        Self::storage(
            name,
            StorageRole::Capacitive,
            1,
            quadratic_energy("C"),
            vec![Parameter::new("C", c)],
        )
    }

    /// Linear inertance, `H = p²/2L`.
    pub fn inertance(name: impl Into<String>, l: f64) -> Self {
        Self::storage(
            name,
            StorageRole::Inductive,
            1,
            quadratic_energy("L"),
            vec![Parameter::new("L", l)],
        )
    }

    pub fn dissipative(name: impl Into<String>, law: DissipativeLaw, params: Vec<Parameter>) -> Self {
        Self::new(name, ComponentKind::Dissipative(law), 1, params)
    }

    /// Linear resistor `e = R f`.
    pub fn resistor(name: impl Into<String>, r: f64) -> Self {
        Self::dissipative(
            name,
            DissipativeLaw::Linear {
                resistance: Expr::param("R"),
            },
            vec![Parameter::new("R", r)],
        )
    }

    /// Shockley diode, `f = Is (exp(e/Vt) - 1)`.
    pub fn diode(name: impl Into<String>, is: f64, vt: f64) -> Self {
        let law = Expr::product(vec![
            Expr::param("Is"),
            Expr::sub(
                Expr::exp(Expr::div(Expr::effort(0), Expr::param("Vt"))),
                Expr::one(),
            ),
        ]);
        Self::dissipative(
            name,
            DissipativeLaw::FlowOfEffort(law),
            vec![Parameter::new("Is", is), Parameter::new("Vt", vt)],
        )
    }

    pub fn effort_source(name: impl Into<String>, value: f64) -> Self {
        Self::source(name, PortVariable::Effort, Expr::param("e"), vec![Parameter::new("e", value)])
    }

    pub fn flow_source(name: impl Into<String>, value: f64) -> Self {
        Self::source(name, PortVariable::Flow, Expr::param("f"), vec![Parameter::new("f", value)])
    }

    /// Effort source driven by an external input.
    pub fn controlled_effort_source(name: impl Into<String>) -> Self {
        Self::source(name, PortVariable::Effort, Expr::input(0), Vec::new())
    }

    /// Flow source driven by an external input.
    pub fn controlled_flow_source(name: impl Into<String>) -> Self {
        Self::source(name, PortVariable::Flow, Expr::input(0), Vec::new())
    }

    fn source(
        name: impl Into<String>,
        variable: PortVariable,
        value: Expr,
        params: Vec<Parameter>,
    ) -> Self {
        Self::new(name, ComponentKind::Source { variable, value }, 1, params)
    }

    pub fn zero_junction(name: impl Into<String>, ports: usize) -> Self {
        Self::new(name, ComponentKind::ZeroJunction, ports, Vec::new())
    }

    pub fn one_junction(name: impl Into<String>, ports: usize) -> Self {
        Self::new(name, ComponentKind::OneJunction, ports, Vec::new())
    }

    pub fn gyrator(name: impl Into<String>, r: f64) -> Self {
        Self::new(
            name,
            ComponentKind::Gyrator {
                ratio: Expr::param("r"),
            },
            2,
            vec![Parameter::new("r", r)],
        )
    }

    pub fn transformer(name: impl Into<String>, r: f64) -> Self {
        Self::new(
            name,
            ComponentKind::Transformer {
                ratio: Expr::param("r"),
            },
            2,
            vec![Parameter::new("r", r)],
        )
    }

    /// Wrap a graph; each of its exposures becomes a port, in exposure order.
    pub fn composite(name: impl Into<String>, inner: BondGraph) -> Self {
        Self::new(name, ComponentKind::Composite(Box::new(inner)), 0, Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn kind_tag(&self) -> KindTag {
        self.kind.tag()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Port index by display name.
    pub fn port_index(&self, name: &str) -> Option<u32> {
        self.ports.iter().find(|p| p.name == name).map(|p| p.index)
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// True when the component reads an external control input.
    pub fn is_controlled(&self) -> bool {
        match &self.kind {
            ComponentKind::Source { value, .. } => value.contains_var(&Var::Input(0)),
            _ => false,
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ComponentKind {
        &mut self.kind
    }

    pub(crate) fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    fn mismatch(&self, reason: impl Into<String>) -> GraphError {
        GraphError::ArityMismatch {
            component: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Every variable in `expr` must be a declared parameter or pass `local`.
    fn check_vars(&self, expr: &Expr, what: &str, local: impl Fn(&Var) -> bool) -> GraphResult<()> {
        for v in expr.free_vars() {
            let ok = match &v {
                Var::Param(p) => self.param(p).is_some(),
                other => local(other),
            };
            if !ok {
                return Err(self.mismatch(format!("{what} mentions undeclared {v}")));
            }
        }
        Ok(())
    }

    fn expect_ports(&self, n: usize) -> GraphResult<()> {
        if self.ports.len() == n {
            Ok(())
        } else {
            Err(self.mismatch(format!(
                "{} needs {} port(s), has {}",
                self.kind_tag(),
                n,
                self.ports.len()
            )))
        }
    }

    /// Check port count and the variables used by the relations.
    pub fn validate(&self) -> GraphResult<()> {
        let n = self.ports.len() as u32;
        match &self.kind {
            ComponentKind::Storage { hamiltonian, .. } => {
                if n == 0 {
                    return Err(self.mismatch("storage needs at least one port"));
                }
                self.check_vars(hamiltonian, "hamiltonian", |v| {
                    matches!(v, Var::State(i) if *i < n)
                })
            }
            ComponentKind::Dissipative(law) => {
                self.expect_ports(1)?;
                match law {
                    DissipativeLaw::Linear { resistance } => {
                        self.check_vars(resistance, "resistance", |_| false)
                    }
                    DissipativeLaw::EffortOfFlow(e) => {
                        self.check_vars(e, "law", |v| *v == Var::Flow(0))
                    }
                    DissipativeLaw::FlowOfEffort(e) => {
                        self.check_vars(e, "law", |v| *v == Var::Effort(0))
                    }
                }
            }
            ComponentKind::Source { value, .. } => {
                self.expect_ports(1)?;
                self.check_vars(value, "source value", |v| *v == Var::Input(0))
            }
            ComponentKind::ZeroJunction | ComponentKind::OneJunction => {
                if n < 2 {
                    return Err(self.mismatch("junction needs at least two ports"));
                }
                Ok(())
            }
            ComponentKind::Gyrator { ratio } | ComponentKind::Transformer { ratio } => {
                self.expect_ports(2)?;
                self.check_vars(ratio, "ratio", |_| false)
            }
            ComponentKind::Composite(inner) => self.expect_ports(inner.exposures().len()),
        }
    }
}

fn quadratic_energy(param: &str) -> Expr {
    Expr::div(
        Expr::powi(Expr::state(0), 2),
        Expr::product(vec![Expr::int(2), Expr::param(param)]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_components_validate() {
        for c in [
            Component::capacitor("C", 1.0),
            Component::inertance("L", 2.0),
            Component::resistor("R", 3.0),
            Component::diode("D", 1e-12, 0.025),
            Component::effort_source("Se", 5.0),
            Component::flow_source("Sf", 1.0),
            Component::controlled_effort_source("u"),
            Component::zero_junction("J0", 3),
            Component::one_junction("J1", 2),
            Component::gyrator("GY", 2.0),
            Component::transformer("TF", 0.5),
        ] {
            assert_eq!(c.validate(), Ok(()), "{}", c.name());
        }
    }

    #[test]
    fn junction_arity() {
        let j = Component::zero_junction("J", 1);
        assert!(matches!(j.validate(), Err(GraphError::ArityMismatch { .. })));
    }

    #[test]
    fn undeclared_variables_rejected() {
        // Hamiltonian mentions x_1 on a one-port store
        let c = Component::storage(
            "C",
            StorageRole::Capacitive,
            1,
            Expr::product(vec![Expr::state(0), Expr::state(1)]),
            Vec::new(),
        );
        assert!(matches!(c.validate(), Err(GraphError::ArityMismatch { .. })));

        // law in terms of the wrong port variable
        let r = Component::dissipative(
            "R",
            DissipativeLaw::EffortOfFlow(Expr::effort(0)),
            Vec::new(),
        );
        assert!(r.validate().is_err());

        // undeclared parameter
        let g = Component::new(
            "GY",
            ComponentKind::Gyrator {
                ratio: Expr::param("k"),
            },
            2,
            Vec::new(),
        );
        assert!(g.validate().is_err());
    }

    #[test]
    fn controlled_sources() {
        assert!(Component::controlled_flow_source("u").is_controlled());
        assert!(!Component::flow_source("Sf", 1.0).is_controlled());
        assert_eq!(Component::gyrator("GY", 1.0).kind_tag(), KindTag::Gyrator);
        assert_eq!(KindTag::OneJunction.to_string(), "junction-1");
    }
}
