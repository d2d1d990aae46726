//! Instantiation of constitutive relations under a causal assignment.
//!
//! Each port variable of the flat model receives exactly one defining
//! expression: from the owning component for the variable it determines,
//! from the bond for the other one, or from an external input at the
//! boundary.

use bg_expr::{Expr, Var};
use bg_graph::{
    ComponentKind, DissipativeLaw, FlatComponent, FlatModel, PortVariable, StorageRole,
};

use crate::causality::Causality;
use crate::error::{ReduceError, ReduceResult};
use crate::model::{InputOrigin, InputVariable, ParameterValue};

/// Dense index of a port variable: `2p` for the effort, `2p + 1` for the flow.
pub(crate) fn node_of(v: &Var) -> Option<usize> {
    match v {
        Var::Effort(p) => Some(2 * *p as usize),
        Var::Flow(p) => Some(2 * *p as usize + 1),
        _ => None,
    }
}

pub(crate) fn var_of(node: usize) -> Var {
    let port = (node / 2) as u32;
    if node % 2 == 0 {
        Var::Effort(port)
    } else {
        Var::Flow(port)
    }
}

fn port_var(port: usize, which: PortVariable) -> Var {
    match which {
        PortVariable::Effort => Var::Effort(port as u32),
        PortVariable::Flow => Var::Flow(port as u32),
    }
}

pub(crate) struct StateSlot {
    pub component: usize,
    pub port: usize,
    pub role: StorageRole,
    /// `∂H/∂x` in global variables.
    pub co_state: Expr,
    /// Port variable equal to the co-state.
    pub co_var: Var,
    /// Port variable whose value is `ẋ`.
    pub rate: Var,
    /// False when the port is in derivative causality: the network then
    /// supplies `co_var` and the store answers with `Var::Rate`.
    pub integral: bool,
}

pub(crate) struct OutputSlot {
    pub label: String,
    pub variable: PortVariable,
    pub source: Var,
}

pub(crate) struct Equations {
    /// Indexed by `node_of`.
    pub defs: Vec<Expr>,
    pub states: Vec<StateSlot>,
    pub inputs: Vec<InputVariable>,
    pub outputs: Vec<OutputSlot>,
    pub parameters: Vec<ParameterValue>,
}

/// Orientation of a junction port: `+1` when power flows into the junction.
fn orientation(model: &FlatModel, port: usize) -> i64 {
    match model.bond_of(port) {
        Some(b) if model.bonds[b].tail == port => -1,
        _ => 1,
    }
}

struct Builder<'a> {
    model: &'a FlatModel,
    causality: &'a [Causality],
    defs: Vec<Option<Expr>>,
}

impl Builder<'_> {
    fn define(&mut self, v: Var, expr: Expr) -> ReduceResult<()> {
        let node = node_of(&v).ok_or_else(|| ReduceError::Invariant {
            what: format!("{v} is not a port variable"),
        })?;
        if self.defs[node].is_some() {
            return Err(ReduceError::Invariant {
                what: format!("{} defined twice", self.describe(node)),
            });
        }
        self.defs[node] = Some(expr);
        Ok(())
    }

    fn describe(&self, node: usize) -> String {
        let what = if node % 2 == 0 { "effort" } else { "flow" };
        format!("{what} of {}", self.model.ports[node / 2].name)
    }

    fn out_port(&self, component: &FlatComponent, want: Causality) -> ReduceResult<usize> {
        component
            .ports
            .iter()
            .copied()
            .find(|&p| self.causality[p] == want)
            .ok_or_else(|| ReduceError::Invariant {
                what: format!("{} has no {want} port", component.path),
            })
    }
}

/// Map a component template into global variables.
fn instantiate(expr: &Expr, component: &FlatComponent, state_base: u32, input: Option<u32>) -> Expr {
    expr.map_vars(&mut |v| match v {
        Var::Effort(i) => Expr::effort(component.ports[*i as usize] as u32),
        Var::Flow(i) => Expr::flow(component.ports[*i as usize] as u32),
        Var::State(i) => Expr::state(state_base + i),
        Var::Rate(i) => Expr::Var(Var::Rate(state_base + i)),
        Var::Input(_) => input.map_or_else(|| Expr::Var(v.clone()), Expr::input),
        Var::Param(name) => Expr::param(format!("{}.{}", component.path, name)),
    })
}

pub(crate) fn build(model: &FlatModel, causality: &[Causality]) -> ReduceResult<Equations> {
    let mut b = Builder {
        model,
        causality,
        defs: vec![None; 2 * model.ports.len()],
    };

    // Inputs: boundary first, then controlled sources.
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for boundary in &model.boundary {
        let p = boundary.port;
        let determined = causality[p].output();
        let supplied = determined.other();
        let k = inputs.len() as u32;
        inputs.push(InputVariable {
            name: format!("u_{k}"),
            variable: supplied,
            origin: InputOrigin::Boundary {
                label: boundary.label.clone(),
            },
        });
        b.define(port_var(p, supplied), Expr::input(k))?;
        outputs.push(OutputSlot {
            label: boundary.label.clone(),
            variable: determined,
            source: port_var(p, determined),
        });
    }
    let mut input_of = vec![None; model.components.len()];
    for (ci, c) in model.components.iter().enumerate() {
        if let ComponentKind::Source { value, variable } = &c.kind {
            if value.contains_var(&Var::Input(0)) {
                let k = inputs.len() as u32;
                inputs.push(InputVariable {
                    name: format!("u_{k}"),
                    variable: *variable,
                    origin: InputOrigin::Source {
                        component: c.path.clone(),
                    },
                });
                input_of[ci] = Some(k);
            }
        }
    }

    let parameters = model
        .components
        .iter()
        .flat_map(|c| {
            c.params.iter().map(move |p| ParameterValue {
                name: format!("{}.{}", c.path, p.name),
                value: p.value,
            })
        })
        .collect();

    // Bonds: effort crosses unchanged, flow changes sign.
    for bond in &model.bonds {
        let (a, z) = if causality[bond.tail] == Causality::EffortOut {
            (bond.tail, bond.head)
        } else {
            (bond.head, bond.tail)
        };
        if causality[z] != Causality::FlowOut {
            return Err(ReduceError::Invariant {
                what: format!(
                    "bond {} -> {} is not causally complementary",
                    model.ports[bond.tail].name, model.ports[bond.head].name
                ),
            });
        }
        b.define(Var::Effort(z as u32), Expr::effort(a as u32))?;
        b.define(Var::Flow(a as u32), Expr::neg(Expr::flow(z as u32)))?;
    }

    let mut states = Vec::new();
    for (ci, c) in model.components.iter().enumerate() {
        let state_base = states.len() as u32;
        let local = |e: &Expr| instantiate(e, c, state_base, input_of[ci]);
        let e = |p: usize| Expr::effort(p as u32);
        let f = |p: usize| Expr::flow(p as u32);

        match &c.kind {
            ComponentKind::Storage { role, hamiltonian } => {
                let h = local(hamiltonian);
                for (i, &p) in c.ports.iter().enumerate() {
                    let k = state_base + i as u32;
                    let co_state = h.derivative(&Var::State(k));
                    let (co_var, rate) = match role {
                        StorageRole::Capacitive => (Var::Effort(p as u32), Var::Flow(p as u32)),
                        StorageRole::Inductive => (Var::Flow(p as u32), Var::Effort(p as u32)),
                    };
                    let integral = causality[p] == Causality::integral(*role);
                    if integral {
                        b.define(co_var.clone(), co_state.clone())?;
                    } else {
                        b.define(rate.clone(), Expr::Var(Var::Rate(k)))?;
                    }
                    states.push(StateSlot {
                        component: ci,
                        port: p,
                        role: *role,
                        co_state,
                        co_var,
                        rate,
                        integral,
                    });
                }
            }
            ComponentKind::Dissipative(law) => {
                let p = c.ports[0];
                match (law, causality[p]) {
                    (DissipativeLaw::Linear { resistance }, Causality::EffortOut) => {
                        b.define(Var::Effort(p as u32), Expr::product(vec![local(resistance), f(p)]))?
                    }
                    (DissipativeLaw::Linear { resistance }, Causality::FlowOut) => {
                        b.define(Var::Flow(p as u32), Expr::div(e(p), local(resistance)))?
                    }
                    (DissipativeLaw::EffortOfFlow(phi), Causality::EffortOut) => {
                        b.define(Var::Effort(p as u32), local(phi))?
                    }
                    (DissipativeLaw::FlowOfEffort(phi), Causality::FlowOut) => {
                        b.define(Var::Flow(p as u32), local(phi))?
                    }
                    _ => {
                        return Err(ReduceError::Invariant {
                            what: format!("{} has an inadmissible causality", c.path),
                        });
                    }
                }
            }
            ComponentKind::Source { variable, value } => {
                let p = c.ports[0];
                let value = local(value);
                match variable {
                    PortVariable::Effort => b.define(Var::Effort(p as u32), value)?,
                    // port flow is measured into the source
                    PortVariable::Flow => b.define(Var::Flow(p as u32), Expr::neg(value))?,
                }
            }
            ComponentKind::ZeroJunction => {
                let k = b.out_port(c, Causality::FlowOut)?;
                let others: Vec<usize> = c.ports.iter().copied().filter(|&p| p != k).collect();
                b.define(
                    Var::Flow(k as u32),
                    Expr::neg(Expr::sum(others.iter().map(|&p| f(p)).collect())),
                )?;
                for &p in &others {
                    b.define(Var::Effort(p as u32), e(k))?;
                }
            }
            ComponentKind::OneJunction => {
                let k = b.out_port(c, Causality::EffortOut)?;
                let sk = orientation(model, k);
                let mut terms = Vec::new();
                for &p in c.ports.iter().filter(|&&p| p != k) {
                    let sp = orientation(model, p);
                    terms.push(Expr::product(vec![Expr::int(-sk * sp), e(p)]));
                    b.define(
                        Var::Flow(p as u32),
                        Expr::product(vec![Expr::int(sp * sk), f(k)]),
                    )?;
                }
                b.define(Var::Effort(k as u32), Expr::sum(terms))?;
            }
            ComponentKind::Gyrator { ratio } => {
                let r = local(ratio);
                let (p0, p1) = (c.ports[0], c.ports[1]);
                if causality[p0] == Causality::EffortOut {
                    // e0 = r f1, e1 = -r f0
                    b.define(Var::Effort(p0 as u32), Expr::product(vec![r.clone(), f(p1)]))?;
                    b.define(Var::Effort(p1 as u32), Expr::neg(Expr::product(vec![r, f(p0)])))?;
                } else {
                    b.define(Var::Flow(p1 as u32), Expr::div(e(p0), r.clone()))?;
                    b.define(Var::Flow(p0 as u32), Expr::neg(Expr::div(e(p1), r)))?;
                }
            }
            ComponentKind::Transformer { ratio } => {
                let r = local(ratio);
                let (p0, p1) = (c.ports[0], c.ports[1]);
                if causality[p0] == Causality::EffortOut {
                    b.define(Var::Effort(p0 as u32), Expr::div(e(p1), r.clone()))?;
                    b.define(Var::Flow(p1 as u32), Expr::neg(Expr::div(f(p0), r)))?;
                } else {
                    // f0 = -r f1, e1 = r e0
                    b.define(Var::Flow(p0 as u32), Expr::neg(Expr::product(vec![r.clone(), f(p1)])))?;
                    b.define(Var::Effort(p1 as u32), Expr::product(vec![r, e(p0)]))?;
                }
            }
            ComponentKind::Composite(_) => {
                return Err(ReduceError::Invariant {
                    what: format!("{} was not flattened", c.path),
                });
            }
        }
    }

    let defs = b
        .defs
        .iter()
        .enumerate()
        .map(|(node, d)| {
            d.clone().ok_or_else(|| ReduceError::Invariant {
                what: format!("{} has no defining relation", b.describe(node)),
            })
        })
        .collect::<ReduceResult<Vec<_>>>()?;

    Ok(Equations {
        defs,
        states,
        inputs,
        outputs,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_numbering() {
        assert_eq!(node_of(&Var::Effort(3)), Some(6));
        assert_eq!(node_of(&Var::Flow(3)), Some(7));
        assert_eq!(node_of(&Var::State(0)), None);
        assert_eq!(var_of(7), Var::Flow(3));
        assert_eq!(var_of(6), Var::Effort(3));
    }
}
