//! Reduction engine.

use std::collections::{BTreeMap, BTreeSet};

use bg_expr::{Expr, Var, normalize};
use bg_graph::{BondGraph, ComponentKind, DissipativeLaw, FlatModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::causality::{Causality, CausalitySolver};
use crate::dependent;
use crate::equations::{self, Equations, var_of};
use crate::error::{ReduceError, ReduceResult};
use crate::model::{DependentState, OutputVariable, StateSpaceModel, StateVariable};
use crate::order::evaluation_order;

/// Tie-break preferences for ports the mandatory rules leave open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Causality tried first on linear resistors. `FlowOut` is the
    /// conductance form `f = e/R`.
    pub resistor_preference: Causality,
    /// Causality tried first on the interior side of a free boundary port.
    pub boundary_preference: Causality,
    /// Causality tried first on the tail of a bond no rule reached.
    pub bond_tail_preference: Causality,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            resistor_preference: Causality::FlowOut,
            boundary_preference: Causality::EffortOut,
            bond_tail_preference: Causality::EffortOut,
        }
    }
}

/// Resolved power variables of one flat port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSolution {
    /// `path.port`.
    pub name: String,
    /// Path of the owning component.
    pub component: String,
    pub causality: Causality,
    pub effort: Expr,
    pub flow: Expr,
}

/// A model together with the per-port diagnostics it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedSystem {
    pub model: StateSpaceModel,
    pub ports: Vec<PortSolution>,
}

impl ReducedSystem {
    pub fn port(&self, name: &str) -> Option<&PortSolution> {
        self.ports.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReductionEngine {
    config: ReductionConfig,
}

impl ReductionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReductionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    pub fn reduce(&self, graph: &BondGraph) -> ReduceResult<StateSpaceModel> {
        self.reduce_detailed(graph).map(|r| r.model)
    }

    /// Reduce independent graphs in parallel; results keep input order.
    pub fn reduce_all(&self, graphs: &[BondGraph]) -> Vec<ReduceResult<StateSpaceModel>> {
        graphs.par_iter().map(|g| self.reduce(g)).collect()
    }

    pub fn reduce_detailed(&self, graph: &BondGraph) -> ReduceResult<ReducedSystem> {
        if let Some(port) = graph.dangling_ports().into_iter().next() {
            return Err(ReduceError::IncompleteModel { port });
        }

        let flat = FlatModel::flatten(graph)?;
        debug!(
            components = flat.components.len(),
            ports = flat.ports.len(),
            bonds = flat.bonds.len(),
            boundary = flat.boundary.len(),
            "flattened"
        );

        let (causality, eqs, order) = self.assign(&flat)?;
        debug!(variables = order.len(), "evaluation order found");

        let mut resolved: BTreeMap<Var, Expr> = BTreeMap::new();
        for node in order {
            let value = normalize(&eqs.defs[node].substitute(&resolved));
            resolved.insert(var_of(node), value);
        }

        let elimination = dependent::eliminate(&flat, &eqs.states, &resolved)?;
        // independent states are renumbered densely
        let renumber: BTreeMap<Var, Expr> = eqs
            .states
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.integral)
            .enumerate()
            .map(|(new, (old, _))| (Var::State(old as u32), Expr::state(new as u32)))
            .collect();
        let finish = |e: &Expr| {
            let eliminated = normalize(&e.substitute(&elimination.subst));
            normalize(&eliminated.substitute(&renumber))
        };
        let lookup = |v: &Var| {
            resolved.get(v).map(&finish).ok_or_else(|| ReduceError::Invariant {
                what: format!("{v} unresolved"),
            })
        };

        let mut states = Vec::with_capacity(renumber.len());
        for slot in eqs.states.iter().filter(|s| s.integral) {
            let k = states.len();
            let derivative = lookup(&slot.rate)?;
            debug!(state = k, port = %flat.ports[slot.port].name, %derivative, "state equation");
            states.push(StateVariable {
                name: format!("x_{k}"),
                component: flat.components[slot.component].path.clone(),
                role: slot.role,
                co_state: finish(&slot.co_state),
                derivative,
            });
        }
        let dependents = elimination
            .dependent
            .iter()
            .map(|(d, value)| {
                let slot = &eqs.states[*d];
                DependentState {
                    component: flat.components[slot.component].path.clone(),
                    role: slot.role,
                    value: finish(value),
                }
            })
            .collect();

        let mut outputs = Vec::with_capacity(eqs.outputs.len());
        for slot in &eqs.outputs {
            outputs.push(OutputVariable {
                label: slot.label.clone(),
                variable: slot.variable,
                expr: lookup(&slot.source)?,
            });
        }

        let mut ports = Vec::with_capacity(flat.ports.len());
        for (p, port) in flat.ports.iter().enumerate() {
            ports.push(PortSolution {
                name: port.name.clone(),
                component: flat.owner_path(p).to_string(),
                causality: causality[p],
                effort: lookup(&Var::Effort(p as u32))?,
                flow: lookup(&Var::Flow(p as u32))?,
            });
        }

        let model = StateSpaceModel::new(states, dependents, eqs.inputs, outputs, eqs.parameters);
        Ok(ReducedSystem { model, ports })
    }

    /// Assign causality and order the relations.
    ///
    /// When the preferred assignment closes an algebraic loop through a
    /// linear resistor, that resistor's preference is inverted and the
    /// assignment redone, until the relations are loop-free or every
    /// resistor on the loop has been tried. The reported loop is the one
    /// found under the preferred assignment.
    fn assign(&self, flat: &FlatModel) -> ReduceResult<(Vec<Causality>, Equations, Vec<usize>)> {
        let mut flipped = BTreeSet::new();
        let mut first_loop: Option<ReduceError> = None;
        loop {
            let causality = match CausalitySolver::new(flat).solve(&self.config, &flipped) {
                Ok(causality) => causality,
                Err(err) => return Err(first_loop.unwrap_or(err)),
            };
            let eqs = equations::build(flat, &causality)?;
            let cycle = match evaluation_order(&eqs.defs) {
                Ok(order) => return Ok((causality, eqs, order)),
                Err(cycle) => cycle,
            };
            if first_loop.is_none() {
                first_loop = Some(loop_error(flat, &cycle));
            }
            let retry = cycle.iter().map(|node| flat.ports[node / 2].component).find(|ci| {
                !flipped.contains(ci)
                    && matches!(
                        flat.components[*ci].kind,
                        ComponentKind::Dissipative(DissipativeLaw::Linear { .. })
                    )
            });
            match retry {
                Some(ci) => {
                    debug!(
                        resistor = %flat.components[ci].path,
                        "algebraic loop, inverting resistor preference"
                    );
                    flipped.insert(ci);
                }
                None => return Err(first_loop.unwrap_or_else(|| loop_error(flat, &cycle))),
            }
        }
    }
}

fn loop_error(flat: &FlatModel, cycle: &[usize]) -> ReduceError {
    let mut components: Vec<String> = Vec::new();
    for node in cycle {
        let path = flat.owner_path(node / 2).to_string();
        if !components.contains(&path) {
            components.push(path);
        }
    }
    ReduceError::AlgebraicLoop { components }
}

/// Reduce with the default configuration.
pub fn reduce(graph: &BondGraph) -> ReduceResult<StateSpaceModel> {
    ReductionEngine::new().reduce(graph)
}

/// Reduce with the default configuration, keeping per-port diagnostics.
pub fn reduce_detailed(graph: &BondGraph) -> ReduceResult<ReducedSystem> {
    ReductionEngine::new().reduce_detailed(graph)
}

/// Reduce many graphs in parallel with the default configuration.
pub fn reduce_all(graphs: &[BondGraph]) -> Vec<ReduceResult<StateSpaceModel>> {
    ReductionEngine::new().reduce_all(graphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_graph::{Component, GraphBuilder};

    #[test]
    fn single_resistor_on_boundary() {
        // boundary effort drives a conductance
        let g = GraphBuilder::new()
            .component(Component::resistor("R", 2.0))
            .expose("R", "p")
            .build()
            .unwrap();
        let sys = reduce_detailed(&g).unwrap();
        assert_eq!(sys.model.state_count(), 0);
        let out = sys.model.output("p").unwrap();
        assert_eq!(
            out.expr,
            normalize(&Expr::div(Expr::input(0), Expr::param("R.R")))
        );
        assert_eq!(sys.port("R.0").unwrap().causality, Causality::FlowOut);
    }

    #[test]
    fn config_changes_resistor_form() {
        let g = GraphBuilder::new()
            .component(Component::resistor("R", 2.0))
            .expose("R", "p")
            .build()
            .unwrap();
        let engine = ReductionEngine::with_config(ReductionConfig {
            resistor_preference: Causality::EffortOut,
            ..ReductionConfig::default()
        });
        let model = engine.reduce(&g).unwrap();
        assert_eq!(
            model.output("p").unwrap().expr,
            normalize(&Expr::product(vec![Expr::param("R.R"), Expr::input(0)]))
        );
    }

    #[test]
    fn empty_graph_reduces_to_empty_model() {
        let model = reduce(&BondGraph::new()).unwrap();
        assert_eq!(model.state_count(), 0);
        assert!(model.inputs().is_empty());
    }
}
