//! Causality assignment.
//!
//! Every port gets a causality from the point of view of its owning
//! component; the two ends of a bond are complementary. Assignment is a
//! worklist over components: whenever a port changes, its owner (and the
//! owner of the bond partner) are re-queued and their rule is applied again.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use bg_graph::{ComponentKind, DissipativeLaw, FlatModel, PortVariable, StorageRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ReduceError, ReduceResult};
use crate::reduce::ReductionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Causality {
    /// The owning component determines the effort at this port.
    EffortOut,
    /// The owning component determines the flow at this port.
    FlowOut,
}

impl Causality {
    pub fn flip(self) -> Self {
        match self {
            Causality::EffortOut => Causality::FlowOut,
            Causality::FlowOut => Causality::EffortOut,
        }
    }

    /// Causality under which a storage port integrates its state.
    pub fn integral(role: StorageRole) -> Self {
        match role {
            StorageRole::Capacitive => Causality::EffortOut,
            StorageRole::Inductive => Causality::FlowOut,
        }
    }

    /// The port variable the owning component determines.
    pub fn output(self) -> PortVariable {
        match self {
            Causality::EffortOut => PortVariable::Effort,
            Causality::FlowOut => PortVariable::Flow,
        }
    }
}

impl fmt::Display for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Causality::EffortOut => f.pad("effort-out"),
            Causality::FlowOut => f.pad("flow-out"),
        }
    }
}

/// Causal constraint a component kind places on its own ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Every port has this causality.
    Fixed(Causality),
    /// Exactly one port has this causality, all others the opposite.
    ExactlyOne(Causality),
    /// Both ports equal.
    Same,
    /// Both ports opposite.
    Opposite,
    /// No constraint.
    Free,
}

impl Rule {
    pub fn for_kind(kind: &ComponentKind) -> Rule {
        match kind {
            ComponentKind::Storage { .. } | ComponentKind::Composite(_) => Rule::Free,
            ComponentKind::Dissipative(DissipativeLaw::Linear { .. }) => Rule::Free,
            ComponentKind::Dissipative(DissipativeLaw::EffortOfFlow(_)) => {
                Rule::Fixed(Causality::EffortOut)
            }
            ComponentKind::Dissipative(DissipativeLaw::FlowOfEffort(_)) => {
                Rule::Fixed(Causality::FlowOut)
            }
            ComponentKind::Source { variable, .. } => Rule::Fixed(match variable {
                PortVariable::Effort => Causality::EffortOut,
                PortVariable::Flow => Causality::FlowOut,
            }),
            ComponentKind::ZeroJunction => Rule::ExactlyOne(Causality::FlowOut),
            ComponentKind::OneJunction => Rule::ExactlyOne(Causality::EffortOut),
            ComponentKind::Gyrator { .. } => Rule::Same,
            ComponentKind::Transformer { .. } => Rule::Opposite,
        }
    }
}

/// Result of applying a rule to the current assignment of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    /// Port slots (local indices) that must take the given causality.
    Forced(Vec<(usize, Causality)>),
    Conflict(String),
}

/// Apply `rule` to the current causalities of one component's ports.
pub fn infer(rule: Rule, current: &[Option<Causality>]) -> Inference {
    let unassigned = || current.iter().enumerate().filter(|(_, c)| c.is_none()).map(|(i, _)| i);
    match rule {
        Rule::Free => Inference::Forced(Vec::new()),
        Rule::Fixed(want) => {
            if current.iter().flatten().any(|c| *c != want) {
                return Inference::Conflict(format!("port must be {want}"));
            }
            Inference::Forced(unassigned().map(|i| (i, want)).collect())
        }
        Rule::ExactlyOne(want) => {
            let count = current.iter().filter(|c| **c == Some(want)).count();
            match count {
                0 => {
                    let free: Vec<usize> = unassigned().collect();
                    match free.as_slice() {
                        [] => Inference::Conflict(format!("no port is {want}")),
                        [only] => Inference::Forced(vec![(*only, want)]),
                        _ => Inference::Forced(Vec::new()),
                    }
                }
                1 => Inference::Forced(unassigned().map(|i| (i, want.flip())).collect()),
                n => Inference::Conflict(format!("{n} ports are {want}, exactly one allowed")),
            }
        }
        Rule::Same | Rule::Opposite => {
            let relate = |c: Causality| if rule == Rule::Same { c } else { c.flip() };
            match current {
                [Some(a), Some(b)] if *b != relate(*a) => {
                    let how = if rule == Rule::Same { "equal" } else { "opposite" };
                    Inference::Conflict(format!("two-port needs {how} causalities"))
                }
                [Some(a), None] => Inference::Forced(vec![(1, relate(*a))]),
                [None, Some(b)] => Inference::Forced(vec![(0, relate(*b))]),
                _ => Inference::Forced(Vec::new()),
            }
        }
    }
}

/// Worklist state for one flattened model.
pub(crate) struct CausalitySolver<'a> {
    model: &'a FlatModel,
    rules: Vec<Rule>,
    ports: Vec<Option<Causality>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl<'a> CausalitySolver<'a> {
    pub(crate) fn new(model: &'a FlatModel) -> Self {
        Self {
            model,
            rules: model.components.iter().map(|c| Rule::for_kind(&c.kind)).collect(),
            ports: vec![None; model.ports.len()],
            queue: VecDeque::new(),
            queued: vec![false; model.components.len()],
        }
    }

    fn enqueue(&mut self, component: usize) {
        if !self.queued[component] {
            self.queued[component] = true;
            self.queue.push_back(component);
        }
    }

    /// Assign `port` and the complementary causality to its bond partner.
    fn set(&mut self, port: usize, causality: Causality) -> ReduceResult<()> {
        let model = self.model;
        let mut pending = vec![(port, causality)];
        while let Some((p, c)) = pending.pop() {
            match self.ports[p] {
                Some(existing) if existing == c => {}
                Some(existing) => {
                    let mut components = vec![model.owner_path(p).to_string()];
                    if let Some(q) = model.partner(p) {
                        components.push(model.owner_path(q).to_string());
                    }
                    return Err(ReduceError::CausalityConflict {
                        components,
                        reason: format!(
                            "port {} is {existing} but must be {c}",
                            model.ports[p].name
                        ),
                    });
                }
                None => {
                    trace!(port = %model.ports[p].name, causality = %c, "assign");
                    self.ports[p] = Some(c);
                    self.enqueue(model.ports[p].component);
                    if let Some(q) = model.partner(p) {
                        pending.push((q, c.flip()));
                    }
                }
            }
        }
        Ok(())
    }

    fn propagate(&mut self) -> ReduceResult<()> {
        let model = self.model;
        while let Some(ci) = self.queue.pop_front() {
            self.queued[ci] = false;
            let component = &model.components[ci];
            let current: Vec<Option<Causality>> =
                component.ports.iter().map(|&p| self.ports[p]).collect();
            match infer(self.rules[ci], &current) {
                Inference::Forced(forced) => {
                    for (slot, c) in forced {
                        self.set(component.ports[slot], c)?;
                    }
                }
                Inference::Conflict(reason) => {
                    return Err(ReduceError::CausalityConflict {
                        components: vec![component.path.clone()],
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// Assign and propagate; on failure the assignment is rolled back.
    fn attempt(&mut self, port: usize, causality: Causality) -> ReduceResult<()> {
        let snapshot = self.ports.clone();
        let result = self.set(port, causality).and_then(|_| self.propagate());
        if result.is_err() {
            self.ports = snapshot;
            self.queue.clear();
            self.queued.iter_mut().for_each(|q| *q = false);
        }
        result
    }

    /// Try `preferred` on an unassigned port, else its opposite.
    fn prefer(&mut self, port: usize, preferred: Causality) -> ReduceResult<()> {
        if self.ports[port].is_some() {
            return Ok(());
        }
        match self.attempt(port, preferred) {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!(port = %self.model.ports[port].name, %first, "preference rejected");
                self.attempt(port, preferred.flip())
            }
        }
    }

    /// Run all passes and return one causality per flat port.
    ///
    /// `flipped` holds flat component indices of linear resistors whose
    /// preferred causality is inverted.
    pub(crate) fn solve(
        mut self,
        config: &ReductionConfig,
        flipped: &BTreeSet<usize>,
    ) -> ReduceResult<Vec<Causality>> {
        let model = self.model;

        // mandatory rules
        for ci in 0..model.components.len() {
            self.enqueue(ci);
        }
        self.propagate()?;

        // integral causality on storage; a port the rules already forced
        // into derivative causality keeps it and its state becomes dependent
        for component in &model.components {
            let ComponentKind::Storage { role, .. } = &component.kind else {
                continue;
            };
            for &p in &component.ports {
                self.prefer(p, Causality::integral(*role))?;
            }
        }

        // linear resistors, with the preference inverted where a previous
        // attempt closed an algebraic loop
        for (ci, component) in model.components.iter().enumerate() {
            if let ComponentKind::Dissipative(DissipativeLaw::Linear { .. }) = component.kind {
                let preferred = if flipped.contains(&ci) {
                    config.resistor_preference.flip()
                } else {
                    config.resistor_preference
                };
                self.prefer(component.ports[0], preferred)?;
            }
        }

        // boundary
        for b in &model.boundary {
            self.prefer(b.port, config.boundary_preference)?;
        }

        // junction-only structure
        for bond in &model.bonds {
            self.prefer(bond.tail, config.bond_tail_preference)?;
        }

        debug!(ports = self.ports.len(), "causality assigned");
        self.ports
            .iter()
            .enumerate()
            .map(|(p, c)| {
                c.ok_or_else(|| ReduceError::Invariant {
                    what: format!("port {} left without causality", model.ports[p].name),
                })
            })
            .collect()
    }
}
