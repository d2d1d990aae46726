//! Hierarchy flattening.
//!
//! Composites are dissolved: every atomic component anywhere in the
//! hierarchy becomes one `FlatComponent` with a dotted path, and a composite
//! port resolves to the leaf port its inner exposure refers to. Ports get
//! dense global indices in declaration order.

use std::collections::BTreeMap;

use crate::component::{ComponentKind, Parameter};
use crate::error::{GraphError, GraphResult};
use crate::graph::{BondGraph, Endpoint};

#[derive(Debug, Clone, PartialEq)]
pub struct FlatComponent {
    /// Dotted path from the top-level graph, e.g. `RC.C`.
    pub path: String,
    /// Never `Composite`.
    pub kind: ComponentKind,
    pub params: Vec<Parameter>,
    /// Global port indices, in local port order.
    pub ports: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatPort {
    pub component: usize,
    pub local: u32,
    /// `path.index`.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatBond {
    pub tail: usize,
    pub head: usize,
}

/// A top-level exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBoundary {
    pub label: String,
    pub port: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FlatModel {
    pub components: Vec<FlatComponent>,
    pub ports: Vec<FlatPort>,
    pub bonds: Vec<FlatBond>,
    pub boundary: Vec<FlatBoundary>,
    port_bond: Vec<Option<usize>>,
    port_boundary: Vec<Option<usize>>,
}

impl FlatModel {
    pub fn flatten(graph: &BondGraph) -> GraphResult<Self> {
        let mut model = FlatModel::default();
        let leaves = model.flatten_scope(graph, "")?;
        model.boundary = graph
            .raw_exposures()
            .iter()
            .zip(leaves)
            .map(|((label, _), port)| FlatBoundary {
                label: label.clone(),
                port,
            })
            .collect();

        model.port_bond = vec![None; model.ports.len()];
        model.port_boundary = vec![None; model.ports.len()];
        for (i, b) in model.bonds.iter().enumerate() {
            model.port_bond[b.tail] = Some(i);
            model.port_bond[b.head] = Some(i);
        }
        for (i, b) in model.boundary.iter().enumerate() {
            model.port_boundary[b.port] = Some(i);
        }
        Ok(model)
    }

    /// Flatten one scope and return the leaf port behind each of its
    /// exposures, in exposure order.
    fn flatten_scope(&mut self, graph: &BondGraph, prefix: &str) -> GraphResult<Vec<usize>> {
        let mut leaf_of: BTreeMap<Endpoint, usize> = BTreeMap::new();

        for (id, comp) in graph.components() {
            let path = format!("{prefix}{}", comp.name());
            if let ComponentKind::Composite(inner) = comp.kind() {
                let leaves = self.flatten_scope(inner, &format!("{path}."))?;
                if leaves.len() != comp.port_count() {
                    return Err(GraphError::ArityMismatch {
                        component: path,
                        reason: format!(
                            "{} ports but {} inner exposures",
                            comp.port_count(),
                            leaves.len()
                        ),
                    });
                }
                for (index, leaf) in leaves.into_iter().enumerate() {
                    leaf_of.insert(
                        Endpoint {
                            comp: id,
                            index: index as u32,
                        },
                        leaf,
                    );
                }
                continue;
            }

            let component = self.components.len();
            let mut ports = Vec::with_capacity(comp.port_count());
            for p in comp.ports() {
                let global = self.ports.len();
                self.ports.push(FlatPort {
                    component,
                    local: p.index,
                    name: format!("{path}.{}", p.name),
                });
                leaf_of.insert(
                    Endpoint {
                        comp: id,
                        index: p.index,
                    },
                    global,
                );
                ports.push(global);
            }
            self.components.push(FlatComponent {
                path,
                kind: comp.kind().clone(),
                params: comp.params().to_vec(),
                ports,
            });
        }

        let lookup = |ep: &Endpoint| {
            leaf_of.get(ep).copied().ok_or_else(|| GraphError::NotFound {
                what: format!("{prefix}port {}.{}", ep.comp, ep.index),
            })
        };
        for (tail, head) in graph.raw_bonds() {
            let bond = FlatBond {
                tail: lookup(tail)?,
                head: lookup(head)?,
            };
            self.bonds.push(bond);
        }
        graph
            .raw_exposures()
            .iter()
            .map(|(_, ep)| lookup(ep))
            .collect()
    }

    /// Index of the bond attached to `port`.
    pub fn bond_of(&self, port: usize) -> Option<usize> {
        self.port_bond.get(port).copied().flatten()
    }

    /// Index of the top-level boundary entry for `port`.
    pub fn boundary_of(&self, port: usize) -> Option<usize> {
        self.port_boundary.get(port).copied().flatten()
    }

    /// Port on the other end of `port`'s bond.
    pub fn partner(&self, port: usize) -> Option<usize> {
        let b = self.bonds[self.bond_of(port)?];
        Some(if b.tail == port { b.head } else { b.tail })
    }

    /// True if `port` is the tail of its bond.
    pub fn is_tail(&self, port: usize) -> bool {
        self.bond_of(port)
            .is_some_and(|b| self.bonds[b].tail == port)
    }

    /// Path of the component owning `port`.
    pub fn owner_path(&self, port: usize) -> &str {
        &self.components[self.ports[port].component].path
    }
}
