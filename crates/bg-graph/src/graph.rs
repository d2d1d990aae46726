//! Bond graph: components, bonds and boundary exposures in one scope.

use std::fmt;

use bg_core::{BondId, CompId, GraphId};

use crate::component::{Component, ComponentKind};
use crate::error::{GraphError, GraphResult};

/// Handle to a port of a component in a specific graph.
///
/// Handles are plain references; they do not keep the component alive and
/// are rejected by any graph other than the one that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub graph: GraphId,
    pub comp: CompId,
    pub index: u32,
}

/// Scope-local port address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct Endpoint {
    pub(crate) comp: CompId,
    pub(crate) index: u32,
}

impl From<PortRef> for Endpoint {
    fn from(p: PortRef) -> Self {
        Endpoint {
            comp: p.comp,
            index: p.index,
        }
    }
}

/// A power bond. Positive power flows from `tail` to `head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub id: BondId,
    pub tail: PortRef,
    pub head: PortRef,
}

/// A port made visible at the graph boundary under a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    pub label: String,
    pub port: PortRef,
}

/// What a port is currently attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Free,
    Bonded(BondId),
    Exposed,
}

/// A bond graph scope.
///
/// Component and bond ids are slot indices and are never reused after
/// removal. Cloning produces a new scope: handles issued by the original are
/// not valid for the clone.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BondGraph {
    id: GraphId,
    components: Vec<Option<Component>>,
    bonds: Vec<Option<(Endpoint, Endpoint)>>,
    exposures: Vec<(String, Endpoint)>,
}

impl Default for BondGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for BondGraph {
    fn clone(&self) -> Self {
        Self {
            id: GraphId::new(),
            components: self.components.clone(),
            bonds: self.bonds.clone(),
            exposures: self.exposures.clone(),
        }
    }
}

/// Structural equality; the scope id is ignored.
impl PartialEq for BondGraph {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
            && self.bonds == other.bonds
            && self.exposures == other.exposures
    }
}

impl BondGraph {
    pub fn new() -> Self {
        Self {
            id: GraphId::new(),
            components: Vec::new(),
            bonds: Vec::new(),
            exposures: Vec::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Add a component and return its id.
    pub fn add_component(&mut self, component: Component) -> GraphResult<CompId> {
        let name = component.name();
        if name.is_empty() || name.contains('.') {
            return Err(GraphError::InvalidName {
                name: name.to_string(),
            });
        }
        if self.component_id(name).is_some() {
            return Err(GraphError::DuplicateName {
                name: name.to_string(),
            });
        }
        component.validate()?;
        let id = CompId::from_index(self.components.len() as u32);
        self.components.push(Some(component));
        Ok(id)
    }

    /// Handle for port `index` of `comp`.
    pub fn port(&self, comp: CompId, index: u32) -> GraphResult<PortRef> {
        let c = self.component(comp).ok_or_else(|| not_found(format!("Component {comp}")))?;
        if index as usize >= c.port_count() {
            return Err(not_found(format!("Port {}.{}", c.name(), index)));
        }
        Ok(PortRef {
            graph: self.id,
            comp,
            index,
        })
    }

    /// Handle for the port of `comp` with the given display name.
    pub fn port_named(&self, comp: CompId, name: &str) -> GraphResult<PortRef> {
        let c = self.component(comp).ok_or_else(|| not_found(format!("Component {comp}")))?;
        let index = c
            .port_index(name)
            .ok_or_else(|| not_found(format!("Port {}.{}", c.name(), name)))?;
        self.port(comp, index)
    }

    fn resolve(&self, port: PortRef) -> GraphResult<Endpoint> {
        if port.graph != self.id {
            return Err(GraphError::Scope {
                comp: port.comp,
                index: port.index,
            });
        }
        self.port(port.comp, port.index).map(Endpoint::from)
    }

    fn handle(&self, ep: Endpoint) -> PortRef {
        PortRef {
            graph: self.id,
            comp: ep.comp,
            index: ep.index,
        }
    }

    fn endpoint_name(&self, ep: Endpoint) -> String {
        match self.component(ep.comp) {
            Some(c) => match c.ports().get(ep.index as usize) {
                Some(p) => format!("{}.{}", c.name(), p.name),
                None => format!("{}.{}", c.name(), ep.index),
            },
            None => format!("{}.{}", ep.comp, ep.index),
        }
    }

    fn attachment_of(&self, ep: Endpoint) -> Attachment {
        for (i, bond) in self.bonds.iter().enumerate() {
            if let Some((tail, head)) = bond {
                if *tail == ep || *head == ep {
                    return Attachment::Bonded(BondId::from_index(i as u32));
                }
            }
        }
        if self.exposures.iter().any(|(_, e)| *e == ep) {
            Attachment::Exposed
        } else {
            Attachment::Free
        }
    }

    fn require_free(&self, ep: Endpoint) -> GraphResult<()> {
        match self.attachment_of(ep) {
            Attachment::Free => Ok(()),
            _ => Err(GraphError::PortBusy {
                port: self.endpoint_name(ep),
            }),
        }
    }

    /// Bond two free ports; power flows from `tail` to `head`.
    pub fn connect(&mut self, tail: PortRef, head: PortRef) -> GraphResult<BondId> {
        let t = self.resolve(tail)?;
        let h = self.resolve(head)?;
        if t == h {
            return Err(GraphError::PortBusy {
                port: self.endpoint_name(t),
            });
        }
        self.require_free(t)?;
        self.require_free(h)?;
        let id = BondId::from_index(self.bonds.len() as u32);
        self.bonds.push(Some((t, h)));
        Ok(id)
    }

    /// Make a free port part of this graph's boundary.
    pub fn expose(&mut self, port: PortRef, label: impl Into<String>) -> GraphResult<()> {
        let label = label.into();
        let ep = self.resolve(port)?;
        if self.exposures.iter().any(|(l, _)| *l == label) {
            return Err(GraphError::DuplicateLabel { label });
        }
        self.require_free(ep)?;
        self.exposures.push((label, ep));
        Ok(())
    }

    /// Withdraw an exposure and return the port it referred to.
    pub fn unexpose(&mut self, label: &str) -> GraphResult<PortRef> {
        let pos = self
            .exposures
            .iter()
            .position(|(l, _)| l == label)
            .ok_or_else(|| not_found(format!("Exposure {label}")))?;
        let (_, ep) = self.exposures.remove(pos);
        Ok(self.handle(ep))
    }

    pub fn remove_bond(&mut self, id: BondId) -> GraphResult<Bond> {
        let bond = self.bond(id).ok_or_else(|| not_found(format!("Bond {id}")))?;
        self.bonds[id.index() as usize] = None;
        Ok(bond)
    }

    /// Remove a component together with its bonds and exposures.
    pub fn remove_component(&mut self, id: CompId) -> GraphResult<Component> {
        let component = self
            .components
            .get_mut(id.index() as usize)
            .and_then(Option::take)
            .ok_or_else(|| not_found(format!("Component {id}")))?;
        for slot in &mut self.bonds {
            if matches!(slot, Some((t, h)) if t.comp == id || h.comp == id) {
                *slot = None;
            }
        }
        self.exposures.retain(|(_, ep)| ep.comp != id);
        Ok(component)
    }

    pub fn component(&self, id: CompId) -> Option<&Component> {
        self.components.get(id.index() as usize)?.as_ref()
    }

    pub fn component_id(&self, name: &str) -> Option<CompId> {
        self.components().find(|(_, c)| c.name() == name).map(|(id, _)| id)
    }

    /// Live components in declaration order.
    pub fn components(&self) -> impl Iterator<Item = (CompId, &Component)> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (CompId::from_index(i as u32), c)))
    }

    pub fn component_count(&self) -> usize {
        self.components().count()
    }

    pub fn bond(&self, id: BondId) -> Option<Bond> {
        let (tail, head) = (*self.bonds.get(id.index() as usize)?)?;
        Some(Bond {
            id,
            tail: self.handle(tail),
            head: self.handle(head),
        })
    }

    /// Live bonds in creation order.
    pub fn bonds(&self) -> Vec<Bond> {
        (0..self.bonds.len() as u32)
            .filter_map(|i| self.bond(BondId::from_index(i)))
            .collect()
    }

    pub fn attachment(&self, port: PortRef) -> GraphResult<Attachment> {
        let ep = self.resolve(port)?;
        Ok(self.attachment_of(ep))
    }

    /// The port on the other end of this port's bond.
    pub fn partner(&self, port: PortRef) -> Option<PortRef> {
        let ep = self.resolve(port).ok()?;
        self.bonds.iter().flatten().find_map(|(t, h)| {
            if *t == ep {
                Some(self.handle(*h))
            } else if *h == ep {
                Some(self.handle(*t))
            } else {
                None
            }
        })
    }

    pub fn exposures(&self) -> Vec<Exposure> {
        self.exposures
            .iter()
            .map(|(label, ep)| Exposure {
                label: label.clone(),
                port: self.handle(*ep),
            })
            .collect()
    }

    pub fn exposed_ports(&self) -> Vec<PortRef> {
        self.exposures.iter().map(|(_, ep)| self.handle(*ep)).collect()
    }

    /// Display name `component.port`.
    pub fn port_name(&self, port: PortRef) -> GraphResult<String> {
        let ep = self.resolve(port)?;
        Ok(self.endpoint_name(ep))
    }

    /// Every parameter in the hierarchy with its qualified name.
    pub fn parameters(&self) -> Vec<(String, Option<f64>)> {
        let mut out = Vec::new();
        self.collect_parameters("", &mut out);
        out
    }

    fn collect_parameters(&self, prefix: &str, out: &mut Vec<(String, Option<f64>)>) {
        for (_, c) in self.components() {
            let path = format!("{prefix}{}", c.name());
            if let ComponentKind::Composite(inner) = c.kind() {
                inner.collect_parameters(&format!("{path}."), out);
            }
            for p in c.params() {
                out.push((format!("{path}.{}", p.name), p.value));
            }
        }
    }

    /// Set a parameter by qualified name, e.g. `"R.R"` or `"RC.C.C"`.
    pub fn set_param(&mut self, qualified: &str, value: f64) -> GraphResult<()> {
        let missing = || not_found(format!("Parameter {qualified}"));
        let (head, rest) = qualified.split_once('.').ok_or_else(missing)?;
        let id = self.component_id(head).ok_or_else(missing)?;
        let component = self.components[id.index() as usize]
            .as_mut()
            .ok_or_else(missing)?;
        if let Some(p) = component.param_mut(rest) {
            p.value = Some(value);
            return Ok(());
        }
        match component.kind_mut() {
            ComponentKind::Composite(inner) => inner.set_param(rest, value).map_err(|_| missing()),
            _ => Err(missing()),
        }
    }

    /// Ports that are neither bonded nor exposed, recursively, as
    /// `path.port`.
    pub fn dangling_ports(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_dangling("", &mut out);
        out
    }

    fn collect_dangling(&self, prefix: &str, out: &mut Vec<String>) {
        for (id, c) in self.components() {
            for p in c.ports() {
                let ep = Endpoint {
                    comp: id,
                    index: p.index,
                };
                if self.attachment_of(ep) == Attachment::Free {
                    out.push(format!("{prefix}{}.{}", c.name(), p.name));
                }
            }
            if let ComponentKind::Composite(inner) = c.kind() {
                inner.collect_dangling(&format!("{prefix}{}.", c.name()), out);
            }
        }
    }

    pub(crate) fn raw_bonds(&self) -> impl Iterator<Item = &(Endpoint, Endpoint)> {
        self.bonds.iter().flatten()
    }

    pub(crate) fn raw_exposures(&self) -> &[(String, Endpoint)] {
        &self.exposures
    }
}

impl fmt::Display for BondGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, c) in self.components() {
            writeln!(f, "{} [{}] ports={}", c.name(), c.kind_tag(), c.port_count())?;
        }
        for (tail, head) in self.raw_bonds() {
            writeln!(f, "{} -> {}", self.endpoint_name(*tail), self.endpoint_name(*head))?;
        }
        for (label, ep) in &self.exposures {
            writeln!(f, "{label} = {}", self.endpoint_name(*ep))?;
        }
        Ok(())
    }
}

fn not_found(what: String) -> GraphError {
    GraphError::NotFound { what }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc() -> (BondGraph, CompId, CompId) {
        let mut g = BondGraph::new();
        let c = g.add_component(Component::capacitor("C", 1.0)).unwrap();
        let r = g.add_component(Component::resistor("R", 2.0)).unwrap();
        (g, c, r)
    }

    #[test]
    fn connect_marks_partners() {
        let (mut g, c, r) = rc();
        let pc = g.port(c, 0).unwrap();
        let pr = g.port(r, 0).unwrap();
        let b = g.connect(pc, pr).unwrap();
        assert_eq!(g.partner(pc), Some(pr));
        assert_eq!(g.partner(pr), Some(pc));
        assert_eq!(g.attachment(pc).unwrap(), Attachment::Bonded(b));
        assert!(matches!(g.connect(pc, pr), Err(GraphError::PortBusy { .. })));
        assert!(g.dangling_ports().is_empty());
    }

    #[test]
    fn self_bond_is_rejected() {
        let (mut g, c, _) = rc();
        let pc = g.port(c, 0).unwrap();
        assert!(matches!(g.connect(pc, pc), Err(GraphError::PortBusy { .. })));
    }

    #[test]
    fn duplicate_and_invalid_names() {
        let (mut g, _, _) = rc();
        assert!(matches!(
            g.add_component(Component::resistor("R", 1.0)),
            Err(GraphError::DuplicateName { .. })
        ));
        assert!(matches!(
            g.add_component(Component::resistor("a.b", 1.0)),
            Err(GraphError::InvalidName { .. })
        ));
    }

    #[test]
    fn foreign_ports_are_out_of_scope() {
        let (g, c, _) = rc();
        let mut other = g.clone();
        let pc = g.port(c, 0).unwrap();
        let pr = other.port(CompId::from_index(1), 0).unwrap();
        assert!(matches!(other.connect(pc, pr), Err(GraphError::Scope { .. })));
        assert_eq!(g, other);
    }

    #[test]
    fn expose_and_labels() {
        let (mut g, c, r) = rc();
        let pc = g.port(c, 0).unwrap();
        let pr = g.port(r, 0).unwrap();
        g.expose(pc, "a").unwrap();
        assert!(matches!(g.expose(pr, "a"), Err(GraphError::DuplicateLabel { .. })));
        assert!(matches!(g.expose(pc, "b"), Err(GraphError::PortBusy { .. })));
        assert!(matches!(g.connect(pc, pr), Err(GraphError::PortBusy { .. })));
        assert_eq!(g.unexpose("a").unwrap(), pc);
        assert!(g.unexpose("a").is_err());
        assert_eq!(g.attachment(pc).unwrap(), Attachment::Free);
    }

    #[test]
    fn remove_component_detaches() {
        let (mut g, c, r) = rc();
        let pc = g.port(c, 0).unwrap();
        let pr = g.port(r, 0).unwrap();
        let b = g.connect(pc, pr).unwrap();
        let removed = g.remove_component(r).unwrap();
        assert_eq!(removed.name(), "R");
        assert!(g.bond(b).is_none());
        assert_eq!(g.partner(pc), None);
        assert!(g.remove_component(r).is_err());
        assert!(g.port(r, 0).is_err());
        assert_eq!(g.dangling_ports(), vec!["C.0".to_string()]);
        // ids are not reused
        let r2 = g.add_component(Component::resistor("R", 1.0)).unwrap();
        assert_ne!(r2, r);
    }

    #[test]
    fn parameters_are_qualified() {
        let (mut g, _, _) = rc();
        g.set_param("R.R", 5.0).unwrap();
        assert_eq!(
            g.parameters(),
            vec![("C.C".to_string(), Some(1.0)), ("R.R".to_string(), Some(5.0))]
        );
        assert!(g.set_param("R.X", 1.0).is_err());
        assert!(g.set_param("R", 1.0).is_err());
    }
}
