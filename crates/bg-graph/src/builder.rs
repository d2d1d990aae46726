//! Name-based graph builder.

use bg_core::CompId;

use crate::component::Component;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Attachment, BondGraph, PortRef};

/// Builder for authoring a graph by component and port names.
///
/// Ports are written `"Name"` (lowest-numbered free port of the component)
/// or `"Name.port"` (port index, or exposure label for composites). The first
/// failing step is remembered and returned by `build()`; later steps are
/// skipped.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: BondGraph,
    error: Option<GraphError>,
}

impl GraphBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn step(&mut self, f: impl FnOnce(&mut BondGraph) -> GraphResult<()>) -> &mut Self {
        if self.error.is_none() {
            if let Err(e) = f(&mut self.graph) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn component(&mut self, component: Component) -> &mut Self {
        self.step(|g| g.add_component(component).map(|_| ()))
    }

    /// Bond `tail` to `head`.
    pub fn bond(&mut self, tail: &str, head: &str) -> &mut Self {
        self.step(|g| {
            let t = resolve(g, tail)?;
            let h = resolve(g, head)?;
            g.connect(t, h).map(|_| ())
        })
    }

    pub fn expose(&mut self, port: &str, label: &str) -> &mut Self {
        self.step(|g| {
            let p = resolve(g, port)?;
            g.expose(p, label)
        })
    }

    /// Finish building, returning the first error encountered.
    pub fn build(&mut self) -> GraphResult<BondGraph> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(std::mem::take(&mut self.graph)),
        }
    }
}

fn component_named(g: &BondGraph, name: &str) -> GraphResult<CompId> {
    g.component_id(name).ok_or_else(|| GraphError::NotFound {
        what: format!("Component {name}"),
    })
}

fn resolve(g: &BondGraph, spec: &str) -> GraphResult<PortRef> {
    if let Some((name, port)) = spec.split_once('.') {
        let comp = component_named(g, name)?;
        return match port.parse::<u32>() {
            Ok(index) => g.port(comp, index),
            Err(_) => g.port_named(comp, port),
        };
    }
    let comp = component_named(g, spec)?;
    let count = g.component(comp).map_or(0, Component::port_count);
    for index in 0..count as u32 {
        let p = g.port(comp, index)?;
        if g.attachment(p)? == Attachment::Free {
            return Ok(p);
        }
    }
    Err(GraphError::PortBusy {
        port: format!("{spec}.*"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_basic() {
        let graph = GraphBuilder::new()
            .component(Component::capacitor("C", 1.0))
            .component(Component::resistor("R", 1.0))
            .component(Component::one_junction("J", 3))
            .bond("J", "C")
            .bond("J", "R")
            .expose("J", "u")
            .build()
            .unwrap();

        assert_eq!(graph.component_count(), 3);
        assert_eq!(graph.bonds().len(), 2);
        let j = graph.component_id("J").unwrap();
        assert_eq!(graph.exposed_ports(), vec![graph.port(j, 2).unwrap()]);
        assert!(graph.dangling_ports().is_empty());
    }

    #[test]
    fn builder_explicit_ports() {
        let graph = GraphBuilder::new()
            .component(Component::gyrator("GY", 1.0))
            .component(Component::capacitor("C1", 1.0))
            .component(Component::capacitor("C2", 1.0))
            .bond("GY.1", "C2")
            .bond("GY.0", "C1.0")
            .build()
            .unwrap();
        let gy = graph.component_id("GY").unwrap();
        let c2 = graph.component_id("C2").unwrap();
        assert_eq!(graph.partner(graph.port(gy, 1).unwrap()), Some(graph.port(c2, 0).unwrap()));
    }

    #[test]
    fn builder_reports_first_error() {
        let err = GraphBuilder::new()
            .component(Component::resistor("R", 1.0))
            .bond("R", "Missing")
            .bond("R", "R")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));

        let err = GraphBuilder::new()
            .component(Component::resistor("R", 1.0))
            .component(Component::capacitor("C", 1.0))
            .bond("R", "C")
            .bond("R", "C")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::PortBusy { .. }));
    }
}
