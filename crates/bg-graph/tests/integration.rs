//! Integration tests for bg-graph.

use bg_graph::{Attachment, BondGraph, Component, GraphBuilder, GraphError};
use proptest::prelude::*;

#[test]
fn nested_composite_parameters_and_dangling_ports() {
    let inner = GraphBuilder::new()
        .component(Component::capacitor("C", 1.0))
        .component(Component::resistor("R", 2.0))
        .component(Component::zero_junction("J", 3))
        .bond("J", "C")
        .bond("J", "R")
        .expose("J", "p")
        .build()
        .unwrap();

    let mut outer = BondGraph::new();
    let rc = outer.add_component(Component::composite("RC", inner)).unwrap();
    assert_eq!(outer.dangling_ports(), vec!["RC.p".to_string()]);

    outer.set_param("RC.R.R", 4.0).unwrap();
    assert_eq!(
        outer.parameters(),
        vec![
            ("RC.C.C".to_string(), Some(1.0)),
            ("RC.R.R".to_string(), Some(4.0)),
        ]
    );

    let p = outer.port_named(rc, "p").unwrap();
    assert_eq!(outer.port_name(p).unwrap(), "RC.p");
    outer.expose(p, "in").unwrap();
    assert!(outer.dangling_ports().is_empty());
}

#[test]
fn unconnected_leaf_inside_composite_is_reported() {
    let inner = GraphBuilder::new()
        .component(Component::capacitor("C", 1.0))
        .component(Component::zero_junction("J", 3))
        .bond("J", "C")
        .expose("J", "p")
        .build()
        .unwrap();
    let mut outer = BondGraph::new();
    let rc = outer.add_component(Component::composite("X", inner)).unwrap();
    outer.expose(outer.port(rc, 0).unwrap(), "in").unwrap();
    assert_eq!(outer.dangling_ports(), vec!["X.J.2".to_string()]);
}

#[test]
fn failed_operations_leave_graph_unchanged() {
    let mut g = GraphBuilder::new()
        .component(Component::resistor("R1", 1.0))
        .component(Component::resistor("R2", 1.0))
        .bond("R1", "R2")
        .build()
        .unwrap();
    let before = g.clone();
    let r1 = g.component_id("R1").unwrap();
    let p = g.port(r1, 0).unwrap();
    assert!(matches!(g.expose(p, "x"), Err(GraphError::PortBusy { .. })));
    assert!(g.port(r1, 1).is_err());
    assert_eq!(g, before);
}

#[test]
fn removing_a_bond_frees_both_ends() {
    let mut g = GraphBuilder::new()
        .component(Component::capacitor("C", 1.0))
        .component(Component::resistor("R", 1.0))
        .bond("C", "R")
        .build()
        .unwrap();
    let bond = g.bonds()[0];
    assert_eq!(g.partner(bond.tail), Some(bond.head));

    assert_eq!(g.remove_bond(bond.id).unwrap(), bond);
    for port in [bond.tail, bond.head] {
        assert_eq!(g.partner(port), None);
        assert_eq!(g.attachment(port).unwrap(), Attachment::Free);
    }
    assert!(g.bonds().is_empty());
    assert_eq!(g.dangling_ports(), vec!["C.0".to_string(), "R.0".to_string()]);
    assert!(matches!(g.remove_bond(bond.id), Err(GraphError::NotFound { .. })));

    // reconnecting allocates a fresh id
    let again = g.connect(bond.tail, bond.head).unwrap();
    assert_ne!(again, bond.id);
    assert_eq!(g.attachment(bond.tail).unwrap(), Attachment::Bonded(again));
}

#[test]
fn add_component_rejects_bad_arity() {
    let mut g = BondGraph::new();
    g.add_component(Component::resistor("R", 1.0)).unwrap();
    let before = g.clone();

    for bad in [
        Component::zero_junction("J0", 1),
        Component::one_junction("J1", 1),
    ] {
        assert!(matches!(
            g.add_component(bad),
            Err(GraphError::ArityMismatch { .. })
        ));
    }
    assert_eq!(g.component_count(), 1);
    assert!(g.component_id("J0").is_none());
    assert_eq!(g, before);
}

proptest! {
    #[test]
    fn expose_unexpose_restores(count in 2usize..6, pick in 0usize..6) {
        let mut g = BondGraph::new();
        let j = g.add_component(Component::zero_junction("J", count)).unwrap();
        let index = (pick % count) as u32;
        let port = g.port(j, index).unwrap();
        let before = g.clone();

        g.expose(port, "b").unwrap();
        prop_assert_eq!(g.attachment(port).unwrap(), Attachment::Exposed);
        prop_assert_eq!(g.unexpose("b").unwrap(), port);
        prop_assert_eq!(&g, &before);
        g.expose(port, "b").unwrap();
        prop_assert_eq!(g.exposed_ports(), vec![port]);
    }
}
