//! bg-graph: bond-graph model layer.
//!
//! Provides:
//! - Components with constitutive relations as expression templates
//! - Bonds and boundary exposures inside a `BondGraph` scope
//! - Name-based authoring through `GraphBuilder`
//! - Flattening of nested composites for the reduction engine
//!
//! # Example
//!
//! ```
//! use bg_graph::{Component, GraphBuilder};
//!
//! let graph = GraphBuilder::new()
//!     .component(Component::capacitor("C", 1e-3))
//!     .component(Component::resistor("R", 10.0))
//!     .component(Component::one_junction("J", 3))
//!     .bond("J", "C")
//!     .bond("J", "R")
//!     .expose("J", "u")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.component_count(), 3);
//! assert!(graph.dangling_ports().is_empty());
//! ```

pub mod builder;
pub mod component;
pub mod error;
pub mod flatten;
pub mod graph;

pub use builder::GraphBuilder;
pub use component::{
    Component, ComponentKind, DissipativeLaw, KindTag, Parameter, Port, PortVariable, StorageRole,
};
pub use error::{GraphError, GraphResult};
pub use flatten::{FlatBond, FlatBoundary, FlatComponent, FlatModel, FlatPort};
pub use graph::{Attachment, Bond, BondGraph, Exposure, PortRef};
