//! bg-reduce: bond-graph reduction to explicit state-space form.
//!
//! Pipeline:
//! 1. completeness check and hierarchy flattening
//! 2. causality assignment (worklist over per-kind rules)
//! 3. one defining relation per port variable
//! 4. evaluation order (Kahn) and symbolic substitution
//! 5. elimination of states held in derivative causality
//!
//! The result is a `StateSpaceModel` whose expressions reference only states,
//! inputs and qualified parameters.
//!
//! # Example
//!
//! ```
//! use bg_graph::{Component, GraphBuilder};
//! use bg_reduce::reduce;
//!
//! let graph = GraphBuilder::new()
//!     .component(Component::capacitor("C", 1.0))
//!     .component(Component::resistor("R", 1.0))
//!     .component(Component::zero_junction("J", 2))
//!     .bond("J", "C")
//!     .bond("J", "R")
//!     .build()
//!     .unwrap();
//!
//! let model = reduce(&graph).unwrap();
//! assert_eq!(model.state_count(), 1);
//! ```

pub mod causality;
pub(crate) mod dependent;
pub(crate) mod equations;
pub mod error;
pub mod model;
pub(crate) mod order;
pub mod reduce;

pub use causality::{Causality, Inference, Rule, infer};
pub use error::{ReduceError, ReduceResult};
pub use model::{
    DependentState, InputOrigin, InputVariable, LinearForm, OutputVariable, ParameterValue,
    StateSpaceModel, StateVariable,
};
pub use reduce::{
    PortSolution, ReducedSystem, ReductionConfig, ReductionEngine, reduce, reduce_all,
    reduce_detailed,
};
