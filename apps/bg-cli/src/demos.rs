//! Built-in demo models.

use bg_graph::{BondGraph, Component, GraphBuilder, GraphResult};

pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> GraphResult<BondGraph>,
}

impl Demo {
    pub fn build(&self) -> GraphResult<BondGraph> {
        (self.build)()
    }
}

pub const DEMOS: &[Demo] = &[
    Demo {
        name: "rc",
        description: "capacitor discharging through a resistor, driven at one boundary port",
        build: rc,
    },
    Demo {
        name: "parallel-rc",
        description: "parallel RC subsystem used as a composite, fed by a flow source",
        build: parallel_rc_driven,
    },
    Demo {
        name: "mass-spring-damper",
        description: "force source on a mass, spring and damper sharing one velocity",
        build: mass_spring_damper,
    },
    Demo {
        name: "dc-motor",
        description: "armature circuit coupled to a rotor through a gyrator",
        build: dc_motor,
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|d| d.name == name)
}

fn rc() -> GraphResult<BondGraph> {
    GraphBuilder::new()
        .component(Component::capacitor("C", 1e-6))
        .component(Component::resistor("R", 1e3))
        .component(Component::one_junction("J", 3))
        .bond("J", "C")
        .bond("J", "R")
        .expose("J", "u")
        .build()
}

fn parallel_rc() -> GraphResult<BondGraph> {
    GraphBuilder::new()
        .component(Component::capacitor("C", 1e-3))
        .component(Component::resistor("R", 100.0))
        .component(Component::zero_junction("J", 3))
        .bond("J", "C")
        .bond("J", "R")
        .expose("J", "p")
        .build()
}

fn parallel_rc_driven() -> GraphResult<BondGraph> {
    GraphBuilder::new()
        .component(Component::composite("RC", parallel_rc()?))
        .component(Component::flow_source("Sf", 1e-3))
        .bond("Sf", "RC.p")
        .build()
}

fn mass_spring_damper() -> GraphResult<BondGraph> {
    GraphBuilder::new()
        .component(Component::effort_source("F", 1.0))
        .component(Component::inertance("m", 2.0))
        .component(Component::capacitor("k", 0.5))
        .component(Component::resistor("b", 0.1))
        .component(Component::one_junction("v", 4))
        .bond("F", "v")
        .bond("v", "m")
        .bond("v", "k")
        .bond("v", "b")
        .build()
}

fn dc_motor() -> GraphResult<BondGraph> {
    GraphBuilder::new()
        .component(Component::controlled_effort_source("V"))
        .component(Component::resistor("Ra", 1.2))
        .component(Component::inertance("La", 5e-3))
        .component(Component::one_junction("i", 4))
        .component(Component::gyrator("K", 0.05))
        .component(Component::inertance("Jm", 1e-4))
        .component(Component::resistor("b", 1e-5))
        .component(Component::one_junction("w", 3))
        .bond("V", "i")
        .bond("i", "Ra")
        .bond("i", "La")
        .bond("i", "K")
        .bond("K", "w")
        .bond("w", "Jm")
        .bond("w", "b")
        .build()
}
