//! WASM bridge exposing the double pendulum simulation to a browser render loop.

mod simulation;

pub use simulation::WasmSimulation;
