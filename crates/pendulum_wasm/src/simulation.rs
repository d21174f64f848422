//! Browser-facing wrapper around the simulation context.

use js_sys::Float64Array;
use pendulum_core::simulation::{Simulation, SimulationConfig};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSimulation {
    pub(crate) simulation: Simulation,
}

pub(crate) fn build_simulation(config: SimulationConfig) -> Result<Simulation, JsValue> {
    Simulation::new(config).map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

#[wasm_bindgen]
impl WasmSimulation {
    /// Builds a simulation from a (possibly partial) config object.
    /// Missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let config: SimulationConfig = if config.is_undefined() || config.is_null() {
            SimulationConfig::default()
        } else {
            from_value(config)
                .map_err(|err| JsValue::from_str(&format!("Failed to read config: {err}")))?
        };
        Ok(WasmSimulation {
            simulation: build_simulation(config)?,
        })
    }

    pub fn with_defaults() -> WasmSimulation {
        console_error_panic_hook::set_once();
        WasmSimulation {
            simulation: Simulation::default(),
        }
    }

    /// Advances one frame and returns `[x1, y1, x2, y2]`.
    pub fn tick(&mut self) -> Vec<f64> {
        self.simulation.tick().positions.to_array().to_vec()
    }

    /// Advances one frame and returns the full frame report.
    pub fn frame(&mut self) -> Result<JsValue, JsValue> {
        let frame = self.simulation.tick();
        to_value(&frame)
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize frame: {err}")))
    }

    pub fn positions(&self) -> Vec<f64> {
        self.simulation.positions().to_array().to_vec()
    }

    /// `[θ1, ω1, θ2, ω2]`
    pub fn state(&self) -> Vec<f64> {
        self.simulation.state().to_array().to_vec()
    }

    pub fn energy(&self) -> f64 {
        self.simulation.energy()
    }

    pub fn time(&self) -> f64 {
        self.simulation.time()
    }

    pub fn dt(&self) -> f64 {
        self.simulation.dt()
    }

    /// Trail as interleaved `[x0, y0, x1, y1, ...]`, oldest first.
    pub fn trail(&self) -> Vec<f64> {
        self.simulation.trail().flattened()
    }

    pub fn trail_buffer(&self) -> Float64Array {
        Float64Array::from(self.simulation.trail().flattened().as_slice())
    }

    pub fn trail_len(&self) -> usize {
        self.simulation.trail().len()
    }

    /// Click handler: queues a kick of the configured strength.
    pub fn hit(&self) -> Result<(), JsValue> {
        self.simulation
            .hit()
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    pub fn perturb(&self, strength: f64) -> Result<(), JsValue> {
        self.simulation
            .request_perturbation(strength)
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }
}
