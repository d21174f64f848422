//! Simulation context driven by a render loop.
//!
//! A [`Simulation`] owns the physics engine and the trail. Input handlers
//! hold a [`PerturbationSender`] and enqueue kicks; the loop drains the
//! queue at the start of each [`Simulation::tick`], so the engine keeps a
//! single writer even when input arrives on another thread.

use crate::error::PendulumError;
use crate::pendulum::{DoublePendulum, PendulumParameters, PendulumState, Positions, SolverKind};
use crate::solvers::Tolerances;
use crate::trail::{TrailHistory, DEFAULT_TRAIL_CAPACITY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};

/// Frame interval of the interactive program, in seconds.
pub const DEFAULT_DT: f64 = 0.04;

/// Strength of a click on the pendulum, in rad/s.
pub const DEFAULT_PERTURB_STRENGTH: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub parameters: PendulumParameters,
    /// Simulated seconds per tick.
    pub dt: f64,
    pub trail_capacity: usize,
    /// Strength used by [`PerturbationSender::hit`].
    pub perturb_strength: f64,
    pub solver: SolverKind,
    pub tolerances: Tolerances,
    /// Fixed seed for reproducible perturbations; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            parameters: PendulumParameters::default(),
            dt: DEFAULT_DT,
            trail_capacity: DEFAULT_TRAIL_CAPACITY,
            perturb_strength: DEFAULT_PERTURB_STRENGTH,
            solver: SolverKind::default(),
            tolerances: Tolerances::default(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), PendulumError> {
        self.parameters.validate()?;
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(PendulumError::InvalidTimeStep(self.dt));
        }
        if self.trail_capacity == 0 {
            return Err(PendulumError::InvalidTrailCapacity);
        }
        check_strength(self.perturb_strength)?;
        let Tolerances { rtol, atol } = self.tolerances;
        if !(rtol.is_finite() && rtol > 0.0 && atol.is_finite() && atol > 0.0) {
            return Err(PendulumError::InvalidTolerances { rtol, atol });
        }
        Ok(())
    }
}

fn check_strength(strength: f64) -> Result<(), PendulumError> {
    if strength.is_finite() && strength >= 0.0 {
        Ok(())
    } else {
        Err(PendulumError::InvalidStrength(strength))
    }
}

/// What one tick produced, for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub positions: Positions,
    /// Simulated time after the step.
    pub time: f64,
    pub energy: f64,
    /// Perturbations applied just before this step.
    pub perturbations: usize,
}

/// Cloneable handle for enqueueing perturbations from input handlers.
#[derive(Debug, Clone)]
pub struct PerturbationSender {
    tx: Sender<f64>,
    default_strength: f64,
}

impl PerturbationSender {
    /// Enqueues a kick of the configured click strength.
    pub fn hit(&self) -> Result<(), PendulumError> {
        self.send(self.default_strength)
    }

    pub fn send(&self, strength: f64) -> Result<(), PendulumError> {
        check_strength(strength)?;
        self.tx
            .send(strength)
            .map_err(|_| PendulumError::Disconnected)
    }
}

pub struct Simulation {
    engine: DoublePendulum,
    trail: TrailHistory,
    dt: f64,
    perturb_strength: f64,
    tx: Sender<f64>,
    rx: Receiver<f64>,
}

impl Default for Simulation {
    fn default() -> Self {
        let config = SimulationConfig::default();
        let engine =
            DoublePendulum::with_solver(config.parameters, config.solver, config.tolerances);
        Self::assemble(engine, &config)
    }
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config
            .validate()
            .context("Invalid simulation configuration")?;

        let mut engine =
            DoublePendulum::with_solver(config.parameters, config.solver, config.tolerances);
        if let Some(seed) = config.seed {
            engine = engine.with_seed(seed);
        }
        Ok(Self::assemble(engine, &config))
    }

    fn assemble(engine: DoublePendulum, config: &SimulationConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            engine,
            trail: TrailHistory::new(config.trail_capacity),
            dt: config.dt,
            perturb_strength: config.perturb_strength,
            tx,
            rx,
        }
    }

    pub fn perturbation_sender(&self) -> PerturbationSender {
        PerturbationSender {
            tx: self.tx.clone(),
            default_strength: self.perturb_strength,
        }
    }

    /// Enqueues a click-strength kick for the next tick.
    pub fn hit(&self) -> Result<(), PendulumError> {
        self.request_perturbation(self.perturb_strength)
    }

    /// Enqueues a kick for the next tick.
    pub fn request_perturbation(&self, strength: f64) -> Result<(), PendulumError> {
        check_strength(strength)?;
        self.tx
            .send(strength)
            .map_err(|_| PendulumError::Disconnected)
    }

    /// Applies queued perturbations, advances one `dt` and records the bob
    /// in the trail.
    pub fn tick(&mut self) -> Frame {
        let mut perturbations = 0;
        while let Ok(strength) = self.rx.try_recv() {
            if self.engine.perturb(strength) {
                perturbations += 1;
            }
        }

        let positions = self.engine.step(self.dt);
        let (x, y) = positions.bob();
        self.trail.push(x, y);

        Frame {
            positions,
            time: self.engine.time(),
            energy: self.engine.energy(),
            perturbations,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn engine(&self) -> &DoublePendulum {
        &self.engine
    }

    pub fn trail(&self) -> &TrailHistory {
        &self.trail
    }

    pub fn positions(&self) -> Positions {
        self.engine.positions()
    }

    pub fn state(&self) -> PendulumState {
        self.engine.state()
    }

    pub fn time(&self) -> f64 {
        self.engine.time()
    }

    pub fn energy(&self) -> f64 {
        self.engine.energy()
    }
}
