//! Double pendulum model: parameters, state, equations of motion and the
//! physics engine that owns and advances the state.

use crate::error::PendulumError;
use crate::solvers::{IntegrationStats, Tolerances, Tsit5, RK4};
use crate::traits::{DynamicalSystem, Integrator, Scalar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Gravitational acceleration in m/s².
pub const GRAVITY: f64 = 9.81;

/// Both links start here, close to inverted, so the motion is chaotic from
/// the first frame.
pub const INITIAL_ANGLE: f64 = std::f64::consts::PI / 1.1;

/// Link lengths and point masses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendulumParameters {
    pub l1: f64,
    pub l2: f64,
    pub m1: f64,
    pub m2: f64,
}

impl Default for PendulumParameters {
    fn default() -> Self {
        Self {
            l1: 1.0,
            l2: 1.0,
            m1: 1.0,
            m2: 1.0,
        }
    }
}

impl PendulumParameters {
    pub fn new(l1: f64, l2: f64, m1: f64, m2: f64) -> Self {
        Self { l1, l2, m1, m2 }
    }

    /// Checks that all lengths and masses are positive and finite.
    pub fn validate(&self) -> Result<(), PendulumError> {
        for (name, value) in [("l1", self.l1), ("l2", self.l2), ("m1", self.m1), ("m2", self.m2)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PendulumError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    /// Radius of the disk the second bob can reach.
    pub fn reach(&self) -> f64 {
        self.l1 + self.l2
    }
}

/// Angles (radians, measured from straight down) and angular velocities.
/// Angles are never wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendulumState {
    pub theta1: f64,
    pub omega1: f64,
    pub theta2: f64,
    pub omega2: f64,
}

impl Default for PendulumState {
    fn default() -> Self {
        Self {
            theta1: INITIAL_ANGLE,
            omega1: 0.0,
            theta2: INITIAL_ANGLE,
            omega2: 0.0,
        }
    }
}

impl PendulumState {
    pub fn new(theta1: f64, omega1: f64, theta2: f64, omega2: f64) -> Self {
        Self {
            theta1,
            omega1,
            theta2,
            omega2,
        }
    }

    /// Packs the state as `[θ1, ω1, θ2, ω2]`, the layout the solvers use.
    pub fn to_array(self) -> [f64; 4] {
        [self.theta1, self.omega1, self.theta2, self.omega2]
    }

    pub fn from_array(x: [f64; 4]) -> Self {
        Self::new(x[0], x[1], x[2], x[3])
    }
}

/// Cartesian joint positions with the pivot at the origin and y pointing up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Positions {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Positions {
    pub fn to_array(self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Position of the outer bob, the point the trail follows.
    pub fn bob(&self) -> (f64, f64) {
        (self.x2, self.y2)
    }
}

/// Equations of motion for two point masses on massless rigid links.
///
/// State layout is `[θ1, ω1, θ2, ω2]`. The denominators vanish only for
/// degenerate parameters; that case is not guarded and produces non-finite
/// rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumDynamics {
    pub params: PendulumParameters,
}

impl<T: Scalar> DynamicalSystem<T> for PendulumDynamics {
    fn dimension(&self) -> usize {
        4
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let l1 = T::constant(self.params.l1);
        let l2 = T::constant(self.params.l2);
        let m1 = T::constant(self.params.m1);
        let m2 = T::constant(self.params.m2);
        let g = T::constant(GRAVITY);
        let m = m1 + m2;

        let (th1, w1, th2, w2) = (x[0], x[1], x[2], x[3]);
        let delta = th2 - th1;
        let (sin_d, cos_d) = delta.sin_cos();

        out[0] = w1;

        let den1 = m * l1 - m2 * l1 * cos_d * cos_d;
        out[1] = (m2 * l1 * w1 * w1 * sin_d * cos_d
            + m2 * g * th2.sin() * cos_d
            + m2 * l2 * w2 * w2 * sin_d
            - m * g * th1.sin())
            / den1;

        out[2] = w2;

        let den2 = (l2 / l1) * den1;
        out[3] = (-m2 * l2 * w2 * w2 * sin_d * cos_d
            + m * g * th1.sin() * cos_d
            - m * l1 * w1 * w1 * sin_d
            - m * g * th2.sin())
            / den2;
    }
}

/// Selects the integrator used by [`DoublePendulum::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Adaptive Tsitouras 5(4) with local error control.
    #[default]
    Tsit5,
    /// One classic RK4 step per frame, no error control.
    Rk4,
}

impl SolverKind {
    fn build(self, tolerances: Tolerances) -> InternalStepper {
        match self {
            SolverKind::Tsit5 => InternalStepper::Tsit5(Tsit5::with_tolerances(4, tolerances)),
            SolverKind::Rk4 => InternalStepper::Rk4(RK4::new(4)),
        }
    }
}

enum InternalStepper {
    Rk4(RK4<f64>),
    Tsit5(Tsit5<f64>),
}

impl InternalStepper {
    fn integrate(
        &mut self,
        system: &PendulumDynamics,
        t: &mut f64,
        state: &mut [f64],
        t_end: f64,
    ) -> IntegrationStats {
        match self {
            InternalStepper::Rk4(s) => s.integrate(system, t, state, t_end),
            InternalStepper::Tsit5(s) => s.integrate(system, t, state, t_end),
        }
    }
}

/// The physics engine. Owns the pendulum state; callers only see copies.
pub struct DoublePendulum {
    dynamics: PendulumDynamics,
    state: PendulumState,
    time: f64,
    stepper: InternalStepper,
    rng: StdRng,
}

impl Default for DoublePendulum {
    fn default() -> Self {
        Self::new(PendulumParameters::default())
    }
}

impl DoublePendulum {
    /// Creates an engine at the fixed near-inverted starting configuration,
    /// integrated with the adaptive solver at default tolerances.
    pub fn new(params: PendulumParameters) -> Self {
        Self::with_solver(params, SolverKind::default(), Tolerances::default())
    }

    pub fn with_solver(
        params: PendulumParameters,
        solver: SolverKind,
        tolerances: Tolerances,
    ) -> Self {
        Self {
            dynamics: PendulumDynamics { params },
            state: PendulumState::default(),
            time: 0.0,
            stepper: solver.build(tolerances),
            rng: StdRng::from_entropy(),
        }
    }

    /// Makes perturbations reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn parameters(&self) -> PendulumParameters {
        self.dynamics.params
    }

    pub fn state(&self) -> PendulumState {
        self.state
    }

    /// Simulated seconds since construction.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time derivative of `state`, in the same layout:
    /// `(θ1', ω1', θ2', ω2')`.
    pub fn derivatives(&self, state: &PendulumState) -> PendulumState {
        let mut out = [0.0; 4];
        DynamicalSystem::<f64>::apply(&self.dynamics, 0.0, &state.to_array(), &mut out);
        PendulumState::from_array(out)
    }

    /// Advances the state by exactly `dt` seconds and returns the new joint
    /// positions. Non-positive or NaN `dt` leaves the state untouched.
    pub fn step(&mut self, dt: f64) -> Positions {
        if !(dt > 0.0) {
            return self.positions();
        }

        // The system is autonomous, so each frame integrates over [0, dt].
        let mut t = 0.0;
        let mut next = self.state.to_array();
        let stats = self.stepper.integrate(&self.dynamics, &mut t, &mut next, dt);
        self.state = PendulumState::from_array(next);
        self.time += dt;

        debug!(
            dt,
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            fn_evals = stats.fn_evals,
            "pendulum step"
        );
        self.positions()
    }

    pub fn positions(&self) -> Positions {
        self.positions_of(&self.state)
    }

    /// Converts any angular state to joint positions for these link lengths.
    pub fn positions_of(&self, state: &PendulumState) -> Positions {
        let PendulumParameters { l1, l2, .. } = self.dynamics.params;
        let x1 = l1 * state.theta1.sin();
        let y1 = -l1 * state.theta1.cos();
        let x2 = x1 + l2 * state.theta2.sin();
        let y2 = y1 - l2 * state.theta2.cos();
        Positions { x1, y1, x2, y2 }
    }

    /// Adds an independent uniform kick in `[-strength, strength]` to each
    /// angular velocity and returns whether a kick was applied. A zero
    /// strength is a no-op; negative or non-finite strengths are ignored.
    pub fn perturb(&mut self, strength: f64) -> bool {
        if strength == 0.0 {
            return false;
        }
        if !(strength.is_finite() && strength > 0.0) {
            warn!(strength, "ignoring perturbation with invalid strength");
            return false;
        }

        // Sample on the unit interval; `-s..=s` overflows its width for huge `s`.
        let kick1 = strength * self.rng.gen_range(-1.0..=1.0_f64);
        let kick2 = strength * self.rng.gen_range(-1.0..=1.0_f64);
        self.state.omega1 += kick1;
        self.state.omega2 += kick2;

        info!(strength, kick1, kick2, "pendulum perturbed, new energy injected");
        true
    }

    /// Total mechanical energy, with the pivot at zero height.
    pub fn energy(&self) -> f64 {
        let PendulumParameters { l1, l2, m1, m2 } = self.dynamics.params;
        let s = self.state;
        let v1_sq = l1 * l1 * s.omega1 * s.omega1;
        let v2_sq = v1_sq
            + l2 * l2 * s.omega2 * s.omega2
            + 2.0 * l1 * l2 * s.omega1 * s.omega2 * (s.theta1 - s.theta2).cos();
        let kinetic = 0.5 * m1 * v1_sq + 0.5 * m2 * v2_sq;

        let p = self.positions();
        let potential = GRAVITY * (m1 * p.y1 + m2 * p.y2);
        kinetic + potential
    }
}
