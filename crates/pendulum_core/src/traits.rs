use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

use crate::solvers::IntegrationStats;

/// A trait for types that can be used as scalars in the simulated systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Converts an `f64` literal into the scalar type.
    /// Types that cannot represent the value yield NaN.
    fn constant(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a continuous-time dynamical system x' = f(t, x).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that advance a system by one fixed step.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// A trait for solvers that carry a state to a requested end time,
/// choosing their own internal steps.
pub trait Integrator<T: Scalar> {
    /// Integrates from `*t` to `t_end`. On return `*t == t_end` and `state`
    /// holds the solution there.
    fn integrate(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        t_end: T,
    ) -> IntegrationStats;
}
