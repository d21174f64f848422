//! Errors raised at the configuration boundary.
//!
//! The physics itself never fails: degenerate parameters surface as
//! non-finite coordinates, not as errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PendulumError {
    #[error("{name} must be positive and finite, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("time step dt must be positive and finite, got {0}")]
    InvalidTimeStep(f64),

    #[error("perturbation strength must be non-negative and finite, got {0}")]
    InvalidStrength(f64),

    #[error("trail capacity must be at least 1")]
    InvalidTrailCapacity,

    #[error("simulation has been dropped, perturbation request discarded")]
    Disconnected,

    #[error("solver tolerances must be positive and finite (rtol = {rtol}, atol = {atol})")]
    InvalidTolerances { rtol: f64, atol: f64 },
}
