pub mod error;
pub mod pendulum;
pub mod simulation;
pub mod solvers;
pub mod trail;
/// The `pendulum_core` crate integrates a chaotic double pendulum for an
/// interactive renderer.
///
/// Key components:
/// - **Traits**: `Scalar`, `DynamicalSystem` (ODEs), `Steppable` and `Integrator` (solvers).
/// - **Solvers**: fixed-step RK4 and adaptive Tsitouras 5(4).
/// - **Pendulum**: equations of motion, the `DoublePendulum` engine, joint positions,
///   velocity perturbations and an energy diagnostic.
/// - **Trail**: bounded FIFO of recent bob positions.
/// - **Simulation**: per-frame context with a perturbation queue.
pub mod traits;

pub use error::PendulumError;
pub use pendulum::{DoublePendulum, PendulumParameters, PendulumState, Positions, SolverKind};
pub use simulation::{Frame, PerturbationSender, Simulation, SimulationConfig};
pub use trail::TrailHistory;
