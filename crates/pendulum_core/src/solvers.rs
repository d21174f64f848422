use crate::traits::{DynamicalSystem, Integrator, Scalar, Steppable};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Local error tolerances for adaptive integration.
/// A step is accepted when the scaled RMS error is at most one, where each
/// component is scaled by `atol + rtol * |y|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-8,
        }
    }
}

/// Work performed by one call to [`Integrator::integrate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub fn_evals: usize,
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = T::constant(0.5);
        let sixth = T::constant(1.0 / 6.0);
        let two = T::constant(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Fixed-step fallback: the whole interval is covered by a single RK4 step.
impl<T: Scalar> Integrator<T> for RK4<T> {
    fn integrate(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        t_end: T,
    ) -> IntegrationStats {
        let span = t_end - *t;
        if !(span > T::zero()) {
            return IntegrationStats::default();
        }
        self.step(system, t, state, span);
        *t = t_end;
        IntegrationStats {
            accepted_steps: 1,
            rejected_steps: 0,
            fn_evals: 4,
        }
    }
}

// Tsitouras 5(4) tableau.
const C2: f64 = 0.161;
const C3: f64 = 0.327;
const C4: f64 = 0.9;
const C5: f64 = 0.9800255409045097;

const A21: f64 = 0.161;

const A31: f64 = -0.008480655492356989;
const A32: f64 = 0.335480655492357;

const A41: f64 = 2.897153057105493;
const A42: f64 = -6.359448489975075;
const A43: f64 = 4.3622954328695815;

const A51: f64 = 5.325864828439257;
const A52: f64 = -11.748883564062828;
const A53: f64 = 7.4955393428898365;
const A54: f64 = -0.09249506636175525;

const A61: f64 = 5.86145544294642;
const A62: f64 = -12.92096931784711;
const A63: f64 = 8.159367898576159;
const A64: f64 = -0.071584973281401;
const A65: f64 = -0.028269050394068383;

// 5th order weights (equal to the last row of A, so k7 is FSAL).
const B1: f64 = 0.09646076681806523;
const B2: f64 = 0.01;
const B3: f64 = 0.4798896504144996;
const B4: f64 = 1.379008574103742;
const B5: f64 = -3.290069515436081;
const B6: f64 = 2.324710524099774;

// Difference between the 5th and embedded 4th order weights.
const BT1: f64 = -0.00178001105222577714;
const BT2: f64 = -0.0008164344596567469;
const BT3: f64 = 0.007880878010261995;
const BT4: f64 = -0.1447110071732629;
const BT5: f64 = 0.5823571654525552;
const BT6: f64 = -0.45808210592918697;
const BT7: f64 = 0.015151515151515152;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
/// Smallest step relative to the requested interval before steps are forced.
const STEP_FLOOR: f64 = 1e-12;

/// Tsitouras 5/4 Solver
///
/// As a [`Steppable`] it takes plain 5th order steps of the given size.
/// As an [`Integrator`] it controls the step size with the embedded 4th
/// order estimate and clips the final step onto the requested end time.
pub struct Tsit5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    k7: Vec<T>,
    tmp: Vec<T>,
    y_new: Vec<T>,
    tolerances: Tolerances,
    max_steps: usize,
    /// Step size proposed at the end of the previous integration.
    h_next: Option<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        Self::with_tolerances(dim, Tolerances::default())
    }

    pub fn with_tolerances(dim: usize, tolerances: Tolerances) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            k7: vec![z; dim],
            tmp: vec![z; dim],
            y_new: vec![z; dim],
            tolerances,
            max_steps: 10_000,
            h_next: None,
        }
    }

    /// Caps the number of attempted steps per `integrate` call.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Evaluates all seven stages for a step of size `dt` from `(t0, state)`.
    /// The 5th order solution is left in `y_new` and `k7 = f(t0 + dt, y_new)`.
    fn stages(&mut self, system: &impl DynamicalSystem<T>, t0: T, state: &[T], dt: T) {
        let c = T::constant;
        let n = state.len();

        // k1
        system.apply(t0, state, &mut self.k1);

        // k2
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (c(A21) * self.k1[i]);
        }
        system.apply(t0 + c(C2) * dt, &self.tmp, &mut self.k2);

        // k3
        for i in 0..n {
            self.tmp[i] = state[i] + dt * (c(A31) * self.k1[i] + c(A32) * self.k2[i]);
        }
        system.apply(t0 + c(C3) * dt, &self.tmp, &mut self.k3);

        // k4
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (c(A41) * self.k1[i] + c(A42) * self.k2[i] + c(A43) * self.k3[i]);
        }
        system.apply(t0 + c(C4) * dt, &self.tmp, &mut self.k4);

        // k5
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (c(A51) * self.k1[i]
                    + c(A52) * self.k2[i]
                    + c(A53) * self.k3[i]
                    + c(A54) * self.k4[i]);
        }
        system.apply(t0 + c(C5) * dt, &self.tmp, &mut self.k5);

        // k6
        for i in 0..n {
            self.tmp[i] = state[i]
                + dt * (c(A61) * self.k1[i]
                    + c(A62) * self.k2[i]
                    + c(A63) * self.k3[i]
                    + c(A64) * self.k4[i]
                    + c(A65) * self.k5[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k6);

        // 5th order solution
        for i in 0..n {
            self.y_new[i] = state[i]
                + dt * (c(B1) * self.k1[i]
                    + c(B2) * self.k2[i]
                    + c(B3) * self.k3[i]
                    + c(B4) * self.k4[i]
                    + c(B5) * self.k5[i]
                    + c(B6) * self.k6[i]);
        }

        // k7 (FSAL)
        system.apply(t0 + dt, &self.y_new, &mut self.k7);
    }

    /// Scaled RMS norm of the embedded error estimate for the last `stages` call.
    fn error_norm(&self, state: &[T], dt: T) -> T {
        let c = T::constant;
        let rtol = c(self.tolerances.rtol);
        let atol = c(self.tolerances.atol);
        let n = state.len();
        if n == 0 {
            return T::zero();
        }

        let mut sum = T::zero();
        for i in 0..n {
            let err = dt
                * (c(BT1) * self.k1[i]
                    + c(BT2) * self.k2[i]
                    + c(BT3) * self.k3[i]
                    + c(BT4) * self.k4[i]
                    + c(BT5) * self.k5[i]
                    + c(BT6) * self.k6[i]
                    + c(BT7) * self.k7[i]);
            let scale = atol + rtol * state[i].abs().max(self.y_new[i].abs());
            let ratio = err / scale;
            sum = sum + ratio * ratio;
        }
        (sum / c(n as f64)).sqrt()
    }

    /// Hairer's first guess: one percent of the ratio between the scaled
    /// state and scaled derivative norms. Leaves f(t0, y0) in `k1`.
    fn initial_step(&mut self, system: &impl DynamicalSystem<T>, t0: T, state: &[T]) -> T {
        let c = T::constant;
        let rtol = c(self.tolerances.rtol);
        let atol = c(self.tolerances.atol);
        system.apply(t0, state, &mut self.k1);

        let mut d0 = T::zero();
        let mut d1 = T::zero();
        for i in 0..state.len() {
            let scale = atol + rtol * state[i].abs();
            d0 = d0 + (state[i] / scale) * (state[i] / scale);
            d1 = d1 + (self.k1[i] / scale) * (self.k1[i] / scale);
        }
        let d0 = d0.sqrt();
        let d1 = d1.sqrt();
        let tiny = c(1e-5);
        if d0 < tiny || d1 < tiny || !d0.is_finite() || !d1.is_finite() {
            c(1e-6)
        } else {
            c(0.01) * d0 / d1
        }
    }

    fn step_factor(err: T) -> T {
        let c = T::constant;
        if err == T::zero() {
            return c(MAX_FACTOR);
        }
        (c(SAFETY) * err.powf(c(-0.2))).max(c(MIN_FACTOR)).min(c(MAX_FACTOR))
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;
        self.stages(system, t0, state, dt);
        state.copy_from_slice(&self.y_new);
        *t = t0 + dt;
    }
}

impl<T: Scalar> Integrator<T> for Tsit5<T> {
    fn integrate(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        t_end: T,
    ) -> IntegrationStats {
        let mut stats = IntegrationStats::default();
        let span = t_end - *t;
        if !(span > T::zero()) {
            return stats;
        }

        let h_min = span * T::constant(STEP_FLOOR);
        let mut h = match self.h_next {
            Some(h) if h.is_finite() && h > T::zero() => h,
            _ => {
                stats.fn_evals += 1;
                self.initial_step(system, *t, state)
            }
        };
        h = h.max(h_min);

        loop {
            let remaining = t_end - *t;
            let attempts = stats.accepted_steps + stats.rejected_steps;
            let out_of_budget = attempts >= self.max_steps;
            if out_of_budget {
                warn!(
                    attempts,
                    remaining = ?remaining,
                    "adaptive step budget exhausted, forcing final step"
                );
                h = remaining;
            }

            let last = h >= remaining;
            let h_trial = h;
            if last {
                h = remaining;
            }

            self.stages(system, *t, state, h);
            stats.fn_evals += 7;
            let err = self.error_norm(state, h);

            // Non-finite estimates come from non-finite states; those are
            // carried forward rather than retried.
            let at_floor = h <= h_min;
            if !err.is_finite() || err <= T::one() || at_floor || out_of_budget {
                if at_floor && err > T::one() {
                    warn!(step = ?h, error = ?err, "step size floor reached, accepting step");
                }
                state.copy_from_slice(&self.y_new);
                stats.accepted_steps += 1;

                let factor = if err.is_finite() {
                    Self::step_factor(err)
                } else {
                    T::constant(MAX_FACTOR)
                };

                if last {
                    *t = t_end;
                    self.h_next = Some(h_trial.max(h * factor));
                    break;
                }
                *t = *t + h;
                h = (h * factor).max(h_min);
            } else {
                stats.rejected_steps += 1;
                h = (h * Self::step_factor(err).min(T::one())).max(h_min);
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    impl DynamicalSystem<f64> for Constant {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = 1.0;
        }
    }

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    struct Poisoned;

    impl DynamicalSystem<f64> for Poisoned {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = f64::NAN;
        }
    }

    #[test]
    fn rk4_step_advances_state_and_time() {
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [0.0];
        solver.step(&Constant, &mut t, &mut state, 0.5);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((state[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rk4_integrate_covers_interval_in_one_step() {
        let mut solver = RK4::new(1);
        let mut t = 1.0;
        let mut state = [1.0];
        let stats = solver.integrate(&Decay { rate: 1.0 }, &mut t, &mut state, 1.01);
        assert_eq!(t, 1.01);
        assert_eq!(stats.accepted_steps, 1);
        assert!((state[0] - (-0.01_f64).exp()).abs() < 1e-10);
    }

    #[test]
    fn tsit5_fixed_step_matches_exponential() {
        let mut solver = Tsit5::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..10 {
            solver.step(&Decay { rate: 2.0 }, &mut t, &mut state, 0.05);
        }
        assert!((t - 0.5).abs() < 1e-12);
        assert!((state[0] - (-1.0_f64).exp()).abs() < 1e-7);
    }

    #[test]
    fn tsit5_fixed_step_converges_at_fifth_order() {
        let error_with = |steps: usize| {
            let mut solver = Tsit5::new(1);
            let mut t = 0.0;
            let mut state = [1.0];
            let h = 1.0 / steps as f64;
            for _ in 0..steps {
                solver.step(&Decay { rate: 1.0 }, &mut t, &mut state, h);
            }
            (state[0] - (-1.0_f64).exp()).abs()
        };

        let coarse = error_with(10);
        let fine = error_with(20);
        let ratio = coarse / fine;
        // Halving h should divide the error by 2^5 = 32.
        assert!((20.0..45.0).contains(&ratio), "ratio = {ratio}");
    }

    #[test]
    fn tolerances_fill_missing_fields_with_defaults() {
        let tolerances: Tolerances = serde::Deserialize::deserialize(
            serde::de::value::MapDeserializer::<_, serde::de::value::Error>::new(
                [("rtol", 1e-6)].into_iter(),
            ),
        )
        .expect("partial tolerances");
        assert_eq!(tolerances.rtol, 1e-6);
        assert_eq!(tolerances.atol, Tolerances::default().atol);
    }

    #[test]
    fn tsit5_integrate_meets_tolerance_on_decay() {
        let mut solver = Tsit5::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let stats = solver.integrate(&Decay { rate: 1.0 }, &mut t, &mut state, 1.0);
        assert_eq!(t, 1.0);
        assert!(stats.accepted_steps > 1);
        assert!((state[0] - (-1.0_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn tsit5_integrate_closes_oscillator_orbit() {
        let mut solver = Tsit5::with_tolerances(
            2,
            Tolerances {
                rtol: 1e-10,
                atol: 1e-10,
            },
        );
        let period = 2.0 * std::f64::consts::PI;
        let mut t = 0.0;
        let mut state = [1.0, 0.0];
        solver.integrate(&Oscillator, &mut t, &mut state, period);
        assert_eq!(t, period);
        assert!((state[0] - 1.0).abs() < 1e-7, "x = {}", state[0]);
        assert!(state[1].abs() < 1e-7, "v = {}", state[1]);
    }

    #[test]
    fn tsit5_reuses_step_size_between_calls() {
        let mut solver = Tsit5::new(2);
        let mut t = 0.0;
        let mut state = [1.0, 0.0];
        let first = solver.integrate(&Oscillator, &mut t, &mut state, 0.04);
        let second = solver.integrate(&Oscillator, &mut t, &mut state, 0.08);
        assert!((t - 0.08).abs() < 1e-15);
        assert!(second.fn_evals <= first.fn_evals);
    }

    #[test]
    fn tsit5_rejects_oversized_steps() {
        let mut solver = Tsit5::with_tolerances(
            1,
            Tolerances {
                rtol: 1e-12,
                atol: 1e-12,
            },
        );
        solver.h_next = Some(1.0);
        let mut t = 0.0;
        let mut state = [1.0];
        let stats = solver.integrate(&Decay { rate: 5.0 }, &mut t, &mut state, 1.0);
        assert!(stats.rejected_steps > 0);
        assert!((state[0] - (-5.0_f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn tsit5_integrate_empty_interval_is_noop() {
        let mut solver = Tsit5::new(1);
        let mut t = 2.0;
        let mut state = [3.0];
        let stats = solver.integrate(&Decay { rate: 1.0 }, &mut t, &mut state, 2.0);
        assert_eq!(stats, IntegrationStats::default());
        assert_eq!(t, 2.0);
        assert_eq!(state, [3.0]);
    }

    #[test]
    fn tsit5_propagates_non_finite_state_without_looping() {
        let mut solver = Tsit5::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let stats = solver.integrate(&Poisoned, &mut t, &mut state, 0.04);
        assert_eq!(t, 0.04);
        assert!(state[0].is_nan());
        assert!(stats.accepted_steps >= 1);
        assert_eq!(stats.rejected_steps, 0);
    }

    #[test]
    fn tsit5_step_budget_forces_completion() {
        let mut solver = Tsit5::with_tolerances(
            1,
            Tolerances {
                rtol: 1e-14,
                atol: 1e-14,
            },
        )
        .with_max_steps(3);
        let mut t = 0.0;
        let mut state = [1.0];
        let stats = solver.integrate(&Decay { rate: 50.0 }, &mut t, &mut state, 1.0);
        assert_eq!(t, 1.0);
        assert!(stats.accepted_steps + stats.rejected_steps <= 4);
    }
}
