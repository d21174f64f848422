use pendulum_core::{
    DoublePendulum, PendulumParameters, Simulation, SimulationConfig, SolverKind,
};

fn seeded_config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed: Some(seed),
        ..SimulationConfig::default()
    }
}

#[test]
fn hundred_steps_stay_within_reach() {
    let mut sim = DoublePendulum::default();
    let reach = sim.parameters().reach();
    assert_eq!(reach, 2.0);

    for _ in 0..100 {
        let p = sim.step(0.04);
        let r1 = p.x1.hypot(p.y1);
        let r2 = p.x2.hypot(p.y2);
        assert!((r1 - 1.0).abs() < 1e-9, "upper link stretched to {r1}");
        assert!(r2 <= reach + 1e-9, "bob escaped to radius {r2}");
    }
    assert!((sim.time() - 4.0).abs() < 1e-9);
}

#[test]
fn trail_holds_last_two_hundred_bob_positions() {
    let mut sim = Simulation::new(seeded_config(11)).expect("valid config");
    let mut bobs = Vec::new();
    for _ in 0..260 {
        bobs.push(sim.tick().positions.bob());
    }

    let trail: Vec<_> = sim.trail().iter().collect();
    assert_eq!(trail.len(), 200);
    assert_eq!(trail.as_slice(), &bobs[60..]);
}

#[test]
fn clicks_stay_bounded_and_physical() {
    let mut sim = Simulation::new(seeded_config(12)).expect("valid config");
    let sender = sim.perturbation_sender();
    let reach = sim.engine().parameters().reach();

    for frame in 0..200 {
        if frame % 20 == 0 {
            sender.hit().expect("simulation alive");
        }
        let f = sim.tick();
        assert!(f.positions.x2.hypot(f.positions.y2) <= reach + 1e-9);
    }
}

#[test]
fn seeded_simulations_replay_identically() {
    let mut a = Simulation::new(seeded_config(99)).expect("valid config");
    let mut b = Simulation::new(seeded_config(99)).expect("valid config");
    for frame in 0..50 {
        if frame % 7 == 0 {
            a.hit().expect("valid strength");
            b.hit().expect("valid strength");
        }
        assert_eq!(a.tick(), b.tick());
    }
    assert_eq!(a.trail(), b.trail());
}

#[test]
fn custom_parameters_scale_the_reach() {
    let config = SimulationConfig {
        parameters: PendulumParameters::new(0.5, 1.5, 2.0, 1.0),
        solver: SolverKind::Rk4,
        ..seeded_config(3)
    };
    let mut sim = Simulation::new(config).expect("valid config");
    for _ in 0..50 {
        let p = sim.tick().positions;
        assert!(p.x2.hypot(p.y2) <= 2.0 + 1e-9);
        assert!((p.x1.hypot(p.y1) - 0.5).abs() < 1e-9);
    }
}
