//! Closed-form ball flight between bounces.
//!
//! Integrates the same dynamics as [`crate::forces::AeroForces`] analytically
//! over an arbitrary interval, assuming no surface contact inside it. Drag
//! acts with the rate `c/(1 + c t)`, `c = D·|v0|`, which is the exact speed
//! decay of quadratic drag alone (`|v| = |v0|/(1 + c t)`).
//!
//! ```text
//! spin:        ω(t) = ω0 / (1 + k t)²                  k = K·sqrt|ω0| / 2
//! vertical:    ((1 + c t)·vy)' = -g·(1 + c t) + aL0 / (1 + k t)²
//!              aL0 = lift·(v0 × ω0)·ŷ
//! horizontal:  w' = -c·w/(1 + c t) + i·lift·ωy(t)·w - i·lift·Ω0·vy
//!              w = vx + i·vz,  Ω0 = ωx0 + i·ωz0
//! ```
//!
//! so that `vy(t) = (vy0 - g·(t + c t²/2) + aL0·t/(1 + k t)) / (1 + c t)`.
//!
//! The horizontal equation rotates `w` by `θ(t) = lift·ωy0·t/(1+kt)`; its
//! displacement integral has no elementary antiderivative and is expressed
//! with the complex exponential integral. Degenerate parameter values
//! (no spin, no sidespin, `c = k`) fall back to the matching limits through
//! `select_finite`, so one formula serves every state.
//!
//! Written against [`Algebra`], the function is evaluated numerically by the
//! physics and recorded symbolically by the hit search.

use crate::algebra::{Algebra, BallTerms, Cplx, Numeric, Triple};
use crate::types::{BallState, PhysicsParams};

/// Lower bound for the linearised drag rate, keeps `1/c` finite in vacuum.
pub const MIN_DRAG_RATE: f64 = 1e-6;

/// Ball state after flying for `t` seconds from `ball` without touching anything.
pub fn simplified_flight<A: Algebra>(
    alg: &mut A,
    params: &PhysicsParams,
    ball: &BallTerms<A::Scalar>,
    t: A::Scalar,
) -> BallTerms<A::Scalar> {
    let one = alg.constant(1.0);
    let g = alg.constant(params.gravity);
    let lift = alg.constant(params.lift());
    let (p0, v0, w0) = (ball.pos, ball.vel, ball.spin);

    // Linearised drag rate and spin decay rate
    let speed = v0.norm(alg);
    let drag_speed = alg.scale(speed, params.drag);
    let floor = alg.constant(MIN_DRAG_RATE);
    let c = alg.max(drag_speed, floor);
    let spin_rate = w0.norm(alg);
    let spin_root = alg.sqrt(spin_rate);
    let k = alg.scale(spin_root, 0.5 * params.spin_damping);

    let ct = alg.mul(c, t);
    let one_ct = alg.add(one, ct);
    let kt = alg.mul(k, t);
    let one_kt = alg.add(one, kt);
    let q = alg.div(one, one_kt);
    let t2 = alg.mul(t, t);
    let t3 = alg.mul(t2, t);

    // -------------------------------------------------------------------------
    // Spin
    // -------------------------------------------------------------------------
    let q2 = alg.mul(q, q);
    let spin = w0.scale(alg, q2);

    // -------------------------------------------------------------------------
    // Vertical
    // -------------------------------------------------------------------------
    let lift_vertical = {
        let a = alg.mul(v0.z, w0.x);
        let b = alg.mul(v0.x, w0.z);
        let d = alg.sub(a, b);
        alg.mul(lift, d)
    };
    let l1_c = ln1p_ratio(alg, c, t);
    let l1_k = ln1p_ratio(alg, k, t);

    // J = ∫0^t ∫0^s (1+cu)/(1+ku)² du / (1+cs) ds, with its c = k limit
    let decay_mix = {
        let num = alg.sub(l1_k, l1_c);
        let den = alg.sub(c, k);
        let primary = alg.div(num, den);
        let log = alg.ln_1p(ct);
        let inv = alg.div(one, one_ct);
        let sum = alg.add(log, inv);
        let shifted = alg.sub(sum, one);
        let cc = alg.mul(c, c);
        let fallback = alg.div(shifted, cc);
        alg.select_finite(primary, primary, fallback)
    };

    let vy = {
        let ct2 = alg.mul(c, t2);
        let half_ct2 = alg.scale(ct2, 0.5);
        let fall = alg.add(t, half_ct2);
        let gravity_term = alg.mul(g, fall);
        let lift_term = {
            let tq = alg.mul(t, q);
            alg.mul(lift_vertical, tq)
        };
        let a = alg.sub(v0.y, gravity_term);
        let num = alg.add(a, lift_term);
        alg.div(num, one_ct)
    };

    let y = {
        let two_c = alg.scale(c, 2.0);
        let g_over = alg.div(g, two_c);
        let coeff = alg.add(v0.y, g_over);
        let rise = alg.mul(coeff, l1_c);
        let two_t = alg.scale(t, 2.0);
        let ct2 = alg.mul(c, t2);
        let inner = alg.add(two_t, ct2);
        let g_inner = alg.mul(g, inner);
        let four_c = alg.scale(c, 4.0);
        let sink = alg.div(g_inner, four_c);
        let lift_term = alg.mul(lift_vertical, decay_mix);
        let a = alg.add(p0.y, rise);
        let b = alg.sub(a, sink);
        alg.add(b, lift_term)
    };

    // -------------------------------------------------------------------------
    // Horizontal
    // -------------------------------------------------------------------------
    let lift_side = alg.mul(lift, w0.y);
    let amp = alg.div(lift_side, k);
    let neg_amp = alg.neg(amp);
    let r = alg.div(c, k);
    let alpha = alg.sub(one, r);
    let beta = alg.div(r, alpha);

    // b = -i·A, every Ei argument is b times a real factor
    let zero = alg.constant(0.0);
    let ei_at = |alg: &mut A, factor: A::Scalar| {
        let im = alg.mul(neg_amp, factor);
        alg.exp_integral(Cplx::new(zero, im))
    };
    let q_beta = alg.add(q, beta);
    let one_beta = alg.add(one, beta);
    let e_q = ei_at(alg, q);
    let e_one = ei_at(alg, one);
    let e_qb = ei_at(alg, q_beta);
    let e_1b = ei_at(alg, one_beta);

    // I = -(e^{iA}/c)·[(Ei(bq) - Ei(b)) - e^{-bβ}(Ei(b(q+β)) - Ei(b(1+β)))]
    let displacement = {
        let head = e_q.sub(alg, e_one);
        let tail = e_qb.sub(alg, e_1b);
        let amp_beta = alg.mul(amp, beta);
        let shift = Cplx::unit(alg, amp_beta);
        let tail = shift.mul(alg, tail);
        let bracket = head.sub(alg, tail);
        let phase = Cplx::unit(alg, amp);
        let rotated = phase.mul(alg, bracket);
        let neg_inv_c = {
            let inv = alg.div(one, c);
            alg.neg(inv)
        };
        rotated.scale(alg, neg_inv_c)
    };
    let guard = alg.add(displacement.re, displacement.im);
    let integral = Cplx::new(
        alg.select_finite(guard, displacement.re, l1_c),
        alg.select_finite(guard, displacement.im, zero),
    );
    let theta = {
        let tq = alg.mul(t, q);
        let raw = alg.mul(lift_side, tq);
        alg.select_finite(guard, raw, zero)
    };

    // Vertical-velocity coupling of the horizontal lift, -i·lift·Ω0·∫vy
    let ay0 = {
        let cv = alg.mul(c, v0.y);
        let a = alg.sub(lift_vertical, g);
        alg.sub(a, cv)
    };
    let coupling = Cplx::new(w0.z, alg.neg(w0.x)).scale(alg, lift);
    let vy_integral = {
        let a = alg.mul(v0.y, t);
        let b = alg.mul(ay0, t2);
        let b = alg.scale(b, 0.5);
        alg.add(a, b)
    };
    let vy_double_integral = {
        let a = alg.mul(v0.y, t2);
        let a = alg.scale(a, 0.5);
        let b = alg.mul(ay0, t3);
        let b = alg.scale(b, 1.0 / 6.0);
        alg.add(a, b)
    };

    let w_start = Cplx::new(v0.x, v0.z);
    let w_vel = {
        let rot = Cplx::unit(alg, theta);
        let turned = w_start.mul(alg, rot);
        let inv = alg.div(one, one_ct);
        let damped = turned.scale(alg, inv);
        let lifted = coupling.scale(alg, vy_integral);
        damped.add(alg, lifted)
    };
    let w_pos = {
        let swept = w_start.mul(alg, integral);
        let lifted = coupling.scale(alg, vy_double_integral);
        swept.add(alg, lifted)
    };

    BallTerms {
        pos: Triple::new(alg.add(p0.x, w_pos.re), y, alg.add(p0.z, w_pos.im)),
        vel: Triple::new(w_vel.re, vy, w_vel.im),
        spin,
    }
}

/// Numeric closed-form step.
pub fn step_simplified(state: &BallState, params: &PhysicsParams, dt: f64) -> BallState {
    let terms = BallTerms::from(*state);
    simplified_flight(&mut Numeric, params, &terms, dt).into()
}

// ln(1 + x·t)/x, with the x → 0 limit t
fn ln1p_ratio<A: Algebra>(alg: &mut A, x: A::Scalar, t: A::Scalar) -> A::Scalar {
    let xt = alg.mul(x, t);
    let log = alg.ln_1p(xt);
    let ratio = alg.div(log, x);
    alg.select_finite(ratio, ratio, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{EvalContext, ExprGraph};
    use crate::forces::AeroForces;
    use crate::integrator::Euler;
    use crate::types::Vec3;

    fn spinning_ball() -> BallState {
        BallState::new(
            Vec3::new(-1.5, 1.0, 0.2),
            Vec3::new(6.0, 1.5, -0.8),
            Vec3::new(40.0, -120.0, -150.0),
        )
    }

    fn max_error(a: &BallState, b: &BallState) -> f64 {
        (a.pos - b.pos)
            .magnitude()
            .max((a.vel - b.vel).magnitude() / 10.0)
    }

    fn error_after(steps: usize, total: f64) -> f64 {
        let params = PhysicsParams::default();
        let forces = AeroForces::new(params);
        let dt = total / steps as f64;
        let mut full = spinning_ball();
        let mut simplified = spinning_ball();
        for _ in 0..steps {
            full = Euler::step(&full, &forces, dt);
            simplified = step_simplified(&simplified, &params, dt);
        }
        max_error(&full, &simplified)
    }

    #[test]
    fn test_zero_interval_is_identity() {
        let ball = spinning_ball();
        let same = step_simplified(&ball, &PhysicsParams::default(), 0.0);
        assert!((same.pos - ball.pos).magnitude() < 1e-12);
        assert!((same.vel - ball.vel).magnitude() < 1e-12);
        assert!((same.spin - ball.spin).magnitude() < 1e-12);
    }

    #[test]
    fn test_converges_to_full_step() {
        let coarse = error_after(100, 0.5);
        let fine = error_after(1000, 0.5);
        assert!(fine < 2e-3, "error with dt=0.5ms should be small, got {}", fine);
        assert!(
            fine < coarse / 5.0,
            "error should shrink linearly with dt: {} -> {}",
            coarse,
            fine
        );
    }

    #[test]
    fn test_single_interval_stays_close_to_full_physics() {
        let params = PhysicsParams::default();
        let forces = AeroForces::new(params);
        let ball = spinning_ball();
        let closed = step_simplified(&ball, &params, 0.3);
        let full = Euler::advance(&ball, &forces, 1e-4, 3000);
        assert!(
            (closed.pos - full.pos).magnitude() < 0.05,
            "one closed-form interval of 0.3s: {:?} vs {:?}",
            closed.pos,
            full.pos
        );
    }

    #[test]
    fn test_vacuum_flight_is_ballistic() {
        let params = PhysicsParams::vacuum();
        let ball = BallState::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.0, 2.0, -1.0), Vec3::ZERO);
        let t = 0.4;
        let after = step_simplified(&ball, &params, t);
        let expected = ball.pos + ball.vel * t + Vec3::new(0.0, -0.5 * params.gravity * t * t, 0.0);
        assert!(
            (after.pos - expected).magnitude() < 1e-5,
            "vacuum flight {:?} vs parabola {:?}",
            after.pos,
            expected
        );
    }

    #[test]
    fn test_no_spin_has_no_sideways_drift() {
        let params = PhysicsParams::default();
        let ball = BallState::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(4.0, 0.0, 0.0), Vec3::ZERO);
        let after = step_simplified(&ball, &params, 0.3);
        assert!(after.is_finite(), "degenerate spin must use the fallback branch");
        assert_eq!(after.pos.z, 0.0);
        assert!(after.pos.x > 0.0 && after.pos.x < 1.2);
    }

    #[test]
    fn test_symbolic_matches_numeric() {
        let params = PhysicsParams::default();
        let ball = spinning_ball();
        let t_value = 0.27;

        let mut g = ExprGraph::new();
        let vars: Vec<_> = ["px", "py", "pz", "vx", "vy", "vz", "wx", "wy", "wz"]
            .iter()
            .map(|name| g.variable(name))
            .collect();
        let t = g.variable("t");
        let inputs: Vec<_> = vars.iter().map(|&v| g.var(v)).collect();
        let terms = BallTerms::from_array([
            inputs[0], inputs[1], inputs[2], inputs[3], inputs[4], inputs[5], inputs[6],
            inputs[7], inputs[8],
        ]);
        let te = g.var(t);
        let out = simplified_flight(&mut g, &params, &terms, te);

        let mut ctx = EvalContext::new(&g);
        for (var, value) in vars.iter().zip(ball.to_array()) {
            ctx.set(&g, *var, value);
        }
        ctx.set(&g, t, t_value);
        let expected = step_simplified(&ball, &params, t_value).to_array();
        for (id, value) in out.to_array().iter().zip(expected) {
            assert!(
                (ctx.eval(&g, *id) - value).abs() < 1e-12,
                "symbolic and numeric flight must share one algebra"
            );
        }
    }

    #[test]
    fn test_vertical_velocity_matches_hyperbolic_drag() {
        let params = PhysicsParams::default();
        let ball = BallState::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(5.0, 2.0, 1.0), Vec3::ZERO);
        let c = params.drag * ball.vel.magnitude();
        let (t, h) = (0.25, 1e-5);

        let vy = |time: f64| step_simplified(&ball, &params, time).vel.y;
        let closed = (2.0 - params.gravity * (t + 0.5 * c * t * t)) / (1.0 + c * t);
        assert!((vy(t) - closed).abs() < 1e-12, "{} vs {}", vy(t), closed);

        let rate = (vy(t + h) - vy(t - h)) / (2.0 * h);
        let expected = -params.gravity - c * vy(t) / (1.0 + c * t);
        assert!((rate - expected).abs() < 1e-6, "vy' = {}, expected {}", rate, expected);
    }
}
