//! One algebra, two interpretations.
//!
//! The closed-form flight and the bat/table impulse are written once against
//! the [`Algebra`] trait. [`Numeric`] evaluates them directly on `f64`;
//! [`ExprGraph`] records them as expression nodes so the search can take
//! exact derivatives of the very same formulas.
//!
//! Every operation is an explicit, named call. There are no operator
//! overloads mixing scalars, vectors, complex numbers, and expression ids.

use num_complex::Complex64;

use crate::complex;
use crate::expr::{BinaryOp, ExprGraph, ExprId, Part, UnaryOp};
use crate::types::{BallState, Vec3};

/// Scalar operations shared by numeric and symbolic evaluation.
pub trait Algebra {
    type Scalar: Copy;

    fn constant(&mut self, value: f64) -> Self::Scalar;

    fn add(&mut self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;
    fn sub(&mut self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;
    fn mul(&mut self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;
    fn div(&mut self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;

    fn neg(&mut self, a: Self::Scalar) -> Self::Scalar;
    fn sqrt(&mut self, a: Self::Scalar) -> Self::Scalar;
    fn ln(&mut self, a: Self::Scalar) -> Self::Scalar;
    fn ln_1p(&mut self, a: Self::Scalar) -> Self::Scalar;
    fn exp(&mut self, a: Self::Scalar) -> Self::Scalar;
    fn sin(&mut self, a: Self::Scalar) -> Self::Scalar;
    fn cos(&mut self, a: Self::Scalar) -> Self::Scalar;

    fn min(&mut self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;
    fn max(&mut self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;

    /// `primary` while `guard` is finite, `fallback` otherwise.
    fn select_finite(
        &mut self,
        guard: Self::Scalar,
        primary: Self::Scalar,
        fallback: Self::Scalar,
    ) -> Self::Scalar;

    /// Complex exponential integral `Ei(z)`.
    fn exp_integral(&mut self, z: Cplx<Self::Scalar>) -> Cplx<Self::Scalar>;

    /// `a * k` for a literal `k`
    fn scale(&mut self, a: Self::Scalar, k: f64) -> Self::Scalar {
        let k = self.constant(k);
        self.mul(a, k)
    }
}

// =============================================================================
// Numeric interpretation
// =============================================================================

/// Plain `f64` evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Numeric;

impl Algebra for Numeric {
    type Scalar = f64;

    fn constant(&mut self, value: f64) -> f64 {
        value
    }
    fn add(&mut self, a: f64, b: f64) -> f64 {
        a + b
    }
    fn sub(&mut self, a: f64, b: f64) -> f64 {
        a - b
    }
    fn mul(&mut self, a: f64, b: f64) -> f64 {
        a * b
    }
    fn div(&mut self, a: f64, b: f64) -> f64 {
        a / b
    }
    fn neg(&mut self, a: f64) -> f64 {
        -a
    }
    fn sqrt(&mut self, a: f64) -> f64 {
        a.sqrt()
    }
    fn ln(&mut self, a: f64) -> f64 {
        a.ln()
    }
    fn ln_1p(&mut self, a: f64) -> f64 {
        a.ln_1p()
    }
    fn exp(&mut self, a: f64) -> f64 {
        a.exp()
    }
    fn sin(&mut self, a: f64) -> f64 {
        a.sin()
    }
    fn cos(&mut self, a: f64) -> f64 {
        a.cos()
    }
    // Same tie-breaking as the symbolic select: `a` wins when `a <= b`.
    fn min(&mut self, a: f64, b: f64) -> f64 {
        if a <= b {
            a
        } else {
            b
        }
    }
    fn max(&mut self, a: f64, b: f64) -> f64 {
        if a <= b {
            b
        } else {
            a
        }
    }
    fn select_finite(&mut self, guard: f64, primary: f64, fallback: f64) -> f64 {
        if guard.is_finite() {
            primary
        } else {
            fallback
        }
    }
    fn exp_integral(&mut self, z: Cplx<f64>) -> Cplx<f64> {
        let value = complex::ei(Complex64::new(z.re, z.im));
        Cplx::new(value.re, value.im)
    }
}

// =============================================================================
// Symbolic interpretation
// =============================================================================

impl Algebra for ExprGraph {
    type Scalar = ExprId;

    fn constant(&mut self, value: f64) -> ExprId {
        ExprGraph::constant(self, value)
    }
    fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Add, a, b)
    }
    fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Sub, a, b)
    }
    fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Mul, a, b)
    }
    fn div(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinaryOp::Div, a, b)
    }
    fn neg(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Neg, a)
    }
    fn sqrt(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Sqrt, a)
    }
    fn ln(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Ln, a)
    }
    fn ln_1p(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Ln1p, a)
    }
    fn exp(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Exp, a)
    }
    fn sin(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Sin, a)
    }
    fn cos(&mut self, a: ExprId) -> ExprId {
        self.unary(UnaryOp::Cos, a)
    }
    fn min(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.select(a, b, a, b)
    }
    fn max(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.select(a, b, b, a)
    }
    fn select_finite(&mut self, guard: ExprId, primary: ExprId, fallback: ExprId) -> ExprId {
        self.coalesce(guard, primary, fallback)
    }
    fn exp_integral(&mut self, z: Cplx<ExprId>) -> Cplx<ExprId> {
        Cplx::new(
            self.exp_integral_part(Part::Re, z.re, z.im),
            self.exp_integral_part(Part::Im, z.re, z.im),
        )
    }
}

// =============================================================================
// Vectors over an algebra
// =============================================================================

/// Three scalars of some algebra, used as a 3D vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triple<S> {
    pub x: S,
    pub y: S,
    pub z: S,
}

impl<S: Copy> Triple<S> {
    pub fn new(x: S, y: S, z: S) -> Self {
        Self { x, y, z }
    }

    pub fn splat<A: Algebra<Scalar = S>>(alg: &mut A, value: f64) -> Self {
        let v = alg.constant(value);
        Self::new(v, v, v)
    }

    pub fn from_vec3<A: Algebra<Scalar = S>>(alg: &mut A, v: Vec3) -> Self {
        Self::new(alg.constant(v.x), alg.constant(v.y), alg.constant(v.z))
    }

    pub fn add<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> Self {
        Self::new(
            alg.add(self.x, other.x),
            alg.add(self.y, other.y),
            alg.add(self.z, other.z),
        )
    }

    pub fn sub<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> Self {
        Self::new(
            alg.sub(self.x, other.x),
            alg.sub(self.y, other.y),
            alg.sub(self.z, other.z),
        )
    }

    /// Multiplies every component by the scalar `k`
    pub fn scale<A: Algebra<Scalar = S>>(self, alg: &mut A, k: S) -> Self {
        Self::new(alg.mul(self.x, k), alg.mul(self.y, k), alg.mul(self.z, k))
    }

    pub fn dot<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> S {
        let xx = alg.mul(self.x, other.x);
        let yy = alg.mul(self.y, other.y);
        let zz = alg.mul(self.z, other.z);
        let partial = alg.add(xx, yy);
        alg.add(partial, zz)
    }

    pub fn cross<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> Self {
        let cx = {
            let a = alg.mul(self.y, other.z);
            let b = alg.mul(self.z, other.y);
            alg.sub(a, b)
        };
        let cy = {
            let a = alg.mul(self.z, other.x);
            let b = alg.mul(self.x, other.z);
            alg.sub(a, b)
        };
        let cz = {
            let a = alg.mul(self.x, other.y);
            let b = alg.mul(self.y, other.x);
            alg.sub(a, b)
        };
        Self::new(cx, cy, cz)
    }

    pub fn norm<A: Algebra<Scalar = S>>(self, alg: &mut A) -> S {
        let sq = self.dot(alg, self);
        alg.sqrt(sq)
    }

    pub fn to_array(self) -> [S; 3] {
        [self.x, self.y, self.z]
    }
}

impl Triple<f64> {
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for Triple<f64> {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

// =============================================================================
// Complex numbers over an algebra
// =============================================================================

/// A complex number whose parts are scalars of some algebra.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cplx<S> {
    pub re: S,
    pub im: S,
}

impl<S: Copy> Cplx<S> {
    pub fn new(re: S, im: S) -> Self {
        Self { re, im }
    }

    pub fn add<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> Self {
        Self::new(alg.add(self.re, other.re), alg.add(self.im, other.im))
    }

    pub fn sub<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> Self {
        Self::new(alg.sub(self.re, other.re), alg.sub(self.im, other.im))
    }

    pub fn mul<A: Algebra<Scalar = S>>(self, alg: &mut A, other: Self) -> Self {
        let rr = alg.mul(self.re, other.re);
        let ii = alg.mul(self.im, other.im);
        let ri = alg.mul(self.re, other.im);
        let ir = alg.mul(self.im, other.re);
        Self::new(alg.sub(rr, ii), alg.add(ri, ir))
    }

    /// Multiplies both parts by the real scalar `k`
    pub fn scale<A: Algebra<Scalar = S>>(self, alg: &mut A, k: S) -> Self {
        Self::new(alg.mul(self.re, k), alg.mul(self.im, k))
    }

    /// `cos θ + i·sin θ`
    pub fn unit<A: Algebra<Scalar = S>>(alg: &mut A, angle: S) -> Self {
        Self::new(alg.cos(angle), alg.sin(angle))
    }
}

// =============================================================================
// Ball state over an algebra
// =============================================================================

/// Position, velocity, and spin expressed in some algebra.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallTerms<S> {
    pub pos: Triple<S>,
    pub vel: Triple<S>,
    pub spin: Triple<S>,
}

impl<S: Copy> BallTerms<S> {
    /// Components in `[pos, vel, spin]` order, matching `BallState::to_array`
    pub fn to_array(&self) -> [S; 9] {
        [
            self.pos.x,
            self.pos.y,
            self.pos.z,
            self.vel.x,
            self.vel.y,
            self.vel.z,
            self.spin.x,
            self.spin.y,
            self.spin.z,
        ]
    }

    pub fn from_array(values: [S; 9]) -> Self {
        Self {
            pos: Triple::new(values[0], values[1], values[2]),
            vel: Triple::new(values[3], values[4], values[5]),
            spin: Triple::new(values[6], values[7], values[8]),
        }
    }
}

impl From<BallState> for BallTerms<f64> {
    fn from(state: BallState) -> Self {
        Self {
            pos: state.pos.into(),
            vel: state.vel.into(),
            spin: state.spin.into(),
        }
    }
}

impl From<BallTerms<f64>> for BallState {
    fn from(terms: BallTerms<f64>) -> Self {
        BallState::new(
            terms.pos.to_vec3(),
            terms.vel.to_vec3(),
            terms.spin.to_vec3(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalContext;

    #[test]
    fn test_numeric_triple_matches_vec3() {
        let mut alg = Numeric;
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        let ta = Triple::from(a);
        let tb = Triple::from(b);
        assert_eq!(ta.cross(&mut alg, tb).to_vec3(), a.cross(&b));
        assert_eq!(ta.dot(&mut alg, tb), a.dot(&b));
        assert!((ta.norm(&mut alg) - a.magnitude()).abs() < 1e-15);
    }

    #[test]
    fn test_symbolic_and_numeric_agree() {
        // exp(i·x)·(x + 2i), recorded symbolically and evaluated at x = 0.4
        fn build<A: Algebra>(alg: &mut A, x: A::Scalar) -> Cplx<A::Scalar> {
            let two = alg.constant(2.0);
            let rot = Cplx::unit(alg, x);
            rot.mul(alg, Cplx::new(x, two))
        }

        let numeric = build(&mut Numeric, 0.4);

        let mut g = ExprGraph::new();
        let x = g.variable("x");
        let xe = g.var(x);
        let symbolic = build(&mut g, xe);
        let mut ctx = EvalContext::new(&g);
        ctx.set(&g, x, 0.4);
        assert!((ctx.eval(&g, symbolic.re) - numeric.re).abs() < 1e-15);
        assert!((ctx.eval(&g, symbolic.im) - numeric.im).abs() < 1e-15);
    }

    #[test]
    fn test_select_finite_numeric() {
        let mut alg = Numeric;
        assert_eq!(alg.select_finite(f64::NAN, 1.0, 2.0), 2.0);
        assert_eq!(alg.select_finite(0.0, 1.0, 2.0), 1.0);
        assert_eq!(alg.min(1.0, 2.0), 1.0);
        assert_eq!(alg.max(1.0, 2.0), 2.0);
    }
}
