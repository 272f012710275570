//! Core types for the simulation.
//!
//! All units are SI:
//! - Position: meters (m)
//! - Velocity: meters per second (m/s)
//! - Angular velocity (spin): radians per second (rad/s)
//! - Acceleration: meters per second squared (m/s²)

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

// =============================================================================
// Vec3 - 3D Vector
// =============================================================================

/// A 3D vector used for positions, velocities, accelerations, and spin.
///
/// Coordinate system:
/// - X: horizontal, along the table length (net at x = 0)
/// - Y: vertical (positive upward, floor at y = 0)
/// - Z: horizontal, along the table width
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UNIT_X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const UNIT_Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    pub const UNIT_Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Vector with all three components equal to `value`
    pub const fn splat(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// Squared magnitude (avoids sqrt for comparisons)
    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Magnitude (length) of the vector
    pub fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    /// Returns a unit vector in the same direction, or zero if magnitude is zero
    pub fn normalized(&self) -> Self {
        let mag = self.magnitude();
        if mag < constants::EPSILON {
            Self::ZERO
        } else {
            *self / mag
        }
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Linear interpolation between two vectors
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        *self + (*other - *self) * t
    }

    /// Splits the vector into its components along and across `normal`.
    ///
    /// Returns `(normal_part, tangential_part)`; `normal` must be a unit vector.
    pub fn project_on_normal(&self, normal: &Self) -> (Self, Self) {
        let normal_part = *normal * self.dot(normal);
        (normal_part, *self - normal_part)
    }

    /// Rotates the vector by an axis-angle rotation (direction = axis,
    /// magnitude = angle in radians) using Rodrigues' formula.
    pub fn rotated(&self, axis_angle: &Self) -> Self {
        let angle = axis_angle.magnitude();
        if angle < constants::EPSILON {
            return *self;
        }
        let axis = *axis_angle / angle;
        let (sin, cos) = angle.sin_cos();
        *self * cos + axis.cross(self) * sin + axis * (axis.dot(self) * (1.0 - cos))
    }

    /// True when no component is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Table-plane projection (x, z)
    pub fn horizontal(&self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
        self.z -= other.z;
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Self {
            x: self.x / scalar,
            y: self.y / scalar,
            z: self.z / scalar,
        }
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

// =============================================================================
// Vec2 - table-plane vector
// =============================================================================

/// A point or direction in the table plane: `x` along the length, `z` across.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub z: f64,
}

impl Vec2 {
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.z.is_finite()
    }

    /// Lifts the point back to 3D at height `y`
    pub fn at_height(&self, y: f64) -> Vec3 {
        Vec3::new(self.x, y, self.z)
    }
}

// =============================================================================
// Ball State
// =============================================================================

/// Kinematic state of the ball.
///
/// Spin follows the right-hand rule: a ball flying toward +X with topspin
/// spins around -Z (the top of the ball moves forward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub pos: Vec3,
    pub vel: Vec3,
    pub spin: Vec3,
}

impl BallState {
    pub fn new(pos: Vec3, vel: Vec3, spin: Vec3) -> Self {
        Self { pos, vel, spin }
    }

    /// Ball at rest at a given position
    pub fn at_rest(pos: Vec3) -> Self {
        Self {
            pos,
            vel: Vec3::ZERO,
            spin: Vec3::ZERO,
        }
    }

    /// False once any component has diverged to NaN or infinity
    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vel.is_finite() && self.spin.is_finite()
    }

    /// Flattened `[pos, vel, spin]` components, the layout used by the search model
    pub fn to_array(&self) -> [f64; 9] {
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

    pub fn from_array(values: &[f64; 9]) -> Self {
        Self {
            pos: Vec3::new(values[0], values[1], values[2]),
            vel: Vec3::new(values[3], values[4], values[5]),
            spin: Vec3::new(values[6], values[7], values[8]),
        }
    }
}

impl Default for BallState {
    fn default() -> Self {
        Self::at_rest(Vec3::ZERO)
    }
}

// =============================================================================
// Physics parameters
// =============================================================================

/// Aerodynamic and geometric parameters of the ball.
///
/// Coefficients are already divided by the ball mass, so forces are
/// accelerations:
/// - drag: `-drag * |v| * v`
/// - Magnus: `magnus * (ω × v)`
/// - spin decay: `-spin_damping * ω * sqrt(|ω|)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    pub radius: f64,
    pub drag: f64,
    pub magnus: f64,
    pub spin_damping: f64,
    pub gravity: f64,
}

impl PhysicsParams {
    /// Coefficient of `v × ω` in the linear acceleration.
    pub fn lift(&self) -> f64 {
        -self.magnus
    }

    /// Ball in vacuum: only gravity acts.
    pub fn vacuum() -> Self {
        Self {
            drag: 0.0,
            magnus: 0.0,
            spin_damping: 0.0,
            ..Self::default()
        }
    }
}

impl Default for PhysicsParams {
    /// 40mm competition ball (2.7g)
    fn default() -> Self {
        Self {
            radius: 0.020,
            drag: 0.11,
            magnus: 0.009,
            spin_damping: 0.015,
            gravity: constants::GRAVITY,
        }
    }
}

// =============================================================================
// Table State
// =============================================================================

/// The table, centered at the origin with the net at x = 0.
///
/// ITTF regulation dimensions:
/// - Length: 2.74m (half_length = 1.37m)
/// - Width: 1.525m (half_width = 0.7625m)
/// - Height: 0.76m
/// - Net height: 0.1525m (15.25cm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableState {
    pub half_length: f64,
    pub half_width: f64,
    pub height: f64,
    pub net_height: f64,
    /// How far the net posts stick out past the table edge
    pub net_overhang: f64,
}

impl TableState {
    pub fn ittf_regulation() -> Self {
        Self {
            half_length: 1.37,
            half_width: 0.7625,
            height: 0.76,
            net_height: 0.1525,
            net_overhang: 0.1525,
        }
    }

    /// Y coordinate of the playing surface
    pub fn surface_y(&self) -> f64 {
        self.height
    }

    /// Y coordinate of the top of the net
    pub fn net_top_y(&self) -> f64 {
        self.height + self.net_height
    }

    /// Check if a point (x, z) is within the table bounds
    pub fn is_over_table(&self, x: f64, z: f64) -> bool {
        x.abs() <= self.half_length && z.abs() <= self.half_width
    }

    /// Which half of the table a point lies on: -1, +1, or 0 on the net line
    pub fn half_of(&self, x: f64) -> i8 {
        if x > 0.0 {
            1
        } else if x < 0.0 {
            -1
        } else {
            0
        }
    }
}

impl Default for TableState {
    fn default() -> Self {
        Self::ittf_regulation()
    }
}

// =============================================================================
// Physical Constants
// =============================================================================

pub mod constants {
    /// Gravitational acceleration (m/s²)
    pub const GRAVITY: f64 = 9.81;

    /// Small value for floating-point comparisons
    pub const EPSILON: f64 = 1e-10;
}

// =============================================================================
// Tests
// =============================================================================
