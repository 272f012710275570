//! Swept sphere collision detection.
//!
//! Every obstacle is a [`Surface`]: a plane through `pos` with unit `normal`,
//! clipped to an [`Extent`] and optionally moving with constant velocity.

use crate::collision::HitCoefficients;
use crate::types::{constants, BallState, TableState, Vec3};

/// What the ball touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Table,
    Net,
    Floor,
    /// Bat of the agent with this index
    Bat(usize),
}

/// In-plane shape of a surface, centered on `Surface::pos`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extent {
    Unbounded,
    Rect {
        axis_u: Vec3,
        half_u: f64,
        axis_v: Vec3,
        half_v: f64,
    },
    Disk {
        radius: f64,
    },
}

impl Extent {
    /// Whether an in-plane offset from the center lies on the surface.
    pub fn contains(&self, offset: Vec3) -> bool {
        match *self {
            Extent::Unbounded => true,
            Extent::Rect {
                axis_u,
                half_u,
                axis_v,
                half_v,
            } => offset.dot(&axis_u).abs() <= half_u && offset.dot(&axis_v).abs() <= half_v,
            Extent::Disk { radius } => offset.magnitude() <= radius,
        }
    }
}

/// A flat obstacle the ball can bounce off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub pos: Vec3,
    pub vel: Vec3,
    pub normal: Vec3,
    pub extent: Extent,
    /// Two-sided surfaces (net, bats) can be hit from either side
    pub two_sided: bool,
    pub coeffs: HitCoefficients,
}

/// Ball state relative to a surface, seen from the side the ball is on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Normal pointing toward the ball
    pub normal: Vec3,
    /// Signed distance from the plane to the ball center
    pub distance: f64,
    /// Relative velocity along the normal (negative when approaching)
    pub normal_speed: f64,
    pub rel_normal: Vec3,
    pub rel_tangent: Vec3,
}

/// A detected contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub kind: SurfaceKind,
    /// Time from the start of the checked interval
    pub time: f64,
    /// Touch point on the surface
    pub point: Vec3,
    /// Surface normal at the contact, pointing toward the ball
    pub normal: Vec3,
}

impl Surface {
    /// Playing surface, hit from above only.
    pub fn table(table: &TableState, coeffs: HitCoefficients) -> Self {
        Self {
            kind: SurfaceKind::Table,
            pos: Vec3::new(0.0, table.surface_y(), 0.0),
            vel: Vec3::ZERO,
            normal: Vec3::UNIT_Y,
            extent: Extent::Rect {
                axis_u: Vec3::UNIT_X,
                half_u: table.half_length,
                axis_v: Vec3::UNIT_Z,
                half_v: table.half_width,
            },
            two_sided: false,
            coeffs,
        }
    }

    /// Vertical net at x = 0, from the table surface up to the net top.
    pub fn net(table: &TableState, coeffs: HitCoefficients) -> Self {
        Self {
            kind: SurfaceKind::Net,
            pos: Vec3::new(0.0, table.surface_y() + table.net_height / 2.0, 0.0),
            vel: Vec3::ZERO,
            normal: Vec3::UNIT_X,
            extent: Extent::Rect {
                axis_u: Vec3::UNIT_Y,
                half_u: table.net_height / 2.0,
                axis_v: Vec3::UNIT_Z,
                half_v: table.half_width + table.net_overhang,
            },
            two_sided: true,
            coeffs,
        }
    }

    /// Infinite ground plane at y = 0.
    pub fn floor(coeffs: HitCoefficients) -> Self {
        Self {
            kind: SurfaceKind::Floor,
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            normal: Vec3::UNIT_Y,
            extent: Extent::Unbounded,
            two_sided: false,
            coeffs,
        }
    }

    /// Round bat face of agent `index`.
    pub fn bat(
        index: usize,
        pos: Vec3,
        vel: Vec3,
        normal: Vec3,
        radius: f64,
        coeffs: HitCoefficients,
    ) -> Self {
        Self {
            kind: SurfaceKind::Bat(index),
            pos,
            vel,
            normal: normal.normalized(),
            extent: Extent::Disk { radius },
            two_sided: true,
            coeffs,
        }
    }

    /// The same surface `dt` seconds later.
    pub fn advanced(&self, dt: f64) -> Self {
        Self {
            pos: self.pos + self.vel * dt,
            ..*self
        }
    }

    /// Ball position and velocity relative to this surface.
    pub fn project(&self, ball: &BallState) -> Projection {
        let offset = (ball.pos - self.pos).dot(&self.normal);
        let facing = if self.two_sided && offset < 0.0 {
            -self.normal
        } else {
            self.normal
        };
        let rel = ball.vel - self.vel;
        let (rel_normal, rel_tangent) = rel.project_on_normal(&facing);

        Projection {
            normal: facing,
            distance: (ball.pos - self.pos).dot(&facing),
            normal_speed: rel.dot(&facing),
            rel_normal,
            rel_tangent,
        }
    }

    /// Earliest contact of a ball of `radius` within `dt`, if any.
    ///
    /// The ball and the surface are swept linearly over the interval. A ball
    /// already touching the surface while still approaching it is reported
    /// at `time = 0`.
    pub fn detect(&self, ball: &BallState, radius: f64, dt: f64) -> Option<Contact> {
        let projection = self.project(ball);

        // Behind a one-sided surface
        if projection.distance < 0.0 {
            return None;
        }
        // Only approaching balls can touch
        if projection.normal_speed >= 0.0 {
            return None;
        }

        let gap = projection.distance - radius;
        let time = if gap <= constants::EPSILON {
            0.0
        } else {
            gap / -projection.normal_speed
        };
        if time > dt {
            return None;
        }

        let center = ball.pos + ball.vel * time;
        let surface_pos = self.pos + self.vel * time;
        let point = center - projection.normal * radius;
        let offset = point - surface_pos;
        let in_plane = offset - projection.normal * offset.dot(&projection.normal);
        if !self.extent.contains(in_plane) {
            return None;
        }

        Some(Contact {
            kind: self.kind,
            time,
            point,
            normal: projection.normal,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
