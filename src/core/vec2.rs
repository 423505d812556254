//! Arena Points and Angles
//!
//! 2D points for the battle arena plus the degree-based angle helpers the
//! rules engine uses. The arena origin is the bottom-left corner, x grows
//! to the east, y grows to the north, and 0° points east with angles
//! increasing counter-clockwise.

use std::fmt;
use std::ops::{Add, Neg, Sub};
use serde::{Deserialize, Serialize};

/// 2D arena coordinate.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate (east)
    pub x: f64,
    /// Y coordinate (north)
    pub y: f64,
}

impl Point {
    /// Origin of the arena.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector for a direction in degrees.
    #[inline]
    pub fn from_direction(degrees: f64) -> Self {
        let rad = degrees.to_radians();
        Self::new(rad.cos(), rad.sin())
    }

    /// Point reached by travelling `distance` along `degrees`.
    #[inline]
    pub fn advance(self, degrees: f64, distance: f64) -> Self {
        self + Self::from_direction(degrees).scale(distance)
    }

    /// Scale both components.
    #[inline]
    pub fn scale(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }

    /// Squared length.
    #[inline]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).length_squared()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Dot product with another vector.
    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z-component).
    /// Positive if other is counter-clockwise from self.
    #[inline]
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Absolute direction (degrees, `[0, 360)`) from this point to another.
    #[inline]
    pub fn direction_to(self, other: Self) -> f64 {
        let d = other - self;
        normalize_absolute_degrees(d.y.atan2(d.x).to_degrees())
    }

    /// Clamp each component into `[min, max]` on its own axis.
    #[inline]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self::new(self.x.clamp(min.x, max.x), self.y.clamp(min.y, max.y))
    }
}

impl Add for Point {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({:.3}, {:.3})", self.x, self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

// =============================================================================
// ANGLES
// =============================================================================

/// Normalize an angle into `[0, 360)`.
#[inline]
pub fn normalize_absolute_degrees(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a < 0.0 {
        a + 360.0
    } else {
        a
    }
}

/// Normalize an angle into `[-180, 180)`.
#[inline]
pub fn normalize_relative_degrees(angle: f64) -> f64 {
    let a = normalize_absolute_degrees(angle);
    if a >= 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Signed difference `to - from`, normalized into `[-180, 180)`.
#[inline]
pub fn angle_delta(from: f64, to: f64) -> f64 {
    normalize_relative_degrees(to - from)
}

/// Whether `angle` lies on the arc swept from `start` by `span` degrees.
///
/// A negative span sweeps clockwise.
pub fn angle_in_sweep(angle: f64, start: f64, span: f64) -> bool {
    if span.abs() >= 360.0 {
        return true;
    }
    let offset = normalize_absolute_degrees(angle - start);
    if span >= 0.0 {
        offset <= span
    } else {
        offset == 0.0 || offset >= 360.0 + span
    }
}

// =============================================================================
// TESTS
// =============================================================================
