use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A point (or offset) in device pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Clamp each component into `[min, max]` of the matching axis.
    pub fn clamp(self, min: Vector2, max: Vector2) -> Vector2 {
        Vector2::new(self.x.max(min.x).min(max.x), self.y.max(min.y).min(max.y))
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Div<f64> for Vector2 {
    type Output = Vector2;

    fn div(self, rhs: f64) -> Vector2 {
        Vector2::new(self.x / rhs, self.y / rhs)
    }
}

impl Mul<f64> for Vector2 {
    type Output = Vector2;

    fn mul(self, rhs: f64) -> Vector2 {
        Vector2::new(self.x * rhs, self.y * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Vector2::new(10.0, 20.0);
        let b = Vector2::new(30.0, 60.0);
        assert_eq!(b - a, Vector2::new(20.0, 40.0));
        assert_eq!(a + b, Vector2::new(40.0, 80.0));
        assert_eq!(b / 2.0, Vector2::new(15.0, 30.0));
        assert_eq!(a * 3.0, Vector2::new(30.0, 60.0));
    }

    #[test]
    fn test_clamp() {
        let p = Vector2::new(-5.0, 2000.0);
        let clamped = p.clamp(Vector2::new(0.0, 0.0), Vector2::new(1079.0, 1919.0));
        assert_eq!(clamped, Vector2::new(0.0, 1919.0));
    }
}
