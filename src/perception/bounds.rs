//! Screen rectangles as serialized by `uiautomator`: `[x1,y1][x2,y2]`.
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{DroidLensError, DroidLensResult};
use crate::perception::geometry::Vector2;

fn delimiter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\[\],]").expect("static regex"))
}

/// Rectangle an element occupies on screen, in device pixels.
///
/// `min <= max` is expected but not enforced; see
/// [`crate::executor::coordinator::tap_point`] for the opt-in checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    min: Vector2,
    max: Vector2,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: Vector2::new(min_x, min_y),
            max: Vector2::new(max_x, max_y),
        }
    }

    pub fn min(&self) -> Vector2 {
        self.min
    }

    pub fn max(&self) -> Vector2 {
        self.max
    }

    /// `min + (max - min) / 2`, computed without any validation.
    pub fn center(&self) -> Vector2 {
        (self.max - self.min) / 2.0 + self.min
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// True when `min <= max` on both axes.
    pub fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    pub fn contains(&self, point: Vector2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

impl FromStr for Bounds {
    type Err = DroidLensError;

    fn from_str(s: &str) -> DroidLensResult<Self> {
        let tokens: Vec<&str> = delimiter_re()
            .split(s)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.len() != 4 {
            return Err(DroidLensError::MalformedBounds(format!(
                "expected 4 numeric tokens in {s:?}, found {}",
                tokens.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (slot, token) in values.iter_mut().zip(&tokens) {
            *slot = token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    DroidLensError::MalformedBounds(format!("{token:?} is not a number in {s:?}"))
                })?;
        }

        Ok(Bounds::new(values[0], values[1], values[2], values[3]))
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}][{},{}]",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_center() {
        let b: Bounds = "[10,20][30,60]".parse().unwrap();
        assert_eq!(b.min(), Vector2::new(10.0, 20.0));
        assert_eq!(b.max(), Vector2::new(30.0, 60.0));
        assert_eq!(b.center(), Vector2::new(20.0, 40.0));
    }

    #[test]
    fn test_parse_real_valued() {
        let b: Bounds = "[0.5,1.5][100.25,200]".parse().unwrap();
        assert_eq!(b.min(), Vector2::new(0.5, 1.5));
        assert_eq!(b.width(), 99.75);
    }

    #[test]
    fn test_parse_full_screen() {
        let b: Bounds = "[0,0][100,200]".parse().unwrap();
        assert_eq!(b.center(), Vector2::new(50.0, 100.0));
        assert!(b.is_ordered());
        assert!(!b.is_empty());
    }

    #[test]
    fn test_rejects_two_tokens() {
        let err = "[0,0]".parse::<Bounds>().unwrap_err();
        assert!(matches!(err, DroidLensError::MalformedBounds(_)));
    }

    #[test]
    fn test_rejects_extra_and_garbage_tokens() {
        assert!(matches!(
            "[0,0][1,1][2,2]".parse::<Bounds>(),
            Err(DroidLensError::MalformedBounds(_))
        ));
        assert!(matches!(
            "[0,a][1,1]".parse::<Bounds>(),
            Err(DroidLensError::MalformedBounds(_))
        ));
        assert!(matches!(
            "[0,NaN][1,1]".parse::<Bounds>(),
            Err(DroidLensError::MalformedBounds(_))
        ));
        assert!(matches!("".parse::<Bounds>(), Err(DroidLensError::MalformedBounds(_))));
    }

    #[test]
    fn test_inverted_bounds_still_have_center() {
        let b: Bounds = "[30,60][10,20]".parse().unwrap();
        assert!(!b.is_ordered());
        assert_eq!(b.center(), Vector2::new(20.0, 40.0));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b: Bounds = "[270,1600][540,1800]".parse().unwrap();
        assert!(b.contains(b.center()));
        assert!(b.contains(Vector2::new(270.0, 1800.0)));
        assert!(!b.contains(Vector2::new(269.5, 1700.0)));
        assert!(!b.contains(Vector2::new(405.0, 1801.0)));
    }

    #[test]
    fn test_display_matches_dump_format() {
        let b = Bounds::new(0.0, 63.0, 1080.0, 210.0);
        assert_eq!(b.to_string(), "[0,63][1080,210]");
    }
}
