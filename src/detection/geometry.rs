//! Card quadrilateral geometry
//!
//! Points are in pixel coordinates with y pointing down. A [`Quadrilateral`]
//! is always stored in canonical {top-left, top-right, bottom-right,
//! bottom-left} order and is convex and non-degenerate by construction.

use crate::error::{GradingError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Smallest accepted quadrilateral area in square pixels
const MIN_AREA: f64 = 16.0;

/// Twice the smallest accepted turn area at a vertex, relative to the polygon area
const MIN_TURN_RATIO: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<imageproc::point::Point<i32>> for Point {
    fn from(p: imageproc::point::Point<i32>) -> Self {
        Point::new(p.x as f64, p.y as f64)
    }
}

/// Shoelace area of a closed polygon (absolute value)
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    twice.abs() / 2.0
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// True when the closed polygon turns the same way at every vertex
pub fn is_convex(points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let area = polygon_area(points);
    if area <= 0.0 {
        return false;
    }
    let mut sign = 0.0;
    for i in 0..n {
        let turn = cross(points[i], points[(i + 1) % n], points[(i + 2) % n]);
        if turn.abs() < MIN_TURN_RATIO * area {
            return false;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    true
}

/// Four card corners in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quadrilateral {
    /// Build from corners in any order
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the points cannot be ordered into a
    /// convex, non-degenerate quadrilateral.
    pub fn from_points(points: [Point; 4]) -> Result<Self> {
        let ordered = order_points(points)
            .ok_or_else(|| GradingError::invariant("quadrilateral points cannot be ordered"))?;
        Self::from_ordered(ordered)
    }

    /// Build from corners already in {TL, TR, BR, BL} order
    pub fn from_ordered(points: [Point; 4]) -> Result<Self> {
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(GradingError::invariant("quadrilateral has non-finite coordinates"));
        }
        if polygon_area(&points) < MIN_AREA {
            return Err(GradingError::invariant("quadrilateral area is near zero"));
        }
        if !is_convex(&points) {
            return Err(GradingError::invariant("quadrilateral is not convex"));
        }
        Ok(Self {
            top_left: points[0],
            top_right: points[1],
            bottom_right: points[2],
            bottom_left: points[3],
        })
    }

    /// The whole `width × height` frame
    pub fn full_frame(width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as f64 - 1.0, height as f64 - 1.0);
        Self::from_ordered([
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
    }

    pub fn points(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.points())
    }

    pub fn centroid(&self) -> Point {
        let pts = self.points();
        Point::new(
            pts.iter().map(|p| p.x).sum::<f64>() / 4.0,
            pts.iter().map(|p| p.y).sum::<f64>() / 4.0,
        )
    }

    /// Mean width (top and bottom sides) and mean height (left and right sides)
    pub fn mean_size(&self) -> (f64, f64) {
        let width = (self.top_left.distance(&self.top_right)
            + self.bottom_left.distance(&self.bottom_right))
            / 2.0;
        let height = (self.top_left.distance(&self.bottom_left)
            + self.top_right.distance(&self.bottom_right))
            / 2.0;
        (width, height)
    }

    pub fn is_landscape(&self) -> bool {
        let (w, h) = self.mean_size();
        w > h
    }

    /// Reassign corner roles so the long side runs vertically
    ///
    /// A landscape card is turned a quarter clockwise: its bottom-left corner
    /// becomes the portrait top-left.
    pub fn to_portrait(&self) -> Self {
        if !self.is_landscape() {
            return *self;
        }
        Self {
            top_left: self.bottom_left,
            top_right: self.top_left,
            bottom_right: self.top_right,
            bottom_left: self.bottom_right,
        }
    }

    /// Scale every coordinate (detection on a downscaled copy)
    pub fn scaled(&self, factor: f64) -> Self {
        let s = |p: Point| Point::new(p.x * factor, p.y * factor);
        Self {
            top_left: s(self.top_left),
            top_right: s(self.top_right),
            bottom_right: s(self.bottom_right),
            bottom_left: s(self.bottom_left),
        }
    }

    /// True when every corner lies within the frame, allowing `slack` pixels outside
    pub fn fits_within(&self, width: u32, height: u32, slack: f64) -> bool {
        self.points().iter().all(|p| {
            p.x >= -slack
                && p.y >= -slack
                && p.x <= width as f64 - 1.0 + slack
                && p.y <= height as f64 - 1.0 + slack
        })
    }
}

fn by_key(key: impl Fn(&Point) -> f64) -> impl Fn(&Point, &Point) -> Ordering {
    move |a, b| {
        key(a)
            .total_cmp(&key(b))
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    }
}

/// Order four points as {TL, TR, BR, BL}
///
/// Uses the sum/difference rule: TL has the smallest x+y, BR the largest,
/// TR the smallest y−x and BL the largest. Ties break on (x, y) so the result
/// does not depend on input order. If two roles land on the same point the
/// points are sorted clockwise around their centroid instead, starting from
/// the smallest x+y.
pub fn order_points(points: [Point; 4]) -> Option<[Point; 4]> {
    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;

    let tl = points.into_iter().min_by(by_key(sum))?;
    let br = points.into_iter().max_by(by_key(sum))?;
    let tr = points.into_iter().min_by(by_key(diff))?;
    let bl = points.into_iter().max_by(by_key(diff))?;

    let roles = [tl, tr, br, bl];
    let distinct = (0..4).all(|i| (i + 1..4).all(|j| roles[i] != roles[j]));
    if distinct {
        return Some(roles);
    }

    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mut sorted = points;
    sorted.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.total_cmp(&tb).then(a.x.total_cmp(&b.x)).then(a.y.total_cmp(&b.y))
    });
    let start = (0..4).min_by(|&i, &j| by_key(sum)(&sorted[i], &sorted[j]))?;
    sorted.rotate_left(start);
    if (0..4).all(|i| (i + 1..4).all(|j| sorted[i] != sorted[j])) {
        Some(sorted)
    } else {
        None
    }
}
