//! Shared 2D math types and helpers.

pub type Point2d = cgmath::Point2<f64>;
pub type Vector2d = cgmath::Vector2<f64>;

/// Euclidean distance between two points in m.
pub fn distance(a: Point2d, b: Point2d) -> f64 {
    use cgmath::MetricSpace;
    a.distance(b)
}
