//! Debug visualization hooks.
//!
//! Meshing phases report intermediate geometry to a [`MeshTracer`] at phase
//! boundaries. The default [`NoopTracer`] ignores everything, so a production run
//! pays only for a virtual call per phase.

use crate::geometry::point::Point3;

/// Receiver for intermediate meshing state.
///
/// Every method has an empty default body; implement only what you draw.
/// [`MeshTracer::suspend`] marks a point where an interactive front-end may block
/// until the user resumes.
pub trait MeshTracer: Send {
    /// Draw a point.
    fn draw_point(&mut self, _p: &Point3) {}

    /// Draw a segment.
    fn draw_edge(&mut self, _a: &Point3, _b: &Point3) {}

    /// Draw a triangle.
    fn draw_triangle(&mut self, _corners: &[Point3; 3]) {}

    /// Draw a tetrahedron.
    fn draw_tetrahedron(&mut self, _corners: &[Point3; 4]) {}

    /// A phase named `label` just finished.
    fn suspend(&mut self, _label: &str) {}
}

/// Tracer that does nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopTracer;

impl MeshTracer for NoopTracer {}
