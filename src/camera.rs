//! Scene Cameras
//!
//! The compositor does not render cameras itself; transform passes receive
//! the element's target camera so they can match lens and exposure. The
//! [`CompositingGraph`](crate::graph::CompositingGraph) owns the cameras an
//! element can resolve to.

use crate::utils::Name;

/// Preference class used when scanning the scene for a default camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraKind {
    /// Cinematic camera; preferred by the scene scan.
    Cine,
    /// Ordinary camera; fallback of the scene scan.
    Standard,
}

/// A camera in the scene a compositing element may target.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneCamera {
    pub name: Name,
    pub kind: CameraKind,
    /// Focal length in millimetres, forwarded to passes as-is.
    pub focal_length: f32,
    pending_kill: bool,
}

impl SceneCamera {
    #[must_use]
    pub fn new(name: &str, kind: CameraKind) -> Self {
        Self {
            name: Name::new(name),
            kind,
            focal_length: 35.0,
            pending_kill: false,
        }
    }

    #[must_use]
    pub fn cine(name: &str) -> Self {
        Self::new(name, CameraKind::Cine)
    }

    #[must_use]
    pub fn standard(name: &str) -> Self {
        Self::new(name, CameraKind::Standard)
    }

    /// Marks the camera as being torn down; it is skipped by camera scans.
    pub fn mark_pending_kill(&mut self) {
        self.pending_kill = true;
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.pending_kill
    }
}
