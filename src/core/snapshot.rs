//! What the renderer needs to draw one frame.

use crate::backend::topology::{Topology, TopologyKind};
use crate::core::stabilizer::LiveStatus;
use crate::core::types::SkeletonFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vertex data and match feedback derived from the latest tracked frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    pub timestamp: DateTime<Utc>,
    pub topology: TopologyKind,
    /// Joint positions with y and z negated to face a GL camera
    pub vertices: Vec<[f32; 3]>,
    /// Whether each joint was tracked well enough to compare
    pub usable: Vec<bool>,
    /// `[child, parent]` index pairs to draw as lines
    pub bones: Vec<[u32; 2]>,
    pub status: LiveStatus,
    /// Joint to highlight when the live frame fails
    pub highlight: Option<usize>,
}

impl RenderSnapshot {
    pub fn build(frame: &SkeletonFrame, topology: &Topology, status: LiveStatus) -> Self {
        let vertices = frame
            .joints
            .iter()
            .map(|j| [j.position[0], -j.position[1], -j.position[2]])
            .collect();
        let usable = frame.joints.iter().map(|j| j.is_usable()).collect();
        let bones = topology
            .bones()
            .map(|(child, parent)| [child as u32, parent as u32])
            .collect();

        Self {
            timestamp: frame.timestamp,
            topology: topology.kind,
            vertices,
            usable,
            bones,
            status,
            highlight: status.failing_joint(),
        }
    }

    /// Vertices flattened to `x, y, z, x, y, z, ...` for buffer upload.
    pub fn vertex_buffer(&self) -> Vec<f32> {
        self.vertices.iter().flatten().copied().collect()
    }

    /// Bone indices flattened for an element buffer.
    pub fn index_buffer(&self) -> Vec<u32> {
        self.bones.iter().flatten().copied().collect()
    }
}
