//! Sprite Rig - 2D 精灵骨骼绑定与变形核心
//!
//! 提供的功能：
//! - 骨骼模型（关节层级、绑定姿态与实时姿态）
//! - 网格模型（顶点、三角形、骨骼权重）
//! - 自动权重计算（区域隔离 + 透明度屏障）
//! - 运动学求解（FK、CCD IK、解析双骨骼 IK、角度约束）
//! - Verlet 物理布娃娃
//! - 线性混合蒙皮

pub mod kinematics;
pub mod math;
pub mod mesh;
pub mod physics;
pub mod rig;
pub mod skeleton;
pub mod skinning;
pub mod weights;

pub use kinematics::{IkConfig, IkOutcome};
pub use mesh::{Mesh, Triangle, Vertex, VertexId, WeightMap};
pub use physics::{AngleConstraintMode, PhysicsConfig, PhysicsWorld, StepReport};
pub use rig::{PoseMode, Rig};
pub use skeleton::{AngleLimit, Joint, JointFlags, JointId, Skeleton};
pub use skinning::skin_mesh;
pub use weights::{compute_weights, AlphaMask, Region, RegionTemplate, Silhouette, WeightConfig, WeightReport};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("duplicate joint id {0}")]
    DuplicateJoint(JointId),

    #[error("unknown joint id {0}")]
    UnknownJoint(JointId),

    #[error("joint {joint} references unknown parent {parent}")]
    UnknownParent { joint: JointId, parent: JointId },

    #[error("joint {0} is part of a parent cycle")]
    ParentCycle(JointId),

    #[error("duplicate vertex id {0}")]
    DuplicateVertex(VertexId),

    #[error("unknown vertex id {0}")]
    UnknownVertex(VertexId),

    #[error("triangle repeats vertex {0}")]
    DegenerateTriangle(VertexId),

    #[error("invalid alpha mask: {0}")]
    InvalidMask(String),
}

pub type Result<T> = std::result::Result<T, RigError>;
