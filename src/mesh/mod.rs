//! 网格模型 - 顶点、三角形与骨骼权重

mod store;

pub use store::Mesh;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::skeleton::JointId;

/// 顶点骨骼权重：骨骼 id → 权重（稀疏，按 id 有序）
pub type WeightMap = BTreeMap<JointId, f32>;

/// 顶点稳定 id
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for VertexId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// 网格顶点
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    /// 绑定时的位置
    pub bind_position: Vec2,
    /// 源图像采样坐标（固定）
    pub texture_coordinate: Vec2,
    /// 变形后的位置，每次蒙皮重写
    #[serde(skip)]
    pub current_position: Vec2,
    #[serde(default)]
    pub weights: WeightMap,
}

impl Vertex {
    /// 创建顶点，纹理坐标默认等于绑定位置
    pub fn new(id: impl Into<VertexId>, bind_position: Vec2) -> Self {
        Self {
            id: id.into(),
            bind_position,
            texture_coordinate: bind_position,
            current_position: bind_position,
            weights: WeightMap::new(),
        }
    }

    pub fn with_texture_coordinate(mut self, uv: Vec2) -> Self {
        self.texture_coordinate = uv;
        self
    }

    #[inline]
    pub fn weight_sum(&self) -> f32 {
        self.weights.values().sum()
    }

    /// 权重最大的骨骼
    pub fn dominant_bone(&self) -> Option<JointId> {
        self.weights
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, _)| *id)
    }
}

/// 三角形（只用于拓扑邻接和渲染）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [VertexId; 3],
}

impl Triangle {
    pub fn new(a: impl Into<VertexId>, b: impl Into<VertexId>, c: impl Into<VertexId>) -> Self {
        Self {
            vertices: [a.into(), b.into(), c.into()],
        }
    }
}
