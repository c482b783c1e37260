//! 骨骼系统 - 关节 arena 设计
//!
//! 核心设计思想：
//! - Joint: 单个关节节点，保存绑定姿态与实时姿态
//! - Skeleton: 以稳定 id 索引的关节 arena，父节点只存 id，子节点按需推导
//!
//! 角度约定：关节的 `rotation` 是父关节指向本关节的骨骼在世界空间中的方向。

mod joint;
mod arena;

pub use joint::{AngleLimit, Joint, JointFlags};
pub use arena::{Ancestors, Skeleton};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// 公共类型定义
// ============================================================================

/// 关节稳定 id
///
/// 同时也是骨骼 id：骨骼 = 父关节 → 本关节的线段。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointId(pub u32);

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for JointId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
