//! 运动学求解
//!
//! - forward: 正向运动学传播
//! - ccd: CCD 迭代 IK（支持角度限制）
//! - two_bone: 余弦定理解析双骨骼 IK
//! - constraint: 角度约束裁剪

mod ccd;
mod constraint;
mod forward;
mod two_bone;

pub use ccd::solve_ccd;
pub use constraint::{apply_angle_constraint, apply_all_angle_constraints};
pub use forward::{forward_kinematics, propagate_from};
pub use two_bone::solve_two_bone;

use serde::{Deserialize, Serialize};

/// IK 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkConfig {
    /// CCD 最大迭代次数，默认 10
    pub max_iterations: u32,
    /// 末端到目标的收敛距离，默认 1.0
    pub tolerance: f32,
    /// CCD 单步最大旋转（弧度），默认 0.5
    pub max_step: f32,
    /// 解析双骨骼 IK 之后是否再应用角度约束，默认 false
    ///
    /// 闭式解之后再裁剪会引起抖动，因此默认关闭。
    pub two_bone_apply_constraints: bool,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tolerance: 1.0,
            max_step: 0.5,
            two_bone_apply_constraints: false,
        }
    }
}

/// IK 求解结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkOutcome {
    /// 实际执行的迭代次数
    pub iterations: u32,
    /// 求解后末端到目标的距离
    pub distance: f32,
    pub converged: bool,
}

impl IkOutcome {
    /// 未执行求解（链太短或输入退化）
    pub(crate) fn skipped(distance: f32) -> Self {
        Self {
            iterations: 0,
            distance,
            converged: false,
        }
    }
}
