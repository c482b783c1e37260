//! 物理配置
//!
//! 所有参数扁平化，由调用方构造后显式传入 `PhysicsWorld`。

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// 角度约束模式
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AngleConstraintMode: u32 {
        /// 把局部角偏差按 pose_stiffness 拉回绑定姿态（主动布娃娃）
        const POSE_MATCH = 1 << 0;
        /// 把局部角偏差裁剪到关节限制内
        const HARD_LIMIT = 1 << 1;
    }
}

impl Default for AngleConstraintMode {
    fn default() -> Self {
        Self::POSE_MATCH | Self::HARD_LIMIT
    }
}

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    // ========== 模拟参数 ==========
    /// 每帧子步数，默认 8
    pub sub_steps: u32,
    /// 帧时间下限（秒），默认 0.001
    pub min_dt: f32,
    /// 帧时间上限（秒），默认 0.03
    pub max_dt: f32,

    // ========== 重力 ==========
    /// 重力 Y 分量（+Y 向下），默认 980.0
    pub gravity: f32,

    // ========== 速度 ==========
    /// 每个子步的速度保留比例，默认 0.99
    pub damping: f32,
    /// 最大速度（像素/秒），默认 2000.0
    pub max_velocity: f32,

    // ========== 约束 ==========
    /// 距离约束迭代次数，默认 2
    pub distance_iterations: u32,
    /// 姿态回复强度，默认 0.6
    /// 0.0 = 不回复，1.0 = 每个子步完全回到绑定姿态
    pub pose_stiffness: f32,
    pub angle_mode: AngleConstraintMode,

    // ========== 地面 ==========
    /// 地面高度，None 表示没有地面
    pub ground_y: Option<f32>,
    /// 触地时水平速度保留比例，默认 0.8
    pub ground_friction: f32,

    // ========== 拖拽 ==========
    /// 被拖拽关节每个子步向目标靠近的比例，默认 0.35
    pub drag_follow: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            // ====== 模拟参数 ======
            // 子步越多越稳定，8 步在 60 FPS 下足够
            sub_steps: 8,
            min_dt: 0.001,
            // 卡顿时限制单帧时间，避免一次积分过远
            max_dt: 0.03,

            // ====== 重力 ======
            // 精灵以像素为单位
            gravity: 980.0,

            damping: 0.99,
            max_velocity: 2000.0,

            // ====== 约束 ======
            distance_iterations: 2,
            pose_stiffness: 0.6,
            angle_mode: AngleConstraintMode::default(),

            ground_y: None,
            ground_friction: 0.8,

            drag_follow: 0.35,
        }
    }
}

impl PhysicsConfig {
    /// 单个子步的时长
    pub fn sub_step_dt(&self, dt: f32) -> f32 {
        let dt = if dt.is_finite() { dt } else { self.min_dt };
        dt.clamp(self.min_dt, self.max_dt) / self.sub_steps.max(1) as f32
    }

    /// 无重力、无阻尼的配置（测试与纯约束场景）
    pub fn weightless() -> Self {
        Self {
            gravity: 0.0,
            damping: 1.0,
            ..Self::default()
        }
    }
}
