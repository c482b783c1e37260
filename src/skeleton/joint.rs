//! 关节节点
//!
//! Joint 是骨骼系统的核心单元，每个 Joint 代表层级中的一个节点，
//! 同时代表从父关节指向它的那根骨骼。

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::JointId;
use crate::math::{self, EPSILON};

// ============================================================================
// 关节标志
// ============================================================================

bitflags! {
    /// 关节标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct JointFlags: u32 {
        /// 物理中固定（无限质量）
        const ANCHORED = 1 << 0;
        /// IK 链查找在此截止，该关节作为链的固定基座
        const IK_LOCKED = 1 << 1;
    }
}

// ============================================================================
// 角度限制
// ============================================================================

/// 角度限制（度），相对绑定旋转的偏差
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngleLimit {
    pub min_deg: f32,
    pub max_deg: f32,
}

impl AngleLimit {
    pub fn new(min_deg: f32, max_deg: f32) -> Self {
        if min_deg <= max_deg {
            Self { min_deg, max_deg }
        } else {
            Self { min_deg: max_deg, max_deg: min_deg }
        }
    }

    /// 对称限制 [-deg, deg]
    pub fn symmetric(deg: f32) -> Self {
        Self::new(-deg.abs(), deg.abs())
    }

    /// 将偏差（弧度）限制到范围内
    #[inline]
    pub fn clamp_radians(&self, deviation: f32) -> f32 {
        deviation.clamp(self.min_deg.to_radians(), self.max_deg.to_radians())
    }
}

// ============================================================================
// 关节节点
// ============================================================================

/// 关节节点
///
/// - 静态数据：id、名称、父关节、绑定姿态、骨骼长度、限制
/// - 动态数据：实时位置/旋转与 Verlet 状态
///
/// `bone_length` 只在重新绑定时根据绑定位置重新推导，
/// 姿态求解和物理模拟都不会修改它。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    // ========================================
    // 静态数据
    // ========================================
    pub id: JointId,

    pub name: String,

    /// 父关节 id（None 表示根关节）
    pub parent: Option<JointId>,

    /// 绑定位置（世界空间）
    pub bind_position: Vec2,

    /// 绑定旋转（弧度）
    pub bind_rotation: f32,

    /// 到父关节的距离
    pub bone_length: f32,

    #[serde(default)]
    pub angle_limit: Option<AngleLimit>,

    /// IK 链名称，同名的相连关节组成一条可独立求解的肢体链
    #[serde(default)]
    pub ik_chain: Option<String>,

    #[serde(default = "default_mass")]
    pub mass: f32,

    #[serde(default)]
    pub flags: JointFlags,

    // ========================================
    // 动态数据
    // ========================================
    pub position: Vec2,

    pub rotation: f32,

    /// 上一步位置（Verlet 隐式速度）
    #[serde(default)]
    pub previous_position: Vec2,
}

fn default_mass() -> f32 {
    1.0
}

impl Joint {
    /// 创建新关节，实时姿态与绑定姿态一致
    pub fn new(id: impl Into<JointId>, name: impl Into<String>, position: Vec2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent: None,
            bind_position: position,
            bind_rotation: 0.0,
            bone_length: 0.0,
            angle_limit: None,
            ik_chain: None,
            mass: 1.0,
            flags: JointFlags::empty(),
            position,
            rotation: 0.0,
            previous_position: position,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<JointId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.bind_rotation = rotation;
        self.rotation = rotation;
        self
    }

    pub fn with_limit(mut self, limit: AngleLimit) -> Self {
        self.angle_limit = Some(limit);
        self
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.ik_chain = Some(chain.into());
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn anchored(mut self) -> Self {
        self.flags.insert(JointFlags::ANCHORED);
        self
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.flags.contains(JointFlags::ANCHORED)
    }

    #[inline]
    pub fn set_anchored(&mut self, anchored: bool) {
        self.flags.set(JointFlags::ANCHORED, anchored);
    }

    /// 逆质量，固定关节为 0
    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        if self.is_anchored() {
            0.0
        } else if self.mass > EPSILON && self.mass.is_finite() {
            1.0 / self.mass
        } else {
            1.0
        }
    }

    /// 当前旋转相对绑定旋转的偏差，归一化到 [-π, π]
    #[inline]
    pub fn deviation(&self) -> f32 {
        math::wrap_angle(self.rotation - self.bind_rotation)
    }

    /// 应用角度限制：旋转 = 绑定旋转 + 限制后的偏差
    ///
    /// 没有限制时不做任何修改。返回是否发生了裁剪。
    pub fn clamp_to_limit(&mut self) -> bool {
        let Some(limit) = self.angle_limit else {
            return false;
        };
        let deviation = self.deviation();
        let clamped = limit.clamp_radians(deviation);
        if clamped == deviation {
            return false;
        }
        self.rotation = self.bind_rotation + clamped;
        true
    }

    /// 根据父关节位置和自身旋转放置关节（FK 单步）
    #[inline]
    pub fn place_from(&mut self, parent_position: Vec2) {
        self.position = parent_position + math::unit(self.rotation) * self.bone_length;
    }

    /// 重置为绑定姿态
    pub fn reset_to_bind(&mut self) {
        self.position = self.bind_position;
        self.rotation = self.bind_rotation;
        self.previous_position = self.bind_position;
    }
}
