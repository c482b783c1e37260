//! 距离约束
//!
//! 每对父子关节一个约束，按逆质量分配修正量。
//! 逆质量由物理世界缓存（拖拽中的关节临时视为固定）。

use glam::Vec2;

use crate::math::EPSILON;
use crate::skeleton::Joint;

/// 父子关节间的距离约束（arena 下标）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceConstraint {
    pub parent: usize,
    pub child: usize,
    pub rest_length: f32,
}

impl DistanceConstraint {
    pub fn new(parent: usize, child: usize, rest_length: f32) -> Self {
        Self {
            parent,
            child,
            rest_length,
        }
    }

    /// 投影一次，返回修正前的长度误差
    ///
    /// 两端都固定或重合时不做修改。
    pub fn solve(&self, joints: &mut [Joint], inverse_mass: &[f32]) -> f32 {
        let (pa, wa) = (joints[self.parent].position, inverse_mass[self.parent]);
        let (pb, wb) = (joints[self.child].position, inverse_mass[self.child]);
        let w = wa + wb;
        let delta = pb - pa;
        let len = delta.length();
        if w <= 0.0 || len < EPSILON {
            return 0.0;
        }
        let error = len - self.rest_length;
        let correction: Vec2 = delta / len * error / w;
        joints[self.parent].position = pa + correction * wa;
        joints[self.child].position = pb - correction * wb;
        error
    }
}
