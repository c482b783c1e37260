//! 顶点蒙皮计算
//!
//! 线性混合蒙皮：每个关节一个 `当前 × 绑定⁻¹` 的 2D 仿射矩阵，
//! 顶点按权重混合各矩阵变换后的绑定位置。

mod deform;

pub use deform::skin_mesh;

use glam::Affine2;
use std::collections::HashMap;

use crate::skeleton::{Joint, JointId, Skeleton};

/// 关节的世界仿射变换
#[inline]
fn joint_transform(position: glam::Vec2, rotation: f32) -> Affine2 {
    Affine2::from_angle_translation(rotation, position)
}

/// 绑定姿态 → 当前姿态的蒙皮矩阵
pub fn skinning_matrix(joint: &Joint) -> Affine2 {
    let bind = joint_transform(joint.bind_position, joint.bind_rotation);
    let current = joint_transform(joint.position, joint.rotation);
    current * bind.inverse()
}

/// 每个关节的蒙皮矩阵，每次蒙皮计算一次
pub fn skinning_matrices(skeleton: &Skeleton) -> HashMap<JointId, Affine2> {
    skeleton
        .joints()
        .iter()
        .map(|j| (j.id, skinning_matrix(j)))
        .collect()
}
