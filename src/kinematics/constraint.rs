//! 角度约束
//!
//! 偏差 = rotation − bind_rotation，先归一化到 [-π, π] 再裁剪到
//! [min_angle, max_angle]，最后 rotation = bind_rotation + 裁剪后的偏差。

use crate::skeleton::{JointId, Skeleton};
use crate::{Result, RigError};

/// 对单个关节应用角度约束，返回是否发生裁剪
pub fn apply_angle_constraint(skeleton: &mut Skeleton, id: JointId) -> Result<bool> {
    let joint = skeleton.get_mut(id).ok_or(RigError::UnknownJoint(id))?;
    Ok(joint.clamp_to_limit())
}

/// 对所有关节应用角度约束，返回被裁剪的关节数
///
/// 只修改旋转，调用方需要随后执行正向运动学。
pub fn apply_all_angle_constraints(skeleton: &mut Skeleton) -> usize {
    skeleton
        .joints_mut()
        .iter_mut()
        .filter(|j| !j.is_root())
        .map(|j| j.clamp_to_limit())
        .filter(|clamped| *clamped)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{AngleLimit, Joint};
    use glam::Vec2;

    #[test]
    fn test_apply_all_angle_constraints() {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "root", Vec2::ZERO)).unwrap();
        s.add_joint(Joint::new(1, "a", Vec2::new(10.0, 0.0)).with_parent(0).with_limit(AngleLimit::symmetric(45.0)))
            .unwrap();
        s.add_joint(Joint::new(2, "b", Vec2::new(20.0, 0.0)).with_parent(1)).unwrap();
        s.get_mut(JointId(1)).unwrap().rotation = 2.0;
        s.get_mut(JointId(2)).unwrap().rotation = 2.0;

        assert_eq!(apply_all_angle_constraints(&mut s), 1);
        assert!((s.get(JointId(1)).unwrap().rotation - 45f32.to_radians()).abs() < 1e-5);
        // 没有限制的关节不受影响
        assert_eq!(s.get(JointId(2)).unwrap().rotation, 2.0);
        assert_eq!(apply_angle_constraint(&mut s, JointId(1)), Ok(false));
        assert!(apply_angle_constraint(&mut s, JointId(9)).is_err());
    }
}
