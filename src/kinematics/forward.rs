//! 正向运动学

use crate::skeleton::{JointId, Skeleton};
use crate::{Result, RigError};

/// 重新计算所有非根关节的位置
///
/// 根关节保持自身的绝对位置；其余关节
/// `position = parent.position + bone_length × (cos(rotation), sin(rotation))`。
/// arena 为拓扑序，一次顺序遍历即可。
pub fn forward_kinematics(skeleton: &mut Skeleton) {
    let parents: Vec<Option<usize>> = skeleton
        .joints()
        .iter()
        .map(|j| j.parent.and_then(|p| skeleton.index_of(p)))
        .collect();
    let joints = skeleton.joints_mut();
    for (i, parent) in parents.into_iter().enumerate() {
        if let Some(p) = parent {
            let parent_pos = joints[p].position;
            joints[i].place_from(parent_pos);
        }
    }
}

/// 只更新 `id` 的后代
pub fn propagate_from(skeleton: &mut Skeleton, id: JointId) -> Result<()> {
    if !skeleton.contains(id) {
        return Err(RigError::UnknownJoint(id));
    }
    for child in skeleton.descendants(id) {
        let Some(parent_pos) = skeleton.parent(child).map(|p| p.position) else {
            continue;
        };
        if let Some(joint) = skeleton.get_mut(child) {
            joint.place_from(parent_pos);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;
    use glam::Vec2;
    use std::f32::consts::FRAC_PI_2;

    fn chain() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "root", Vec2::new(5.0, 5.0))).unwrap();
        s.add_joint(Joint::new(1, "a", Vec2::new(15.0, 5.0)).with_parent(0)).unwrap();
        s.add_joint(Joint::new(2, "b", Vec2::new(25.0, 5.0)).with_parent(1)).unwrap();
        s
    }

    #[test]
    fn test_forward_kinematics() {
        let mut s = chain();
        s.get_mut(JointId(1)).unwrap().rotation = FRAC_PI_2;
        s.get_mut(JointId(2)).unwrap().rotation = FRAC_PI_2;
        forward_kinematics(&mut s);
        assert!((s.get(JointId(1)).unwrap().position - Vec2::new(5.0, 15.0)).length() < 1e-4);
        assert!((s.get(JointId(2)).unwrap().position - Vec2::new(5.0, 25.0)).length() < 1e-4);
    }

    #[test]
    fn test_root_translation_propagates() {
        let mut s = chain();
        s.get_mut(JointId(0)).unwrap().position = Vec2::new(0.0, 0.0);
        propagate_from(&mut s, JointId(0)).unwrap();
        assert!((s.get(JointId(2)).unwrap().position - Vec2::new(20.0, 0.0)).length() < 1e-4);
        assert_eq!(propagate_from(&mut s, JointId(7)), Err(RigError::UnknownJoint(JointId(7))));
    }
}
