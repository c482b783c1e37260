//! CCD 迭代 IK 求解器
//!
//! 设计原则：
//! - 链按 末端 → 基座 排列，基座只作为支点，自身不旋转也不移动
//! - 每个支点把下游骨骼整体旋转，使末端朝向目标
//! - 单步旋转限幅，保证稳定
//! - 支持角度限制

use glam::Vec2;

use super::{IkConfig, IkOutcome};
use crate::math::{self, EPSILON};
use crate::skeleton::{JointId, Skeleton};
use crate::{Result, RigError};

// ============================================================================
// IK 链节点
// ============================================================================

/// 链节点：arena 下标与到链上前一节点（靠近基座一侧）的长度
#[derive(Clone, Copy, Debug)]
struct ChainLink {
    index: usize,
    length: f32,
}

fn resolve_chain(skeleton: &Skeleton, chain: &[JointId]) -> Result<Vec<ChainLink>> {
    let mut links = Vec::with_capacity(chain.len());
    for (k, &id) in chain.iter().enumerate() {
        let index = skeleton.index_of(id).ok_or(RigError::UnknownJoint(id))?;
        let joint = &skeleton.joints()[index];
        let length = match chain.get(k + 1) {
            Some(&toward_base) if joint.bone_length <= EPSILON => {
                let base = skeleton.require(toward_base)?;
                base.position.distance(joint.position)
            }
            _ => joint.bone_length,
        };
        links.push(ChainLink { index, length });
    }
    Ok(links)
}

// ============================================================================
// CCD 求解
// ============================================================================

/// CCD 求解
///
/// `chain` 为 末端在前、基座在后。链长度小于 2 时不做任何修改。
/// 只更新链上关节；链外后代由调用方通过正向运动学更新。
pub fn solve_ccd(
    skeleton: &mut Skeleton,
    chain: &[JointId],
    target: Vec2,
    config: &IkConfig,
) -> Result<IkOutcome> {
    let links = resolve_chain(skeleton, chain)?;
    let Some(end) = links.first().map(|l| l.index) else {
        return Ok(IkOutcome::skipped(0.0));
    };
    let end_distance = |s: &Skeleton| s.joints()[end].position.distance(target);

    if links.len() < 2 || !target.is_finite() {
        return Ok(IkOutcome::skipped(end_distance(skeleton)));
    }

    let mut iterations = 0;
    for _ in 0..config.max_iterations {
        if end_distance(skeleton) <= config.tolerance {
            break;
        }
        iterations += 1;
        for pivot in 1..links.len() {
            solve_pivot(skeleton, &links, pivot, target, config.max_step);
        }
    }

    let distance = end_distance(skeleton);
    let converged = distance <= config.tolerance;
    log::debug!(
        "CCD 求解: 链长 {}, 迭代 {}, 剩余距离 {:.3}, 收敛 {}",
        links.len(),
        iterations,
        distance,
        converged
    );
    Ok(IkOutcome {
        iterations,
        distance,
        converged,
    })
}

/// 单个支点的一次旋转
fn solve_pivot(skeleton: &mut Skeleton, links: &[ChainLink], pivot: usize, target: Vec2, max_step: f32) {
    let joints = skeleton.joints_mut();
    let pivot_pos = joints[links[pivot].index].position;
    let end_pos = joints[links[0].index].position;

    let to_end = end_pos - pivot_pos;
    let to_target = target - pivot_pos;
    if to_end.length_squared() < EPSILON * EPSILON || to_target.length_squared() < EPSILON * EPSILON {
        return;
    }

    let delta = math::wrap_angle(
        math::direction_angle(pivot_pos, target) - math::direction_angle(pivot_pos, end_pos),
    )
    .clamp(-max_step, max_step);
    if delta.abs() < 1e-6 {
        return;
    }

    // 支点之后的第一根骨骼：旋转 + 角度限制
    let first = links[pivot - 1];
    let joint = &mut joints[first.index];
    let old = joint.rotation;
    joint.rotation += delta;
    joint.clamp_to_limit();
    let applied = math::wrap_angle(joint.rotation - old);
    joint.position = pivot_pos + math::unit(joint.rotation) * first.length;

    // 向末端方向传播：下游骨骼随之整体旋转
    for k in (0..pivot - 1).rev() {
        let parent_pos = joints[links[k + 1].index].position;
        let joint = &mut joints[links[k].index];
        joint.rotation += applied;
        joint.position = parent_pos + math::unit(joint.rotation) * links[k].length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{AngleLimit, Joint};

    /// 基座 (0,0) → (10,0) → 末端 (20,0)
    fn arm() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "base", Vec2::ZERO)).unwrap();
        s.add_joint(Joint::new(1, "mid", Vec2::new(10.0, 0.0)).with_parent(0)).unwrap();
        s.add_joint(Joint::new(2, "end", Vec2::new(20.0, 0.0)).with_parent(1)).unwrap();
        s
    }

    const CHAIN: [JointId; 3] = [JointId(2), JointId(1), JointId(0)];

    #[test]
    fn test_ccd_converges() {
        for target in [Vec2::new(12.0, 9.0), Vec2::new(0.0, 15.0), Vec2::new(15.0, -8.0)] {
            let mut s = arm();
            let outcome = solve_ccd(&mut s, &CHAIN, target, &IkConfig::default()).unwrap();
            assert!(outcome.converged, "target {target:?}: {outcome:?}");
            assert!(s.get(JointId(2)).unwrap().position.distance(target) <= 1.0);
        }
    }

    #[test]
    fn test_ccd_on_vertical_chain() {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "base", Vec2::ZERO)).unwrap();
        s.add_joint(Joint::new(1, "mid", Vec2::new(0.0, 10.0)).with_parent(0)).unwrap();
        s.add_joint(Joint::new(2, "end", Vec2::new(0.0, 20.0)).with_parent(1)).unwrap();

        for target in [Vec2::new(3.0, 19.0), Vec2::new(-8.0, 12.0)] {
            let mut s = s.clone();
            let before = s.get(JointId(2)).unwrap().position.distance(target);
            let outcome = solve_ccd(&mut s, &CHAIN, target, &IkConfig::default()).unwrap();
            assert!(outcome.converged, "target {target:?}: {outcome:?}");
            assert!(outcome.distance < before);
            assert!((s.live_length(JointId(1)).unwrap() - 10.0).abs() < 0.1);
            assert!((s.live_length(JointId(2)).unwrap() - 10.0).abs() < 0.1);
        }
    }

    #[test]
    fn test_ccd_preserves_bone_lengths_and_base() {
        let mut s = arm();
        solve_ccd(&mut s, &CHAIN, Vec2::new(-5.0, 12.0), &IkConfig::default()).unwrap();
        assert_eq!(s.get(JointId(0)).unwrap().position, Vec2::ZERO);
        for id in [JointId(1), JointId(2)] {
            let len = s.live_length(id).unwrap();
            assert!((len - 10.0).abs() < 0.1, "bone {id} length {len}");
        }
    }

    #[test]
    fn test_ccd_respects_angle_limit() {
        let mut s = arm();
        s.get_mut(JointId(1)).unwrap().angle_limit = Some(AngleLimit::symmetric(10.0));
        solve_ccd(&mut s, &CHAIN, Vec2::new(0.0, 20.0), &IkConfig::default()).unwrap();
        let mid = s.get(JointId(1)).unwrap();
        assert!(mid.deviation().abs() <= 10f32.to_radians() + 1e-4);
    }

    #[test]
    fn test_short_chain_is_noop() {
        let mut s = arm();
        let outcome = solve_ccd(&mut s, &[JointId(2)], Vec2::new(0.0, 20.0), &IkConfig::default()).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(s.get(JointId(2)).unwrap().position, Vec2::new(20.0, 0.0));
    }

    #[test]
    fn test_unknown_joint_is_error() {
        let mut s = arm();
        let result = solve_ccd(&mut s, &[JointId(2), JointId(8)], Vec2::ZERO, &IkConfig::default());
        assert_eq!(result, Err(RigError::UnknownJoint(JointId(8))));
    }
}
