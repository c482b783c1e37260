//! 解析双骨骼 IK（余弦定理）
//!
//! root → mid → end 三个关节，root 固定，只改写 mid/end 的位置与旋转。

use glam::Vec2;
use std::f32::consts::PI;

use super::{IkConfig, IkOutcome};
use crate::math::{self, EPSILON};
use crate::skeleton::{JointId, Skeleton};
use crate::{Result, RigError};

/// 目标距离下限
const MIN_REACH: f32 = 0.1;
/// 目标距离上限相对 a+b 的比例，避免完全伸直时的奇异
const MAX_REACH_RATIO: f32 = 0.999;

/// 求解双骨骼 IK
///
/// `bend_positive` 选择弯曲方向：true 时 mid 的局部角为正（逆时针转向 end）。
/// 目标不可达时链条沿目标方向完全伸直。
pub fn solve_two_bone(
    skeleton: &mut Skeleton,
    root: JointId,
    mid: JointId,
    end: JointId,
    target: Vec2,
    bend_positive: bool,
    config: &IkConfig,
) -> Result<IkOutcome> {
    let [ri, mi, ei] = [root, mid, end].map(|id| skeleton.index_of(id).ok_or(RigError::UnknownJoint(id)));
    let (ri, mi, ei) = (ri?, mi?, ei?);

    let joints = skeleton.joints();
    let root_pos = joints[ri].position;
    let a = root_pos.distance(joints[mi].position);
    let b = joints[mi].position.distance(joints[ei].position);

    if a < EPSILON || b < EPSILON || !target.is_finite() {
        return Ok(IkOutcome::skipped(joints[ei].position.distance(target)));
    }

    let max_reach = MAX_REACH_RATIO * (a + b);
    let c = root_pos.distance(target).clamp(MIN_REACH.min(max_reach), max_reach);

    let alpha = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0).acos();
    let beta = ((a * a + b * b - c * c) / (2.0 * a * b)).clamp(-1.0, 1.0).acos();
    let sign = if bend_positive { 1.0 } else { -1.0 };

    let base_angle = math::direction_angle(root_pos, target);
    let root_angle = base_angle - sign * alpha;
    let mid_local = sign * (PI - beta);

    let joints = skeleton.joints_mut();
    joints[mi].rotation = root_angle;
    joints[ei].rotation = root_angle + mid_local;
    if config.two_bone_apply_constraints {
        joints[mi].clamp_to_limit();
        joints[ei].clamp_to_limit();
    }
    let mid_pos = root_pos + math::unit(joints[mi].rotation) * a;
    joints[mi].position = mid_pos;
    joints[ei].position = mid_pos + math::unit(joints[ei].rotation) * b;

    let distance = joints[ei].position.distance(target);
    log::debug!(
        "双骨骼 IK: a={:.2}, b={:.2}, c={:.2}, 剩余距离 {:.3}",
        a,
        b,
        c,
        distance
    );
    Ok(IkOutcome {
        iterations: 1,
        distance,
        converged: distance <= config.tolerance,
    })
}
