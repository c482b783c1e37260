//! Verlet 物理世界
//!
//! 流程：new（初始化）→ 每帧 step → 丢弃即停止。
//! 每个子步：积分 → 拖拽 → 距离约束 → 角度约束 → 地面碰撞。

use glam::Vec2;

use super::config::{AngleConstraintMode, PhysicsConfig};
use super::constraint::DistanceConstraint;
use crate::math::{self, EPSILON};
use crate::skeleton::{JointId, Skeleton};
use crate::{Result, RigError};

/// 单次 step 的统计
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    /// 实际执行的子步数
    pub sub_steps: u32,
    /// 本帧关节的最大位移
    pub max_displacement: f32,
    /// 非有限值回退次数
    pub recovered: usize,
}

/// 拖拽状态
#[derive(Clone, Copy, Debug)]
struct DragState {
    index: usize,
    target: Vec2,
    /// 拖拽前的逆质量，结束时恢复
    inverse_mass: f32,
}

/// 物理世界
///
/// 只保存约束与缓存，关节状态始终存放在 `Skeleton` 中。
/// 骨骼拓扑改变后需要重新创建。
pub struct PhysicsWorld {
    config: PhysicsConfig,
    constraints: Vec<DistanceConstraint>,
    /// 父关节下标（arena 顺序）
    parents: Vec<Option<usize>>,
    /// 子关节下标
    children: Vec<Vec<usize>>,
    /// 绑定时的局部角
    bind_local: Vec<f32>,
    inverse_mass: Vec<f32>,
    drag: Option<DragState>,
}

impl PhysicsWorld {
    /// 初始化物理世界
    ///
    /// 以当前位置推导非根关节的绑定旋转，清零速度，
    /// 为每对父子关节建立距离约束。
    pub fn new(skeleton: &mut Skeleton, config: PhysicsConfig) -> Self {
        let parents: Vec<Option<usize>> = skeleton
            .joints()
            .iter()
            .map(|j| j.parent.and_then(|p| skeleton.index_of(p)))
            .collect();
        let children = skeleton.children_cache();

        for (i, parent) in parents.iter().enumerate() {
            let parent_pos = parent.map(|p| skeleton.joints()[p].position);
            let joint = &mut skeleton.joints_mut()[i];
            if let Some(parent_pos) = parent_pos {
                if parent_pos.distance_squared(joint.position) > EPSILON * EPSILON {
                    joint.bind_rotation = math::direction_angle(parent_pos, joint.position);
                    joint.rotation = joint.bind_rotation;
                }
            }
            joint.previous_position = joint.position;
        }

        let joints = skeleton.joints();
        let constraints: Vec<DistanceConstraint> = parents
            .iter()
            .enumerate()
            .filter_map(|(i, parent)| {
                let p = (*parent)?;
                let rest = if joints[i].bone_length > EPSILON {
                    joints[i].bone_length
                } else {
                    joints[p].position.distance(joints[i].position)
                };
                Some(DistanceConstraint::new(p, i, rest))
            })
            .collect();

        let bind_local = parents
            .iter()
            .enumerate()
            .map(|(i, parent)| match parent {
                Some(p) => math::wrap_angle(joints[i].bind_rotation - joints[*p].bind_rotation),
                None => 0.0,
            })
            .collect();
        let inverse_mass = joints.iter().map(|j| j.inverse_mass()).collect();

        let anchored = joints.iter().filter(|j| j.is_anchored()).count();
        log::info!(
            "物理世界创建: {} 关节 ({} 固定), {} 距离约束, 子步 {}, 重力 {}",
            joints.len(),
            anchored,
            constraints.len(),
            config.sub_steps,
            config.gravity
        );

        Self {
            config,
            constraints,
            parents,
            children,
            bind_local,
            inverse_mass,
            drag: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PhysicsConfig) {
        self.config = config;
    }

    #[inline]
    pub fn constraints(&self) -> &[DistanceConstraint] {
        &self.constraints
    }

    // ========================================
    // 拖拽
    // ========================================

    /// 开始拖拽，拖拽中的关节在约束中视为固定
    pub fn start_dragging(&mut self, skeleton: &Skeleton, joint: JointId, target: Vec2) -> Result<()> {
        let index = skeleton.index_of(joint).ok_or(RigError::UnknownJoint(joint))?;
        if index >= self.inverse_mass.len() {
            return Err(RigError::UnknownJoint(joint));
        }
        self.stop_dragging();
        self.drag = Some(DragState {
            index,
            target,
            inverse_mass: self.inverse_mass[index],
        });
        self.inverse_mass[index] = 0.0;
        log::debug!("开始拖拽关节 {}", joint);
        Ok(())
    }

    /// 更新拖拽目标，没有拖拽时忽略
    pub fn update_drag_target(&mut self, target: Vec2) {
        if let Some(drag) = self.drag.as_mut() {
            if target.is_finite() {
                drag.target = target;
            }
        }
    }

    pub fn stop_dragging(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.inverse_mass[drag.index] = drag.inverse_mass;
        }
    }

    #[inline]
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    // ========================================
    // 模拟
    // ========================================

    /// 恢复绑定姿态并清零速度
    pub fn reset(&mut self, skeleton: &mut Skeleton) {
        self.stop_dragging();
        skeleton.reset_to_bind_pose();
    }

    /// 推进一帧
    ///
    /// `dt` 被限制在 [min_dt, max_dt] 并均分为 `sub_steps` 个子步。
    /// 结束后根据位置刷新非根关节的旋转。
    pub fn step(&mut self, skeleton: &mut Skeleton, dt: f32) -> StepReport {
        if skeleton.len() != self.parents.len() {
            log::warn!(
                "骨骼关节数 {} 与物理世界 {} 不一致，跳过模拟",
                skeleton.len(),
                self.parents.len()
            );
            return StepReport::default();
        }
        if skeleton.is_empty() {
            return StepReport::default();
        }

        let h = self.config.sub_step_dt(dt);
        let sub_steps = self.config.sub_steps.max(1);
        let start: Vec<Vec2> = skeleton.joints().iter().map(|j| j.position).collect();

        let mut recovered = 0;
        for _ in 0..sub_steps {
            recovered += self.integrate(skeleton, h);
            self.follow_drag(skeleton);
            for _ in 0..self.config.distance_iterations {
                for c in &self.constraints {
                    c.solve(skeleton.joints_mut(), &self.inverse_mass);
                }
            }
            self.apply_angle_constraints(skeleton);
            self.collide_ground(skeleton);
            recovered += self.revert_non_finite(skeleton, &start);
        }

        skeleton.refresh_rotations();

        let max_displacement = skeleton
            .joints()
            .iter()
            .zip(&start)
            .map(|(j, s)| j.position.distance(*s))
            .fold(0.0, f32::max);
        if recovered > 0 {
            log::warn!("物理数值不稳定，已回退 {} 次", recovered);
        }

        StepReport {
            sub_steps,
            max_displacement,
            recovered,
        }
    }

    /// Verlet 积分，返回回退次数
    fn integrate(&self, skeleton: &mut Skeleton, h: f32) -> usize {
        let max_step = self.config.max_velocity * h;
        let gravity = Vec2::new(0.0, self.config.gravity * h * h);
        let mut recovered = 0;

        for (i, joint) in skeleton.joints_mut().iter_mut().enumerate() {
            if self.inverse_mass[i] <= 0.0 {
                joint.previous_position = joint.position;
                continue;
            }
            let old = joint.position;
            let velocity = (old - joint.previous_position).clamp_length_max(max_step) * self.config.damping;
            let new = old + velocity + gravity;
            if new.is_finite() {
                joint.previous_position = old;
                joint.position = new;
            } else {
                // 速度归零
                let fallback = if old.is_finite() { old } else { joint.bind_position };
                joint.position = fallback;
                joint.previous_position = fallback;
                recovered += 1;
            }
        }
        recovered
    }

    fn follow_drag(&self, skeleton: &mut Skeleton) {
        let Some(drag) = self.drag else {
            return;
        };
        let joint = &mut skeleton.joints_mut()[drag.index];
        let old = joint.position;
        joint.position = old + (drag.target - old) * self.config.drag_follow;
        joint.previous_position = old;
    }

    /// 角度约束（拓扑序）
    ///
    /// 修正量使关节连同后代绕父关节整体旋转，骨骼长度不变。
    /// 固定关节不旋转；拖拽中的关节只受硬限制，不做姿态回归。
    /// 后代中的固定或拖拽关节保持原位，其子树也不随之旋转。
    fn apply_angle_constraints(&self, skeleton: &mut Skeleton) {
        let mode = self.config.angle_mode;
        if mode.is_empty() {
            return;
        }
        let stiffness = self.config.pose_stiffness.clamp(0.0, 1.0);
        let dragged = self.drag.map(|d| d.index);
        let mut stack = Vec::new();

        for i in 0..self.parents.len() {
            let Some(p) = self.parents[i] else {
                continue;
            };
            let joints = skeleton.joints();
            if joints[i].is_anchored() {
                continue;
            }
            let pivot = joints[p].position;
            if pivot.distance_squared(joints[i].position) < EPSILON * EPSILON {
                continue;
            }
            let parent_angle = match self.parents[p] {
                Some(pp) => math::direction_angle(joints[pp].position, pivot),
                None => joints[p].rotation,
            };
            let local = math::wrap_angle(math::direction_angle(pivot, joints[i].position) - parent_angle);
            let deviation = math::wrap_angle(local - self.bind_local[i]);

            let mut target = deviation;
            if mode.contains(AngleConstraintMode::POSE_MATCH) && dragged != Some(i) {
                target *= 1.0 - stiffness;
            }
            if mode.contains(AngleConstraintMode::HARD_LIMIT) {
                if let Some(limit) = joints[i].angle_limit {
                    target = limit.clamp_radians(target);
                }
            }
            let correction = target - deviation;
            if correction.abs() < 1e-7 {
                continue;
            }

            // 连同后代一起旋转
            let joints = skeleton.joints_mut();
            stack.clear();
            stack.push(i);
            while let Some(k) = stack.pop() {
                if k != i && self.inverse_mass[k] <= 0.0 {
                    continue;
                }
                joints[k].position = math::rotate_about(joints[k].position, pivot, correction);
                stack.extend_from_slice(&self.children[k]);
            }
        }
    }

    fn collide_ground(&self, skeleton: &mut Skeleton) {
        let Some(ground) = self.config.ground_y else {
            return;
        };
        let friction = self.config.ground_friction;
        for (i, joint) in skeleton.joints_mut().iter_mut().enumerate() {
            if self.inverse_mass[i] <= 0.0 || joint.position.y <= ground {
                continue;
            }
            let vx = joint.position.x - joint.previous_position.x;
            joint.position.y = ground;
            joint.previous_position = Vec2::new(joint.position.x - vx * friction, ground);
        }
    }

    /// 约束后出现非有限值时回退到本帧起点
    fn revert_non_finite(&self, skeleton: &mut Skeleton, start: &[Vec2]) -> usize {
        let mut recovered = 0;
        for (joint, s) in skeleton.joints_mut().iter_mut().zip(start) {
            if !joint.position.is_finite() {
                let fallback = if s.is_finite() { *s } else { joint.bind_position };
                joint.position = fallback;
                joint.previous_position = fallback;
                recovered += 1;
            }
        }
        recovered
    }
}
