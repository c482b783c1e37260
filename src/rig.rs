//! 绑定会话
//!
//! Rig 持有骨骼与网格，把拖拽输入路由到 IK 或物理，
//! 每次姿态变化后重新蒙皮并设置脏标记，由渲染方轮询。

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::kinematics::{self, IkConfig};
use crate::math::EPSILON;
use crate::mesh::Mesh;
use crate::physics::{PhysicsConfig, PhysicsWorld, StepReport};
use crate::skeleton::{JointId, Skeleton};
use crate::skinning::skin_mesh;
use crate::weights::{self, RegionTemplate, Silhouette, WeightConfig, WeightReport};
use crate::{Result, RigError};

/// 姿态驱动模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseMode {
    /// IK 驱动
    #[default]
    Kinematic,
    /// 物理驱动
    Physics,
}

/// 绑定会话
pub struct Rig {
    skeleton: Skeleton,
    mesh: Mesh,
    pub weight_config: WeightConfig,
    pub ik_config: IkConfig,
    /// 下次进入物理模式时生效
    pub physics_config: PhysicsConfig,
    mode: PoseMode,
    world: Option<PhysicsWorld>,
    drag: Option<JointId>,
    dirty: bool,
}

impl Rig {
    /// 创建会话
    ///
    /// 非根关节的绑定旋转与实时旋转由位置推导，随后执行一次蒙皮。
    pub fn new(mut skeleton: Skeleton, mut mesh: Mesh) -> Self {
        skeleton.rederive_bind_rotations();
        skeleton.refresh_rotations();
        skin_mesh(&skeleton, &mut mesh);
        Self {
            skeleton,
            mesh,
            weight_config: WeightConfig::default(),
            ik_config: IkConfig::default(),
            physics_config: PhysicsConfig::default(),
            mode: PoseMode::Kinematic,
            world: None,
            drag: None,
            dirty: true,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[inline]
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    #[inline]
    pub fn mode(&self) -> PoseMode {
        self.mode
    }

    /// 当前拖拽的关节
    #[inline]
    pub fn dragged(&self) -> Option<JointId> {
        self.drag
    }

    pub fn into_parts(self) -> (Skeleton, Mesh) {
        (self.skeleton, self.mesh)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 返回并清除脏标记
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ========================================
    // 权重与绑定
    // ========================================

    /// 自动计算权重并重新蒙皮
    pub fn compute_weights(
        &mut self,
        template: Option<&RegionTemplate>,
        silhouette: Option<&dyn Silhouette>,
    ) -> WeightReport {
        let report =
            weights::compute_weights(&mut self.mesh, &self.skeleton, template, silhouette, &self.weight_config);
        self.refresh();
        report
    }

    /// 以当前姿态作为新的绑定姿态
    ///
    /// 重新推导骨骼长度，顶点回到绑定位置。物理模式下重建物理世界。
    pub fn rebind(&mut self) {
        self.skeleton.capture_bind_pose();
        self.mesh.reset_to_bind_pose();
        if self.mode == PoseMode::Physics {
            self.drag = None;
            self.world = Some(self.build_world());
        }
        log::info!("重新绑定: {} 关节, {} 顶点", self.skeleton.len(), self.mesh.len());
        self.refresh();
    }

    /// 恢复绑定姿态
    pub fn reset_pose(&mut self) {
        match self.world.as_mut() {
            Some(world) => world.reset(&mut self.skeleton),
            None => self.skeleton.reset_to_bind_pose(),
        }
        self.drag = None;
        self.refresh();
    }

    // ========================================
    // 模式
    // ========================================

    /// 切换模式：进入物理模式创建物理世界，离开时丢弃
    pub fn set_mode(&mut self, mode: PoseMode) {
        if self.mode == mode {
            return;
        }
        self.on_drag_end();
        self.world = match mode {
            PoseMode::Physics => Some(self.build_world()),
            PoseMode::Kinematic => None,
        };
        self.mode = mode;
        log::debug!("姿态模式切换为 {:?}", mode);
    }

    /// 物理世界以当前姿态为静止姿态，蒙皮仍使用原绑定旋转
    fn build_world(&mut self) -> PhysicsWorld {
        let bind: Vec<f32> = self.skeleton.joints().iter().map(|j| j.bind_rotation).collect();
        let world = PhysicsWorld::new(&mut self.skeleton, self.physics_config.clone());
        for (joint, rotation) in self.skeleton.joints_mut().iter_mut().zip(bind) {
            joint.bind_rotation = rotation;
        }
        world
    }

    /// 推进物理一帧，IK 模式下返回 None
    pub fn tick(&mut self, dt: f32) -> Option<StepReport> {
        let world = self.world.as_mut()?;
        let report = world.step(&mut self.skeleton, dt);
        self.refresh();
        Some(report)
    }

    // ========================================
    // 拖拽
    // ========================================

    pub fn on_drag_start(&mut self, joint: JointId, point: Vec2) -> Result<()> {
        if !self.skeleton.contains(joint) {
            return Err(RigError::UnknownJoint(joint));
        }
        self.drag = Some(joint);
        match self.world.as_mut() {
            Some(world) => world.start_dragging(&self.skeleton, joint, point),
            None => self.drag_kinematic(joint, point),
        }
    }

    /// 没有拖拽或坐标非法时忽略
    pub fn on_drag_move(&mut self, point: Vec2) -> Result<()> {
        let Some(joint) = self.drag else {
            return Ok(());
        };
        if !point.is_finite() {
            return Ok(());
        }
        match self.world.as_mut() {
            Some(world) => {
                world.update_drag_target(point);
                Ok(())
            }
            None => self.drag_kinematic(joint, point),
        }
    }

    pub fn on_drag_end(&mut self) {
        self.drag = None;
        if let Some(world) = self.world.as_mut() {
            world.stop_dragging();
        }
    }

    /// IK 模式拖拽
    ///
    /// 根关节连同子树平移；三关节链用解析双骨骼 IK，其余用 CCD。
    fn drag_kinematic(&mut self, joint: JointId, point: Vec2) -> Result<()> {
        if !point.is_finite() {
            return Ok(());
        }
        if self.skeleton.require(joint)?.is_root() {
            if let Some(root) = self.skeleton.get_mut(joint) {
                root.position = point;
            }
            kinematics::propagate_from(&mut self.skeleton, joint)?;
            self.refresh();
            return Ok(());
        }

        let chain = self.skeleton.chain_for(joint);
        let outcome = match chain.as_slice() {
            [end, mid, root] => {
                let bend_positive = self.current_bend(*root, *mid, *end) >= 0.0;
                kinematics::solve_two_bone(
                    &mut self.skeleton,
                    *root,
                    *mid,
                    *end,
                    point,
                    bend_positive,
                    &self.ik_config,
                )?
            }
            _ => kinematics::solve_ccd(&mut self.skeleton, &chain, point, &self.ik_config)?,
        };
        log::trace!("拖拽 {}: 剩余距离 {:.2}", joint, outcome.distance);

        kinematics::forward_kinematics(&mut self.skeleton);
        self.refresh();
        Ok(())
    }

    /// 当前弯曲方向：两段骨骼方向的叉积
    fn current_bend(&self, root: JointId, mid: JointId, end: JointId) -> f32 {
        let pos = |id| self.skeleton.get(id).map(|j| j.position).unwrap_or_default();
        let upper = pos(mid) - pos(root);
        let lower = pos(end) - pos(mid);
        let cross = upper.perp_dot(lower);
        if cross.abs() < EPSILON {
            0.0
        } else {
            cross
        }
    }

    fn refresh(&mut self) {
        skin_mesh(&self.skeleton, &mut self.mesh);
        self.dirty = true;
    }
}
