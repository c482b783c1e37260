//! 骨骼 arena
//!
//! 关节按插入顺序存放，父关节总在子关节之前（拓扑序），
//! 因此按下标顺序遍历即可完成自上而下的传播。

use glam::Vec2;
use std::collections::HashMap;

use super::{Joint, JointFlags, JointId};
use crate::math::{self, EPSILON};
use crate::{Result, RigError};

/// 骨骼：关节 arena + id 索引
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    joints: Vec<Joint>,
    index: HashMap<JointId, usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加关节
    ///
    /// 父关节必须已存在。有父关节时：
    /// - `bone_length` 为 0 则根据绑定位置推导长度
    /// - 未指定旋转（绑定与实时旋转均为 0）则取父关节指向本关节的方向
    pub fn add_joint(&mut self, mut joint: Joint) -> Result<JointId> {
        if self.index.contains_key(&joint.id) {
            return Err(RigError::DuplicateJoint(joint.id));
        }
        if let Some(parent_id) = joint.parent {
            let parent = self.get(parent_id).ok_or(RigError::UnknownParent {
                joint: joint.id,
                parent: parent_id,
            })?;
            let parent_bind = parent.bind_position;
            if joint.bone_length <= EPSILON {
                joint.bone_length = parent_bind.distance(joint.bind_position);
            }
            let unrotated = joint.bind_rotation == 0.0 && joint.rotation == 0.0;
            if unrotated && parent_bind.distance_squared(joint.bind_position) > EPSILON * EPSILON {
                joint.bind_rotation = math::direction_angle(parent_bind, joint.bind_position);
                joint.rotation = joint.bind_rotation;
            }
        }
        let id = joint.id;
        self.index.insert(id, self.joints.len());
        self.joints.push(joint);
        Ok(id)
    }

    /// 从任意顺序的关节列表重建骨骼（持久化往返）
    ///
    /// 关节会被重新排成拓扑序，存储的骨骼长度原样保留。
    pub fn from_joints(joints: Vec<Joint>) -> Result<Self> {
        let mut by_id: HashMap<JointId, Joint> = HashMap::with_capacity(joints.len());
        let mut order: Vec<JointId> = Vec::with_capacity(joints.len());
        for joint in joints {
            let id = joint.id;
            if by_id.insert(id, joint).is_some() {
                return Err(RigError::DuplicateJoint(id));
            }
            order.push(id);
        }
        for id in &order {
            if let Some(parent) = by_id[id].parent {
                if !by_id.contains_key(&parent) {
                    return Err(RigError::UnknownParent { joint: *id, parent });
                }
            }
        }

        // 0 = 未访问, 1 = 访问中, 2 = 完成
        let mut state: HashMap<JointId, u8> = HashMap::with_capacity(order.len());
        let mut sorted: Vec<JointId> = Vec::with_capacity(order.len());
        for &start in &order {
            if state.get(&start).copied() == Some(2) {
                continue;
            }
            // 沿父链向上收集未完成的祖先
            let mut path = Vec::new();
            let mut cur = Some(start);
            while let Some(id) = cur {
                match state.get(&id).copied() {
                    Some(2) => break,
                    Some(1) => return Err(RigError::ParentCycle(id)),
                    _ => {}
                }
                state.insert(id, 1);
                path.push(id);
                cur = by_id[&id].parent;
            }
            for id in path.into_iter().rev() {
                state.insert(id, 2);
                sorted.push(id);
            }
        }

        let mut skeleton = Self::new();
        for id in sorted {
            if let Some(joint) = by_id.remove(&id) {
                skeleton.index.insert(id, skeleton.joints.len());
                skeleton.joints.push(joint);
            }
        }
        Ok(skeleton)
    }

    pub fn clear(&mut self) {
        self.joints.clear();
        self.index.clear();
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: JointId) -> bool {
        self.index.contains_key(&id)
    }

    #[inline]
    pub fn index_of(&self, id: JointId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    #[inline]
    pub fn get(&self, id: JointId) -> Option<&Joint> {
        self.index_of(id).map(|i| &self.joints[i])
    }

    #[inline]
    pub fn get_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        self.index_of(id).map(move |i| &mut self.joints[i])
    }

    /// 获取关节，不存在时返回 `UnknownJoint`
    pub fn require(&self, id: JointId) -> Result<&Joint> {
        self.get(id).ok_or(RigError::UnknownJoint(id))
    }

    /// 拓扑序的关节切片
    #[inline]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// 可变关节切片（不能改变 id 与父关系）
    #[inline]
    pub fn joints_mut(&mut self) -> &mut [Joint] {
        &mut self.joints
    }

    pub fn ids(&self) -> impl Iterator<Item = JointId> + '_ {
        self.joints.iter().map(|j| j.id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|j| j.name == name)
    }

    pub fn parent(&self, id: JointId) -> Option<&Joint> {
        self.get(id)?.parent.and_then(|p| self.get(p))
    }

    /// 子关节（按需推导）
    pub fn children(&self, id: JointId) -> Vec<JointId> {
        self.joints
            .iter()
            .filter(|j| j.parent == Some(id))
            .map(|j| j.id)
            .collect()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Joint> + '_ {
        self.joints.iter().filter(|j| j.is_root())
    }

    /// 祖先链（不含自身），由近到远
    pub fn ancestors(&self, id: JointId) -> Ancestors<'_> {
        Ancestors {
            skeleton: self,
            next: self.get(id).and_then(|j| j.parent),
        }
    }

    /// 层级深度，根关节为 0
    pub fn depth(&self, id: JointId) -> usize {
        self.ancestors(id).count()
    }

    /// 子关节缓存：按 arena 下标索引的子关节下标列表
    pub fn children_cache(&self) -> Vec<Vec<usize>> {
        let mut cache = vec![Vec::new(); self.joints.len()];
        for (i, joint) in self.joints.iter().enumerate() {
            if let Some(p) = joint.parent.and_then(|p| self.index_of(p)) {
                cache[p].push(i);
            }
        }
        cache
    }

    /// 所有后代（不含自身），拓扑序
    pub fn descendants(&self, id: JointId) -> Vec<JointId> {
        let Some(start) = self.index_of(id) else {
            return Vec::new();
        };
        let mut inside = vec![false; self.joints.len()];
        inside[start] = true;
        let mut out = Vec::new();
        // 拓扑序保证父关节先被标记
        for i in start + 1..self.joints.len() {
            if let Some(p) = self.joints[i].parent.and_then(|p| self.index_of(p)) {
                if inside[p] {
                    inside[i] = true;
                    out.push(self.joints[i].id);
                }
            }
        }
        out
    }

    /// 以 `end` 结尾的 IK 链，末端在前、基座在后
    ///
    /// 沿父链向上收集与 `end` 同名链上的关节，最上方的同名关节作为固定基座。
    /// 末端不属于任何链时返回 `[end, parent]`；根关节返回 `[end]`。
    /// 带 `IK_LOCKED` 的关节会截断链并充当基座。
    pub fn chain_for(&self, end: JointId) -> Vec<JointId> {
        let Some(joint) = self.get(end) else {
            return Vec::new();
        };
        let mut chain = vec![end];
        let Some(name) = joint.ik_chain.as_deref() else {
            if let Some(parent) = joint.parent {
                chain.push(parent);
            }
            return chain;
        };
        let mut cur = joint.parent.and_then(|p| self.get(p));
        while let Some(j) = cur {
            if j.ik_chain.as_deref() != Some(name) {
                break;
            }
            chain.push(j.id);
            if j.flags.contains(JointFlags::IK_LOCKED) {
                break;
            }
            cur = j.parent.and_then(|p| self.get(p));
        }
        if chain.len() < 2 {
            if let Some(parent) = joint.parent {
                chain.push(parent);
            }
        }
        chain
    }

    // ========================================
    // 绑定姿态
    // ========================================

    /// 以当前实时姿态作为新的绑定姿态
    ///
    /// 这是唯一会重新推导骨骼长度的地方。
    pub fn capture_bind_pose(&mut self) {
        for i in 0..self.joints.len() {
            let parent_pos = self.joints[i]
                .parent
                .and_then(|p| self.index_of(p))
                .map(|p| self.joints[p].position);
            let joint = &mut self.joints[i];
            joint.bind_position = joint.position;
            joint.bind_rotation = joint.rotation;
            joint.previous_position = joint.position;
            if let Some(parent_pos) = parent_pos {
                joint.bone_length = parent_pos.distance(joint.position);
            }
        }
        log::debug!("绑定姿态已更新: {} 个关节", self.joints.len());
    }

    /// 根据绑定位置推导非根关节的绑定旋转
    pub fn rederive_bind_rotations(&mut self) {
        for i in 0..self.joints.len() {
            let Some(p) = self.joints[i].parent.and_then(|p| self.index_of(p)) else {
                continue;
            };
            let parent_pos = self.joints[p].bind_position;
            let joint = &mut self.joints[i];
            if parent_pos.distance_squared(joint.bind_position) > EPSILON * EPSILON {
                joint.bind_rotation = math::direction_angle(parent_pos, joint.bind_position);
            }
        }
    }

    /// 根据实时位置刷新非根关节的旋转，重合的关节保持原旋转
    pub fn refresh_rotations(&mut self) {
        for i in 0..self.joints.len() {
            let Some(p) = self.joints[i].parent.and_then(|p| self.index_of(p)) else {
                continue;
            };
            let parent_pos = self.joints[p].position;
            let joint = &mut self.joints[i];
            if parent_pos.distance_squared(joint.position) > EPSILON * EPSILON {
                joint.rotation = math::direction_angle(parent_pos, joint.position);
            }
        }
    }

    /// 恢复绑定姿态
    pub fn reset_to_bind_pose(&mut self) {
        for joint in &mut self.joints {
            joint.reset_to_bind();
        }
    }

    /// 实时骨骼长度（调试/测试用）
    pub fn live_length(&self, id: JointId) -> Option<f32> {
        let joint = self.get(id)?;
        let parent = self.parent(id)?;
        Some(parent.position.distance(joint.position))
    }

    /// 所有关节实时位置的包围盒
    pub fn bounds(&self) -> Option<(Vec2, Vec2)> {
        let first = self.joints.first()?.position;
        Some(self.joints.iter().fold((first, first), |(lo, hi), j| {
            (lo.min(j.position), hi.max(j.position))
        }))
    }
}

/// 祖先迭代器
pub struct Ancestors<'a> {
    skeleton: &'a Skeleton,
    next: Option<JointId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Joint;

    fn next(&mut self) -> Option<Self::Item> {
        let joint = self.skeleton.get(self.next?)?;
        self.next = joint.parent;
        Some(joint)
    }
}
