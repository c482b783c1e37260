//! 骨骼线段（每次自动权重计算时从骨骼重建，不持久化）

use glam::Vec2;

use crate::math::{self, SegmentProjection, EPSILON};
use crate::skeleton::{JointId, Skeleton};

/// 绑定姿态下的骨骼线段：父关节 → 子关节
#[derive(Clone, Debug, PartialEq)]
pub struct BoneSegment {
    /// 子关节 id，即骨骼 id
    pub bone: JointId,
    pub parent: JointId,
    /// 子关节名称（用于区域匹配）
    pub name: String,
    pub start: Vec2,
    pub end: Vec2,
    pub length: f32,
}

impl BoneSegment {
    /// 从骨骼收集所有非根关节的线段
    pub fn collect(skeleton: &Skeleton) -> Vec<BoneSegment> {
        skeleton
            .joints()
            .iter()
            .filter_map(|joint| {
                let parent = skeleton.get(joint.parent?)?;
                let measured = parent.bind_position.distance(joint.bind_position);
                let length = if joint.bone_length > EPSILON {
                    joint.bone_length
                } else {
                    measured
                };
                Some(BoneSegment {
                    bone: joint.id,
                    parent: parent.id,
                    name: joint.name.clone(),
                    start: parent.bind_position,
                    end: joint.bind_position,
                    length,
                })
            })
            .collect()
    }

    #[inline]
    pub fn project(&self, point: Vec2) -> SegmentProjection {
        math::project_onto_segment(point, self.start, self.end)
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.length <= EPSILON
    }
}

/// 按垂直距离找最近的线段下标
///
/// `filter` 返回 false 的线段被跳过；距离相同时取靠前者。
pub fn nearest_segment<F>(segments: &[BoneSegment], point: Vec2, mut filter: F) -> Option<usize>
where
    F: FnMut(usize) -> bool,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, seg) in segments.iter().enumerate() {
        if !filter(i) {
            continue;
        }
        let d = seg.project(point).distance;
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}
