//! 解剖区域模板
//!
//! 区域把网格划分成互不干扰的影响区（例如左臂与躯干），
//! 防止一条肢体的骨骼影响另一条肢体的顶点。

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::segment::{nearest_segment, BoneSegment};

/// 命名区域
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    /// 允许影响本区域顶点的关节名称
    pub allowed_joints: Vec<String>,
    /// 决定顶点归属的主关节名称
    pub primary_joints: Vec<String>,
}

impl Region {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        allowed: impl IntoIterator<Item = S>,
        primary: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            allowed_joints: allowed.into_iter().map(Into::into).collect(),
            primary_joints: primary.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn allows(&self, joint_name: &str) -> bool {
        self.allowed_joints.iter().any(|n| n == joint_name)
    }

    #[inline]
    pub fn is_primary(&self, joint_name: &str) -> bool {
        self.primary_joints.iter().any(|n| n == joint_name)
    }
}

/// 区域模板（外部绑定模板提供，只读）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionTemplate {
    pub regions: Vec<Region>,
}

impl RegionTemplate {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }
}

/// 针对一组骨骼线段预先解析的区域索引
pub(crate) struct RegionIndex {
    /// 线段 → 以它为主关节的区域
    primary_owner: Vec<Option<usize>>,
    /// 线段 → 允许列表包含它的第一个区域
    home_region: Vec<Option<usize>>,
    /// 区域 → 允许的线段下标
    allowed: Vec<Vec<usize>>,
    any_primary: bool,
}

impl RegionIndex {
    pub(crate) fn new(template: &RegionTemplate, segments: &[BoneSegment]) -> Self {
        let primary_owner: Vec<Option<usize>> = segments
            .iter()
            .map(|seg| template.regions.iter().position(|r| r.is_primary(&seg.name)))
            .collect();
        let home_region = segments
            .iter()
            .map(|seg| template.regions.iter().position(|r| r.allows(&seg.name)))
            .collect();
        let allowed = template
            .regions
            .iter()
            .map(|region| {
                segments
                    .iter()
                    .enumerate()
                    .filter(|(_, seg)| region.allows(&seg.name))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();
        let any_primary = primary_owner.iter().any(Option::is_some);
        Self {
            primary_owner,
            home_region,
            allowed,
            any_primary,
        }
    }

    /// 顶点所属区域
    ///
    /// 优先取最近的主关节骨骼所属区域；整个骨骼都没有主关节时，
    /// 退回最近骨骼所在的区域。
    pub(crate) fn region_for(&self, segments: &[BoneSegment], point: Vec2) -> Option<usize> {
        if self.any_primary {
            let seg = nearest_segment(segments, point, |i| self.primary_owner[i].is_some())?;
            self.primary_owner[seg]
        } else {
            let seg = nearest_segment(segments, point, |_| true)?;
            self.home_region[seg]
        }
    }

    /// 顶点的候选骨骼线段；找不到区域时为 None（所有骨骼都是候选）
    pub(crate) fn candidates(&self, segments: &[BoneSegment], point: Vec2) -> Option<&[usize]> {
        self.region_for(segments, point).map(|r| self.allowed[r].as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Joint, Skeleton};

    fn skeleton() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "pelvis", Vec2::ZERO)).unwrap();
        s.add_joint(Joint::new(1, "chest", Vec2::new(0.0, -40.0)).with_parent(0)).unwrap();
        s.add_joint(Joint::new(2, "arm_l", Vec2::new(-30.0, -40.0)).with_parent(1)).unwrap();
        s.add_joint(Joint::new(3, "arm_r", Vec2::new(30.0, -40.0)).with_parent(1)).unwrap();
        s
    }

    #[test]
    fn test_region_by_nearest_primary() {
        let segments = BoneSegment::collect(&skeleton());
        let template = RegionTemplate::new(vec![
            Region::new("torso", ["chest"], ["chest"]),
            Region::new("left_arm", ["arm_l"], ["arm_l"]),
            Region::new("right_arm", ["arm_r"], ["arm_r"]),
        ]);
        let index = RegionIndex::new(&template, &segments);
        assert_eq!(index.region_for(&segments, Vec2::new(-25.0, -42.0)), Some(1));
        assert_eq!(index.region_for(&segments, Vec2::new(2.0, -20.0)), Some(0));
        let candidates = index.candidates(&segments, Vec2::new(25.0, -38.0)).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(segments[candidates[0]].name, "arm_r");
    }

    #[test]
    fn test_region_falls_back_to_nearest_bone() {
        let segments = BoneSegment::collect(&skeleton());
        // 没有任何主关节
        let template = RegionTemplate::new(vec![
            Region::new("upper", ["chest", "arm_l", "arm_r"], []),
        ]);
        let index = RegionIndex::new(&template, &segments);
        assert_eq!(index.region_for(&segments, Vec2::new(-25.0, -42.0)), Some(0));
        assert_eq!(index.candidates(&segments, Vec2::ZERO).map(<[usize]>::len), Some(3));
    }
}
