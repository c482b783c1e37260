//! 自动权重计算
//!
//! 流程（逐顶点）：候选骨骼 → 投影与截断 → 径向/纵向衰减 → 累加
//! → 祖先渗透 → top-K 裁剪与归一化 → 最近骨骼兜底，最后做拓扑平滑。

use glam::Vec2;
use rayon::prelude::*;
use std::collections::HashMap;
use std::f32::consts::PI;

use super::region::{RegionIndex, RegionTemplate};
use super::segment::{nearest_segment, BoneSegment};
use super::silhouette::{line_is_clear, Silhouette};
use super::smoothing::smooth_weights;
use super::{WeightConfig, WeightReport};
use crate::math::EPSILON;
use crate::mesh::{Mesh, WeightMap};
use crate::skeleton::{JointId, Skeleton};

/// 单个顶点的计算结果
struct VertexResult {
    weights: WeightMap,
    fallback: bool,
    barrier_rejections: usize,
}

/// 计算所有顶点的骨骼权重
///
/// 没有骨骼或没有顶点时不做任何修改，只输出警告。
pub fn compute_weights(
    mesh: &mut Mesh,
    skeleton: &Skeleton,
    template: Option<&RegionTemplate>,
    silhouette: Option<&dyn Silhouette>,
    config: &WeightConfig,
) -> WeightReport {
    let segments = BoneSegment::collect(skeleton);
    let mut report = WeightReport {
        vertices: mesh.len(),
        bones: segments.len(),
        ..Default::default()
    };
    if segments.is_empty() {
        log::warn!("自动权重跳过: 骨骼中没有任何骨骼 ({} 个关节)", skeleton.len());
        return report;
    }
    if mesh.is_empty() {
        log::warn!("自动权重跳过: 网格没有顶点");
        return report;
    }

    let regions = template.map(|t| RegionIndex::new(t, &segments));
    let parents: HashMap<JointId, JointId> = skeleton
        .joints()
        .iter()
        .filter_map(|j| Some((j.id, j.parent?)))
        .collect();

    let ctx = WeightContext {
        segments: &segments,
        regions: regions.as_ref(),
        silhouette,
        parents: &parents,
        config,
    };

    let results: Vec<VertexResult> = mesh
        .vertices()
        .par_iter()
        .map(|v| ctx.vertex_weights(v.bind_position))
        .collect();

    for (vertex, result) in mesh.vertices_mut().iter_mut().zip(results) {
        if result.fallback {
            report.fallback_vertices += 1;
            log::trace!("顶点 {} 无可用骨骼，退回最近骨骼", vertex.id);
        }
        report.barrier_rejections += result.barrier_rejections;
        vertex.weights = result.weights;
    }

    if config.smooth_iterations > 0 && !mesh.triangles().is_empty() {
        smooth_weights(mesh, config);
        // 平滑后仍需保证每个顶点至少有一个权重
        for vertex in mesh.vertices_mut() {
            if vertex.weights.is_empty() {
                vertex.weights = ctx.nearest_fallback(vertex.bind_position);
            }
        }
    }

    log::info!(
        "自动权重完成: {} 顶点, {} 骨骼, {} 个兜底, {} 次透明度屏障, 平滑 {} 次",
        report.vertices,
        report.bones,
        report.fallback_vertices,
        report.barrier_rejections,
        config.smooth_iterations
    );
    report
}

struct WeightContext<'a> {
    segments: &'a [BoneSegment],
    regions: Option<&'a RegionIndex>,
    silhouette: Option<&'a dyn Silhouette>,
    parents: &'a HashMap<JointId, JointId>,
    config: &'a WeightConfig,
}

impl WeightContext<'_> {
    fn vertex_weights(&self, point: Vec2) -> VertexResult {
        let mut raw = WeightMap::new();
        let mut barrier_rejections = 0;

        let candidates = self.regions.and_then(|r| r.candidates(self.segments, point));
        let mut visit = |i: usize| {
            let seg = &self.segments[i];
            match self.bone_influence(seg, point) {
                Influence::Weight(w) => *raw.entry(seg.bone).or_insert(0.0) += w,
                Influence::Blocked => barrier_rejections += 1,
                Influence::Skipped => {}
            }
        };
        match candidates {
            Some(list) => list.iter().copied().for_each(&mut visit),
            None => (0..self.segments.len()).for_each(&mut visit),
        }

        self.bleed_to_ancestors(&mut raw);
        let mut weights = prune_and_normalize(&raw, self.config.top_k, self.config.min_keep_threshold);

        let fallback = weights.is_empty();
        if fallback {
            weights = self.nearest_fallback(point);
        }
        VertexResult {
            weights,
            fallback,
            barrier_rejections,
        }
    }

    /// 单根骨骼对顶点的原始影响
    fn bone_influence(&self, seg: &BoneSegment, point: Vec2) -> Influence {
        if seg.is_degenerate() {
            return Influence::Skipped;
        }
        let proj = seg.project(point);
        if proj.distance > seg.length * self.config.max_influence_radius {
            return Influence::Skipped;
        }
        if let Some(silhouette) = self.silhouette {
            if !line_is_clear(silhouette, point, proj.closest) {
                return Influence::Blocked;
            }
        }

        let sigma = (seg.length * self.config.sigma_factor).max(EPSILON);
        let ratio = proj.distance / sigma;
        let mut radial = 1.0 / (1.0 + ratio * ratio);
        if self.config.radial_power != 1.0 {
            radial = radial.powf(self.config.radial_power);
        }

        let longitudinal = if self.config.longitudinal_power == 0.0 {
            1.0
        } else {
            let base = 0.5 * (1.0 + (PI * (2.0 * proj.t - 1.0).abs()).cos());
            base.max(0.0).powf(self.config.longitudinal_power)
        };

        let w = radial * longitudinal;
        if w.is_finite() && w > 0.0 {
            Influence::Weight(w)
        } else {
            Influence::Skipped
        }
    }

    /// 祖先渗透：把一部分权重沿父链向上传递，按几何级数衰减
    fn bleed_to_ancestors(&self, raw: &mut WeightMap) {
        let blend = self.config.parent_blend;
        if blend <= 0.0 {
            return;
        }
        let mut bled = WeightMap::new();
        for (&bone, &w) in raw.iter() {
            let mut carry = w * blend;
            let mut ancestor = self.parents.get(&bone).copied();
            while let Some(id) = ancestor {
                if carry.is_nan() || carry < self.config.bleed_cutoff {
                    break;
                }
                *bled.entry(id).or_insert(0.0) += carry;
                carry *= self.config.ancestor_decay;
                ancestor = self.parents.get(&id).copied();
            }
        }
        for (id, w) in bled {
            *raw.entry(id).or_insert(0.0) += w;
        }
    }

    /// 兜底：最近骨骼权重 1.0（忽略区域与截断）
    fn nearest_fallback(&self, point: Vec2) -> WeightMap {
        let mut weights = WeightMap::new();
        if let Some(i) = nearest_segment(self.segments, point, |_| true) {
            weights.insert(self.segments[i].bone, 1.0);
        }
        weights
    }
}

enum Influence {
    Weight(f32),
    Blocked,
    Skipped,
}

/// 保留权重最大的 `top_k` 个骨骼，丢弃低于阈值的项，并归一化
///
/// 负数、NaN 和无穷大的项先被丢弃。结果可能为空。
pub fn prune_and_normalize(weights: &WeightMap, top_k: usize, min_keep: f32) -> WeightMap {
    let mut entries: Vec<(JointId, f32)> = weights
        .iter()
        .filter(|(_, w)| w.is_finite() && **w > 0.0)
        .map(|(id, w)| (*id, *w))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    entries.truncate(top_k.max(1));
    entries.retain(|(_, w)| *w >= min_keep);

    let total: f32 = entries.iter().map(|(_, w)| w).sum();
    if total <= EPSILON {
        return WeightMap::new();
    }
    entries.into_iter().map(|(id, w)| (id, w / total)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Triangle, Vertex};
    use crate::skeleton::Joint;
    use crate::weights::{AlphaMask, Region};

    /// 躯干 + 左右两条手臂
    fn body() -> Skeleton {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "pelvis", Vec2::new(50.0, 80.0))).unwrap();
        s.add_joint(Joint::new(1, "chest", Vec2::new(50.0, 40.0)).with_parent(0)).unwrap();
        s.add_joint(Joint::new(2, "elbow_l", Vec2::new(20.0, 40.0)).with_parent(1)).unwrap();
        s.add_joint(Joint::new(3, "hand_l", Vec2::new(0.0, 40.0)).with_parent(2)).unwrap();
        s.add_joint(Joint::new(4, "elbow_r", Vec2::new(80.0, 40.0)).with_parent(1)).unwrap();
        s.add_joint(Joint::new(5, "hand_r", Vec2::new(100.0, 40.0)).with_parent(4)).unwrap();
        s
    }

    /// 覆盖 0..=100 x 30..=90 的规则网格
    fn grid() -> Mesh {
        let mut mesh = Mesh::new();
        let cols = 11;
        let rows = 7;
        for r in 0..rows {
            for c in 0..cols {
                let id = (r * cols + c) as u32;
                let p = Vec2::new(c as f32 * 10.0, 30.0 + r as f32 * 10.0);
                mesh.add_vertex(Vertex::new(id, p)).unwrap();
            }
        }
        for r in 0..rows - 1 {
            for c in 0..cols - 1 {
                let i = (r * cols + c) as u32;
                let w = cols as u32;
                mesh.add_triangle(Triangle::new(i, i + 1, i + w)).unwrap();
                mesh.add_triangle(Triangle::new(i + 1, i + w + 1, i + w)).unwrap();
            }
        }
        mesh
    }

    fn template() -> RegionTemplate {
        RegionTemplate::new(vec![
            Region::new("torso", ["chest"], ["chest"]),
            Region::new("left_arm", ["elbow_l", "hand_l"], ["elbow_l", "hand_l"]),
            Region::new("right_arm", ["elbow_r", "hand_r"], ["elbow_r", "hand_r"]),
        ])
    }

    fn assert_normalized(mesh: &Mesh) {
        for v in mesh.vertices() {
            assert!(!v.weights.is_empty(), "vertex {} has no weights", v.id);
            assert!((v.weight_sum() - 1.0).abs() < 1e-4, "vertex {} sums to {}", v.id, v.weight_sum());
            assert!(v.weights.len() <= 4);
            assert!(v.weights.values().all(|w| *w >= 0.0 && w.is_finite()));
        }
    }

    #[test]
    fn test_weights_are_normalized() {
        let mut mesh = grid();
        let report = compute_weights(&mut mesh, &body(), None, None, &WeightConfig::default());
        assert_eq!(report.bones, 5);
        assert_normalized(&mesh);
    }

    #[test]
    fn test_vertex_on_bone_is_dominated_by_it() {
        let mut mesh = grid();
        let config = WeightConfig::default().without_smoothing();
        compute_weights(&mut mesh, &body(), None, None, &config);
        // (10, 40) 位于左前臂中点
        let v = mesh.vertices().iter().find(|v| v.bind_position == Vec2::new(10.0, 40.0)).unwrap();
        assert_eq!(v.dominant_bone(), Some(JointId(3)));
    }

    #[test]
    fn test_region_isolation_prevents_cross_limb_bleed() {
        let mut mesh = grid();
        let config = WeightConfig::default().without_smoothing();
        compute_weights(&mut mesh, &body(), Some(&template()), None, &config);
        assert_normalized(&mesh);
        for v in mesh.vertices() {
            if v.bind_position.x <= 10.0 && v.bind_position.y <= 50.0 {
                assert!(!v.weights.contains_key(&JointId(4)));
                assert!(!v.weights.contains_key(&JointId(5)));
            }
        }
    }

    #[test]
    fn test_no_orphans_when_region_filters_everything() {
        let mut mesh = grid();
        // 左臂区域没有允许的骨骼
        let template = RegionTemplate::new(vec![
            Region::new("torso", ["chest"], ["chest"]),
            Region::new("left_arm", Vec::<String>::new(), vec![String::from("elbow_l"), String::from("hand_l")]),
        ]);
        let report = compute_weights(&mut mesh, &body(), Some(&template), None, &WeightConfig::default());
        assert!(report.fallback_vertices > 0);
        assert_normalized(&mesh);
    }

    #[test]
    fn test_far_vertex_falls_back_to_nearest_bone() {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(0, Vec2::new(1000.0, 1000.0))).unwrap();
        let report = compute_weights(&mut mesh, &body(), None, None, &WeightConfig::default());
        assert_eq!(report.fallback_vertices, 1);
        let v = &mesh.vertices()[0];
        assert_eq!(v.weights.len(), 1);
        assert_eq!(v.weight_sum(), 1.0);
    }

    #[test]
    fn test_empty_skeleton_is_noop() {
        let mut mesh = grid();
        let mut skeleton = Skeleton::new();
        skeleton.add_joint(Joint::new(0, "root", Vec2::ZERO)).unwrap();
        let report = compute_weights(&mut mesh, &skeleton, None, None, &WeightConfig::default());
        assert_eq!(report.bones, 0);
        assert!(mesh.vertices().iter().all(|v| v.weights.is_empty()));
    }

    #[test]
    fn test_alpha_barrier_blocks_disconnected_bone() {
        // 两条平行的竖直腿，中间有一列透明像素
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "hip", Vec2::new(10.0, 0.0))).unwrap();
        s.add_joint(Joint::new(1, "leg_front", Vec2::new(5.0, 20.0)).with_parent(0)).unwrap();
        s.add_joint(Joint::new(2, "leg_back", Vec2::new(15.0, 20.0)).with_parent(0)).unwrap();

        let mut alpha = vec![255u8; 20 * 20];
        for y in 5..20 {
            alpha[y * 20 + 10] = 0;
        }
        let mask = AlphaMask::new(20, 20, alpha).unwrap();

        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(0, Vec2::new(8.5, 16.5))).unwrap();
        let config = WeightConfig::default().without_smoothing();

        compute_weights(&mut mesh, &s, None, None, &config);
        assert!(mesh.vertices()[0].weights.contains_key(&JointId(2)));

        let report = compute_weights(&mut mesh, &s, None, Some(&mask), &config);
        assert!(report.barrier_rejections >= 1);
        assert!(!mesh.vertices()[0].weights.contains_key(&JointId(2)));
        assert!(mesh.vertices()[0].weights.contains_key(&JointId(1)));
    }

    #[test]
    fn test_ancestor_bleed_reaches_parent() {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Vertex::new(0, Vec2::new(10.0, 40.0))).unwrap();
        let config = WeightConfig::default().without_smoothing();
        compute_weights(&mut mesh, &body(), None, None, &config);
        let v = &mesh.vertices()[0];
        // 前臂 → 上臂 → 胸
        assert!(v.weights.contains_key(&JointId(2)));
        assert!(v.weights[&JointId(3)] > v.weights[&JointId(2)]);
    }

    fn parents_of(skeleton: &Skeleton) -> HashMap<JointId, JointId> {
        skeleton
            .joints()
            .iter()
            .filter_map(|j| Some((j.id, j.parent?)))
            .collect()
    }

    /// 单根骨骼 (0,0) → (10,0) 对某点的原始影响
    fn raw_influence(config: &WeightConfig, point: Vec2) -> f32 {
        let mut s = Skeleton::new();
        s.add_joint(Joint::new(0, "root", Vec2::ZERO)).unwrap();
        s.add_joint(Joint::new(1, "tip", Vec2::new(10.0, 0.0)).with_parent(0)).unwrap();
        let segments = BoneSegment::collect(&s);
        let parents = parents_of(&s);
        let ctx = WeightContext {
            segments: &segments,
            regions: None,
            silhouette: None,
            parents: &parents,
            config,
        };
        match ctx.bone_influence(&segments[0], point) {
            Influence::Weight(w) => w,
            Influence::Blocked | Influence::Skipped => 0.0,
        }
    }

    #[test]
    fn test_radial_and_longitudinal_falloff() {
        // sigma = 10 × 0.2 = 2，垂直距离 1 → 径向 1 / (1 + 0.25) = 0.8
        let radial_only = WeightConfig::default();
        assert!((raw_influence(&radial_only, Vec2::new(5.0, 1.0)) - 0.8).abs() < 1e-5);
        assert!((raw_influence(&radial_only, Vec2::new(9.0, 1.0)) - 0.8).abs() < 1e-5);

        let config = WeightConfig {
            longitudinal_power: 1.0,
            ..WeightConfig::default()
        };
        // 中点 t = 0.5 不衰减
        assert!((raw_influence(&config, Vec2::new(5.0, 1.0)) - 0.8).abs() < 1e-5);
        // t = 0.9 → 0.5 × (1 + cos(0.8π)) × 0.8
        assert!((raw_influence(&config, Vec2::new(9.0, 1.0)) - 0.076_393_2).abs() < 1e-5);
        // 端点处完全衰减
        assert!(raw_influence(&config, Vec2::new(10.0, 1.0)) < 1e-6);

        // 超出影响半径 (3 × 10)
        assert_eq!(raw_influence(&radial_only, Vec2::new(5.0, 31.0)), 0.0);
    }

    #[test]
    fn test_bleed_decays_geometrically() {
        let skeleton = body();
        let segments = BoneSegment::collect(&skeleton);
        let parents = parents_of(&skeleton);
        let bleed = |config: &WeightConfig| {
            let ctx = WeightContext {
                segments: &segments,
                regions: None,
                silhouette: None,
                parents: &parents,
                config,
            };
            let mut raw = WeightMap::new();
            raw.insert(JointId(3), 1.0);
            ctx.bleed_to_ancestors(&mut raw);
            raw
        };

        // 前臂 → 上臂 0.25 → 胸 0.1 → 骨盆 0.04
        let raw = bleed(&WeightConfig::default());
        assert!((raw[&JointId(3)] - 1.0).abs() < 1e-6);
        assert!((raw[&JointId(2)] - 0.25).abs() < 1e-6);
        assert!((raw[&JointId(1)] - 0.1).abs() < 1e-6);
        assert!((raw[&JointId(0)] - 0.04).abs() < 1e-6);

        let cut = bleed(&WeightConfig {
            bleed_cutoff: 0.05,
            ..WeightConfig::default()
        });
        assert!((raw[&JointId(1)] - cut[&JointId(1)]).abs() < 1e-6);
        assert!(!cut.contains_key(&JointId(0)));

        let off = bleed(&WeightConfig {
            parent_blend: 0.0,
            ..WeightConfig::default()
        });
        assert_eq!(off.len(), 1);
    }

    #[test]
    fn test_prune_and_normalize() {
        let mut w = WeightMap::new();
        w.insert(JointId(0), 0.5);
        w.insert(JointId(1), f32::NAN);
        w.insert(JointId(2), -1.0);
        w.insert(JointId(3), 0.3);
        w.insert(JointId(4), 0.2);
        w.insert(JointId(5), 0.0001);
        let pruned = prune_and_normalize(&w, 2, 0.001);
        assert_eq!(pruned.len(), 2);
        assert!((pruned[&JointId(0)] - 0.625).abs() < 1e-5);
        assert!((pruned[&JointId(3)] - 0.375).abs() < 1e-5);

        assert!(prune_and_normalize(&WeightMap::new(), 4, 0.001).is_empty());
    }
}
