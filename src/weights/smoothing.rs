//! 拓扑权重平滑
//!
//! 每次迭代基于上一轮的快照计算（Jacobi 方式），结果与遍历顺序无关。

use rayon::prelude::*;

use super::engine::prune_and_normalize;
use super::WeightConfig;
use crate::mesh::{Mesh, WeightMap};

/// 邻居距离下限，避免重合顶点的权重无穷大
const MIN_NEIGHBOR_DISTANCE: f32 = 1e-4;

/// 按网格邻接关系平滑权重，迭代 `config.smooth_iterations` 次
///
/// 只有与顶点共享至少一根骨骼的邻居参与平均，
/// 邻居按绑定距离的倒数加权。
pub fn smooth_weights(mesh: &mut Mesh, config: &WeightConfig) {
    let adjacency = mesh.adjacency();
    let positions: Vec<_> = mesh.vertices().iter().map(|v| v.bind_position).collect();
    let mu = config.smooth_mu.clamp(0.0, 1.0);

    for _ in 0..config.smooth_iterations {
        let snapshot: Vec<WeightMap> = mesh.vertices().iter().map(|v| v.weights.clone()).collect();

        let next: Vec<WeightMap> = (0..snapshot.len())
            .into_par_iter()
            .map(|i| {
                let own = &snapshot[i];
                if own.is_empty() || adjacency[i].is_empty() {
                    return own.clone();
                }

                let mut average = WeightMap::new();
                let mut total = 0.0;
                for &j in &adjacency[i] {
                    let neighbor = &snapshot[j];
                    if !neighbor.keys().any(|bone| own.contains_key(bone)) {
                        continue;
                    }
                    let w = 1.0 / positions[i].distance(positions[j]).max(MIN_NEIGHBOR_DISTANCE);
                    for (&bone, &bw) in neighbor {
                        *average.entry(bone).or_insert(0.0) += bw * w;
                    }
                    total += w;
                }
                if total <= 0.0 {
                    return own.clone();
                }

                let mut blended: WeightMap = own.iter().map(|(&b, &w)| (b, w * (1.0 - mu))).collect();
                for (bone, w) in average {
                    *blended.entry(bone).or_insert(0.0) += mu * w / total;
                }
                let pruned = prune_and_normalize(&blended, config.top_k, config.min_keep_threshold);
                if pruned.is_empty() {
                    own.clone()
                } else {
                    pruned
                }
            })
            .collect();

        for (vertex, weights) in mesh.vertices_mut().iter_mut().zip(next) {
            vertex.weights = weights;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Triangle, Vertex};
    use crate::skeleton::JointId;
    use glam::Vec2;

    fn weights(pairs: &[(u32, f32)]) -> WeightMap {
        pairs.iter().map(|&(id, w)| (JointId(id), w)).collect()
    }

    #[test]
    fn test_smoothing_skips_unrelated_neighbors() {
        let mut mesh = Mesh::new();
        let mut v0 = Vertex::new(0, Vec2::new(0.0, 0.0));
        v0.weights = weights(&[(1, 1.0)]);
        let mut v1 = Vertex::new(1, Vec2::new(1.0, 0.0));
        v1.weights = weights(&[(1, 0.5), (2, 0.5)]);
        let mut v2 = Vertex::new(2, Vec2::new(0.0, 1.0));
        v2.weights = weights(&[(9, 1.0)]);
        mesh.add_vertex(v0).unwrap();
        mesh.add_vertex(v1).unwrap();
        mesh.add_vertex(v2).unwrap();
        mesh.add_triangle(Triangle::new(0, 1, 2)).unwrap();

        let config = WeightConfig {
            smooth_iterations: 1,
            ..Default::default()
        };
        smooth_weights(&mut mesh, &config);

        let v = mesh.vertices();
        assert!((v[0].weights[&JointId(1)] - 0.75).abs() < 1e-5);
        assert!((v[0].weights[&JointId(2)] - 0.25).abs() < 1e-5);
        assert!(!v[0].weights.contains_key(&JointId(9)));
        // 与任何邻居都不共享骨骼，保持不变
        assert_eq!(v[2].weights, weights(&[(9, 1.0)]));
    }

    #[test]
    fn test_smoothing_keeps_normalization() {
        let mut mesh = Mesh::new();
        for i in 0..4u32 {
            let mut v = Vertex::new(i, Vec2::new(i as f32, (i % 2) as f32));
            v.weights = weights(&[(1, 0.2 * i as f32 + 0.1), (2, 1.0 - 0.2 * i as f32 - 0.1)]);
            mesh.add_vertex(v).unwrap();
        }
        mesh.add_triangle(Triangle::new(0, 1, 2)).unwrap();
        mesh.add_triangle(Triangle::new(1, 3, 2)).unwrap();

        smooth_weights(&mut mesh, &WeightConfig::default());
        for v in mesh.vertices() {
            assert!((v.weight_sum() - 1.0).abs() < 1e-4);
        }
        // 迭代后差异缩小
        let w0 = mesh.vertices()[0].weights[&JointId(1)];
        let w3 = mesh.vertices()[3].weights[&JointId(1)];
        assert!((w3 - w0).abs() < 0.6);
    }
}
