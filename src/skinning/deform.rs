//! 网格变形

use glam::{Affine2, Vec2};
use rayon::prelude::*;
use std::collections::HashMap;

use super::skinning_matrices;
use crate::math::EPSILON;
use crate::mesh::{Mesh, Vertex};
use crate::skeleton::{JointId, Skeleton};

/// 计算蒙皮，写入每个顶点的 `current_position`
///
/// 总权重约为 0 或所有骨骼都不存在时，顶点回到绑定位置。
/// 返回被骨骼驱动的顶点数。
pub fn skin_mesh(skeleton: &Skeleton, mesh: &mut Mesh) -> usize {
    let matrices = skinning_matrices(skeleton);
    mesh.vertices_mut()
        .par_iter_mut()
        .map(|vertex| {
            let skinned = skin_vertex(vertex, &matrices);
            vertex.current_position = skinned.unwrap_or(vertex.bind_position);
            usize::from(skinned.is_some())
        })
        .sum()
}

/// 计算单个顶点的蒙皮
fn skin_vertex(vertex: &Vertex, matrices: &HashMap<JointId, Affine2>) -> Option<Vec2> {
    let mut sum = Vec2::ZERO;
    let mut total = 0.0;
    for (bone, &weight) in &vertex.weights {
        let Some(m) = matrices.get(bone) else {
            continue;
        };
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        sum += m.transform_point2(vertex.bind_position) * weight;
        total += weight;
    }
    if total < EPSILON {
        return None;
    }
    let p = sum / total;
    p.is_finite().then_some(p)
}
