//! 2D 几何工具函数

use glam::Vec2;
use std::f32::consts::{PI, TAU};

/// 长度/距离的退化阈值
pub const EPSILON: f32 = 1e-6;

/// 角度归一化到 [-π, π]
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    if (-PI..=PI).contains(&angle) {
        return angle;
    }
    let mut r = (angle + PI) % TAU;
    if r < 0.0 {
        r += TAU;
    }
    r - PI
}

/// 从 `from` 指向 `to` 的方向角，重合点返回 0
#[inline]
pub fn direction_angle(from: Vec2, to: Vec2) -> f32 {
    let d = to - from;
    if d.length_squared() < EPSILON * EPSILON {
        0.0
    } else {
        d.y.atan2(d.x)
    }
}

/// 单位方向向量
#[inline]
pub fn unit(angle: f32) -> Vec2 {
    Vec2::from_angle(angle)
}

/// 绕 `pivot` 旋转点
#[inline]
pub fn rotate_about(point: Vec2, pivot: Vec2, angle: f32) -> Vec2 {
    pivot + Vec2::from_angle(angle).rotate(point - pivot)
}

/// 点到线段的投影结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentProjection {
    /// 参数位置 t ∈ [0, 1]
    pub t: f32,
    /// 垂直距离
    pub distance: f32,
    /// 线段上的最近点
    pub closest: Vec2,
}

/// 将点投影到线段 [start, end]
///
/// 零长度线段退化为到 `start` 的距离，t = 0。
pub fn project_onto_segment(point: Vec2, start: Vec2, end: Vec2) -> SegmentProjection {
    let seg = end - start;
    let len_sq = seg.length_squared();
    if len_sq < EPSILON * EPSILON {
        return SegmentProjection {
            t: 0.0,
            distance: point.distance(start),
            closest: start,
        };
    }
    let t = ((point - start).dot(seg) / len_sq).clamp(0.0, 1.0);
    let closest = start + seg * t;
    SegmentProjection {
        t,
        distance: point.distance(closest),
        closest,
    }
}
