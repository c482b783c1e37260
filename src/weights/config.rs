//! 自动权重配置
//!
//! 所有参数扁平化，均为经验标定的可调常量。

use serde::{Deserialize, Serialize};

/// 自动权重配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    // ========== 影响范围 ==========
    /// 硬截断半径因子：垂直距离超过 骨骼长度 × 此值 的骨骼被忽略，默认 3.0
    pub max_influence_radius: f32,

    // ========== 衰减 ==========
    /// 径向衰减 σ = 骨骼长度 × sigma_factor，默认 0.20
    pub sigma_factor: f32,
    /// 径向衰减指数，默认 1.0
    pub radial_power: f32,
    /// 纵向衰减指数（中点最强、两端减弱），默认 0.0 即关闭
    pub longitudinal_power: f32,

    // ========== 祖先渗透 ==========
    /// 传给父关节的权重比例，默认 0.25
    pub parent_blend: f32,
    /// 每上溯一级的衰减系数，默认 0.40
    pub ancestor_decay: f32,
    /// 渗透量低于此值时停止，默认 1e-5
    pub bleed_cutoff: f32,

    // ========== 裁剪 ==========
    /// 每个顶点保留的最大骨骼数，默认 4
    pub top_k: usize,
    /// 低于此值的权重被丢弃，默认 0.001
    pub min_keep_threshold: f32,

    // ========== 拓扑平滑 ==========
    /// 平滑迭代次数（固定次数，不判断收敛），默认 30
    pub smooth_iterations: usize,
    /// 自身权重与邻居平均的混合系数，默认 0.5
    pub smooth_mu: f32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            max_influence_radius: 3.0,

            sigma_factor: 0.20,
            radial_power: 1.0,
            longitudinal_power: 0.0,

            parent_blend: 0.25,
            ancestor_decay: 0.40,
            bleed_cutoff: 1e-5,

            top_k: 4,
            min_keep_threshold: 0.001,

            smooth_iterations: 30,
            smooth_mu: 0.5,
        }
    }
}

impl WeightConfig {
    /// 关闭拓扑平滑
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_iterations = 0;
        self
    }
}
