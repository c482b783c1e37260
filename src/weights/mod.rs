//! 自动权重引擎
//!
//! 根据绑定姿态几何、区域模板与精灵透明度轮廓计算顶点 → 骨骼权重。
//! 一次性批处理操作，不在每帧运行。

mod config;
mod engine;
mod region;
mod segment;
mod silhouette;
mod smoothing;

pub use config::WeightConfig;
pub use engine::{compute_weights, prune_and_normalize};
pub use region::{Region, RegionTemplate};
pub use segment::{nearest_segment, BoneSegment};
pub use silhouette::{line_is_clear, AlphaMask, Silhouette};
pub use smoothing::smooth_weights;

/// 自动权重统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeightReport {
    pub vertices: usize,
    /// 参与计算的骨骼数（非根关节数）
    pub bones: usize,
    /// 使用最近骨骼兜底的顶点数
    pub fallback_vertices: usize,
    /// 被透明度屏障拒绝的 (顶点, 骨骼) 对数量
    pub barrier_rejections: usize,
}

impl WeightReport {
    /// 是否实际执行了计算
    pub fn is_applied(&self) -> bool {
        self.bones > 0 && self.vertices > 0
    }
}
