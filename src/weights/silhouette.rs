//! 透明度屏障
//!
//! 顶点到骨骼最近点的连线如果穿过完全透明的像素，就认为两者在视觉上不相连，
//! 例如前腿的顶点不应被后腿骨骼影响。

use glam::Vec2;
use image::{DynamicImage, RgbaImage};

use crate::{Result, RigError};

/// 精灵轮廓：二维不透明度查询
///
/// 坐标与绑定空间一致（整数像素）。
pub trait Silhouette: Sync {
    fn is_opaque(&self, x: i32, y: i32) -> bool;

    /// 像素是否阻断权重传播，默认等价于不透明度取反
    fn is_barrier(&self, x: i32, y: i32) -> bool {
        !self.is_opaque(x, y)
    }
}

impl<F> Silhouette for F
where
    F: Fn(i32, i32) -> bool + Sync,
{
    fn is_opaque(&self, x: i32, y: i32) -> bool {
        self(x, y)
    }
}

/// 基于 alpha 通道的轮廓遮罩
///
/// alpha <= threshold 的像素视为透明。遮罩范围之外的像素从不阻断。
#[derive(Clone, Debug)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
    threshold: u8,
    /// 像素 (0, 0) 在绑定空间中的位置
    origin: Vec2,
}

impl AlphaMask {
    /// 从逐像素 alpha 数据创建
    pub fn new(width: u32, height: u32, alpha: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if alpha.len() != expected {
            return Err(RigError::InvalidMask(format!(
                "expected {} alpha bytes for {}x{}, got {}",
                expected,
                width,
                height,
                alpha.len()
            )));
        }
        Ok(Self {
            width,
            height,
            alpha,
            threshold: 0,
            origin: Vec2::ZERO,
        })
    }

    /// 从 RGBA 图像提取 alpha 通道
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let alpha = image.pixels().map(|p| p.0[3]).collect();
        Self {
            width: image.width(),
            height: image.height(),
            alpha,
            threshold: 0,
            origin: Vec2::ZERO,
        }
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        Self::from_rgba(&image.to_rgba8())
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// 绑定空间坐标对应的像素 alpha，越界返回 None
    pub fn alpha_at(&self, x: i32, y: i32) -> Option<u8> {
        let px = x - self.origin.x.floor() as i32;
        let py = y - self.origin.y.floor() as i32;
        if px < 0 || py < 0 || px as u32 >= self.width || py as u32 >= self.height {
            return None;
        }
        Some(self.alpha[py as usize * self.width as usize + px as usize])
    }
}

impl Silhouette for AlphaMask {
    fn is_opaque(&self, x: i32, y: i32) -> bool {
        self.alpha_at(x, y).is_some_and(|a| a > self.threshold)
    }

    fn is_barrier(&self, x: i32, y: i32) -> bool {
        self.alpha_at(x, y).is_some_and(|a| a <= self.threshold)
    }
}

/// Bresenham 遍历 `from` → `to`，途中遇到屏障像素返回 false
///
/// 起点像素（顶点自身所在像素）不参与判断。
pub fn line_is_clear(silhouette: &dyn Silhouette, from: Vec2, to: Vec2) -> bool {
    if !from.is_finite() || !to.is_finite() {
        return true;
    }
    let (mut x0, mut y0) = (from.x.floor() as i32, from.y.floor() as i32);
    let (x1, y1) = (to.x.floor() as i32, to.y.floor() as i32);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    while x0 != x1 || y0 != y1 {
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
        if silhouette.is_barrier(x0, y0) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 遮罩，第 5 列完全透明
    fn split_mask() -> AlphaMask {
        let mut alpha = vec![255u8; 100];
        for y in 0..10 {
            alpha[y * 10 + 5] = 0;
        }
        AlphaMask::new(10, 10, alpha).unwrap()
    }

    #[test]
    fn test_line_crossing_gap_is_blocked() {
        let mask = split_mask();
        assert!(!line_is_clear(&mask, Vec2::new(2.5, 2.5), Vec2::new(8.5, 2.5)));
        assert!(line_is_clear(&mask, Vec2::new(1.5, 1.5), Vec2::new(4.5, 8.5)));
    }

    #[test]
    fn test_outside_mask_never_blocks() {
        let mask = split_mask().with_origin(Vec2::new(100.0, 100.0));
        assert!(line_is_clear(&mask, Vec2::new(2.5, 2.5), Vec2::new(8.5, 2.5)));
        assert_eq!(mask.alpha_at(105, 100), Some(0));
        assert_eq!(mask.alpha_at(0, 0), None);
    }

    #[test]
    fn test_from_rgba() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(1, 0, image::Rgba([0, 0, 0, 200]));
        let mask = AlphaMask::from_rgba(&image).with_threshold(10);
        assert!(!mask.is_opaque(0, 0));
        assert!(mask.is_opaque(1, 0));
        assert!(AlphaMask::new(2, 2, vec![0; 3]).is_err());
    }

    #[test]
    fn test_closure_silhouette() {
        let wall = |x: i32, _y: i32| x != 3;
        assert!(!line_is_clear(&wall, Vec2::new(0.5, 0.5), Vec2::new(6.5, 0.5)));
    }
}
