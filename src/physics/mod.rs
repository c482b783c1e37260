//! 物理模块
//!
//! 基于 Verlet 积分的 2D 骨骼物理：
//! - 重力、阻尼、速度限制
//! - 父子距离约束
//! - 角度约束（姿态回复 + 硬限制）
//! - 地面碰撞与拖拽

mod config;
mod constraint;
mod world;

pub use config::{AngleConstraintMode, PhysicsConfig};
pub use constraint::DistanceConstraint;
pub use world::{PhysicsWorld, StepReport};
