//! 数据边界模块
//!
//! 提供训练/验证/测试三个划分的数据容器、minibatch 迭代、
//! 嵌入表解析与 rationale 标注解析。
//!
//! # 主要组件
//!
//! - [`Dataset`] / [`Batch`]: 定长填充的 token-id 序列 + 有效性掩码 + 真实长度 + 标签
//! - [`DataLoader`]: 每个 epoch 洗牌的 minibatch 加载器
//! - [`EmbeddingTable`]: 预训练词向量表（末尾追加保留的 mask 行）
//! - [`read_rationales`]: 人工标注 rationale 的二值矩阵解析
//! - [`DataError`]: 数据加载错误类型

mod dataset;
mod embedding;
mod loader;
mod rationale;

pub mod error;

pub use dataset::{Batch, Dataset};
pub use embedding::EmbeddingTable;
pub use error::DataError;
pub use loader::DataLoader;
pub use rationale::read_rationales;

#[cfg(test)]
mod tests;
