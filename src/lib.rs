//! # Rationale RNN
//!
//! `rationale_rnn`实现「生成器 + 编码器」联合训练的评论理由抽取模型：
//! 生成器（双向两层 tanh-RNN）为每个词输出"保留"概率（rationale 掩码），
//! 门控阶段把被丢弃的位置替换为保留的 mask 词 id，
//! 编码器（单向两层 tanh-RNN）在掩码后的序列上回归连续的方面评分。
//!
//! 联合损失 = 预测误差 + 稀疏性惩罚 + 连贯性惩罚 + L2 正则；
//! 优化器为 Adam（梯度先逐元素裁剪到 [-1, 1]）；
//! 训练循环按 dev MSE 严格改进保存最优检查点。

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod errors;
pub mod model;
pub mod nn;
pub mod train;

pub use checkpoint::{load_params, save_params};
pub use config::Config;
pub use data::{Batch, DataLoader, Dataset, EmbeddingTable};
pub use errors::ModelError;
pub use model::{ForwardPass, ModelParams, RationaleModel};
pub use nn::{Adam, Mode};
pub use train::{
    EpochReport, FitReport, RationaleMetrics, evaluate_mse, evaluate_rationales,
    export_keep_masks, fit, rationale_precision,
};
