//! 模型训练错误类型定义

use thiserror::Error;

/// 训练/推理相关错误
///
/// 形状类错误属于构造期契约违反，一旦出现应终止本次运行；
/// 损失发散（NaN/Inf）只上报，不做自动回退或重试。
#[derive(Debug, Error)]
pub enum ModelError {
    /// 形状不匹配（batch 维度或网络配置不一致）
    #[error("形状不匹配（{context}）：期望 {expected:?}，实际 {got:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// 词 id 超出嵌入表范围
    #[error("词 id 越界：{id} >= 词表大小 {vocab}")]
    TokenIdOutOfRange { id: usize, vocab: usize },

    /// 损失出现非有限值（优化发散），不自动恢复
    #[error("损失非有限（epoch {epoch}，batch {batch}）：{value}")]
    NonFiniteLoss {
        epoch: usize,
        batch: usize,
        value: f32,
    },

    /// 该数据集缺少人工标注的 rationale，无法计算精确率/召回率
    #[error("数据集缺少 rationale 标注")]
    MissingRationales,

    /// IO 错误（检查点读写等）
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 检查点（反）序列化错误
    #[error("检查点序列化错误: {0}")]
    Serialization(#[from] bincode::Error),

    /// 预测 rationale 掩码导出错误
    #[error("npy 写出错误: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    /// 数据加载边界错误
    #[error(transparent)]
    Data(#[from] crate::data::DataError),
}
