//! 单次运行的超参数配置
//!
//! 构造后不可变；由数据形状（句长上限、嵌入维度、输出维度）
//! 与固定超参数共同决定。

/// 训练配置
///
/// 默认值对应参考实验：啤酒评论 aspect 回归，
/// 句长上限 300，隐藏维度 200，batch 32，10 个 epoch。
#[derive(Debug, Clone)]
pub struct Config {
    /// 句长上限（超过的序列会被截断，长度被钳制到该值）
    pub max_sentence: usize,
    /// 词向量维度
    pub embedding_dim: usize,
    /// RNN 隐藏状态维度
    pub hidden_size: usize,
    /// 回归输出维度（单 aspect 为 1）
    pub n_outputs: usize,
    /// 每个 minibatch 的样本数
    pub batch_size: usize,
    /// 训练轮数
    pub epochs: usize,
    /// Adam 学习率
    pub learning_rate: f32,
    /// dropout 保留概率（训练期生效，评估期恒为 1.0）
    pub dropout_keep_prob: f32,
    /// L2 正则权重
    pub l2_weight: f32,
    /// 随机种子（权重初始化、dropout、epoch 洗牌）
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sentence: 300,
            embedding_dim: 200,
            hidden_size: 200,
            n_outputs: 1,
            batch_size: 32,
            epochs: 10,
            learning_rate: 1e-3,
            dropout_keep_prob: 0.5,
            l2_weight: 1e-6,
            seed: 42,
        }
    }
}
