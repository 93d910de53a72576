//! 神经网络核心模块
//!
//! 按数据流组织：
//! - [`cell`]: tanh-RNN 单元与两层定向堆叠（前向 + BPTT）
//! - [`generator`]: 生成器网络（双向堆叠 → 每词保留概率 + surprise 代价）
//! - [`gating`]: 门控阶段（保留概率 → 掩码替换，纯函数）
//! - [`encoder`]: 编码器网络（掩码序列 → 有界回归预测）
//! - [`loss`]: 损失合成器（预测误差 + 稀疏 + 连贯 + L2）与梯度种子
//! - [`optimizer`]: 逐元素梯度裁剪 + Adam

pub mod cell;
pub mod encoder;
pub mod gating;
pub mod generator;
pub mod loss;
pub mod optimizer;

pub use cell::{CellParams, StackParams};
pub use encoder::EncoderParams;
pub use generator::GeneratorParams;
pub use optimizer::{Adam, clip_gradients};

#[cfg(test)]
mod tests;

use ndarray::{Array, Array2, Dimension};
use rand::Rng;
use rand::rngs::StdRng;

/// 前向传播模式
///
/// 训练期启用 dropout；评估期 dropout 关闭（保留概率视为 1.0）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// 标准 logistic 函数
#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Xavier/Glorot 均匀初始化: U(-s, s), s = sqrt(6 / (fan_in + fan_out))
pub(crate) fn xavier_uniform(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let scale = (6.0 / (fan_in + fan_out) as f32).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-scale..scale))
}

/// 反向缩放（inverted）dropout 掩码：元素为 0 或 1/keep_prob
///
/// 训练期乘上该掩码即可，评估期无需任何缩放。
pub(crate) fn dropout_mask<D: Dimension>(
    rng: &mut StdRng,
    dim: D,
    keep_prob: f32,
) -> Array<f32, D> {
    let scale = 1.0 / keep_prob;
    Array::from_shape_fn(dim, |_| {
        if rng.gen_range(0.0..1.0f32) < keep_prob {
            scale
        } else {
            0.0
        }
    })
}
