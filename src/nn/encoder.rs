//! 编码器（预测）网络
//!
//! 用同一张嵌入表重新嵌入掩码后的序列（不再施加输入 dropout），
//! 经一个两层单向堆叠编码，拼接两层最终状态（[B, 2H]），
//! 仿射投影到 n_outputs 维并用 tanh 约束到 (-1, 1)。

use ndarray::{Array1, Array2, Array3, Axis, concatenate, s};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::cell::{StackCache, StackParams};
use super::{Mode, xavier_uniform};

/// 编码器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderParams {
    /// 单向两层堆叠（E → H → H）
    pub stack: StackParams,
    /// 拼接状态到输出的投影 [2H, n_outputs]
    pub w_out: Array2<f32>,
    /// 输出偏置 [n_outputs]
    pub b_out: Array1<f32>,
}

/// 编码器前向输出
pub struct EncoderOutput {
    /// 有界回归预测 [B, n_outputs]
    pub prediction: Array2<f32>,
    pub(crate) cache: EncoderCache,
}

pub(crate) struct EncoderCache {
    stack: StackCache,
    /// 拼接的两层最终状态 [B, 2H]
    h_cat: Array2<f32>,
}

impl EncoderParams {
    pub fn new(
        rng: &mut StdRng,
        embedding_dim: usize,
        hidden: usize,
        n_outputs: usize,
    ) -> Self {
        Self {
            stack: StackParams::new(rng, embedding_dim, hidden),
            w_out: xavier_uniform(rng, 2 * hidden, n_outputs),
            b_out: Array1::zeros(n_outputs),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            stack: self.stack.zeros_like(),
            w_out: Array2::zeros(self.w_out.raw_dim()),
            b_out: Array1::zeros(self.b_out.raw_dim()),
        }
    }

    pub fn sq_norm(&self) -> f32 {
        self.stack.sq_norm()
            + self.w_out.iter().map(|v| v * v).sum::<f32>()
            + self.b_out.iter().map(|v| v * v).sum::<f32>()
    }

    pub fn add_scaled(&mut self, other: &Self, factor: f32) {
        self.stack.add_scaled(&other.stack, factor);
        self.w_out.zip_mut_with(&other.w_out, |a, &b| *a += factor * b);
        self.b_out.zip_mut_with(&other.b_out, |a, &b| *a += factor * b);
    }

    pub fn clip(&mut self, limit: f32) {
        self.stack.clip(limit);
        self.w_out.mapv_inplace(|v| v.clamp(-limit, limit));
        self.b_out.mapv_inplace(|v| v.clamp(-limit, limit));
    }

    pub fn max_abs(&self) -> f32 {
        self.stack
            .max_abs()
            .max(self.w_out.iter().fold(0.0f32, |a, &v| a.max(v.abs())))
            .max(self.b_out.iter().fold(0.0f32, |a, &v| a.max(v.abs())))
    }

    /// 前向传播，`x` 为掩码后序列的嵌入 [B, T, E]
    pub(crate) fn forward(
        &self,
        x: &Array3<f32>,
        lengths: &[usize],
        mode: Mode,
        keep_prob: f32,
        rng: &mut StdRng,
    ) -> EncoderOutput {
        let out = self.stack.forward(x, lengths, false, mode, keep_prob, rng);
        let h_cat = concatenate![Axis(1), out.h1_final, out.h2_final];

        let mut a = h_cat.dot(&self.w_out);
        a += &self.b_out;
        let prediction = a.mapv_into(f32::tanh);

        EncoderOutput {
            prediction,
            cache: EncoderCache {
                stack: out.cache,
                h_cat,
            },
        }
    }

    /// 反向传播，`g_prediction` 为损失对预测的梯度 [B, n_outputs]
    pub(crate) fn backward(
        &self,
        out: &EncoderOutput,
        g_prediction: &Array2<f32>,
    ) -> EncoderParams {
        let mut grads = self.zeros_like();

        // prediction = tanh(h_cat·W + b)
        let u = g_prediction * &out.prediction.mapv(|v| 1.0 - v * v);
        grads.w_out = out.cache.h_cat.t().dot(&u);
        grads.b_out = u.sum_axis(Axis(0));

        let g_h_cat = u.dot(&self.w_out.t());
        let h = self.stack.layer1.w_h.nrows();
        let g_h1 = g_h_cat.slice(s![.., 0..h]).to_owned();
        let g_h2 = g_h_cat.slice(s![.., h..2 * h]).to_owned();

        grads.stack = self.stack.backward(&out.cache.stack, g_h1, g_h2);
        grads
    }
}
