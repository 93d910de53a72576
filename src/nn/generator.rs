//! 生成器网络
//!
//! 消费已嵌入、已施加输入 dropout 的序列，经前向/反向两个两层堆叠编码，
//! 拼接四个最终状态 `[h1f, h2f, h1b, h2b]`（[B, 4H]）后仿射投影为 T 个 logit，
//! logistic 压缩得到每词保留概率 `p ∈ (0,1)`。
//!
//! 离散的"保留/丢弃"判定用陡峭 logistic 松弛近似：
//! `keep = sigmoid(60·(p − 0.5))`，在可导的前提下逼近硬阈值；
//! 无效（填充）位置的 keep 被强制为 0。
//!
//! 同时暴露每词 surprise 代价
//! `log_pz = −(keep·ln(p+ε) + (1−keep)·ln(1−p+ε))`，ε = 0.001，
//! 供损失合成器构造稀疏/连贯正则。松弛陡度 60 与 ε 均为需原样保留的设计常数。

use ndarray::{Array1, Array2, Array3, Axis, Zip, concatenate, s};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::cell::{StackCache, StackParams};
use super::{Mode, sigmoid, xavier_uniform};

/// 硬阈值的 logistic 松弛陡度（越大越接近取整，梯度越尖锐）
pub const RELAXATION_STEEPNESS: f32 = 60.0;

/// surprise 代价中的对数下限常数
pub const LOG_EPS: f32 = 0.001;

/// 生成器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorParams {
    /// 前向堆叠（按 0..T 处理）
    pub fwd: StackParams,
    /// 反向堆叠（按 T-1..0 处理）
    pub bwd: StackParams,
    /// 拼接状态到 logit 的投影 [4H, T]
    pub w_out: Array2<f32>,
    /// logit 偏置 [T]
    pub b_out: Array1<f32>,
}

/// 生成器前向输出
pub struct GeneratorOutput {
    /// 每词保留概率 p [B, T]
    pub probs: Array2<f32>,
    /// 饱和且掩码后的保留判定 keep [B, T]（无效位置恒为 0）
    pub keep: Array2<f32>,
    /// 每词 surprise 代价 [B, T]
    pub log_pz: Array2<f32>,
    pub(crate) cache: GeneratorCache,
}

pub(crate) struct GeneratorCache {
    fwd: StackCache,
    bwd: StackCache,
    /// 拼接的最终状态 [B, 4H]
    states: Array2<f32>,
    /// 有效性掩码 [B, T]
    valid: Array2<f32>,
}

impl GeneratorParams {
    pub fn new(
        rng: &mut StdRng,
        embedding_dim: usize,
        hidden: usize,
        max_sentence: usize,
    ) -> Self {
        Self {
            fwd: StackParams::new(rng, embedding_dim, hidden),
            bwd: StackParams::new(rng, embedding_dim, hidden),
            w_out: xavier_uniform(rng, 4 * hidden, max_sentence),
            b_out: Array1::zeros(max_sentence),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            fwd: self.fwd.zeros_like(),
            bwd: self.bwd.zeros_like(),
            w_out: Array2::zeros(self.w_out.raw_dim()),
            b_out: Array1::zeros(self.b_out.raw_dim()),
        }
    }

    pub fn sq_norm(&self) -> f32 {
        self.fwd.sq_norm()
            + self.bwd.sq_norm()
            + self.w_out.iter().map(|v| v * v).sum::<f32>()
            + self.b_out.iter().map(|v| v * v).sum::<f32>()
    }

    pub fn add_scaled(&mut self, other: &Self, factor: f32) {
        self.fwd.add_scaled(&other.fwd, factor);
        self.bwd.add_scaled(&other.bwd, factor);
        self.w_out.zip_mut_with(&other.w_out, |a, &b| *a += factor * b);
        self.b_out.zip_mut_with(&other.b_out, |a, &b| *a += factor * b);
    }

    pub fn clip(&mut self, limit: f32) {
        self.fwd.clip(limit);
        self.bwd.clip(limit);
        self.w_out.mapv_inplace(|v| v.clamp(-limit, limit));
        self.b_out.mapv_inplace(|v| v.clamp(-limit, limit));
    }

    pub fn max_abs(&self) -> f32 {
        self.fwd
            .max_abs()
            .max(self.bwd.max_abs())
            .max(self.w_out.iter().fold(0.0f32, |a, &v| a.max(v.abs())))
            .max(self.b_out.iter().fold(0.0f32, |a, &v| a.max(v.abs())))
    }

    /// 前向传播
    ///
    /// - `x`: 嵌入且 dropout 后的输入 [B, T, E]
    /// - `valid`: 有效性掩码 [B, T]
    pub(crate) fn forward(
        &self,
        x: &Array3<f32>,
        lengths: &[usize],
        valid: &Array2<f32>,
        mode: Mode,
        keep_prob: f32,
        rng: &mut StdRng,
    ) -> GeneratorOutput {
        let fwd = self.fwd.forward(x, lengths, false, mode, keep_prob, rng);
        let bwd = self.bwd.forward(x, lengths, true, mode, keep_prob, rng);

        let states = concatenate![
            Axis(1),
            fwd.h1_final,
            fwd.h2_final,
            bwd.h1_final,
            bwd.h2_final
        ];

        let mut logits = states.dot(&self.w_out);
        logits += &self.b_out;
        let probs = logits.mapv(sigmoid);

        // 陡峭 logistic 松弛 + 无效位置强制 keep = 0
        let keep = Zip::from(&probs)
            .and(valid)
            .map_collect(|&p, &m| m * sigmoid(RELAXATION_STEEPNESS * (p - 0.5)));

        let log_pz = Zip::from(&keep).and(&probs).map_collect(|&k, &p| {
            -(k * (p + LOG_EPS).ln() + (1.0 - k) * (1.0 - p + LOG_EPS).ln())
        });

        GeneratorOutput {
            probs,
            keep,
            log_pz,
            cache: GeneratorCache {
                fwd: fwd.cache,
                bwd: bwd.cache,
                states,
                valid: valid.clone(),
            },
        }
    }

    /// 反向传播
    ///
    /// 梯度只经由 surprise 代价进入（门控替换本身不传导），
    /// keep 对 p 的依赖（含松弛陡度）一并计入链式法则。
    pub(crate) fn backward(
        &self,
        out: &GeneratorOutput,
        g_log_pz: &Array2<f32>,
    ) -> GeneratorParams {
        let mut grads = self.zeros_like();

        // d log_pz / d p，其中 keep = m·sigmoid(60(p−0.5))
        let g_probs = Zip::from(g_log_pz)
            .and(&out.probs)
            .and(&out.keep)
            .and(&out.cache.valid)
            .map_collect(|&g, &p, &k, &m| {
                let s = sigmoid(RELAXATION_STEEPNESS * (p - 0.5));
                let k_prime = m * RELAXATION_STEEPNESS * s * (1.0 - s);
                let d = -(k_prime * (p + LOG_EPS).ln() + k / (p + LOG_EPS)
                    - k_prime * (1.0 - p + LOG_EPS).ln()
                    - (1.0 - k) / (1.0 - p + LOG_EPS));
                g * d
            });

        // logit = states·W + b，p = sigmoid(logit)
        let g_logits = Zip::from(&g_probs)
            .and(&out.probs)
            .map_collect(|&g, &p| g * p * (1.0 - p));

        grads.w_out = out.cache.states.t().dot(&g_logits);
        grads.b_out = g_logits.sum_axis(Axis(0));

        let g_states = g_logits.dot(&self.w_out.t());
        let h = self.fwd.layer1.w_h.nrows();
        let g_h1f = g_states.slice(s![.., 0..h]).to_owned();
        let g_h2f = g_states.slice(s![.., h..2 * h]).to_owned();
        let g_h1b = g_states.slice(s![.., 2 * h..3 * h]).to_owned();
        let g_h2b = g_states.slice(s![.., 3 * h..4 * h]).to_owned();

        grads.fwd = self.fwd.backward(&out.cache.fwd, g_h1f, g_h2f);
        grads.bwd = self.bwd.backward(&out.cache.bwd, g_h1b, g_h2b);

        grads
    }
}
