//! tanh-RNN 单元与两层定向堆叠
//!
//! 单元公式: `h_t = tanh(x_t @ W_x + h_{t-1} @ W_h + b)`
//!
//! 形状约定（与 PyTorch nn.RNNCell 对齐）:
//! - 输入: [batch, in_dim]
//! - 状态: [batch, hidden]
//! - W_x: [in_dim, hidden]；W_h: [hidden, hidden]；b: [hidden]
//!
//! 两个独立参数化的单元堆叠为一个定向编码器（第二层以第一层输出为输入）；
//! 层间传递施加 inverted dropout，循环携带与最终状态均为未 dropout 的状态。
//! 序列真实长度之外的步冻结状态（`h_t = h_{t-1}`），两个方向同规则，
//! 反向堆叠因此等价于按反转后的有效前缀处理。
//!
//! 形状不合法属编程契约违反，由 `ndarray` 的维度检查直接 panic，
//! 不设运行期可恢复的错误路径。

use ndarray::{Array1, Array2, Array3, Axis, Ix2, s};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::{Mode, dropout_mask, xavier_uniform};

/// 单个 RNN 单元的参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellParams {
    /// 输入到隐藏权重 [in_dim, hidden]
    pub w_x: Array2<f32>,
    /// 隐藏到隐藏权重 [hidden, hidden]
    pub w_h: Array2<f32>,
    /// 偏置 [hidden]
    pub b: Array1<f32>,
}

impl CellParams {
    /// Xavier 初始化权重、零初始化偏置
    pub fn new(rng: &mut StdRng, in_dim: usize, hidden: usize) -> Self {
        Self {
            w_x: xavier_uniform(rng, in_dim, hidden),
            w_h: xavier_uniform(rng, hidden, hidden),
            b: Array1::zeros(hidden),
        }
    }

    /// 与自身同形的全零参数（梯度/优化器动量的容器）
    pub fn zeros_like(&self) -> Self {
        Self {
            w_x: Array2::zeros(self.w_x.raw_dim()),
            w_h: Array2::zeros(self.w_h.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    /// 单步状态转移
    pub(crate) fn step(&self, x: &Array2<f32>, h_prev: &Array2<f32>) -> Array2<f32> {
        let mut a = x.dot(&self.w_x) + h_prev.dot(&self.w_h);
        a += &self.b;
        a.mapv_into(f32::tanh)
    }

    /// 全部参数的平方和
    pub fn sq_norm(&self) -> f32 {
        self.w_x.iter().map(|v| v * v).sum::<f32>()
            + self.w_h.iter().map(|v| v * v).sum::<f32>()
            + self.b.iter().map(|v| v * v).sum::<f32>()
    }

    /// `self += factor * other`（逐元素）
    pub fn add_scaled(&mut self, other: &Self, factor: f32) {
        self.w_x.zip_mut_with(&other.w_x, |a, &b| *a += factor * b);
        self.w_h.zip_mut_with(&other.w_h, |a, &b| *a += factor * b);
        self.b.zip_mut_with(&other.b, |a, &b| *a += factor * b);
    }

    /// 逐元素钳制到 [-limit, limit]
    pub fn clip(&mut self, limit: f32) {
        self.w_x.mapv_inplace(|v| v.clamp(-limit, limit));
        self.w_h.mapv_inplace(|v| v.clamp(-limit, limit));
        self.b.mapv_inplace(|v| v.clamp(-limit, limit));
    }

    /// 绝对值最大的元素
    pub fn max_abs(&self) -> f32 {
        self.w_x
            .iter()
            .chain(self.w_h.iter())
            .chain(self.b.iter())
            .fold(0.0f32, |acc, &v| acc.max(v.abs()))
    }
}

/// 两层定向堆叠的参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackParams {
    /// 第一层: in_dim → hidden
    pub layer1: CellParams,
    /// 第二层: hidden → hidden
    pub layer2: CellParams,
}

/// 堆叠前向的中间量（BPTT 所需）
pub(crate) struct StackCache {
    /// 时间步的处理顺序（前向 0..T，反向 T-1..0）
    order: Vec<usize>,
    /// 每个处理步的输入 [B, in_dim]
    xs: Vec<Array2<f32>>,
    /// 混合后的第一层状态，长度 T+1，首元素为零初态
    h1: Vec<Array2<f32>>,
    /// 混合后的第二层状态，长度 T+1
    h2: Vec<Array2<f32>>,
    /// 每个处理步喂给第二层的输入（dropout 后的第一层状态）
    d1: Vec<Array2<f32>>,
    /// 层间 dropout 掩码（评估期或 keep=1 时为 None）
    drop1: Option<Vec<Array2<f32>>>,
    /// 每个处理步的有效行列向量 [B, 1]
    valid: Vec<Array2<f32>>,
}

/// 堆叠前向的输出
pub(crate) struct StackOutput {
    /// 第一层最终状态 [B, hidden]
    pub h1_final: Array2<f32>,
    /// 第二层最终状态 [B, hidden]
    pub h2_final: Array2<f32>,
    pub cache: StackCache,
}

impl StackParams {
    pub fn new(rng: &mut StdRng, in_dim: usize, hidden: usize) -> Self {
        Self {
            layer1: CellParams::new(rng, in_dim, hidden),
            layer2: CellParams::new(rng, hidden, hidden),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            layer1: self.layer1.zeros_like(),
            layer2: self.layer2.zeros_like(),
        }
    }

    pub fn sq_norm(&self) -> f32 {
        self.layer1.sq_norm() + self.layer2.sq_norm()
    }

    pub fn add_scaled(&mut self, other: &Self, factor: f32) {
        self.layer1.add_scaled(&other.layer1, factor);
        self.layer2.add_scaled(&other.layer2, factor);
    }

    pub fn clip(&mut self, limit: f32) {
        self.layer1.clip(limit);
        self.layer2.clip(limit);
    }

    pub fn max_abs(&self) -> f32 {
        self.layer1.max_abs().max(self.layer2.max_abs())
    }

    /// 沿时间展开整个序列
    ///
    /// - `x`: [B, T, in_dim]（生成器侧已含输入 dropout）
    /// - `lengths`: 钳制后的真实长度，状态在 `t >= lengths[i]` 处冻结
    /// - `reverse`: 反向堆叠按 T-1..0 处理
    pub(crate) fn forward(
        &self,
        x: &Array3<f32>,
        lengths: &[usize],
        reverse: bool,
        mode: Mode,
        keep_prob: f32,
        rng: &mut StdRng,
    ) -> StackOutput {
        let (batch, t_max, _) = x.dim();
        let hidden = self.layer1.w_h.nrows();
        let use_dropout = mode == Mode::Train && keep_prob < 1.0;

        let order: Vec<usize> = if reverse {
            (0..t_max).rev().collect()
        } else {
            (0..t_max).collect()
        };

        let mut xs = Vec::with_capacity(t_max);
        let mut h1 = Vec::with_capacity(t_max + 1);
        let mut h2 = Vec::with_capacity(t_max + 1);
        let mut d1 = Vec::with_capacity(t_max);
        let mut drop1 = use_dropout.then(|| Vec::with_capacity(t_max));
        let mut valid_cols = Vec::with_capacity(t_max);

        h1.push(Array2::zeros((batch, hidden)));
        h2.push(Array2::zeros((batch, hidden)));

        for (k, &t) in order.iter().enumerate() {
            let x_t = x.slice(s![.., t, ..]).to_owned();
            let valid = Array2::from_shape_fn((batch, 1), |(i, _)| {
                if t < lengths[i] { 1.0 } else { 0.0 }
            });
            let inv = valid.mapv(|v| 1.0 - v);

            let cand1 = self.layer1.step(&x_t, &h1[k]);
            let h1_t = &cand1 * &valid + &h1[k] * &inv;

            let d1_t = match &mut drop1 {
                Some(masks) => {
                    let mask = dropout_mask(rng, Ix2(batch, hidden), keep_prob);
                    let dropped = &h1_t * &mask;
                    masks.push(mask);
                    dropped
                }
                None => h1_t.clone(),
            };

            let cand2 = self.layer2.step(&d1_t, &h2[k]);
            let h2_t = &cand2 * &valid + &h2[k] * &inv;

            xs.push(x_t);
            h1.push(h1_t);
            h2.push(h2_t);
            d1.push(d1_t);
            valid_cols.push(valid);
        }

        StackOutput {
            h1_final: h1[t_max].clone(),
            h2_final: h2[t_max].clone(),
            cache: StackCache {
                order,
                xs,
                h1,
                h2,
                d1,
                drop1,
                valid: valid_cols,
            },
        }
    }

    /// 沿时间反向传播
    ///
    /// 梯度从两层最终状态进入（来自上游拼接投影），
    /// 在冻结步经恒等携带直接穿透，返回本堆叠的参数梯度。
    /// 嵌入表不可训练，不回传输入梯度。
    pub(crate) fn backward(
        &self,
        cache: &StackCache,
        g_h1_final: Array2<f32>,
        g_h2_final: Array2<f32>,
    ) -> StackParams {
        let mut grads = self.zeros_like();
        let mut g_h1 = g_h1_final;
        let mut g_h2 = g_h2_final;

        for k in (0..cache.order.len()).rev() {
            let valid = &cache.valid[k];
            let inv = valid.mapv(|v| 1.0 - v);

            // 第二层: u2 = g_h2 ⊙ valid ⊙ tanh'(h2_t)
            let tanh2 = cache.h2[k + 1].mapv(|v| 1.0 - v * v);
            let u2 = (&g_h2 * valid) * &tanh2;
            grads.layer2.w_x += &cache.d1[k].t().dot(&u2);
            grads.layer2.w_h += &cache.h2[k].t().dot(&u2);
            grads.layer2.b += &u2.sum_axis(Axis(0));
            let g_d1 = u2.dot(&self.layer2.w_x.t());
            g_h2 = u2.dot(&self.layer2.w_h.t()) + &g_h2 * &inv;

            // 层间 dropout 掩码回传后并入第一层状态梯度
            match &cache.drop1 {
                Some(masks) => g_h1 += &(&g_d1 * &masks[k]),
                None => g_h1 += &g_d1,
            }

            // 第一层
            let tanh1 = cache.h1[k + 1].mapv(|v| 1.0 - v * v);
            let u1 = (&g_h1 * valid) * &tanh1;
            grads.layer1.w_x += &cache.xs[k].t().dot(&u1);
            grads.layer1.w_h += &cache.h1[k].t().dot(&u1);
            grads.layer1.b += &u1.sum_axis(Axis(0));
            g_h1 = u1.dot(&self.layer1.w_h.t()) + &g_h1 * &inv;
        }

        grads
    }
}
