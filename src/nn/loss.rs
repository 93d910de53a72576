//! 损失合成器
//!
//! 逐样本代价：
//! `cost = pred_diff + 0.3·z_sum + 0.6·z_diff`
//! - `pred_diff`: 预测平方误差（按输出维求和）
//! - `z_sum = Σ_t log_pz`: 稀疏性惩罚（保留越多、代价越大）
//! - `z_diff = Σ_t |log_pz[t] − log_pz[t−1]|`: 连贯性（全变差）惩罚
//!
//! 标量目标：`10 · mean_b(cost · z_sum) + l2_weight · Σ‖θ‖²`。
//!
//! `cost · z_sum` 的乘积是对不可导硬选择的 score-function（REINFORCE 风格）
//! 梯度估计替代，属原始设计的一部分，为行为一致性按原样保留。
//!
//! 除标量目标外，本模块同时给出闭式梯度种子：
//! 损失对预测的梯度与损失对 log_pz 的梯度，供两个网络各自 BPTT。

use ndarray::{Array1, Array2, Axis};

/// 稀疏性系数
pub const SPARSITY_FACTOR: f32 = 0.3;
/// 连贯性与稀疏性系数之比
pub const COHERENT_RATIO: f32 = 2.0;
/// 连贯性系数
pub const COHERENT_FACTOR: f32 = SPARSITY_FACTOR * COHERENT_RATIO;
/// 目标整体缩放
pub const OBJECTIVE_SCALE: f32 = 10.0;

/// 一个 minibatch 的损失分解
#[derive(Debug, Clone)]
pub struct LossBreakdown {
    /// 标量训练目标（含 L2 正则）
    pub objective: f32,
    /// 逐样本预测平方误差 [B]
    pub pred_diff: Array1<f32>,
    /// 逐样本 Σ log_pz [B]
    pub z_sum: Array1<f32>,
    /// 逐样本全变差 [B]
    pub z_diff: Array1<f32>,
    /// 逐样本合成代价 [B]
    pub cost: Array1<f32>,
}

/// 合成标量训练目标
pub fn compose(
    labels: &Array2<f32>,
    prediction: &Array2<f32>,
    log_pz: &Array2<f32>,
    params_sq_norm: f32,
    l2_weight: f32,
) -> LossBreakdown {
    let diff = labels - prediction;
    let pred_diff = diff.mapv(|v| v * v).sum_axis(Axis(1));

    let z_sum = log_pz.sum_axis(Axis(1));
    let z_diff = total_variation(log_pz);

    let cost = &pred_diff + &(&z_sum * SPARSITY_FACTOR) + &(&z_diff * COHERENT_FACTOR);

    let batch = labels.nrows() as f32;
    let mean = (&cost * &z_sum).sum() / batch;
    let objective = OBJECTIVE_SCALE * mean + l2_weight * params_sq_norm;

    LossBreakdown {
        objective,
        pred_diff,
        z_sum,
        z_diff,
        cost,
    }
}

/// 梯度种子：(∂obj/∂prediction, ∂obj/∂log_pz)
///
/// L2 项的梯度不在此处，由调用方按 `2·l2_weight·θ` 直接累加到参数梯度上。
pub fn gradient_seeds(
    labels: &Array2<f32>,
    prediction: &Array2<f32>,
    log_pz: &Array2<f32>,
    breakdown: &LossBreakdown,
) -> (Array2<f32>, Array2<f32>) {
    let (batch, t_max) = log_pz.dim();
    let scale = OBJECTIVE_SCALE / batch as f32;

    // ∂obj/∂ŷ = scale · z_sum · 2(ŷ − y)
    let mut g_prediction = prediction - labels;
    for (i, mut row) in g_prediction.axis_iter_mut(Axis(0)).enumerate() {
        row.mapv_inplace(|v| v * 2.0 * scale * breakdown.z_sum[i]);
    }

    // ∂obj/∂log_pz[t] = scale · (cost + 0.3·z_sum + 0.6·z_sum·tv_sign(t))
    let mut g_log_pz = Array2::<f32>::zeros((batch, t_max));
    for i in 0..batch {
        let base = scale * (breakdown.cost[i] + SPARSITY_FACTOR * breakdown.z_sum[i]);
        let tv_scale = scale * COHERENT_FACTOR * breakdown.z_sum[i];
        for t in 0..t_max {
            let mut tv = 0.0;
            if t >= 1 {
                tv += sgn(log_pz[[i, t]] - log_pz[[i, t - 1]]);
            }
            if t + 1 < t_max {
                tv -= sgn(log_pz[[i, t + 1]] - log_pz[[i, t]]);
            }
            g_log_pz[[i, t]] = base + tv_scale * tv;
        }
    }

    (g_prediction, g_log_pz)
}

/// 逐样本全变差 Σ_t |x[t] − x[t−1]|
fn total_variation(x: &Array2<f32>) -> Array1<f32> {
    let (batch, t_max) = x.dim();
    let mut out = Array1::zeros(batch);
    for i in 0..batch {
        for t in 1..t_max {
            out[i] += (x[[i, t]] - x[[i, t - 1]]).abs();
        }
    }
    out
}

/// |·| 的次梯度符号（0 处取 0，与绝对值在原点的惯例一致）
fn sgn(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
