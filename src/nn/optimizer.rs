//! 逐元素梯度裁剪 + Adam 优化器
//!
//! 裁剪在矩估计之前进行：先把每个梯度元素钳制到 [-limit, limit]，
//! 再对裁剪后的梯度做 Adam 更新（不做基于范数的整体缩放）。
//!
//! 更新公式（带偏差修正）：
//! `m = β1·m + (1−β1)·g`；`v = β2·v + (1−β2)·g²`；
//! `θ −= lr · (m/bc1) / (√(v/bc2) + ε)`。

use ndarray::{Array, Dimension, Zip};

use crate::model::ModelParams;

use super::cell::{CellParams, StackParams};
use super::encoder::EncoderParams;
use super::generator::GeneratorParams;

/// 梯度逐元素裁剪上限
pub const CLIP_LIMIT: f32 = 1.0;

/// 把所有梯度元素钳制到 [-limit, limit]
pub fn clip_gradients(grads: &mut ModelParams, limit: f32) {
    grads.clip(limit);
}

/// Adam 优化器（自适应矩估计，固定学习率）
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// 时间步
    t: i32,
    /// 一阶矩估计
    m: ModelParams,
    /// 二阶矩估计
    v: ModelParams,
}

/// 单步更新的共享上下文（含偏差修正因子）
struct StepCtx {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    bc1: f32,
    bc2: f32,
}

impl Adam {
    /// 使用默认矩参数创建（β1=0.9, β2=0.999, ε=1e-8）
    pub fn new(template: &ModelParams, learning_rate: f32) -> Self {
        Self::with_params(template, learning_rate, 0.9, 0.999, 1e-8)
    }

    /// 使用指定矩参数创建
    pub fn with_params(
        template: &ModelParams,
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: template.zeros_like(),
            v: template.zeros_like(),
        }
    }

    /// 当前学习率
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// 清空动量并重置时间步
    pub fn reset(&mut self) {
        self.m = self.m.zeros_like();
        self.v = self.v.zeros_like();
        self.t = 0;
    }

    /// 应用一次参数更新（`grads` 应已完成裁剪）
    pub fn step(&mut self, params: &mut ModelParams, grads: &ModelParams) {
        self.t += 1;
        let ctx = StepCtx {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bc1: 1.0 - self.beta1.powi(self.t),
            bc2: 1.0 - self.beta2.powi(self.t),
        };
        step_model(params, grads, &mut self.m, &mut self.v, &ctx);
    }
}

fn step_model(
    p: &mut ModelParams,
    g: &ModelParams,
    m: &mut ModelParams,
    v: &mut ModelParams,
    ctx: &StepCtx,
) {
    step_generator(&mut p.generator, &g.generator, &mut m.generator, &mut v.generator, ctx);
    step_encoder(&mut p.encoder, &g.encoder, &mut m.encoder, &mut v.encoder, ctx);
}

fn step_generator(
    p: &mut GeneratorParams,
    g: &GeneratorParams,
    m: &mut GeneratorParams,
    v: &mut GeneratorParams,
    ctx: &StepCtx,
) {
    step_stack(&mut p.fwd, &g.fwd, &mut m.fwd, &mut v.fwd, ctx);
    step_stack(&mut p.bwd, &g.bwd, &mut m.bwd, &mut v.bwd, ctx);
    update(&mut p.w_out, &g.w_out, &mut m.w_out, &mut v.w_out, ctx);
    update(&mut p.b_out, &g.b_out, &mut m.b_out, &mut v.b_out, ctx);
}

fn step_encoder(
    p: &mut EncoderParams,
    g: &EncoderParams,
    m: &mut EncoderParams,
    v: &mut EncoderParams,
    ctx: &StepCtx,
) {
    step_stack(&mut p.stack, &g.stack, &mut m.stack, &mut v.stack, ctx);
    update(&mut p.w_out, &g.w_out, &mut m.w_out, &mut v.w_out, ctx);
    update(&mut p.b_out, &g.b_out, &mut m.b_out, &mut v.b_out, ctx);
}

fn step_stack(
    p: &mut StackParams,
    g: &StackParams,
    m: &mut StackParams,
    v: &mut StackParams,
    ctx: &StepCtx,
) {
    step_cell(&mut p.layer1, &g.layer1, &mut m.layer1, &mut v.layer1, ctx);
    step_cell(&mut p.layer2, &g.layer2, &mut m.layer2, &mut v.layer2, ctx);
}

fn step_cell(
    p: &mut CellParams,
    g: &CellParams,
    m: &mut CellParams,
    v: &mut CellParams,
    ctx: &StepCtx,
) {
    update(&mut p.w_x, &g.w_x, &mut m.w_x, &mut v.w_x, ctx);
    update(&mut p.w_h, &g.w_h, &mut m.w_h, &mut v.w_h, ctx);
    update(&mut p.b, &g.b, &mut m.b, &mut v.b, ctx);
}

fn update<D: Dimension>(
    p: &mut Array<f32, D>,
    g: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    ctx: &StepCtx,
) {
    Zip::from(p).and(g).and(m).and(v).for_each(|p, &g, m, v| {
        *m = ctx.beta1 * *m + (1.0 - ctx.beta1) * g;
        *v = ctx.beta2 * *v + (1.0 - ctx.beta2) * g * g;
        let m_hat = *m / ctx.bc1;
        let v_hat = *v / ctx.bc2;
        *p -= ctx.lr * m_hat / (v_hat.sqrt() + ctx.epsilon);
    });
}
