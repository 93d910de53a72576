//! 模型参数与一次前向/反向的显式组合
//!
//! 参数以带名字段的结构体显式持有（生成器/编码器各自独立），
//! 由训练循环独占所有权，只在优化器 apply 步被改写；
//! 前向是纯函数式的 `forward(batch, params) -> ForwardPass`，
//! 反向是独立的 `compute_gradients`，二者与训练循环解耦。

use ndarray::{Array2, Array3, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::data::{Batch, EmbeddingTable};
use crate::errors::ModelError;
use crate::nn::encoder::{EncoderOutput, EncoderParams};
use crate::nn::gating::apply_rationale_mask;
use crate::nn::generator::{GeneratorOutput, GeneratorParams};
use crate::nn::loss::{self, LossBreakdown};
use crate::nn::optimizer::{Adam, CLIP_LIMIT, clip_gradients};
use crate::nn::{Mode, dropout_mask};

/// 全部可训练参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    pub generator: GeneratorParams,
    pub encoder: EncoderParams,
}

impl ModelParams {
    /// 按配置初始化（Xavier 权重 + 零偏置）
    pub fn new(config: &Config, rng: &mut StdRng) -> Self {
        Self {
            generator: GeneratorParams::new(
                rng,
                config.embedding_dim,
                config.hidden_size,
                config.max_sentence,
            ),
            encoder: EncoderParams::new(
                rng,
                config.embedding_dim,
                config.hidden_size,
                config.n_outputs,
            ),
        }
    }

    /// 同形全零参数（梯度/动量容器）
    pub fn zeros_like(&self) -> Self {
        Self {
            generator: self.generator.zeros_like(),
            encoder: self.encoder.zeros_like(),
        }
    }

    /// 全部参数的平方和 Σ‖θ‖²
    pub fn sq_norm(&self) -> f32 {
        self.generator.sq_norm() + self.encoder.sq_norm()
    }

    /// `self += factor * other`（逐元素，L2 梯度累加用）
    pub fn add_scaled(&mut self, other: &Self, factor: f32) {
        self.generator.add_scaled(&other.generator, factor);
        self.encoder.add_scaled(&other.encoder, factor);
    }

    /// 逐元素钳制到 [-limit, limit]
    pub fn clip(&mut self, limit: f32) {
        self.generator.clip(limit);
        self.encoder.clip(limit);
    }

    /// 绝对值最大的元素（发散监控/测试用）
    pub fn max_abs(&self) -> f32 {
        self.generator.max_abs().max(self.encoder.max_abs())
    }
}

/// 一次前向传播的全部产物（生存期 = 一次前向）
pub struct ForwardPass {
    /// 门控替换后的序列 [B, T]
    pub masked_ids: Array2<usize>,
    pub(crate) gen_out: GeneratorOutput,
    pub(crate) enc_out: EncoderOutput,
}

impl ForwardPass {
    /// 回归预测 [B, n_outputs]
    pub fn prediction(&self) -> &Array2<f32> {
        &self.enc_out.prediction
    }

    /// 每词保留概率 p [B, T]
    pub fn probs(&self) -> &Array2<f32> {
        &self.gen_out.probs
    }

    /// 饱和且掩码后的保留判定 [B, T]
    pub fn keep(&self) -> &Array2<f32> {
        &self.gen_out.keep
    }

    /// 每词 surprise 代价 [B, T]
    pub fn log_pz(&self) -> &Array2<f32> {
        &self.gen_out.log_pz
    }
}

/// 生成器 + 编码器联合模型
///
/// 嵌入表加载后只读，被两个网络共享；
/// 数据集不在模型上驻留，逐 batch 显式传入。
pub struct RationaleModel {
    config: Config,
    embeddings: Array2<f32>,
    mask_id: usize,
    /// 可训练参数（只通过优化器 step 改写）
    pub params: ModelParams,
    rng: StdRng,
}

impl RationaleModel {
    /// 创建新模型并初始化参数
    pub fn new(config: Config, embeddings: &EmbeddingTable) -> Result<Self, ModelError> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let params = ModelParams::new(&config, &mut rng);
        Self::from_params(config, embeddings, params)
    }

    /// 从既有参数创建（检查点恢复）
    pub fn from_params(
        config: Config,
        embeddings: &EmbeddingTable,
        params: ModelParams,
    ) -> Result<Self, ModelError> {
        if embeddings.dim() != config.embedding_dim {
            return Err(ModelError::ShapeMismatch {
                context: "嵌入表维度与配置不一致".to_string(),
                expected: vec![config.embedding_dim],
                got: vec![embeddings.dim()],
            });
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            embeddings: embeddings.vectors().clone(),
            mask_id: embeddings.mask_id(),
            params,
            rng,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 保留的 mask 词 id
    pub fn mask_id(&self) -> usize {
        self.mask_id
    }

    /// 前向传播
    ///
    /// `Mode::Train` 启用 dropout（输入层 + 各堆叠的层间传递）；
    /// `Mode::Eval` 完全确定性。
    pub fn forward(&mut self, batch: &Batch, mode: Mode) -> Result<ForwardPass, ModelError> {
        self.check_batch(batch)?;

        let keep_prob = match mode {
            Mode::Train => self.config.dropout_keep_prob,
            Mode::Eval => 1.0,
        };

        let mut x = self.embed(&batch.ids)?;
        if mode == Mode::Train && keep_prob < 1.0 {
            let mask = dropout_mask(&mut self.rng, x.raw_dim(), keep_prob);
            x *= &mask;
        }

        let gen_out = self.params.generator.forward(
            &x,
            &batch.lengths,
            &batch.mask,
            mode,
            keep_prob,
            &mut self.rng,
        );

        let masked_ids = apply_rationale_mask(&batch.ids, &gen_out.keep, self.mask_id);
        let xm = self.embed(&masked_ids)?;

        let enc_out = self
            .params
            .encoder
            .forward(&xm, &batch.lengths, mode, keep_prob, &mut self.rng);

        Ok(ForwardPass {
            masked_ids,
            gen_out,
            enc_out,
        })
    }

    /// 一次训练前向 + 损失合成 + 反向，返回（损失分解, 未裁剪梯度）
    pub fn compute_gradients(
        &mut self,
        batch: &Batch,
    ) -> Result<(LossBreakdown, ModelParams), ModelError> {
        let fp = self.forward(batch, Mode::Train)?;

        let breakdown = loss::compose(
            &batch.labels,
            fp.prediction(),
            fp.log_pz(),
            self.params.sq_norm(),
            self.config.l2_weight,
        );
        let (g_prediction, g_log_pz) =
            loss::gradient_seeds(&batch.labels, fp.prediction(), fp.log_pz(), &breakdown);

        let mut grads = ModelParams {
            generator: self.params.generator.backward(&fp.gen_out, &g_log_pz),
            encoder: self.params.encoder.backward(&fp.enc_out, &g_prediction),
        };
        grads.add_scaled(&self.params, 2.0 * self.config.l2_weight);

        Ok((breakdown, grads))
    }

    /// 一次完整训练步：梯度 → 逐元素裁剪 → Adam 更新
    pub fn train_step(
        &mut self,
        batch: &Batch,
        optimizer: &mut Adam,
    ) -> Result<LossBreakdown, ModelError> {
        let (breakdown, mut grads) = self.compute_gradients(batch)?;
        clip_gradients(&mut grads, CLIP_LIMIT);
        optimizer.step(&mut self.params, &grads);
        Ok(breakdown)
    }

    /// 嵌入查表 [B, T] → [B, T, E]
    fn embed(&self, ids: &Array2<usize>) -> Result<Array3<f32>, ModelError> {
        let (batch, t_max) = ids.dim();
        let dim = self.embeddings.ncols();
        let vocab = self.embeddings.nrows();
        let mut out = Array3::zeros((batch, t_max, dim));
        for ((i, t), &id) in ids.indexed_iter() {
            if id >= vocab {
                return Err(ModelError::TokenIdOutOfRange { id, vocab });
            }
            out.slice_mut(s![i, t, ..]).assign(&self.embeddings.row(id));
        }
        Ok(out)
    }

    /// batch 维度契约校验（任何不一致即 fatal）
    fn check_batch(&self, batch: &Batch) -> Result<(), ModelError> {
        let (b, t) = batch.ids.dim();
        if t != self.config.max_sentence {
            return Err(ModelError::ShapeMismatch {
                context: "ids 列数须等于 max_sentence".to_string(),
                expected: vec![b, self.config.max_sentence],
                got: vec![b, t],
            });
        }
        if batch.labels.dim() != (b, self.config.n_outputs) {
            return Err(ModelError::ShapeMismatch {
                context: "labels 形状".to_string(),
                expected: vec![b, self.config.n_outputs],
                got: vec![batch.labels.nrows(), batch.labels.ncols()],
            });
        }
        if batch.mask.dim() != (b, t) {
            return Err(ModelError::ShapeMismatch {
                context: "mask 形状".to_string(),
                expected: vec![b, t],
                got: vec![batch.mask.nrows(), batch.mask.ncols()],
            });
        }
        if batch.lengths.len() != b {
            return Err(ModelError::ShapeMismatch {
                context: "lengths 长度".to_string(),
                expected: vec![b],
                got: vec![batch.lengths.len()],
            });
        }
        Ok(())
    }
}
