//! 训练循环、模型选择与评估
//!
//! 状态机：`Init → { TrainEpoch → EvaluateDev → SaveIfBest } × epochs → Done`。
//! 每个 epoch 以 `seed + epoch` 重新洗牌；每个 minibatch 恰好更新一次参数；
//! dev MSE 以关闭 dropout 的确定性前向在完整验证集上计算；
//! 仅当 dev MSE 严格低于历史最优时覆盖写检查点（并列不保存）。

use std::path::Path;

use ndarray::Array2;

use crate::checkpoint::save_params;
use crate::data::{DataLoader, Dataset};
use crate::errors::ModelError;
use crate::model::RationaleModel;
use crate::nn::Mode;
use crate::nn::optimizer::Adam;

/// rationale 抽取质量指标
///
/// 分母为零（一个词都没保留 / 标注全零）时取 `None` 哨兵，
/// 绝不产生除零故障。
#[derive(Debug, Clone, Copy)]
pub struct RationaleMetrics {
    /// 精确率 Σ keep·truth / Σ keep
    pub precision: Option<f32>,
    /// 召回率 Σ keep·truth / Σ truth
    pub recall: Option<f32>,
    /// 被标记为"保留"的词计数 Σ keep
    pub kept_tokens: f32,
}

/// 单个 epoch 的训练/评估报告
#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    /// 本 epoch 各 minibatch 训练目标的均值
    pub train_loss: f32,
    pub train_mse: f32,
    pub dev_mse: f32,
    pub test_mse: Option<f32>,
    pub rationale: Option<RationaleMetrics>,
    /// 本 epoch 是否刷新了最优 dev MSE 并写了检查点
    pub saved: bool,
}

/// 整次训练的汇总
#[derive(Debug, Clone)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    pub best_dev_mse: f32,
}

/// dev MSE 的严格改进跟踪器
struct BestTracker {
    best: f32,
}

impl BestTracker {
    fn new() -> Self {
        Self { best: f32::INFINITY }
    }

    /// 严格小于历史最优才算改进；并列返回 false
    fn improved(&mut self, mse: f32) -> bool {
        if mse < self.best {
            self.best = mse;
            true
        } else {
            false
        }
    }

    fn best(&self) -> f32 {
        self.best
    }
}

/// 训练入口：按 epoch 迭代，保存 dev MSE 最优的参数快照
///
/// 检查点写失败即上报（不重试）；损失出现非有限值立即终止。
pub fn fit(
    model: &mut RationaleModel,
    train_set: &Dataset,
    dev_set: &Dataset,
    test_set: Option<&Dataset>,
    checkpoint_path: &Path,
) -> Result<FitReport, ModelError> {
    let config = model.config().clone();
    let mut optimizer = Adam::new(&model.params, config.learning_rate);
    let mut tracker = BestTracker::new();
    let mut reports = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        println!("Epoch {} / {}", epoch + 1, config.epochs);

        let loader = DataLoader::new(config.batch_size)
            .shuffle(true)
            .seed(config.seed.wrapping_add(epoch as u64));

        let mut loss_sum = 0.0;
        let mut n_batches = 0usize;
        for (batch_idx, batch) in loader.iter(train_set).enumerate() {
            let breakdown = model.train_step(&batch, &mut optimizer)?;
            if !breakdown.objective.is_finite() {
                return Err(ModelError::NonFiniteLoss {
                    epoch,
                    batch: batch_idx,
                    value: breakdown.objective,
                });
            }
            loss_sum += breakdown.objective;
            n_batches += 1;
        }
        let train_loss = loss_sum / n_batches.max(1) as f32;

        let train_mse = evaluate_mse(model, train_set)?;
        let dev_mse = evaluate_mse(model, dev_set)?;
        println!("  train loss: {train_loss:.6}");
        println!("  train MSE:  {train_mse:.6}");
        println!("  dev MSE:    {dev_mse:.6}");

        let mut test_mse = None;
        let mut rationale = None;
        if let Some(test) = test_set {
            let mse = evaluate_mse(model, test)?;
            println!("  test MSE:   {mse:.6}");
            test_mse = Some(mse);
            if test.has_rationales() {
                let metrics = evaluate_rationales(model, test)?;
                match metrics.precision {
                    Some(p) => println!("  rationale 精确率: {p:.4}"),
                    None => println!("  rationale 精确率: 未定义（无保留词）"),
                }
                println!("  保留词计数: {:.0}", metrics.kept_tokens);
                rationale = Some(metrics);
            }
        }

        let saved = tracker.improved(dev_mse);
        if saved {
            save_params(&model.params, checkpoint_path)?;
            println!("  dev MSE 新低，检查点已写入 {}", checkpoint_path.display());
        }

        reports.push(EpochReport {
            epoch,
            train_loss,
            train_mse,
            dev_mse,
            test_mse,
            rationale,
            saved,
        });
    }

    Ok(FitReport {
        epochs: reports,
        best_dev_mse: tracker.best(),
    })
}

/// 完整数据划分上的均方误差（dropout 关闭，按原顺序遍历）
pub fn evaluate_mse(model: &mut RationaleModel, dataset: &Dataset) -> Result<f32, ModelError> {
    let loader = DataLoader::new(model.config().batch_size);
    let mut se = 0.0;
    for batch in loader.iter(dataset) {
        let fp = model.forward(&batch, Mode::Eval)?;
        let diff = &batch.labels - fp.prediction();
        se += diff.mapv(|v| v * v).sum();
    }
    Ok(se / dataset.len() as f32)
}

/// 标注划分上的 rationale 指标（跨 batch 累加分子/分母后再取比值）
pub fn evaluate_rationales(
    model: &mut RationaleModel,
    dataset: &Dataset,
) -> Result<RationaleMetrics, ModelError> {
    if !dataset.has_rationales() {
        return Err(ModelError::MissingRationales);
    }

    let loader = DataLoader::new(model.config().batch_size);
    let mut overlap = 0.0;
    let mut kept = 0.0;
    let mut truth_total = 0.0;
    for batch in loader.iter(dataset) {
        let fp = model.forward(&batch, Mode::Eval)?;
        // has_rationales 已校验，gather 保证逐 batch 携带
        if let Some(truth) = &batch.rationales {
            overlap += (fp.keep() * truth).sum();
            truth_total += truth.sum();
        }
        kept += fp.keep().sum();
    }

    Ok(RationaleMetrics {
        precision: ratio(overlap, kept),
        recall: ratio(overlap, truth_total),
        kept_tokens: kept,
    })
}

/// 单个 keep/truth 矩阵对的精确率（分母为零 → None）
pub fn rationale_precision(keep: &Array2<f32>, truth: &Array2<f32>) -> Option<f32> {
    ratio((keep * truth).sum(), keep.sum())
}

fn ratio(numerator: f32, denominator: f32) -> Option<f32> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else {
        None
    }
}

/// 把四舍五入后的 keep 掩码导出为 `.npy`（按数据集原顺序逐行写入）
pub fn export_keep_masks(
    model: &mut RationaleModel,
    dataset: &Dataset,
    path: &Path,
) -> Result<(), ModelError> {
    let mut rows = Array2::<f32>::zeros((dataset.len(), model.config().max_sentence));
    let loader = DataLoader::new(model.config().batch_size);
    let mut offset = 0;
    for batch in loader.iter(dataset) {
        let fp = model.forward(&batch, Mode::Eval)?;
        let rounded = fp.keep().mapv(|k| if k > 0.5 { 1.0 } else { 0.0 });
        rows.slice_mut(ndarray::s![offset..offset + batch.len(), ..])
            .assign(&rounded);
        offset += batch.len();
    }
    ndarray_npy::write_npy(path, &rows)?;
    Ok(())
}
