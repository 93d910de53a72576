//! 端到端集成测试：合成评论数据上的生成器 + 编码器联合训练
//!
//! 合成任务：词表中的 token 1 是"证据词"，标签由有效前缀内
//! 是否出现证据词决定；rationale 标注即证据词出现的位置。
//! 覆盖单步训练、门控一致性、检查点选择与评估确定性。

use std::env;
use std::fs;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rationale_rnn::nn::optimizer::CLIP_LIMIT;
use rationale_rnn::{
    Config, Dataset, EmbeddingTable, Mode, ModelError, RationaleModel, evaluate_mse, fit,
    load_params, nn::clip_gradients,
};

const VOCAB: usize = 12; // 含末尾 mask 词
const EVIDENCE_TOKEN: usize = 1;

fn tiny_config() -> Config {
    Config {
        max_sentence: 6,
        embedding_dim: 5,
        hidden_size: 8,
        n_outputs: 1,
        batch_size: 8,
        epochs: 3,
        learning_rate: 1e-3,
        dropout_keep_prob: 0.8,
        l2_weight: 1e-6,
        seed: 42,
    }
}

fn synthetic_embeddings(seed: u64) -> EmbeddingTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let vectors = Array2::from_shape_fn((VOCAB, 5), |(i, _)| {
        if i == VOCAB - 1 {
            0.0
        } else {
            rng.gen_range(-0.5..0.5)
        }
    });
    EmbeddingTable::from_array(vectors)
}

fn synthetic_dataset(n: usize, seed: u64) -> Dataset {
    let config = tiny_config();
    let t_max = config.max_sentence;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut ids = Array2::<usize>::zeros((n, t_max));
    let mut lengths = Vec::with_capacity(n);
    let mut labels = Array2::<f32>::zeros((n, 1));
    let mut rationales = Array2::<f32>::zeros((n, t_max));

    for i in 0..n {
        let len = rng.gen_range(3..=t_max);
        lengths.push(len);
        let mut has_evidence = false;
        for t in 0..t_max {
            // 不采样保留的 mask 词
            let id = rng.gen_range(0..VOCAB - 1);
            ids[[i, t]] = id;
            if t < len && id == EVIDENCE_TOKEN {
                has_evidence = true;
                rationales[[i, t]] = 1.0;
            }
        }
        labels[[i, 0]] = if has_evidence { 0.6 } else { -0.6 };
    }

    Dataset::new(ids, labels, lengths, Some(rationales), t_max).expect("合成数据集非法")
}

#[test]
fn single_step_produces_finite_loss_and_clipped_gradients() -> Result<(), ModelError> {
    let config = tiny_config();
    let embeddings = synthetic_embeddings(1);
    let mut model = RationaleModel::new(config, &embeddings)?;
    let dataset = synthetic_dataset(8, 2);
    let batch = dataset.gather(&[0, 1, 2, 3, 4, 5, 6, 7]);

    // ==================== 一次前向 + 反向 ====================
    let (breakdown, mut grads) = model.compute_gradients(&batch)?;
    println!("单步训练目标: {:.6}", breakdown.objective);
    assert!(breakdown.objective.is_finite(), "损失必须有限");
    assert!(breakdown.cost.iter().all(|v| v.is_finite()));

    // ==================== 裁剪后逐元素有界 ====================
    clip_gradients(&mut grads, CLIP_LIMIT);
    let max_abs = grads.max_abs();
    println!("裁剪后最大梯度绝对值: {max_abs:.6}");
    assert!(max_abs <= CLIP_LIMIT);
    Ok(())
}

#[test]
fn keep_masks_are_bounded_and_consistent_with_gating() -> Result<(), ModelError> {
    let config = tiny_config();
    let embeddings = synthetic_embeddings(3);
    let mut model = RationaleModel::new(config, &embeddings)?;
    let dataset = synthetic_dataset(8, 4);
    let batch = dataset.gather(&[0, 1, 2, 3]);

    let fp = model.forward(&batch, Mode::Eval)?;

    for ((i, t), &k) in fp.keep().indexed_iter() {
        assert!((0.0..=1.0).contains(&k), "keep 越界: {k}");
        if t >= batch.lengths[i] {
            assert_eq!(k, 0.0, "填充位置的 keep 必须为 0");
        }
        // 门控替换与 keep 判定一致
        if k > 0.5 {
            assert_eq!(fp.masked_ids[[i, t]], batch.ids[[i, t]]);
        } else {
            assert_eq!(fp.masked_ids[[i, t]], model.mask_id());
        }
    }
    // 预测被 tanh 约束在 (-1, 1)
    assert!(fp.prediction().iter().all(|v| v.abs() < 1.0));
    Ok(())
}

#[test]
fn training_saves_strictly_improving_checkpoints() -> Result<(), ModelError> {
    let config = tiny_config();
    let embeddings = synthetic_embeddings(5);
    let mut model = RationaleModel::new(config.clone(), &embeddings)?;

    let train_set = synthetic_dataset(24, 10);
    let dev_set = synthetic_dataset(16, 11);
    let test_set = synthetic_dataset(16, 12);

    let path = env::temp_dir().join("rationale_rnn_fit_test.bin");

    // ==================== 训练 ====================
    let report = fit(&mut model, &train_set, &dev_set, Some(&test_set), &path)?;

    assert_eq!(report.epochs.len(), config.epochs);
    assert!(report.epochs.iter().all(|e| e.train_loss.is_finite()));
    // 首个 epoch 必然刷新初始的无穷大
    assert!(report.epochs[0].saved);
    // 保存过的 epoch 之间 dev MSE 严格递减
    let saved_mse: Vec<f32> = report
        .epochs
        .iter()
        .filter(|e| e.saved)
        .map(|e| e.dev_mse)
        .collect();
    assert!(saved_mse.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(report.best_dev_mse, *saved_mse.last().expect("至少保存一次"));
    // 标注划分产出 rationale 指标
    assert!(report.epochs[0].rationale.is_some());

    // ==================== 检查点恢复 ====================
    assert!(path.exists(), "检查点文件应已写入");
    let restored = load_params(&path)?;
    let mut restored_model = RationaleModel::from_params(config, &embeddings, restored)?;
    let restored_dev = evaluate_mse(&mut restored_model, &dev_set)?;
    println!("恢复后 dev MSE: {restored_dev:.6}（最优 {:.6}）", report.best_dev_mse);
    assert!((restored_dev - report.best_dev_mse).abs() < 1e-5);

    fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn checkpoint_roundtrip_preserves_exact_parameters() -> Result<(), ModelError> {
    let config = tiny_config();
    let embeddings = synthetic_embeddings(8);
    let model = RationaleModel::new(config, &embeddings)?;

    let path = env::temp_dir().join("rationale_rnn_roundtrip_test.bin");
    rationale_rnn::save_params(&model.params, &path)?;
    let loaded = load_params(&path)?;
    fs::remove_file(&path)?;

    assert_eq!(loaded.generator.w_out, model.params.generator.w_out);
    assert_eq!(loaded.generator.fwd.layer1.w_x, model.params.generator.fwd.layer1.w_x);
    assert_eq!(loaded.generator.bwd.layer2.b, model.params.generator.bwd.layer2.b);
    assert_eq!(loaded.encoder.stack.layer1.w_h, model.params.encoder.stack.layer1.w_h);
    assert_eq!(loaded.encoder.b_out, model.params.encoder.b_out);
    Ok(())
}

#[test]
fn evaluation_is_deterministic_and_exports_masks() -> Result<(), ModelError> {
    let config = tiny_config();
    let embeddings = synthetic_embeddings(9);
    let mut model = RationaleModel::new(config, &embeddings)?;
    let dataset = synthetic_dataset(16, 20);

    // dropout 关闭，两次评估逐位一致
    let a = evaluate_mse(&mut model, &dataset)?;
    let b = evaluate_mse(&mut model, &dataset)?;
    assert_eq!(a, b);

    let path = env::temp_dir().join("rationale_rnn_masks_test.npy");
    rationale_rnn::export_keep_masks(&mut model, &dataset, &path)?;
    assert!(path.exists(), "keep 掩码应已导出");
    fs::remove_file(&path)?;
    Ok(())
}
