//! 整模型反向传播的数值校验
//!
//! 把生成器偏置推高使 p 远离 0.5，差分扰动不会跨越陡峭松弛的
//! 判定阈值，整条链路（含 surprise 代价与全变差项）保持可微。

use ndarray::{Array2, array};

use crate::config::Config;
use crate::data::{Batch, Dataset, EmbeddingTable};
use crate::model::{ModelParams, RationaleModel};
use crate::nn::Mode;
use crate::nn::loss::compose;

fn tiny_config() -> Config {
    Config {
        max_sentence: 4,
        embedding_dim: 3,
        hidden_size: 3,
        n_outputs: 1,
        batch_size: 2,
        epochs: 1,
        learning_rate: 1e-3,
        dropout_keep_prob: 1.0,
        l2_weight: 0.0,
        seed: 7,
    }
}

fn tiny_batch() -> (EmbeddingTable, Batch) {
    // 8 词词表，末行为全零 mask 行
    let embeddings = Array2::from_shape_fn((8, 3), |(i, j)| {
        if i == 7 {
            0.0
        } else {
            (((i * 3 + j) as f32) * 0.73).sin() * 0.5
        }
    });
    let table = EmbeddingTable::from_array(embeddings);

    let ids = array![[1usize, 2, 3, 4], [5, 6, 0, 2]];
    let labels = array![[0.3f32], [-0.2]];
    let dataset = Dataset::new(ids, labels, vec![4, 2], None, 4).expect("合成数据集非法");
    let batch = dataset.gather(&[0, 1]);
    (table, batch)
}

fn objective(model: &mut RationaleModel, batch: &Batch) -> f32 {
    // dropout 保留概率为 1 时 Train 前向完全确定
    let fp = model.forward(batch, Mode::Train).expect("前向失败");
    compose(&batch.labels, fp.prediction(), fp.log_pz(), 0.0, 0.0).objective
}

fn central_diff(
    model: &mut RationaleModel,
    batch: &Batch,
    select: &dyn Fn(&mut ModelParams) -> &mut f32,
    h: f32,
) -> f32 {
    *select(&mut model.params) += h;
    let f_plus = objective(model, batch);
    *select(&mut model.params) -= 2.0 * h;
    let f_minus = objective(model, batch);
    *select(&mut model.params) += h;
    (f_plus - f_minus) / (2.0 * h)
}

#[test]
fn model_gradients_match_finite_differences() {
    let config = tiny_config();
    let (table, batch) = tiny_batch();
    let mut model = RationaleModel::new(config, &table).expect("模型构造失败");
    // 抬高 logit 偏置，使所有 p 饱和在阈值上方
    model.params.generator.b_out.fill(3.0);

    let (_, grads) = model.compute_gradients(&batch).expect("反向失败");

    let h = 5e-3;
    let mut check = |name: &str, analytic: f32, select: &dyn Fn(&mut ModelParams) -> &mut f32| {
        let numeric = central_diff(&mut model, &batch, select, h);
        assert!(
            (numeric - analytic).abs() < 2e-2 + 5e-2 * analytic.abs(),
            "{name}: 数值 {numeric} vs 解析 {analytic}"
        );
    };
    check(
        "generator.fwd.layer1.w_x[0,0]",
        grads.generator.fwd.layer1.w_x[[0, 0]],
        &|p| &mut p.generator.fwd.layer1.w_x[[0, 0]],
    );
    check(
        "generator.fwd.layer2.w_h[1,1]",
        grads.generator.fwd.layer2.w_h[[1, 1]],
        &|p| &mut p.generator.fwd.layer2.w_h[[1, 1]],
    );
    check(
        "generator.bwd.layer1.w_x[2,1]",
        grads.generator.bwd.layer1.w_x[[2, 1]],
        &|p| &mut p.generator.bwd.layer1.w_x[[2, 1]],
    );
    check(
        "generator.bwd.layer2.b[0]",
        grads.generator.bwd.layer2.b[[0]],
        &|p| &mut p.generator.bwd.layer2.b[[0]],
    );
    check(
        "generator.w_out[5,1]",
        grads.generator.w_out[[5, 1]],
        &|p| &mut p.generator.w_out[[5, 1]],
    );
    check(
        "generator.b_out[2]",
        grads.generator.b_out[[2]],
        &|p| &mut p.generator.b_out[[2]],
    );
    check(
        "encoder.stack.layer1.w_x[0,2]",
        grads.encoder.stack.layer1.w_x[[0, 2]],
        &|p| &mut p.encoder.stack.layer1.w_x[[0, 2]],
    );
    check(
        "encoder.stack.layer2.w_h[2,0]",
        grads.encoder.stack.layer2.w_h[[2, 0]],
        &|p| &mut p.encoder.stack.layer2.w_h[[2, 0]],
    );
    check(
        "encoder.w_out[4,0]",
        grads.encoder.w_out[[4, 0]],
        &|p| &mut p.encoder.w_out[[4, 0]],
    );
    check(
        "encoder.b_out[0]",
        grads.encoder.b_out[[0]],
        &|p| &mut p.encoder.b_out[[0]],
    );
}

/// L2 项对梯度的贡献恰为 2·l2·θ
#[test]
fn l2_term_adds_scaled_parameters_to_gradients() {
    let (table, batch) = tiny_batch();
    let l2 = 0.01f32;

    let mut plain = RationaleModel::new(tiny_config(), &table).expect("模型构造失败");
    let mut regularized = RationaleModel::new(
        Config {
            l2_weight: l2,
            ..tiny_config()
        },
        &table,
    )
    .expect("模型构造失败");

    // 同种子初始化，两份参数逐元素相同
    let (_, g_plain) = plain.compute_gradients(&batch).expect("反向失败");
    let (_, g_reg) = regularized.compute_gradients(&batch).expect("反向失败");

    let expected = g_plain.generator.w_out.clone() + &(&plain.params.generator.w_out * (2.0 * l2));
    for (a, b) in g_reg.generator.w_out.iter().zip(expected.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
    let expected_b = g_plain.encoder.b_out.clone() + &(&plain.params.encoder.b_out * (2.0 * l2));
    for (a, b) in g_reg.encoder.b_out.iter().zip(expected_b.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}
