//! nn 各组件的单元测试

mod grad_check;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::dropout_mask;

pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[test]
fn inverted_dropout_mask_preserves_expectation() {
    let mut r = rng(5);
    let mask = dropout_mask(&mut r, ndarray::Ix2(100, 100), 0.5);

    // 元素只能是 0 或 1/keep_prob
    assert!(mask.iter().all(|&v| v == 0.0 || v == 2.0));
    // 反向缩放后均值应接近 1
    let mean = mask.sum() / mask.len() as f32;
    assert!((mean - 1.0).abs() < 0.05, "均值偏离过大: {mean}");
}
