//! 门控阶段：保留概率 → 掩码替换
//!
//! 纯函数，无可学习参数：keep 高于 0.5 的位置保留原词 id，
//! 其余位置替换为保留的 mask 词 id。可导性只经由损失合成器中的
//! 稀疏/连贯项流向 keep，本替换不传导梯度。

use ndarray::{Array2, Zip};

/// 应用 rationale 掩码，产出喂给编码器的替换后序列
pub fn apply_rationale_mask(
    ids: &Array2<usize>,
    keep: &Array2<f32>,
    mask_id: usize,
) -> Array2<usize> {
    Zip::from(ids)
        .and(keep)
        .map_collect(|&id, &k| if k > 0.5 { id } else { mask_id })
}
