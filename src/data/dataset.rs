//! 数据集与 minibatch 容器
//!
//! `Dataset` 是一个划分（train/dev/test）的不可变值：定长填充的
//! token-id 矩阵、标签矩阵、真实长度向量、可选的 rationale 标注。
//! 有效性掩码不从外部接收，而是由钳制后的长度推导，
//! 以保证"掩码恰为长度前缀"这一不变量在构造期成立。

use ndarray::{Array2, Axis, s};

use super::error::DataError;

/// 一个数据划分（构造后不可变，显式传入训练循环，不作为环境状态持有）
#[derive(Debug, Clone)]
pub struct Dataset {
    ids: Array2<usize>,
    labels: Array2<f32>,
    mask: Array2<f32>,
    lengths: Vec<usize>,
    rationales: Option<Array2<f32>>,
}

/// 一个 minibatch（从 `Dataset` 按行号聚合出的自有拷贝）
#[derive(Debug, Clone)]
pub struct Batch {
    /// token id 矩阵 [batch, max_sentence]
    pub ids: Array2<usize>,
    /// 标签矩阵 [batch, n_outputs]
    pub labels: Array2<f32>,
    /// 有效性掩码 [batch, max_sentence]，位置 < 真实长度处为 1.0
    pub mask: Array2<f32>,
    /// 钳制后的真实长度 [batch]
    pub lengths: Vec<usize>,
    /// 可选的 rationale 标注 [batch, max_sentence]
    pub rationales: Option<Array2<f32>>,
}

impl Dataset {
    /// 构造一个数据划分
    ///
    /// - batch 维不一致 → [`DataError::ShapeMismatch`]（构造期契约违反，不可恢复）
    /// - `ids` 比 `max_sentence` 宽 → 截断到 `max_sentence`
    /// - `ids` 比 `max_sentence` 窄 → [`DataError::ShapeMismatch`]
    /// - 长度超过 `max_sentence` → 钳制到 `max_sentence`
    /// - rationale 宽度不足 → 右侧补零；过宽 → 截断
    pub fn new(
        ids: Array2<usize>,
        labels: Array2<f32>,
        lengths: Vec<usize>,
        rationales: Option<Array2<f32>>,
        max_sentence: usize,
    ) -> Result<Self, DataError> {
        let n = ids.nrows();
        if labels.nrows() != n {
            return Err(DataError::ShapeMismatch {
                expected: vec![n, labels.ncols()],
                got: vec![labels.nrows(), labels.ncols()],
            });
        }
        if lengths.len() != n {
            return Err(DataError::ShapeMismatch {
                expected: vec![n],
                got: vec![lengths.len()],
            });
        }
        if ids.ncols() < max_sentence {
            return Err(DataError::ShapeMismatch {
                expected: vec![n, max_sentence],
                got: vec![n, ids.ncols()],
            });
        }

        let ids = ids.slice(s![.., ..max_sentence]).to_owned();
        let lengths: Vec<usize> = lengths.into_iter().map(|l| l.min(max_sentence)).collect();

        // 掩码由钳制后的长度推导：位置 t 有效 ⇔ t < lengths[i]
        let mut mask = Array2::<f32>::zeros((n, max_sentence));
        for (i, &len) in lengths.iter().enumerate() {
            mask.slice_mut(s![i, ..len]).fill(1.0);
        }

        let rationales = match rationales {
            None => None,
            Some(r) => {
                if r.nrows() != n {
                    return Err(DataError::ShapeMismatch {
                        expected: vec![n, max_sentence],
                        got: vec![r.nrows(), r.ncols()],
                    });
                }
                let mut padded = Array2::<f32>::zeros((n, max_sentence));
                let w = r.ncols().min(max_sentence);
                padded
                    .slice_mut(s![.., ..w])
                    .assign(&r.slice(s![.., ..w]));
                Some(padded)
            }
        };

        Ok(Self {
            ids,
            labels,
            mask,
            lengths,
            rationales,
        })
    }

    /// 样本数
    pub fn len(&self) -> usize {
        self.ids.nrows()
    }

    /// 数据集是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 句长上限（列数）
    pub fn max_sentence(&self) -> usize {
        self.ids.ncols()
    }

    /// 输出维度
    pub fn n_outputs(&self) -> usize {
        self.labels.ncols()
    }

    /// 是否携带 rationale 标注
    pub fn has_rationales(&self) -> bool {
        self.rationales.is_some()
    }

    /// token id 矩阵 [n, max_sentence]
    pub fn ids(&self) -> &Array2<usize> {
        &self.ids
    }

    /// 标签矩阵 [n, n_outputs]
    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// 长度前缀推导出的有效性掩码 [n, max_sentence]
    pub fn mask(&self) -> &Array2<f32> {
        &self.mask
    }

    /// 钳制后的真实长度
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// rationale 标注（若有）
    pub fn rationales(&self) -> Option<&Array2<f32>> {
        self.rationales.as_ref()
    }

    /// 按行号聚合一个 minibatch
    pub fn gather(&self, rows: &[usize]) -> Batch {
        Batch {
            ids: self.ids.select(Axis(0), rows),
            labels: self.labels.select(Axis(0), rows),
            mask: self.mask.select(Axis(0), rows),
            lengths: rows.iter().map(|&i| self.lengths[i]).collect(),
            rationales: self.rationales.as_ref().map(|r| r.select(Axis(0), rows)),
        }
    }
}

impl Batch {
    /// batch 内样本数
    pub fn len(&self) -> usize {
        self.ids.nrows()
    }

    /// batch 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
