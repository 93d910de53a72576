//! 预训练词向量表解析（薄 I/O 边界）
//!
//! 文本格式：每行 `词 v1 v2 ... vE`，空白分隔。
//! 读入后在表末尾追加一行全零向量作为保留的 mask 词，
//! 其 id（`mask_id = 词表大小 - 1`）专用于门控阶段替换被丢弃的位置。
//! 加载完成后整张表只读，由生成器与编码器共享。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::Array2;

use super::error::DataError;

/// 词表 + 嵌入矩阵（末行为保留的 mask 向量）
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    vectors: Array2<f32>,
    vocab: HashMap<String, usize>,
}

impl EmbeddingTable {
    /// 从文本文件读取词向量表
    pub fn from_path(path: &Path) -> Result<Self, DataError> {
        if !path.exists() {
            return Err(DataError::FileNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader)
    }

    /// 从任意 `BufRead` 读取词向量表（便于测试）
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, DataError> {
        let mut vocab = HashMap::new();
        let mut rows: Vec<Vec<f32>> = Vec::new();
        let mut dim: Option<usize> = None;

        for line in reader.lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else { continue };
            let values: Vec<f32> = parts
                .map(|v| {
                    v.parse::<f32>()
                        .map_err(|e| DataError::FormatError(format!("词向量解析失败: {e}")))
                })
                .collect::<Result<_, _>>()?;
            match dim {
                None => dim = Some(values.len()),
                Some(d) if d != values.len() => {
                    return Err(DataError::FormatError(format!(
                        "词向量行宽不一致: 期望 {d}, 实际 {}",
                        values.len()
                    )));
                }
                Some(_) => {}
            }
            vocab.insert(word.to_string(), rows.len());
            rows.push(values);
        }

        let dim = dim.ok_or_else(|| DataError::FormatError("词向量文件为空".to_string()))?;

        // 末尾追加保留的 mask 行（全零）
        rows.push(vec![0.0; dim]);

        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let vectors = Array2::from_shape_vec((rows.len(), dim), flat)
            .map_err(|e| DataError::FormatError(e.to_string()))?;

        Ok(Self { vectors, vocab })
    }

    /// 直接由矩阵构造（测试/合成数据用；`vectors` 的末行视为 mask 行）
    pub fn from_array(vectors: Array2<f32>) -> Self {
        Self {
            vectors,
            vocab: HashMap::new(),
        }
    }

    /// 嵌入矩阵（含 mask 行）
    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    /// 保留的 mask 词 id
    pub fn mask_id(&self) -> usize {
        self.vectors.nrows() - 1
    }

    /// 词 → id（不含 mask 行）
    pub fn lookup(&self, word: &str) -> Option<usize> {
        self.vocab.get(word).copied()
    }

    /// 词表大小（含 mask 行）
    pub fn vocab_size(&self) -> usize {
        self.vectors.nrows()
    }

    /// 词向量维度
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }
}
