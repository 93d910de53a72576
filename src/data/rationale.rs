//! 人工标注 rationale 解析（薄 I/O 边界）
//!
//! 标注文件为 JSON Lines：每行一个对象，键 `"x"` 是分词后的评论，
//! 键 `"0"`、`"1"`…… 按 aspect 给出若干 `[起, 止)` 词区间。
//! 解析为与测试划分按词位对齐的二值矩阵 [样本数, max_sentence]，
//! 不足右侧补零、超出截断。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::Array2;
use serde_json::Value;

use super::error::DataError;

/// 读取某个 aspect 的 rationale 二值矩阵
pub fn read_rationales(
    path: &Path,
    aspect: usize,
    max_sentence: usize,
) -> Result<Array2<f32>, DataError> {
    if !path.exists() {
        return Err(DataError::FileNotFound(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    read_rationales_from(reader, aspect, max_sentence)
}

/// 从任意 `BufRead` 读取（便于测试）
pub fn read_rationales_from<R: BufRead>(
    reader: R,
    aspect: usize,
    max_sentence: usize,
) -> Result<Array2<f32>, DataError> {
    let key = aspect.to_string();
    let mut rows: Vec<Vec<f32>> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)?;
        let spans = value
            .get(&key)
            .and_then(Value::as_array)
            .ok_or_else(|| DataError::FormatError(format!("标注行缺少 aspect 键 \"{key}\"")))?;

        let mut row = vec![0.0f32; max_sentence];
        for span in spans {
            let pair = span
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| DataError::FormatError("词区间须为 [起, 止) 二元组".to_string()))?;
            let start = pair[0].as_u64().unwrap_or(0) as usize;
            let end = pair[1].as_u64().unwrap_or(0) as usize;
            for t in start..end.min(max_sentence) {
                row[t] = 1.0;
            }
        }
        rows.push(row);
    }

    let n = rows.len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, max_sentence), flat)
        .map_err(|e| DataError::FormatError(e.to_string()))
}
