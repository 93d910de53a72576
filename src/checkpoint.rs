//! 模型参数检查点
//!
//! bincode 序列化的参数快照：dev MSE 改进时覆盖写入同一路径，
//! 训练结束后可加载恢复出精确的参数值用于评估或续跑。

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::errors::ModelError;
use crate::model::ModelParams;

/// 把参数快照写入 `path`（已存在则覆盖）
pub fn save_params(params: &ModelParams, path: &Path) -> Result<(), ModelError> {
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), params)?;
    Ok(())
}

/// 从 `path` 恢复参数快照
pub fn load_params(path: &Path) -> Result<ModelParams, ModelError> {
    let file = File::open(path)?;
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}
