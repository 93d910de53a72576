//! DataLoader - minibatch 加载器
//!
//! 提供统一的数据迭代 API，支持：
//! - 自动分批 (batch_size)
//! - 每个 epoch 随机打乱 (shuffle)
//! - 可复现的种子 (seed)
//!
//! 训练循环每个 epoch 以 `seed + epoch` 重新洗牌；
//! 评估时不洗牌、按原顺序完整遍历（包含末尾不满的 batch）。

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::dataset::{Batch, Dataset};

/// minibatch 加载器
///
/// # 示例
/// ```ignore
/// let loader = DataLoader::new(32).shuffle(true).seed(42);
/// for batch in loader.iter(&train_set) {
///     let loss = model.train_step(&batch, &mut optimizer)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DataLoader {
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
}

impl DataLoader {
    /// 创建新的 DataLoader
    ///
    /// # Panics
    /// `batch_size` 为 0 时 panic（构造期契约违反）
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "DataLoader: batch_size 必须大于 0");
        Self {
            batch_size,
            shuffle: false,
            seed: None,
        }
    }

    /// 是否在每次迭代前洗牌
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// 设置洗牌种子（None 时使用系统熵）
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 遍历一个数据划分，产出聚合好的 minibatch
    pub fn iter<'a>(&self, dataset: &'a Dataset) -> impl Iterator<Item = Batch> + 'a {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }
        let batch_size = self.batch_size;
        let chunks: Vec<Vec<usize>> = order
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        chunks.into_iter().map(move |rows| dataset.gather(&rows))
    }
}
