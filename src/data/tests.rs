//! 数据边界模块的单元测试

use std::io::Cursor;

use ndarray::{Array2, array};

use super::error::DataError;
use super::rationale::read_rationales_from;
use super::{DataLoader, Dataset, EmbeddingTable};

#[test]
fn dataset_clamps_lengths_and_derives_mask() {
    let ids = Array2::<usize>::zeros((1, 400));
    let labels = array![[0.1f32]];

    let dataset = Dataset::new(ids, labels, vec![350], None, 300).expect("构造失败");

    assert_eq!(dataset.max_sentence(), 300);
    assert_eq!(dataset.lengths()[0], 300);
    // 掩码为长度前缀：前 300 位全 1
    assert_eq!(dataset.mask().sum(), 300.0);
    assert_eq!(dataset.mask()[[0, 299]], 1.0);
}

#[test]
fn dataset_rejects_batch_dim_mismatch() {
    let ids = Array2::<usize>::zeros((2, 4));
    let labels = Array2::<f32>::zeros((3, 1));

    let err = Dataset::new(ids, labels, vec![4, 4], None, 4).unwrap_err();
    assert!(matches!(err, DataError::ShapeMismatch { .. }));
}

#[test]
fn dataset_rejects_ids_narrower_than_max_sentence() {
    let ids = Array2::<usize>::zeros((1, 3));
    let labels = array![[0.0f32]];

    let err = Dataset::new(ids, labels, vec![3], None, 4).unwrap_err();
    assert!(matches!(err, DataError::ShapeMismatch { .. }));
}

#[test]
fn dataset_pads_narrow_rationales_with_zeros() {
    let ids = Array2::<usize>::zeros((1, 4));
    let labels = array![[0.0f32]];
    let rationales = array![[1.0f32, 1.0]];

    let dataset = Dataset::new(ids, labels, vec![4], Some(rationales), 4).expect("构造失败");

    let r = dataset.rationales().expect("应携带标注");
    assert_eq!(r, &array![[1.0f32, 1.0, 0.0, 0.0]]);
}

fn indexed_dataset(n: usize) -> Dataset {
    // 第 0 列存行号，便于追踪洗牌后的顺序
    let ids = Array2::from_shape_fn((n, 3), |(i, t)| if t == 0 { i } else { 0 });
    let labels = Array2::<f32>::zeros((n, 1));
    Dataset::new(ids, labels, vec![3; n], None, 3).expect("构造失败")
}

#[test]
fn loader_visits_every_row_exactly_once() {
    let dataset = indexed_dataset(10);
    let loader = DataLoader::new(4).shuffle(true).seed(7);

    let batches: Vec<_> = loader.iter(&dataset).collect();
    assert_eq!(
        batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
        vec![4, 4, 2]
    );

    let mut seen: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.ids.column(0).to_vec())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[test]
fn loader_shuffle_is_reproducible_with_seed() {
    let dataset = indexed_dataset(10);
    let loader = DataLoader::new(4).shuffle(true).seed(7);

    let first: Vec<usize> = loader
        .iter(&dataset)
        .flat_map(|b| b.ids.column(0).to_vec())
        .collect();
    let second: Vec<usize> = loader
        .iter(&dataset)
        .flat_map(|b| b.ids.column(0).to_vec())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn loader_without_shuffle_preserves_order() {
    let dataset = indexed_dataset(6);
    let loader = DataLoader::new(4);

    let order: Vec<usize> = loader
        .iter(&dataset)
        .flat_map(|b| b.ids.column(0).to_vec())
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn embedding_parser_appends_zero_mask_row() {
    let text = "hello 0.1 0.2\nworld 0.3 0.4\n";
    let table = EmbeddingTable::from_reader(Cursor::new(text)).expect("解析失败");

    assert_eq!(table.vocab_size(), 3);
    assert_eq!(table.dim(), 2);
    assert_eq!(table.mask_id(), 2);
    assert_eq!(table.lookup("world"), Some(1));
    assert_eq!(table.lookup("缺失"), None);
    // mask 行全零
    assert!(table.vectors().row(2).iter().all(|&v| v == 0.0));
}

#[test]
fn embedding_parser_rejects_ragged_rows() {
    let text = "a 0.1 0.2\nb 0.3\n";
    let err = EmbeddingTable::from_reader(Cursor::new(text)).unwrap_err();
    assert!(matches!(err, DataError::FormatError(_)));
}

#[test]
fn rationales_mark_word_spans_per_aspect() {
    let line = r#"{"0": [[1, 3]], "1": [[0, 1], [4, 9]], "x": ["a", "b", "c", "d"]}"#;

    let aspect0 = read_rationales_from(Cursor::new(line), 0, 6).expect("解析失败");
    assert_eq!(aspect0, array![[0.0f32, 1.0, 1.0, 0.0, 0.0, 0.0]]);

    // 超出 max_sentence 的区间尾部被截断
    let aspect1 = read_rationales_from(Cursor::new(line), 1, 6).expect("解析失败");
    assert_eq!(aspect1, array![[1.0f32, 0.0, 0.0, 0.0, 1.0, 1.0]]);
}

#[test]
fn rationales_missing_aspect_key_is_format_error() {
    let line = r#"{"0": [[0, 1]], "x": ["a"]}"#;
    let err = read_rationales_from(Cursor::new(line), 5, 4).unwrap_err();
    assert!(matches!(err, DataError::FormatError(_)));
}
