use ndarray::ArrayViewMut2;

use crate::quantizer::Metric;

/// 是否对训练数据做零均值化
///
/// 平移不保持内积，所以内积度量下无论调用方如何请求都不做零均值化。
pub fn centering_enabled(requested: bool, metric: Metric) -> bool {
    requested && metric != Metric::InnerProduct
}

/// 计算每一维的均值，并从所有向量中原地减去，返回均值向量
///
/// 先完整求出均值，再单独做一遍减法，训练数据在调用后被修改。
pub fn center_vectors(mut train: ArrayViewMut2<'_, f32>) -> Vec<f32> {
    let (num_train, dim) = train.dim();
    assert!(num_train > 0 && dim > 0, "cannot center an empty training set");

    let mut sum = vec![0f64; dim];
    for row in train.rows() {
        for (s, &x) in sum.iter_mut().zip(row) {
            *s += x as f64;
        }
    }
    let centroid: Vec<f32> = sum.into_iter().map(|s| (s / num_train as f64) as f32).collect();

    for mut row in train.rows_mut() {
        for (x, &c) in row.iter_mut().zip(&centroid) {
            *x -= c;
        }
    }
    centroid
}

/// 从按行存储的一块向量中减去中心点，中心点全为 0 时什么都不做
pub fn subtract_centroid(block: &mut [f32], centroid: &[f32]) {
    if centroid.iter().all(|&c| c == 0.0) {
        return;
    }
    for v in block.chunks_exact_mut(centroid.len()) {
        for (x, &c) in v.iter_mut().zip(centroid) {
            *x -= c;
        }
    }
}
