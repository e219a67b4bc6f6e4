use std::io;
use std::path::Path;

use log::info;
use ndarray::Array2;
use rand::Rng;

use super::{VectorElement, VectorReader};
use crate::error::{Error, Result};

/// 采样时每次读入的最大字节数
const SAMPLE_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// 从数据集中随机抽取约 `sample_rate` 比例的向量，转换为 f32 后组成训练矩阵
///
/// 每条向量以 `min(sample_rate, 1)` 的概率被独立选中，所以实际数量只是近似值。
/// `sample_rate` 必须是有限的正数。
/// 文件以固定大小的块流式读取，不会一次性加载整个数据集。
pub fn gen_random_slice<T: VectorElement, R: Rng>(
    path: impl AsRef<Path>,
    sample_rate: f64,
    rng: &mut R,
) -> Result<Array2<f32>> {
    let path = path.as_ref();
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(Error::InvalidSampleRate { sample_rate });
    }
    let p = sample_rate.min(1.0);

    let mut reader = VectorReader::open(path)?;
    let (num_points, dim) = (reader.num_points(), reader.dim());

    let chunk_points = (SAMPLE_CHUNK_BYTES / (dim * size_of::<T>())).max(1);
    let mut chunk = vec![T::zeroed(); chunk_points * dim];
    let mut sampled: Vec<f32> = Vec::with_capacity(((num_points as f64 * p) as usize + 1) * dim);
    let mut converted = vec![0f32; dim];

    for start in (0..num_points).step_by(chunk_points) {
        let len = chunk_points.min(num_points - start);
        let chunk = &mut chunk[..len * dim];
        reader.read_into(chunk)?;
        for point in chunk.chunks_exact(dim) {
            if rng.random::<f64>() < p {
                T::convert_into(point, &mut converted);
                sampled.extend_from_slice(&converted);
            }
        }
    }

    let train_size = sampled.len() / dim;
    if train_size == 0 {
        return Err(Error::EmptyTrainingSample { path: path.to_path_buf(), sample_rate });
    }
    info!("从 {} 条向量中采样了 {} 条训练向量，维数 = {}", num_points, train_size, dim);

    Array2::from_shape_vec((train_size, dim), sampled)
        .map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}
