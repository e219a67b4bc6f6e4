//! 分块流式编码整个数据集

use std::ops::Range;
use std::path::Path;
use std::time::Instant;

use indicatif::ProgressBar;
use log::{debug, info};
use ndarray::ArrayView2;
use serde::Serialize;

use crate::centering::subtract_centroid;
use crate::config::PipelineOptions;
use crate::error::{Error, Result};
use crate::metadata::{MetadataRecord, meta_path};
use crate::quantizer::Quantizer;
use crate::train::parse_quantizer_spec;
use crate::utils::pb_style;
use crate::vecfile::{ElementKind, VectorElement, VectorReader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeReport {
    pub num_points: usize,
    pub dim: usize,
    /// 实际使用的块大小
    pub block_size: usize,
    pub num_blocks: usize,
    pub code_size: usize,
}

/// 把 `[0, num_points)` 按 `block_size` 切分，最后一块可能更短
pub fn block_ranges(num_points: usize, block_size: usize) -> impl Iterator<Item = Range<usize>> {
    assert!(block_size > 0, "block size must be positive");
    (0..num_points).step_by(block_size).map(move |start| start..(start + block_size).min(num_points))
}

/// 编码 f32 数据集
pub fn encode<Q: Quantizer>(
    data_file: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    quantizer_spec: &str,
    options: &PipelineOptions,
) -> Result<EncodeReport> {
    encode_as::<f32, Q>(data_file, model_path, output_path, quantizer_spec, options)
}

/// 使用已训练的模型编码数据集中的所有向量，按原始顺序写入 `output_path`
///
/// 每次只读入一块向量，转换为 f32 并减去训练时的中心点后交给量化器，
/// 内存占用只与块大小有关。
pub fn encode_as<T: VectorElement, Q: Quantizer>(
    data_file: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    quantizer_spec: &str,
    options: &PipelineOptions,
) -> Result<EncodeReport> {
    let (data_file, model_path, output_path) =
        (data_file.as_ref(), model_path.as_ref(), output_path.as_ref());

    let meta_path = meta_path(model_path);
    if !model_path.exists() || !meta_path.exists() {
        return Err(Error::ModelNotFound { path: model_path.to_path_buf() });
    }

    let mut reader = VectorReader::with_capacity(data_file, options.read_buffer_size)?;
    reader.check_len(T::KIND.size())?;
    let (num_points, dim) = (reader.num_points(), reader.dim());

    let record = MetadataRecord::read(&meta_path)?;
    if record.dim as usize != dim {
        return Err(Error::DimensionMismatch {
            path: meta_path,
            expected: record.dim as usize,
            actual: dim,
        });
    }

    let mut quantizer = Q::open(model_path)
        .map_err(Error::quantizer(format!("failed to load model `{}`", model_path.display())))?;
    if quantizer.dim() != dim {
        return Err(Error::DimensionMismatch {
            path: model_path.to_path_buf(),
            expected: quantizer.dim(),
            actual: dim,
        });
    }
    let code_size = quantizer.flat_code_size().unwrap_or(record.code_size as usize);
    info!("已加载模型 {}，维数 = {}，编码长度 = {}", model_path.display(), dim, code_size);

    let (description, _) = parse_quantizer_spec(quantizer_spec);
    let sequential = quantizer.sequential_encoding() || Q::is_sequential_kind(description);
    let nominal = if sequential { options.sequential_block_size } else { options.block_size };
    let block_size = nominal.min(num_points).max(1);
    if sequential {
        info!("量化器只能串行编码，块大小降为 {}", block_size);
    }

    // f32 数据直接读入转换缓冲区，其它类型先读入原始缓冲区再转换
    let mut raw = match T::KIND {
        ElementKind::F32 => vec![],
        _ => vec![T::zeroed(); block_size * dim],
    };
    let mut block = vec![0f32; block_size * dim];

    let ntotal = quantizer.ntotal();
    let start = Instant::now();
    let pb = ProgressBar::new(num_points as u64).with_style(pb_style());
    pb.set_message("编码中");

    let mut num_blocks = 0;
    for range in block_ranges(num_points, block_size) {
        debug!("Processing points [{}, {})", range.start, range.end);
        let n = range.len();
        let block = &mut block[..n * dim];
        if T::KIND == ElementKind::F32 {
            reader.read_into(block)?;
        } else {
            let raw = &mut raw[..n * dim];
            reader.read_into(raw)?;
            T::convert_into(raw, block);
        }
        subtract_centroid(block, &record.centroid);

        let view = ArrayView2::from_shape((n, dim), &*block)
            .map_err(|e| Error::Quantizer(anyhow::Error::new(e)))?;
        quantizer.add(view).map_err(Error::quantizer(format!(
            "failed to encode points [{}, {})",
            range.start, range.end
        )))?;

        num_blocks += 1;
        pb.inc(n as u64);
    }
    pb.finish_and_clear();

    let added = quantizer.ntotal().saturating_sub(ntotal);
    if added != num_points {
        let err = anyhow::anyhow!("quantizer stored {added} codes for {num_points} points");
        return Err(Error::Quantizer(err));
    }
    info!("编码完成，共 {} 条向量，{} 个块，耗时 {:.2}s", num_points, num_blocks, start.elapsed().as_secs_f32());

    quantizer
        .save(output_path)
        .map_err(Error::quantizer(format!("failed to save codes to `{}`", output_path.display())))?;
    info!("编码结果已保存到 {}", output_path.display());

    Ok(EncodeReport { num_points, dim, block_size, num_blocks, code_size })
}
