//! 训练量化模型并保存模型与元数据

use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::centering::{center_vectors, centering_enabled};
use crate::config::PipelineOptions;
use crate::error::{Error, IoResultExt, Result};
use crate::metadata::{MetadataRecord, append_suffix, meta_path};
use crate::quantizer::{Metric, Quantizer};
use crate::vecfile::{VectorElement, VectorReader, gen_random_slice};

/// 描述字符串中表示零均值化的前缀
pub const ZERO_MEAN_PREFIX: &str = "zm";

/// 拆分描述字符串，返回交给量化器的部分以及是否请求了零均值化
///
/// 只有去掉前缀后仍有内容时 `zm` 才被当作前缀。
pub fn parse_quantizer_spec(spec: &str) -> (&str, bool) {
    match spec.strip_prefix(ZERO_MEAN_PREFIX) {
        Some(rest) if !rest.is_empty() => (rest, true),
        _ => (spec, false),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    /// 实际使用的训练向量数量
    pub train_size: usize,
    pub dim: usize,
    pub code_size: usize,
    /// 是否做了零均值化
    pub centered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// 模型已经存在，没有做任何事
    Skipped,
    Trained(TrainReport),
}

/// 训练量化模型，模型文件已存在时直接跳过
///
/// 成功后 `model_path` 与 `<model_path>.meta` 同时存在。模型先写入临时文件，
/// 元数据写完后才重命名，所以模型文件存在即意味着元数据完整。
pub fn train<T: VectorElement, Q: Quantizer>(
    data_file: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    metric: Metric,
    sample_rate: f64,
    quantizer_spec: &str,
    options: &PipelineOptions,
) -> Result<TrainOutcome> {
    let (data_file, model_path) = (data_file.as_ref(), model_path.as_ref());
    if model_path.exists() {
        info!("模型 {} 已存在，跳过训练", model_path.display());
        return Ok(TrainOutcome::Skipped);
    }

    // 读取整个数据集之前先确认文件与数值类型匹配
    let reader = VectorReader::open(data_file)?;
    reader.check_len(T::KIND.size())?;
    let dim = reader.dim();
    drop(reader);

    let (description, zero_mean) = parse_quantizer_spec(quantizer_spec);
    let centered = centering_enabled(zero_mean, metric);
    if zero_mean && !centered {
        info!("内积度量下平移会改变相似度，忽略零均值化");
    }

    let mut quantizer = Q::create(dim, description, metric)
        .map_err(Error::quantizer(format!("failed to create quantizer `{description}`")))?;
    let Some(code_size) = quantizer.flat_code_size() else {
        return Err(Error::UnsupportedQuantizerKind { spec: description.to_string() });
    };

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let start = Instant::now();
    let mut sample = gen_random_slice::<T, _>(data_file, sample_rate, &mut rng)?;
    let train_size = sample.nrows();
    info!("采样完成，耗时 {:.2}s", start.elapsed().as_secs_f32());

    // 量化器内部的采样上限不足时提高到训练集上限，已经更大的不降低
    let budget = train_size.max(options.max_training_set_size);
    match quantizer.training_budget() {
        Some(current) if current < budget => {
            debug!("训练样本上限 {} -> {}", current, budget);
            quantizer.set_training_budget(budget);
        }
        Some(_) => {}
        None if quantizer.has_fixed_training_budget() => {
            warn!("{} 的训练样本上限无法调整，{} 条训练向量可能会在内部被下采样", description, train_size);
        }
        None => {}
    }

    let centroid = if centered {
        let centroid = center_vectors(sample.view_mut());
        debug!("中心点: {:?}", &centroid[..centroid.len().min(8)]);
        centroid
    } else {
        vec![0.0; dim]
    };

    info!("开始训练 {}，训练集大小 = {} x {}", description, train_size, dim);
    let start = Instant::now();
    quantizer.train(sample.view()).map_err(Error::quantizer("failed to train quantizer"))?;
    info!("训练完成，耗时 {:.2}s", start.elapsed().as_secs_f32());
    drop(sample);

    let tmp_path = append_suffix(model_path, ".tmp");
    quantizer
        .save(&tmp_path)
        .map_err(Error::quantizer(format!("failed to save model to `{}`", tmp_path.display())))?;

    let record = MetadataRecord::new(code_size as u32, centroid);
    if let Err(e) = record.write(meta_path(model_path)) {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("无法删除临时文件 {}: {}", tmp_path.display(), e);
        }
        return Err(e);
    }
    fs::rename(&tmp_path, model_path).with_path(model_path)?;
    info!("模型已保存到 {}", model_path.display());

    Ok(TrainOutcome::Trained(TrainReport { train_size, dim, code_size, centered }))
}
