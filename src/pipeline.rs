use std::path::Path;

use log::info;

use crate::config::PipelineOptions;
use crate::encode::{EncodeReport, encode_as};
use crate::error::Result;
use crate::quantizer::{Metric, Quantizer};
use crate::train::{TrainOutcome, train};
use crate::vecfile::{ElementKind, VectorElement};

/// 完整流程：模型不存在时先训练，然后编码整个数据集
///
/// 训练与编码都使用 `T` 类型读取数据集，进入量化器前统一转换为 f32。
pub fn run<T: VectorElement, Q: Quantizer>(
    data_file: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    metric: Metric,
    sample_rate: f64,
    quantizer_spec: &str,
    options: &PipelineOptions,
) -> Result<EncodeReport> {
    let (data_file, model_path) = (data_file.as_ref(), model_path.as_ref());
    info!("数据集 {}，数值类型 {}", data_file.display(), T::KIND.name());

    match train::<T, Q>(data_file, model_path, metric, sample_rate, quantizer_spec, options)? {
        TrainOutcome::Skipped => info!("使用已有的模型 {}", model_path.display()),
        TrainOutcome::Trained(report) => {
            info!("训练了新模型，训练集 {} 条，编码长度 {}", report.train_size, report.code_size)
        }
    }

    encode_as::<T, Q>(data_file, model_path, output_path, quantizer_spec, options)
}

/// 根据运行时指定的数值类型选择 [`run`] 的实例
#[allow(clippy::too_many_arguments)]
pub fn run_with_kind<Q: Quantizer>(
    kind: ElementKind,
    data_file: impl AsRef<Path>,
    model_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    metric: Metric,
    sample_rate: f64,
    quantizer_spec: &str,
    options: &PipelineOptions,
) -> Result<EncodeReport> {
    match kind {
        ElementKind::F32 => {
            run::<f32, Q>(data_file, model_path, output_path, metric, sample_rate, quantizer_spec, options)
        }
        ElementKind::U8 => {
            run::<u8, Q>(data_file, model_path, output_path, metric, sample_rate, quantizer_spec, options)
        }
        ElementKind::I8 => {
            run::<i8, Q>(data_file, model_path, output_path, metric, sample_rate, quantizer_spec, options)
        }
    }
}
