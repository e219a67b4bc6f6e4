use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use vecpress::metadata::{MetadataRecord, meta_path};
use vecpress::quantizer::{BuiltinQuantizer, Metric, Quantizer};
use vecpress::vecfile::{ElementKind, write_vectors};
use vecpress::{Error, PipelineOptions, TrainOutcome, encode, encode_as, run, run_with_kind, train};

/// 记录所有训练数据和编码输入的量化器，编码结果即输入本身
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordingQuantizer {
    d: usize,
    description: String,
    metric: Metric,
    budget: usize,
    trained: bool,
    train_sample: Vec<f32>,
    blocks: Vec<Vec<f32>>,
}

impl Quantizer for RecordingQuantizer {
    fn create(d: usize, description: &str, metric: Metric) -> anyhow::Result<Self> {
        anyhow::ensure!(!description.is_empty(), "empty description");
        Ok(Self { d, description: description.to_string(), metric, budget: 1000, ..Default::default() })
    }

    fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    fn is_sequential_kind(description: &str) -> bool {
        description == "SEQ"
    }

    fn dim(&self) -> usize {
        self.d
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn ntotal(&self) -> usize {
        self.blocks.iter().map(|b| b.len() / self.d).sum()
    }

    fn train(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<()> {
        self.train_sample = x.iter().copied().collect();
        self.trained = true;
        Ok(())
    }

    fn add(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<()> {
        anyhow::ensure!(self.trained, "not trained");
        self.blocks.push(x.iter().copied().collect());
        Ok(())
    }

    fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        serde_json::to_writer(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }

    fn flat_code_size(&self) -> Option<usize> {
        match self.description.starts_with("IVF") {
            true => None,
            false => Some(self.d * 4),
        }
    }

    fn sequential_encoding(&self) -> bool {
        Self::is_sequential_kind(&self.description)
    }

    fn training_budget(&self) -> Option<usize> {
        match self.description.as_str() {
            "FIXED" => None,
            _ => Some(self.budget),
        }
    }

    fn set_training_budget(&mut self, n: usize) {
        self.budget = n;
    }

    fn has_fixed_training_budget(&self) -> bool {
        self.description == "FIXED"
    }
}

struct Workspace {
    _dir: TempDir,
    data: PathBuf,
    model: PathBuf,
    output: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("base.fbin");
        let model = dir.path().join("model.bin");
        let output = dir.path().join("codes.bin");
        Self { _dir: dir, data, model, output }
    }
}

/// 随机生成 n * d 的数据，每一维的均值都不为 0
fn dataset(n: usize, d: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * d).map(|i| (i % d) as f32 + rng.random_range(5.0..10.0f32)).collect()
}

fn column_mean(data: &[f32], d: usize) -> Vec<f32> {
    let n = data.len() / d;
    let mut sum = vec![0f64; d];
    for row in data.chunks_exact(d) {
        for (s, &x) in sum.iter_mut().zip(row) {
            *s += x as f64;
        }
    }
    sum.into_iter().map(|s| (s / n as f64) as f32).collect()
}

fn seeded() -> PipelineOptions {
    PipelineOptions { seed: Some(42), ..Default::default() }
}

#[fixture]
fn ws() -> Workspace {
    Workspace::new()
}

#[rstest]
fn test_skip_if_model_exists(ws: Workspace) {
    write_vectors(&ws.data, 8, &dataset(500, 8, 1)).unwrap();

    let outcome =
        train::<f32, BuiltinQuantizer>(&ws.data, &ws.model, Metric::L2, 0.5, "zmPQ2x4", &seeded())
            .unwrap();
    assert!(matches!(outcome, TrainOutcome::Trained(_)));

    let model = fs::read(&ws.model).unwrap();
    let meta = fs::read(meta_path(&ws.model)).unwrap();

    // 即使参数完全不同也不会重新训练
    let outcome = train::<f32, BuiltinQuantizer>(
        &ws.data,
        &ws.model,
        Metric::InnerProduct,
        1.0,
        "SQ8",
        &PipelineOptions::default(),
    )
    .unwrap();
    assert_eq!(outcome, TrainOutcome::Skipped);
    assert_eq!(fs::read(&ws.model).unwrap(), model);
    assert_eq!(fs::read(meta_path(&ws.model)).unwrap(), meta);
}

#[rstest]
fn test_metadata_after_training(ws: Workspace) {
    let data = dataset(300, 6, 2);
    write_vectors(&ws.data, 6, &data).unwrap();

    let outcome =
        train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "zmFlat", &seeded())
            .unwrap();
    let TrainOutcome::Trained(report) = outcome else { panic!("expected training") };
    assert_eq!(report.train_size, 300);
    assert_eq!(report.code_size, 24);
    assert!(report.centered);

    let record = MetadataRecord::read(meta_path(&ws.model)).unwrap();
    assert_eq!(record.code_size, 24);
    assert_eq!(record.dim, 6);
    for (c, m) in record.centroid.iter().zip(column_mean(&data, 6)) {
        assert!((c - m).abs() < 1e-4, "{c} != {m}");
    }

    // 训练数据在训练前已经减去中心点
    let model = RecordingQuantizer::open(&ws.model).unwrap();
    assert_eq!(model.train_sample.len(), data.len());
    for (row, centered) in data.chunks_exact(6).zip(model.train_sample.chunks_exact(6)) {
        for ((x, y), c) in row.iter().zip(centered).zip(&record.centroid) {
            assert_eq!(x - c, *y);
        }
    }
    let mean = column_mean(&model.train_sample, 6);
    assert!(mean.iter().all(|m| m.abs() < 1e-4), "{mean:?}");

    // 没有遗留临时文件
    assert!(!ws.model.with_extension("bin.tmp").exists());
}

#[rstest]
fn test_training_budget_raised(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(100, 4, 3)).unwrap();

    train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "Flat", &seeded()).unwrap();
    let model = RecordingQuantizer::open(&ws.model).unwrap();
    assert_eq!(model.budget, 256_000);

    let model_path = ws.model.with_file_name("small.bin");
    let options = PipelineOptions { max_training_set_size: 10, ..seeded() };
    train::<f32, RecordingQuantizer>(&ws.data, &model_path, Metric::L2, 1.0, "Flat", &options).unwrap();
    let model = RecordingQuantizer::open(&model_path).unwrap();
    assert_eq!(model.budget, 1000);
}

#[rstest]
fn test_fixed_training_budget_untouched(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(100, 4, 4)).unwrap();

    let outcome =
        train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "FIXED", &seeded()).unwrap();
    assert!(matches!(outcome, TrainOutcome::Trained(ref r) if r.train_size == 100));
    let model = RecordingQuantizer::open(&ws.model).unwrap();
    assert_eq!(model.budget, 1000);
    assert_eq!(model.train_sample.len(), 100 * 4);
}

#[rstest]
fn test_dimension_mismatch(ws: Workspace) {
    write_vectors(&ws.data, 50, &dataset(200, 50, 4)).unwrap();
    train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "zmFlat", &seeded()).unwrap();

    let other = ws.data.with_file_name("other.fbin");
    write_vectors(&other, 64, &dataset(10, 64, 5)).unwrap();

    let err = encode::<RecordingQuantizer>(&other, &ws.model, &ws.output, "Flat", &seeded()).unwrap_err();
    match err {
        Error::DimensionMismatch { expected, actual, .. } => {
            assert_eq!(expected, 50);
            assert_eq!(actual, 64);
        }
        e => panic!("unexpected error: {e}"),
    }
    assert!(!ws.output.exists());
}

#[rstest]
fn test_block_boundaries(ws: Workspace) {
    let data = dataset(130, 4, 6);
    write_vectors(&ws.data, 4, &data).unwrap();

    let options = PipelineOptions { block_size: 64, ..seeded() };
    let report =
        run::<f32, RecordingQuantizer>(&ws.data, &ws.model, &ws.output, Metric::L2, 1.0, "Flat", &options)
            .unwrap();
    assert_eq!(report.num_points, 130);
    assert_eq!(report.block_size, 64);
    assert_eq!(report.num_blocks, 3);

    let codes = RecordingQuantizer::open(&ws.output).unwrap();
    let rows: Vec<_> = codes.blocks.iter().map(|b| b.len() / 4).collect();
    assert_eq!(rows, vec![64, 64, 2]);
    // 未做零均值化时输入保持不变
    assert_eq!(codes.blocks.concat(), data);
}

#[rstest]
fn test_sequential_block_size(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(130, 4, 7)).unwrap();

    let options = PipelineOptions { sequential_block_size: 50, ..seeded() };
    let report =
        run::<f32, RecordingQuantizer>(&ws.data, &ws.model, &ws.output, Metric::L2, 1.0, "SEQ", &options)
            .unwrap();
    assert_eq!(report.block_size, 50);

    let codes = RecordingQuantizer::open(&ws.output).unwrap();
    let rows: Vec<_> = codes.blocks.iter().map(|b| b.len() / 4).collect();
    assert_eq!(rows, vec![50, 50, 30]);
}

#[rstest]
fn test_centroid_subtracted_in_order(ws: Workspace) {
    let data = dataset(250, 8, 8);
    write_vectors(&ws.data, 8, &data).unwrap();

    let options = PipelineOptions { block_size: 100, ..seeded() };
    run::<f32, RecordingQuantizer>(&ws.data, &ws.model, &ws.output, Metric::L2, 1.0, "zmFlat", &options)
        .unwrap();

    let record = MetadataRecord::read(meta_path(&ws.model)).unwrap();
    assert!(!record.is_zero_centroid());

    let codes = RecordingQuantizer::open(&ws.output).unwrap();
    assert_eq!(codes.blocks.len(), 3);
    let encoded = codes.blocks.concat();
    assert_eq!(encoded.len(), data.len());
    for (row, enc) in data.chunks_exact(8).zip(encoded.chunks_exact(8)) {
        for ((x, y), c) in row.iter().zip(enc).zip(&record.centroid) {
            assert_eq!(x - c, *y);
        }
    }
}

#[rstest]
fn test_inner_product_ignores_centering(ws: Workspace) {
    write_vectors(&ws.data, 16, &dataset(1000, 16, 9)).unwrap();

    let report = run::<f32, BuiltinQuantizer>(
        &ws.data,
        &ws.model,
        &ws.output,
        Metric::InnerProduct,
        0.5,
        "zmPQ4x4",
        &seeded(),
    )
    .unwrap();
    assert_eq!(report.num_points, 1000);
    assert_eq!(report.code_size, 4);

    let record = MetadataRecord::read(meta_path(&ws.model)).unwrap();
    assert_eq!(record.dim, 16);
    assert_eq!(record.code_size, 4);
    assert!(record.is_zero_centroid());

    let codes = BuiltinQuantizer::open(&ws.output).unwrap();
    assert_eq!(codes.ntotal(), 1000);
    assert_eq!(codes.codes().unwrap().len(), 1000 * 4);
    assert_eq!(codes.metric(), Metric::InnerProduct);
}

#[rstest]
fn test_unsupported_quantizer_kind(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(100, 4, 10)).unwrap();

    let err = train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "IVF16,Flat", &seeded())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedQuantizerKind { .. }));
    assert!(!ws.model.exists());
    assert!(!meta_path(&ws.model).exists());
}

#[rstest]
fn test_unknown_builtin_description(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(100, 4, 11)).unwrap();

    let err = train::<f32, BuiltinQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "HNSW32", &seeded())
        .unwrap_err();
    assert!(matches!(err, Error::Quantizer(_)));
    assert!(!ws.model.exists());
}

#[rstest]
fn test_model_not_found(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(10, 4, 12)).unwrap();

    let err = encode::<BuiltinQuantizer>(&ws.data, &ws.model, &ws.output, "", &seeded()).unwrap_err();
    assert!(matches!(err, Error::ModelNotFound { .. }));

    // 只有模型没有元数据
    fs::write(&ws.model, b"model").unwrap();
    let err = encode::<BuiltinQuantizer>(&ws.data, &ws.model, &ws.output, "", &seeded()).unwrap_err();
    assert!(matches!(err, Error::ModelNotFound { .. }));
    assert!(!ws.output.exists());
}

#[rstest]
fn test_corrupt_metadata(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(100, 4, 13)).unwrap();
    train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "Flat", &seeded()).unwrap();

    // rows 字段改为 2
    let meta = meta_path(&ws.model);
    let mut bytes = fs::read(&meta).unwrap();
    bytes[8..12].copy_from_slice(&2i32.to_le_bytes());
    fs::write(&meta, bytes).unwrap();

    let err = encode::<RecordingQuantizer>(&ws.data, &ws.model, &ws.output, "Flat", &seeded()).unwrap_err();
    assert!(matches!(err, Error::CorruptMetadata { .. }));
    assert!(!ws.output.exists());
}

#[rstest]
fn test_empty_training_sample(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(3, 4, 14)).unwrap();

    let err = train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1e-12, "Flat", &seeded())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyTrainingSample { .. }));
    assert!(!ws.model.exists());
}

#[rstest]
fn test_invalid_sample_rate(ws: Workspace) {
    write_vectors(&ws.data, 4, &dataset(10, 4, 15)).unwrap();

    let err = train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, f64::NAN, "Flat", &seeded())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSampleRate { .. }));
    assert!(!ws.model.exists());
    assert!(!meta_path(&ws.model).exists());
}

#[rstest]
fn test_missing_dataset(ws: Workspace) {
    let err = train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "Flat", &seeded())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[rstest]
fn test_wrong_element_type(ws: Workspace) {
    let data: Vec<u8> = (0..400).map(|i| (i % 251) as u8).collect();
    write_vectors(&ws.data, 8, &data).unwrap();

    let err = train::<f32, RecordingQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "Flat", &seeded())
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[rstest]
#[case::uint8(ElementKind::U8)]
#[case::int8(ElementKind::I8)]
fn test_narrow_elements(ws: Workspace, #[case] kind: ElementKind) {
    let values: Vec<i32> = (0..200 * 4).map(|i| (i * 37 % 101) - 50).collect();
    match kind {
        ElementKind::U8 => {
            let data: Vec<u8> = values.iter().map(|&v| (v + 50) as u8).collect();
            write_vectors(&ws.data, 4, &data).unwrap();
        }
        _ => {
            let data: Vec<i8> = values.iter().map(|&v| v as i8).collect();
            write_vectors(&ws.data, 4, &data).unwrap();
        }
    }

    let options = PipelineOptions { block_size: 64, ..seeded() };
    let report = run_with_kind::<RecordingQuantizer>(
        kind,
        &ws.data,
        &ws.model,
        &ws.output,
        Metric::L2,
        1.0,
        "Flat",
        &options,
    )
    .unwrap();
    assert_eq!(report.num_points, 200);
    assert_eq!(report.num_blocks, 4);

    let offset = if kind == ElementKind::U8 { 50.0 } else { 0.0 };
    let expected: Vec<f32> = values.iter().map(|&v| v as f32 + offset).collect();
    let codes = RecordingQuantizer::open(&ws.output).unwrap();
    assert_eq!(codes.blocks.concat(), expected);
}

#[rstest]
fn test_encode_u8_with_builtin(ws: Workspace) {
    let data: Vec<u8> = (0..300 * 6).map(|i| (i * 13 % 256) as u8).collect();
    write_vectors(&ws.data, 6, &data).unwrap();

    train::<u8, BuiltinQuantizer>(&ws.data, &ws.model, Metric::L2, 1.0, "zmSQ8", &seeded()).unwrap();
    let report = encode_as::<u8, BuiltinQuantizer>(&ws.data, &ws.model, &ws.output, "zmSQ8", &seeded())
        .unwrap();
    assert_eq!(report.code_size, 6);

    let record = MetadataRecord::read(meta_path(&ws.model)).unwrap();
    let codes = BuiltinQuantizer::open(&ws.output).unwrap();
    assert_eq!(codes.ntotal(), 300);
    for (i, row) in data.chunks_exact(6).enumerate().step_by(37) {
        let v = codes.reconstruct(i).unwrap();
        for ((x, y), c) in row.iter().zip(&v).zip(&record.centroid) {
            assert!((*x as f32 - c - y).abs() < 1.0, "row {i}: {x} vs {}", y + c);
        }
    }
}
