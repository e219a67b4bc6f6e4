mod kmeans;
mod product;
mod residual;
mod scalar;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Result, bail, ensure};
pub use kmeans::{KMeansParams, KMeansState, imbalance_factor, kmeans};
use ndarray::ArrayView2;
pub use product::ProductCodec;
pub use residual::ResidualCodec;
pub use scalar::ScalarCodec;
use serde::{Deserialize, Serialize};

use super::{Metric, Quantizer};
use crate::metadata::append_suffix;

/// 内置模型文件的魔数
const MAGIC: &[u8; 8] = b"VPQMODEL";

/// 单条向量的编解码器
pub trait Codec {
    /// 每条向量编码后的字节数
    fn code_size(&self) -> usize;

    fn is_trained(&self) -> bool;

    /// x 为展平的 n * d 训练数据
    fn train(&mut self, x: &[f32]) -> Result<()>;

    fn encode(&self, v: &[f32], code: &mut [u8]);

    fn decode(&self, code: &[u8], v: &mut [f32]);
}

/// 内置量化器的种类，由描述字符串解析得到
///
/// - `SQ8`：8 位标量量化
/// - `PQ<m>` / `PQ<m>x<nbits>`：乘积量化，nbits 默认为 8
/// - `RQ<m>` / `RQ<m>x<nbits>`：残差量化，只能串行编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Scalar,
    Product { m: usize, nbits: usize },
    Residual { m: usize, nbits: usize },
}

impl BuiltinKind {
    pub fn parse(description: &str) -> Result<Self> {
        let s = description.trim();
        if s == "SQ8" {
            return Ok(Self::Scalar);
        }
        if let Some(rest) = s.strip_prefix("PQ") {
            let (m, nbits) = parse_m_nbits(rest, description)?;
            return Ok(Self::Product { m, nbits });
        }
        if let Some(rest) = s.strip_prefix("RQ") {
            let (m, nbits) = parse_m_nbits(rest, description)?;
            return Ok(Self::Residual { m, nbits });
        }
        bail!("unknown quantizer description `{description}`")
    }
}

fn parse_m_nbits(s: &str, description: &str) -> Result<(usize, usize)> {
    let (m, nbits) = s.split_once('x').unwrap_or((s, "8"));
    match (m.parse::<usize>(), nbits.parse::<usize>()) {
        (Ok(m), Ok(nbits)) => Ok((m, nbits)),
        _ => bail!("invalid quantizer description `{description}`"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum CodecImpl {
    Scalar(ScalarCodec),
    Product(ProductCodec),
    Residual(ResidualCodec),
}

impl CodecImpl {
    fn as_codec(&self) -> &dyn Codec {
        match self {
            Self::Scalar(c) => c,
            Self::Product(c) => c,
            Self::Residual(c) => c,
        }
    }

    fn as_codec_mut(&mut self) -> &mut dyn Codec {
        match self {
            Self::Scalar(c) => c,
            Self::Product(c) => c,
            Self::Residual(c) => c,
        }
    }

    fn kmeans_params(&self) -> Option<&KMeansParams> {
        match self {
            Self::Scalar(_) => None,
            Self::Product(c) => Some(&c.params),
            Self::Residual(c) => Some(&c.params),
        }
    }

    fn kmeans_params_mut(&mut self) -> Option<&mut KMeansParams> {
        match self {
            Self::Scalar(_) => None,
            Self::Product(c) => Some(&mut c.params),
            Self::Residual(c) => Some(&mut c.params),
        }
    }

    fn ksub(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Product(c) => Some(c.ksub()),
            Self::Residual(c) => Some(c.ksub()),
        }
    }
}

/// 纯 Rust 实现的量化器，编码按添加顺序存放在一块连续内存中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinQuantizer {
    d: usize,
    metric: Metric,
    description: String,
    codec: CodecImpl,
    codes: Vec<u8>,
}

impl BuiltinQuantizer {
    /// 解码第 i 条向量
    pub fn reconstruct(&self, i: usize) -> Option<Vec<f32>> {
        let code_size = self.codec.as_codec().code_size();
        let code = self.codes.get(i * code_size..(i + 1) * code_size)?;
        let mut v = vec![0.0; self.d];
        self.codec.as_codec().decode(code, &mut v);
        Some(v)
    }
}

impl Quantizer for BuiltinQuantizer {
    fn create(d: usize, description: &str, metric: Metric) -> Result<Self> {
        ensure!(d > 0, "dimension must be positive");
        let codec = match BuiltinKind::parse(description)? {
            BuiltinKind::Scalar => CodecImpl::Scalar(ScalarCodec::new(d)),
            BuiltinKind::Product { m, nbits } => CodecImpl::Product(ProductCodec::new(d, m, nbits)?),
            BuiltinKind::Residual { m, nbits } => {
                CodecImpl::Residual(ResidualCodec::new(d, m, nbits)?)
            }
        };
        Ok(Self { d, metric, description: description.trim().to_string(), codec, codes: vec![] })
    }

    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        ensure!(&magic == MAGIC, "`{}` is not a vecpress model file", path.as_ref().display());
        let quantizer: Self = bincode::deserialize_from(reader)?;
        Ok(quantizer)
    }

    fn is_sequential_kind(description: &str) -> bool {
        matches!(BuiltinKind::parse(description), Ok(BuiltinKind::Residual { .. }))
    }

    fn dim(&self) -> usize {
        self.d
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn is_trained(&self) -> bool {
        self.codec.as_codec().is_trained()
    }

    fn ntotal(&self) -> usize {
        self.codes.len() / self.codec.as_codec().code_size()
    }

    fn train(&mut self, x: ArrayView2<'_, f32>) -> Result<()> {
        ensure!(x.ncols() == self.d, "expected {} columns, got {}", self.d, x.ncols());
        ensure!(x.nrows() > 0, "empty training set");
        let data: Vec<f32> = x.iter().copied().collect();
        self.codec.as_codec_mut().train(&data)
    }

    fn add(&mut self, x: ArrayView2<'_, f32>) -> Result<()> {
        ensure!(self.is_trained(), "quantizer has not been trained");
        ensure!(x.ncols() == self.d, "expected {} columns, got {}", self.d, x.ncols());

        let codec = self.codec.as_codec();
        let code_size = codec.code_size();
        let start = self.codes.len();
        self.codes.resize(start + x.nrows() * code_size, 0);

        let mut v = vec![0f32; self.d];
        let codes = self.codes[start..].chunks_exact_mut(code_size);
        for (row, code) in x.rows().into_iter().zip(codes) {
            v.iter_mut().zip(row).for_each(|(dst, src)| *dst = *src);
            codec.encode(&v, code);
        }
        Ok(())
    }

    /// 考虑到中途打断的情况，使用临时文件写入再重命名
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = append_suffix(path, ".tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(MAGIC)?;
            bincode::serialize_into(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(tmp_path, path)?;
        Ok(())
    }

    fn flat_code_size(&self) -> Option<usize> {
        Some(self.codec.as_codec().code_size())
    }

    fn codes(&self) -> Option<&[u8]> {
        Some(&self.codes)
    }

    fn sequential_encoding(&self) -> bool {
        matches!(self.codec, CodecImpl::Residual(_))
    }

    fn training_budget(&self) -> Option<usize> {
        let ksub = self.codec.ksub()?;
        let params = self.codec.kmeans_params()?;
        Some(ksub * params.max_points_per_centroid)
    }

    fn set_training_budget(&mut self, n: usize) {
        let Some(ksub) = self.codec.ksub() else { return };
        if let Some(params) = self.codec.kmeans_params_mut() {
            params.max_points_per_centroid = n / ksub + 1;
        }
    }
}
