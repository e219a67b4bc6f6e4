mod builtin;
#[cfg(feature = "faiss")]
mod faiss;

use std::path::Path;

use anyhow::Result;
pub use builtin::*;
use clap::ValueEnum;
#[cfg(feature = "faiss")]
pub use faiss::FaissQuantizer;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[cfg(not(feature = "faiss"))]
pub type DefaultQuantizer = BuiltinQuantizer;
#[cfg(feature = "faiss")]
pub type DefaultQuantizer = FaissQuantizer;

/// 向量相似度度量
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// 欧氏距离
    #[default]
    L2,
    /// 内积
    #[value(name = "ip", alias = "mips", alias = "inner-product")]
    InnerProduct,
    /// 余弦相似度
    Cosine,
}

/// 适用于 f32 向量的量化器
///
/// 训练与编码流程只依赖这里的能力，不关心具体的量化算法。
pub trait Quantizer {
    /// 根据描述字符串创建一个未训练的量化器
    fn create(d: usize, description: &str, metric: Metric) -> Result<Self>
    where
        Self: Sized;

    /// 从指定路径加载量化器
    fn open<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;

    /// 描述字符串是否对应逐条串行编码的慢速量化器
    fn is_sequential_kind(_description: &str) -> bool
    where
        Self: Sized,
    {
        false
    }

    /// 向量维数
    fn dim(&self) -> usize;

    fn metric(&self) -> Metric;

    /// 是否已经训练
    fn is_trained(&self) -> bool;

    /// 已经添加的向量数量
    fn ntotal(&self) -> usize;

    /// 使用 n * d 的训练矩阵训练量化器
    fn train(&mut self, x: ArrayView2<'_, f32>) -> Result<()>;

    /// 编码 n * d 的向量并按顺序追加到量化器内部的编码存储中
    fn add(&mut self, x: ArrayView2<'_, f32>) -> Result<()>;

    /// 保存量化器
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<()>;

    /// 若量化器使用定长的扁平编码存储，返回每条向量的编码字节数
    fn flat_code_size(&self) -> Option<usize>;

    /// 扁平编码存储的原始数据，长度为 ntotal * code_size
    fn codes(&self) -> Option<&[u8]> {
        None
    }

    /// 编码是否只能逐条串行进行，此时应当使用更小的块
    fn sequential_encoding(&self) -> bool {
        false
    }

    /// 训练时内部最多使用的样本数量，超出时会在内部再次采样
    fn training_budget(&self) -> Option<usize> {
        None
    }

    /// 调整内部的训练样本上限
    fn set_training_budget(&mut self, _n: usize) {}

    /// 训练时内部会自行下采样，但上限无法从外部调整
    fn has_fixed_training_budget(&self) -> bool {
        false
    }
}
