//! 数据集文件读写
//!
//! 文件格式为 `u32 npts, u32 dim`，随后是按行存储的 `npts * dim` 个数值，小端序，无填充。

mod element;
mod sample;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytemuck::{Pod, cast_slice, cast_slice_mut};
pub use element::*;
use indicatif::ProgressBar;
use log::info;
pub use sample::*;

use crate::error::{Error, IoResultExt, Result};
use crate::utils::pb_style;

/// 顺序读取时使用的缓冲区大小
pub const READ_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// 数据集文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorFileHeader {
    /// 向量数量
    pub num_points: u32,
    /// 向量维数
    pub dim: u32,
}

impl VectorFileHeader {
    /// 文件头的字节数
    pub const SIZE: u64 = 8;

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let num_points = reader.read_u32::<LittleEndian>()?;
        let dim = reader.read_u32::<LittleEndian>()?;
        Ok(Self { num_points, dim })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.num_points)?;
        writer.write_u32::<LittleEndian>(self.dim)?;
        Ok(())
    }
}

/// 带缓冲的顺序读取器，每次读取若干条完整向量
pub struct VectorReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: VectorFileHeader,
}

impl VectorReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_capacity(path, READ_BUFFER_SIZE)
    }

    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_path(&path)?;
        let mut reader = BufReader::with_capacity(capacity, file);
        let header = VectorFileHeader::read_from(&mut reader).with_path(&path)?;
        if header.dim == 0 {
            let err = io::Error::new(io::ErrorKind::InvalidData, "dataset dimension is zero");
            return Err(Error::io(&path, err));
        }
        Ok(Self { path, reader, header })
    }

    pub fn header(&self) -> VectorFileHeader {
        self.header
    }

    pub fn num_points(&self) -> usize {
        self.header.num_points as usize
    }

    pub fn dim(&self) -> usize {
        self.header.dim as usize
    }

    /// 检查文件长度是否与文件头以及数值类型的大小一致
    pub fn check_len(&self, elem_size: usize) -> Result<()> {
        let actual = self.reader.get_ref().metadata().with_path(&self.path)?.len();
        let payload = self.num_points() as u64 * self.dim() as u64 * elem_size as u64;
        let expected = VectorFileHeader::SIZE + payload;
        if actual != expected {
            let msg = format!(
                "file is {actual} bytes but the header implies {expected} bytes ({} x {} x {elem_size})",
                self.num_points(),
                self.dim()
            );
            return Err(Error::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, msg)));
        }
        Ok(())
    }

    /// 将接下来的 `buf.len()` 个数值直接读入缓冲区，数据不足时返回错误
    pub fn read_into<T: Pod>(&mut self, buf: &mut [T]) -> Result<()> {
        self.reader.read_exact(cast_slice_mut(buf)).with_path(&self.path)
    }
}

/// 顺序写入数据集文件
pub struct VectorWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl VectorWriter {
    pub fn create(path: impl AsRef<Path>, header: VectorFileHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).with_path(&path)?;
        let mut writer = BufWriter::new(file);
        header.write_to(&mut writer).with_path(&path)?;
        Ok(Self { path, writer })
    }

    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        self.writer.write_all(cast_slice(data)).with_path(&self.path)
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().with_path(&self.path)
    }
}

/// 将 `data` 作为 `data.len() / dim` 条向量写入数据集文件
pub fn write_vectors<T: Pod>(path: impl AsRef<Path>, dim: usize, data: &[T]) -> Result<()> {
    assert!(dim > 0, "dim must be positive");
    assert_eq!(data.len() % dim, 0, "data length must be a multiple of dim");
    let header = VectorFileHeader { num_points: (data.len() / dim) as u32, dim: dim as u32 };
    let mut writer = VectorWriter::create(path, header)?;
    writer.write(data)?;
    writer.finish()
}

/// 把任意数值类型的数据集转换成 f32 数据集，每次最多处理 `block_size` 条向量
pub fn convert_to_f32<T: VectorElement>(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    block_size: usize,
) -> Result<VectorFileHeader> {
    let mut reader = VectorReader::open(src)?;
    let header = reader.header();
    let (num_points, dim) = (reader.num_points(), reader.dim());
    let block_size = block_size.clamp(1, num_points.max(1));

    let mut writer = VectorWriter::create(dst, header)?;
    let mut raw = vec![T::zeroed(); block_size * dim];
    let mut converted = vec![0f32; block_size * dim];

    let pb = ProgressBar::new(num_points as u64).with_style(pb_style());
    pb.set_message(format!("转换 {} 数据", T::KIND.name()));
    for start in (0..num_points).step_by(block_size) {
        let len = block_size.min(num_points - start) * dim;
        reader.read_into(&mut raw[..len])?;
        T::convert_into(&raw[..len], &mut converted[..len]);
        writer.write(&converted[..len])?;
        pb.inc((len / dim) as u64);
    }
    pb.finish_and_clear();
    writer.finish()?;

    info!("转换完成：{} 条 {} 维向量", num_points, dim);
    Ok(header)
}
