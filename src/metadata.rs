//! 量化模型的元数据文件 `<model>.meta`
//!
//! 布局与 pq 表的元数据保持一致：
//!
//! ```text
//! u32 code_size
//! u32 dim
//! i32 rows = 1      <- 从偏移量 8 开始是一个只有一行的向量文件
//! i32 cols = dim
//! f32 centroid[dim]
//! ```

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::error::{Error, IoResultExt, Result};

/// 元数据中向量文件部分的起始偏移量
const CENTROID_OFFSET: usize = 8;
/// 向量文件头的大小
const VECTOR_HEADER_SIZE: usize = 8;

/// 返回模型对应的元数据文件路径，即在文件名后追加 `.meta`
pub fn meta_path(model_path: impl AsRef<Path>) -> PathBuf {
    append_suffix(model_path.as_ref(), ".meta")
}

/// 在完整文件名后追加后缀，而不是替换扩展名
pub(crate) fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// 量化模型的元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    /// 每条向量编码后的字节数
    pub code_size: u32,
    /// 向量维数
    pub dim: u32,
    /// 训练时减去的中心点，未做零均值化时全为 0
    pub centroid: Vec<f32>,
}

impl MetadataRecord {
    pub fn new(code_size: u32, centroid: Vec<f32>) -> Self {
        Self { code_size, dim: centroid.len() as u32, centroid }
    }

    /// 中心点是否全为 0
    pub fn is_zero_centroid(&self) -> bool {
        self.centroid.iter().all(|&c| c == 0.0)
    }

    /// 写入元数据，考虑到中途打断的情况，使用临时文件写入再重命名
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.centroid.len() != self.dim as usize {
            let reason = format!(
                "centroid has {} entries but dim = {}",
                self.centroid.len(),
                self.dim
            );
            return Err(Error::corrupt(path, reason));
        }
        let tmp_path = append_suffix(path, ".tmp");
        {
            let file = File::create(&tmp_path).with_path(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            self.write_to(&mut writer).with_path(&tmp_path)?;
            writer.flush().with_path(&tmp_path)?;
        }
        fs::rename(&tmp_path, path).with_path(path)?;
        Ok(())
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.code_size)?;
        writer.write_u32::<LittleEndian>(self.dim)?;
        writer.write_i32::<LittleEndian>(1)?;
        writer.write_i32::<LittleEndian>(self.dim as i32)?;
        for &c in &self.centroid {
            writer.write_f32::<LittleEndian>(c)?;
        }
        Ok(())
    }

    /// 读取元数据，并检查行数和维数是否一致
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut buf = vec![];
        File::open(path).and_then(|mut f| f.read_to_end(&mut buf)).with_path(path)?;

        let header_size = CENTROID_OFFSET + VECTOR_HEADER_SIZE;
        if buf.len() < header_size {
            let reason = format!("expected at least {} bytes, found {}", header_size, buf.len());
            return Err(Error::corrupt(path, reason));
        }

        let mut cursor = Cursor::new(&buf);
        let truncated = |_| Error::corrupt(path, "truncated header");
        let code_size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let dim = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let rows = cursor.read_i32::<LittleEndian>().map_err(truncated)?;
        let cols = cursor.read_i32::<LittleEndian>().map_err(truncated)?;

        if rows != 1 || cols as i64 != dim as i64 {
            let reason = format!(
                "file_dim = {cols}, file_rows = {rows} but expecting {dim} entries in 1 row"
            );
            return Err(Error::corrupt(path, reason));
        }

        let expected = header_size + dim as usize * 4;
        if buf.len() != expected {
            let reason = format!("expected {} bytes, found {}", expected, buf.len());
            return Err(Error::corrupt(path, reason));
        }

        let mut centroid = vec![0f32; dim as usize];
        cursor
            .read_f32_into::<LittleEndian>(&mut centroid)
            .map_err(|_| Error::corrupt(path, "truncated centroid"))?;

        Ok(Self { code_size, dim, centroid })
    }
}
