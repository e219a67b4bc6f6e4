use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::vecfile::{ElementKind, convert_to_f32};

#[derive(Parser, Debug, Clone)]
pub struct ConvertCommand {
    /// 源数据集文件
    pub src: PathBuf,
    /// 转换后的 float 数据集文件
    pub dst: PathBuf,
    /// 源数据集中数值的类型
    #[arg(short = 't', long, value_enum)]
    pub data_type: ElementKind,
    /// 每次转换的向量数量
    #[arg(long, value_name = "N", default_value_t = 1_000_000)]
    pub block_size: usize,
}

impl SubCommandExtend for ConvertCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        match self.data_type {
            ElementKind::F32 => bail!("`{}` is already a float dataset", self.src.display()),
            ElementKind::U8 => convert_to_f32::<u8>(&self.src, &self.dst, self.block_size)?,
            ElementKind::I8 => convert_to_f32::<i8>(&self.src, &self.dst, self.block_size)?,
        };
        Ok(())
    }
}
