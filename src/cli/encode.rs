use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, PipelineOptions};
use crate::encode::encode_as;
use crate::quantizer::DefaultQuantizer;
use crate::vecfile::ElementKind;

#[derive(Parser, Debug, Clone)]
pub struct EncodeCommand {
    /// 数据集文件
    pub data: PathBuf,
    /// 已训练的模型文件，同目录下需要有对应的 `.meta` 文件
    pub model: PathBuf,
    /// 编码结果输出路径
    pub output: PathBuf,
    /// 训练时使用的量化器描述字符串，用于判断是否需要串行编码
    #[arg(short = 's', long = "spec", value_name = "SPEC", default_value = "")]
    pub spec: String,
    /// 数据集中数值的类型
    #[arg(short = 't', long, value_enum, default_value_t = ElementKind::F32)]
    pub data_type: ElementKind,
    #[command(flatten)]
    pub pipeline: PipelineOptions,
}

impl SubCommandExtend for EncodeCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let (data, model, output) = (&self.data, &self.model, &self.output);
        let report = match self.data_type {
            ElementKind::F32 => {
                encode_as::<f32, DefaultQuantizer>(data, model, output, &self.spec, &self.pipeline)?
            }
            ElementKind::U8 => {
                encode_as::<u8, DefaultQuantizer>(data, model, output, &self.spec, &self.pipeline)?
            }
            ElementKind::I8 => {
                encode_as::<i8, DefaultQuantizer>(data, model, output, &self.spec, &self.pipeline)?
            }
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
