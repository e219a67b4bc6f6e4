use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, PipelineOptions, TrainOptions};
use crate::pipeline::run_with_kind;
use crate::quantizer::DefaultQuantizer;
use crate::vecfile::ElementKind;

#[derive(Parser, Debug, Clone)]
pub struct RunCommand {
    /// 数据集文件
    pub data: PathBuf,
    /// 模型文件，已存在时跳过训练
    pub model: PathBuf,
    /// 编码结果输出路径
    pub output: PathBuf,
    #[command(flatten)]
    pub train: TrainOptions,
    /// 数据集中数值的类型
    #[arg(short = 't', long, value_enum, default_value_t = ElementKind::F32)]
    pub data_type: ElementKind,
    #[command(flatten)]
    pub pipeline: PipelineOptions,
}

impl SubCommandExtend for RunCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let report = run_with_kind::<DefaultQuantizer>(
            self.data_type,
            &self.data,
            &self.model,
            &self.output,
            self.train.metric,
            self.train.sample_rate,
            &self.train.spec,
            &self.pipeline,
        )?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
