use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, PipelineOptions, TrainOptions};
use crate::quantizer::{DefaultQuantizer, Quantizer};
use crate::train::{TrainOutcome, train};
use crate::vecfile::{ElementKind, VectorElement};

#[derive(Parser, Debug, Clone)]
pub struct TrainCommand {
    /// 数据集文件
    pub data: PathBuf,
    /// 模型保存路径，已存在时不会重新训练
    pub model: PathBuf,
    #[command(flatten)]
    pub train: TrainOptions,
    /// 数据集中数值的类型
    #[arg(short = 't', long, value_enum, default_value_t = ElementKind::F32)]
    pub data_type: ElementKind,
    #[command(flatten)]
    pub pipeline: PipelineOptions,
}

impl TrainCommand {
    fn train_as<T: VectorElement, Q: Quantizer>(&self) -> Result<TrainOutcome> {
        let outcome = train::<T, Q>(
            &self.data,
            &self.model,
            self.train.metric,
            self.train.sample_rate,
            &self.train.spec,
            &self.pipeline,
        )?;
        Ok(outcome)
    }
}

impl SubCommandExtend for TrainCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let outcome = match self.data_type {
            ElementKind::F32 => self.train_as::<f32, DefaultQuantizer>()?,
            ElementKind::U8 => self.train_as::<u8, DefaultQuantizer>()?,
            ElementKind::I8 => self.train_as::<i8, DefaultQuantizer>()?,
        };
        match outcome {
            TrainOutcome::Skipped => info!("模型已存在，未重新训练"),
            TrainOutcome::Trained(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }
}
