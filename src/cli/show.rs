use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat};
use crate::metadata::{MetadataRecord, meta_path};
use crate::quantizer::{DefaultQuantizer, Metric, Quantizer};

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// 模型文件或编码结果文件
    pub model: PathBuf,
    /// 输出格式
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ModelSummary {
    dim: usize,
    metric: Metric,
    is_trained: bool,
    ntotal: usize,
    code_size: Option<usize>,
    /// 编码结果文件没有对应的元数据
    metadata: Option<MetadataRecord>,
}

impl SubCommandExtend for ShowCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let quantizer = DefaultQuantizer::open(&self.model)
            .with_context(|| format!("failed to load `{}`", self.model.display()))?;
        let meta_path = meta_path(&self.model);
        let metadata = match meta_path.exists() {
            true => Some(MetadataRecord::read(&meta_path)?),
            false => None,
        };
        let summary = ModelSummary {
            dim: quantizer.dim(),
            metric: quantizer.metric(),
            is_trained: quantizer.is_trained(),
            ntotal: quantizer.ntotal(),
            code_size: quantizer.flat_code_size(),
            metadata,
        };

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?)
            }
            OutputFormat::Table => print_table(&summary),
        }
        Ok(())
    }
}

fn print_table(summary: &ModelSummary) {
    println!("dim\t{}", summary.dim);
    println!("metric\t{:?}", summary.metric);
    println!("trained\t{}", summary.is_trained);
    println!("ntotal\t{}", summary.ntotal);
    match summary.code_size {
        Some(code_size) => println!("code_size\t{}", code_size),
        None => println!("code_size\t-"),
    }
    if let Some(meta) = &summary.metadata {
        println!("centered\t{}", !meta.is_zero_centroid());
        let centroid = meta.centroid.iter().map(|c| format!("{:.4}", c)).collect::<Vec<_>>();
        println!("centroid\t[{}]", centroid.join(", "));
    }
}
