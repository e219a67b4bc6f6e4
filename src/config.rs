use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::cli::*;
use crate::quantizer::Metric;
use crate::vecfile::READ_BUFFER_SIZE;

/// 编码时每个块的默认向量数量
pub const DEFAULT_BLOCK_SIZE: usize = 5_000_000;
/// 串行编码的量化器使用的默认块大小
pub const DEFAULT_SEQUENTIAL_BLOCK_SIZE: usize = 50_000;
/// 默认的训练集大小上限
pub const DEFAULT_MAX_TRAINING_SET_SIZE: usize = 256_000;

/// 训练与编码流程的可调参数
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// 编码时每次读入内存的最大向量数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BLOCK_SIZE, value_parser = parse_positive)]
    pub block_size: usize,
    /// 串行编码的量化器（如 RQ、QINCo）使用的块大小
    #[arg(long, value_name = "N", default_value_t = DEFAULT_SEQUENTIAL_BLOCK_SIZE, value_parser = parse_positive)]
    pub sequential_block_size: usize,
    /// 训练集大小上限，量化器内部的采样上限低于此值时会被提高
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_TRAINING_SET_SIZE)]
    pub max_training_set_size: usize,
    /// 采样使用的随机种子，不指定时每次运行结果不同
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
    /// 顺序读取数据集时的缓冲区大小（字节）
    #[arg(long, value_name = "BYTES", default_value_t = READ_BUFFER_SIZE, value_parser = parse_positive)]
    pub read_buffer_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sequential_block_size: DEFAULT_SEQUENTIAL_BLOCK_SIZE,
            max_training_set_size: DEFAULT_MAX_TRAINING_SET_SIZE,
            seed: None,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

/// 训练相关的公共参数
#[derive(Parser, Debug, Clone)]
pub struct TrainOptions {
    /// 量化器描述字符串，以 `zm` 开头表示训练前先做零均值化，例如 `zmPQ16`
    #[arg(short = 's', long = "spec", value_name = "SPEC")]
    pub spec: String,
    /// 相似度度量
    #[arg(short, long, value_enum, default_value_t = Metric::L2)]
    pub metric: Metric,
    /// 每条向量被选入训练集的概率，大于 1 时按 1 处理
    #[arg(short = 'p', long, value_name = "P", default_value_t = 0.1, value_parser = parse_sample_rate)]
    pub sample_rate: f64,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "vecpress", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 日志详细程度，可重复使用，例如 `-vv`
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Opts {
    /// 根据 `-v` 的次数决定默认日志级别，`RUST_LOG` 优先
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 训练（模型已存在时跳过）并编码整个数据集
    Run(RunCommand),
    /// 只训练量化模型
    Train(TrainCommand),
    /// 使用已有的模型编码数据集
    Encode(EncodeCommand),
    /// 将 uint8 / int8 数据集转换为 float 数据集
    Convert(ConvertCommand),
    /// 查看模型或编码结果的元数据
    Show(ShowCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// 表格
    Table,
    /// JSON
    Json,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("value must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("无效的数字: {}", e)),
    }
}

fn parse_sample_rate(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(p) if p > 0.0 && p.is_finite() => Ok(p),
        Ok(_) => Err("sample rate must be a positive number".to_string()),
        Err(e) => Err(format!("无效的数字: {}", e)),
    }
}
