pub mod centering;
pub mod cli;
pub mod config;
pub mod encode;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod quantizer;
pub mod train;
pub mod utils;
pub mod vecfile;

pub use config::{Opts, PipelineOptions};
pub use encode::{EncodeReport, encode, encode_as};
pub use error::{Error, Result};
pub use pipeline::{run, run_with_kind};
pub use train::{TrainOutcome, TrainReport, train};
