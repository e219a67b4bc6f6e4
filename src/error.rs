use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// 训练与编码流程中的所有错误，任何一个都会终止当前流程
#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: `{}`", .path.display())]
    NotFound { path: PathBuf },
    #[error("model not found: `{}` (a model file and its `.meta` file are both required)", .path.display())]
    ModelNotFound { path: PathBuf },
    #[error("corrupt metadata `{}`: {reason}", .path.display())]
    CorruptMetadata { path: PathBuf, reason: String },
    #[error("dimension mismatch: `{}` stores dim = {expected} but the dataset has dim = {actual}", .path.display())]
    DimensionMismatch { path: PathBuf, expected: usize, actual: usize },
    #[error("unsupported quantizer kind `{spec}`: flat-coded storage is required")]
    UnsupportedQuantizerKind { spec: String },
    #[error("invalid sample rate {sample_rate}: expected a finite number greater than 0")]
    InvalidSampleRate { sample_rate: f64 },
    #[error("no training points sampled from `{}` with sample rate {sample_rate}", .path.display())]
    EmptyTrainingSample { path: PathBuf, sample_rate: f64 },
    #[error("I/O failure on `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("quantizer failure: {0:#}")]
    Quantizer(anyhow::Error),
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// 为量化器返回的错误附加上下文
    pub(crate) fn quantizer<C>(context: C) -> impl FnOnce(anyhow::Error) -> Self
    where
        C: Display + Send + Sync + 'static,
    {
        move |e| Self::Quantizer(e.context(context))
    }

    pub(crate) fn corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata { path: path.as_ref().to_path_buf(), reason: reason.into() }
    }
}

/// 为 `io::Result` 附加出错的文件路径
pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
