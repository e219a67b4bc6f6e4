mod convert;
mod encode;
mod run;
mod show;
mod train;

pub use convert::*;
pub use encode::*;
pub use run::*;
pub use show::*;
pub use train::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}
