use anyhow::Result;
use clap::Parser;
use vecpress::cli::SubCommandExtend;
use vecpress::config::{Opts, SubCommand};

fn main() -> Result<()> {
    let opts = Opts::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(opts.log_level())).init();

    match &opts.subcmd {
        SubCommand::Run(config) => config.run(&opts),
        SubCommand::Train(config) => config.run(&opts),
        SubCommand::Encode(config) => config.run(&opts),
        SubCommand::Convert(config) => config.run(&opts),
        SubCommand::Show(config) => config.run(&opts),
    }
}
