use clap::Parser;

use logoseek::cli::SubCommandExtend;
use logoseek::config::{Opts, SubCommand};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Show(cmd) => cmd.run(&opts),
        SubCommand::Calibrate(cmd) => cmd.run(&opts),
        SubCommand::Match(cmd) => cmd.run(&opts),
        SubCommand::Export(cmd) => cmd.run(&opts),
        SubCommand::Fetch(cmd) => cmd.run(&opts),
    }
}
