use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, open_database};
use crate::config::{CutoffOptions, FetchOptions, Opts};
use crate::cutoff;

#[derive(Parser, Debug, Clone)]
pub struct CalibrateCommand {
    #[command(flatten)]
    pub cutoff: CutoffOptions,
    #[command(flatten)]
    pub fetch: FetchOptions,
    /// 特征文件路径或文件名
    pub database: PathBuf,
    /// 忽略已有缓存，强制重新标定
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for CalibrateCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let (path, db) = open_database(opts, &self.database, &self.fetch)?;

        if self.force {
            let _ = std::fs::remove_file(cutoff::cache_path(&path));
        }
        let cutoffs = cutoff::load_cached(&path, &db, self.cutoff.bins, self.cutoff.cdf_thresh)?;

        for brand in &cutoffs.brands {
            println!("{:.4}\t{}", brand.cutoff, brand.brand);
        }

        Ok(())
    }
}
