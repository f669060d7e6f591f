use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use ndarray_npy::write_npy;

use crate::cli::{SubCommandExtend, open_database};
use crate::config::{FetchOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    #[command(flatten)]
    pub fetch: FetchOptions,
    /// 特征文件路径或文件名
    pub database: PathBuf,
    /// 输出的 npy 路径
    #[arg(long, default_value = "features.npy")]
    pub output: PathBuf,
}

impl SubCommandExtend for ExportCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let (_, db) = open_database(opts, &self.database, &self.fetch)?;
        write_npy(&self.output, &db.features().to_owned())?;
        info!("exported {}x{} features to {}", db.len(), db.dim(), self.output.display());
        Ok(())
    }
}
