use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{self, DEFAULT_FEATURE_URL, ReferenceDatabase};

#[derive(Parser, Debug, Clone)]
pub struct FetchCommand {
    /// 要下载的特征文件名
    pub filename: PathBuf,
    /// 特征文件的远端基地址
    #[arg(long, value_name = "URL", default_value = DEFAULT_FEATURE_URL)]
    pub feature_url: String,
}

impl SubCommandExtend for FetchCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let path = opts.data_dir.join(&self.filename);
        db::fetch(&path, &self.feature_url)?;
        // 下载后立刻加载一次，确保拿到的是可用的工件
        let db = ReferenceDatabase::load(&path)?;
        println!("fetched {} ({} x {})", path.display(), db.len(), db.dim());
        Ok(())
    }
}
