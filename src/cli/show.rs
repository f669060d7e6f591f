use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::cli::{SubCommandExtend, open_database};
use crate::config::{FetchOptions, Opts};

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub fetch: FetchOptions,
    /// 特征文件路径或文件名
    pub database: PathBuf,
}

impl SubCommandExtend for ShowCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let (_, db) = open_database(opts, &self.database, &self.fetch)?;

        println!("model      : {}", db.identity());
        println!("features   : {} x {}", db.len(), db.dim());
        let [h, w, c] = db.input_shape();
        println!("input shape: {}x{}x{}", h, w, c);
        println!("brands     : {}", db.brands().len());
        for entry in db.brands() {
            println!("  {}\t{} reference(s)", entry.name, entry.rows.len());
        }

        Ok(())
    }
}
