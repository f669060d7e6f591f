use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use ndarray::Array2;
use ndarray_npy::read_npy;

use crate::cli::{SubCommandExtend, open_database};
use crate::config::{CutoffOptions, FetchOptions, Opts};
use crate::cutoff;
use crate::matcher::{Match, match_batch};

#[derive(Parser, Debug, Clone)]
pub struct MatchCommand {
    #[command(flatten)]
    pub cutoff: CutoffOptions,
    #[command(flatten)]
    pub fetch: FetchOptions,
    /// 特征文件路径或文件名
    pub database: PathBuf,
    /// 查询向量矩阵（npy，N x F，f32）
    pub queries: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for MatchCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let (path, db) = open_database(opts, &self.database, &self.fetch)?;
        let cutoffs = cutoff::load_cached(&path, &db, self.cutoff.bins, self.cutoff.cdf_thresh)?;

        let queries: Array2<f32> = read_npy(&self.queries)?;
        let matches = match_batch(queries.view(), &db, &cutoffs)?;

        print_result(&matches, self)
    }
}

fn print_result(matches: &[Match], opts: &MatchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(matches)?)
        }
        OutputFormat::Table => {
            for m in matches {
                println!(
                    "{}\t{:.4}\t{}",
                    m.candidate_index,
                    m.similarity,
                    m.brand.as_deref().unwrap_or("none")
                );
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
