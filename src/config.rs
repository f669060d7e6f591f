use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::cutoff::{DEFAULT_BINS, DEFAULT_CDF_THRESH};
use crate::db::DEFAULT_FEATURE_URL;

static DATA_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "logoseek").expect("failed to get project dir");
    proj_dirs.data_dir().to_path_buf()
});

fn default_data_dir() -> &'static str {
    DATA_DIR.to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "logoseek", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 特征文件存放目录
    #[arg(short, long, default_value = default_data_dir())]
    pub data_dir: PathBuf,
}

impl Opts {
    /// 把命令行给出的特征文件名解析为实际路径
    ///
    /// 已存在的路径原样使用，否则视为数据目录下的文件名。
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.exists() || file.is_absolute() {
            file.to_path_buf()
        } else {
            self.data_dir.join(file)
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 查看特征库的基本信息
    Show(ShowCommand),
    /// 计算并缓存各品牌的相似度接受阈值
    Calibrate(CalibrateCommand),
    /// 把查询向量（npy 矩阵）与特征库匹配
    Match(MatchCommand),
    /// 导出特征矩阵为 npy 文件
    Export(ExportCommand),
    /// 从远端对象存储下载特征文件
    Fetch(FetchCommand),
}

/// 标定参数，多个子命令共用
#[derive(Parser, Debug, Clone)]
pub struct CutoffOptions {
    /// 相似度直方图分桶数量
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BINS)]
    pub bins: usize,
    /// 累积分布阈值
    #[arg(long, value_name = "P", default_value_t = DEFAULT_CDF_THRESH)]
    pub cdf_thresh: f32,
}

/// 远端下载参数
#[derive(Parser, Debug, Clone)]
pub struct FetchOptions {
    /// 特征文件的远端基地址
    #[arg(long, value_name = "URL", default_value = DEFAULT_FEATURE_URL)]
    pub feature_url: String,
    /// 本地缺失时不尝试远端下载
    #[arg(long)]
    pub no_fetch: bool,
}
