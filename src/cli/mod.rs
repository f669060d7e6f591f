mod calibrate;
mod export;
mod fetch;
mod r#match;
mod show;

use std::path::{Path, PathBuf};

pub use calibrate::*;
pub use export::*;
pub use fetch::*;
pub use r#match::*;
pub use show::*;

use crate::config::{FetchOptions, Opts};
use crate::db::ReferenceDatabase;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}

/// 打开特征库，本地缺失时按下载参数走一次远端回退
fn open_database(
    opts: &Opts,
    file: &Path,
    fetch: &FetchOptions,
) -> anyhow::Result<(PathBuf, ReferenceDatabase)> {
    let path = opts.resolve(file);
    let db = if fetch.no_fetch {
        ReferenceDatabase::load(&path)?
    } else {
        ReferenceDatabase::load_or_fetch(&path, &fetch.feature_url)?
    };
    Ok((path, db))
}
