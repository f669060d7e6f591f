use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::db::{ReferenceDatabase, hash_file};
use crate::error::Result;
use crate::matcher::cosine_similarity;

/// 相似度直方图的默认分桶数量
pub const DEFAULT_BINS: usize = 100;
/// 默认累积分布阈值：观测相似度须超过参考分布 99% 的质量才算匹配
pub const DEFAULT_CDF_THRESH: f32 = 0.99;

/// 单个品牌的标定结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandCutoff {
    pub brand: String,
    /// 接受阈值，观测相似度 >= cutoff 才视为该品牌
    pub cutoff: f32,
    /// 经验累积分布，(分桶上边界, 累积概率)
    pub cdf: Vec<(f32, f32)>,
}

/// 全库的逐品牌接受阈值
///
/// 不存在全局常数阈值：不同品牌的 logo 视觉复杂度和参考样本数不同，
/// 特征距离分布差异很大，阈值必须按品牌从经验分布推出。
/// 顺序与品牌在特征库中的首次出现顺序一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCutoffs {
    pub bins: usize,
    pub cdf_thresh: f32,
    pub brands: Vec<BrandCutoff>,
}

impl SimilarityCutoffs {
    /// 直接由 (品牌, 阈值) 构造，绕过标定。主要供测试和外部标定结果使用
    pub fn from_cutoffs(pairs: Vec<(String, f32)>) -> Self {
        let brands = pairs
            .into_iter()
            .map(|(brand, cutoff)| BrandCutoff { brand, cutoff, cdf: vec![] })
            .collect();
        Self { bins: 0, cdf_thresh: 0.0, brands }
    }

    pub fn get(&self, brand: &str) -> Option<f32> {
        self.brands.iter().find(|b| b.brand == brand).map(|b| b.cutoff)
    }
}

/// 对特征库做逐品牌标定
///
/// 每个品牌以其全部参考向量对其他品牌参考向量（跨品牌负样本）的余弦相似度
/// 建立 [0, 1] 上 `bins` 个桶的经验直方图，转为累积分布后，
/// 取累积概率首次达到 `cdf_thresh` 的分桶上边界作为该品牌的接受阈值。
/// 单品牌库退化为品牌内相似度；完全没有可比对象的品牌阈值为 1.0。
pub fn calibrate(db: &ReferenceDatabase, bins: usize, cdf_thresh: f32) -> SimilarityCutoffs {
    assert!(bins > 0, "bins must be positive");
    assert!((0.0..=1.0).contains(&cdf_thresh), "cdf_thresh must be in [0, 1]");

    let start = Instant::now();
    let features = db.features();
    let mut brands = vec![];

    for entry in db.brands() {
        let mut sims = vec![];
        for &i in &entry.rows {
            for (j, name) in db.brand_map().iter().enumerate() {
                if name != &entry.name {
                    sims.push(cosine_similarity(features.row(i), features.row(j)));
                }
            }
        }
        if sims.is_empty() {
            // 没有跨品牌负样本时退化为品牌内相似度
            for (a, &i) in entry.rows.iter().enumerate() {
                for &j in &entry.rows[a + 1..] {
                    sims.push(cosine_similarity(features.row(i), features.row(j)));
                }
            }
        }

        let (cutoff, cdf) = cutoff_from_similarities(&sims, bins, cdf_thresh);
        if sims.is_empty() {
            warn!("brand {} has nothing to calibrate against, cutoff forced to 1.0", entry.name);
        }
        debug!("brand {}: cutoff {:.4} from {} similarities", entry.name, cutoff, sims.len());
        brands.push(BrandCutoff { brand: entry.name, cutoff, cdf });
    }

    info!("calibrated {} brands in {:.2}s", brands.len(), start.elapsed().as_secs_f32());
    SimilarityCutoffs { bins, cdf_thresh, brands }
}

/// 从一组相似度样本得出 (阈值, 经验 CDF)
fn cutoff_from_similarities(sims: &[f32], bins: usize, cdf_thresh: f32) -> (f32, Vec<(f32, f32)>) {
    if sims.is_empty() {
        return (1.0, vec![]);
    }

    let mut hist = vec![0usize; bins];
    for &s in sims {
        let b = ((s.clamp(0.0, 1.0) * bins as f32) as usize).min(bins - 1);
        hist[b] += 1;
    }

    let mut cdf = Vec::with_capacity(bins);
    let mut cum = 0;
    let mut cutoff = 1.0;
    let mut found = false;
    for (b, &count) in hist.iter().enumerate() {
        cum += count;
        let edge = (b + 1) as f32 / bins as f32;
        let prob = cum as f32 / sims.len() as f32;
        cdf.push((edge, prob));
        if !found && prob >= cdf_thresh {
            cutoff = edge;
            found = true;
        }
    }
    (cutoff, cdf)
}

/// 阈值缓存文件：以特征文件摘要和标定参数为键
#[derive(Serialize, Deserialize)]
struct CutoffCache {
    key: String,
    cutoffs: SimilarityCutoffs,
}

/// 特征库对应的阈值缓存路径
pub fn cache_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("cutoffs.json")
}

/// 读取缓存的标定结果，键不一致或缓存缺失时重新标定并写回
///
/// 键 = (特征文件 blake3, bins, cdf_thresh)，特征库变化后自动失效。
pub fn load_cached(
    db_path: &Path,
    db: &ReferenceDatabase,
    bins: usize,
    cdf_thresh: f32,
) -> Result<SimilarityCutoffs> {
    let key = hash_file(db_path)?;
    let path = cache_path(db_path);

    if let Some(cached) = read_cache(&path) {
        if cached.key == key
            && cached.cutoffs.bins == bins
            && cached.cutoffs.cdf_thresh == cdf_thresh
        {
            debug!("cutoff cache hit: {}", path.display());
            return Ok(cached.cutoffs);
        }
        debug!("cutoff cache stale: {}", path.display());
    }

    let cutoffs = calibrate(db, bins, cdf_thresh);
    let tmp = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer(&mut writer, &CutoffCache { key, cutoffs: cutoffs.clone() })
        .map_err(std::io::Error::other)?;
    writer.flush()?;
    fs::rename(&tmp, &path)?;

    Ok(cutoffs)
}

fn read_cache(path: &Path) -> Option<CutoffCache> {
    let reader = BufReader::new(File::open(path).ok()?);
    serde_json::from_reader(reader).ok()
}
