use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ModelIdentity;

/// 参考特征文件的默认远端存储地址
pub const DEFAULT_FEATURE_URL: &str = "https://logohunters3.s3-us-west-2.amazonaws.com";

/// 磁盘上的特征记录：三个命名数组，features 以半精度位模式存储
#[derive(Serialize, Deserialize)]
struct FeatureRecord {
    features: Vec<u16>,
    rows: usize,
    cols: usize,
    brand_map: Vec<String>,
    input_shape: [usize; 3],
}

/// 已加载的参考特征库
///
/// 每行是一张参考图的特征向量，brand_map 与行一一对应。
/// 加载后在会话内只读，行序即数据库迭代序，匹配并列时以先出现者为准。
#[derive(Debug)]
pub struct ReferenceDatabase {
    features: Array2<f32>,
    brand_map: Vec<String>,
    input_shape: [usize; 3],
    identity: ModelIdentity,
}

/// 单个品牌在特征库里的条目：品牌名 + 其全部参考向量的行号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandEntry {
    pub name: String,
    pub rows: Vec<usize>,
}

impl ReferenceDatabase {
    /// 由内存数据构造特征库，校验各数组长度一致
    pub fn new(
        identity: ModelIdentity,
        features: Array2<f32>,
        brand_map: Vec<String>,
        input_shape: [usize; 3],
    ) -> Result<Self> {
        if features.dim().0 != brand_map.len() {
            return Err(Error::Corrupt(format!(
                "features has {} rows but brand_map has {} entries",
                features.dim().0,
                brand_map.len()
            )));
        }
        Ok(Self { features, brand_map, input_shape, identity })
    }

    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    pub fn brand_map(&self) -> &[String] {
        &self.brand_map
    }

    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    pub fn identity(&self) -> ModelIdentity {
        self.identity
    }

    /// 参考向量数量 N
    pub fn len(&self) -> usize {
        self.features.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 特征向量维数 F
    pub fn dim(&self) -> usize {
        self.features.dim().1
    }

    /// 按首次出现顺序给出各品牌条目
    pub fn brands(&self) -> Vec<BrandEntry> {
        let mut entries: Vec<BrandEntry> = vec![];
        for (i, name) in self.brand_map.iter().enumerate() {
            match entries.iter_mut().find(|e| &e.name == name) {
                Some(entry) => entry.rows.push(i),
                None => entries.push(BrandEntry { name: name.clone(), rows: vec![i] }),
            }
        }
        entries
    }

    /// 保存为单个压缩工件，写临时文件后原子重命名
    ///
    /// 特征降为半精度以减小体积，文件名必须符合命名约定且与库身份一致。
    pub fn save(&self, path: &Path) -> Result<()> {
        let identity = ModelIdentity::from_path(path)?;
        if identity != self.identity {
            return Err(Error::Format(format!(
                "file name encodes {} but database was built with {}",
                identity, self.identity
            )));
        }

        let record = FeatureRecord {
            features: self.features.iter().map(|&x| f32_to_f16_bits(x)).collect(),
            rows: self.features.dim().0,
            cols: self.features.dim().1,
            brand_map: self.brand_map.clone(),
            input_shape: self.input_shape,
        };

        let start = Instant::now();
        let tmp = path.with_extension("tmp");
        let writer = BufWriter::new(File::create(&tmp)?);
        let mut encoder = GzEncoder::new(writer, Compression::default());
        bincode::serialize_into(&mut encoder, &record)
            .map_err(|e| Error::Corrupt(e.to_string()))?;
        encoder.finish()?.flush()?;
        fs::rename(&tmp, path)?;
        info!(
            "saved {}x{} features to {} in {:.2}s",
            record.rows,
            record.cols,
            path.display(),
            start.elapsed().as_secs_f32()
        );

        Ok(())
    }

    /// 从本地文件加载特征库
    ///
    /// 文件缺失返回 NotFound，内容无法解码或数组长度不一致返回 Corrupt，
    /// 文件名不符合命名约定返回 Format。
    pub fn load(path: &Path) -> Result<Self> {
        let identity = ModelIdentity::from_path(path)?;
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let start = Instant::now();
        let reader = BufReader::new(File::open(path)?);
        let record: FeatureRecord = bincode::deserialize_from(GzDecoder::new(reader))
            .map_err(|e| Error::Corrupt(e.to_string()))?;

        if record.features.len() != record.rows * record.cols {
            return Err(Error::Corrupt(format!(
                "expected {} feature values, found {}",
                record.rows * record.cols,
                record.features.len()
            )));
        }
        let values = record.features.iter().map(|&b| f16_bits_to_f32(b)).collect();
        let features = Array2::from_shape_vec((record.rows, record.cols), values)
            .map_err(|e| Error::Corrupt(e.to_string()))?;

        let db = Self::new(identity, features, record.brand_map, record.input_shape)?;
        info!(
            "loaded {}x{} features from {} in {:.2}s",
            db.len(),
            db.dim(),
            path.display(),
            start.elapsed().as_secs_f32()
        );

        Ok(db)
    }

    /// 加载特征库，本地缺失时从远端下载一次后重试
    ///
    /// 只有 NotFound 触发下载，其他错误不重试。
    pub fn load_or_fetch(path: &Path, base_url: &str) -> Result<Self> {
        match Self::load(path) {
            Err(Error::NotFound(_)) => {
                fetch(path, base_url)?;
                Self::load(path)
            }
            other => other,
        }
    }
}

/// 从远端对象存储下载特征文件到 path
pub fn fetch(path: &Path, base_url: &str) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Format(path.display().to_string()))?;
    let url = format!("{}/{}", base_url.trim_end_matches('/'), filename);
    info!("feature file missing, fetching {}", url);

    let response = ureq::get(&url)
        .call()
        .map_err(|e| Error::Fetch { url: url.clone(), reason: e.to_string() })?;

    let tmp = path.with_extension("download");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(&tmp)?);
    let bytes = io::copy(&mut response.into_reader(), &mut writer)?;
    writer.flush()?;
    fs::rename(&tmp, path)?;
    debug!("fetched {} bytes to {}", bytes, path.display());

    Ok(())
}

/// 特征文件的 blake3 摘要，用作阈值缓存的键
pub fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(BufReader::new(File::open(path)?))?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// f32 -> IEEE-754 半精度位模式，向最近偶数舍入
pub fn f32_to_f16_bits(x: f32) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let man = bits & 0x007f_ffff;

    // Inf / NaN
    if exp == 0xff {
        let payload = if man != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | payload;
    }

    let unbiased = exp - 127;
    if unbiased >= 16 {
        // 上溢出为 Inf
        return sign | 0x7c00;
    }
    if unbiased >= -14 {
        // 规格化数
        let mut half_exp = (unbiased + 15) as u32;
        let mut half_man = man >> 13;
        let round = man & 0x1fff;
        if round > 0x1000 || (round == 0x1000 && half_man & 1 == 1) {
            half_man += 1;
            if half_man == 0x400 {
                half_man = 0;
                half_exp += 1;
                if half_exp >= 31 {
                    return sign | 0x7c00;
                }
            }
        }
        return sign | ((half_exp as u16) << 10) | half_man as u16;
    }
    if unbiased >= -25 {
        // 次规格化数，进位时位模式正好衔接到最小规格化数
        let man = man | 0x0080_0000;
        let shift = (13 - 14 - unbiased) as u32;
        let mut half_man = man >> shift;
        let rem = man & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        if rem > halfway || (rem == halfway && half_man & 1 == 1) {
            half_man += 1;
        }
        return sign | half_man as u16;
    }
    // 下溢出为 ±0
    sign
}

/// IEEE-754 半精度位模式 -> f32
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exp = (bits >> 10) & 0x1f;
    let man = (bits & 0x3ff) as u32;

    match (exp, man) {
        (0, 0) => f32::from_bits(sign),
        (0, _) => {
            // 次规格化：man * 2^-24
            let v = man as f32 * 2f32.powi(-24);
            if sign != 0 { -v } else { v }
        }
        (0x1f, 0) => {
            if sign != 0 { f32::NEG_INFINITY } else { f32::INFINITY }
        }
        (0x1f, _) => f32::NAN,
        _ => f32::from_bits(sign | ((exp as u32 + 112) << 23) | (man << 13)),
    }
}
