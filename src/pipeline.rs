use log::debug;
use ndarray::prelude::*;

use crate::bbox::{BoundingBox, filter_candidates};
use crate::cutoff::{SimilarityCutoffs, calibrate};
use crate::db::ReferenceDatabase;
use crate::error::{Error, Result};
use crate::extract::{extract_features, pad_to_shape};
use crate::matcher::{Match, match_batch};
use crate::model::EmbeddingModel;

/// 检测周期内的匹配上下文：特征库 + 标定阈值
///
/// 显式传递的不可变对象，不藏在全局状态里，构造后可被并发读取；
/// 测试可以各自构造隔离的上下文而互不影响。
pub struct MatchContext {
    db: ReferenceDatabase,
    cutoffs: SimilarityCutoffs,
}

/// 一张图的识别结果
#[derive(Debug)]
pub struct Identification {
    /// 逐候选的匹配结果，candidate_index 为原始框下标
    pub matches: Vec<Match>,
    /// 被候选过滤拒绝的框下标
    pub rejected: Vec<usize>,
    /// 与 matches 平行的检测置信度
    pub scores: Vec<f32>,
}

impl Identification {
    /// 命中品牌到相似度的汇总，供下游报表使用；同一品牌取最高相似度
    pub fn brand_scores(&self) -> Vec<(String, f32)> {
        let mut out: Vec<(String, f32)> = vec![];
        for m in self.matches.iter().filter(|m| m.accepted) {
            let brand = m.brand.clone().unwrap_or_default();
            match out.iter_mut().find(|(b, _)| b == &brand) {
                Some((_, s)) => *s = s.max(m.similarity),
                None => out.push((brand, m.similarity)),
            }
        }
        out
    }
}

impl MatchContext {
    pub fn new(db: ReferenceDatabase, cutoffs: SimilarityCutoffs) -> Self {
        Self { db, cutoffs }
    }

    /// 加载即标定：常用的一步构造
    pub fn calibrated(db: ReferenceDatabase, bins: usize, cdf_thresh: f32) -> Self {
        let cutoffs = calibrate(&db, bins, cdf_thresh);
        Self { db, cutoffs }
    }

    pub fn db(&self) -> &ReferenceDatabase {
        &self.db
    }

    pub fn cutoffs(&self) -> &SimilarityCutoffs {
        &self.cutoffs
    }

    /// 对一张图的检测框做完整识别：过滤 -> 统一尺寸 -> 批量提特征 -> 匹配
    ///
    /// 失败只影响当前这张图，多图批处理的重试策略由调用方决定。
    pub fn identify<M: EmbeddingModel + ?Sized>(
        &self,
        model: &M,
        image: ArrayView3<'_, f32>,
        boxes: &[BoundingBox],
        batch_size: usize,
    ) -> Result<Identification> {
        // 模型与特征库必须出自同一身份，混用直接拒绝
        if model.identity() != self.db.identity() {
            return Err(Error::Format(format!(
                "model is {} but database was built with {}",
                model.identity(),
                self.db.identity()
            )));
        }

        let candidates = filter_candidates(image, boxes);
        debug!(
            "{} of {} boxes survived filtering",
            candidates.accepted.len(),
            boxes.len()
        );

        let (h, w, _) = model.input_shape();
        let padded: Vec<Array3<f32>> =
            candidates.crops.iter().map(|c| pad_to_shape(c.view(), (h, w))).collect();
        let features = extract_features(model, &padded, batch_size)?;

        let mut matches = match_batch(features.view(), &self.db, &self.cutoffs)?;
        for (m, &original) in matches.iter_mut().zip(&candidates.accepted) {
            m.candidate_index = original;
        }
        let scores = candidates.accepted.iter().map(|&i| boxes[i].score).collect();

        Ok(Identification { matches, rejected: candidates.rejected, scores })
    }
}
