use log::debug;
use ndarray::prelude::*;

use crate::error::{Error, Result};

/// 小于图像面积这一比例的框被拒绝（0.1%）
pub const MIN_AREA_RATIO: f32 = 0.001;

/// 上游检测器给出的检测框，像素坐标
///
/// 检测器每轮产出后即被消费，不持久化。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    /// 检测置信度，[0, 1]
    pub score: f32,
}

impl BoundingBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, score: f32) -> Self {
        Self { xmin, ymin, xmax, ymax, score }
    }

    /// 从检测器的 4 或 5 字段行构造，缺失的置信度按 1.0 处理
    pub fn from_row(row: &[f32]) -> Result<Self> {
        match *row {
            [xmin, ymin, xmax, ymax] => Ok(Self::new(xmin, ymin, xmax, ymax, 1.0)),
            [xmin, ymin, xmax, ymax, score] => Ok(Self::new(xmin, ymin, xmax, ymax, score)),
            _ => Err(Error::Box(format!("expected 4 or 5 fields, got {}", row.len()))),
        }
    }

    /// 像素面积
    pub fn area(&self) -> f32 {
        (self.xmax - self.xmin) * (self.ymax - self.ymin)
    }

    /// 裁剪出框对应的图像区域
    ///
    /// 坐标先收缩到图像边界内，收缩后面积为零或坐标非法时返回错误。
    pub fn crop(&self, image: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let (h, w, _) = image.dim();
        for v in [self.xmin, self.ymin, self.xmax, self.ymax] {
            if !v.is_finite() {
                return Err(Error::Box(format!("non-finite coordinate in {:?}", self)));
            }
        }

        let x0 = (self.xmin as i64).clamp(0, w as i64) as usize;
        let x1 = (self.xmax as i64).clamp(0, w as i64) as usize;
        let y0 = (self.ymin as i64).clamp(0, h as i64) as usize;
        let y1 = (self.ymax as i64).clamp(0, h as i64) as usize;
        if x0 >= x1 || y0 >= y1 {
            return Err(Error::Box(format!("empty crop after clamping: {:?}", self)));
        }

        Ok(image.slice(s![y0..y1, x0..x1, ..]).to_owned())
    }
}

/// 候选过滤的结果
///
/// `accepted[i]` 是 `crops[i]` 在原始框序列里的下标，调用方据此把
/// 匹配结果拼回检测器的输出顺序。
#[derive(Debug, Default)]
pub struct Candidates {
    pub crops: Vec<Array3<f32>>,
    pub accepted: Vec<usize>,
    pub rejected: Vec<usize>,
}

/// 过滤检测框并裁剪出有效候选
///
/// 面积不足图像 0.1% 或裁剪失败的框进入 rejected，逐框兜底，
/// 单个坏框不会中断其余框的处理。
pub fn filter_candidates(image: ArrayView3<'_, f32>, boxes: &[BoundingBox]) -> Candidates {
    let (h, w, _) = image.dim();
    let image_area = (h * w) as f32;
    let mut out = Candidates::default();

    for (i, bbox) in boxes.iter().enumerate() {
        if !(bbox.area() >= MIN_AREA_RATIO * image_area) {
            out.rejected.push(i);
            continue;
        }
        match bbox.crop(image) {
            Ok(crop) => {
                out.crops.push(crop);
                out.accepted.push(i);
            }
            Err(e) => {
                debug!("rejecting box {}: {}", i, e);
                out.rejected.push(i);
            }
        }
    }
    out
}
