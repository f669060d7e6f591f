use log::debug;
use ndarray::prelude::*;

use crate::error::{Error, Result};
use crate::model::EmbeddingModel;

/// 把裁剪图按 batch_size 切成有限个预处理批次的迭代器
///
/// 恰好产出 `ceil(N / batch_size)` 个 (B, H, W, C) 批次后结束，
/// 消费端不需要额外的步数契约来终止。预处理逐元素应用。
///
/// 所有裁剪图必须已经是同一形状（先经过 [`pad_to_shape`]）。
pub struct BatchIter<'a, M: EmbeddingModel + ?Sized> {
    model: &'a M,
    crops: &'a [Array3<f32>],
    batch_size: usize,
    pos: usize,
}

impl<'a, M: EmbeddingModel + ?Sized> BatchIter<'a, M> {
    pub fn new(model: &'a M, crops: &'a [Array3<f32>], batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        if let Some(first) = crops.first() {
            for crop in crops {
                assert_eq!(crop.dim(), first.dim(), "crops must share one shape");
            }
        }
        Self { model, crops, batch_size, pos: 0 }
    }
}

impl<'a, M: EmbeddingModel + ?Sized> Iterator for BatchIter<'a, M> {
    type Item = Array4<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.crops.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.crops.len());
        let chunk = &self.crops[self.pos..end];
        self.pos = end;

        let (h, w, c) = chunk[0].dim();
        let mut batch = Array4::zeros((chunk.len(), h, w, c));
        for (i, crop) in chunk.iter().enumerate() {
            batch.slice_mut(s![i, .., .., ..]).assign(&self.model.preprocess(crop));
        }
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.crops.len() - self.pos).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

impl<'a, M: EmbeddingModel + ?Sized> ExactSizeIterator for BatchIter<'a, M> {}

/// 批量提取特征，返回 (N, F) 矩阵，行序与输入一致
///
/// 内存峰值只与 batch_size 成正比，不会一次性持有整个 N×H×W×C 张量。
/// 每张图的空间输出被展平成一行（各维相乘），空输入直接返回 (0, F) 而不调用模型。
pub fn extract_features<M: EmbeddingModel + ?Sized>(
    model: &M,
    crops: &[Array3<f32>],
    batch_size: usize,
) -> Result<Array2<f32>> {
    let dim = model.output_dim();
    if crops.is_empty() {
        return Ok(Array2::zeros((0, dim)));
    }

    let mut features = Array2::zeros((crops.len(), dim));
    let mut row = 0;
    for batch in BatchIter::new(model, crops, batch_size) {
        let rows = batch.dim().0;
        let out = model.forward(batch.view())?;
        let flat: usize = out.shape()[1..].iter().product();
        if out.shape()[0] != rows || flat != dim {
            return Err(Error::DimensionMismatch { query: flat, database: dim });
        }
        // 模型输出不保证内存布局，先转为标准布局再展平
        let out = out.as_standard_layout().into_owned();
        let out = out
            .into_shape_with_order((rows, flat))
            .map_err(|e| Error::Corrupt(e.to_string()))?;
        features.slice_mut(s![row..row + rows, ..]).assign(&out);
        row += rows;
    }
    debug!("extracted {} features of dim {}", row, dim);

    Ok(features)
}

/// 等比缩放并居中填充到目标大小，空余像素用原图均值填充
///
/// 对应参考图和候选框在送入网络前的统一尺寸处理。
pub fn pad_to_shape(img: ArrayView3<'_, f32>, shape: (usize, usize)) -> Array3<f32> {
    let (ih, iw, c) = img.dim();
    let (h, w) = shape;

    // 先等比缩放，让较长的一边贴合目标
    let scale = (w as f32 / iw as f32).min(h as f32 / ih as f32);
    let nw = ((iw as f32 * scale) as usize).clamp(1, w);
    let nh = ((ih as f32 * scale) as usize).clamp(1, h);
    let resized = resize_bilinear(img, nh, nw);

    let mean = img.mean().unwrap_or(0.0);
    let mut out = Array3::from_elem((h, w, c), mean);
    let (y0, x0) = ((h - nh) / 2, (w - nw) / 2);
    out.slice_mut(s![y0..y0 + nh, x0..x0 + nw, ..]).assign(&resized);
    out
}

/// 双线性插值缩放
fn resize_bilinear(img: ArrayView3<'_, f32>, nh: usize, nw: usize) -> Array3<f32> {
    let (ih, iw, c) = img.dim();
    let mut out = Array3::zeros((nh, nw, c));
    let sy = ih as f32 / nh as f32;
    let sx = iw as f32 / nw as f32;

    for y in 0..nh {
        let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        let y0 = (fy as usize).min(ih - 1);
        let y1 = (y0 + 1).min(ih - 1);
        let wy = fy - y0 as f32;
        for x in 0..nw {
            let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let x0 = (fx as usize).min(iw - 1);
            let x1 = (x0 + 1).min(iw - 1);
            let wx = fx - x0 as f32;
            for k in 0..c {
                let top = img[[y0, x0, k]] * (1.0 - wx) + img[[y0, x1, k]] * wx;
                let bottom = img[[y1, x0, k]] * (1.0 - wx) + img[[y1, x1, k]] * wx;
                out[[y, x, k]] = top * (1.0 - wy) + bottom * wy;
            }
        }
    }
    out
}
