use std::fmt;
use std::path::Path;

use ndarray::prelude::*;

use crate::error::{Error, Result};

/// VGG16 各变体的输入边长，下标即变体编号
pub const VGG16_INPUT_LENGTHS: [usize; 3] = [224, 128, 64];

/// 特征提取网络的家族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    InceptionV3,
    Vgg16,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::InceptionV3 => write!(f, "InceptionV3"),
            ModelKind::Vgg16 => write!(f, "VGG16"),
        }
    }
}

/// 模型身份 = 家族 + 变体
///
/// InceptionV3 变体 1..=3 表示截断最后 1..=3 个 Inception 块，0 为 299px 默认输入，
/// 1..=4 均为 200px 输入；VGG16 变体只改变输入边长（224/128/64）。
/// 整条流水线里所有互相比较的向量都必须出自同一个身份。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelIdentity {
    pub kind: ModelKind,
    pub flavor: usize,
}

impl ModelIdentity {
    pub fn new(kind: ModelKind, flavor: usize) -> Result<Self> {
        let max = match kind {
            ModelKind::InceptionV3 => 4,
            ModelKind::Vgg16 => 2,
        };
        if flavor > max {
            return Err(Error::Format(format!("{} has no flavor {}", kind, flavor)));
        }
        Ok(Self { kind, flavor })
    }

    /// 从特征文件的文件名（不含扩展名）恢复模型身份
    ///
    /// 命名约定是对外契约的一部分：无法识别的文件名是用户可见的错误，
    /// 绝不回退到某个默认模型。
    pub fn from_file_stem(stem: &str) -> Result<Self> {
        if stem.starts_with("inception") {
            let flavor = match stem {
                "inception_logo_features" => 0,
                "inception_logo_features_200_trunc1" => 1,
                "inception_logo_features_200_trunc2" => 2,
                "inception_logo_features_200_trunc3" => 3,
                "inception_logo_features_200" => 4,
                _ => return Err(Error::Format(stem.to_owned())),
            };
            Self::new(ModelKind::InceptionV3, flavor)
        } else if stem.starts_with("vgg16") {
            // vgg16_logo_features_NNN，NNN 为输入边长
            let length = stem
                .rsplit('_')
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| Error::Format(stem.to_owned()))?;
            let flavor = VGG16_INPUT_LENGTHS
                .iter()
                .position(|&l| l == length)
                .ok_or_else(|| Error::Format(stem.to_owned()))?;
            Self::new(ModelKind::Vgg16, flavor)
        } else {
            Err(Error::Format(stem.to_owned()))
        }
    }

    /// 从特征文件路径恢复模型身份，扩展名不参与解析
    pub fn from_path(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Format(path.display().to_string()))?;
        Self::from_file_stem(stem)
    }

    /// 身份对应的特征文件名（不含扩展名），与 [`from_file_stem`] 互逆
    ///
    /// [`from_file_stem`]: ModelIdentity::from_file_stem
    pub fn file_stem(&self) -> String {
        match (self.kind, self.flavor) {
            (ModelKind::InceptionV3, 0) => "inception_logo_features".to_owned(),
            (ModelKind::InceptionV3, 4) => "inception_logo_features_200".to_owned(),
            (ModelKind::InceptionV3, n) => format!("inception_logo_features_200_trunc{}", n),
            (ModelKind::Vgg16, n) => {
                format!("vgg16_logo_features_{}", VGG16_INPUT_LENGTHS[n])
            }
        }
    }

    /// 该身份要求的输入形状 (H, W, C)
    pub fn input_shape(&self) -> (usize, usize, usize) {
        match self.kind {
            ModelKind::InceptionV3 if self.flavor == 0 => (299, 299, 3),
            ModelKind::InceptionV3 => (200, 200, 3),
            ModelKind::Vgg16 => {
                let l = VGG16_INPUT_LENGTHS[self.flavor];
                (l, l, 3)
            }
        }
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} flavor {}", self.kind, self.flavor)
    }
}

/// 截断分类网络的抽象：图像批 -> 定长特征向量批
///
/// 网络本身是外部能力，这里只约定推理接口，任何固定输出维数的后端都可以接入。
/// `forward` 不做缩放，输入必须已经符合 `input_shape` 声明的形状。
pub trait EmbeddingModel {
    /// 模型身份，加载时固定，参与下游一致性校验
    fn identity(&self) -> ModelIdentity;

    /// 要求的输入形状 (H, W, C)
    fn input_shape(&self) -> (usize, usize, usize) {
        self.identity().input_shape()
    }

    /// 展平后的特征向量维数 F
    fn output_dim(&self) -> usize;

    /// 逐像素预处理，逐元素应用，不改变形状
    fn preprocess(&self, image: &Array3<f32>) -> Array3<f32> {
        preprocess_pixels(self.identity().kind, image)
    }

    /// 批量前向传播，(B, H, W, C) -> (B, ...)
    ///
    /// 输出第一维必须等于 B，空间维度由调用方展平。
    /// 形状或通道数不符时返回错误。
    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>>;
}

/// 各家族的像素预处理（Keras preprocess_input 语义）
///
/// InceptionV3 缩放到 [-1, 1]；VGG16 翻转 RGB 为 BGR 并减去 ImageNet 通道均值。
pub fn preprocess_pixels(kind: ModelKind, image: &Array3<f32>) -> Array3<f32> {
    match kind {
        ModelKind::InceptionV3 => image.mapv(|x| x / 127.5 - 1.0),
        ModelKind::Vgg16 => {
            assert_eq!(image.dim().2, 3, "VGG16 preprocessing expects 3 channels");
            let mean = [103.939, 116.779, 123.68];
            let mut out = image.slice(s![.., .., ..;-1]).to_owned();
            for (c, m) in mean.iter().enumerate() {
                out.slice_mut(s![.., .., c]).mapv_inplace(|x| x - m);
            }
            out
        }
    }
}
