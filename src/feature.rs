// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/feature.rs - 特征提取
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use ndarray::Array2;
use thiserror::Error;
use tracing::debug;

use crate::frame::{DIGIT_SIDE, DigitFrame};

mod filter;
mod hog;
pub use self::hog::{HogLayout, HogParams};

/// 平滑所用高斯核的标准差
pub const SMOOTHING_SIGMA: f64 = 0.5;

#[derive(Error, Debug, PartialEq)]
pub enum FeatureError {
  #[error("图像没有对比度（所有像素相同）")]
  FlatImage,
  #[error("特征向量第 {0} 项不是有限数")]
  NonFinite(usize),
  #[error("HOG 参数无效: {0}")]
  InvalidParams(String),
}

/// 动态范围为零的图像如何处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FlatImagePolicy {
  /// 输出全零描述子
  #[default]
  Zero,
  /// 返回 [`FeatureError::FlatImage`]
  Reject,
}

/// 定长 HOG 描述子
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Box<[f64]>);

impl FeatureVector {
  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn as_slice(&self) -> &[f64] {
    &self.0
  }
}

impl From<Vec<f64>> for FeatureVector {
  fn from(values: Vec<f64>) -> Self {
    Self(values.into_boxed_slice())
  }
}

/// 数字图像特征提取器
///
/// 处理顺序与训练时一致，不可调整：
/// 1. 像素转为 [0, 1] 浮点
/// 2. 按自身最小/最大值拉伸到 [0, 1]
/// 3. 高斯平滑（σ = 0.5）
/// 4. 再次拉伸对比度到 [0, 1]
/// 5. HOG（9 方向，4x4 像素单元，2x2 单元块，L2-Hys）
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
  params: HogParams,
  flat_policy: FlatImagePolicy,
  descriptor_len: usize,
}

impl FeatureExtractor {
  pub fn new(params: HogParams, flat_policy: FlatImagePolicy) -> Result<Self, FeatureError> {
    let side = DIGIT_SIDE as usize;
    let descriptor_len = params.descriptor_len(side, side)?;
    Ok(Self {
      params,
      flat_policy,
      descriptor_len,
    })
  }

  pub fn with_policy(flat_policy: FlatImagePolicy) -> Self {
    Self::new(HogParams::default(), flat_policy).expect("默认 HOG 参数适用于 8x8 输入")
  }

  /// 描述子长度，由输入尺寸和 HOG 参数唯一确定
  pub fn descriptor_len(&self) -> usize {
    self.descriptor_len
  }

  pub fn extract(&self, frame: &DigitFrame) -> Result<FeatureVector, FeatureError> {
    let mut image = Array2::from_shape_fn((frame.height(), frame.width()), |(r, c)| {
      frame.pixel(c, r) as f64 / u8::MAX as f64
    });

    if !filter::stretch_to_unit(&mut image) {
      debug!("图像动态范围为零，策略: {:?}", self.flat_policy);
      if self.flat_policy == FlatImagePolicy::Reject {
        return Err(FeatureError::FlatImage);
      }
    }

    let mut smoothed = filter::gaussian_blur(&image, SMOOTHING_SIGMA);
    filter::stretch_to_unit(&mut smoothed);

    let descriptor = hog::hog(&smoothed, &self.params)?;
    if let Some(index) = descriptor.iter().position(|v| !v.is_finite()) {
      return Err(FeatureError::NonFinite(index));
    }

    Ok(FeatureVector::from(descriptor))
  }
}

impl Default for FeatureExtractor {
  fn default() -> Self {
    Self::with_policy(FlatImagePolicy::default())
  }
}
