// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/pipeline.rs - 单张图像推理流程
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

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  feature::{FeatureError, FeatureExtractor},
  input::{DecodeError, ImageNormalizer},
  model::{Digit, Model, ModelError, SoftmaxModel},
};

/// 单个条目在流程中失败的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStage {
  /// 从压缩包读取条目
  Read,
  /// 解码并归一化为 8x8 灰度
  Decode,
  /// 特征提取
  Extract,
  /// 分类
  Classify,
}

impl std::fmt::Display for ItemStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let stage = match self {
      ItemStage::Read => "read",
      ItemStage::Decode => "decode",
      ItemStage::Extract => "extract",
      ItemStage::Classify => "classify",
    };
    f.write_str(stage)
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("特征提取失败: {0}")]
  Feature(#[from] FeatureError),
  #[error("分类失败: {0}")]
  Model(#[from] ModelError),
}

impl PipelineError {
  pub fn stage(&self) -> ItemStage {
    match self {
      PipelineError::Decode(_) => ItemStage::Decode,
      PipelineError::Feature(_) => ItemStage::Extract,
      PipelineError::Model(_) => ItemStage::Classify,
    }
  }
}

#[derive(Error, Debug)]
pub enum PipelineBuildError {
  #[error("模型特征长度 {model} 与特征提取器输出长度 {extractor} 不一致")]
  FeatureLengthMismatch { model: usize, extractor: usize },
}

/// 单个条目的推理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
  pub filename: String,
  pub digit: Digit,
  pub confidence: f64,
}

/// 归一化 -> 特征提取 -> 分类
///
/// 构造后只读，可在多个线程间共享。
#[derive(Debug, Clone)]
pub struct Pipeline {
  normalizer: ImageNormalizer,
  extractor: FeatureExtractor,
  model: SoftmaxModel,
}

impl Pipeline {
  pub fn new(
    normalizer: ImageNormalizer,
    extractor: FeatureExtractor,
    model: SoftmaxModel,
  ) -> Result<Self, PipelineBuildError> {
    if model.feature_len() != extractor.descriptor_len() {
      return Err(PipelineBuildError::FeatureLengthMismatch {
        model: model.feature_len(),
        extractor: extractor.descriptor_len(),
      });
    }

    Ok(Self {
      normalizer,
      extractor,
      model,
    })
  }

  pub fn predict(&self, name: &str, bytes: &[u8]) -> Result<PredictionResult, PipelineError> {
    let frame = self.normalizer.normalize(bytes)?;
    let features = self.extractor.extract(&frame)?;
    let prediction = self.model.infer(&features)?;
    debug!(
      "{}: 数字 {} 置信度 {:.4}",
      name,
      prediction.digit.id(),
      prediction.confidence
    );

    Ok(PredictionResult {
      filename: name.to_string(),
      digit: prediction.digit,
      confidence: prediction.confidence,
    })
  }
}
