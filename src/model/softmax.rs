// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/model/softmax.rs - 多项逻辑回归分类器
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  feature::FeatureVector,
  model::{Model, NUM_CLASSES, Prediction, Probabilities, WithLabel},
};

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型加载错误 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("模型解析错误: {0}")]
  ParseError(serde_json::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
}

impl From<serde_json::Error> for ModelLoadError {
  fn from(err: serde_json::Error) -> Self {
    ModelLoadError::ParseError(err)
  }
}

impl ModelLoadError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    ModelLoadError::ModelInvalid(msg.into())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
  #[error("特征长度不匹配: 期望 {expected}, 实际 {actual}")]
  FeatureLength { expected: usize, actual: usize },
  #[error("模型输出溢出，logits 不是有限数")]
  NonFiniteLogits,
}

/// 特征标准化参数：`(x - mean) / scale`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
  pub mean: Vec<f64>,
  pub scale: Vec<f64>,
}

/// 持久化的模型文件格式（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelArtifact {
  feature_len: usize,
  #[serde(default)]
  scaler: Option<Scaler>,
  coefficients: Vec<Vec<f64>>,
  intercepts: Vec<f64>,
}

/// 已训练的多项逻辑回归模型，加载后只读
#[derive(Debug, Clone)]
pub struct SoftmaxModel {
  feature_len: usize,
  scaler: Option<Scaler>,
  coefficients: Vec<Vec<f64>>,
  intercepts: [f64; NUM_CLASSES],
}

fn check_finite(what: &str, values: &[f64]) -> Result<(), ModelLoadError> {
  match values.iter().position(|v| !v.is_finite()) {
    Some(i) => Err(ModelLoadError::invalid(format!("{} 第 {} 项不是有限数", what, i))),
    None => Ok(()),
  }
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<(), ModelLoadError> {
  if actual != expected {
    error!("{} 长度为 {}, 预期为 {}", what, actual, expected);
    return Err(ModelLoadError::invalid(format!(
      "{} 长度为 {}, 预期为 {}",
      what, actual, expected
    )));
  }
  Ok(())
}

impl SoftmaxModel {
  /// 由各参数构造并校验模型
  pub fn from_parts(
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    scaler: Option<Scaler>,
  ) -> Result<Self, ModelLoadError> {
    let feature_len = coefficients.first().map(Vec::len).unwrap_or(0);
    Self::from_artifact(ModelArtifact {
      feature_len,
      scaler,
      coefficients,
      intercepts,
    })
  }

  fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelLoadError> {
    let feature_len = artifact.feature_len;
    if feature_len == 0 {
      return Err(ModelLoadError::invalid("特征长度不能为 0"));
    }

    check_len("系数矩阵行数", artifact.coefficients.len(), NUM_CLASSES)?;
    check_len("截距", artifact.intercepts.len(), NUM_CLASSES)?;
    for (class, row) in artifact.coefficients.iter().enumerate() {
      check_len(&format!("类别 {} 的系数", class), row.len(), feature_len)?;
      check_finite(&format!("类别 {} 的系数", class), row)?;
    }
    check_finite("截距", &artifact.intercepts)?;

    if let Some(scaler) = &artifact.scaler {
      check_len("标准化均值", scaler.mean.len(), feature_len)?;
      check_len("标准化尺度", scaler.scale.len(), feature_len)?;
      check_finite("标准化均值", &scaler.mean)?;
      check_finite("标准化尺度", &scaler.scale)?;
      if let Some(i) = scaler.scale.iter().position(|s| *s == 0.0) {
        return Err(ModelLoadError::invalid(format!("标准化尺度第 {} 项为 0", i)));
      }
    }

    let mut intercepts = [0.0; NUM_CLASSES];
    intercepts.copy_from_slice(&artifact.intercepts);

    Ok(Self {
      feature_len,
      scaler: artifact.scaler,
      coefficients: artifact.coefficients,
      intercepts,
    })
  }

  pub fn feature_len(&self) -> usize {
    self.feature_len
  }

  /// 以模型文件格式序列化
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ModelArtifact {
      feature_len: self.feature_len,
      scaler: self.scaler.clone(),
      coefficients: self.coefficients.clone(),
      intercepts: self.intercepts.to_vec(),
    })
  }

  pub fn probabilities(&self, features: &FeatureVector) -> Result<Probabilities, ModelError> {
    if features.len() != self.feature_len {
      return Err(ModelError::FeatureLength {
        expected: self.feature_len,
        actual: features.len(),
      });
    }

    let scaled: Vec<f64> = match &self.scaler {
      Some(scaler) => features
        .as_slice()
        .iter()
        .zip(scaler.mean.iter().zip(&scaler.scale))
        .map(|(x, (m, s))| (x - m) / s)
        .collect(),
      None => features.as_slice().to_vec(),
    };

    let mut logits = self.intercepts;
    for (logit, row) in logits.iter_mut().zip(&self.coefficients) {
      *logit += row.iter().zip(&scaled).map(|(w, x)| w * x).sum::<f64>();
    }

    Probabilities::from_logits(logits).ok_or(ModelError::NonFiniteLogits)
  }
}

impl Model for SoftmaxModel {
  type Input = FeatureVector;
  type Output = Prediction;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let prediction = self.probabilities(input)?.top();
    debug!(
      "推理结果: 数字 {} ({:.4})",
      prediction.digit.to_label_str(),
      prediction.confidence
    );
    Ok(prediction)
  }
}

/// 从模型文件构建 [`SoftmaxModel`]
pub struct SoftmaxModelBuilder {
  model_path: PathBuf,
}

impl SoftmaxModelBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
    }
  }

  pub fn build(self) -> Result<SoftmaxModel, ModelLoadError> {
    info!("加载模型文件: {}", self.model_path.display());
    let data = std::fs::read(&self.model_path)
      .map_err(|e| ModelLoadError::IoError(self.model_path.clone(), e))?;
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);

    let artifact: ModelArtifact = serde_json::from_slice(&data)?;
    let model = SoftmaxModel::from_artifact(artifact)?;
    info!(
      "模型加载完成: {} 个类别, 特征长度 {}, 标准化: {}",
      NUM_CLASSES,
      model.feature_len,
      model.scaler.is_some()
    );
    Ok(model)
  }
}
