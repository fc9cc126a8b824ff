// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/model.rs - 模型
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

/// 类别数量：数字 0-9
pub const NUM_CLASSES: usize = 10;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Digit {
  Zero,
  One,
  Two,
  Three,
  Four,
  Five,
  Six,
  Seven,
  Eight,
  Nine,
}

impl Digit {
  pub const ALL: [Digit; NUM_CLASSES] = [
    Digit::Zero,
    Digit::One,
    Digit::Two,
    Digit::Three,
    Digit::Four,
    Digit::Five,
    Digit::Six,
    Digit::Seven,
    Digit::Eight,
    Digit::Nine,
  ];

  pub fn id(&self) -> u8 {
    *self as u8
  }
}

impl WithLabel for Digit {
  fn to_label_str(&self) -> String {
    self.id().to_string()
  }
}

impl serde::Serialize for Digit {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(self.id())
  }
}

/// 10 个类别上的概率分布
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities([f64; NUM_CLASSES]);

impl Probabilities {
  /// 对 logits 做数值稳定的 softmax，任一 logit 非有限数时返回 `None`
  pub fn from_logits(logits: [f64; NUM_CLASSES]) -> Option<Self> {
    if !logits.iter().all(|l| l.is_finite()) {
      return None;
    }
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut values = logits.map(|l| (l - max).exp());
    let sum: f64 = values.iter().sum();
    values.iter_mut().for_each(|v| *v /= sum);
    Some(Self(values))
  }

  pub fn as_slice(&self) -> &[f64] {
    &self.0
  }

  /// 最大概率的类别及其概率，并列时取编号最小者
  pub fn top(&self) -> Prediction {
    let (index, confidence) = self
      .0
      .iter()
      .copied()
      .enumerate()
      .fold((0, f64::NEG_INFINITY), |best, (i, p)| {
        if p > best.1 { (i, p) } else { best }
      });

    Prediction {
      digit: Digit::ALL[index],
      confidence,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
  pub digit: Digit,
  pub confidence: f64,
}

mod softmax;
pub use self::softmax::{ModelError, ModelLoadError, Scaler, SoftmaxModel, SoftmaxModelBuilder};
