// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/frame.rs - 灰度帧定义
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

use thiserror::Error;

const GRAY_CHANNELS: usize = 1;

/// 模型训练时使用的输入边长
pub const DIGIT_SIDE: u32 = 8;

/// 归一化后的数字图像：8x8 单通道灰度
pub type DigitFrame = GrayFrame<DIGIT_SIDE, DIGIT_SIDE>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 固定尺寸的单通道灰度帧，按行优先存储
///
/// 尺寸由类型参数决定，构造时校验数据长度，之后各阶段无需再检查形状。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for GrayFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    let expected = Self::len();
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for GrayFrame<W, H> {
  fn default() -> Self {
    let data = vec![0u8; Self::len()].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> GrayFrame<W, H> {
  const fn len() -> usize {
    GRAY_CHANNELS * (W as usize) * (H as usize)
  }

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    GRAY_CHANNELS
  }

  /// 读取 (x, y) 处像素，越界时 panic
  pub fn pixel(&self, x: usize, y: usize) -> u8 {
    assert!(x < W as usize && y < H as usize, "像素坐标越界: ({x}, {y})");
    self.data[y * (W as usize) + x]
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.data
  }
}
