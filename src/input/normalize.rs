// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/input/normalize.rs - 图像解码与归一化
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

use std::io::Cursor;

use image::{DynamicImage, ImageReader, Limits, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{DIGIT_SIDE, DigitFrame, FrameError};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageError(image::ImageError),
  #[error("图像尺寸为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("帧构造错误: {0}")]
  FrameError(#[from] FrameError),
}

impl From<std::io::Error> for DecodeError {
  fn from(err: std::io::Error) -> Self {
    DecodeError::IoError(err)
  }
}

impl From<image::ImageError> for DecodeError {
  fn from(err: image::ImageError) -> Self {
    DecodeError::ImageError(err)
  }
}

/// 解码器资源限制
#[derive(Debug, Clone, Copy)]
pub struct NormalizerLimits {
  /// 允许的最大宽/高（像素）
  pub max_dimension: u32,
  /// 解码时允许分配的最大字节数
  pub max_alloc: u64,
}

impl Default for NormalizerLimits {
  fn default() -> Self {
    Self {
      max_dimension: 4096,
      max_alloc: 64 * 1024 * 1024,
    }
  }
}

/// 将任意图像字节归一化为 8x8 灰度帧
///
/// 顺序固定：解码 -> 缩放到 8x8 -> 转为亮度通道（L）。
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
  limits: NormalizerLimits,
}

impl ImageNormalizer {
  pub fn new(limits: NormalizerLimits) -> Self {
    Self { limits }
  }

  pub fn normalize(&self, bytes: &[u8]) -> Result<DigitFrame, DecodeError> {
    let image = self.decode(bytes)?;
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
      return Err(DecodeError::EmptyImage(width, height));
    }
    debug!("解码完成: {}x{} {:?}", width, height, image.color());

    let resized = image.resize_exact(DIGIT_SIDE, DIGIT_SIDE, FilterType::CatmullRom);
    let frame = to_luma_frame(&resized.to_rgb8())?;
    Ok(frame)
  }

  fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(self.limits.max_dimension);
    limits.max_image_height = Some(self.limits.max_dimension);
    limits.max_alloc = Some(self.limits.max_alloc);

    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(limits);
    Ok(reader.decode()?)
  }
}

/// ITU-R 601-2 亮度，与训练数据使用的 L 模式转换一致
fn luma(r: u8, g: u8, b: u8) -> u8 {
  let l = (r as u32) * 19595 + (g as u32) * 38470 + (b as u32) * 7471 + 0x8000;
  (l >> 16) as u8
}

fn to_luma_frame(image: &RgbImage) -> Result<DigitFrame, DecodeError> {
  let (width, height) = image.dimensions();
  let mut data = Vec::with_capacity((width * height) as usize);
  for h in 0..height {
    for w in 0..width {
      let pixel = image.get_pixel(w, h);
      data.push(luma(pixel[0], pixel[1], pixel[2]));
    }
  }
  Ok(DigitFrame::try_from(data)?)
}
