// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::io::{Cursor, Write};

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use shanan_digits::{
  feature::FeatureExtractor,
  input::ImageNormalizer,
  model::{NUM_CLASSES, SoftmaxModel},
  pipeline::Pipeline,
};

pub const BOUNDARY: &str = "digits-test-boundary";

/// 手绘的 8x8 数字字形，`#` 为笔画
pub const GLYPHS: [[&str; 8]; NUM_CLASSES] = [
  [
    "..####..", ".#....#.", ".#....#.", ".#....#.", ".#....#.", ".#....#.", ".#....#.", "..####..",
  ],
  [
    "...##...", "..###...", "...##...", "...##...", "...##...", "...##...", "...##...", "..####..",
  ],
  [
    "..####..", ".#....#.", "......#.", ".....#..", "....#...", "...#....", "..#.....", ".######.",
  ],
  [
    "..####..", ".#....#.", "......#.", "...###..", "......#.", "......#.", ".#....#.", "..####..",
  ],
  [
    "....##..", "...#.#..", "..#..#..", ".#...#..", ".######.", ".....#..", ".....#..", ".....#..",
  ],
  [
    ".######.", ".#......", ".#......", ".#####..", "......#.", "......#.", ".#....#.", "..####..",
  ],
  [
    "..####..", ".#......", ".#......", ".#####..", ".#....#.", ".#....#.", ".#....#.", "..####..",
  ],
  [
    ".######.", "......#.", ".....#..", ".....#..", "....#...", "....#...", "...#....", "...#....",
  ],
  [
    "..####..", ".#....#.", ".#....#.", "..####..", ".#....#.", ".#....#.", ".#....#.", "..####..",
  ],
  [
    "..####..", ".#....#.", ".#....#.", "..#####.", "......#.", "......#.", ".....#..", "..###...",
  ],
];

pub fn glyph_image(digit: usize) -> GrayImage {
  let rows = GLYPHS[digit];
  GrayImage::from_fn(8, 8, |x, y| {
    let stroke = rows[y as usize].as_bytes()[x as usize] == b'#';
    Luma([if stroke { 255 } else { 0 }])
  })
}

pub fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, format).expect("编码测试图像失败");
  buffer.into_inner()
}

pub fn glyph_png(digit: usize) -> Vec<u8> {
  encode(DynamicImage::ImageLuma8(glyph_image(digit)), ImageFormat::Png)
}

/// 以各字形特征为原型的最近邻 softmax 模型
///
/// 权重 `k * f_c`，截距 `-k / 2 * |f_c|^2`，于是 logit 之差等于平方距离之差乘以 `k / 2`。
/// `k` 取值使任一字形自身的置信度不低于 0.9。
pub fn prototype_model() -> SoftmaxModel {
  let normalizer = ImageNormalizer::default();
  let extractor = FeatureExtractor::default();
  let prototypes: Vec<Vec<f64>> = (0..NUM_CLASSES)
    .map(|digit| {
      let frame = normalizer.normalize(&glyph_png(digit)).expect("字形解码失败");
      extractor
        .extract(&frame)
        .expect("字形特征提取失败")
        .as_slice()
        .to_vec()
    })
    .collect();

  let mut min_dist = f64::INFINITY;
  for (i, a) in prototypes.iter().enumerate() {
    for b in &prototypes[i + 1..] {
      let d: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
      min_dist = min_dist.min(d);
    }
  }
  assert!(min_dist > 0.0, "字形特征出现重复");
  let k = 2.0 * 99f64.ln() / min_dist;

  let coefficients = prototypes
    .iter()
    .map(|p| p.iter().map(|v| k * v).collect())
    .collect();
  let intercepts = prototypes
    .iter()
    .map(|p| -k / 2.0 * p.iter().map(|v| v * v).sum::<f64>())
    .collect();
  SoftmaxModel::from_parts(coefficients, intercepts, None).expect("构造原型模型失败")
}

pub fn prototype_pipeline() -> Pipeline {
  Pipeline::new(
    ImageNormalizer::default(),
    FeatureExtractor::default(),
    prototype_model(),
  )
  .expect("构造推理流程失败")
}

#[cfg(feature = "archive_upload")]
pub fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
  use zip::{ZipWriter, write::SimpleFileOptions};

  let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
  for (name, data) in entries {
    writer
      .start_file(*name, SimpleFileOptions::default())
      .expect("写入压缩包条目失败");
    writer.write_all(data).expect("写入压缩包数据失败");
  }
  writer.finish().expect("完成压缩包失败").into_inner()
}

/// 一个 multipart/form-data 文件字段
pub struct Part<'a> {
  pub field: &'a str,
  pub filename: &'a str,
  pub content_type: &'a str,
  pub data: Vec<u8>,
}

impl<'a> Part<'a> {
  pub fn file(field: &'a str, filename: &'a str, data: Vec<u8>) -> Self {
    Self {
      field,
      filename,
      content_type: "application/octet-stream",
      data,
    }
  }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
  let mut body = Vec::new();
  for part in parts {
    write!(
      body,
      "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
      BOUNDARY, part.field, part.filename, part.content_type
    )
    .expect("写入表单头失败");
    body.extend_from_slice(&part.data);
    body.extend_from_slice(b"\r\n");
  }
  write!(body, "--{}--\r\n", BOUNDARY).expect("写入表单尾失败");
  body
}
