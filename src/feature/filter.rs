// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/feature/filter.rs - 强度拉伸与高斯平滑
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

use ndarray::{Array2, Axis};

/// 高斯核截断倍数
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// 将图像线性拉伸到 [0, 1]
///
/// 返回 `false` 表示图像动态范围为零，此时图像被置为全零。
pub fn stretch_to_unit(image: &mut Array2<f64>) -> bool {
  let (min, max) = image
    .iter()
    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
      (lo.min(v), hi.max(v))
    });

  let range = max - min;
  if !(range > 0.0) {
    image.fill(0.0);
    return false;
  }

  image.mapv_inplace(|v| ((v - min) / range).clamp(0.0, 1.0));
  true
}

/// 一维高斯核，半径为 `⌊truncate·σ + 0.5⌋`，权重归一化
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
  let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as i64;
  let denom = 2.0 * sigma * sigma;
  let weights: Vec<f64> = (-radius..=radius)
    .map(|x| (-((x * x) as f64) / denom).exp())
    .collect();
  let sum: f64 = weights.iter().sum();
  weights.into_iter().map(|w| w / sum).collect()
}

/// 可分离高斯平滑，边界按最近像素复制
pub fn gaussian_blur(image: &Array2<f64>, sigma: f64) -> Array2<f64> {
  let kernel = gaussian_kernel(sigma);
  let rows = correlate_axis(image, &kernel, Axis(0));
  correlate_axis(&rows, &kernel, Axis(1))
}

fn correlate_axis(image: &Array2<f64>, kernel: &[f64], axis: Axis) -> Array2<f64> {
  let radius = (kernel.len() / 2) as isize;
  let len = image.len_of(axis) as isize;
  let mut out = Array2::<f64>::zeros(image.raw_dim());

  for ((r, c), value) in out.indexed_iter_mut() {
    let center = if axis == Axis(0) { r as isize } else { c as isize };
    *value = kernel
      .iter()
      .enumerate()
      .map(|(k, w)| {
        let i = (center + k as isize - radius).clamp(0, len - 1) as usize;
        let sample = if axis == Axis(0) { image[[i, c]] } else { image[[r, i]] };
        w * sample
      })
      .sum();
  }
  out
}
