// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/feature/hog.rs - 方向梯度直方图（HOG）
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

use ndarray::{Array2, Array3, s};

use super::FeatureError;

const L2HYS_EPS: f64 = 1e-5;
const L2HYS_CLIP: f64 = 0.2;
const HALF_TURN_DEGREES: f64 = 180.0;

/// HOG 参数，改动任意一项都意味着需要重新训练模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HogParams {
  pub orientations: usize,
  /// (行, 列)
  pub pixels_per_cell: (usize, usize),
  /// (行, 列)
  pub cells_per_block: (usize, usize),
}

impl Default for HogParams {
  fn default() -> Self {
    Self {
      orientations: 9,
      pixels_per_cell: (4, 4),
      cells_per_block: (2, 2),
    }
  }
}

/// 给定图像尺寸下的网格划分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HogLayout {
  pub cells: (usize, usize),
  pub blocks: (usize, usize),
}

impl HogParams {
  pub fn layout(&self, rows: usize, cols: usize) -> Result<HogLayout, FeatureError> {
    let (c_row, c_col) = self.pixels_per_cell;
    let (b_row, b_col) = self.cells_per_block;
    if self.orientations == 0 || c_row == 0 || c_col == 0 || b_row == 0 || b_col == 0 {
      return Err(FeatureError::InvalidParams(format!("{:?}", self)));
    }

    let cells = (rows / c_row, cols / c_col);
    if cells.0 < b_row || cells.1 < b_col {
      return Err(FeatureError::InvalidParams(format!(
        "图像 {}x{} 不足以容纳一个 {}x{} 单元的块",
        rows, cols, b_row, b_col
      )));
    }

    Ok(HogLayout {
      cells,
      blocks: (cells.0 - b_row + 1, cells.1 - b_col + 1),
    })
  }

  pub fn descriptor_len(&self, rows: usize, cols: usize) -> Result<usize, FeatureError> {
    let layout = self.layout(rows, cols)?;
    let (b_row, b_col) = self.cells_per_block;
    Ok(layout.blocks.0 * layout.blocks.1 * b_row * b_col * self.orientations)
  }
}

/// 计算展平后的 HOG 描述子
pub fn hog(image: &Array2<f64>, params: &HogParams) -> Result<Vec<f64>, FeatureError> {
  let (rows, cols) = image.dim();
  let layout = params.layout(rows, cols)?;

  let (magnitude, orientation) = gradients(image);
  let histogram = cell_histograms(&magnitude, &orientation, params, &layout);

  let (b_row, b_col) = params.cells_per_block;
  let mut descriptor = Vec::with_capacity(params.descriptor_len(rows, cols)?);
  for r in 0..layout.blocks.0 {
    for c in 0..layout.blocks.1 {
      let block: Vec<f64> = histogram
        .slice(s![r..r + b_row, c..c + b_col, ..])
        .iter()
        .copied()
        .collect();
      descriptor.extend(l2_hys(&block));
    }
  }
  Ok(descriptor)
}

/// 中心差分梯度，首末行（列）的梯度为零
fn gradients(image: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
  let (rows, cols) = image.dim();
  let mut magnitude = Array2::<f64>::zeros((rows, cols));
  let mut orientation = Array2::<f64>::zeros((rows, cols));

  for r in 0..rows {
    for c in 0..cols {
      let g_row = if r > 0 && r + 1 < rows {
        image[[r + 1, c]] - image[[r - 1, c]]
      } else {
        0.0
      };
      let g_col = if c > 0 && c + 1 < cols {
        image[[r, c + 1]] - image[[r, c - 1]]
      } else {
        0.0
      };
      magnitude[[r, c]] = g_col.hypot(g_row);
      orientation[[r, c]] = g_row.atan2(g_col).to_degrees().rem_euclid(HALF_TURN_DEGREES);
    }
  }

  (magnitude, orientation)
}

/// 每个单元内按方向分箱累加梯度幅值，再除以单元面积
///
/// 第 i 个箱覆盖 `[i·w, (i+1)·w)` 度；取模后恰为 180° 的像素不计入任何箱。
fn cell_histograms(
  magnitude: &Array2<f64>,
  orientation: &Array2<f64>,
  params: &HogParams,
  layout: &HogLayout,
) -> Array3<f64> {
  let (c_row, c_col) = params.pixels_per_cell;
  let bin_width = HALF_TURN_DEGREES / params.orientations as f64;
  let area = (c_row * c_col) as f64;
  let mut histogram = Array3::<f64>::zeros((layout.cells.0, layout.cells.1, params.orientations));

  for cell_r in 0..layout.cells.0 {
    for cell_c in 0..layout.cells.1 {
      for r in cell_r * c_row..(cell_r + 1) * c_row {
        for c in cell_c * c_col..(cell_c + 1) * c_col {
          let angle = orientation[[r, c]];
          if let Some(bin) = (0..params.orientations).find(|&i| {
            angle >= bin_width * i as f64 && angle < bin_width * (i + 1) as f64
          }) {
            histogram[[cell_r, cell_c, bin]] += magnitude[[r, c]];
          }
        }
      }
      histogram
        .slice_mut(s![cell_r, cell_c, ..])
        .mapv_inplace(|v| v / area);
    }
  }

  histogram
}

/// L2 归一化、截断到 0.2 后再次 L2 归一化
fn l2_hys(block: &[f64]) -> Vec<f64> {
  let eps2 = L2HYS_EPS * L2HYS_EPS;
  let norm = (block.iter().map(|v| v * v).sum::<f64>() + eps2).sqrt();
  let clipped: Vec<f64> = block.iter().map(|v| (v / norm).min(L2HYS_CLIP)).collect();
  let norm = (clipped.iter().map(|v| v * v).sum::<f64>() + eps2).sqrt();
  clipped.into_iter().map(|v| v / norm).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descriptor_len_for_digit_input() {
    assert_eq!(HogParams::default().descriptor_len(8, 8).unwrap(), 36);
    assert_eq!(HogParams::default().descriptor_len(16, 12).unwrap(), 3 * 2 * 36);
  }

  #[test]
  fn rejects_too_small_image() {
    assert!(matches!(
      HogParams::default().layout(4, 8),
      Err(FeatureError::InvalidParams(_))
    ));
  }

  #[test]
  fn zero_image_gives_zero_descriptor() {
    let image = Array2::<f64>::zeros((8, 8));
    let descriptor = hog(&image, &HogParams::default()).unwrap();
    assert_eq!(descriptor.len(), 36);
    assert!(descriptor.iter().all(|&v| v == 0.0));
  }

  #[test]
  fn vertical_edge_falls_in_first_bin() {
    // 左暗右亮：水平梯度，方向 0°
    let image = Array2::from_shape_fn((8, 8), |(_, c)| if c >= 4 { 1.0 } else { 0.0 });
    let descriptor = hog(&image, &HogParams::default()).unwrap();
    for (i, v) in descriptor.iter().enumerate() {
      if i % 9 != 0 {
        assert_eq!(*v, 0.0, "bin {} should be empty", i);
      }
    }
    assert!(descriptor[0] > 0.0);
  }

  #[test]
  fn horizontal_edge_falls_in_ninety_degree_bin() {
    let image = Array2::from_shape_fn((8, 8), |(r, _)| if r >= 4 { 1.0 } else { 0.0 });
    let descriptor = hog(&image, &HogParams::default()).unwrap();
    let energy: f64 = descriptor.iter().skip(4).step_by(9).sum();
    let total: f64 = descriptor.iter().sum();
    assert!(total > 0.0);
    assert!((energy - total).abs() < 1e-12);
  }

  #[test]
  fn block_is_unit_norm_and_clipped() {
    let image = Array2::from_shape_fn((8, 8), |(r, c)| ((r * 7 + c * 3) % 5) as f64 / 4.0);
    let descriptor = hog(&image, &HogParams::default()).unwrap();
    let norm = descriptor.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);
    assert!(descriptor.iter().all(|&v| v >= 0.0));
  }
}
