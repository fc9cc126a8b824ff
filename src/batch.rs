// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/batch.rs - 批量推理
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

use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  input::{ArchiveLimits, BatchEntry, InputError, Upload, UploadKind, expand_upload},
  pipeline::{ItemStage, Pipeline, PredictionResult},
};

/// 压缩包本身无法打开时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ArchiveFailurePolicy {
  /// 记录日志，该压缩包不贡献任何结果
  #[default]
  Skip,
  /// 整个批处理请求失败
  Abort,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchConfig {
  pub archive_limits: ArchiveLimits,
  pub archive_failure: ArchiveFailurePolicy,
}

#[derive(Error, Debug)]
pub enum BatchError {
  #[error("批处理终止: {0}")]
  Archive(#[from] InputError),
}

/// 单个条目的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
  Included(PredictionResult),
  Skipped {
    name: String,
    stage: ItemStage,
    reason: String,
  },
}

/// 按规范顺序排列的条目结果
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
  outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
  pub fn outcomes(&self) -> &[ItemOutcome] {
    &self.outcomes
  }

  pub fn included(&self) -> usize {
    self
      .outcomes
      .iter()
      .filter(|o| matches!(o, ItemOutcome::Included(_)))
      .count()
  }

  pub fn skipped(&self) -> impl Iterator<Item = (&str, ItemStage, &str)> {
    self.outcomes.iter().filter_map(|o| match o {
      ItemOutcome::Skipped {
        name,
        stage,
        reason,
      } => Some((name.as_str(), *stage, reason.as_str())),
      ItemOutcome::Included(_) => None,
    })
  }

  /// 仅保留成功的结果，顺序不变
  pub fn into_results(self) -> Vec<PredictionResult> {
    self
      .outcomes
      .into_iter()
      .filter_map(|o| match o {
        ItemOutcome::Included(result) => Some(result),
        ItemOutcome::Skipped { .. } => None,
      })
      .collect()
  }
}

enum Work {
  Process { name: String, bytes: Vec<u8> },
  Skip { name: String, stage: ItemStage, reason: String },
}

/// 批量推理：展开上传文件，逐条推理并隔离失败
///
/// 条目在当前 rayon 线程池中并行处理，结果按上传顺序与压缩包内顺序输出。
#[derive(Clone)]
pub struct BatchIngester {
  pipeline: Arc<Pipeline>,
  config: BatchConfig,
}

impl BatchIngester {
  pub fn new(pipeline: Arc<Pipeline>, config: BatchConfig) -> Self {
    Self { pipeline, config }
  }

  pub fn ingest(&self, uploads: Vec<Upload>) -> Result<BatchReport, BatchError> {
    let upload_count = uploads.len();
    let work = self.expand(uploads)?;
    let item_count = work.len();

    let outcomes: Vec<ItemOutcome> = work
      .into_par_iter()
      .map(|work| self.process(work))
      .collect();

    let report = BatchReport { outcomes };
    for (name, stage, reason) in report.skipped() {
      warn!("跳过条目 {} (阶段: {}): {}", name, stage, reason);
    }
    info!(
      "批处理完成: {} 个上传, {} 个条目, {} 个成功",
      upload_count,
      item_count,
      report.included()
    );
    Ok(report)
  }

  fn expand(&self, uploads: Vec<Upload>) -> Result<Vec<Work>, BatchError> {
    let mut work = Vec::with_capacity(uploads.len());
    // 解压总量上限作用于整个请求，而不是单个压缩包
    let mut limits = self.config.archive_limits;
    for upload in uploads {
      let is_archive = upload.kind == UploadKind::Archive;
      match expand_upload(upload, &limits) {
        Ok(entries) => {
          for entry in entries {
            match entry {
              BatchEntry::Item { name, bytes } => {
                if is_archive {
                  limits.max_total_bytes =
                    limits.max_total_bytes.saturating_sub(bytes.len() as u64);
                }
                work.push(Work::Process { name, bytes });
              }
              BatchEntry::Unreadable { name, reason } => work.push(Work::Skip {
                name,
                stage: ItemStage::Read,
                reason,
              }),
            }
          }
        }
        Err(e) => match self.config.archive_failure {
          ArchiveFailurePolicy::Abort => return Err(BatchError::Archive(e)),
          ArchiveFailurePolicy::Skip => work.push(Work::Skip {
            name: e.name().to_string(),
            stage: ItemStage::Read,
            reason: e.to_string(),
          }),
        },
      }
    }
    Ok(work)
  }

  fn process(&self, work: Work) -> ItemOutcome {
    match work {
      Work::Process { name, bytes } => match self.pipeline.predict(&name, &bytes) {
        Ok(result) => ItemOutcome::Included(result),
        Err(e) => ItemOutcome::Skipped {
          stage: e.stage(),
          reason: e.to_string(),
          name,
        },
      },
      Work::Skip {
        name,
        stage,
        reason,
      } => ItemOutcome::Skipped {
        name,
        stage,
        reason,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    feature::FeatureExtractor,
    input::ImageNormalizer,
    model::{NUM_CLASSES, SoftmaxModel},
  };
  use image::{DynamicImage, GrayImage, ImageFormat, Luma};
  use std::io::Cursor;

  fn png(seed: u8) -> Vec<u8> {
    let image = GrayImage::from_fn(8, 8, |x, y| Luma([((x * 32) as u8).wrapping_add(seed * (y as u8))]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
      .write_to(&mut buffer, ImageFormat::Png)
      .unwrap();
    buffer.into_inner()
  }

  fn ingester(policy: ArchiveFailurePolicy) -> BatchIngester {
    let model = SoftmaxModel::from_parts(
      vec![vec![0.5; 36]; NUM_CLASSES],
      (0..NUM_CLASSES).map(|c| c as f64 * 0.1).collect(),
      None,
    )
    .unwrap();
    let pipeline =
      Pipeline::new(ImageNormalizer::default(), FeatureExtractor::default(), model).unwrap();
    BatchIngester::new(
      Arc::new(pipeline),
      BatchConfig {
        archive_failure: policy,
        ..BatchConfig::default()
      },
    )
  }

  fn names(results: &[PredictionResult]) -> Vec<&str> {
    results.iter().map(|r| r.filename.as_str()).collect()
  }

  #[test]
  fn keeps_submission_order() {
    let uploads = (0..6)
      .map(|i| Upload::new(format!("digit_{}.png", i), png(i)))
      .collect();
    let results = ingester(ArchiveFailurePolicy::Skip)
      .ingest(uploads)
      .unwrap()
      .into_results();
    assert_eq!(
      names(&results),
      ["digit_0.png", "digit_1.png", "digit_2.png", "digit_3.png", "digit_4.png", "digit_5.png"]
    );
  }

  #[test]
  fn isolates_corrupt_upload() {
    let uploads = vec![
      Upload::new("a.png", png(1)),
      Upload::new("broken.png", b"plain text".to_vec()),
      Upload::new("b.png", png(2)),
    ];
    let report = ingester(ArchiveFailurePolicy::Skip).ingest(uploads).unwrap();

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].0, "broken.png");
    assert_eq!(skipped[0].1, ItemStage::Decode);
    assert_eq!(names(&report.into_results()), ["a.png", "b.png"]);
  }

  #[test]
  fn empty_batch_is_empty() {
    let report = ingester(ArchiveFailurePolicy::Skip).ingest(Vec::new()).unwrap();
    assert!(report.outcomes().is_empty());
  }

  #[test]
  fn results_are_within_bounds() {
    let uploads = (0..4).map(|i| Upload::new(format!("{}.png", i), png(i))).collect();
    for result in ingester(ArchiveFailurePolicy::Skip)
      .ingest(uploads)
      .unwrap()
      .into_results()
    {
      assert!(result.digit.id() <= 9);
      assert!((0.0..=1.0).contains(&result.confidence));
    }
  }

  #[cfg(feature = "archive_upload")]
  mod archives {
    use super::*;
    use std::io::Write;
    use zip::{ZipWriter, write::SimpleFileOptions};

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
      let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
      for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
      }
      writer.finish().unwrap().into_inner()
    }

    #[test]
    fn expands_archive_in_entry_order() {
      let archive = zip_of(&[
        ("z.png", png(3)),
        ("bad_1.png", b"nope".to_vec()),
        ("a.png", png(4)),
        ("bad_2.png", Vec::new()),
        ("m.png", png(5)),
      ]);
      let uploads = vec![
        Upload::new("first.png", png(1)),
        Upload::new("digits.zip", archive),
        Upload::new("last.png", png(2)),
      ];
      let report = ingester(ArchiveFailurePolicy::Skip).ingest(uploads).unwrap();

      let skipped: Vec<_> = report.skipped().map(|(name, ..)| name.to_string()).collect();
      assert_eq!(skipped, ["bad_1.png", "bad_2.png"]);
      assert_eq!(
        names(&report.into_results()),
        ["first.png", "z.png", "a.png", "m.png", "last.png"]
      );
    }

    /// 收集日志输出的缓冲区
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
      fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
      }

      fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
      }
    }

    impl LogBuffer {
      fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
      }
    }

    #[test]
    fn logs_every_skipped_entry() {
      let archive = zip_of(&[
        ("good_1.png", png(1)),
        ("broken_a.png", b"nope".to_vec()),
        ("good_2.png", png(2)),
        ("broken_b.png", Vec::new()),
        ("good_3.png", png(3)),
      ]);
      let buffer = LogBuffer::default();
      let writer = buffer.clone();
      let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

      let report = tracing::subscriber::with_default(subscriber, || {
        ingester(ArchiveFailurePolicy::Skip)
          .ingest(vec![Upload::new("digits.zip", archive)])
          .unwrap()
      });
      assert_eq!(report.included(), 3);

      let logs = buffer.contents();
      let warnings: Vec<&str> = logs.lines().filter(|line| line.contains("WARN")).collect();
      assert_eq!(warnings.len(), 2);
      assert!(warnings[0].contains("broken_a.png"));
      assert!(warnings[1].contains("broken_b.png"));
    }

    #[test]
    fn total_budget_spans_archives() {
      let first = zip_of(&[("a.png", png(1)), ("b.png", png(2))]);
      let second = zip_of(&[("c.png", png(3))]);
      let budget = (png(1).len() + png(2).len()) as u64;
      let ingester = BatchIngester::new(
        ingester(ArchiveFailurePolicy::Skip).pipeline,
        BatchConfig {
          archive_limits: ArchiveLimits {
            max_total_bytes: budget,
            ..ArchiveLimits::default()
          },
          ..BatchConfig::default()
        },
      );
      let report = ingester
        .ingest(vec![
          Upload::new("first.zip", first),
          Upload::new("loose.png", png(4)),
          Upload::new("second.zip", second),
        ])
        .unwrap();

      let skipped: Vec<_> = report.skipped().map(|(name, stage, _)| (name.to_string(), stage)).collect();
      assert_eq!(skipped, [("c.png".to_string(), ItemStage::Read)]);
      assert_eq!(names(&report.into_results()), ["a.png", "b.png", "loose.png"]);
    }

    #[test]
    fn broken_archive_skipped_by_default() {
      let uploads = vec![
        Upload::new("ok.png", png(1)),
        Upload::new("broken.zip", b"not a zip".to_vec()),
      ];
      let report = ingester(ArchiveFailurePolicy::Skip).ingest(uploads).unwrap();
      let skipped: Vec<_> = report.skipped().collect();
      assert_eq!(skipped.len(), 1);
      assert_eq!(skipped[0].0, "broken.zip");
      assert_eq!(skipped[0].1, ItemStage::Read);
      assert_eq!(report.included(), 1);
    }

    #[test]
    fn broken_archive_aborts_when_configured() {
      let uploads = vec![
        Upload::new("ok.png", png(1)),
        Upload::new("broken.zip", b"not a zip".to_vec()),
      ];
      let err = ingester(ArchiveFailurePolicy::Abort).ingest(uploads).unwrap_err();
      assert!(matches!(err, BatchError::Archive(_)));
    }
  }
}
