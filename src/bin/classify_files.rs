// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/bin/classify_files.rs - 本地文件批量识别
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

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shanan_digits::{
  batch::{ArchiveFailurePolicy, BatchConfig, BatchIngester},
  feature::{FeatureExtractor, FlatImagePolicy},
  input::{ImageNormalizer, Upload},
  logging,
  model::SoftmaxModelBuilder,
  pipeline::Pipeline,
};

/// 对本地图像或 zip 压缩包批量识别，每行输出一个 JSON 结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径
  #[arg(long, value_name = "MODEL", default_value = "models/digits.json")]
  pub model: PathBuf,
  /// 输入文件
  #[arg(value_name = "FILE", required = true)]
  pub inputs: Vec<PathBuf>,
  /// 压缩包无法打开时的处理方式
  #[arg(long, value_enum, default_value_t = ArchiveFailurePolicy::Skip)]
  pub archive_failure: ArchiveFailurePolicy,
  /// 无对比度图像的处理方式
  #[arg(long, value_enum, default_value_t = FlatImagePolicy::Zero)]
  pub flat_image: FlatImagePolicy,
  /// 日志级别
  #[arg(long, default_value = "warn")]
  pub log_level: String,
}

fn main() -> Result<()> {
  let args = Args::parse();
  logging::init(&args.log_level, false)?;

  info!("模型文件路径: {}", args.model.display());
  info!("输入文件数量: {}", args.inputs.len());

  let model = SoftmaxModelBuilder::new(&args.model).build()?;
  let pipeline = Pipeline::new(
    ImageNormalizer::default(),
    FeatureExtractor::with_policy(args.flat_image),
    model,
  )?;
  let ingester = BatchIngester::new(
    Arc::new(pipeline),
    BatchConfig {
      archive_failure: args.archive_failure,
      ..BatchConfig::default()
    },
  );

  let mut uploads = Vec::with_capacity(args.inputs.len());
  for path in &args.inputs {
    let bytes = std::fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
    uploads.push(Upload::new(path.display().to_string(), bytes));
  }

  let now = std::time::Instant::now();
  let report = ingester.ingest(uploads)?;
  info!("识别完成，耗时: {:.2?}", now.elapsed());

  for result in report.into_results() {
    println!("{}", serde_json::to_string(&result)?);
  }

  Ok(())
}
