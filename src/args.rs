// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;

use crate::{
  batch::{ArchiveFailurePolicy, BatchConfig},
  feature::FlatImagePolicy,
  input::{ArchiveLimits, NormalizerLimits},
  server::ServerConfig,
};

const MIB: u64 = 1024 * 1024;

/// Shanan Digits 服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0", value_name = "HOST")]
  pub host: String,

  /// 监听端口
  #[arg(long, default_value = "8000", value_name = "PORT")]
  pub port: u16,

  /// 模型文件路径（JSON）
  #[arg(long, default_value = "models/digits.json", value_name = "FILE")]
  pub model: PathBuf,

  /// 推理线程数（0 表示按 CPU 数量）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub workers: usize,

  /// 单个请求体上限（MiB）
  #[arg(long, default_value = "32", value_name = "MIB", value_parser = clap::value_parser!(u64).range(1..=4096))]
  pub max_upload_mb: u64,

  /// 解码图像的最大宽/高（像素）
  #[arg(long, default_value = "4096", value_name = "PIXELS")]
  pub max_image_px: u32,

  /// 单个压缩包最多处理的条目数
  #[arg(long, default_value = "1024", value_name = "COUNT")]
  pub max_archive_entries: usize,

  /// 压缩包单个条目解压后上限（MiB）
  #[arg(long, default_value = "8", value_name = "MIB", value_parser = clap::value_parser!(u64).range(1..=1024))]
  pub max_entry_mb: u64,

  /// 单个请求内所有压缩包解压后的总量上限（MiB）
  #[arg(long, default_value = "64", value_name = "MIB", value_parser = clap::value_parser!(u64).range(1..=65536))]
  pub max_archive_mb: u64,

  /// 压缩包无法打开时的处理方式
  #[arg(long, value_enum, default_value_t = ArchiveFailurePolicy::Skip)]
  pub archive_failure: ArchiveFailurePolicy,

  /// 无对比度图像的处理方式
  #[arg(long, value_enum, default_value_t = FlatImagePolicy::Zero)]
  pub flat_image: FlatImagePolicy,

  /// 日志级别（RUST_LOG 优先）
  #[arg(long, default_value = "info", value_name = "LEVEL")]
  pub log_level: String,

  /// 以 JSON 格式输出日志
  #[arg(long)]
  pub json_logs: bool,
}

impl Args {
  pub fn server_config(&self) -> ServerConfig {
    ServerConfig {
      host: self.host.clone(),
      port: self.port,
      max_upload_bytes: usize::try_from(self.max_upload_mb.saturating_mul(MIB)).unwrap_or(usize::MAX),
    }
  }

  pub fn batch_config(&self) -> BatchConfig {
    BatchConfig {
      archive_limits: ArchiveLimits {
        max_entries: self.max_archive_entries,
        max_entry_bytes: self.max_entry_mb.saturating_mul(MIB),
        max_total_bytes: self.max_archive_mb.saturating_mul(MIB),
      },
      archive_failure: self.archive_failure,
    }
  }

  pub fn normalizer_limits(&self) -> NormalizerLimits {
    NormalizerLimits {
      max_dimension: self.max_image_px,
      ..NormalizerLimits::default()
    }
  }
}
