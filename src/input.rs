// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/input.rs - 上传文件输入
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

mod normalize;
pub use self::normalize::{DecodeError, ImageNormalizer, NormalizerLimits};

#[cfg(feature = "archive_upload")]
mod archive;
#[cfg(feature = "archive_upload")]
pub use self::archive::{ArchiveError, expand_archive};

const ARCHIVE_SUFFIX: &str = ".zip";

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "archive_upload")]
  #[error("压缩包错误: {0}")]
  ArchiveError(#[from] ArchiveError),
  #[cfg(not(feature = "archive_upload"))]
  #[error("未启用压缩包支持: {0}")]
  ArchiveDisabled(String),
}

impl InputError {
  /// 出错的上传文件名
  pub fn name(&self) -> &str {
    match self {
      #[cfg(feature = "archive_upload")]
      InputError::ArchiveError(e) => e.name(),
      #[cfg(not(feature = "archive_upload"))]
      InputError::ArchiveDisabled(name) => name,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
  Image,
  Archive,
}

impl UploadKind {
  /// 仅根据文件名后缀判断（忽略大小写）
  pub fn from_filename(name: &str) -> Self {
    let is_archive = name.len() >= ARCHIVE_SUFFIX.len()
      && name.as_bytes()[name.len() - ARCHIVE_SUFFIX.len()..]
        .eq_ignore_ascii_case(ARCHIVE_SUFFIX.as_bytes());
    if is_archive {
      UploadKind::Archive
    } else {
      UploadKind::Image
    }
  }
}

/// 一次请求中上传的单个文件
#[derive(Debug, Clone)]
pub struct Upload {
  pub name: String,
  pub bytes: Vec<u8>,
  pub kind: UploadKind,
}

impl Upload {
  pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
    let name = name.into();
    let kind = UploadKind::from_filename(&name);
    Self { name, bytes, kind }
  }
}

/// 压缩包解析上限
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
  pub max_entries: usize,
  pub max_entry_bytes: u64,
  /// 解压后的总字节数上限
  pub max_total_bytes: u64,
}

impl Default for ArchiveLimits {
  fn default() -> Self {
    Self {
      max_entries: 1024,
      max_entry_bytes: 8 * 1024 * 1024,
      max_total_bytes: 64 * 1024 * 1024,
    }
  }
}

/// 展开后的批处理条目
#[derive(Debug, Clone)]
pub enum BatchEntry {
  /// 待推理的图像字节
  Item { name: String, bytes: Vec<u8> },
  /// 压缩包内无法读取的条目
  Unreadable { name: String, reason: String },
}

impl BatchEntry {
  pub fn name(&self) -> &str {
    match self {
      BatchEntry::Item { name, .. } | BatchEntry::Unreadable { name, .. } => name,
    }
  }
}

/// 把上传文件展开为有序的批处理条目
pub fn expand_upload(upload: Upload, limits: &ArchiveLimits) -> Result<Vec<BatchEntry>, InputError> {
  match upload.kind {
    UploadKind::Image => Ok(vec![BatchEntry::Item {
      name: upload.name,
      bytes: upload.bytes,
    }]),
    #[cfg(feature = "archive_upload")]
    UploadKind::Archive => Ok(expand_archive(&upload.name, &upload.bytes, limits)?),
    #[cfg(not(feature = "archive_upload"))]
    UploadKind::Archive => {
      let _ = limits;
      Err(InputError::ArchiveDisabled(upload.name))
    }
  }
}
