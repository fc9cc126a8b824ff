// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/input/archive.rs - ZIP 压缩包展开
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

use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::{ArchiveLimits, BatchEntry};

#[derive(Error, Debug)]
pub enum ArchiveError {
  #[error("无法打开压缩包 {name}: {source}")]
  OpenError {
    name: String,
    source: zip::result::ZipError,
  },
}

impl ArchiveError {
  pub fn name(&self) -> &str {
    match self {
      ArchiveError::OpenError { name, .. } => name,
    }
  }
}

/// 按压缩包中央目录顺序展开条目
///
/// 目录条目不产生批处理项；单个条目读取失败或超出大小限制时，
/// 以 [`BatchEntry::Unreadable`] 形式保留，交由批处理记录并跳过。
pub fn expand_archive(
  name: &str,
  bytes: &[u8],
  limits: &ArchiveLimits,
) -> Result<Vec<BatchEntry>, ArchiveError> {
  let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|source| ArchiveError::OpenError {
    name: name.to_string(),
    source,
  })?;

  let total = archive.len();
  if total > limits.max_entries {
    warn!(
      "压缩包 {} 含 {} 个条目，超过上限 {}，仅处理前 {} 个",
      name, total, limits.max_entries, limits.max_entries
    );
  }
  debug!("展开压缩包 {}: {} 个条目", name, total);

  let mut entries = Vec::with_capacity(total.min(limits.max_entries));
  let mut remaining = limits.max_total_bytes;
  let mut budget_exhausted = false;
  for index in 0..total.min(limits.max_entries) {
    let mut file = match archive.by_index(index) {
      Ok(file) => file,
      Err(e) => {
        entries.push(BatchEntry::Unreadable {
          name: format!("{}#{}", name, index),
          reason: e.to_string(),
        });
        continue;
      }
    };

    if file.is_dir() {
      debug!("跳过目录条目: {}", file.name());
      continue;
    }

    let entry_name = file.name().to_string();
    if budget_exhausted {
      entries.push(BatchEntry::Unreadable {
        name: entry_name,
        reason: format!("压缩包解压总量超过上限 {} 字节", limits.max_total_bytes),
      });
      continue;
    }

    if file.size() > limits.max_entry_bytes {
      entries.push(BatchEntry::Unreadable {
        reason: format!(
          "条目大小 {} 字节超过上限 {} 字节",
          file.size(),
          limits.max_entry_bytes
        ),
        name: entry_name,
      });
      continue;
    }

    // 声明的大小不可信，读取时再限制一次
    let cap = limits.max_entry_bytes.min(remaining);
    let mut data = Vec::with_capacity(file.size().min(cap) as usize);
    let read = (&mut file).take(cap + 1).read_to_end(&mut data);
    match read {
      Ok(_) if data.len() as u64 > cap && cap < limits.max_entry_bytes => {
        warn!(
          "压缩包 {} 解压总量超过上限 {} 字节，剩余条目不再读取",
          name, limits.max_total_bytes
        );
        budget_exhausted = true;
        entries.push(BatchEntry::Unreadable {
          name: entry_name,
          reason: format!("压缩包解压总量超过上限 {} 字节", limits.max_total_bytes),
        });
      }
      Ok(_) if data.len() as u64 > cap => {
        entries.push(BatchEntry::Unreadable {
          name: entry_name,
          reason: format!("条目解压后超过上限 {} 字节", limits.max_entry_bytes),
        });
      }
      Ok(_) => {
        remaining -= data.len() as u64;
        entries.push(BatchEntry::Item {
          name: entry_name,
          bytes: data,
        });
      }
      Err(e) => entries.push(BatchEntry::Unreadable {
        name: entry_name,
        reason: e.to_string(),
      }),
    }
  }

  Ok(entries)
}
