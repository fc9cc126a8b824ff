// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/main.rs - 推理服务主程序
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use shanan_digits::{
  args::Args,
  feature::FeatureExtractor,
  input::ImageNormalizer,
  logging,
  model::SoftmaxModelBuilder,
  pipeline::Pipeline,
  server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  logging::init(&args.log_level, args.json_logs)?;

  info!("Shanan Digits 手写数字识别服务");
  info!("模型文件路径: {}", args.model.display());
  info!("监听地址: {}:{}", args.host, args.port);
  info!("无对比度图像策略: {:?}", args.flat_image);
  info!("压缩包失败策略: {:?}", args.archive_failure);

  // 模型加载失败时不开始服务
  let model = match SoftmaxModelBuilder::new(&args.model).build() {
    Ok(model) => model,
    Err(e) => {
      error!("模型加载失败: {}", e);
      return Err(e).context("无法加载模型");
    }
  };

  let pipeline = Pipeline::new(
    ImageNormalizer::new(args.normalizer_limits()),
    FeatureExtractor::with_policy(args.flat_image),
    model,
  )
  .context("模型与特征提取器不匹配")?;

  let state = AppState::new(pipeline, args.batch_config(), args.workers)
    .context("无法创建推理线程池")?;

  server::serve(&args.server_config(), state)
    .await
    .context("服务异常退出")?;

  Ok(())
}
