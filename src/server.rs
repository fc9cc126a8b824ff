// 该文件是 Shanan Digits （山南数字） 项目的一部分。
// src/server.rs - HTTP 服务
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

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde_json::json;
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot};
use tracing::{debug, error, info, warn};

use crate::{
  batch::{BatchConfig, BatchError, BatchIngester},
  input::Upload,
  pipeline::{Pipeline, PipelineError, PredictionResult},
};

/// 单文件接口的表单字段名
pub const SINGLE_FIELD: &str = "file";
/// 批量接口的表单字段名
pub const BATCH_FIELD: &str = "files";

const UNSUPPORTED_IMAGE_MSG: &str = "could not convert input file to image";

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
  pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: "0.0.0.0".to_string(),
      port: 8000,
      max_upload_bytes: 32 * 1024 * 1024,
    }
  }
}

/// 所有请求共享的只读状态
#[derive(Clone)]
pub struct AppState {
  pipeline: Arc<Pipeline>,
  ingester: BatchIngester,
  workers: Arc<ThreadPool>,
}

impl AppState {
  /// `workers` 为 0 时由 rayon 按 CPU 数量决定
  pub fn new(
    pipeline: Pipeline,
    batch: BatchConfig,
    workers: usize,
  ) -> Result<Self, ThreadPoolBuildError> {
    let pool = ThreadPoolBuilder::new()
      .num_threads(workers)
      .thread_name(|i| format!("digits-worker-{}", i))
      .build()?;
    info!("推理线程池已创建: {} 个线程", pool.current_num_threads());

    let pipeline = Arc::new(pipeline);
    Ok(Self {
      ingester: BatchIngester::new(pipeline.clone(), batch),
      pipeline,
      workers: Arc::new(pool),
    })
  }

  /// 在推理线程池上执行任务，避免占用异步运行时线程
  async fn run_blocking<T, F>(&self, job: F) -> Result<T, ApiError>
  where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    self.workers.spawn(move || {
      let _ = tx.send(job());
    });
    rx.await.map_err(|_| ApiError::WorkerGone)
  }
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("表单解析错误: {0}")]
  Multipart(#[from] MultipartError),
  #[error("缺少表单字段: {0}")]
  MissingField(&'static str),
  #[error("推理失败: {0}")]
  Pipeline(#[from] PipelineError),
  #[error("{0}")]
  Batch(#[from] BatchError),
  #[error("推理线程意外退出")]
  WorkerGone,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, msg) = match &self {
      ApiError::Multipart(e) => (e.status(), e.body_text()),
      ApiError::MissingField(field) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        format!("missing form field '{}'", field),
      ),
      ApiError::Pipeline(PipelineError::Decode(_)) => (
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UNSUPPORTED_IMAGE_MSG.to_string(),
      ),
      ApiError::Pipeline(PipelineError::Feature(e)) => {
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
      }
      ApiError::Pipeline(PipelineError::Model(e)) => {
        error!("模型调用失败: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
      ApiError::Batch(BatchError::Archive(e)) => (
        StatusCode::BAD_REQUEST,
        format!("could not open archive '{}'", e.name()),
      ),
      ApiError::WorkerGone => {
        error!("推理线程意外退出");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "inference worker failed".to_string(),
        )
      }
    };

    (status, Json(json!({ "msg": msg }))).into_response()
  }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/predict", post(predict))
    .route("/predict_batch", post(predict_batch))
    .route("/health", get(health))
    .fallback(not_found)
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .with_state(state)
}

/// 启动服务，收到 Ctrl-C 后优雅退出
pub async fn serve(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
  let app = router(state, config.max_upload_bytes);
  let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
  info!("服务监听于 {}", listener.local_addr()?);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已停止");
  Ok(())
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => {
      error!("无法监听中断信号: {}", e);
      std::future::pending::<()>().await;
    }
  }
}

/// 读取指定字段的所有上传文件，其他字段忽略
async fn read_uploads(multipart: &mut Multipart, field_name: &str) -> Result<Vec<Upload>, ApiError> {
  let mut uploads = Vec::new();
  while let Some(field) = multipart.next_field().await? {
    if field.name() != Some(field_name) {
      debug!("忽略表单字段: {:?}", field.name());
      continue;
    }

    let name = field
      .file_name()
      .map(str::to_string)
      .unwrap_or_else(|| field_name.to_string());
    let bytes = field.bytes().await?;
    debug!("收到上传文件 {} ({} 字节)", name, bytes.len());
    uploads.push(Upload::new(name, bytes.to_vec()));
  }
  Ok(uploads)
}

async fn predict(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
  let upload = read_uploads(&mut multipart, SINGLE_FIELD)
    .await?
    .into_iter()
    .next()
    .ok_or(ApiError::MissingField(SINGLE_FIELD))?;

  let pipeline = state.pipeline.clone();
  let name = upload.name.clone();
  let result = state
    .run_blocking(move || pipeline.predict(&upload.name, &upload.bytes))
    .await?;

  match result {
    Ok(result) => {
      info!(
        "预测 {}: 数字 {} 置信度 {:.4}",
        result.filename,
        result.digit.id(),
        result.confidence
      );
      Ok(Json(result))
    }
    Err(e) => {
      warn!("无法处理上传文件 {}: {}", name, e);
      Err(e.into())
    }
  }
}

async fn predict_batch(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<Vec<PredictionResult>>, ApiError> {
  let uploads = read_uploads(&mut multipart, BATCH_FIELD).await?;
  if uploads.is_empty() {
    return Err(ApiError::MissingField(BATCH_FIELD));
  }

  let ingester = state.ingester.clone();
  let report = state.run_blocking(move || ingester.ingest(uploads)).await??;
  Ok(Json(report.into_results()))
}

async fn health() -> Json<serde_json::Value> {
  Json(json!({ "status": "ok" }))
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
  (StatusCode::NOT_FOUND, Json(json!({ "msg": "not found" })))
}
