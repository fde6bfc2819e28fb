// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/server.rs - 网页界面
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

use std::{future::Future, sync::Arc};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use image::RgbImage;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
  inspect::Inspector,
  model::{DetectResult, Model},
};

pub mod page;
mod routes;

/// 单次上传的大小上限
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct AppState<M> {
  inspector: Arc<Inspector<M>>,
}

impl<M> Clone for AppState<M> {
  fn clone(&self) -> Self {
    Self {
      inspector: self.inspector.clone(),
    }
  }
}

pub fn router<M>(inspector: Arc<Inspector<M>>) -> Router
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: Into<BoxError>,
{
  Router::new()
    .route("/", get(routes::index))
    .route("/inspect", post(routes::inspect::<M>))
    .route("/health", get(routes::health))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .layer(TraceLayer::new_for_http())
    .with_state(AppState { inspector })
}

pub async fn serve<S>(
  listener: tokio::net::TcpListener,
  app: Router,
  shutdown: S,
) -> std::io::Result<()>
where
  S: Future<Output = ()> + Send + 'static,
{
  info!("网页服务已启动: http://{}", listener.local_addr()?);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown)
    .await
}
