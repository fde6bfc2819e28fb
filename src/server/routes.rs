// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/server/routes.rs - 请求处理
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

use axum::{
  extract::{Multipart, State},
  http::StatusCode,
  response::{Html, IntoResponse, Response},
};
use image::RgbImage;
use tracing::{error, info, warn};

use super::{AppState, BoxError, page};
use crate::{
  input::is_supported_upload,
  model::{DetectResult, Model},
};

const UPLOAD_FIELD: &str = "image";

pub async fn index() -> Html<String> {
  Html(page::index_page())
}

pub async fn health() -> &'static str {
  "ok"
}

pub async fn inspect<M>(State(state): State<AppState<M>>, mut multipart: Multipart) -> Response
where
  M: Model<Input = RgbImage, Output = DetectResult> + Send + Sync + 'static,
  M::Error: Into<BoxError>,
{
  let (file_name, bytes) = match read_upload(&mut multipart).await {
    Ok(upload) => upload,
    Err(message) => {
      warn!("无效的上传: {}", message);
      return (StatusCode::BAD_REQUEST, Html(page::upload_hint_page(&message))).into_response();
    }
  };
  info!("收到上传图像: {} ({} 字节)", file_name, bytes.len());

  let inspector = state.inspector.clone();
  let outcome = tokio::task::spawn_blocking(move || inspector.inspect_bytes(&bytes)).await;

  let inspection = match outcome {
    Ok(Ok(inspection)) => inspection,
    Ok(Err(e)) => {
      error!("处理图像 {} 失败: {}", file_name, e);
      return (
        StatusCode::UNPROCESSABLE_ENTITY,
        Html(page::error_page(&e.to_string())),
      )
        .into_response();
    }
    Err(e) => {
      error!("检测任务异常退出: {}", e);
      return (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(page::error_page(&e.to_string())),
      )
        .into_response();
    }
  };

  match page::results_page(&inspection) {
    Ok(body) => Html(body).into_response(),
    Err(e) => {
      error!("渲染结果页面失败: {}", e);
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(page::error_page(&e.to_string())),
      )
        .into_response()
    }
  }
}

/// 读取表单中的图像文件，返回文件名与内容
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), String> {
  while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }
    let file_name = field.file_name().unwrap_or_default().to_string();
    if !is_supported_upload(&file_name) {
      return Err(format!("不支持的文件类型: {}", file_name));
    }
    let bytes = field.bytes().await.map_err(|e| e.to_string())?;
    if bytes.is_empty() {
      return Err("上传的文件为空".to_string());
    }
    return Ok((file_name, bytes.to_vec()));
  }
  Err("没有上传图像".to_string())
}
