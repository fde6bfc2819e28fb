// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/main.rs - 网页服务主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use steelscan::{
  inspect::Inspector,
  knowledge::KnowledgeBase,
  model::Yolov8Builder,
  output::draw::Draw,
  provision::{HttpFetch, ModelProvisioner},
  server,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("模型下载地址: {}", args.model_url);
  info!("模型文件路径: {}", args.model_path.display());
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.iou);
  info!("推理线程数: {}", args.intra_threads);

  let knowledge = match &args.knowledge {
    Some(path) => KnowledgeBase::from_json_file(path)
      .with_context(|| format!("无法加载知识库: {}", path.display()))?,
    None => KnowledgeBase::builtin(),
  };
  let draw = match &args.font {
    Some(path) => Draw::default()
      .with_font_file(path)
      .with_context(|| format!("无法加载字体: {}", path.display()))?,
    None => Draw::default(),
  };
  if !draw.has_font() {
    info!("未指定标签字体，只绘制检测框");
  }

  // 模型不可用时直接退出，不重试
  let provisioner = ModelProvisioner::new(HttpFetch::new()?, args.model_url.clone(), &args.model_path);
  let model = provisioner
    .provision(|path| {
      Yolov8Builder::new(path)
        .confidence(args.confidence)
        .iou(args.iou)
        .max_detections(args.max_detections)
        .intra_threads(args.intra_threads)
        .build()
    })
    .context("无法准备检测模型")?;
  info!("模型类别: {:?}", model.names().iter().collect::<Vec<_>>());

  let inspector = Arc::new(Inspector::new(model, knowledge, draw));

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()?;

  runtime.block_on(async move {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let mut tx = Some(tx);
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      if let Some(tx) = tx.take() {
        let _ = tx.send(());
      }
    })?;

    let listener = tokio::net::TcpListener::bind(&args.listen)
      .await
      .with_context(|| format!("无法监听地址: {}", args.listen))?;

    server::serve(listener, server::router(inspector), async {
      let _ = rx.await;
    })
    .await?;

    info!("服务已退出");
    Ok::<(), anyhow::Error>(())
  })
}
