// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/bin/inspect_oneshot.rs - 单张图像检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use steelscan::{
  FromUrl,
  input::ImageFileInput,
  inspect::Inspector,
  knowledge::KnowledgeBase,
  model::Yolov8Builder,
  output::{Render, SaveImageFileOutput, draw::Draw, markdown::render_markdown},
  provision::{DEFAULT_MODEL_URL, HttpFetch, ModelProvisioner},
};
use tracing::info;

/// 单张图像检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 本地模型文件，例如 yolov8:///models/best.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 模型下载地址（本地文件不存在时使用），必须指向 ONNX 格式的导出模型
  #[arg(long, default_value = DEFAULT_MODEL_URL, value_name = "URL")]
  pub model_url: Url,
  /// 输入图像，例如 image:///data/strip.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 标注图像的保存路径，例如 image:///data/strip_annotated.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub iou: f32,
  /// ONNX Runtime 推理线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub intra_threads: usize,
  /// 缺陷知识库 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub knowledge: Option<PathBuf>,
  /// 标签字体（TrueType）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);

  let knowledge = match &args.knowledge {
    Some(path) => KnowledgeBase::from_json_file(path)?,
    None => KnowledgeBase::builtin(),
  };
  let draw = match &args.font {
    Some(path) => Draw::default().with_font_file(path)?,
    None => Draw::default(),
  };
  if !draw.has_font() {
    info!("未指定标签字体，只绘制检测框");
  }

  let builder = Yolov8Builder::from_url(&args.model)?
    .confidence(args.confidence)
    .iou(args.iou)
    .intra_threads(args.intra_threads);
  let provisioner = ModelProvisioner::new(
    HttpFetch::new()?,
    args.model_url.clone(),
    builder.model_path(),
  );
  let model = provisioner
    .provision(|_| builder.build())
    .context("无法准备检测模型")?;

  let inspector = Inspector::new(model, knowledge, draw);
  let input = ImageFileInput::from_url(&args.input)?;
  let output = args
    .output
    .as_ref()
    .map(SaveImageFileOutput::from_url)
    .transpose()?;

  for frame in input {
    let inspection = inspector.inspect_image(&frame)?;
    if let Some(output) = &output {
      output.render_result(&frame, &inspection)?;
    }
    println!("{}", render_markdown(&inspection));
  }

  Ok(())
}
