// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use steelscan::provision::{DEFAULT_MODEL_PATH, DEFAULT_MODEL_URL};

/// Steelscan 网页服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0:8501", value_name = "ADDR")]
  pub listen: String,

  /// 模型下载地址（本地文件不存在时使用），必须指向 ONNX 格式的导出模型
  #[arg(long, default_value = DEFAULT_MODEL_URL, value_name = "URL")]
  pub model_url: Url,

  /// 本地模型文件路径
  #[arg(long, default_value = DEFAULT_MODEL_PATH, value_name = "FILE")]
  pub model_path: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub iou: f32,

  /// 单张图像最多保留的检测数
  #[arg(long, default_value = "300", value_name = "COUNT")]
  pub max_detections: usize,

  /// ONNX Runtime 推理线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub intra_threads: usize,

  /// 缺陷知识库 JSON 文件，不指定时使用内置知识库
  #[arg(long, value_name = "FILE")]
  pub knowledge: Option<PathBuf>,

  /// 标签字体（TrueType），不指定时只绘制检测框
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn model_url_help_asks_for_onnx_export() {
    let help = Args::command().render_long_help().to_string();
    assert!(help.contains("必须指向 ONNX 格式的导出模型"));
  }

  #[test]
  fn defaults_match_prediction_settings() {
    let args = Args::parse_from(["steelscan"]);
    assert_eq!(args.listen, "0.0.0.0:8501");
    assert_eq!(args.intra_threads, 4);
    assert!(args.model_url.as_str().ends_with("best.onnx"));
  }
}
