// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use std::{
  cmp::Ordering,
  path::{Path, PathBuf},
  sync::Mutex,
};

use image::{RgbImage, imageops::FilterType};
use ndarray::{ArrayView2, ArrayViewD, Axis, IxDyn};
use ort::{session::Session, value::Tensor};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, LabelTable, Model},
};

const YOLOV8_NUM_OUTPUTS: usize = 1;
const YOLOV8_BOX_FIELDS: usize = 4;
const YOLOV8_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLOV8_MAX_INPUT_SIZE: u32 = 4096;
const YOLOV8_DEFAULT_CONFIDENCE: f32 = 0.25;
const YOLOV8_DEFAULT_IOU: f32 = 0.7;
const YOLOV8_DEFAULT_MAX_DETECTIONS: usize = 300;
const YOLOV8_DEFAULT_INTRA_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(ort::Error),
  #[error("输出形状错误: {0}")]
  ShapeError(ndarray::ShapeError),
  #[error("推理会话已损坏")]
  SessionPoisoned,
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<std::io::Error> for Yolov8Error {
  fn from(err: std::io::Error) -> Self {
    Yolov8Error::ModelLoadError(err)
  }
}

impl From<ort::Error> for Yolov8Error {
  fn from(err: ort::Error) -> Self {
    Yolov8Error::OrtError(err)
  }
}

impl From<ndarray::ShapeError> for Yolov8Error {
  fn from(err: ndarray::ShapeError) -> Self {
    Yolov8Error::ShapeError(err)
  }
}

/// ultralytics 导出的 YOLOv8 检测模型
///
/// ONNX Runtime 的会话在推理时需要可变借用，这里用互斥锁包裹，
/// 同一时刻只处理一张图像。
pub struct Yolov8 {
  session: Mutex<Session>,
  names: LabelTable,
  input_size: u32,
  confidence: f32,
  iou: f32,
  max_detections: usize,
}

pub struct Yolov8Builder {
  model_path: PathBuf,
  confidence: f32,
  iou: f32,
  max_detections: usize,
  intra_threads: usize,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Yolov8Builder::new(url.path()))
  }
}

impl Yolov8Builder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Yolov8Builder {
      model_path: model_path.as_ref().to_path_buf(),
      confidence: YOLOV8_DEFAULT_CONFIDENCE,
      iou: YOLOV8_DEFAULT_IOU,
      max_detections: YOLOV8_DEFAULT_MAX_DETECTIONS,
      intra_threads: YOLOV8_DEFAULT_INTRA_THREADS,
    }
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.iou = iou;
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn intra_threads(mut self, intra_threads: usize) -> Self {
    self.intra_threads = intra_threads;
    self
  }

  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_size = std::fs::metadata(&self.model_path)?.len();
    debug!(
      "模型文件大小: {:.2} MB",
      model_size as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(&self.model_path)?;

    if session.outputs.len() != YOLOV8_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        YOLOV8_NUM_OUTPUTS,
        session.outputs.len()
      );
      return Err(Yolov8Error::ModelInvalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        YOLOV8_NUM_OUTPUTS,
        session.outputs.len()
      )));
    }

    let (names, input_size) = {
      let metadata = session.metadata()?;
      let names = match metadata.custom("names")? {
        Some(raw) => parse_names_metadata(&raw).unwrap_or_else(|| {
          warn!("无法解析模型中的类别表: {}，使用 NEU-DET 默认类别", raw);
          LabelTable::neu_det()
        }),
        None => {
          warn!("模型未携带类别表，使用 NEU-DET 默认类别");
          LabelTable::neu_det()
        }
      };
      let input_size = metadata
        .custom("imgsz")?
        .and_then(|raw| parse_imgsz_metadata(&raw))
        .unwrap_or(YOLOV8_DEFAULT_INPUT_SIZE);
      (names, input_size)
    };

    debug!("模型类别数量: {}", names.iter().count());
    debug!("模型输入尺寸: {}x{}", input_size, input_size);
    info!("模型加载完成");

    Ok(Yolov8 {
      session: Mutex::new(session),
      names,
      input_size,
      confidence: self.confidence,
      iou: self.iou,
      max_detections: self.max_detections,
    })
  }
}

impl Yolov8 {
  pub fn names(&self) -> &LabelTable {
    &self.names
  }

  /// 缩放到模型输入尺寸并转为 NCHW、[0, 1] 的浮点数据
  fn preprocess(&self, image: &RgbImage) -> Vec<f32> {
    let size = self.input_size;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let plane = size as usize * size as usize;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = y as usize * size as usize + x as usize;
      data[idx] = pixel[0] as f32 / 255.0;
      data[plane + idx] = pixel[1] as f32 / 255.0;
      data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }
    data
  }
}

impl Model for Yolov8 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = Yolov8Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let size = self.input_size as i64;
    let input_tensor = Tensor::<f32>::from_array((vec![1, 3, size, size], self.preprocess(input)))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| Yolov8Error::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session.run(ort::inputs![input_tensor])?;

    debug!("获取模型输出");
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    if dims.len() != 3 || dims[1] <= YOLOV8_BOX_FIELDS {
      return Err(Yolov8Error::ModelInvalid(format!(
        "输出形状不符合 [1, 4 + nc, N]: {:?}",
        dims
      )));
    }
    let view = ArrayViewD::from_shape(IxDyn(&dims), data)?;
    let view = view
      .index_axis(Axis(0), 0)
      .into_dimensionality::<ndarray::Ix2>()?;

    let items = postprocess(
      view,
      self.input_size as f32,
      self.confidence,
      self.iou,
      self.max_detections,
    );

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      names: self.names.clone(),
    })
  }
}

/// 解码 `[4 + nc, N]` 的输出，依次为中心点、宽高和各类别分数
fn postprocess(
  output: ArrayView2<f32>,
  input_size: f32,
  confidence: f32,
  iou: f32,
  max_detections: usize,
) -> Vec<DetectItem> {
  debug!("后处理模型输出");
  let num_candidates = output.shape()[1];
  let mut items = Vec::new();

  for i in 0..num_candidates {
    let column = output.column(i);
    let Some((class_id, score)) = column
      .iter()
      .skip(YOLOV8_BOX_FIELDS)
      .copied()
      .enumerate()
      .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    else {
      continue;
    };

    if score.is_nan() || score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [
        ((cx - w / 2.0) / input_size).clamp(0.0, 1.0),
        ((cy - h / 2.0) / input_size).clamp(0.0, 1.0),
        ((cx + w / 2.0) / input_size).clamp(0.0, 1.0),
        ((cy + h / 2.0) / input_size).clamp(0.0, 1.0),
      ],
    });
  }

  let mut items = nms(items, iou);
  items.truncate(max_detections);
  debug!("检测到 {} 个物体", items.len());
  items
}

/// 按类别的非极大值抑制，结果按置信度降序
fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

  let mut result: Vec<DetectItem> = Vec::new();
  for item in items {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == item.class_id && iou(&kept.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      result.push(item);
    }
  }
  result
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 解析 ultralytics 写入 ONNX 元数据的类别表，形如 `{0: 'crazing', 1: 'inclusion'}`
pub fn parse_names_metadata(raw: &str) -> Option<LabelTable> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
  let mut entries = Vec::new();
  for entry in body.split(',').map(str::trim).filter(|e| !e.is_empty()) {
    let (id, name) = entry.split_once(':')?;
    let id = id.trim().parse::<u32>().ok()?;
    let name = name.trim();
    let name = name
      .strip_prefix('\'')
      .and_then(|n| n.strip_suffix('\''))
      .or_else(|| name.strip_prefix('"').and_then(|n| n.strip_suffix('"')))
      .unwrap_or(name);
    entries.push((id, name.to_string()));
  }
  if entries.is_empty() {
    return None;
  }
  Some(entries.into_iter().collect())
}

/// 解析 `imgsz` 元数据，形如 `[640, 640]`，只支持不超过 4096 的方形输入
fn parse_imgsz_metadata(raw: &str) -> Option<u32> {
  let body = raw.trim().trim_start_matches('[').trim_end_matches(']');
  let mut sizes = body.split(',').map(|s| s.trim().parse::<u32>());
  let h = sizes.next()?.ok()?;
  let w = match sizes.next() {
    Some(w) => w.ok()?,
    None => h,
  };
  (h == w && h > 0 && h <= YOLOV8_MAX_INPUT_SIZE).then_some(h)
}
