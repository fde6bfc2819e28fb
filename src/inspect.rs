// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/inspect.rs - 单张图像的检测流程
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

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  input::{ImageFileInputError, decode_upload},
  knowledge::{KnowledgeBase, KnowledgeEntry},
  model::{DetectResult, Model},
  output::draw::Draw,
  report::{AggregateError, DefectReport, aggregate},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum InspectError {
  #[error("could not decode image: {0}")]
  Decode(#[from] ImageFileInputError),
  #[error("model inference failed")]
  Inference(#[source] BoxError),
  #[error("could not summarize detections: {0}")]
  Aggregate(#[from] AggregateError),
}

/// 一个类别的检测结果及其知识库条目
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
  pub label: String,
  pub scores: Vec<f32>,
  pub knowledge: Option<KnowledgeEntry>,
}

#[derive(Debug, Clone)]
pub struct Inspection {
  pub annotated: RgbImage,
  pub report: DefectReport,
  pub findings: Vec<Finding>,
  pub detection_count: usize,
  pub elapsed: Duration,
  pub inspected_at: DateTime<Local>,
}

impl Inspection {
  pub fn is_clean(&self) -> bool {
    self.report.is_empty()
  }
}

/// 持有检测器与知识库，进程内只构建一次
pub struct Inspector<M> {
  model: M,
  knowledge: KnowledgeBase,
  draw: Draw,
}

impl<M> Inspector<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: Into<BoxError>,
{
  pub fn new(model: M, knowledge: KnowledgeBase, draw: Draw) -> Self {
    Self {
      model,
      knowledge,
      draw,
    }
  }

  pub fn inspect_bytes(&self, bytes: &[u8]) -> Result<Inspection, InspectError> {
    let image = decode_upload(bytes)?;
    self.inspect_image(&image)
  }

  pub fn inspect_image(&self, image: &RgbImage) -> Result<Inspection, InspectError> {
    info!("开始推理 {}x{}", image.width(), image.height());
    let now = Instant::now();
    let result = self
      .model
      .infer(image)
      .map_err(|e| {
        let e: BoxError = e.into();
        error!("推理失败: {}", e);
        InspectError::Inference(e)
      })?;
    let elapsed = now.elapsed();
    info!(
      "推理完成，耗时: {:.2?}，检测到 {} 个缺陷",
      elapsed,
      result.items.len()
    );

    let report = aggregate(&result)?;
    let findings = pair_with_knowledge(&report, &self.knowledge);
    let annotated = self.draw.annotate(image, &result);

    Ok(Inspection {
      annotated,
      report,
      findings,
      detection_count: result.items.len(),
      elapsed,
      inspected_at: Local::now(),
    })
  }
}

/// 按报告顺序为每个类别查找知识库，未收录的类别不影响其他类别
pub fn pair_with_knowledge(report: &DefectReport, knowledge: &KnowledgeBase) -> Vec<Finding> {
  report
    .iter()
    .map(|(label, scores)| {
      let entry = knowledge.lookup(label).cloned();
      if entry.is_none() {
        warn!("知识库中没有缺陷 {} 的信息", label);
      }
      Finding {
        label: label.to_string(),
        scores: scores.to_vec(),
        knowledge: entry,
      }
    })
    .collect()
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::model::{DetectItem, LabelTable};
  use image::{ImageFormat, Rgb};
  use std::io::Cursor;

  /// 返回固定结果的检测器
  pub(crate) struct FakeModel {
    pub items: Vec<(f32, u32)>,
    pub names: LabelTable,
  }

  impl FakeModel {
    pub(crate) fn empty() -> Self {
      Self {
        items: Vec::new(),
        names: LabelTable::neu_det(),
      }
    }
  }

  impl Model for FakeModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = std::io::Error;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(DetectResult {
        items: self
          .items
          .iter()
          .map(|&(score, class_id)| DetectItem {
            class_id,
            score,
            bbox: [0.1, 0.1, 0.5, 0.5],
          })
          .collect(),
        names: self.names.clone(),
      })
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = std::io::Error;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err(std::io::Error::other("session crashed"))
    }
  }

  pub(crate) fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]))
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    bytes
  }

  fn inspector<M>(model: M) -> Inspector<M>
  where
    M: Model<Input = RgbImage, Output = DetectResult>,
    M::Error: Into<BoxError>,
  {
    Inspector::new(model, KnowledgeBase::builtin(), Draw::default())
  }

  #[test]
  fn findings_follow_report_order() {
    let model = FakeModel {
      items: vec![(0.91, 0), (0.40, 2), (0.77, 0)],
      names: LabelTable::neu_det(),
    };
    let inspection = inspector(model).inspect_bytes(&png_bytes()).unwrap();

    assert_eq!(inspection.detection_count, 3);
    let labels: Vec<_> = inspection.findings.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, vec!["crazing", "patches"]);
    assert_eq!(inspection.findings[0].scores, vec![0.91, 0.77]);
    assert_eq!(
      inspection.findings[1].knowledge.as_ref().map(|k| k.cause.as_str()),
      Some("Local oxidation or improper cleaning before rolling.")
    );
    assert_eq!(inspection.annotated.dimensions(), (32, 32));
  }

  #[test]
  fn unknown_label_has_no_knowledge_but_others_do() {
    let model = FakeModel {
      items: vec![(0.5, 0), (0.6, 1)],
      names: [(0, "Unknown_defect"), (1, "Scratches")].into_iter().collect(),
    };
    let inspection = inspector(model).inspect_bytes(&png_bytes()).unwrap();

    assert!(inspection.findings[0].knowledge.is_none());
    assert!(inspection.findings[1].knowledge.is_some());
  }

  #[test]
  fn zero_detections_is_a_clean_report() {
    let inspection = inspector(FakeModel::empty())
      .inspect_bytes(&png_bytes())
      .unwrap();
    assert!(inspection.is_clean());
    assert!(inspection.findings.is_empty());
  }

  #[test]
  fn decode_failure_is_reported() {
    let err = inspector(FakeModel::empty())
      .inspect_bytes(b"not an image")
      .unwrap_err();
    assert!(matches!(err, InspectError::Decode(_)));
  }

  #[test]
  fn inference_failure_is_reported() {
    let err = inspector(FailingModel)
      .inspect_bytes(&png_bytes())
      .unwrap_err();
    assert!(matches!(err, InspectError::Inference(_)));
    assert_eq!(err.to_string(), "model inference failed");
    assert_eq!(
      std::error::Error::source(&err).map(|s| s.to_string()),
      Some("session crashed".to_string())
    );
  }

  #[test]
  fn unresolved_class_is_reported() {
    let model = FakeModel {
      items: vec![(0.5, 42)],
      names: LabelTable::neu_det(),
    };
    let err = inspector(model).inspect_bytes(&png_bytes()).unwrap_err();
    assert!(matches!(
      err,
      InspectError::Aggregate(AggregateError::UnknownClass(42))
    ));
  }
}
