// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/report.rs - 检测结果汇总
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

use thiserror::Error;
use tracing::debug;

use crate::model::DetectResult;

#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
  #[error("class id {0} is not in the label table of this inference")]
  UnknownClass(u32),
}

/// 按类别分组的置信度
///
/// 类别按首次出现的顺序排列，每个类别下的分数按检测顺序排列。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefectReport {
  groups: Vec<(String, Vec<f32>)>,
}

impl DefectReport {
  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  pub fn len(&self) -> usize {
    self.groups.len()
  }

  pub fn get(&self, label: &str) -> Option<&[f32]> {
    self
      .groups
      .iter()
      .find(|(l, _)| l == label)
      .map(|(_, scores)| scores.as_slice())
  }

  pub fn labels(&self) -> impl Iterator<Item = &str> {
    self.groups.iter().map(|(label, _)| label.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
    self
      .groups
      .iter()
      .map(|(label, scores)| (label.as_str(), scores.as_slice()))
  }

  fn push(&mut self, label: &str, score: f32) {
    match self.groups.iter_mut().find(|(l, _)| l == label) {
      Some((_, scores)) => scores.push(score),
      None => self.groups.push((label.to_string(), vec![score])),
    }
  }
}

/// 汇总一次推理的结果，不去重、不过滤、不排序
pub fn aggregate(result: &DetectResult) -> Result<DefectReport, AggregateError> {
  let mut report = DefectReport::default();
  for item in result.items.iter() {
    let label = result
      .label_of(item)
      .ok_or(AggregateError::UnknownClass(item.class_id))?;
    report.push(label, item.score);
  }
  debug!(
    "汇总 {} 个检测结果为 {} 个类别",
    result.items.len(),
    report.len()
  );
  Ok(report)
}
