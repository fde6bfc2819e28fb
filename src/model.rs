// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/model.rs - 模型
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

use std::collections::BTreeMap;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

/// 类别编号到类别名称的映射
///
/// 每次推理都会携带一份，类别顺序属于模型自身的约定，
/// 不能假定为全局固定的枚举。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
  names: BTreeMap<u32, String>,
}

/// NEU-DET 数据集的类别（ultralytics 导出时的默认顺序）
pub const NEU_DET_LABELS: [&str; 6] = [
  "crazing",
  "inclusion",
  "patches",
  "pitted_surface",
  "rolled-in_scale",
  "scratches",
];

impl LabelTable {
  pub fn neu_det() -> Self {
    NEU_DET_LABELS
      .iter()
      .enumerate()
      .map(|(id, name)| (id as u32, *name))
      .collect()
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
    self.names.iter().map(|(id, name)| (*id, name.as_str()))
  }
}

impl<S: Into<String>> FromIterator<(u32, S)> for LabelTable {
  fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
    Self {
      names: iter
        .into_iter()
        .map(|(id, name)| (id, name.into()))
        .collect(),
    }
  }
}

/// 单次推理的结果：检测项（按推理返回的顺序）以及本次推理的类别表
#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub names: LabelTable,
}

impl DetectResult {
  pub fn label_of(&self, item: &DetectItem) -> Option<&str> {
    self.names.get(item.class_id)
  }
}

mod yolov8;
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error, parse_names_metadata};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn neu_det_table_resolves_every_class() {
    let names = LabelTable::neu_det();
    assert_eq!(names.iter().count(), 6);
    assert_eq!(names.get(0), Some("crazing"));
    assert_eq!(names.get(4), Some("rolled-in_scale"));
    assert_eq!(names.get(6), None);
  }

  #[test]
  fn label_of_uses_the_per_call_table() {
    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 1,
        score: 0.5,
        bbox: [0.0, 0.0, 1.0, 1.0],
      }]
      .into_boxed_slice(),
      names: [(0, "Crazing"), (1, "Patches")].into_iter().collect(),
    };
    assert_eq!(result.label_of(&result.items[0]), Some("Patches"));
  }
}
