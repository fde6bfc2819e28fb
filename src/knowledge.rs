// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/knowledge.rs - 缺陷知识库
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

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum KnowledgeError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("知识库格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
}

/// 一条缺陷知识：成因与预防措施
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
  #[serde(rename = "Cause")]
  pub cause: String,
  #[serde(rename = "Prevention")]
  pub prevention: String,
}

const BUILTIN_KNOWLEDGE: [(&str, &str, &str); 6] = [
  (
    "Crazing",
    "Tensile stress beyond material limit due to cooling issues or high rolling speed.",
    "Optimize rolling speed and ensure uniform cooling.",
  ),
  (
    "Patches",
    "Local oxidation or improper cleaning before rolling.",
    "Maintain surface cleanliness and control mill scale formation.",
  ),
  (
    "Pitted_surface",
    "Localized corrosion or trapped air bubbles during rolling.",
    "Improve descaling processes and surface inspection.",
  ),
  (
    "Rolled-in_scale",
    "Oxide scales not removed properly before rolling.",
    "Enhance descaling efficiency and pre-cleaning.",
  ),
  (
    "Scratches",
    "Abrasive particles or improper handling.",
    "Maintain clean rollers and handling equipment.",
  ),
  (
    "Inclusion",
    "Non-metallic particles embedded during manufacturing.",
    "Use high-quality raw materials and controlled processing.",
  ),
];

/// 只读的缺陷知识库，启动时构建一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
  entries: BTreeMap<String, KnowledgeEntry>,
}

impl Default for KnowledgeBase {
  fn default() -> Self {
    Self::builtin()
  }
}

impl KnowledgeBase {
  pub fn builtin() -> Self {
    let entries = BUILTIN_KNOWLEDGE
      .iter()
      .map(|(key, cause, prevention)| {
        (
          key.to_string(),
          KnowledgeEntry {
            cause: cause.to_string(),
            prevention: prevention.to_string(),
          },
        )
      })
      .collect();
    Self { entries }
  }

  /// 从 JSON 文件加载，格式与内置表一致：
  /// `{ "Crazing": { "Cause": "...", "Prevention": "..." } }`
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
    let path = path.as_ref();
    info!("加载缺陷知识库: {}", path.display());
    let data = std::fs::read_to_string(path)?;
    let kb = Self::from_json_str(&data)?;
    debug!("知识库条目数量: {}", kb.len());
    Ok(kb)
  }

  pub fn from_json_str(data: &str) -> Result<Self, KnowledgeError> {
    let entries: BTreeMap<String, KnowledgeEntry> = serde_json::from_str(data)?;
    Ok(Self { entries })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// 归一化标签后查表，未收录时返回 `None`
  pub fn lookup(&self, label: &str) -> Option<&KnowledgeEntry> {
    self.entries.get(&normalize_label(label))
  }
}

/// 标签归一化：去除首尾空白，空格替换为 `_`，首字母大写、其余字母小写。
///
/// 只对整个字符串的首字母做大写，不是逐词处理，
/// 例如 `"Rolled-In Scale"` 会得到 `"Rolled-in_scale"`。
pub fn normalize_label(label: &str) -> String {
  let key = label.trim().replace(' ', "_");
  let mut chars = key.chars();
  match chars.next() {
    Some(first) => first
      .to_uppercase()
      .chain(chars.flat_map(char::to_lowercase))
      .collect(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_label_pairs() {
    let cases = [
      ("crazing", "Crazing"),
      ("Crazing", "Crazing"),
      ("  patches  ", "Patches"),
      ("pitted surface", "Pitted_surface"),
      ("pitted_surface", "Pitted_surface"),
      ("rolled-in_scale", "Rolled-in_scale"),
      ("ROLLED-IN SCALE", "Rolled-in_scale"),
      ("Rolled-In Scale", "Rolled-in_scale"),
      ("Pitted Surface", "Pitted_surface"),
      ("", ""),
      ("   ", ""),
    ];
    for (input, expected) in cases {
      assert_eq!(normalize_label(input), expected, "input: {:?}", input);
    }
  }

  #[test]
  fn internal_capitals_are_folded() {
    // 逐词大写的键永远匹配不上
    let kb = KnowledgeBase::from_json_str(
      r#"{ "Pitted_Surface": { "Cause": "c", "Prevention": "p" } }"#,
    )
    .unwrap();
    assert!(kb.lookup("Pitted_Surface").is_none());
    assert!(kb.lookup("pitted surface").is_none());
  }

  #[test]
  fn lookup_crazing_returns_configured_pair() {
    let kb = KnowledgeBase::builtin();
    let entry = kb.lookup("Crazing").unwrap();
    assert_eq!(
      entry.cause,
      "Tensile stress beyond material limit due to cooling issues or high rolling speed."
    );
    assert_eq!(
      entry.prevention,
      "Optimize rolling speed and ensure uniform cooling."
    );
  }

  #[test]
  fn lookup_model_labels() {
    let kb = KnowledgeBase::builtin();
    for label in crate::model::NEU_DET_LABELS {
      assert!(kb.lookup(label).is_some(), "missing: {}", label);
    }
  }

  #[test]
  fn lookup_unknown_label_is_a_miss() {
    let kb = KnowledgeBase::builtin();
    assert!(kb.lookup("Unknown_defect").is_none());
  }

  #[test]
  fn loads_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.json");
    std::fs::write(
      &path,
      r#"{ "Waves": { "Cause": "Uneven roll gap.", "Prevention": "Calibrate rolls." } }"#,
    )
    .unwrap();

    let kb = KnowledgeBase::from_json_file(&path).unwrap();
    assert_eq!(kb.len(), 1);
    assert_eq!(kb.lookup("waves").unwrap().prevention, "Calibrate rolls.");
    assert!(kb.lookup("Crazing").is_none());
  }

  #[test]
  fn rejects_malformed_json() {
    assert!(matches!(
      KnowledgeBase::from_json_str(r#"{ "Waves": { "Cause": "x" } }"#),
      Err(KnowledgeError::FormatError(_))
    ));
  }
}
