// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/output/markdown.rs - Markdown 格式的检测报告
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

use std::fmt::Write;

use crate::inspect::Inspection;

pub const NO_DEFECTS_MESSAGE: &str = "No defects detected.";
pub const NO_KNOWLEDGE_MESSAGE: &str = "No information found for this defect.";

pub fn render_markdown(inspection: &Inspection) -> String {
  let mut out = String::new();
  // 写入 String 不会失败
  let _ = write_markdown(&mut out, inspection);
  out
}

fn write_markdown(out: &mut String, inspection: &Inspection) -> std::fmt::Result {
  writeln!(out, "## Detected Defects & Technical Details")?;
  writeln!(
    out,
    "_Inspected at {} in {:.2?}_",
    inspection.inspected_at.format("%Y-%m-%d %H:%M:%S"),
    inspection.elapsed
  )?;
  writeln!(out, "_Total detections: {}_", inspection.detection_count)?;
  writeln!(out)?;

  if inspection.is_clean() {
    writeln!(out, "{}", NO_DEFECTS_MESSAGE)?;
    return Ok(());
  }

  for finding in &inspection.findings {
    writeln!(out, "### {}", finding.label)?;
    for (idx, score) in finding.scores.iter().enumerate() {
      writeln!(out, "- Confidence {}: **{:.2}**", idx + 1, score)?;
    }
    match &finding.knowledge {
      Some(entry) => {
        writeln!(out, "**Cause:** {}", entry.cause)?;
        writeln!(out, "**Prevention:** {}", entry.prevention)?;
      }
      None => writeln!(out, "> Warning: {}", NO_KNOWLEDGE_MESSAGE)?,
    }
    writeln!(out)?;
  }
  Ok(())
}
