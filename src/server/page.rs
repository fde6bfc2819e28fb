// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/server/page.rs - 页面渲染
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

use std::{fmt::Write, io::Cursor};

use base64::{Engine, prelude::BASE64_STANDARD};
use image::ImageFormat;

use crate::{
  input::SUPPORTED_EXTENSIONS,
  inspect::Inspection,
  output::markdown::{NO_DEFECTS_MESSAGE, NO_KNOWLEDGE_MESSAGE},
};

pub const UPLOAD_HINT: &str =
  "Please upload a valid image file (jpg, jpeg, png, bmp, tiff, webp).";

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 0; }
.block-container { padding: 1rem 2rem; }
h1, h2 { color: #0a3d62; text-align: center; }
.columns { display: flex; gap: 2rem; }
.columns .image { flex: 1; }
.columns .details { flex: 1.3; }
.columns img { width: 100%; }
button { background-color: #0a3d62; color: white; border-radius: 10px; padding: 10px; border: none; }
label { color: #0a3d62; font-weight: bold; }
.info { background: #e8f0fe; padding: 0.75rem; border-radius: 6px; }
.warning { background: #fff4e5; padding: 0.75rem; border-radius: 6px; }
.error { background: #fdecea; padding: 0.75rem; border-radius: 6px; }
.success { background: #e6f4ea; padding: 0.75rem; border-radius: 6px; }
"#;

pub fn index_page() -> String {
  layout(&format!(
    "<p class=\"info\">{}</p>",
    escape_html(UPLOAD_HINT)
  ))
}

pub fn upload_hint_page(message: &str) -> String {
  layout(&format!(
    "<p class=\"warning\">{}</p><p class=\"info\">{}</p>",
    escape_html(message),
    escape_html(UPLOAD_HINT)
  ))
}

pub fn error_page(message: &str) -> String {
  layout(&format!(
    "<p class=\"error\">Error processing image: {}</p>",
    escape_html(message)
  ))
}

pub fn results_page(inspection: &Inspection) -> Result<String, image::ImageError> {
  let mut png = Vec::new();
  inspection
    .annotated
    .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

  let mut details = String::new();
  // 写入 String 不会失败
  let _ = write_details(&mut details, inspection);

  Ok(layout(&format!(
    concat!(
      "<div class=\"columns\">",
      "<div class=\"image\"><img alt=\"Detected Defects\" src=\"data:image/png;base64,{}\">",
      "<p>Detected Defects</p></div>",
      "<div class=\"details\">{}</div>",
      "</div>"
    ),
    BASE64_STANDARD.encode(&png),
    details
  )))
}

fn write_details(out: &mut String, inspection: &Inspection) -> std::fmt::Result {
  write!(out, "<h2>Detected Defects &amp; Technical Details</h2>")?;
  write!(
    out,
    "<p><small>Inspected at {} in {:.2?}</small></p>",
    inspection.inspected_at.format("%Y-%m-%d %H:%M:%S"),
    inspection.elapsed
  )?;
  write!(
    out,
    "<p>Total detections: <strong>{}</strong></p>",
    inspection.detection_count
  )?;

  if inspection.is_clean() {
    write!(out, "<p class=\"success\">{}</p>", NO_DEFECTS_MESSAGE)?;
    return Ok(());
  }

  for finding in &inspection.findings {
    write!(out, "<h3>{}</h3><ul>", escape_html(&finding.label))?;
    for (idx, score) in finding.scores.iter().enumerate() {
      write!(
        out,
        "<li>Confidence {}: <strong>{:.2}</strong></li>",
        idx + 1,
        score
      )?;
    }
    write!(out, "</ul>")?;
    match &finding.knowledge {
      Some(entry) => {
        write!(
          out,
          "<p><strong>Cause:</strong> {}</p><p><strong>Prevention:</strong> {}</p>",
          escape_html(&entry.cause),
          escape_html(&entry.prevention)
        )?;
      }
      None => write!(out, "<p class=\"warning\">{}</p>", NO_KNOWLEDGE_MESSAGE)?,
    }
  }
  Ok(())
}

fn layout(content: &str) -> String {
  let accept = SUPPORTED_EXTENSIONS
    .iter()
    .map(|ext| format!(".{}", ext))
    .collect::<Vec<_>>()
    .join(",");

  format!(
    concat!(
      "<!DOCTYPE html><html><head><meta charset=\"utf-8\">",
      "<title>NIT Warangal | Steel Surface Defect Detection</title>",
      "<style>{style}</style></head><body><div class=\"block-container\">",
      "<h1>National Institute of Technology, Warangal</h1>",
      "<h2>AI-Based Steel Surface Defect Detection System</h2>",
      "<p>Upload an image of a <strong>hot rolled steel strip</strong> to detect and classify ",
      "surface defects using a <strong>YOLOv8 deep learning model</strong>.</p>",
      "<form action=\"/inspect\" method=\"post\" enctype=\"multipart/form-data\">",
      "<label for=\"image\">Upload Image</label> ",
      "<input type=\"file\" id=\"image\" name=\"image\" accept=\"{accept}\" required> ",
      "<button type=\"submit\">Detect</button></form>",
      "{content}</div></body></html>"
    ),
    style = STYLE,
    accept = accept,
    content = content
  )
}

fn escape_html(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn escapes_markup() {
    assert_eq!(
      escape_html("<b>\"a\" & 'b'</b>"),
      "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
    );
  }

  #[test]
  fn error_page_escapes_message() {
    let page = error_page("bad <input>");
    assert!(page.contains("Error processing image: bad &lt;input&gt;"));
    assert!(page.contains("<form"));
  }

  #[test]
  fn form_accepts_supported_types() {
    let page = index_page();
    assert!(page.contains("accept=\".jpg,.jpeg,.png,.bmp,.tiff,.webp\""));
    assert!(page.contains(UPLOAD_HINT));
  }
}
