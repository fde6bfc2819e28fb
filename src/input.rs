// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/input.rs - 图像输入
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

use std::io::Cursor;

use image::{ImageReader, RgbImage};
use tracing::debug;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 允许上传的图像扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// 按文件名的扩展名判断是否为支持的图像类型（不区分大小写）
pub fn is_supported_upload(file_name: &str) -> bool {
  std::path::Path::new(file_name)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      SUPPORTED_EXTENSIONS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(ext))
    })
    .unwrap_or(false)
}

/// 按内容识别格式并解码为 RGB 图像
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::new(Cursor::new(bytes))
    .with_guessed_format()?
    .decode()?
    .to_rgb8();
  debug!("解码上传图像: {}x{}", image.width(), image.height());
  Ok(image)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageFormat, Rgb};

  #[test]
  fn supported_extensions() {
    for name in [
      "strip.jpg",
      "strip.JPEG",
      "a/b/strip.png",
      "strip.bmp",
      "strip.tiff",
      "strip.webp",
    ] {
      assert!(is_supported_upload(name), "{}", name);
    }
    for name in ["strip.gif", "strip", "strip.tif.txt", ""] {
      assert!(!is_supported_upload(name), "{}", name);
    }
  }

  #[test]
  fn decodes_png_bytes() {
    let image = RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();

    let decoded = decode_upload(&bytes).unwrap();
    assert_eq!(decoded.dimensions(), (8, 4));
    assert_eq!(decoded.get_pixel(3, 2), &Rgb([10, 20, 30]));
  }

  #[test]
  fn rejects_garbage() {
    assert!(decode_upload(b"<html>not an image</html>").is_err());
  }
}
