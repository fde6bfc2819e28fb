// 该文件是 Steelscan （钢带表面缺陷检测） 项目的一部分。
// src/provision.rs - 模型文件下载与缓存
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
  io::Write,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

/// 模型文件的最小字节数，低于此值视为错误页面之类的无效内容
pub const MIN_ARTIFACT_BYTES: u64 = 1_000_000;

/// 默认下载地址，需提供 ultralytics 导出的 ONNX 模型（不是 `.pt` 权重）
pub const DEFAULT_MODEL_URL: &str = "https://github.com/Nandan98490456/Defect/raw/main/best.onnx";
pub const DEFAULT_MODEL_PATH: &str = "best.onnx";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ProvisionError {
  #[error("模型下载失败: {url} 返回状态码 {status}")]
  DownloadFailed { url: String, status: u16 },
  #[error("下载的模型文件过小（{size} 字节），可能无效")]
  InvalidArtifact { size: u64 },
  #[error("网络错误: {0}")]
  Transport(BoxError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型加载失败: {0}")]
  Load(BoxError),
}

/// 一次完整读取到内存中的响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

pub trait Fetch {
  fn fetch(&self, url: &Url) -> Result<FetchResponse, BoxError>;
}

/// 基于 reqwest 阻塞客户端的下载器，不设超时，不重试
pub struct HttpFetch {
  client: reqwest::blocking::Client,
}

impl HttpFetch {
  pub fn new() -> Result<Self, ProvisionError> {
    let client = reqwest::blocking::Client::builder()
      .timeout(None)
      .build()
      .map_err(|e| ProvisionError::Transport(Box::new(e)))?;
    Ok(Self { client })
  }
}

impl Fetch for HttpFetch {
  fn fetch(&self, url: &Url) -> Result<FetchResponse, BoxError> {
    let response = self.client.get(url.as_str()).send()?;
    let status = response.status().as_u16();
    let body = response.bytes()?.to_vec();
    Ok(FetchResponse { status, body })
  }
}

pub struct ModelProvisioner<F> {
  fetcher: F,
  url: Url,
  target: PathBuf,
}

impl<F: Fetch> ModelProvisioner<F> {
  pub fn new(fetcher: F, url: Url, target: impl AsRef<Path>) -> Self {
    Self {
      fetcher,
      url,
      target: target.as_ref().to_path_buf(),
    }
  }

  /// 确保本地存在模型文件并交给 `load` 构造检测器
  pub fn provision<M, E, L>(&self, load: L) -> Result<M, ProvisionError>
  where
    L: FnOnce(&Path) -> Result<M, E>,
    E: Into<BoxError>,
  {
    let path = self.ensure_artifact()?;
    load(&path).map_err(|e| ProvisionError::Load(e.into()))
  }

  /// 已存在的文件直接使用，不再校验
  pub fn ensure_artifact(&self) -> Result<PathBuf, ProvisionError> {
    if self.target.exists() {
      info!("使用已缓存的模型文件: {}", self.target.display());
      return Ok(self.target.clone());
    }

    info!("正在下载模型: {}", self.url);
    let response = self
      .fetcher
      .fetch(&self.url)
      .map_err(ProvisionError::Transport)?;

    if response.status != 200 {
      error!("模型下载失败，状态码: {}", response.status);
      return Err(ProvisionError::DownloadFailed {
        url: self.url.to_string(),
        status: response.status,
      });
    }

    let partial = self.partial_path();
    let written = self
      .write_checked(&partial, &response.body)
      .and_then(|()| std::fs::rename(&partial, &self.target).map_err(ProvisionError::from));
    if let Err(e) = written {
      if partial.exists()
        && let Err(rm) = std::fs::remove_file(&partial)
      {
        warn!("无法删除临时文件 {}: {}", partial.display(), rm);
      }
      return Err(e);
    }

    info!(
      "模型已保存到 {} ({:.2} MB)",
      self.target.display(),
      response.body.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(self.target.clone())
  }

  fn partial_path(&self) -> PathBuf {
    let mut name = self
      .target
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_default();
    name.push(".part");
    self.target.with_file_name(name)
  }

  fn write_checked(&self, path: &Path, body: &[u8]) -> Result<(), ProvisionError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;
    file.write_all(body)?;
    file.sync_all()?;

    let size = std::fs::metadata(path)?.len();
    debug!("下载文件大小: {} 字节", size);
    if size < MIN_ARTIFACT_BYTES {
      error!("下载的模型文件过小: {} 字节", size);
      return Err(ProvisionError::InvalidArtifact { size });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::Cell;

  struct FakeFetch {
    status: u16,
    size: usize,
    calls: Cell<usize>,
  }

  impl FakeFetch {
    fn new(status: u16, size: usize) -> Self {
      Self {
        status,
        size,
        calls: Cell::new(0),
      }
    }
  }

  impl Fetch for &FakeFetch {
    fn fetch(&self, _url: &Url) -> Result<FetchResponse, BoxError> {
      self.calls.set(self.calls.get() + 1);
      Ok(FetchResponse {
        status: self.status,
        body: vec![0x5a; self.size],
      })
    }
  }

  struct BrokenFetch;

  impl Fetch for BrokenFetch {
    fn fetch(&self, _url: &Url) -> Result<FetchResponse, BoxError> {
      Err("connection reset".into())
    }
  }

  fn url() -> Url {
    Url::parse(DEFAULT_MODEL_URL).unwrap()
  }

  fn load_len(path: &Path) -> Result<u64, std::io::Error> {
    Ok(std::fs::metadata(path)?.len())
  }

  #[test]
  fn cached_artifact_skips_network() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("best.onnx");
    std::fs::write(&target, b"cached").unwrap();

    let fetch = FakeFetch::new(200, 2_000_000);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    let len = provisioner.provision(load_len).unwrap();

    assert_eq!(fetch.calls.get(), 0);
    assert_eq!(len, 6);
  }

  #[test]
  fn download_writes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("models").join("best.onnx");

    let fetch = FakeFetch::new(200, 1_500_000);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    let len = provisioner.provision(load_len).unwrap();

    assert_eq!(fetch.calls.get(), 1);
    assert_eq!(len, 1_500_000);
    assert!(!provisioner.partial_path().exists());
  }

  #[test]
  fn non_success_status_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("best.onnx");

    let fetch = FakeFetch::new(404, 2_000_000);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    let err = provisioner.provision(load_len).unwrap_err();

    assert!(matches!(
      err,
      ProvisionError::DownloadFailed { status: 404, .. }
    ));
    assert!(!target.exists());
    assert!(!provisioner.partial_path().exists());
  }

  #[test]
  fn small_artifact_is_rejected_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("best.onnx");

    let fetch = FakeFetch::new(200, 999_999);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    let err = provisioner.provision(load_len).unwrap_err();

    assert!(matches!(
      err,
      ProvisionError::InvalidArtifact { size: 999_999 }
    ));
    assert!(!target.exists());
    assert!(!provisioner.partial_path().exists());
  }

  #[test]
  fn exactly_the_floor_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("best.onnx");

    let fetch = FakeFetch::new(200, MIN_ARTIFACT_BYTES as usize);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    assert!(provisioner.ensure_artifact().is_ok());
    assert!(target.exists());
  }

  #[test]
  fn failed_rename_removes_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    // 目标所在目录不存在，写入临时文件成功但重命名失败
    let target = dir.path().join("missing").join(".");

    let fetch = FakeFetch::new(200, 1_200_000);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    let err = provisioner.ensure_artifact().unwrap_err();

    assert_eq!(fetch.calls.get(), 1);
    assert!(matches!(err, ProvisionError::IoError(_)));
    assert!(!provisioner.partial_path().exists());
    assert!(!dir.path().join("missing").exists());
  }

  #[test]
  fn transport_error_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("best.onnx");

    let provisioner = ModelProvisioner::new(BrokenFetch, url(), &target);
    assert!(matches!(
      provisioner.ensure_artifact(),
      Err(ProvisionError::Transport(_))
    ));
    assert!(!target.exists());
  }

  #[test]
  fn loader_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("best.onnx");
    std::fs::write(&target, b"cached").unwrap();

    let fetch = FakeFetch::new(200, 0);
    let provisioner = ModelProvisioner::new(&fetch, url(), &target);
    let err = provisioner
      .provision(|_| Err::<(), _>(std::io::Error::other("bad model")))
      .unwrap_err();
    assert!(matches!(err, ProvisionError::Load(_)));
  }
}
