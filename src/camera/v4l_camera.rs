// 该文件是 Wangyan （望眼） 项目的一部分。
// src/camera/v4l_camera.rs - V4L 摄像头
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

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use url::Url;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::{
  CameraController, CameraDescription, CameraError, CameraProvider, CaptureThread, FrameSink,
  LensDirection, ResolutionPreset, parse_rotation,
};
use crate::frame::CameraFrame;
use crate::geometry::{Rotation, Size};
use crate::{FromUrl, FromUrlWithScheme};

const V4L_BUFFER_COUNT: u32 = 4;

fn device_error(e: std::io::Error) -> CameraError {
  CameraError::Device(e.to_string())
}

/// 枚举 `/dev/video*` 节点；URL 给出具体路径时只使用该设备
pub struct V4lCameraProvider {
  device_path: Option<String>,
  rotation: Rotation,
}

impl FromUrlWithScheme for V4lCameraProvider {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lCameraProvider {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    // v4l:///dev/video0 或 v4l:// （枚举全部设备）
    let device_path = match url.path() {
      "" | "/" => None,
      _ => Some(crate::url_path(url).to_string_lossy().into_owned()),
    };

    Ok(Self {
      device_path,
      rotation: parse_rotation(url)?,
    })
  }
}

impl V4lCameraProvider {
  fn describe(&self, path: String, name: Option<String>) -> CameraDescription {
    CameraDescription {
      name: name.unwrap_or_else(|| path.clone()),
      uri: format!("v4l://{}", path),
      lens_direction: LensDirection::External,
      sensor_orientation: self.rotation,
    }
  }
}

impl CameraProvider for V4lCameraProvider {
  type Controller = V4lCamera;

  fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError> {
    if let Some(path) = &self.device_path {
      let device = Device::with_path(path).map_err(device_error)?;
      let name = device.query_caps().ok().map(|caps| caps.card);
      return Ok(vec![self.describe(path.clone(), name)]);
    }

    let cameras = v4l::context::enum_devices()
      .into_iter()
      .map(|node| {
        let path = node.path().to_string_lossy().into_owned();
        self.describe(path, node.name())
      })
      .collect::<Vec<_>>();
    debug!("发现 {} 个 V4L 设备", cameras.len());
    Ok(cameras)
  }

  fn open(
    &self,
    description: &CameraDescription,
    preset: ResolutionPreset,
  ) -> Result<Self::Controller, CameraError> {
    let device_path = description
      .uri
      .strip_prefix("v4l://")
      .unwrap_or(&description.uri)
      .to_string();
    info!("打开 V4L 设备: {}", device_path);

    let device = Device::with_path(&device_path).map_err(device_error)?;
    let size = configure_device(&device, preset.size())?;
    info!("V4L 设备分辨率: {}", size);

    Ok(V4lCamera {
      description: description.clone(),
      device_path,
      size,
      capture: None,
    })
  }
}

fn open_configured(device_path: &str, size: Size) -> Result<Device, CameraError> {
  let device = Device::with_path(device_path)
    .map_err(|e| CameraError::Device(format!("无法打开设备 {}: {}", device_path, e)))?;
  let configured = configure_device(&device, size)?;
  if configured != size {
    return Err(CameraError::Device(format!(
      "设备分辨率已变化: {} -> {}",
      size, configured
    )));
  }
  Ok(device)
}

/// 设置 YUYV 采集格式，返回驱动实际协商的尺寸
fn configure_device(device: &Device, size: Size) -> Result<Size, CameraError> {
  let mut format = device.format().map_err(device_error)?;
  format.width = size.width;
  format.height = size.height;
  format.fourcc = FourCC::new(b"YUYV");
  let format = device.set_format(&format).map_err(device_error)?;

  if format.fourcc != FourCC::new(b"YUYV") {
    return Err(CameraError::Device(format!(
      "不支持的像素格式: {}",
      format.fourcc
    )));
  }

  Ok(Size::new(format.width, format.height))
}

pub struct V4lCamera {
  description: CameraDescription,
  device_path: String,
  size: Size,
  capture: Option<CaptureThread>,
}

impl CameraController for V4lCamera {
  fn description(&self) -> &CameraDescription {
    &self.description
  }

  fn preview_size(&self) -> Size {
    self.size
  }

  fn start_image_stream(&mut self, mut sink: FrameSink) -> Result<(), CameraError> {
    if self.is_streaming() {
      return Err(CameraError::AlreadyStreaming);
    }

    let device_path = self.device_path.clone();
    let size = self.size;
    let rotation = self.description.sensor_orientation;

    // 采集线程完成设备打开与开流后回报结果，失败时在这里返回给调用方
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CameraError>>(1);

    let capture = CaptureThread::spawn("v4l-camera", move |stop| {
      // 流对设备的借用不离开本线程
      let device = match open_configured(&device_path, size) {
        Ok(device) => device,
        Err(e) => {
          let _ = ready_tx.send(Err(e));
          return;
        }
      };
      let mut stream = match Stream::with_buffers(&device, Type::VideoCapture, V4L_BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(e) => {
          let _ = ready_tx.send(Err(CameraError::Device(format!("无法创建捕获流: {}", e))));
          return;
        }
      };
      let _ = ready_tx.send(Ok(()));

      let start = Instant::now();
      let mut index = 0u64;
      while !stop.load(Ordering::SeqCst) {
        let rgb = match stream.next() {
          Ok((buffer, _meta)) => yuyv_to_rgb(buffer, size.width, size.height),
          Err(e) => {
            error!("无法捕获帧: {}", e);
            sink(Err(CameraError::Device(format!("无法捕获帧: {}", e))));
            break;
          }
        };

        let frame = match CameraFrame::from_rgb(size.width, size.height, rgb) {
          Ok(frame) => frame
            .with_index(index, start.elapsed().as_millis() as u64)
            .with_rotation(rotation),
          Err(e) => {
            warn!("丢弃不完整的帧: {}", e);
            continue;
          }
        };

        if !sink(Ok(frame)) {
          debug!("帧接收端已关闭，停止推流");
          break;
        }
        index += 1;
      }
    })?;

    match ready_rx.recv() {
      Ok(Ok(())) => {}
      Ok(Err(e)) => {
        error!("启动图像流失败: {}", e);
        return Err(e);
      }
      Err(_) => return Err(CameraError::Thread),
    }

    self.capture = Some(capture);
    Ok(())
  }

  fn stop_image_stream(&mut self) -> Result<(), CameraError> {
    match self.capture.take() {
      Some(mut capture) => capture.stop(),
      None => Ok(()),
    }
  }

  fn is_streaming(&self) -> bool {
    self.capture.as_ref().is_some_and(CaptureThread::is_running)
  }
}

/// 将 YUYV 格式转换为 RGB，输出长度固定为 `3 * width * height`
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let pixels = width as usize * height as usize;
  let mut rgb = Vec::with_capacity(pixels * 3);

  for chunk in yuyv.chunks_exact(4).take(pixels / 2) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  // 驱动给出的缓冲区偶尔偏短
  rgb.resize(pixels * 3, 0);
  rgb
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_grey_maps_to_grey() {
    let yuyv = [128u8, 128, 64, 128];
    let rgb = yuyv_to_rgb(&yuyv, 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn short_buffer_is_padded() {
    let rgb = yuyv_to_rgb(&[255, 128, 255, 128], 4, 1);
    assert_eq!(rgb.len(), 12);
    assert_eq!(&rgb[..6], &[255, 255, 255, 255, 255, 255]);
    assert_eq!(&rgb[6..], &[0, 0, 0, 0, 0, 0]);
  }

  #[test]
  fn url_selects_single_device() {
    let url = Url::parse("v4l:///dev/video2?rotation=90").unwrap();
    let provider = V4lCameraProvider::from_url(&url).unwrap();
    assert_eq!(provider.device_path.as_deref(), Some("/dev/video2"));
    assert_eq!(provider.rotation, Rotation::Deg90);

    let url = Url::parse("v4l://").unwrap();
    let provider = V4lCameraProvider::from_url(&url).unwrap();
    assert_eq!(provider.device_path, None);
  }
}
