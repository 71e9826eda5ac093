// 该文件是 Wangyan （望眼） 项目的一部分。
// src/screen.rs - 实时检测界面
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

//! # 实时检测界面
//!
//! 界面状态只在界面线程上修改。摄像头在采集线程上推送帧，推理在 [`InferenceWorker`]
//! 线程上完成，二者都通过 [`UiEvent`] 通道回到界面线程。
//!
//! - 按钮切换检测的开始与停止
//! - 应用进入后台时释放摄像头，回到前台时重新打开
//! - 推理进行中到达的帧直接丢弃，不排队
//! - 检测结果每次推理完成后整体替换，只由渲染读取

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::camera::{
  CameraController, CameraError, CameraProvider, ResolutionPreset, select_camera,
};
use crate::frame::CameraFrame;
use crate::geometry::{BoxScale, Rect, Rotation, Size};
use crate::model::{DetectResult, ModelConfig, ModelError, ModelLoader};
use crate::notify::{Notification, NotificationLevel, Notifications};

mod worker;
pub use self::worker::InferenceWorker;

pub const START_CAPTION: &str = "开始检测";
pub const STOP_CAPTION: &str = "停止检测";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleState {
  Resumed,
  Inactive,
  Hidden,
  Paused,
  Detached,
}

#[derive(Debug)]
pub struct InferenceOutcome {
  pub session: u64,
  pub frame_size: Size,
  pub rotation: Rotation,
  pub result: Result<DetectResult, ModelError>,
}

#[derive(Debug)]
pub enum UiEvent {
  ButtonPressed,
  Lifecycle(AppLifecycleState),
  /// 采集线程推送的帧，带有开流时的会话号
  Frame { session: u64, frame: CameraFrame },
  /// 图像流中途失败，采集线程已退出
  StreamFailed { session: u64, error: CameraError },
  InferenceDone(InferenceOutcome),
  Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Exit,
}

#[derive(Debug, Clone)]
pub struct ScreenConfig {
  pub preset: ResolutionPreset,
  pub notification_duration: Duration,
  /// 初始化完成后立即开始检测
  pub auto_start: bool,
}

impl Default for ScreenConfig {
  fn default() -> Self {
    Self {
      preset: ResolutionPreset::default(),
      notification_duration: Duration::from_secs(4),
      auto_start: false,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenStats {
  pub frames_received: u64,
  pub frames_dropped: u64,
  pub frames_processed: u64,
  pub inference_errors: u64,
}

/// 当前显示的检测结果，连同产生它的帧的尺寸与方向
#[derive(Debug, Clone)]
struct ActiveDetections {
  frame_size: Size,
  rotation: Rotation,
  result: DetectResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
  pub rect: Rect,
  pub caption: String,
  pub class_id: u32,
  pub score: f32,
}

/// 一次渲染所需的全部内容
#[derive(Debug)]
pub struct ScreenView<'a> {
  pub size: Size,
  pub preview: Option<&'a CameraFrame>,
  pub detections: Option<&'a DetectResult>,
  pub boxes: Vec<OverlayBox>,
  pub button: &'static str,
  pub notifications: Vec<&'a Notification>,
  pub stats: ScreenStats,
}

impl ScreenView<'_> {
  pub fn has_detections(&self) -> bool {
    !self.boxes.is_empty()
  }
}

pub fn caption(label: &str, score: f32) -> String {
  format!("{} {}%", label, (score * 100.0).round())
}

pub struct DetectionScreen<P: CameraProvider, L: ModelLoader> {
  provider: P,
  loader: L,
  model_config: ModelConfig,
  config: ScreenConfig,
  events: Sender<UiEvent>,
  camera: Option<P::Controller>,
  worker: Option<InferenceWorker>,
  lifecycle: AppLifecycleState,
  detecting: bool,
  busy: bool,
  session: u64,
  detections: Option<ActiveDetections>,
  preview: Option<Arc<CameraFrame>>,
  notifications: Notifications,
  stats: ScreenStats,
  dirty: bool,
}

impl<P: CameraProvider, L: ModelLoader> DetectionScreen<P, L> {
  pub fn new(
    provider: P,
    loader: L,
    model_config: ModelConfig,
    config: ScreenConfig,
    events: Sender<UiEvent>,
  ) -> Self {
    let notifications = Notifications::with_duration(config.notification_duration);
    Self {
      provider,
      loader,
      model_config,
      config,
      events,
      camera: None,
      worker: None,
      lifecycle: AppLifecycleState::Resumed,
      detecting: false,
      busy: false,
      session: 0,
      detections: None,
      preview: None,
      notifications,
      stats: ScreenStats::default(),
      dirty: true,
    }
  }

  /// 打开摄像头并加载模型，失败只产生通知
  pub fn init_state(&mut self) {
    self.init_camera();
    self.init_model();
    if self.config.auto_start && self.camera.is_some() && self.worker.is_some() {
      self.start_detection();
    }
    self.dirty = true;
  }

  fn init_camera(&mut self) -> bool {
    let opened = self.provider.available_cameras().and_then(|cameras| {
      let description = select_camera(&cameras)?;
      info!(
        "选择摄像头: {} ({:?}, 传感器方向 {}°)",
        description.name,
        description.lens_direction,
        description.sensor_orientation.degrees()
      );
      self.provider.open(description, self.config.preset)
    });

    match opened {
      Ok(camera) => {
        info!("摄像头已打开，预览尺寸 {}", camera.preview_size());
        self.camera = Some(camera);
        true
      }
      Err(e) => {
        self.notify(NotificationLevel::Error, format!("摄像头初始化失败: {}", e));
        false
      }
    }
  }

  fn init_model(&mut self) -> bool {
    let model = match self.loader.load_model(&self.model_config) {
      Ok(model) => model,
      Err(e) => {
        self.notify(NotificationLevel::Error, format!("模型加载失败: {}", e));
        return false;
      }
    };

    match InferenceWorker::spawn(model, self.events.clone()) {
      Ok(worker) => {
        self.worker = Some(worker);
        true
      }
      Err(e) => {
        self.notify(NotificationLevel::Error, format!("无法启动推理线程: {}", e));
        false
      }
    }
  }

  fn notify(&mut self, level: NotificationLevel, message: String) {
    self.notifications.push(level, message, Instant::now());
    self.dirty = true;
  }

  pub fn handle_event(&mut self, event: UiEvent) -> Flow {
    match event {
      UiEvent::ButtonPressed => self.on_button_pressed(),
      UiEvent::Lifecycle(state) => return self.on_lifecycle(state),
      UiEvent::Frame { session, frame } => self.on_frame(session, frame),
      UiEvent::StreamFailed { session, error } => self.on_stream_failed(session, error),
      UiEvent::InferenceDone(outcome) => self.on_inference_done(outcome),
      UiEvent::Shutdown => {
        self.dispose();
        return Flow::Exit;
      }
    }
    Flow::Continue
  }

  pub fn on_button_pressed(&mut self) {
    if self.detecting {
      self.stop_detection();
    } else {
      self.start_detection();
    }
    self.dirty = true;
  }

  fn start_detection(&mut self) {
    if self.worker.is_none() {
      self.notify(NotificationLevel::Warning, "模型尚未加载，无法开始检测".to_string());
      return;
    }
    // 后台时只记下开关，回到前台再打开摄像头
    if self.lifecycle != AppLifecycleState::Resumed {
      info!("应用不在前台，恢复后开始检测");
      self.detecting = true;
      return;
    }
    if self.camera.is_none() && !self.init_camera() {
      return;
    }

    self.detecting = true;
    if !self.start_stream() {
      self.detecting = false;
    }
  }

  /// 每次开流都开启新的会话，旧会话的推理结果到达后被忽略
  fn start_stream(&mut self) -> bool {
    let Some(camera) = self.camera.as_mut() else {
      return false;
    };
    if camera.is_streaming() {
      return true;
    }

    self.session += 1;
    let session = self.session;
    let events = self.events.clone();
    let started = camera.start_image_stream(Box::new(move |frame| {
      let event = match frame {
        Ok(frame) => UiEvent::Frame { session, frame },
        Err(error) => UiEvent::StreamFailed { session, error },
      };
      events.send(event).is_ok()
    }));

    match started {
      Ok(()) => {
        info!("开始检测，会话 {}", self.session);
        true
      }
      Err(e) => {
        self.notify(NotificationLevel::Error, format!("无法启动图像流: {}", e));
        false
      }
    }
  }

  fn stop_stream(&mut self) {
    if let Some(camera) = self.camera.as_mut()
      && let Err(e) = camera.stop_image_stream()
    {
      warn!("停止图像流失败: {}", e);
    }
  }

  fn stop_detection(&mut self) {
    info!("停止检测");
    self.detecting = false;
    self.stop_stream();
    self.detections = None;
  }

  /// 释放摄像头，检测开关保持不变以便恢复
  fn release_camera(&mut self) {
    self.stop_stream();
    if self.camera.take().is_some() {
      info!("摄像头已释放");
    }
    self.detections = None;
    self.preview = None;
  }

  pub fn on_lifecycle(&mut self, state: AppLifecycleState) -> Flow {
    debug!("生命周期: {:?} -> {:?}", self.lifecycle, state);
    self.lifecycle = state;
    self.dirty = true;

    match state {
      AppLifecycleState::Inactive | AppLifecycleState::Hidden | AppLifecycleState::Paused => {
        self.release_camera();
      }
      AppLifecycleState::Resumed => {
        if self.camera.is_none() && !self.init_camera() {
          return Flow::Continue;
        }
        if self.detecting && !self.start_stream() {
          self.detecting = false;
        }
      }
      AppLifecycleState::Detached => {
        self.dispose();
        return Flow::Exit;
      }
    }
    Flow::Continue
  }

  pub fn on_frame(&mut self, session: u64, frame: CameraFrame) {
    self.stats.frames_received += 1;
    if session != self.session {
      trace!("丢弃旧会话 {} 的第 {} 帧", session, frame.index);
      return;
    }
    if !self.detecting || self.camera.is_none() || self.lifecycle != AppLifecycleState::Resumed {
      trace!("未在检测，忽略第 {} 帧", frame.index);
      return;
    }

    let frame = Arc::new(frame);
    self.preview = Some(frame.clone());
    self.dirty = true;

    if self.busy {
      self.stats.frames_dropped += 1;
      trace!("推理进行中，丢弃第 {} 帧", frame.index);
      return;
    }

    let Some(worker) = self.worker.as_ref() else {
      return;
    };
    match worker.submit(self.session, frame) {
      Ok(()) => self.busy = true,
      Err(frame) => {
        self.stats.frames_dropped += 1;
        debug!("推理线程不可用，丢弃第 {} 帧", frame.index);
      }
    }
  }

  pub fn on_stream_failed(&mut self, session: u64, error: CameraError) {
    if session != self.session || !self.detecting {
      debug!("忽略旧会话 {} 的图像流错误: {}", session, error);
      return;
    }
    self.notify(NotificationLevel::Error, format!("图像流中断: {}", error));
    self.stop_detection();
    self.dirty = true;
  }

  pub fn on_inference_done(&mut self, outcome: InferenceOutcome) {
    self.busy = false;

    if outcome.session != self.session || !self.detecting || self.camera.is_none() {
      debug!("丢弃过期会话 {} 的推理结果", outcome.session);
      return;
    }

    match outcome.result {
      Ok(result) => {
        self.stats.frames_processed += 1;
        debug!("检测到 {} 个对象", result.len());
        self.detections = Some(ActiveDetections {
          frame_size: outcome.frame_size,
          rotation: outcome.rotation,
          result,
        });
        self.dirty = true;
      }
      Err(e) => {
        self.stats.inference_errors += 1;
        warn!("推理失败，丢弃该帧: {}", e);
      }
    }
  }

  /// 把当前检测结果映射到屏幕坐标
  pub fn overlay_boxes(&self, screen: Size) -> Vec<OverlayBox> {
    let Some(active) = &self.detections else {
      return Vec::new();
    };

    let scale = BoxScale::new(screen, active.frame_size, active.rotation);
    active
      .result
      .iter()
      .map(|d| OverlayBox {
        rect: scale.apply(&d.bbox),
        caption: caption(&d.label, d.score),
        class_id: d.class_id,
        score: d.score,
      })
      .collect()
  }

  pub fn view(&self, screen: Size, now: Instant) -> ScreenView<'_> {
    ScreenView {
      size: screen,
      preview: self.preview.as_deref(),
      detections: self.detections.as_ref().map(|a| &a.result),
      boxes: self.overlay_boxes(screen),
      button: if self.detecting {
        STOP_CAPTION
      } else {
        START_CAPTION
      },
      notifications: self.notifications.active(now).collect(),
      stats: self.stats,
    }
  }

  /// 取走“需要重绘”标志，同时清理过期通知
  pub fn take_dirty(&mut self) -> bool {
    let before = self.notifications.len();
    self.notifications.prune(Instant::now());
    let expired = self.notifications.len() != before;
    std::mem::take(&mut self.dirty) || expired
  }

  /// 停止推流、释放摄像头和模型，可重复调用
  pub fn dispose(&mut self) {
    if self.camera.is_none() && self.worker.is_none() {
      return;
    }
    info!("释放检测界面");
    self.detecting = false;
    self.release_camera();
    if let Some(mut worker) = self.worker.take() {
      worker.shutdown();
    }
    self.busy = false;
    self.dirty = true;
  }

  pub fn is_detecting(&self) -> bool {
    self.detecting
  }

  pub fn is_busy(&self) -> bool {
    self.busy
  }

  pub fn has_camera(&self) -> bool {
    self.camera.is_some()
  }

  pub fn has_model(&self) -> bool {
    self.worker.is_some()
  }

  pub fn session(&self) -> u64 {
    self.session
  }

  pub fn lifecycle(&self) -> AppLifecycleState {
    self.lifecycle
  }

  pub fn stats(&self) -> ScreenStats {
    self.stats
  }

  pub fn detections(&self) -> Option<&DetectResult> {
    self.detections.as_ref().map(|a| &a.result)
  }

  pub fn notifications(&self) -> &Notifications {
    &self.notifications
  }
}

impl<P: CameraProvider, L: ModelLoader> Drop for DetectionScreen<P, L> {
  fn drop(&mut self) {
    self.dispose();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn caption_rounds_percentage() {
    assert_eq!(caption("person", 0.876), "person 88%");
    assert_eq!(caption("cup", 1.0), "cup 100%");
    assert_eq!(caption("cat", 0.125), "cat 13%");
    assert_eq!(caption("dog", 0.625), "dog 63%");
    assert_eq!(caption("bird", 0.0), "bird 0%");
  }
}
