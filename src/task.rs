// 该文件是 Wangyan （望眼） 项目的一部分。
// src/task.rs - 界面事件循环
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

use std::io::BufRead;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::camera::CameraProvider;
use crate::geometry::Size;
use crate::model::ModelLoader;
use crate::output::Render;
use crate::screen::{AppLifecycleState, DetectionScreen, Flow, UiEvent};

// 没有事件时也定期检查通知是否过期
const IDLE_TICK: Duration = Duration::from_millis(250);
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

#[derive(Default, Debug)]
pub struct LiveTask {
  frame_number: Option<usize>,
}

impl LiveTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|&n| n > 0);
    self
  }

  pub fn run_task<P, L, O>(
    self,
    mut screen: DetectionScreen<P, L>,
    events: Receiver<UiEvent>,
    interrupt: Sender<UiEvent>,
    output: O,
    screen_size: Size,
  ) -> anyhow::Result<()>
  where
    P: CameraProvider,
    L: ModelLoader,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("开始任务，屏幕尺寸 {}", screen_size);

    if let Err(e) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = interrupt.send(UiEvent::Lifecycle(AppLifecycleState::Detached));
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("无法设置中断处理: {}", e);
    }

    screen.init_state();

    loop {
      if screen.take_dirty() {
        let now = Instant::now();
        output.render_view(&screen.view(screen_size, now))?;
        debug!("渲染完成，耗时: {:.2?}", now.elapsed());
      }

      if let Some(n) = self.frame_number
        && screen.stats().frames_processed >= n as u64
      {
        info!("达到指定帧数 {}, 退出任务循环", n);
        break;
      }

      let event = match events.recv_timeout(IDLE_TICK) {
        Ok(event) => event,
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => {
          warn!("事件通道已关闭，退出任务循环");
          break;
        }
      };

      if screen.handle_event(event) == Flow::Exit {
        // 退出前画出最终状态
        if screen.take_dirty() {
          output.render_view(&screen.view(screen_size, Instant::now()))?;
        }
        info!("界面退出");
        break;
      }
    }

    screen.dispose();
    let stats = screen.stats();
    info!(
      "任务完成: 接收 {} 帧，丢弃 {} 帧，推理 {} 帧，失败 {} 帧",
      stats.frames_received, stats.frames_dropped, stats.frames_processed, stats.inference_errors
    );
    Ok(())
  }
}

/// 控制台命令到界面事件
pub fn parse_command(line: &str) -> Option<UiEvent> {
  match line.trim().to_ascii_lowercase().as_str() {
    "" | "toggle" | "t" => Some(UiEvent::ButtonPressed),
    "pause" => Some(UiEvent::Lifecycle(AppLifecycleState::Paused)),
    "resume" => Some(UiEvent::Lifecycle(AppLifecycleState::Resumed)),
    "inactive" => Some(UiEvent::Lifecycle(AppLifecycleState::Inactive)),
    "quit" | "q" => Some(UiEvent::Lifecycle(AppLifecycleState::Detached)),
    _ => None,
  }
}

/// 从标准输入读取命令，直到输入结束或界面线程退出
pub fn spawn_console(events: Sender<UiEvent>) -> std::io::Result<JoinHandle<()>> {
  thread::Builder::new()
    .name("console".to_string())
    .spawn(move || {
      let stdin = std::io::stdin();
      for line in stdin.lock().lines() {
        let Ok(line) = line else {
          break;
        };
        match parse_command(&line) {
          Some(event) => {
            if events.send(event).is_err() {
              break;
            }
          }
          None => warn!("未知命令: {}（可用: toggle, pause, resume, inactive, quit）", line.trim()),
        }
      }
      debug!("控制台输入结束");
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn console_lines_map_to_events() {
    assert!(matches!(parse_command(""), Some(UiEvent::ButtonPressed)));
    assert!(matches!(parse_command(" T \n"), Some(UiEvent::ButtonPressed)));
    assert!(matches!(
      parse_command("pause"),
      Some(UiEvent::Lifecycle(AppLifecycleState::Paused))
    ));
    assert!(matches!(
      parse_command("Resume"),
      Some(UiEvent::Lifecycle(AppLifecycleState::Resumed))
    ));
    assert!(matches!(
      parse_command("inactive"),
      Some(UiEvent::Lifecycle(AppLifecycleState::Inactive))
    ));
    assert!(matches!(
      parse_command("q"),
      Some(UiEvent::Lifecycle(AppLifecycleState::Detached))
    ));
    assert!(parse_command("launch").is_none());
  }

  #[cfg(feature = "image_camera")]
  mod live {
    use std::path::Path;
    use std::sync::{Arc, Mutex, mpsc};

    use image::RgbImage;
    use url::Url;

    use super::super::*;
    use crate::FromUrl;
    use crate::camera::{ImageCameraProvider, ResolutionPreset};
    use crate::model::{BackendLoader, ModelConfig};
    use crate::screen::{START_CAPTION, STOP_CAPTION, ScreenConfig, ScreenView};

    const SCRIPT: &str = r#"[[{"class_id": 0, "score": 0.9, "bbox": [1, 1, 4, 4]}]]"#;

    /// 记录每次渲染的按钮文字和框数
    #[derive(Clone, Default)]
    struct RecordingOutput {
      renders: Arc<Mutex<Vec<(&'static str, usize)>>>,
    }

    impl RecordingOutput {
      fn renders(&self) -> Vec<(&'static str, usize)> {
        self.renders.lock().unwrap().clone()
      }
    }

    impl Render for RecordingOutput {
      type Error = std::convert::Infallible;

      fn render_view(&self, view: &ScreenView<'_>) -> Result<(), Self::Error> {
        self
          .renders
          .lock()
          .unwrap()
          .push((view.button, view.boxes.len()));
        Ok(())
      }
    }

    fn screen(
      dir: &Path,
      auto_start: bool,
    ) -> (
      DetectionScreen<ImageCameraProvider, BackendLoader>,
      Sender<UiEvent>,
      Receiver<UiEvent>,
    ) {
      let image = dir.join("still.png");
      RgbImage::new(8, 6).save(&image).unwrap();
      let labels = dir.join("labels.txt");
      std::fs::write(&labels, "person\n").unwrap();
      let script = dir.join("script.json");
      std::fs::write(&script, SCRIPT).unwrap();

      let camera_url = Url::parse(&format!("image://{}?fps=100", image.display())).unwrap();
      let model_url = Url::parse(&format!(
        "replay://{}?labels={}",
        script.display(),
        labels.display()
      ))
      .unwrap();

      let config = ScreenConfig {
        preset: ResolutionPreset::Low,
        auto_start,
        ..ScreenConfig::default()
      };
      let (tx, rx) = mpsc::channel();
      let screen = DetectionScreen::new(
        ImageCameraProvider::from_url(&camera_url).unwrap(),
        BackendLoader,
        ModelConfig::from_url(&model_url).unwrap(),
        config,
        tx.clone(),
      );
      (screen, tx, rx)
    }

    #[test]
    fn stops_after_frame_number_inferences() {
      let dir = tempfile::tempdir().unwrap();
      let (screen, tx, rx) = screen(dir.path(), true);
      let output = RecordingOutput::default();

      LiveTask::default()
        .with_frame_number(Some(3))
        .run_task(screen, rx, tx, output.clone(), Size::new(120, 160))
        .unwrap();

      let renders = output.renders();
      assert_eq!(renders.first(), Some(&(STOP_CAPTION, 0)));
      // 每次推理完成都会重绘，结果保留到下一次替换
      assert!(renders.iter().filter(|(_, boxes)| *boxes == 1).count() >= 3);
      assert!(renders.iter().all(|(button, _)| *button == STOP_CAPTION));
    }

    #[test]
    fn detached_exits_after_final_render() {
      let dir = tempfile::tempdir().unwrap();
      let (screen, tx, rx) = screen(dir.path(), false);
      let output = RecordingOutput::default();

      tx.send(UiEvent::Lifecycle(AppLifecycleState::Detached))
        .unwrap();
      LiveTask::default()
        .run_task(screen, rx, tx, output.clone(), Size::new(120, 160))
        .unwrap();

      assert_eq!(output.renders(), vec![(START_CAPTION, 0), (START_CAPTION, 0)]);
    }

    #[test]
    fn renders_after_button_and_exits_on_shutdown() {
      let dir = tempfile::tempdir().unwrap();
      let (screen, tx, rx) = screen(dir.path(), false);
      let output = RecordingOutput::default();

      tx.send(UiEvent::ButtonPressed).unwrap();
      tx.send(UiEvent::Shutdown).unwrap();
      LiveTask::default()
        .run_task(screen, rx, tx, output.clone(), Size::new(120, 160))
        .unwrap();

      assert_eq!(
        output.renders(),
        vec![(START_CAPTION, 0), (STOP_CAPTION, 0), (START_CAPTION, 0)]
      );
    }
  }

  #[test]
  fn zero_frame_number_means_unlimited() {
    assert_eq!(LiveTask::default().with_frame_number(Some(0)).frame_number, None);
    assert_eq!(LiveTask::default().with_frame_number(Some(3)).frame_number, Some(3));
  }
}
