// 该文件是 Guoyuan （果园） 项目的一部分。
// src/app.rs - 应用状态机
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{info, warn};

use crate::{
  input::ImageFileInput,
  model::{
    DetectResult, FruitLabel, Model, YOLOV7_INPUT_H, YOLOV7_INPUT_W, Yolov7, Yolov7Builder,
    Yolov7Error,
  },
  output::{
    Render,
    draw::{Canvas, DisplayRatio},
  },
  preprocess,
};

/// 应用状态。
///
/// 各步骤严格顺序执行：模型加载完成前不接受图像上传，
/// 图像解码完成后才进入预处理与推理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
  Uninitialized,
  ModelLoading,
  ModelReady,
  ImageLoading,
  ImageReady,
}

#[derive(Error, Debug)]
pub enum AppError {
  #[error("模型尚未加载")]
  ModelNotReady,
  #[error("模型错误: {0}")]
  Model(#[from] Yolov7Error),
  #[error("没有输入帧")]
  NoFrame,
  #[error("渲染输出错误: {0}")]
  Render(Box<dyn std::error::Error + Send + Sync>),
}

pub struct App {
  state: AppState,
  model: Option<Yolov7<FruitLabel>>,
}

impl Default for App {
  fn default() -> Self {
    Self::new()
  }
}

impl App {
  pub fn new() -> Self {
    App {
      state: AppState::Uninitialized,
      model: None,
    }
  }

  pub fn state(&self) -> AppState {
    self.state
  }

  pub fn model_loaded(&self) -> bool {
    matches!(
      self.state,
      AppState::ModelReady | AppState::ImageLoading | AppState::ImageReady
    )
  }

  pub fn image_loaded(&self) -> bool {
    matches!(self.state, AppState::ImageReady)
  }

  /// 加载模型并预热。成功后才放开图像上传。
  pub fn load_model(&mut self, builder: Yolov7Builder) -> Result<(), AppError> {
    self.state = AppState::ModelLoading;
    match builder.build() {
      Ok(model) => {
        self.model = Some(model);
        self.state = AppState::ModelReady;
        info!("模型加载成功。");
        Ok(())
      }
      Err(e) => {
        self.state = AppState::Uninitialized;
        warn!("模型加载失败: {}", e);
        Err(e.into())
      }
    }
  }

  /// 上传一张图像：预处理、推理并渲染到输出端。
  ///
  /// 模型未就绪时直接拒绝；任何一步失败都会把状态退回 ModelReady，
  /// 不产生画布输出。
  pub fn upload_image<O>(&mut self, input: ImageFileInput, output: &O) -> Result<usize, AppError>
  where
    O: Render<Canvas, DetectResult<FruitLabel>>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    if !self.model_loaded() {
      warn!("请先加载模型文件。");
      return Err(AppError::ModelNotReady);
    }

    self.state = AppState::ImageLoading;
    match self.detect_and_render(input, output) {
      Ok(count) => {
        self.state = AppState::ImageReady;
        info!("图像处理完成, 检测到 {} 个目标。", count);
        Ok(count)
      }
      Err(e) => {
        self.state = AppState::ModelReady;
        Err(e)
      }
    }
  }

  fn detect_and_render<O>(
    &mut self,
    mut input: ImageFileInput,
    output: &O,
  ) -> Result<usize, AppError>
  where
    O: Render<Canvas, DetectResult<FruitLabel>>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let image = input.next().ok_or(AppError::NoFrame)?;

    // 画布尺寸取图像原始尺寸
    let display = DisplayRatio::of(
      image.width(),
      image.height(),
      YOLOV7_INPUT_W,
      YOLOV7_INPUT_H,
    );

    let frame = preprocess::letterbox::<YOLOV7_INPUT_W, YOLOV7_INPUT_H>(&image);
    let ratio = frame.ratio;

    let Some(model) = self.model.as_mut() else {
      return Err(AppError::ModelNotReady);
    };
    let result = model.infer(frame)?;

    let canvas = Canvas::new(image, ratio, display);
    output
      .render_result(&canvas, &result)
      .map_err(|e| AppError::Render(Box::new(e)))?;

    Ok(result.len())
  }
}
