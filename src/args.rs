// 该文件是 Guoyuan （果园） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use clap::Parser;
use url::Url;

/// Guoyuan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件
  /// 例如: yolov7:///path/to/model.onnx
  /// 文件内容不做格式检查, 交由推理引擎自行校验
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像, 仅接受 JPEG
  /// 例如: image:///path/to/photo.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出位置
  /// 支持:
  /// - image:///path/to/out.png 保存单张标注图
  /// - folder:///path/to/records?record=name 按日期目录记录
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}
