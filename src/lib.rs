//! # OMR Checker API
//!
//! 答题卡（OMR）识别服务：接收扫描图像与模板，返回每道题的涂卡结果
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 图像编解码与识别流水线，只暴露能力
//! - `ImageDecoder` - 字节 → 灰度图
//! - `RecognitionPipeline` - 预处理 + 气泡读取（默认实现 `ThresholdPipeline`）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心请求来源
//! - `ConfigResolver` - 默认值 → 磁盘配置 → 请求配置 的分层合并
//! - `TemplateMaterializer` - 模板校验与物化
//! - `MarkerResolver` - 标记图像的三级查找
//! - `evaluate` / `results_to_csv` - 评分与 CSV 导出
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一张图像"的完整处理流程
//! - `ItemCtx` - 上下文封装（序号 + 文件名）
//! - `ItemFlow` - 流程编排（decode → preprocess → read → concatenate → evaluate）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次处理器，管理并发与结果顺序
//! - `orchestrator/request_processor` - 请求入口，构建共享上下文
//!
//! ### ⑤ 接口层（API）
//! - `api/` - axum 路由、multipart 解析、错误到 HTTP 状态码的映射
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use api::{build_router, ApiState};
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{RecognitionPipeline, ThresholdPipeline};
pub use models::{BatchResult, ProcessOptions, ProcessOutcome, ProcessingItem, ProcessingResult};
pub use orchestrator::{OmrService, UploadRequest};
pub use workflow::{ItemCtx, ItemFlow};
