//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责请求入口和批次调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `request_processor` - 请求处理器（`OmrService`）
//! - 上传模式 / 目录模式 / 模板校验 / 存活检查
//! - 构建共享上下文（配置快照、模板、标记、评分配置）
//! - 共享上下文出错时终止整个请求
//!
//! ### `directory_source` - 目录输入源
//! - 发现模板、配置、评分配置、标记和图像文件
//!
//! ### `batch_processor` - 批次编排器
//! - 控制并发数量（Semaphore）
//! - 按输入顺序收集结果，统计成功/失败
//!
//! ## 层次关系
//!
//! ```text
//! request_processor (处理一个请求)
//!     ↓
//! batch_processor (处理 Vec<ProcessingItem>)
//!     ↓
//! workflow::ItemFlow (处理单张图像)
//!     ↓
//! services (配置 / 标记 / 模板 / 拼接 / 评分)
//!     ↓
//! infrastructure (解码 / 识别流水线)
//! ```

pub mod batch_processor;
pub mod directory_source;
pub mod request_processor;

// 重新导出主要类型
pub use batch_processor::{BatchOrchestrator, BatchState};
pub use directory_source::{DirectoryContents, DirectorySource};
pub use request_processor::{HealthStatus, OmrService, UploadRequest};
