//! API 模块
//!
//! HTTP 接口层：解析请求、调用 `OmrService`、把结果与错误映射为响应。

pub mod handlers;
pub mod routes;
pub mod types;
pub mod upload;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::orchestrator::OmrService;

pub use handlers::{status_for, ApiError};
pub use routes::build_router;
pub use types::{DirectoryRequest, OutputFormat};

/// 各处理函数共享的状态
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<OmrService>,
}

impl ApiState {
    pub fn new(service: OmrService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// 在已绑定的监听器上启动 HTTP 服务
pub async fn serve(listener: TcpListener, state: ApiState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("🌐 HTTP 服务监听于 http://{}", addr);
    }
    axum::serve(listener, build_router(state)).await
}
