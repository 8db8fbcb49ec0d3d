use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::warn;

use crate::api::{self, ApiState};
use crate::config::Config;
use crate::orchestrator::OmrService;
use crate::utils::logging::log_startup;

/// 应用主结构
pub struct App {
    state: ApiState,
    listener: TcpListener,
}

impl App {
    /// 初始化应用：构建服务并绑定监听地址
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let default_template = config.default_template_path();
        if !default_template.exists() {
            warn!(
                "⚠️ 默认模板不存在: {}，上传请求必须自带模板",
                default_template.display()
            );
        }

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("无法绑定监听地址 {}", config.bind_addr))?;
        let state = ApiState::new(OmrService::new(config));

        Ok(Self { state, listener })
    }

    /// 实际监听的地址（绑定端口 0 时由系统分配）
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 运行 HTTP 服务直到进程退出
    pub async fn run(self) -> Result<()> {
        api::serve(self.listener, self.state)
            .await
            .context("HTTP 服务异常退出")
    }
}
