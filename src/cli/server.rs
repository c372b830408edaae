use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use rand::distr::{Alphanumeric, SampleString};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, MissedTickBehavior, interval, sleep};

use crate::cli::SubCommandExtend;
use crate::config::{EngineOptions, SearchOptions};
use crate::server::AppState;
use crate::{EngineBuilder, Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 请求验证 token，不填则随机生成
    #[arg(long, default_value_t = String::new())]
    pub token: String,
    /// 索引定期落盘的间隔（秒），0 表示只在退出时落盘
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub persist_interval: u64,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = EngineBuilder::new(opts.conf_dir.clone())
            .options(&self.engine)
            .search(self.search.search_config())
            .open()
            .await?;

        let token = if self.token.is_empty() {
            let token = Alphanumeric.sample_string(&mut rand::rng(), 32);
            info!("鉴权 token: {}", token);
            token
        } else {
            self.token.clone()
        };

        // 创建应用状态
        let state = AppState::new(engine, token);

        // 创建应用
        let app = server::create_app(state.clone());

        if self.persist_interval > 0 {
            tokio::spawn(persist_task(state.clone(), Duration::from_secs(self.persist_interval)));
        }

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = match &self.prometheus_auth {
                Some(s) => {
                    let (username, password) =
                        s.split_once(':').ok_or_else(|| anyhow!("prometheus 认证信息格式错误"))?;
                    Some((username.to_string(), password.to_string()))
                }
                None => None,
            };
            tokio::spawn(push_task(url, instance, auth));
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("无法监听 {}", self.addr))?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        info!("服务器关闭，写入索引");
        state.engine.flush().await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听退出信号: {e}");
        std::future::pending::<()>().await;
    }
}

async fn persist_task(state: Arc<AppState>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 第一次 tick 立即返回
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match state.engine.flush().await {
            Ok(true) => info!("索引已定期落盘"),
            Ok(false) => {}
            Err(e) => error!("索引定期落盘失败: {e}"),
        }
    }
}

async fn push_task(url: String, instance: String, auth: Option<(String, String)>) {
    loop {
        let metric_families = prometheus::gather();
        let url = url.clone();
        let instance = instance.clone();
        let auth = auth.clone();
        let r = spawn_blocking(move || {
            prometheus::push_metrics(
                "tonematch",
                labels! {
                    "instance".to_string() => instance,
                },
                &url,
                metric_families,
                auth.map(|(username, password)| BasicAuthentication { username, password }),
            )
        })
        .await;
        match r {
            Ok(Err(e)) => error!("推送指标失败: {e}"),
            Err(e) => error!("推送指标失败: {e}"),
            Ok(Ok(())) => {}
        }
        sleep(Duration::from_secs(30)).await;
    }
}
