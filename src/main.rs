use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use x3ui::{AsyncApi, PanelConfig};

#[derive(Parser)]
#[command(name = "x3ui", version, about = "3x-ui 面板命令行客户端")]
struct Cli {
    #[command(flatten)]
    connection: Connection,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Connection {
    /// TOML 配置文件，指定后忽略其他连接参数
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 面板地址（例如 https://panel.example.com:2053/path）
    #[arg(long, global = true, env = "XUI_HOST")]
    host: Option<String>,

    #[arg(long, global = true, env = "XUI_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "XUI_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// 是否校验 TLS 证书
    #[arg(
        long,
        global = true,
        env = "XUI_TLS_VERIFY",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    tls_verify: bool,

    /// 不校验 TLS 证书，等同于 `--tls-verify false`
    #[arg(long, global = true)]
    insecure: bool,

    /// 请求超时（秒）
    #[arg(long, global = true, env = "XUI_TIMEOUT", default_value = "10")]
    timeout: u64,

    /// 会话过期时自动重新登录
    #[arg(
        long,
        global = true,
        env = "XUI_AUTO_RELOGIN",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    auto_relogin: bool,

    /// 会话 Cookie 名称，默认取登录响应中的第一个 Cookie
    #[arg(long, global = true, env = "XUI_SESSION_COOKIE")]
    session_cookie: Option<String>,

    /// 额外信任的 CA 证书（PEM）
    #[arg(long, global = true, env = "XUI_CA_CERT")]
    ca_cert: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// 入站管理
    Inbounds {
        #[command(subcommand)]
        command: InboundCommands,
    },
    /// 客户端管理
    Clients {
        #[command(subcommand)]
        command: ClientCommands,
    },
}

#[derive(Subcommand)]
enum InboundCommands {
    /// 列出所有入站
    List,
    /// 查看入站
    Get { id: i64 },
    /// 删除入站
    Delete { id: i64 },
    /// 重置所有入站流量
    ResetTraffics,
}

#[derive(Subcommand)]
enum ClientCommands {
    /// 列出客户端
    List {
        /// 只列出该入站下的客户端
        #[arg(long)]
        inbound: Option<i64>,
    },
    /// 按 email 查看客户端
    Get { email: String },
    /// 查看客户端流量
    Traffic { email: String },
    /// 在线客户端
    Online,
    /// 删除客户端
    Delete {
        #[arg(long)]
        inbound: i64,
        /// UUID（trojan 为密码，shadowsocks 为 email）
        key: String,
    },
    /// 客户端 IP 记录
    Ips { email: String },
}

impl Connection {
    fn into_config(self) -> Result<PanelConfig> {
        if let Some(path) = self.config {
            return PanelConfig::from_file(&path)
                .with_context(|| format!("加载配置文件失败: {}", path.display()));
        }

        let host = self.host.ok_or_else(|| anyhow!("缺少面板地址，请使用 --host 或 XUI_HOST"))?;
        let username = self
            .username
            .ok_or_else(|| anyhow!("缺少用户名，请使用 --username 或 XUI_USERNAME"))?;
        let password = self
            .password
            .ok_or_else(|| anyhow!("缺少密码，请使用 --password 或 XUI_PASSWORD"))?;

        let mut config = PanelConfig::new(host, username, password)
            .with_verify_tls(self.tls_verify && !self.insecure)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_auto_relogin(self.auto_relogin);
        if let Some(name) = self.session_cookie {
            config = config.with_session_cookie(name);
        }
        if let Some(path) = self.ca_cert {
            config = config.with_ca_cert(path);
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.connection.into_config()?;
    info!("🌐 面板地址: {}", config.base_url());

    let api = AsyncApi::new(config)?;
    api.login().await?;

    match cli.command {
        Commands::Inbounds { command } => match command {
            InboundCommands::List => print_json(&api.inbounds().list().await?)?,
            InboundCommands::Get { id } => print_json(&api.inbounds().get(id).await?)?,
            InboundCommands::Delete { id } => {
                api.inbounds().delete(id).await?;
                info!("✅ 入站 {} 已删除", id);
            }
            InboundCommands::ResetTraffics => {
                api.inbounds().reset_traffics().await?;
                info!("✅ 入站流量已重置");
            }
        },
        Commands::Clients { command } => match command {
            ClientCommands::List { inbound: Some(id) } => {
                print_json(&api.clients().list_in(id).await?)?
            }
            ClientCommands::List { inbound: None } => print_json(&api.clients().list().await?)?,
            ClientCommands::Get { email } => print_json(&api.clients().get(&email).await?)?,
            ClientCommands::Traffic { email } => {
                print_json(&api.clients().traffic(&email).await?)?
            }
            ClientCommands::Online => print_json(&api.clients().online().await?)?,
            ClientCommands::Delete { inbound, key } => {
                api.clients().delete(inbound, &key).await?;
                info!("✅ 客户端 {} 已删除", key);
            }
            ClientCommands::Ips { email } => print_json(&api.clients().ips(&email).await?)?,
        },
    }

    api.logout().await;
    Ok(())
}
