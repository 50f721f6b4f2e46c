use thiserror::Error;

/// 面板客户端统一的错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 网络或超时错误，调用方可以自行重试
    #[error("传输错误: {0}")]
    Transport(String),

    /// 非 2xx 的 HTTP 状态
    #[error("HTTP 错误 {status}: {body}")]
    Http { status: u16, body: String },

    /// 响应体不是合法 JSON
    #[error("响应解码失败: {0}")]
    Decode(String),

    /// 登录被拒绝，或会话过期后重新登录失败
    #[error("认证失败: {0}")]
    Authentication(String),

    /// 当前没有可用会话
    #[error("未登录，请先调用 login")]
    NotAuthenticated,

    /// 请求的记录不存在
    #[error("记录不存在: {0}")]
    NotFound(String),

    /// 请求或响应不符合预期结构
    #[error("字段校验失败 `{path}`: {message}")]
    Validation { path: String, message: String },

    /// 面板返回 success=false
    #[error("面板返回失败: {0}")]
    Panel(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 只有传输层错误值得原样重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub(crate) fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("请求超时: {}", err))
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("TOML 解析失败: {}", err))
    }
}
