//! 面板会话
//!
//! 持有登录后得到的会话 Cookie，为每个请求附加 Cookie，
//! 并在 401/403 时按配置重新登录并重试一次。
//!
//! 会话状态由 `RwLock` 保护，所有登录动作在 `login_lock` 上串行执行。
//! 每次会话变化都会递增 `generation`，重新登录前先比较代数：
//! 若其他请求已经完成了重新登录，则直接复用新的 Cookie。

use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::codec::{decode_envelope, decode_list, decode_obj, Envelope, PanelRecord};
use crate::config::PanelConfig;
use crate::error::{Error, Result};
use crate::transport::{Backend, PanelRequest, RawResponse, SessionCookie};

pub const LOGIN_PATH: &str = "login";

#[derive(Debug, Default)]
struct SessionState {
    cookie: Option<SessionCookie>,
    generation: u64,
}

/// 面板会话
pub struct Session {
    backend: Arc<dyn Backend>,
    username: String,
    password: String,
    auto_relogin: bool,
    cookie_name: Option<String>,
    state: RwLock<SessionState>,
    login_lock: Mutex<()>,
}

impl Session {
    pub fn new(config: &PanelConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            username: config.username.clone(),
            password: config.password.clone(),
            auto_relogin: config.auto_relogin,
            cookie_name: config.session_cookie.clone(),
            state: RwLock::new(SessionState::default()),
            login_lock: Mutex::new(()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.cookie.is_some()
    }

    /// 当前会话 Cookie
    pub async fn cookie(&self) -> Option<SessionCookie> {
        self.state.read().await.cookie.clone()
    }

    /// 使用配置中的用户名密码登录
    pub async fn login(&self) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        self.login_locked().await.map(|_| ())
    }

    /// 丢弃本地会话
    pub async fn logout(&self) {
        let _guard = self.login_lock.lock().await;
        let mut state = self.state.write().await;
        if state.cookie.take().is_some() {
            state.generation += 1;
            info!("已退出面板会话: username={}", self.username);
        }
    }

    /// 调用方必须持有 `login_lock`
    async fn login_locked(&self) -> Result<(SessionCookie, u64)> {
        info!("登录面板: username={}", self.username);

        let resp = self
            .backend
            .send(PanelRequest {
                method: Method::POST,
                path: LOGIN_PATH.to_string(),
                body: Some(json!({
                    "username": self.username,
                    "password": self.password,
                })),
                cookie: None,
            })
            .await?;

        if resp.is_unauthorized() {
            return Err(Error::Authentication(format!(
                "面板拒绝登录 (HTTP {}): {}",
                resp.status,
                resp.text()
            )));
        }
        let resp = check_status(resp)?;

        match decode_envelope(&resp.body) {
            Ok(_) => {}
            Err(Error::Panel(msg)) => return Err(Error::Authentication(msg)),
            Err(e) => return Err(e),
        }

        let cookie = self.pick_cookie(&resp.cookies).ok_or_else(|| {
            Error::Authentication("登录成功但面板未返回会话 Cookie".to_string())
        })?;

        let mut state = self.state.write().await;
        state.cookie = Some(cookie.clone());
        state.generation += 1;
        info!("✅ 面板登录成功: username={}", self.username);
        Ok((cookie, state.generation))
    }

    fn pick_cookie(&self, cookies: &[SessionCookie]) -> Option<SessionCookie> {
        match &self.cookie_name {
            Some(name) => cookies.iter().find(|c| &c.name == name).cloned(),
            None => cookies.first().cloned(),
        }
    }

    /// 会话仍是 `generation` 这一代时将其作废
    async fn invalidate(&self, generation: u64) {
        let mut state = self.state.write().await;
        if state.generation == generation && state.cookie.is_some() {
            state.cookie = None;
            state.generation += 1;
            warn!("面板会话已作废: username={}", self.username);
        }
    }

    /// 在 `stale` 代会话失效后取得新会话
    async fn refresh(&self, stale: u64) -> Result<(SessionCookie, u64)> {
        let _guard = self.login_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != stale {
                debug!("会话已被其他请求刷新，复用新会话");
                return match &state.cookie {
                    Some(cookie) => Ok((cookie.clone(), state.generation)),
                    None => Err(Error::NotAuthenticated),
                };
            }
        }

        warn!("面板会话已过期，重新登录: username={}", self.username);
        match self.login_locked().await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                self.invalidate(stale).await;
                Err(e)
            }
        }
    }

    /// 发送需要会话的请求，返回 2xx 原始响应
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<RawResponse> {
        let (cookie, generation) = {
            let state = self.state.read().await;
            match &state.cookie {
                Some(cookie) => (cookie.clone(), state.generation),
                None => return Err(Error::NotAuthenticated),
            }
        };

        let resp = self
            .send(method.clone(), path, body.clone(), cookie)
            .await?;
        if !resp.is_unauthorized() {
            return check_status(resp);
        }

        if !self.auto_relogin {
            warn!("面板返回 {}，会话已失效: {}", resp.status, path);
            self.invalidate(generation).await;
            return Err(Error::NotAuthenticated);
        }

        let (cookie, generation) = self.refresh(generation).await?;
        let resp = self.send(method, path, body, cookie).await?;
        if resp.is_unauthorized() {
            self.invalidate(generation).await;
            return Err(Error::Authentication(format!(
                "重新登录后会话仍被拒绝 (HTTP {})",
                resp.status
            )));
        }
        check_status(resp)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        cookie: SessionCookie,
    ) -> Result<RawResponse> {
        self.backend
            .send(PanelRequest {
                method,
                path: path.to_string(),
                body,
                cookie: Some(cookie),
            })
            .await
    }

    /// 发送请求并解析响应信封
    pub async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Envelope> {
        let resp = self.request(method, path, body).await?;
        decode_envelope(&resp.body)
    }

    pub async fn get_obj<T: PanelRecord>(&self, path: &str) -> Result<Option<T>> {
        decode_obj(self.call(Method::GET, path, None).await?)
    }

    pub async fn get_list<T: PanelRecord>(&self, path: &str) -> Result<Vec<T>> {
        decode_list(self.call(Method::GET, path, None).await?)
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Envelope> {
        self.call(Method::POST, path, Some(body)).await
    }
}

fn check_status(resp: RawResponse) -> Result<RawResponse> {
    if resp.is_success() {
        Ok(resp)
    } else {
        Err(Error::Http {
            status: resp.status,
            body: resp.text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// 内存中的面板：只认最近一次登录签发的 token
    #[derive(Default)]
    struct FakePanel {
        inner: StdMutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        valid_token: Option<String>,
        issued: u32,
        login_calls: u32,
        reject_login: bool,
        omit_cookie: bool,
        always_unauthorized: bool,
        /// 会话失效时返回的状态码，默认 401
        expired_status: Option<u16>,
        server_error: bool,
        requests: Vec<(String, Option<String>)>,
    }

    impl FakePanel {
        fn expire(&self) {
            self.inner.lock().unwrap().valid_token = None;
        }

        fn login_calls(&self) -> u32 {
            self.inner.lock().unwrap().login_calls
        }

        fn requests(&self) -> Vec<(String, Option<String>)> {
            self.inner.lock().unwrap().requests.clone()
        }

        fn set(&self, f: impl FnOnce(&mut FakeState)) {
            f(&mut self.inner.lock().unwrap());
        }
    }

    fn json_response(status: u16, body: Value, cookies: Vec<SessionCookie>) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string().into_bytes(),
            cookies,
        }
    }

    #[async_trait]
    impl Backend for FakePanel {
        async fn send(&self, request: PanelRequest) -> Result<RawResponse> {
            let status = {
                let mut state = self.inner.lock().unwrap();
                state.requests.push((
                    request.path.clone(),
                    request.cookie.as_ref().map(|c| c.value.clone()),
                ));

                if request.path == LOGIN_PATH {
                    state.login_calls += 1;
                    if state.reject_login {
                        return Ok(json_response(
                            200,
                            json!({"success": false, "msg": "invalid credentials", "obj": null}),
                            vec![],
                        ));
                    }
                    state.issued += 1;
                    let token = format!("t{}", state.issued);
                    state.valid_token = Some(token.clone());
                    let cookies = if state.omit_cookie {
                        vec![]
                    } else {
                        vec![SessionCookie::new("3x-ui", token)]
                    };
                    return Ok(json_response(200, json!({"success": true, "msg": ""}), cookies));
                }

                let authorized = !state.always_unauthorized
                    && request.cookie.as_ref().map(|c| &c.value) == state.valid_token.as_ref();
                if !authorized {
                    state.expired_status.unwrap_or(401)
                } else if state.server_error {
                    500
                } else {
                    200
                }
            };

            // 让并发请求在这里交错
            tokio::task::yield_now().await;

            match status {
                200 => Ok(json_response(200, json!({"success": true, "obj": []}), vec![])),
                500 => Ok(RawResponse {
                    status,
                    body: b"internal error".to_vec(),
                    cookies: vec![],
                }),
                _ => Ok(json_response(status, json!({}), vec![])),
            }
        }
    }

    /// 登录从第 `hang_from` 次起永不返回，其余请求一律 401
    struct HangingPanel {
        hang_from: u32,
        logins: AtomicU32,
    }

    impl HangingPanel {
        fn new(hang_from: u32) -> Arc<Self> {
            Arc::new(Self {
                hang_from,
                logins: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for HangingPanel {
        async fn send(&self, request: PanelRequest) -> Result<RawResponse> {
            if request.path != LOGIN_PATH {
                return Ok(json_response(401, json!({}), vec![]));
            }
            if self.logins.fetch_add(1, Ordering::SeqCst) < self.hang_from {
                return Ok(json_response(
                    200,
                    json!({"success": true, "msg": ""}),
                    vec![SessionCookie::new("3x-ui", "t1")],
                ));
            }
            std::future::pending::<Result<RawResponse>>().await
        }
    }

    fn session(panel: &Arc<FakePanel>, auto_relogin: bool) -> Session {
        let config = PanelConfig::new("http://panel.test", "admin", "admin")
            .with_auto_relogin(auto_relogin);
        Session::new(&config, panel.clone())
    }

    #[tokio::test]
    async fn test_request_without_login_issues_no_call() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);

        let err = session.call(Method::GET, "panel/api/inbounds/list", None).await;
        assert!(matches!(err, Err(Error::NotAuthenticated)));
        assert!(panel.requests().is_empty());
    }

    #[tokio::test]
    async fn test_login_stores_cookie() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);

        session.login().await.unwrap();
        assert!(session.is_authenticated().await);
        assert_eq!(session.cookie().await.unwrap().value, "t1");

        session.call(Method::GET, "panel/api/inbounds/list", None).await.unwrap();
        session.call(Method::GET, "panel/api/inbounds/list", None).await.unwrap();
        assert_eq!(panel.login_calls(), 1);

        let requests = panel.requests();
        assert_eq!(requests[0], ("login".to_string(), None));
        assert_eq!(requests[1].1.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let panel = Arc::new(FakePanel::default());
        panel.set(|s| s.reject_login = true);
        let session = session(&panel, true);

        match session.login().await {
            Err(Error::Authentication(msg)) => assert_eq!(msg, "invalid credentials"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_login_without_cookie() {
        let panel = Arc::new(FakePanel::default());
        panel.set(|s| s.omit_cookie = true);
        let session = session(&panel, true);

        assert!(matches!(session.login().await, Err(Error::Authentication(_))));
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_named_cookie_must_match() {
        let panel = Arc::new(FakePanel::default());
        let config =
            PanelConfig::new("http://panel.test", "admin", "admin").with_session_cookie("session");
        let session = Session::new(&config, panel.clone());

        assert!(matches!(session.login().await, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_expired_session_relogins_once() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);
        session.login().await.unwrap();

        panel.expire();
        session.call(Method::GET, "panel/api/inbounds/list", None).await.unwrap();

        assert_eq!(panel.login_calls(), 2);
        assert_eq!(session.cookie().await.unwrap().value, "t2");

        let paths: Vec<String> = panel.requests().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                "login",
                "panel/api/inbounds/list",
                "login",
                "panel/api/inbounds/list"
            ]
        );
    }

    #[tokio::test]
    async fn test_expired_session_without_relogin() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, false);
        session.login().await.unwrap();

        panel.expire();
        let err = session.call(Method::GET, "panel/api/inbounds/list", None).await;
        assert!(matches!(err, Err(Error::NotAuthenticated)));
        assert!(!session.is_authenticated().await);
        assert_eq!(panel.login_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_relogin_returns_to_unauthenticated() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);
        session.login().await.unwrap();

        panel.expire();
        panel.set(|s| s.reject_login = true);
        let err = session.call(Method::GET, "panel/api/inbounds/list", None).await;
        assert!(matches!(err, Err(Error::Authentication(_))));
        assert!(!session.is_authenticated().await);

        // 之后的调用不再访问网络
        let before = panel.requests().len();
        let err = session.call(Method::GET, "panel/api/inbounds/list", None).await;
        assert!(matches!(err, Err(Error::NotAuthenticated)));
        assert_eq!(panel.requests().len(), before);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);
        session.login().await.unwrap();

        panel.set(|s| s.always_unauthorized = true);
        let err = session.call(Method::GET, "panel/api/inbounds/list", None).await;
        assert!(matches!(err, Err(Error::Authentication(_))));
        // 初次登录 + 一次重新登录，请求本身只重试一次
        assert_eq!(panel.login_calls(), 2);
        assert_eq!(panel.requests().len(), 4);
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_concurrent_expiry_single_relogin() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);
        session.login().await.unwrap();
        panel.expire();

        let (a, b) = tokio::join!(
            session.call(Method::GET, "panel/api/inbounds/list", None),
            session.call(Method::GET, "panel/api/inbounds/onlines", None),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(panel.login_calls(), 2);
        // 第二次登录之后的请求都使用新 token
        let requests = panel.requests();
        let relogin = requests.iter().rposition(|(p, _)| p == LOGIN_PATH).unwrap();
        let after = &requests[relogin + 1..];
        assert_eq!(after.len(), 2);
        for (_, cookie) in after {
            assert_eq!(cookie.as_deref(), Some("t2"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_requests_share_relogin() {
        let panel = Arc::new(FakePanel::default());
        let session = Arc::new(session(&panel, true));
        session.login().await.unwrap();
        panel.expire();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session
                    .call(Method::GET, "panel/api/inbounds/list", None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(panel.login_calls(), 2);
        assert_eq!(session.cookie().await.unwrap().value, "t2");
    }

    #[tokio::test]
    async fn test_forbidden_counts_as_expiry() {
        let panel = Arc::new(FakePanel::default());
        panel.set(|s| s.expired_status = Some(403));
        let session = session(&panel, true);
        session.login().await.unwrap();

        panel.expire();
        session.call(Method::GET, "panel/api/inbounds/list", None).await.unwrap();
        assert_eq!(panel.login_calls(), 2);
        assert_eq!(session.cookie().await.unwrap().value, "t2");
    }

    #[tokio::test]
    async fn test_forbidden_without_relogin() {
        let panel = Arc::new(FakePanel::default());
        panel.set(|s| s.expired_status = Some(403));
        let session = session(&panel, false);
        session.login().await.unwrap();

        panel.expire();
        let err = session.call(Method::GET, "panel/api/inbounds/list", None).await;
        assert!(matches!(err, Err(Error::NotAuthenticated)));
        assert_eq!(panel.login_calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_as_http() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);
        session.login().await.unwrap();
        panel.set(|s| s.server_error = true);

        match session.call(Method::GET, "panel/api/inbounds/list", None).await {
            Err(Error::Http { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("unexpected: {:?}", other),
        }
        // 非认证错误不触发重新登录，也不重试
        assert_eq!(panel.login_calls(), 1);
        assert_eq!(panel.requests().len(), 2);
        assert!(session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_cancelled_login_leaves_session_empty() {
        let panel = HangingPanel::new(0);
        let config = PanelConfig::new("http://panel.test", "admin", "admin");
        let session = Session::new(&config, panel.clone());

        let result = tokio::time::timeout(Duration::from_millis(50), session.login()).await;
        assert!(result.is_err());
        assert!(!session.is_authenticated().await);
        assert!(session.cookie().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_relogin_keeps_old_cookie() {
        let panel = HangingPanel::new(1);
        let config = PanelConfig::new("http://panel.test", "admin", "admin");
        let session = Session::new(&config, panel.clone());
        session.login().await.unwrap();

        let call = session.call(Method::GET, "panel/api/inbounds/list", None);
        assert!(tokio::time::timeout(Duration::from_millis(50), call).await.is_err());

        assert!(session.is_authenticated().await);
        assert_eq!(session.cookie().await.unwrap().value, "t1");
        // 登录锁已随被丢弃的 future 释放
        tokio::time::timeout(Duration::from_secs(1), session.logout())
            .await
            .unwrap();
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_logout() {
        let panel = Arc::new(FakePanel::default());
        let session = session(&panel, true);
        session.login().await.unwrap();
        session.logout().await;

        assert!(!session.is_authenticated().await);
        assert!(matches!(
            session.call(Method::GET, "panel/api/inbounds/list", None).await,
            Err(Error::NotAuthenticated)
        ));
    }
}
