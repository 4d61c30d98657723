use crate::{
    coach::Coach,
    config::{SharedConfig, DEFAULT_USER},
    users::{
        issue_session, verify_session, AdminStats, SessionUser, UserRegistry, SESSION_COOKIE,
    },
    utils::{base64_encode, open_in_browser},
};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http::{
    header::{self, HeaderMap, HeaderValue},
    Method, Response, StatusCode, Uri,
};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::rt::{TokioExecutor, TokioIo};
use is_terminal::IsTerminal;
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, convert::Infallible, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_graceful::Shutdown;
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../assets/index.html");

type AppResponse = Response<BoxBody<Bytes, Infallible>>;

pub async fn run(config: SharedConfig, addr: Option<String>) -> Result<()> {
    let addr = match addr {
        Some(addr) => {
            if let Ok(port) = addr.parse::<u16>() {
                format!("127.0.0.1:{port}")
            } else {
                addr
            }
        }
        None => config.read().serve_addr(),
    };
    let persona_name = config.read().persona.name.clone();
    let server = Arc::new(Server::new(&config)?);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let stop_server = server.clone().run(listener).await?;
    let url = format!("http://{addr}");
    println!("Chat with {persona_name} at: {url}");
    if std::io::stdout().is_terminal() {
        let browse_url = url.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            open_in_browser(&browse_url);
        });
    }
    shutdown_signal().await;
    let _ = stop_server.send(());
    server.coach.flush()?;
    Ok(())
}

struct Server {
    coach: Coach,
    registry: RwLock<UserRegistry>,
    multi_user: bool,
    admin_password: Option<String>,
    session_secret: String,
    index_page: Bytes,
}

impl Server {
    fn new(config: &SharedConfig) -> Result<Self> {
        let coach = Coach::init(config)?;
        let (registry, multi_user, admin_password, session_secret, index_page) = {
            let config = config.read();
            let index_page = INDEX_HTML
                .replace("__NAME__", &config.persona.name)
                .replace("__GREETING__", &config.persona.greeting)
                .replace("__MULTI_USER__", if config.multi_user { "true" } else { "false" });
            (
                UserRegistry::load(&config.users_file()),
                config.multi_user,
                config.admin_password.clone(),
                config.session_secret.clone(),
                Bytes::from(index_page),
            )
        };
        let session_secret = match session_secret {
            Some(secret) => secret,
            None => {
                if multi_user {
                    warn!("No session_secret configured, sessions will not survive a restart");
                }
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
        };
        Ok(Self {
            coach,
            registry: RwLock::new(registry),
            multi_user,
            admin_password,
            session_secret,
            index_page,
        })
    }

    async fn run(self: Arc<Self>, listener: TcpListener) -> Result<oneshot::Sender<()>> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let shutdown = Shutdown::new(async { rx.await.unwrap_or_default() });
            let guard = shutdown.guard_weak();

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        let Ok((cnx, _)) = res else {
                            continue;
                        };

                        let stream = TokioIo::new(cnx);
                        let server = self.clone();
                        shutdown.spawn_task(async move {
                            let hyper_service = service_fn(move |request: hyper::Request<Incoming>| {
                                server.clone().handle(request)
                            });
                            let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                                .serve_connection_with_upgrades(stream, hyper_service)
                                .await;
                        });
                    }
                    _ = guard.cancelled() => {
                        break;
                    }
                }
            }
        });
        Ok(tx)
    }

    async fn handle(
        self: Arc<Self>,
        req: hyper::Request<Incoming>,
    ) -> std::result::Result<AppResponse, hyper::Error> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let path = uri.path().to_string();
        let multi_user = self.multi_user;
        let res = match (&method, path.as_str()) {
            (&Method::GET, "/") | (&Method::GET, "/index.html") => self.index(),
            (&Method::POST, "/ask") => self.ask(req).await,
            (&Method::GET, "/history") => self.history(req.headers()),
            (&Method::POST, "/toggle-favorite") => self.toggle_favorite(req).await,
            (&Method::POST, "/register") if multi_user => self.register(req).await,
            (&Method::POST, "/login") if multi_user => self.login(req).await,
            (&Method::GET, "/logout") if multi_user => self.logout(),
            (&Method::GET, "/admin/stats") if multi_user => self.admin_stats(&uri),
            (&Method::OPTIONS, _) => {
                let mut res: AppResponse = Response::default();
                *res.status_mut() = StatusCode::NO_CONTENT;
                Ok(res)
            }
            _ => Ok(ret_not_found()),
        };
        let mut res = match res {
            Ok(res) => {
                info!("{method} {path} {}", res.status().as_u16());
                res
            }
            Err(err) => {
                error!("{method} {path} 500 {err}");
                ret_err(err)
            }
        };
        set_cors_header(&mut res);
        Ok(res)
    }

    fn index(&self) -> Result<AppResponse> {
        let res = Response::builder()
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Full::new(self.index_page.clone()).boxed())?;
        Ok(res)
    }

    async fn ask(&self, req: hyper::Request<Incoming>) -> Result<AppResponse> {
        let Some(user_id) = self.resolve_user(req.headers()) else {
            return ret_unauthenticated();
        };
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = req.collect().await?.to_bytes();
        let params = parse_ask_params(content_type.as_deref(), &body)?;

        let question = params.question.trim();
        if question.is_empty() {
            return ret_json(json!({
                "success": false,
                "response": "Please ask me something!",
            }));
        }

        let outcome = self.coach.ask(&user_id, question, params.voice).await;
        let mut data = json!({
            "success": outcome.success,
            "response": outcome.response,
            "has_voice": outcome.has_voice(),
            "conversation_count": outcome.conversation_count,
        });
        if let Some(audio) = &outcome.audio {
            data["audio"] = json!(base64_encode(audio));
        }
        if let Some(timestamp) = &outcome.timestamp {
            data["timestamp"] = json!(timestamp);
        }
        if let Some(error) = &outcome.error {
            data["error"] = json!(error);
        }
        ret_json(data)
    }

    fn history(&self, headers: &HeaderMap) -> Result<AppResponse> {
        let Some(user_id) = self.resolve_user(headers) else {
            return ret_unauthenticated();
        };
        let view = self.coach.history(&user_id);
        ret_json(serde_json::to_value(&view)?)
    }

    async fn toggle_favorite(&self, req: hyper::Request<Incoming>) -> Result<AppResponse> {
        let Some(user_id) = self.resolve_user(req.headers()) else {
            return ret_unauthenticated();
        };
        let body = req.collect().await?.to_bytes();
        let form = parse_form(&body)?;
        let Some(timestamp) = form.get("timestamp").filter(|v| !v.is_empty()) else {
            return ret_json(json!({
                "success": false,
                "error": "No timestamp provided",
            }));
        };
        match self.coach.toggle_favorite(&user_id, timestamp) {
            Ok(is_favorite) => ret_json(json!({
                "success": true,
                "is_favorite": is_favorite,
            })),
            Err(err) => ret_json(json!({
                "success": false,
                "error": err.to_string(),
            })),
        }
    }

    async fn register(&self, req: hyper::Request<Incoming>) -> Result<AppResponse> {
        let body = req.collect().await?.to_bytes();
        let params: RegisterParams = serde_json::from_slice(&body)
            .map_err(|err| anyhow!("Invalid request body, {err}"))?;
        let result = self
            .registry
            .write()
            .register(&params.username, &params.email, &params.password);
        match result {
            Ok(record) => {
                self.coach.create_user_store(&record.user_id)?;
                ret_json(json!({
                    "success": true,
                    "user_id": record.user_id,
                    "message": "Account created successfully",
                }))
            }
            Err(err) => ret_json(json!({
                "success": false,
                "message": err.to_string(),
            })),
        }
    }

    async fn login(&self, req: hyper::Request<Incoming>) -> Result<AppResponse> {
        let body = req.collect().await?.to_bytes();
        let params: LoginParams = serde_json::from_slice(&body)
            .map_err(|err| anyhow!("Invalid request body, {err}"))?;
        let session = {
            let registry = self.registry.read();
            registry
                .authenticate(&params.username, &params.password)
                .map(|record| SessionUser {
                    user_id: record.user_id.clone(),
                    username: params.username.trim().to_string(),
                })
        };
        let Some(session) = session else {
            let mut res = ret_json(json!({
                "success": false,
                "message": "Invalid credentials",
            }))?;
            *res.status_mut() = StatusCode::UNAUTHORIZED;
            return Ok(res);
        };
        let token = issue_session(&self.session_secret, &session)?;
        let mut res = ret_json(json!({
            "success": true,
            "username": session.username,
        }))?;
        res.headers_mut().insert(
            header::SET_COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly"))?,
        );
        Ok(res)
    }

    fn logout(&self) -> Result<AppResponse> {
        let res = Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, "/")
            .header(
                header::SET_COOKIE,
                format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"),
            )
            .body(Full::new(Bytes::new()).boxed())?;
        Ok(res)
    }

    fn admin_stats(&self, uri: &Uri) -> Result<AppResponse> {
        let given = uri.query().and_then(|query| {
            query.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == "password").then(|| value.to_string())
            })
        });
        let authorized = match (&self.admin_password, given) {
            (Some(expected), Some(given)) => {
                let given = match urlencoding::decode(&given) {
                    Ok(v) => v.into_owned(),
                    Err(_) => given,
                };
                &given == expected
            }
            _ => false,
        };
        if !authorized {
            let mut res = ret_json(json!({ "error": "Invalid admin password" }))?;
            *res.status_mut() = StatusCode::FORBIDDEN;
            return Ok(res);
        }
        let stats = {
            let registry = self.registry.read();
            AdminStats {
                total_users: registry.len(),
                active_users: registry.active_count(),
                total_conversations: self.coach.total_conversations(&registry.user_ids()),
            }
        };
        ret_json(serde_json::to_value(&stats)?)
    }

    /// Single-user mode maps everyone to the default store; multi-user mode
    /// requires a valid session cookie.
    fn resolve_user(&self, headers: &HeaderMap) -> Option<String> {
        if !self.multi_user {
            return Some(DEFAULT_USER.to_string());
        }
        self.session_user(headers).map(|v| v.user_id)
    }

    fn session_user(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
        let token = cookies.split(';').find_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })?;
        verify_session(&self.session_secret, &token)
    }
}

#[derive(Debug, Deserialize)]
struct AskParams {
    #[serde(default)]
    question: String,
    #[serde(default = "default_voice", alias = "generate_voice")]
    voice: bool,
}

#[derive(Debug, Deserialize)]
struct RegisterParams {
    username: String,
    #[serde(default)]
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    username: String,
    password: String,
}

fn default_voice() -> bool {
    true
}

fn parse_ask_params(content_type: Option<&str>, body: &[u8]) -> Result<AskParams> {
    if content_type.is_some_and(|v| v.contains("application/json")) {
        serde_json::from_slice(body).map_err(|err| anyhow!("Invalid request body, {err}"))
    } else {
        let form = parse_form(body)?;
        Ok(AskParams {
            question: form.get("question").cloned().unwrap_or_default(),
            voice: form
                .get("voice")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

fn parse_form(body: &[u8]) -> Result<HashMap<String, String>> {
    let text = std::str::from_utf8(body).context("Invalid form body")?;
    let mut form = HashMap::new();
    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = value.replace('+', " ");
        let value = urlencoding::decode(&value).context("Invalid form body")?;
        form.insert(key.to_string(), value.into_owned());
    }
    Ok(form)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler")
}

fn set_cors_header(res: &mut AppResponse) {
    res.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    res.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,PUT,PATCH,DELETE"),
    );
    res.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type,Authorization"),
    );
}

fn ret_json(data: Value) -> Result<AppResponse> {
    let res = Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(data.to_string())).boxed())?;
    Ok(res)
}

fn ret_unauthenticated() -> Result<AppResponse> {
    let mut res = ret_json(json!({
        "success": false,
        "error": "Not authenticated",
    }))?;
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    Ok(res)
}

fn ret_not_found() -> AppResponse {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from("404 - Not Found")).boxed())
        .unwrap()
}

fn ret_err<T: std::fmt::Display>(err: T) -> AppResponse {
    let data = json!({
        "success": false,
        "response": format!("Server error: {err}"),
    });
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(data.to_string())).boxed())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_form() {
        let form = parse_form(b"question=What+is+discipline%3F&voice=true").unwrap();
        assert_eq!(form.get("question").unwrap(), "What is discipline?");
        assert_eq!(form.get("voice").unwrap(), "true");

        let form = parse_form(b"timestamp=2024-01-15T08%3A30%3A00").unwrap();
        assert_eq!(form.get("timestamp").unwrap(), "2024-01-15T08:30:00");

        assert!(parse_form(b"").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ask_params() {
        let params =
            parse_ask_params(Some("application/json"), br#"{"question":"hi","voice":false}"#)
                .unwrap();
        assert_eq!(params.question, "hi");
        assert!(!params.voice);

        // the json field defaults to voice on, the form field to voice off
        let params = parse_ask_params(Some("application/json"), br#"{"question":"hi"}"#).unwrap();
        assert!(params.voice);
        let params = parse_ask_params(
            Some("application/json"),
            br#"{"question":"hi","generate_voice":false}"#,
        )
        .unwrap();
        assert!(!params.voice);

        let params = parse_ask_params(None, b"question=hi").unwrap();
        assert_eq!(params.question, "hi");
        assert!(!params.voice);
    }
}
