//! [`GameApi`] over HTTP using `reqwest`.
//!
//! | Operation         | Request                                   |
//! |-------------------|-------------------------------------------|
//! | `create_game`     | `POST /games`                             |
//! | `join_game`       | `POST /games/{id}/join`                   |
//! | `submit_guess`    | `POST /games/{id}/guesses`                |
//! | `fetch_game`      | `GET /games/{id}?playerId=` (conditional) |
//! | `list_open_games` | `GET /games?status=WAITING`               |
//! | `register`        | `POST /auth/register`                     |
//! | `login`           | `POST /auth/login`                        |
//! | `fetch_stats`     | `GET /players/{id}/stats`                 |
//!
//! Every request carries a fresh `X-Request-Id`. After a successful
//! `register` or `login` the session token is sent as a bearer token.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use word_duel_sync::api::{FetchOutcome, GameApi, HttpGameApi};
//!
//! let api = HttpGameApi::new("https://api.example.com/v1")?;
//! match api.fetch_game("g1", "p1", None).await? {
//!     FetchOutcome::Modified { view, .. } => println!("status: {:?}", view.phase),
//!     FetchOutcome::NotModified => {}
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::{
    ApiError, ApiErrorKind, ApiResult, AuthSession, CreateGameParams, CreatedGame, Credentials,
    FetchOutcome, GameApi, GameSummary, JoinGameParams, PlayerStats,
};
use crate::error::SyncError;
use crate::protocol::{GameView, Guess};

/// Header carrying the per-request correlation id.
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Lobby filter for games that still have a free seat.
const OPEN_GAMES_STATUS: &str = "WAITING";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GuessBody<'a> {
    player_id: &'a str,
    word: &'a str,
}

/// HTTP client for the Word Duel API.
#[derive(Debug)]
pub struct HttpGameApi {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<String>>,
}

impl HttpGameApi {
    /// A client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEndpoint`] if `base_url` is not an
    /// absolute `http://` or `https://` URL.
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Like [`new`](Self::new), reusing an existing `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEndpoint`] if `base_url` is not an
    /// absolute `http://` or `https://` URL.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, SyncError> {
        let invalid = |reason: String| SyncError::InvalidEndpoint {
            endpoint: base_url.to_owned(),
            reason,
        };
        let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        Ok(Self {
            client,
            base_url: url,
            token: RwLock::new(None),
        })
    }

    /// Use `token` as the bearer token for subsequent requests.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Replace (or clear) the bearer token.
    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    /// The bearer token currently in use.
    pub fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(%method, %url, %request_id, "api request");
        let builder = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id);
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await.map_err(network_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        decode(response).await
    }

    async fn authenticate(&self, path: &str, credentials: Credentials) -> ApiResult<AuthSession> {
        let request = self
            .request(Method::POST, self.url(&["auth", path]))
            .json(&credentials);
        let session: AuthSession = self.send(request).await?;
        self.set_token(Some(session.token.clone()));
        Ok(session)
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn create_game(&self, params: CreateGameParams) -> ApiResult<CreatedGame> {
        let request = self.request(Method::POST, self.url(&["games"])).json(&params);
        self.send(request).await
    }

    async fn join_game(&self, game_id: &str, params: JoinGameParams) -> ApiResult<GameView> {
        let request = self
            .request(Method::POST, self.url(&["games", game_id, "join"]))
            .json(&params);
        self.send(request).await
    }

    async fn submit_guess(&self, game_id: &str, player_id: &str, word: &str) -> ApiResult<Guess> {
        let request = self
            .request(Method::POST, self.url(&["games", game_id, "guesses"]))
            .json(&GuessBody { player_id, word });
        self.send(request).await
    }

    async fn fetch_game(
        &self,
        game_id: &str,
        player_id: &str,
        if_none_match: Option<&str>,
    ) -> ApiResult<FetchOutcome> {
        let mut url = self.url(&["games", game_id]);
        url.query_pairs_mut().append_pair("playerId", player_id);
        let mut request = self.request(Method::GET, url);
        if let Some(etag) = if_none_match {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(network_error)?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let view = decode(response).await?;
        Ok(FetchOutcome::Modified { view, etag })
    }

    async fn list_open_games(&self) -> ApiResult<Vec<GameSummary>> {
        let mut url = self.url(&["games"]);
        url.query_pairs_mut().append_pair("status", OPEN_GAMES_STATUS);
        self.send(self.request(Method::GET, url)).await
    }

    async fn register(&self, credentials: Credentials) -> ApiResult<AuthSession> {
        self.authenticate("register", credentials).await
    }

    async fn login(&self, credentials: Credentials) -> ApiResult<AuthSession> {
        self.authenticate("login", credentials).await
    }

    async fn fetch_stats(&self, player_id: &str) -> ApiResult<PlayerStats> {
        let url = self.url(&["players", player_id, "stats"]);
        self.send(self.request(Method::GET, url)).await
    }
}

fn network_error(err: reqwest::Error) -> ApiError {
    warn!("api request failed before a response: {err}");
    ApiError::network(err.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response.bytes().await.map_err(network_error)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ApiError::new(
            ApiErrorKind::Unknown,
            format!("unexpected response body: {e}"),
        )
    })
}

/// Turn a non-success response into an [`ApiError`], preferring the
/// structured body and falling back to the status code.
async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ApiError>(&body) {
        Ok(err) => err,
        Err(_) => ApiError::new(
            kind_for_status(status),
            String::from_utf8_lossy(&body).into_owned(),
        ),
    }
}

fn kind_for_status(status: StatusCode) -> ApiErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiErrorKind::Unauthorized,
        StatusCode::NOT_FOUND => ApiErrorKind::GameNotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiErrorKind::ValidationError
        }
        StatusCode::TOO_MANY_REQUESTS => ApiErrorKind::RateLimited,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ApiErrorKind::ServiceUnavailable
        }
        s if s.is_server_error() => ApiErrorKind::InternalError,
        _ => ApiErrorKind::Unknown,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serve one canned HTTP response per entry in `responses`, forwarding
    /// each raw request (head and body) to the returned receiver.
    async fn start_mock_server(responses: Vec<String>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (req_tx, req_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                let _ = req_tx.send(request);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}"), req_rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\nconnection: close\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str(&format!("content-length: {}\r\n\r\n{body}", body.len()));
        out
    }

    const VIEW: &str = r#"{"gameId":"g1","status":"ACTIVE","player1":{"id":"p1","name":"Ada"},"player2":{"id":"p2","name":"Grace"},"currentTurn":"p1","guesses":[],"myTurn":true}"#;

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            HttpGameApi::new("ws://api.example.com"),
            Err(SyncError::InvalidEndpoint { .. })
        ));
        assert!(HttpGameApi::new("https://api.example.com/v1").is_ok());
    }

    #[test]
    fn url_joins_and_escapes_segments() {
        let api = HttpGameApi::new("https://api.example.com/v1/").unwrap();
        assert_eq!(
            api.url(&["games", "a/b", "join"]).as_str(),
            "https://api.example.com/v1/games/a%2Fb/join"
        );
    }

    #[test]
    fn status_fallback_kinds() {
        assert_eq!(kind_for_status(StatusCode::NOT_FOUND), ApiErrorKind::GameNotFound);
        assert_eq!(
            kind_for_status(StatusCode::TOO_MANY_REQUESTS),
            ApiErrorKind::RateLimited
        );
        assert_eq!(
            kind_for_status(StatusCode::INTERNAL_SERVER_ERROR),
            ApiErrorKind::InternalError
        );
        assert_eq!(kind_for_status(StatusCode::IM_A_TEAPOT), ApiErrorKind::Unknown);
    }

    #[tokio::test]
    async fn fetch_returns_view_and_etag() {
        let (base, mut requests) =
            start_mock_server(vec![response("200 OK", &[("etag", "\"v7\"")], VIEW)]).await;
        let api = HttpGameApi::new(&base).unwrap();

        let outcome = api.fetch_game("g1", "p1", None).await.unwrap();
        let FetchOutcome::Modified { view, etag } = outcome else {
            panic!("expected Modified");
        };
        assert!(view.my_turn);
        assert_eq!(etag.as_deref(), Some("\"v7\""));

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /games/g1?playerId=p1 HTTP/1.1"));
        assert!(request.to_lowercase().contains("x-request-id:"));
        assert!(!request.to_lowercase().contains("if-none-match"));
    }

    #[tokio::test]
    async fn conditional_fetch_maps_304_to_not_modified() {
        let (base, mut requests) =
            start_mock_server(vec![response("304 Not Modified", &[], "")]).await;
        let api = HttpGameApi::new(&base).unwrap();

        let outcome = api.fetch_game("g1", "p1", Some("\"v7\"")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::NotModified);

        let request = requests.recv().await.unwrap().to_lowercase();
        assert!(request.contains("if-none-match: \"v7\""));
    }

    #[tokio::test]
    async fn structured_error_body_is_decoded() {
        let body = r#"{"kind":"NOT_YOUR_TURN","message":"wait for Grace"}"#;
        let (base, _requests) =
            start_mock_server(vec![response("409 Conflict", &[], body)]).await;
        let api = HttpGameApi::new(&base).unwrap();

        let err = api.submit_guess("g1", "p1", "CRANE").await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::NotYourTurn);
        assert_eq!(err.message, "wait for Grace");
    }

    #[tokio::test]
    async fn unstructured_error_falls_back_to_status() {
        let (base, _requests) =
            start_mock_server(vec![response("503 Service Unavailable", &[], "down")]).await;
        let api = HttpGameApi::new(&base).unwrap();

        let err = api.fetch_game("g1", "p1", None).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::ServiceUnavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let api = HttpGameApi::new("http://127.0.0.1:1").unwrap();
        let err = api.fetch_game("g1", "p1", None).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Network);
    }

    #[tokio::test]
    async fn login_token_is_sent_as_bearer() {
        let session = r#"{"token":"tok-1","playerId":"p1","username":"ada"}"#;
        let (base, mut requests) = start_mock_server(vec![
            response("200 OK", &[], session),
            response("200 OK", &[], "[]"),
        ])
        .await;
        let api = HttpGameApi::new(&base).unwrap();

        let auth = api
            .login(Credentials {
                username: "ada".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        assert_eq!(auth.player_id, "p1");
        assert_eq!(api.token().as_deref(), Some("tok-1"));

        let games = api.list_open_games().await.unwrap();
        assert!(games.is_empty());

        let login = requests.recv().await.unwrap();
        assert!(login.starts_with("POST /auth/login HTTP/1.1"));
        assert!(login.contains(r#""username":"ada""#));

        let list = requests.recv().await.unwrap();
        assert!(list.starts_with("GET /games?status=WAITING HTTP/1.1"));
        assert!(list.to_lowercase().contains("authorization: bearer tok-1"));
    }
}
