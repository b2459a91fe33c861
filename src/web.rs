//! HTTP front end for the message form.
//!
//! Handlers hold no state of their own. Each one forwards a [`Request`] to the
//! control loop and turns the reply into a response.
//!
//! The form body is decoded by hand so the message keeps its exact bytes. A
//! percent-escape that is not valid UTF-8 reaches the display as sent.

use crate::app::{Request, SendForm, Submission};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{any, post};
use axum::Router;
use percent_encoding::percent_decode;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// `/` and every unknown path serve the form; `POST /send` submits it.
pub fn router(requests: mpsc::Sender<Request>) -> Router {
    Router::new()
        .route("/", any(index))
        .route("/send", post(send).fallback(index))
        .fallback(index)
        .with_state(requests)
        .layer(TraceLayer::new_for_http())
}

fn unavailable() -> Response {
    error!("control loop is not running");
    (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
}

async fn index(State(requests): State<mpsc::Sender<Request>>) -> Response {
    let (reply, page) = oneshot::channel();
    if requests.send(Request::Page { reply }).await.is_err() {
        return unavailable();
    }
    match page.await {
        Ok(html) => Html(html).into_response(),
        Err(_) => unavailable(),
    }
}

/// Decode an `application/x-www-form-urlencoded` value without UTF-8 checks.
fn decode_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced).collect()
}

/// Pull `message` and `fontsize` out of a urlencoded body. The first occurrence of
/// a field wins; unknown fields are ignored.
pub fn parse_send_form(body: &[u8]) -> SendForm {
    let mut form = SendForm::default();
    for pair in body.split(|&b| b == b'&').filter(|pair| !pair.is_empty()) {
        let (name, value) = match pair.iter().position(|&b| b == b'=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, &[][..]),
        };
        match decode_component(name).as_slice() {
            b"message" if form.message.is_none() => {
                form.message = Some(decode_component(value));
            }
            b"fontsize" if form.fontsize.is_none() => {
                let value = decode_component(value);
                form.fontsize = Some(String::from_utf8_lossy(&value).into_owned());
            }
            other => debug!(field = %String::from_utf8_lossy(other), "ignoring form field"),
        }
    }
    form
}

async fn send(State(requests): State<mpsc::Sender<Request>>, body: Bytes) -> Response {
    let form = parse_send_form(&body);

    let (reply, outcome) = oneshot::channel();
    if requests.send(Request::Submit { form, reply }).await.is_err() {
        return unavailable();
    }
    match outcome.await {
        Ok(Submission::Accepted(html)) => Html(html).into_response(),
        Ok(Submission::Rejected) => (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
        Err(_) => unavailable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{self, App};
    use crate::canvas::RecordingCanvas;
    use crate::glyph::FontSize;
    use crate::renderer::QrScreen;
    use crate::settings::SettingsStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request as HttpRequest};
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> App<RecordingCanvas> {
        App::new(
            RecordingCanvas::new(416, 240),
            SettingsStore::new(dir.path().join("settings.json")),
            QrScreen::new("E-Paper-Message", "12345678", Ipv4Addr::new(192, 168, 4, 1), 175),
            Duration::from_secs(60),
            Instant::now(),
        )
    }

    fn get(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_form(body: &'static str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(Method::POST)
            .uri("/send")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Send `requests` through the router while the control loop runs alongside.
    async fn exchange(
        app: App<RecordingCanvas>,
        requests: Vec<HttpRequest<Body>>,
    ) -> (App<RecordingCanvas>, Vec<(StatusCode, String)>) {
        let (tx, rx) = mpsc::channel(8);
        let client = async move {
            let router = router(tx);
            let mut responses = Vec::new();
            for request in requests {
                let response = router.clone().oneshot(request).await.unwrap();
                let status = response.status();
                responses.push((status, body_text(response).await));
            }
            drop(router);
            responses
        };
        tokio::join!(app::run(app, rx), client)
    }

    #[tokio::test]
    async fn test_root_serves_form() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let client = async move {
            let response = router(tx).oneshot(get("/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "text/html; charset=utf-8"
            );
            body_text(response).await
        };
        let (_, body) = tokio::join!(app::run(app(&dir), rx), client);
        assert!(body.contains("<title>E-Paper Message</title>"));
        assert!(body.contains("Hello World!"));
    }

    #[tokio::test]
    async fn test_unknown_paths_and_get_send_serve_form() {
        let dir = TempDir::new().unwrap();
        let (_, responses) = exchange(app(&dir), vec![get("/generate_204"), get("/send")]).await;
        for (status, body) in responses {
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("action='/send'"));
        }
    }

    #[tokio::test]
    async fn test_submit_updates_display_and_redirects() {
        let dir = TempDir::new().unwrap();
        let (app, responses) = exchange(
            app(&dir),
            vec![post_form("message=%C3%9E%C3%B3r+Hello&fontsize=3"), get("/")],
        )
        .await;

        let (status, body) = &responses[0];
        assert_eq!(*status, StatusCode::OK);
        assert!(body.contains("setTimeout(function(){window.location.href='/';}, 2000);"));
        assert!(responses[1].1.contains(">Þór Hello</textarea>"));

        assert_eq!(app.state().message, "Þór Hello");
        assert_eq!(app.state().font_size, FontSize::Large);
        assert!(!app.state().showing_qr);
        assert_eq!(app.canvas().text_rows(), vec!["Por Hello"]);
    }

    #[tokio::test]
    async fn test_submit_without_message_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, responses) = exchange(app(&dir), vec![post_form("fontsize=4")]).await;

        assert_eq!(
            responses,
            vec![(StatusCode::BAD_REQUEST, "Bad Request".to_string())]
        );
        assert_eq!(app.state().font_size, FontSize::Medium);
        assert!(app.canvas().ops.is_empty());
    }

    #[tokio::test]
    async fn test_message_bytes_reach_display_undecoded() {
        let dir = TempDir::new().unwrap();
        let (app, responses) =
            exchange(app(&dir), vec![post_form("message=%C3Ab&fontsize=1")]).await;

        assert_eq!(responses[0].0, StatusCode::OK);
        let rows = app.canvas().text_rows();
        // One placeholder per stray lead byte; 0xC3 swallows the byte after it
        assert_eq!(rows, vec!["?b"]);
        assert_eq!(app.state().message_bytes, vec![0xC3, b'A', b'b']);
        assert_eq!(app.state().font_size, FontSize::Small);
    }

    #[tokio::test]
    async fn test_latin1_byte_draws_one_placeholder() {
        let dir = TempDir::new().unwrap();
        let (app, responses) = exchange(app(&dir), vec![post_form("message=a%E9b")]).await;
        assert_eq!(responses[0].0, StatusCode::OK);
        assert_eq!(app.canvas().text_rows(), vec!["a?b"]);
    }

    #[test]
    fn test_parse_send_form_keeps_raw_bytes() {
        let form = parse_send_form(b"fontsize=3&message=%C3%9E+x%2By%FF&message=second&extra");
        assert_eq!(form.message, Some(vec![0xC3, 0x9E, b' ', b'x', b'+', b'y', 0xFF]));
        assert_eq!(form.fontsize.as_deref(), Some("3"));

        assert_eq!(
            parse_send_form(b"message"),
            SendForm {
                message: Some(Vec::new()),
                fontsize: None,
            }
        );
        assert_eq!(parse_send_form(b""), SendForm::default());
        assert_eq!(parse_send_form(b"fontsize=4").message, None);
    }

    #[tokio::test]
    async fn test_stopped_loop_gives_503() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let response = router(tx).oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
