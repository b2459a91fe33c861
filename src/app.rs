//! # Application State and Control Loop
//!
//! One task owns the [`App`]: the current message, the font size, whether the QR
//! boot screen is up, and the canvas. HTTP handlers never touch any of it directly.
//! They send a [`Request`] over a channel and wait for the reply, so every state
//! change and every render happens here, one at a time.
//!
//! A render blocks the loop for as long as the panel takes to refresh. Requests that
//! arrive in the meantime queue in the channel and are served afterwards.

use crate::canvas::Canvas;
use crate::glyph::FontSize;
use crate::normalize::HexBytes;
use crate::page::{render_form, render_form_with_redirect, FormView};
use crate::renderer::{render_message, render_qr_codes, QrScreen};
use crate::settings::{Settings, SettingsStore};
use std::future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Longest message kept from a submission, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 200;
/// Shown when a submission is blank after trimming.
pub const EMPTY_MESSAGE: &str = "Empty message";
/// How often the loop logs its status.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Fields of `POST /send`. Both are optional so a missing field can be reported
/// instead of failing extraction.
///
/// `message` holds the submitted bytes as sent, valid UTF-8 or not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendForm {
    pub message: Option<Vec<u8>>,
    pub fontsize: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The message was stored and drawn; carries the page to send back.
    Accepted(String),
    /// No `message` field; nothing changed.
    Rejected,
}

/// Work for the control loop, with a channel for the answer.
#[derive(Debug)]
pub enum Request {
    Page {
        reply: oneshot::Sender<String>,
    },
    Submit {
        form: SendForm,
        reply: oneshot::Sender<Submission>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppState {
    /// Text of the message for the page and the settings file
    pub message: String,
    /// Bytes the display renders; only these reach the normalizer
    pub message_bytes: Vec<u8>,
    pub font_size: FontSize,
    pub showing_qr: bool,
    pub booted_at: Instant,
}

pub struct App<C> {
    canvas: C,
    store: SettingsStore,
    qr: QrScreen,
    qr_duration: Duration,
    state: AppState,
}

impl<C: Canvas> App<C> {
    /// Load the saved settings. Nothing is drawn until [`App::boot`].
    pub fn new(
        canvas: C,
        store: SettingsStore,
        qr: QrScreen,
        qr_duration: Duration,
        booted_at: Instant,
    ) -> Self {
        let Settings { message, font_size } = store.load();
        Self {
            canvas,
            store,
            qr,
            qr_duration,
            state: AppState {
                message_bytes: message.clone().into_bytes(),
                message,
                font_size,
                showing_qr: true,
                booted_at,
            },
        }
    }

    /// Show the QR boot screen. The saved message follows once the QR period is over.
    pub fn boot(&mut self) {
        self.state.showing_qr = true;
        if let Err(err) = render_qr_codes(&mut self.canvas, &self.qr) {
            error!(%err, "QR screen not shown");
        }
        info!(
            seconds = self.qr_duration.as_secs(),
            "QR codes will be displayed before switching to the saved message"
        );
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    fn form_view(&self) -> FormView<'_> {
        FormView {
            message: &self.state.message,
            font_size: self.state.font_size,
        }
    }

    /// The form, prefilled with the current message and size.
    pub fn page(&self) -> String {
        render_form(&self.form_view())
    }

    /// Apply a form submission: store it, draw it and leave the QR screen.
    pub fn submit(&mut self, form: SendForm) -> Submission {
        let Some(raw) = form.message else {
            warn!("submission without a message field");
            return Submission::Rejected;
        };

        if let Some(value) = form.fontsize.as_deref() {
            match parse_font_size(value) {
                Some(size) => {
                    info!(font_size = size.index(), "font size changed");
                    self.state.font_size = size;
                }
                None => warn!(value, "ignoring invalid font size"),
            }
        }

        debug!(len = raw.len(), bytes = %HexBytes(&raw), "raw message received");
        let mut message = trim_ascii_whitespace(cap_message(&raw)).to_vec();
        if message.is_empty() {
            message = EMPTY_MESSAGE.as_bytes().to_vec();
        }
        self.state.message = String::from_utf8_lossy(&message).into_owned();
        self.state.message_bytes = message;

        let settings = Settings {
            message: self.state.message.clone(),
            font_size: self.state.font_size,
        };
        if let Err(err) = self.store.save(&settings) {
            error!(%err, "could not save message, showing it anyway");
        }

        self.show_message();
        self.state.showing_qr = false;
        info!("message processed and displayed");
        Submission::Accepted(render_form_with_redirect(&self.form_view()))
    }

    fn show_message(&mut self) {
        let state = &self.state;
        if let Err(err) = render_message(&mut self.canvas, &state.message_bytes, state.font_size) {
            error!(%err, "display refresh failed");
        }
    }

    /// When the QR screen is due to give way, if it is still up.
    pub fn qr_deadline(&self) -> Option<Instant> {
        self.state
            .showing_qr
            .then(|| self.state.booted_at + self.qr_duration)
    }

    /// Switch from the QR screen to the message once the QR period has elapsed.
    ///
    /// Returns `true` on the tick that switches; later ticks do nothing.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.qr_deadline() {
            Some(deadline) if now >= deadline => {
                info!("QR period elapsed, switching to saved message");
                self.state.showing_qr = false;
                self.show_message();
                true
            }
            _ => false,
        }
    }

    pub fn log_status(&self, now: Instant) {
        match self.qr_deadline() {
            Some(deadline) => info!(
                seconds_until_message = deadline.saturating_duration_since(now).as_secs(),
                "showing QR codes"
            ),
            None => info!(font_size = self.state.font_size.index(), "showing message"),
        }
    }

    pub fn handle(&mut self, request: Request) {
        match request {
            Request::Page { reply } => {
                if reply.send(self.page()).is_err() {
                    debug!("client went away before the page was ready");
                }
            }
            Request::Submit { form, reply } => {
                let outcome = self.submit(form);
                if reply.send(outcome).is_err() {
                    debug!("client went away before the submission finished");
                }
            }
        }
    }
}

/// Truncate to [`MAX_MESSAGE_BYTES`] without splitting a UTF-8 sequence.
///
/// The input need not be UTF-8; the cut backs off over at most three continuation
/// bytes.
pub fn cap_message(raw: &[u8]) -> &[u8] {
    if raw.len() <= MAX_MESSAGE_BYTES {
        return raw;
    }
    let end = (MAX_MESSAGE_BYTES - 3..=MAX_MESSAGE_BYTES)
        .rev()
        .find(|&end| raw[end] & 0xC0 != 0x80)
        .unwrap_or(MAX_MESSAGE_BYTES);
    &raw[..end]
}

/// Strip ASCII whitespace from both ends. Other whitespace, such as U+00A0, stays.
pub fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}

/// Parse the `fontsize` field; anything that is not an integer in 1..=4 is `None`.
pub fn parse_font_size(value: &str) -> Option<FontSize> {
    value.trim().parse::<i64>().ok().and_then(FontSize::from_index)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Serve requests until every sender is dropped, switching off the QR screen when
/// its time is up. Returns the app so the caller can inspect its final state.
pub async fn run<C: Canvas>(mut app: App<C>, mut requests: mpsc::Receiver<Request>) -> App<C> {
    let mut status = time::interval_at(Instant::now() + STATUS_INTERVAL, STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let deadline = app.qr_deadline();
        tokio::select! {
            request = requests.recv() => match request {
                Some(request) => app.handle(request),
                None => {
                    info!("request channel closed, control loop stopping");
                    break;
                }
            },
            _ = wait_until(deadline) => {}
            _ = status.tick() => app.log_status(Instant::now()),
        }
        app.tick(Instant::now());
    }
    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{DrawOp, RecordingCanvas};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    const QR_PERIOD: Duration = Duration::from_secs(60);

    fn qr_screen() -> QrScreen {
        QrScreen::new("E-Paper-Message", "12345678", Ipv4Addr::new(192, 168, 4, 1), 175)
    }

    fn app(dir: &TempDir, booted_at: Instant) -> App<RecordingCanvas> {
        App::new(
            RecordingCanvas::new(416, 240),
            SettingsStore::new(dir.path().join("settings.json")),
            qr_screen(),
            QR_PERIOD,
            booted_at,
        )
    }

    fn form(message: Option<&str>, fontsize: Option<&str>) -> SendForm {
        SendForm {
            message: message.map(|m| m.as_bytes().to_vec()),
            fontsize: fontsize.map(str::to_string),
        }
    }

    #[test]
    fn test_boot_shows_qr_screen() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.boot();

        assert!(app.state().showing_qr);
        assert_eq!(app.state().message, "Hello World!");
        assert_eq!(app.state().font_size, FontSize::Medium);
        assert_eq!(app.canvas().commits(), 1);
        assert!(!app.canvas().rects().is_empty());
        assert!(app.canvas().glyphs().is_empty());
    }

    #[test]
    fn test_tick_switches_once_after_qr_period() {
        let dir = TempDir::new().unwrap();
        let booted = Instant::now();
        let mut app = app(&dir, booted);
        app.boot();

        assert!(!app.tick(booted + Duration::from_secs(59)));
        assert!(app.state().showing_qr);

        assert!(app.tick(booted + QR_PERIOD));
        assert!(!app.state().showing_qr);
        assert_eq!(app.canvas().commits(), 2);
        assert_eq!(app.canvas().text_rows(), vec!["Hello World!"]);

        assert!(!app.tick(booted + Duration::from_secs(600)));
        assert_eq!(app.canvas().commits(), 2);
        assert_eq!(app.qr_deadline(), None);
    }

    #[test]
    fn test_submit_stores_draws_and_leaves_qr() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.boot();

        let outcome = app.submit(form(Some("  Hello  "), Some("3")));
        let Submission::Accepted(page) = outcome else {
            panic!("submission rejected");
        };
        assert!(page.contains("window.location.href='/'"));
        assert!(page.contains("<option value='3' selected>"));

        assert_eq!(app.state().message, "Hello");
        assert_eq!(app.state().font_size, FontSize::Large);
        assert!(!app.state().showing_qr);

        let ops = &app.canvas().ops;
        let clear = ops.iter().rposition(|op| *op == DrawOp::Clear).unwrap();
        assert!(matches!(
            ops[clear + 1],
            DrawOp::Glyph {
                glyph: 'H',
                baseline,
                ..
            } if baseline.x == 10 && baseline.y == 30
        ));
    }

    #[test]
    fn test_missing_message_is_rejected_without_changes() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.boot();
        let before = app.state().clone();
        let ops_before = app.canvas().ops.len();

        assert_eq!(app.submit(form(None, Some("4"))), Submission::Rejected);
        assert_eq!(app.state(), &before);
        assert_eq!(app.canvas().ops.len(), ops_before);
        assert!(!dir.path().join("settings.json").exists());
    }

    #[test]
    fn test_invalid_font_size_keeps_previous() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.submit(form(Some("a"), Some("4")));
        for bad in ["0", "5", "-1", "big", ""] {
            app.submit(form(Some("b"), Some(bad)));
            assert_eq!(app.state().font_size, FontSize::XLarge, "{bad:?}");
        }
        app.submit(form(Some("c"), None));
        assert_eq!(app.state().font_size, FontSize::XLarge);
    }

    #[test]
    fn test_blank_message_becomes_placeholder() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.submit(form(Some(" \r\n\t "), None));
        assert_eq!(app.state().message, "Empty message");
        assert_eq!(app.canvas().text_rows(), vec!["Empty message"]);
    }

    #[test]
    fn test_message_capped_on_char_boundary() {
        assert_eq!(cap_message(b"short"), b"short");
        let long = "á".repeat(150);
        let capped = cap_message(long.as_bytes());
        assert_eq!(capped.len(), 200);
        assert_eq!(std::str::from_utf8(capped).unwrap().chars().count(), 100);

        let odd = format!("x{}", "é".repeat(150));
        assert_eq!(cap_message(odd.as_bytes()).len(), 199);

        // Not UTF-8 at all: a plain cut
        assert_eq!(cap_message(&[0xE9; 300]).len(), 200);
    }

    #[test]
    fn test_trim_strips_only_ascii_whitespace() {
        assert_eq!(trim_ascii_whitespace(b" \t\r\nHi \n"), b"Hi");
        assert_eq!(trim_ascii_whitespace(b"   "), b"");
        assert_eq!(trim_ascii_whitespace("\u{a0}".as_bytes()), "\u{a0}".as_bytes());
    }

    #[test]
    fn test_non_breaking_space_is_not_blank() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.submit(form(Some(" \u{a0} "), None));
        assert_eq!(app.state().message, "\u{a0}");
        assert_eq!(app.state().message_bytes, vec![0xC2, 0xA0]);
    }

    #[test]
    fn test_invalid_utf8_reaches_display_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        let outcome = app.submit(SendForm {
            message: Some(vec![b'a', 0xE9, b'b']),
            fontsize: None,
        });
        assert!(matches!(outcome, Submission::Accepted(_)));

        assert_eq!(app.state().message_bytes, vec![b'a', 0xE9, b'b']);
        assert_eq!(app.state().message, "a\u{fffd}b");
        assert_eq!(app.canvas().text_rows(), vec!["a?b"]);
    }

    #[test]
    fn test_parse_font_size() {
        assert_eq!(parse_font_size("1"), Some(FontSize::Small));
        assert_eq!(parse_font_size(" 4 "), Some(FontSize::XLarge));
        assert_eq!(parse_font_size("2.5"), None);
        assert_eq!(parse_font_size("9"), None);
    }

    #[test]
    fn test_settings_survive_restart() {
        let dir = TempDir::new().unwrap();
        let mut first = app(&dir, Instant::now());
        first.submit(form(Some("Hello"), Some("3")));
        drop(first);

        let booted = Instant::now();
        let mut second = app(&dir, booted);
        assert_eq!(second.state().message, "Hello");
        assert_eq!(second.state().font_size, FontSize::Large);

        second.boot();
        second.tick(booted + QR_PERIOD);
        assert_eq!(second.canvas().text_rows(), vec!["Hello"]);
    }

    #[test]
    fn test_display_failure_does_not_block_submission() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.canvas.fail_commit = true;
        assert!(matches!(
            app.submit(form(Some("still saved"), None)),
            Submission::Accepted(_)
        ));
        assert_eq!(SettingsStore::new(dir.path().join("settings.json")).load().message, "still saved");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_serves_requests_and_switches_screens() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, Instant::now());
        app.boot();
        let (tx, rx) = mpsc::channel(4);

        let client = async move {
            let (reply, page) = oneshot::channel();
            tx.send(Request::Page { reply }).await.unwrap();
            assert!(page.await.unwrap().contains("Hello World!"));

            // Let the QR period run out while the loop is idle.
            time::sleep(QR_PERIOD + Duration::from_secs(1)).await;
            drop(tx);
        };
        let (app, ()) = tokio::join!(run(app, rx), client);

        assert!(!app.state().showing_qr);
        assert_eq!(app.canvas().commits(), 2);
        assert_eq!(app.canvas().text_rows(), vec!["Hello World!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_submissions_in_order() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Instant::now());
        let (tx, rx) = mpsc::channel(4);

        let client = async move {
            for (message, size) in [("first", "1"), ("second", "2")] {
                let (reply, outcome) = oneshot::channel();
                let form = form(Some(message), Some(size));
                tx.send(Request::Submit { form, reply }).await.unwrap();
                assert!(matches!(outcome.await.unwrap(), Submission::Accepted(_)));
            }
            drop(tx);
        };
        let (app, ()) = tokio::join!(run(app, rx), client);

        assert_eq!(app.state().message, "second");
        assert_eq!(app.state().font_size, FontSize::Medium);
        assert_eq!(app.canvas().commits(), 2);
    }
}
