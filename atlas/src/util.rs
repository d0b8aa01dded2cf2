use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;

const SIZE_UNITS: &[&str] = &["KB", "MB", "GB", "TB"];

/// Human-readable byte count using binary multiples: `512 B`, `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.1} {}", SIZE_UNITS[unit])
}

pub fn format_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M").to_string()
}

/// "just now", "5 minutes ago", ... falling back to the absolute date after a week.
pub fn format_relative(timestamp: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(*timestamp);

    if elapsed.num_seconds() < 60 {
        return "just now".to_string();
    }

    let (amount, unit) = if elapsed.num_minutes() < 60 {
        (elapsed.num_minutes(), "minute")
    } else if elapsed.num_hours() < 24 {
        (elapsed.num_hours(), "hour")
    } else if elapsed.num_days() < 7 {
        (elapsed.num_days(), "day")
    } else {
        return format_date(timestamp);
    };

    if amount == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{amount} {unit}s ago")
    }
}

/// Cut `text` to at most `max` user-perceived characters, marking the cut.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= max {
        return text.to_string();
    }

    let mut truncated: String = graphemes[..max.saturating_sub(1)].concat();
    truncated.push('…');
    truncated
}

/// Put `text` on the system clipboard through the terminal (OSC 52).
pub fn copy_to_clipboard<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    write!(out, "\x1b]52;c;{}\x07", STANDARD.encode(text))?;
    out.flush()
}

/// Producer side of a [`Debouncer`]. Cheap to clone.
#[derive(Debug)]
pub struct DebounceSender<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for DebounceSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> DebounceSender<T> {
    pub fn push(&self, value: T) {
        self.tx.send_replace(Some(value));
    }
}

/// Collapses a burst of values into the last one once input goes quiet for
/// `delay`.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Debouncer<T> {
    pub fn channel(delay: Duration) -> (DebounceSender<T>, Self) {
        let (tx, rx) = watch::channel(None);
        (DebounceSender { tx: Arc::new(tx) }, Self { delay, rx })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether a value has been pushed that `settled` has not yet returned.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next value, then until no newer value arrives for the
    /// delay, and return the latest. `None` once every sender is gone and
    /// nothing is pending.
    pub async fn settled(&mut self) -> Option<T> {
        if self.rx.changed().await.is_err() {
            return None;
        }

        loop {
            match tokio::time::timeout(self.delay, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return self.rx.borrow_and_update().clone(),
            }
        }
    }
}

/// Lets an action through at most once per interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    Quit,
}

/// Routes a session-wide interrupt to the operation currently armed, or
/// asks the session to quit when nothing is.
#[derive(Debug, Clone, Default)]
pub struct InterruptRouter {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl InterruptRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the next operation; the next interrupt cancels it.
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub fn disarm(&self) {
        self.slot().take();
    }

    pub fn interrupt(&self) -> Interrupted {
        match self.slot().take() {
            Some(token) => {
                token.cancel();
                Interrupted::Cancelled
            }
            None => Interrupted::Quit,
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
