//! Full-screen live rate display, redrawn once a second from the shared counter table.
use crate::driver::SharedCounters;
use crate::error::RuntimeError;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::Print,
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use perpx_load_core::ConnectionCounters;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const ENDPOINT_WIDTH: usize = 42;
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Set while the alternate screen is up.
static TERMINAL_ACTIVE: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK: Once = Once::new();

/// Rates of the connections sharing one endpoint over the last sampling interval.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointRate {
    pub endpoint: String,
    pub txs: u64,
    pub tps: f64,
    pub kib_per_sec: f64,
}

/// Everything one redraw shows.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub elapsed: Duration,
    pub limit: Option<Duration>,
    pub connections: usize,
    pub rate: u32,
    pub total_txs: u64,
    pub tps: f64,
    pub kib_per_sec: f64,
    pub endpoints: Vec<EndpointRate>,
}

/// Static parameters of the run being displayed.
#[derive(Clone, Debug)]
pub struct RunView {
    pub started: Instant,
    pub limit: Option<Duration>,
    pub connections: usize,
    pub rate: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Totals {
    txs: u64,
    bytes: u64,
}

/// Turns successive cumulative snapshots into instantaneous rates.
#[derive(Debug)]
pub struct RateTracker {
    last: Instant,
    previous: BTreeMap<String, Totals>,
}

impl RateTracker {
    pub fn new(started: Instant) -> Self {
        Self {
            last: started,
            previous: BTreeMap::new(),
        }
    }

    /// Rates since the previous sample, grouped by endpoint and sorted by endpoint name.
    pub fn sample(&mut self, snapshot: &[ConnectionCounters], now: Instant) -> Vec<EndpointRate> {
        let mut current: BTreeMap<String, Totals> = BTreeMap::new();
        for counters in snapshot {
            let totals = current.entry(counters.endpoint.clone()).or_default();
            totals.txs += counters.txs;
            totals.bytes += counters.bytes;
        }

        let mut dt = now.saturating_duration_since(self.last).as_secs_f64();
        if dt <= 0. {
            dt = 1.;
        }

        let rates = current
            .iter()
            .map(|(endpoint, totals)| {
                let before = self.previous.get(endpoint).copied().unwrap_or_default();
                EndpointRate {
                    endpoint: endpoint.clone(),
                    txs: totals.txs,
                    tps: totals.txs.saturating_sub(before.txs) as f64 / dt,
                    kib_per_sec: totals.bytes.saturating_sub(before.bytes) as f64 / 1024. / dt,
                }
            })
            .collect();

        self.last = now;
        self.previous = current;
        rates
    }
}

impl Frame {
    pub fn new(view: &RunView, endpoints: Vec<EndpointRate>, now: Instant) -> Self {
        Self {
            elapsed: now.saturating_duration_since(view.started),
            limit: view.limit,
            connections: view.connections,
            rate: view.rate,
            total_txs: endpoints.iter().map(|e| e.txs).sum(),
            tps: endpoints.iter().map(|e| e.tps).sum(),
            kib_per_sec: endpoints.iter().map(|e| e.kib_per_sec).sum(),
            endpoints,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let elapsed = humantime::format_duration(Duration::from_secs(self.elapsed.as_secs()));
        let limit = match self.limit {
            Some(limit) => format!("{}s", limit.as_secs()),
            None => "unlimited".to_string(),
        };
        let names = self
            .endpoints
            .iter()
            .map(|e| e.endpoint.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        // Writing into a String cannot fail.
        let _ = writeln!(out, "PerpX Load Test (TUI)");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "elapsed: {elapsed} / {limit}   connections: {}   rate: {} tx/s/conn",
            self.connections, self.rate
        );
        let _ = writeln!(
            out,
            "total: {} tx   inst: {:.0} tx/s   inst data: {:.1} KiB/s",
            self.total_txs, self.tps, self.kib_per_sec
        );
        let _ = writeln!(out, "endpoints: {names}");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<42}  {:>12}  {:>10}  {:>12}",
            "endpoint", "txs", "tx/s", "KiB/s"
        );
        let _ = writeln!(out, "{}", "-".repeat(82));
        for e in &self.endpoints {
            let _ = writeln!(
                out,
                "{:<42}  {:>12}  {:>10.0}  {:>12.1}",
                trim_for_table(&e.endpoint, ENDPOINT_WIDTH),
                e.txs,
                e.tps,
                e.kib_per_sec
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Press Ctrl+C to stop.");
        out
    }
}

/// Shortens `s` to at most `max` characters, marking the cut with `...` when there is room.
pub fn trim_for_table(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s.chars().take(max).collect();
    }
    let mut trimmed: String = s.chars().take(max - 3).collect();
    trimmed.push_str("...");
    trimmed
}

/// Alternate screen with a hidden cursor, restored when dropped or on a panic while it is up.
pub struct TerminalGuard {
    stdout: io::Stdout,
}

impl TerminalGuard {
    pub fn enter() -> Result<Self, RuntimeError> {
        PANIC_HOOK.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                let _ = restore_terminal(&mut io::stdout());
                previous(info);
            }));
        });

        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, Hide)?;
        TERMINAL_ACTIVE.store(true, Ordering::SeqCst);
        Ok(Self { stdout })
    }

    pub fn draw(&mut self, frame: &Frame) -> Result<(), RuntimeError> {
        queue!(self.stdout, MoveTo(0, 0), Clear(ClearType::All))?;
        for line in frame.render().lines() {
            queue!(self.stdout, Print(line), Print("\r\n"))?;
        }
        self.stdout.flush()?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = restore_terminal(&mut self.stdout);
    }
}

/// Leaves the alternate screen once. Returns whether anything was written.
fn restore_terminal(out: &mut impl Write) -> io::Result<bool> {
    if !TERMINAL_ACTIVE.swap(false, Ordering::SeqCst) {
        return Ok(false);
    }
    execute!(out, Show, LeaveAlternateScreen)?;
    Ok(true)
}

fn snapshot(counters: &SharedCounters) -> Result<Vec<ConnectionCounters>, RuntimeError> {
    Ok(counters.read()?.clone())
}

/// Redraws the display every second until `cancel` fires.
pub async fn display_task(
    counters: SharedCounters,
    view: RunView,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    let mut terminal = TerminalGuard::enter()?;
    let mut tracker = RateTracker::new(view.started);
    let mut interval = tokio::time::interval(REFRESH_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let snapshot = snapshot(&counters)?;
        let now = Instant::now();
        let frame = Frame::new(&view, tracker.sample(&snapshot, now), now);
        terminal.draw(&frame)?;
    }

    debug!("Display stopped");
    Ok(())
}
