use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

/// Periodic stderr reporter for long hashing runs.
///
/// Counters are shared atomics so the parallel hasher can bump them from
/// worker threads. A disabled reporter still counts but never prints.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    interval: Duration,
    stage: Arc<Mutex<String>>,
    pieces_done: Arc<AtomicU64>,
    pieces_total: Arc<AtomicU64>,
    bytes_done: Arc<AtomicU64>,
    bytes_total: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self::with_interval(enabled, Duration::from_secs(5))
    }

    pub fn with_interval(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            stage: Arc::new(Mutex::new(String::new())),
            pieces_done: Arc::new(AtomicU64::new(0)),
            pieces_total: Arc::new(AtomicU64::new(0)),
            bytes_done: Arc::new(AtomicU64::new(0)),
            bytes_total: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_stage(&self, s: &str) {
        if let Ok(mut stage) = self.stage.lock() {
            *stage = s.to_string();
        }
    }

    /// Reset counters for a run over `bytes` bytes split into `pieces` pieces.
    pub fn reset(&self, pieces: u64, bytes: u64) {
        self.pieces_total.store(pieces, Ordering::Relaxed);
        self.pieces_done.store(0, Ordering::Relaxed);
        self.bytes_total.store(bytes, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
    }

    pub fn piece_done(&self, len: usize) {
        self.pieces_done.fetch_add(1, Ordering::Relaxed);
        self.bytes_done.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn pieces_done(&self) -> u64 {
        self.pieces_done.load(Ordering::Relaxed)
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub fn start(&self) {
        if !self.enabled || self.running.swap(true, Ordering::Relaxed) {
            return;
        }
        let this = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            while this.running.load(Ordering::Relaxed) {
                thread::sleep(this.interval);
                if !this.running.load(Ordering::Relaxed) {
                    break;
                }
                eprintln!("{}", this.line(t0.elapsed()));
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn line(&self, elapsed: Duration) -> String {
        let stage = self.stage.lock().map(|s| s.clone()).unwrap_or_default();
        let pd = self.pieces_done.load(Ordering::Relaxed);
        let pt = self.pieces_total.load(Ordering::Relaxed);
        let bd = self.bytes_done.load(Ordering::Relaxed);
        let bt = self.bytes_total.load(Ordering::Relaxed);
        let pct = if bt > 0 { (bd as f64 / bt as f64) * 100.0 } else { 0.0 };
        format!("[{:>4}s] {} | pieces {}/{} | bytes {}%", elapsed.as_secs(), stage, pd, pt, pct as i32)
    }
}
