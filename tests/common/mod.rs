#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, NaiveDate};
pub use stratsim::domain::ohlcv::Bar;
use stratsim::ports::data_port::{DataPort, ProviderError};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily bars from `start`, one per close, with a flat OHLC range around it.
pub fn bars_from_closes(start: NaiveDate, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000_000,
        })
        .collect()
}

pub fn bars_with_volume(start: NaiveDate, closes: &[f64], volumes: &[u64]) -> Vec<Bar> {
    let mut bars = bars_from_closes(start, closes);
    for (bar, &v) in bars.iter_mut().zip(volumes) {
        bar.volume = v;
    }
    bars
}

/// `n` bars drifting upward from 100.
pub fn trending_bars(start: NaiveDate, n: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.5).collect();
    bars_from_closes(start, &closes)
}

/// What a scripted provider does on each call.
#[derive(Clone)]
pub enum Reply {
    Bars(Vec<Bar>),
    Fail(ProviderError),
}

/// Plays back replies in order, repeating the last one, and counts calls.
pub struct ScriptedProvider {
    name: String,
    replies: Mutex<Vec<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str, replies: Vec<Reply>) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn bars(name: &str, bars: Vec<Bar>) -> Self {
        Self::new(name, vec![Reply::Bars(bars)])
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self::new(name, vec![Reply::Fail(error)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataPort for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_bars(
        &self,
        _symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies[0].clone()
        };
        match reply {
            Reply::Bars(bars) => Ok(bars
                .into_iter()
                .filter(|b| b.date >= start && b.date <= end)
                .collect()),
            Reply::Fail(e) => Err(e),
        }
    }
}
