/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use tokio::time::Instant;

/// A snapshot of the transfer progress, only valid during the report call.
#[derive(Debug, Clone, Copy)]
pub struct FtpProgress<'a> {
    /// percent in 0.0..=100.0, or -1.0 if the total length is unknown
    pub progress: f64,
    /// bytes moved by this operation
    pub transferred_bytes: u64,
    /// offset reached in the remote file
    pub position: u64,
    /// bytes per second
    pub transfer_speed: f64,
    pub eta: Duration,
    pub local_path: &'a str,
    pub remote_path: &'a str,
    pub file_index: usize,
    pub file_count: usize,
}

impl FtpProgress<'_> {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100.0
    }
}

pub trait FtpProgressSink {
    fn report(&mut self, progress: &FtpProgress<'_>);

    /// Whether reports are wanted at all. Extra commands may be skipped if not.
    fn enabled(&self) -> bool {
        true
    }
}

impl<F> FtpProgressSink for F
where
    F: FnMut(&FtpProgress<'_>),
{
    fn report(&mut self, progress: &FtpProgress<'_>) {
        self(progress)
    }
}

pub struct FtpNoProgress;

impl FtpProgressSink for FtpNoProgress {
    fn report(&mut self, _progress: &FtpProgress<'_>) {}

    fn enabled(&self) -> bool {
        false
    }
}

pub(crate) struct FtpProgressTracker<'a, P: ?Sized> {
    sink: &'a mut P,
    local_path: &'a str,
    remote_path: &'a str,
    file_index: usize,
    file_count: usize,
    started: Instant,
    start_position: u64,
    last_position: u64,
}

impl<'a, P> FtpProgressTracker<'a, P>
where
    P: FtpProgressSink + ?Sized,
{
    pub(crate) fn new(
        sink: &'a mut P,
        local_path: &'a str,
        remote_path: &'a str,
        file_index: usize,
        file_count: usize,
    ) -> Self {
        FtpProgressTracker {
            sink,
            local_path,
            remote_path,
            file_index,
            file_count,
            started: Instant::now(),
            start_position: 0,
            last_position: 0,
        }
    }

    #[inline]
    pub(crate) fn enabled(&self) -> bool {
        self.sink.enabled()
    }

    /// Start the clock for a new transfer attempt from `position`.
    pub(crate) fn restart(&mut self, position: u64) {
        self.started = Instant::now();
        self.start_position = position;
        self.last_position = position;
    }

    fn build(&self, position: u64, total: Option<u64>, elapsed: Duration) -> FtpProgress<'a> {
        let transferred_bytes = position.saturating_sub(self.start_position);
        let secs = elapsed.as_secs_f64();
        let transfer_speed = if secs > 0.0 {
            transferred_bytes as f64 / secs
        } else {
            0.0
        };

        let (progress, eta) = match total {
            Some(0) => (100.0, Duration::ZERO),
            Some(total) => {
                let progress = (position as f64 * 100.0 / total as f64).min(100.0);
                let left = total.saturating_sub(position);
                let eta = if transfer_speed > 0.0 {
                    Duration::try_from_secs_f64(left as f64 / transfer_speed)
                        .unwrap_or(Duration::MAX)
                } else {
                    Duration::ZERO
                };
                (progress, eta)
            }
            None => (-1.0, Duration::ZERO),
        };

        FtpProgress {
            progress,
            transferred_bytes,
            position,
            transfer_speed,
            eta,
            local_path: self.local_path,
            remote_path: self.remote_path,
            file_index: self.file_index,
            file_count: self.file_count,
        }
    }

    /// Report the position reached. Positions never go backwards in reports,
    /// even if a resume has to send some bytes again.
    pub(crate) fn report(&mut self, position: u64, total: Option<u64>) {
        if !self.sink.enabled() {
            return;
        }
        let position = position.max(self.last_position);
        self.last_position = position;
        let p = self.build(position, total, self.started.elapsed());
        self.sink.report(&p);
    }

    pub(crate) fn report_complete(&mut self, position: u64) {
        if !self.sink.enabled() {
            return;
        }
        let position = position.max(self.last_position);
        let mut p = self.build(position, Some(position), self.started.elapsed());
        p.progress = 100.0;
        self.sink.report(&p);
    }

    /// A 100% report for a transfer that did not need to move any data.
    pub(crate) fn report_skipped(&mut self, total: u64) {
        if !self.sink.enabled() {
            return;
        }
        let mut p = self.build(total, Some(total), Duration::ZERO);
        p.transferred_bytes = 0;
        p.progress = 100.0;
        self.sink.report(&p);
    }
}
