/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use tokio::time::Instant;

use crate::config::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Reduce the default chunk size so that one chunk takes no more than
/// `resolution` to transfer at `rate_limit` bytes per second.
pub(crate) fn calculate_chunk_size(
    configured: usize,
    rate_limit: u64,
    resolution: Duration,
) -> usize {
    if rate_limit == 0 || configured != DEFAULT_CHUNK_SIZE {
        return configured;
    }

    let resolution_millis = resolution.as_millis().max(1) as u64;
    let mut size = configured;
    while size > MIN_CHUNK_SIZE {
        let chunk_millis = 1000 * size as u64 / rate_limit;
        if chunk_millis <= resolution_millis {
            break;
        }
        size = (size >> 1).max(MIN_CHUNK_SIZE);
    }
    size
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FtpRateLimitAction {
    Proceed,
    DelayFor(u64),
    ResetWindow,
}

/// Pace a transfer by sleeping the difference between the time the counted
/// bytes should take at the configured rate and the real elapsed time.
pub(crate) struct FtpRateLimiter {
    bytes_per_second: u64,
    resolution_millis: u64,
    started: Instant,
    window_start_millis: u64,
    window_bytes: u64,
}

impl FtpRateLimiter {
    pub(crate) fn new(bytes_per_second: u64, resolution: Duration) -> Self {
        FtpRateLimiter {
            bytes_per_second,
            resolution_millis: resolution.as_millis() as u64,
            started: Instant::now(),
            window_start_millis: 0,
            window_bytes: 0,
        }
    }

    #[inline]
    pub(crate) fn is_set(&self) -> bool {
        self.bytes_per_second > 0
    }

    pub(crate) fn check(&mut self, cur_millis: u64, advanced: usize) -> FtpRateLimitAction {
        self.window_bytes += advanced as u64;

        let elapsed = cur_millis.saturating_sub(self.window_start_millis);
        let should_take = self.window_bytes * 1000 / self.bytes_per_second;
        if should_take > elapsed {
            FtpRateLimitAction::DelayFor(should_take - elapsed)
        } else if elapsed > should_take + self.resolution_millis {
            // the transfer was slower than the limit, do not try to catch up
            self.window_bytes = 0;
            self.window_start_millis = cur_millis;
            FtpRateLimitAction::ResetWindow
        } else {
            FtpRateLimitAction::Proceed
        }
    }

    pub(crate) async fn limit(&mut self, advanced: usize) {
        if !self.is_set() {
            return;
        }

        let cur_millis = self.started.elapsed().as_millis() as u64;
        if let FtpRateLimitAction::DelayFor(millis) = self.check(cur_millis, advanced) {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}
