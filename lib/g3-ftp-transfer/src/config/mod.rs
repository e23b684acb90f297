/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;
use std::time::Duration;

use crate::data::{FtpDataConnectionMode, FtpDataProtection};
use crate::transfer::{FtpTransferType, FtpVerifyMethod};

#[cfg(feature = "yaml")]
mod yaml;

pub(crate) const DEFAULT_CHUNK_SIZE: usize = 65536;
pub(crate) const MIN_CHUNK_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct FtpControlConfig {
    pub max_line_len: usize,
    pub max_multi_lines: usize,
    pub command_timeout: Duration,
}

impl Default for FtpControlConfig {
    fn default() -> Self {
        FtpControlConfig {
            max_line_len: 2048,
            max_multi_lines: 128,
            command_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FtpTransferConfig {
    pub list_max_line_len: usize,
    pub list_max_entries: usize,
    pub list_all_timeout: Duration,
    pub end_wait_timeout: Duration,
    pub chunk_size: usize,
    /// bytes per second, 0 means unlimited
    pub download_rate_limit: u64,
    /// bytes per second, 0 means unlimited
    pub upload_rate_limit: u64,
    pub rate_control_resolution: Duration,
    pub data_connect_timeout: Duration,
    pub data_read_timeout: Duration,
    pub passive_blocked_ports: Vec<u16>,
    pub passive_max_attempts: usize,
    pub noop_interval: Option<Duration>,
    pub retry_attempts: usize,
    pub download_data_type: FtpTransferType,
    pub upload_data_type: FtpTransferType,
    pub fxp_data_type: FtpTransferType,
    pub fxp_progress_interval: Duration,
    pub fxp_read_timeout: Duration,
    pub download_zero_byte_files: bool,
    pub verify_method: FtpVerifyMethod,
}

impl Default for FtpTransferConfig {
    fn default() -> Self {
        FtpTransferConfig {
            list_max_line_len: 2048,
            list_max_entries: 1024,
            list_all_timeout: Duration::from_secs(120),
            end_wait_timeout: Duration::from_secs(2),
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_rate_limit: 0,
            upload_rate_limit: 0,
            rate_control_resolution: Duration::from_millis(100),
            data_connect_timeout: Duration::from_secs(15),
            data_read_timeout: Duration::from_secs(15),
            passive_blocked_ports: Vec::new(),
            passive_max_attempts: 100,
            noop_interval: None,
            retry_attempts: 3,
            download_data_type: FtpTransferType::Image,
            upload_data_type: FtpTransferType::Image,
            fxp_data_type: FtpTransferType::Image,
            fxp_progress_interval: Duration::from_secs(1),
            fxp_read_timeout: Duration::from_secs(1800),
            download_zero_byte_files: true,
            verify_method: FtpVerifyMethod::CHECKSUM,
        }
    }
}

impl FtpTransferConfig {
    /// The chunk size to use for a transfer paced at `rate_limit` bytes per second.
    ///
    /// Only the default chunk size is adjusted, a user set value is kept but
    /// never goes below [`MIN_CHUNK_SIZE`].
    pub(crate) fn chunk_size_for_rate(&self, rate_limit: u64) -> usize {
        crate::transfer::calculate_chunk_size(
            self.chunk_size.max(MIN_CHUNK_SIZE),
            rate_limit,
            self.rate_control_resolution,
        )
    }
}

#[derive(Debug, Clone)]
pub struct FtpClientConfig {
    pub control: FtpControlConfig,
    pub transfer: FtpTransferConfig,
    pub connect_timeout: Duration,
    pub greeting_timeout: Duration,
    pub data_connection_mode: FtpDataConnectionMode,
    pub data_protection: FtpDataProtection,
    /// the address to advertise in PORT / EPRT, the local address of the listener if not set
    pub active_external_ip: Option<IpAddr>,
}

impl Default for FtpClientConfig {
    fn default() -> Self {
        FtpClientConfig {
            control: Default::default(),
            transfer: Default::default(),
            connect_timeout: Duration::from_secs(30),
            greeting_timeout: Duration::from_secs(10),
            data_connection_mode: FtpDataConnectionMode::AutoPassive,
            data_protection: FtpDataProtection::Clear,
            active_external_ip: None,
        }
    }
}
