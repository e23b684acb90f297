/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use crate::transfer::FtpTransferType;

/// Capability state learned while using one control connection.
///
/// Each flag is only changed through its own method, and lives as long as the
/// control connection.
#[derive(Debug, Default)]
pub(crate) struct FtpChannelState {
    epsv_unsupported: bool,
    data_tls_failed: bool,
    ascii_size_unsupported: bool,
    transfer_type: Option<FtpTransferType>,
}

impl FtpChannelState {
    #[inline]
    pub(crate) fn epsv_unsupported(&self) -> bool {
        self.epsv_unsupported
    }

    pub(crate) fn mark_epsv_unsupported(&mut self) {
        self.epsv_unsupported = true;
    }

    #[inline]
    pub(crate) fn data_tls_failed(&self) -> bool {
        self.data_tls_failed
    }

    pub(crate) fn mark_data_tls_failed(&mut self) {
        self.data_tls_failed = true;
    }

    #[inline]
    pub(crate) fn ascii_size_unsupported(&self) -> bool {
        self.ascii_size_unsupported
    }

    pub(crate) fn mark_ascii_size_unsupported(&mut self) {
        self.ascii_size_unsupported = true;
    }

    #[inline]
    pub(crate) fn transfer_type(&self) -> Option<FtpTransferType> {
        self.transfer_type
    }

    pub(crate) fn set_transfer_type(&mut self, t: FtpTransferType) {
        self.transfer_type = Some(t);
    }
}
