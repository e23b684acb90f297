/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// How the connections to the server are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpProxyKind {
    Direct,
    Http11,
    Socks4,
    Socks4a,
    Socks5,
}

impl FtpProxyKind {
    #[inline]
    pub fn is_proxied(&self) -> bool {
        !matches!(self, FtpProxyKind::Direct)
    }

    #[inline]
    pub(crate) fn is_socks4_family(&self) -> bool {
        matches!(self, FtpProxyKind::Socks4 | FtpProxyKind::Socks4a)
    }
}

#[async_trait]
pub trait FtpConnectionProvider<T: AsyncRead + AsyncWrite, E: Error, UD> {
    async fn new_control_connection(
        &mut self,
        server_addr: &SocketAddr,
        user_data: &UD,
    ) -> Result<T, E>;

    async fn new_data_connection(
        &mut self,
        server_addr: &SocketAddr,
        user_data: &UD,
    ) -> Result<T, E>;

    /// Start listening for an active mode data connection.
    ///
    /// The returned address will be advertised to the server in PORT / EPRT,
    /// unless an external ip is set in config.
    async fn listen_data_connection(&mut self, user_data: &UD) -> Result<SocketAddr, E>;

    /// Accept the data connection made by the server to the last listen address.
    async fn accept_data_connection(&mut self, user_data: &UD) -> Result<T, E>;

    /// Run the TLS handshake on the data connection.
    async fn secure_data_connection(&mut self, stream: T, user_data: &UD) -> Result<T, E>;

    fn proxy_kind(&self) -> FtpProxyKind {
        FtpProxyKind::Direct
    }
}
