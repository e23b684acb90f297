/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_test::io::Mock;

use crate::client::FtpClient;
use crate::config::FtpClientConfig;
use crate::connection::{FtpConnectionProvider, FtpProxyKind};
use crate::control::FtpControlChannel;
use crate::feature::FtpServerFeature;

/// Hands out scripted streams, data streams are used in order.
pub(crate) struct MockProvider {
    control: Option<Mock>,
    data: VecDeque<Mock>,
    connected: Vec<SocketAddr>,
    accepted: usize,
    pub(crate) proxy: FtpProxyKind,
    pub(crate) listen_addr: SocketAddr,
    pub(crate) tls_fail: bool,
}

impl MockProvider {
    pub(crate) fn new(data: Vec<Mock>) -> Self {
        MockProvider {
            control: None,
            data: data.into(),
            connected: Vec::new(),
            accepted: 0,
            proxy: FtpProxyKind::Direct,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 20),
            tls_fail: false,
        }
    }

    pub(crate) fn with_control(control: Mock, data: Vec<Mock>) -> Self {
        let mut provider = MockProvider::new(data);
        provider.control = Some(control);
        provider
    }

    pub(crate) fn connected_addrs(&self) -> Vec<SocketAddr> {
        self.connected.clone()
    }

    pub(crate) fn accepted(&self) -> usize {
        self.accepted
    }

    fn next_data(&mut self) -> io::Result<Mock> {
        self.data
            .pop_front()
            .ok_or_else(|| io::Error::other("no more data stream"))
    }
}

#[async_trait]
impl FtpConnectionProvider<Mock, io::Error, ()> for MockProvider {
    async fn new_control_connection(
        &mut self,
        _server_addr: &SocketAddr,
        _user_data: &(),
    ) -> io::Result<Mock> {
        self.control
            .take()
            .ok_or_else(|| io::Error::other("no control stream"))
    }

    async fn new_data_connection(
        &mut self,
        server_addr: &SocketAddr,
        _user_data: &(),
    ) -> io::Result<Mock> {
        self.connected.push(*server_addr);
        self.next_data()
    }

    async fn listen_data_connection(&mut self, _user_data: &()) -> io::Result<SocketAddr> {
        Ok(self.listen_addr)
    }

    async fn accept_data_connection(&mut self, _user_data: &()) -> io::Result<Mock> {
        self.accepted += 1;
        self.next_data()
    }

    async fn secure_data_connection(&mut self, stream: Mock, _user_data: &()) -> io::Result<Mock> {
        if self.tls_fail {
            Err(io::Error::other("tls handshake failed"))
        } else {
            Ok(stream)
        }
    }

    fn proxy_kind(&self) -> FtpProxyKind {
        self.proxy
    }
}

pub(crate) type MockClient = FtpClient<MockProvider, Mock, io::Error, ()>;

/// A logged in client over the scripted control stream.
pub(crate) fn test_client(
    control: Mock,
    provider: MockProvider,
    config: FtpClientConfig,
    server: SocketAddr,
) -> MockClient {
    let control = FtpControlChannel::new(control, config.control.clone());
    FtpClient::new(
        Arc::new(config),
        server,
        provider,
        control,
        FtpServerFeature::default(),
    )
}
