/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::FtpClientConfig;
use crate::connection::FtpConnectionProvider;
use crate::control::FtpControlChannel;
use crate::error::{FtpAuthStatus, FtpCommandError, FtpConnectError, FtpSessionOpenError};
use crate::feature::{FtpHashAlgorithm, FtpServerFeature};
use crate::state::FtpChannelState;
use crate::transfer::FtpTransferType;

/// One control connection to a FTP server, and the transfers driven over it.
///
/// Every command takes `&mut self`, so there will be only one transfer in
/// progress on a control connection.
pub struct FtpClient<CP, S, E, UD>
where
    S: AsyncRead + AsyncWrite,
{
    pub(crate) config: Arc<FtpClientConfig>,
    pub(crate) server: SocketAddr,
    pub(crate) conn_provider: CP,
    pub(crate) control: FtpControlChannel<S>,
    pub(crate) server_feature: FtpServerFeature,
    pub(crate) state: FtpChannelState,
    _phantom: PhantomData<fn() -> (E, UD)>,
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        config: Arc<FtpClientConfig>,
        server: SocketAddr,
        conn_provider: CP,
        control: FtpControlChannel<S>,
        server_feature: FtpServerFeature,
    ) -> Self {
        FtpClient {
            config,
            server,
            conn_provider,
            control,
            server_feature,
            state: FtpChannelState::default(),
            _phantom: PhantomData,
        }
    }

    /// Connect to the server, wait for the greetings and check the features.
    ///
    /// The connection provider is returned back on error.
    pub async fn connect_to(
        server: SocketAddr,
        mut conn_provider: CP,
        user_data: &UD,
        config: &Arc<FtpClientConfig>,
    ) -> Result<Self, (FtpConnectError<E>, CP)> {
        let stream = match tokio::time::timeout(
            config.connect_timeout,
            conn_provider.new_control_connection(&server, user_data),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err((FtpConnectError::ConnectIoError(e), conn_provider)),
            Err(_) => return Err((FtpConnectError::ConnectTimedOut, conn_provider)),
        };

        let mut control = FtpControlChannel::new(stream, config.control.clone());
        match tokio::time::timeout(config.greeting_timeout, control.wait_greetings()).await {
            Ok(Ok(_)) => {}
            Ok(Err(FtpCommandError::ServiceNotAvailable)) => {
                return Err((FtpConnectError::ServiceNotAvailable, conn_provider));
            }
            Ok(Err(e)) => return Err((FtpConnectError::GreetingFailed(e), conn_provider)),
            Err(_) => return Err((FtpConnectError::GreetingTimedOut, conn_provider)),
        }

        let server_feature = match control.check_server_feature().await {
            Ok(f) => f,
            Err(e) => return Err((FtpConnectError::NegotiationFailed(e), conn_provider)),
        };

        if server_feature.support_utf8_path() {
            match control.set_use_utf8().await {
                Ok(true) => {}
                Ok(false) => debug!("server {server} refused to enable UTF8"),
                Err(e) => return Err((FtpConnectError::NegotiationFailed(e), conn_provider)),
            }
        }

        Ok(FtpClient::new(
            Arc::clone(config),
            server,
            conn_provider,
            control,
            server_feature,
        ))
    }

    pub async fn new_user_session(
        &mut self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), FtpSessionOpenError> {
        match self.control.send_username(username).await? {
            FtpAuthStatus::LoggedIn => return Ok(()),
            FtpAuthStatus::NotLoggedIn => return Err(FtpSessionOpenError::NotLoggedIn),
            FtpAuthStatus::NeedAccount => return Err(FtpSessionOpenError::AccountIsNeeded),
            FtpAuthStatus::NeedPassword => {}
        }

        match self.control.send_password(password).await? {
            FtpAuthStatus::LoggedIn => Ok(()),
            FtpAuthStatus::NeedAccount => Err(FtpSessionOpenError::AccountIsNeeded),
            FtpAuthStatus::NotLoggedIn | FtpAuthStatus::NeedPassword => {
                Err(FtpSessionOpenError::NotLoggedIn)
            }
        }
    }

    pub async fn quit_and_close(mut self) -> Result<(), FtpCommandError> {
        self.control.send_quit().await
    }

    #[inline]
    pub fn connection_provider(&self) -> &CP {
        &self.conn_provider
    }

    #[inline]
    pub fn server_feature(&self) -> &FtpServerFeature {
        &self.server_feature
    }

    #[inline]
    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    pub async fn change_dir(&mut self, path: &str) -> Result<(), FtpCommandError> {
        self.control.change_dir(path).await
    }

    pub async fn delete_file(&mut self, path: &str) -> Result<(), FtpCommandError> {
        self.control.delete_file(path).await
    }

    /// Send `TYPE` only if the data type differs from the last one set.
    pub async fn set_transfer_type(&mut self, t: FtpTransferType) -> Result<(), FtpCommandError> {
        if self.state.transfer_type() == Some(t) {
            return Ok(());
        }
        self.control.request_transfer_type(t).await?;
        self.state.set_transfer_type(t);
        Ok(())
    }

    /// Get the size of the remote file, Ok(None) if it's not available.
    pub async fn get_file_size(&mut self, path: &str) -> Result<Option<u64>, FtpCommandError> {
        let ascii = self.state.transfer_type() == Some(FtpTransferType::Ascii);
        if ascii && self.state.ascii_size_unsupported() {
            return self.get_binary_file_size(path).await;
        }

        match self.control.request_size(path).await {
            Ok(size) => Ok(size),
            Err(FtpCommandError::Rejected(_, reply)) => {
                if ascii && reply.message().to_ascii_lowercase().contains("ascii") {
                    debug!("SIZE is not allowed in ASCII mode: {reply}");
                    self.state.mark_ascii_size_unsupported();
                    self.get_binary_file_size(path).await
                } else {
                    debug!("SIZE {path} rejected: {reply}");
                    Ok(None)
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn get_binary_file_size(&mut self, path: &str) -> Result<Option<u64>, FtpCommandError> {
        self.set_transfer_type(FtpTransferType::Image).await?;
        let r = self.control.request_size(path).await;
        self.set_transfer_type(FtpTransferType::Ascii).await?;
        match r {
            Ok(size) => Ok(size),
            Err(FtpCommandError::Rejected(..)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_file_mtime(
        &mut self,
        path: &str,
    ) -> Result<Option<DateTime<Utc>>, FtpCommandError> {
        match self.control.request_mtime(path).await {
            Ok(t) => Ok(t),
            Err(FtpCommandError::Rejected(..)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get the checksum calculated by the server, Ok(None) if it's not available.
    pub async fn get_file_checksum(
        &mut self,
        path: &str,
    ) -> Result<Option<(FtpHashAlgorithm, String)>, FtpCommandError> {
        if self.server_feature.hash_algorithm().is_none() {
            return Ok(None);
        }
        match self.control.request_hash(path).await {
            Ok(r) => Ok(r),
            Err(FtpCommandError::Rejected(..)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Make `alg` the algorithm used by the following HASH commands.
    pub async fn select_hash_algorithm(
        &mut self,
        alg: FtpHashAlgorithm,
    ) -> Result<(), FtpCommandError> {
        if self.server_feature.hash_algorithm() == Some(alg) {
            return Ok(());
        }
        self.control.select_hash(alg).await?;
        self.server_feature.set_hash_selected(alg);
        Ok(())
    }

    /// Check if the remote file exists, by SIZE and then by MDTM.
    pub async fn file_exists(&mut self, path: &str) -> Result<bool, FtpCommandError> {
        match self.control.request_size(path).await {
            Ok(size) => Ok(size.is_some()),
            Err(FtpCommandError::Rejected(..)) => match self.control.request_mtime(path).await {
                Ok(t) => Ok(t.is_some()),
                Err(FtpCommandError::Rejected(..)) => Ok(false),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr};

    use tokio_test::io::{Builder, Mock};

    use crate::test_util::*;

    const SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 21);

    #[tokio::test]
    async fn connect_and_login() {
        let control = Builder::new()
            .read(b"220 Service ready\r\n")
            .write(b"FEAT\r\n")
            .read(b"211-Features:\r\n EPSV\r\n UTF8\r\n211 End\r\n")
            .write(b"OPTS UTF8 ON\r\n")
            .read(b"200 Always in UTF8 mode.\r\n")
            .write(b"USER ftp\r\n")
            .read(b"331 Please specify the password.\r\n")
            .write(b"PASS secret\r\n")
            .read(b"230 Login successful.\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 Goodbye.\r\n")
            .build();
        let provider = MockProvider::with_control(control, vec![]);
        let config = Arc::new(FtpClientConfig::default());
        let mut client: FtpClient<MockProvider, Mock, io::Error, ()> =
            match FtpClient::connect_to(SERVER, provider, &(), &config).await {
                Ok(client) => client,
                Err((e, _)) => panic!("connect failed: {e}"),
            };
        assert!(client.server_feature().support_epsv());
        client
            .new_user_session(Some("ftp"), Some("secret"))
            .await
            .unwrap();
        client.quit_and_close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_service_not_available() {
        let control = Builder::new()
            .read(b"421 Too many connections\r\n")
            .build();
        let provider = MockProvider::with_control(control, vec![]);
        let config = Arc::new(FtpClientConfig::default());
        let r: Result<FtpClient<MockProvider, Mock, io::Error, ()>, _> =
            FtpClient::connect_to(SERVER, provider, &(), &config).await;
        assert!(matches!(r, Err((FtpConnectError::ServiceNotAvailable, _))));
    }

    #[tokio::test]
    async fn transfer_type_cached() {
        let control = Builder::new()
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![]),
            FtpClientConfig::default(),
            SERVER,
        );
        client.set_transfer_type(FtpTransferType::Image).await.unwrap();
        client.set_transfer_type(FtpTransferType::Image).await.unwrap();
    }

    #[tokio::test]
    async fn ascii_size_in_binary() {
        let control = Builder::new()
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .write(b"SIZE /a.txt\r\n")
            .read(b"550 SIZE not allowed in ASCII mode\r\n")
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /a.txt\r\n")
            .read(b"213 42\r\n")
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            // the second query goes to binary mode directly
            .write(b"TYPE I\r\n")
            .read(b"200 Switching to Binary mode.\r\n")
            .write(b"SIZE /b.txt\r\n")
            .read(b"550 Could not get file size.\r\n")
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![]),
            FtpClientConfig::default(),
            SERVER,
        );
        client.set_transfer_type(FtpTransferType::Ascii).await.unwrap();
        assert_eq!(client.get_file_size("/a.txt").await.unwrap(), Some(42));
        assert_eq!(client.get_file_size("/b.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn exists_by_mtime() {
        let control = Builder::new()
            .write(b"SIZE /a.bin\r\n")
            .read(b"502 SIZE not implemented\r\n")
            .write(b"MDTM /a.bin\r\n")
            .read(b"213 20211201102030\r\n")
            .write(b"SIZE /b.bin\r\n")
            .read(b"550 No such file\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![]),
            FtpClientConfig::default(),
            SERVER,
        );
        assert!(client.file_exists("/a.bin").await.unwrap());
        assert!(!client.file_exists("/b.bin").await.unwrap());
    }
}
