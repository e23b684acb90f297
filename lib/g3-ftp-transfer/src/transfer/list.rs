/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::str::FromStr;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::{FtpLineDataReceiver, FtpLineDataTransfer, FtpNoopKeeper, FtpTransferType};
use crate::client::FtpClient;
use crate::connection::FtpConnectionProvider;
use crate::control::FtpCommand;
use crate::data::{FtpDataConnectionSpec, FtpDataProtection, FtpDataStart};
use crate::error::{FtpLineDataReadError, FtpTransferError};

/// The command used for a raw listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtpListCommand {
    #[default]
    List,
    Mlsd,
}

impl FtpListCommand {
    fn command(&self) -> FtpCommand {
        match self {
            FtpListCommand::List => FtpCommand::LIST,
            FtpListCommand::Mlsd => FtpCommand::MLSD,
        }
    }
}

impl FromStr for FtpListCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(FtpListCommand::List),
            "mlsd" => Ok(FtpListCommand::Mlsd),
            _ => Err(()),
        }
    }
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    /// Get the names in a remote directory by NLST.
    ///
    /// An empty directory reported by "550 No files found" gives an empty list.
    pub async fn list_names(
        &mut self,
        path: &str,
        user_data: &UD,
    ) -> Result<Vec<String>, FtpTransferError> {
        let mut names = Vec::new();
        self.list_lines(FtpCommand::NLST, path, &mut names, user_data)
            .await?;
        Ok(names)
    }

    /// Send each line of a LIST or MLSD listing to `receiver`, without parsing.
    pub async fn list_raw<R>(
        &mut self,
        cmd: FtpListCommand,
        path: &str,
        receiver: &mut R,
        user_data: &UD,
    ) -> Result<(), FtpTransferError>
    where
        R: FtpLineDataReceiver + ?Sized,
    {
        self.list_lines(cmd.command(), path, receiver, user_data)
            .await
    }

    async fn list_lines<R>(
        &mut self,
        cmd: FtpCommand,
        path: &str,
        receiver: &mut R,
        user_data: &UD,
    ) -> Result<(), FtpTransferError>
    where
        R: FtpLineDataReceiver + ?Sized,
    {
        self.set_transfer_type(FtpTransferType::Ascii).await?;

        let mut spec = FtpDataConnectionSpec::new(cmd, path);
        spec.mode = self.config.data_connection_mode;
        spec.encrypt = self.config.data_protection == FtpDataProtection::Private;
        let conn = match self.open_data_connection(&spec, user_data).await? {
            FtpDataStart::Ready(conn) => conn,
            FtpDataStart::EmptyList(_) => return Ok(()),
        };

        let mut transfer = FtpLineDataTransfer::new(conn.stream, &self.config.transfer);
        transfer.discard_leading(self.socks4_discard(0));

        let mut keeper = FtpNoopKeeper::new(None);
        let r = tokio::time::timeout(
            self.config.transfer.list_all_timeout,
            transfer.read_to_end(receiver),
        )
        .await
        .unwrap_or(Err(FtpLineDataReadError::TimedOut));
        match r {
            Ok(_) => {
                if self.finish_transfer(conn.wait_end_reply, &mut keeper).await? {
                    Ok(())
                } else {
                    Err(FtpTransferError::ListFailed(path.to_string()))
                }
            }
            Err(FtpLineDataReadError::AbortedByCallback) => {
                debug!("listing of {path} stopped by the receiver");
                self.drain_transfer_end(conn.wait_end_reply, &mut keeper)
                    .await;
                Ok(())
            }
            Err(e) => {
                self.drain_transfer_end(conn.wait_end_reply, &mut keeper)
                    .await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_test::io::Builder;

    use crate::FtpClientConfig;
    use crate::connection::FtpProxyKind;
    use crate::test_util::*;

    const SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)), 21);

    fn pasv_config() -> FtpClientConfig {
        let mut config = FtpClientConfig::default();
        config.data_connection_mode = crate::FtpDataConnectionMode::Pasv;
        config
    }

    #[tokio::test]
    async fn names() {
        let control = Builder::new()
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"NLST /pub\r\n")
            .read(b"150 Here comes the directory listing.\r\n")
            .read(b"226 Directory send OK.\r\n")
            .build();
        let data = Builder::new().read(b"a.txt\r\nb.txt\r\n").build();
        let mut client = test_client(control, MockProvider::new(vec![data]), pasv_config(), SERVER);

        let names = client.list_names("/pub", &()).await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn empty_names() {
        let control = Builder::new()
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"NLST /empty\r\n")
            .read(b"550 No files found.\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![Builder::new().build()]),
            pasv_config(),
            SERVER,
        );

        let names = client.list_names("/empty", &()).await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn names_not_found() {
        let control = Builder::new()
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"NLST /none\r\n")
            .read(b"550 Permission denied.\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![Builder::new().build()]),
            pasv_config(),
            SERVER,
        );

        let e = client.list_names("/none", &()).await.unwrap_err();
        assert_eq!(e.rejected_reply().map(|r| r.code()), Some(550));
    }

    struct Collect(Vec<String>);

    #[async_trait]
    impl FtpLineDataReceiver for Collect {
        async fn recv_line(&mut self, line: &str) {
            self.0.push(line.to_string());
        }

        fn should_return_early(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn raw_mlsd_through_socks4() {
        let control = Builder::new()
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"MLSD /pub\r\n")
            .read(b"150 Here comes the directory listing.\r\n")
            .read(b"226 Directory send OK.\r\n")
            .build();
        let data = Builder::new()
            .read(b"\0\x5a\0\0\0\0")
            .read(b"type=file;size=3; a.txt\r\n")
            .build();
        let mut provider = MockProvider::new(vec![data]);
        provider.proxy = FtpProxyKind::Socks4a;
        let mut client = test_client(control, provider, pasv_config(), SERVER);

        let mut receiver = Collect(Vec::new());
        client
            .list_raw(FtpListCommand::Mlsd, "/pub", &mut receiver, &())
            .await
            .unwrap();
        assert_eq!(receiver.0, vec!["type=file;size=3; a.txt"]);
    }

    #[tokio::test]
    async fn raw_list_timed_out() {
        let control = Builder::new()
            .write(b"TYPE A\r\n")
            .read(b"200 Switching to ASCII mode.\r\n")
            .write(b"PASV\r\n")
            .read(b"227 Entering Passive Mode (203,0,113,1,195,80).\r\n")
            .write(b"LIST\r\n")
            .read(b"150 Here comes the directory listing.\r\n")
            .read(b"426 Connection closed.\r\n")
            .build();
        let data = Builder::new()
            .read(b"drwxr-xr-x 2 ftp ftp 4096 Jan 01 00:00 pub\r\n")
            .wait(Duration::from_secs(5))
            .build();
        let mut config = pasv_config();
        config.transfer.list_all_timeout = Duration::from_millis(50);
        let mut client = test_client(control, MockProvider::new(vec![data]), config, SERVER);

        let mut receiver = Collect(Vec::new());
        let e = client
            .list_raw(FtpListCommand::List, "", &mut receiver, &())
            .await
            .unwrap_err();
        assert!(matches!(
            e,
            FtpTransferError::ListData(FtpLineDataReadError::TimedOut)
        ));
        assert_eq!(receiver.0.len(), 1);
    }
}
