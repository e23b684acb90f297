/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::error::Error;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::FtpConnectionProvider;
use crate::client::FtpClient;
use crate::error::{FtpCommandError, FtpRawResponseError, FtpTransferError};

/// Send NOOP on the control channel while a long transfer is in progress,
/// and remember how many replies are still to be read.
pub(crate) struct FtpNoopKeeper {
    interval: Option<Duration>,
    last_active: Instant,
    pending: usize,
}

impl FtpNoopKeeper {
    pub(crate) fn new(interval: Option<Duration>) -> Self {
        FtpNoopKeeper {
            interval,
            last_active: Instant::now(),
            pending: 0,
        }
    }

    fn is_due(&self) -> bool {
        self.interval
            .is_some_and(|interval| self.last_active.elapsed() >= interval)
    }

    fn mark_sent(&mut self) {
        self.last_active = Instant::now();
        self.pending += 1;
    }

    #[inline]
    pub(crate) fn pending(&self) -> usize {
        self.pending
    }

    fn consume(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }
}

impl<CP, S, E, UD> FtpClient<CP, S, E, UD>
where
    CP: FtpConnectionProvider<S, E, UD>,
    S: AsyncRead + AsyncWrite + Unpin,
    E: Error + Send + Sync + 'static,
{
    pub(crate) async fn keep_alive(
        &mut self,
        keeper: &mut FtpNoopKeeper,
    ) -> Result<(), FtpCommandError> {
        if keeper.is_due() {
            self.control.send_noop().await?;
            keeper.mark_sent();
        }
        Ok(())
    }

    /// Read the replies left on the control channel after the data
    /// connection has been closed.
    ///
    /// Returns false if the server reported that the transfer failed.
    pub(crate) async fn finish_transfer(
        &mut self,
        wait_end_reply: bool,
        keeper: &mut FtpNoopKeeper,
    ) -> Result<bool, FtpTransferError> {
        let mut success = true;
        if wait_end_reply {
            loop {
                let reply = self.control.read_delayed_reply("wait transfer end").await?;
                match reply.code() {
                    100..=199 => {}
                    200 if keeper.pending() > 0 => keeper.consume(),
                    _ if reply.is_negative() => {
                        warn!("server reported transfer failure: {reply}");
                        success = false;
                        break;
                    }
                    _ => break,
                }
            }
        }

        let timeout = self.config.transfer.end_wait_timeout;
        while keeper.pending() > 0 {
            match self
                .control
                .read_reply_within(timeout, "wait noop reply")
                .await
            {
                Ok(reply) => {
                    if reply.code() != 200 {
                        debug!("unexpected reply to NOOP: {reply}");
                    }
                    keeper.consume();
                }
                Err(FtpRawResponseError::ReadResponseTimedOut(_)) => {
                    warn!("{} NOOP replies not received", keeper.pending());
                    break;
                }
                Err(e) => return Err(FtpCommandError::RecvFailed(e).into()),
            }
        }

        Ok(success)
    }

    /// Drain the replies of a broken transfer, errors are ignored.
    pub(crate) async fn drain_transfer_end(
        &mut self,
        wait_end_reply: bool,
        keeper: &mut FtpNoopKeeper,
    ) {
        let mut left = keeper.pending() + usize::from(wait_end_reply);
        keeper.pending = 0;

        let timeout = self.config.transfer.end_wait_timeout;
        while left > 0 {
            match self
                .control
                .read_reply_within(timeout, "drain transfer end")
                .await
            {
                Ok(reply) => debug!("reply after broken transfer: {reply}"),
                Err(e) => {
                    debug!("stop draining replies after broken transfer: {e}");
                    return;
                }
            }
            left -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use tokio_test::io::Builder;

    use crate::FtpClientConfig;
    use crate::test_util::*;

    const SERVER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 21);

    #[test]
    fn keeper() {
        let mut keeper = FtpNoopKeeper::new(None);
        assert!(!keeper.is_due());

        let mut keeper = FtpNoopKeeper::new(Some(Duration::ZERO));
        assert!(keeper.is_due());
        keeper.mark_sent();
        keeper.mark_sent();
        assert_eq!(keeper.pending(), 2);
        keeper.consume();
        keeper.consume();
        keeper.consume();
        assert_eq!(keeper.pending(), 0);
    }

    #[tokio::test]
    async fn noop_replies_around_end_reply() {
        let control = Builder::new()
            .write(b"NOOP\r\n")
            .write(b"NOOP\r\n")
            .read(b"150 Opening\r\n")
            .read(b"200 NOOP ok\r\n")
            .read(b"226 Transfer complete\r\n")
            .read(b"200 NOOP ok\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![]),
            FtpClientConfig::default(),
            SERVER,
        );
        let mut keeper = FtpNoopKeeper::new(Some(Duration::ZERO));
        client.keep_alive(&mut keeper).await.unwrap();
        client.keep_alive(&mut keeper).await.unwrap();
        assert!(client.finish_transfer(true, &mut keeper).await.unwrap());
        assert_eq!(keeper.pending(), 0);
    }

    #[tokio::test]
    async fn negative_end_reply() {
        let control = Builder::new()
            .read(b"451 Local error in processing\r\n")
            .build();
        let mut client = test_client(
            control,
            MockProvider::new(vec![]),
            FtpClientConfig::default(),
            SERVER,
        );
        let mut keeper = FtpNoopKeeper::new(None);
        assert!(!client.finish_transfer(true, &mut keeper).await.unwrap());
    }

    #[tokio::test]
    async fn missing_noop_reply() {
        let control = Builder::new()
            .write(b"NOOP\r\n")
            .read(b"226 Transfer complete\r\n")
            .wait(Duration::from_secs(5))
            .build();
        let mut config = FtpClientConfig::default();
        config.transfer.end_wait_timeout = Duration::from_millis(50);
        let mut client = test_client(control, MockProvider::new(vec![]), config, SERVER);
        let mut keeper = FtpNoopKeeper::new(Some(Duration::ZERO));
        client.keep_alive(&mut keeper).await.unwrap();
        assert!(client.finish_transfer(true, &mut keeper).await.unwrap());
        assert_eq!(keeper.pending(), 1);
    }
}
