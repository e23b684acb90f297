/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpReplyType {
    PositivePreliminary,
    PositiveCompletion,
    PositiveIntermediate,
    TransientNegative,
    PermanentNegative,
}

/// A reply read from the control connection.
///
/// For multi-line replies, `message` holds the text of the final line and
/// `info` holds all the lines before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    code: u16,
    message: String,
    info: Vec<String>,
}

impl FtpReply {
    pub(crate) fn new(code: u16, message: String, info: Vec<String>) -> Self {
        FtpReply {
            code,
            message,
            info,
        }
    }

    #[inline]
    pub fn code(&self) -> u16 {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn info_lines(&self) -> &[String] {
        &self.info
    }

    pub fn reply_type(&self) -> FtpReplyType {
        match self.code / 100 {
            1 => FtpReplyType::PositivePreliminary,
            2 => FtpReplyType::PositiveCompletion,
            3 => FtpReplyType::PositiveIntermediate,
            4 => FtpReplyType::TransientNegative,
            _ => FtpReplyType::PermanentNegative,
        }
    }

    /// 1xx, 2xx and 3xx replies are all positive
    pub fn is_success(&self) -> bool {
        self.code < 400
    }

    pub fn is_preliminary(&self) -> bool {
        self.reply_type() == FtpReplyType::PositivePreliminary
    }

    pub fn is_negative(&self) -> bool {
        self.code >= 400
    }

    pub fn is_permanent_negative(&self) -> bool {
        self.reply_type() == FtpReplyType::PermanentNegative
    }
}

impl fmt::Display for FtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify() {
        let reply = FtpReply::new(150, "Opening data connection".to_string(), Vec::new());
        assert!(reply.is_success());
        assert!(reply.is_preliminary());
        assert!(!reply.is_negative());

        let reply = FtpReply::new(350, "Restarting".to_string(), Vec::new());
        assert!(reply.is_success());
        assert_eq!(reply.reply_type(), FtpReplyType::PositiveIntermediate);

        let reply = FtpReply::new(425, "Can't open data connection".to_string(), Vec::new());
        assert!(reply.is_negative());
        assert!(!reply.is_permanent_negative());

        let reply = FtpReply::new(502, "Not implemented".to_string(), Vec::new());
        assert!(reply.is_permanent_negative());
        assert_eq!(reply.to_string(), "502 Not implemented");
    }
}
