/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

/// Parse `h1,h2,h3,h4,p1,p2` from a 227 reply, the parentheses are optional.
pub(crate) fn parse_pasv_reply(msg: &str) -> Option<SocketAddrV4> {
    let bytes = msg.as_bytes();
    let mut offset = 0;
    while offset < bytes.len() {
        let start = offset + bytes[offset..].iter().position(u8::is_ascii_digit)?;
        let len = bytes[start..]
            .iter()
            .position(|c| !c.is_ascii_digit() && *c != b',')
            .unwrap_or(bytes.len() - start);
        if let Some(addr) = parse_pasv_tuple(&msg[start..start + len]) {
            return Some(addr);
        }
        offset = start + len;
    }
    None
}

fn parse_pasv_tuple(s: &str) -> Option<SocketAddrV4> {
    let mut v = [0u8; 6];
    let mut iter = s.split(',');
    for n in v.iter_mut() {
        *n = u8::from_str(iter.next()?).ok()?;
    }
    if iter.next().is_some() {
        return None;
    }

    let ip = Ipv4Addr::new(v[0], v[1], v[2], v[3]);
    let port = ((v[4] as u16) << 8) + (v[5] as u16);
    Some(SocketAddrV4::new(ip, port))
}

/// Parse the port from a 229 reply, like `(|||6446|)`.
pub(crate) fn parse_epsv_reply(msg: &str) -> Option<u16> {
    let p_start = memchr::memchr(b'(', msg.as_bytes())?;
    let p_end = p_start + memchr::memchr(b')', &msg.as_bytes()[p_start..])?;
    let inner = &msg.as_bytes()[p_start + 1..p_end];
    if inner.len() < 5 {
        return None;
    }

    let d = inner[0];
    if d.is_ascii_digit() || inner[1] != d || inner[2] != d || inner[inner.len() - 1] != d {
        return None;
    }
    let port = std::str::from_utf8(&inner[3..inner.len() - 1]).ok()?;
    u16::from_str(port).ok()
}

/// Addresses that a server behind NAT may advertise in its PASV reply.
pub(crate) fn is_non_routable(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip == Ipv4Addr::LOCALHOST || ip.is_unspecified()
}

pub(crate) fn format_port_param(addr: SocketAddrV4) -> String {
    let ip = addr.ip().octets();
    let port = addr.port();
    format!(
        "{},{},{},{},{},{}",
        ip[0],
        ip[1],
        ip[2],
        ip[3],
        port >> 8,
        port & 0xFF
    )
}

pub(crate) fn format_eprt_param(addr: SocketAddr) -> String {
    let family = match addr.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    format!("|{family}|{}|{}|", addr.ip(), addr.port())
}
