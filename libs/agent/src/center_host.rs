//! # Center Hosts
//!
//! ## Purpose
//!
//! Tracks the candidate center endpoints produced by resolving the configured
//! target. The set is owned by the reactor thread alone and doubles as a
//! round-robin ring for host selection, so it needs no locking.
//!
//! ## Reconciliation
//!
//! Re-resolution must not reset history. Given the previous ring and a fresh
//! resolution:
//! - hosts no longer resolved are removed
//! - newly resolved hosts are appended with a zero failure counter
//! - hosts present in both keep their counter and ring position
//! - an empty resolution leaves the ring untouched

use crate::error::{AgentError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::info;

/// One candidate center endpoint with its reconnect-failure counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CenterHost {
    address: String,
    port: u16,
    consecutive_failures: u32,
}

impl CenterHost {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            consecutive_failures: 0,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Identity used by reconciliation
    pub fn matches(&self, address: &str, port: u16) -> bool {
        self.address == address && self.port == port
    }

    /// Socket address to connect to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                AgentError::connection_with_source(
                    format!("Invalid center address {}", self),
                    None,
                    e,
                )
            })?
            .next()
            .ok_or_else(|| AgentError::connection(format!("No address for center {}", self), None))
    }
}

impl fmt::Display for CenterHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Ordered host set used as a round-robin ring
#[derive(Debug, Default)]
pub struct CenterHostRing {
    hosts: VecDeque<CenterHost>,
}

impl CenterHostRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile against a fresh resolution
    ///
    /// Returns whether any host is available afterwards.
    pub fn reconcile(&mut self, resolved: &[String], port: u16) -> bool {
        if resolved.is_empty() {
            return !self.hosts.is_empty();
        }

        self.hosts.retain(|host| {
            let keep = resolved.iter().any(|address| host.matches(address, port));
            if !keep {
                info!(center = %host, "Remove center");
            }
            keep
        });

        for address in resolved {
            if !self.hosts.iter().any(|host| host.matches(address, port)) {
                let host = CenterHost::new(address.as_str(), port);
                info!(center = %host, "Center added");
                self.hosts.push_back(host);
            }
        }

        !self.hosts.is_empty()
    }

    /// Strict round-robin: rotate the front host to the back and return it
    ///
    /// The rotation happens before the connect attempt, so a persistently
    /// failing host never starves the others.
    pub fn select(&mut self) -> Option<&mut CenterHost> {
        let host = self.hosts.pop_front()?;
        self.hosts.push_back(host);
        self.hosts.back_mut()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CenterHost> {
        self.hosts.iter()
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
    }
}
