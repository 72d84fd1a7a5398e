//! Center target resolution
//!
//! The configured target is either a DNS name or a comma-separated list of
//! literal IPs. Only the output matters to the agent: an ordered list of
//! address strings, possibly empty.

use std::net::ToSocketAddrs;
use tracing::{debug, warn};

/// Turns a center target into candidate addresses
pub trait Resolver: Send {
    fn resolve(&self, target: &str) -> Vec<String>;
}

/// Resolver backed by the system name service
///
/// The target is first tried as a host name; if that fails it is treated as a
/// comma-separated IP list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, target: &str) -> Vec<String> {
        let target = target.trim();
        if target.is_empty() {
            return Vec::new();
        }

        match (target, 0u16).to_socket_addrs() {
            Ok(addrs) => {
                let mut resolved: Vec<String> = Vec::new();
                for addr in addrs {
                    let ip = addr.ip().to_string();
                    if !resolved.contains(&ip) {
                        resolved.push(ip);
                    }
                }
                debug!(center = target, ?resolved, "Resolved center name");
                resolved
            }
            Err(e) => {
                debug!(center = target, error = %e, "Not a resolvable name, parsing as IP list");
                let tokens = split_ip_list(target);
                if tokens.is_empty() {
                    warn!(center = target, "Not found any IP");
                }
                tokens
            }
        }
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_ip_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
