//! Pod to address resolution.
//!
//! Turns a snapshot of pods into the addresses peers should join. Every pod
//! goes through the same three steps:
//!
//! 1. It must be `Running`, and if it carries a `Ready` condition that
//!    condition must be `True`. A pod without a `Ready` condition is accepted.
//! 2. The pod IP is used, or the host IP when host networking is configured.
//!    A pod without that IP is skipped.
//! 3. If the pod has a non-empty [`ANNOTATION_KEY_PORT`] annotation, its value
//!    is resolved to a port and appended to the IP.
//!
//! A pod failing any step is logged and left out; the remaining pods are still
//! processed. The output keeps the order of the input.

use std::net::Ipv6Addr;

use k8s_openapi::api::core::v1::{ContainerPort, Pod};

use crate::config::DiscoveryConfig;

/// Annotation naming the port (by container port name or number) to append to
/// the address.
pub const ANNOTATION_KEY_PORT: &str = "olric/auto-join-port";

const PHASE_RUNNING: &str = "Running";
const CONDITION_READY: &str = "Ready";
const CONDITION_TRUE: &str = "True";

/// Reason a pod contributes no address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum Skip {
    #[error("not running: {0:?}")]
    NotRunning(String),

    #[error("not ready state")]
    NotReady,

    #[error("requested IP is empty")]
    EmptyIp,

    #[error("error retrieving port: {0:?} is neither a declared port name nor an integer")]
    InvalidPort(String),
}

/// Extracts the join addresses from a list of pods.
///
/// Pods that are not running, not ready, have no usable IP, or carry a port
/// annotation that cannot be resolved are skipped with a debug log entry.
/// An empty result is not an error at this level.
#[must_use]
pub fn pod_addresses(pods: &[Pod], config: &DiscoveryConfig) -> Vec<String> {
    pods.iter()
        .filter_map(|pod| match pod_address(pod, config.host_network) {
            Ok(addr) => Some(addr),
            Err(reason) => {
                tracing::debug!("ignoring pod {:?}, {reason}", pod_name(pod));
                None
            }
        })
        .collect()
}

/// Resolves the address of a single pod.
fn pod_address(pod: &Pod, host_network: bool) -> Result<String, Skip> {
    let status = pod.status.as_ref();

    let phase = status.and_then(|s| s.phase.as_deref()).unwrap_or_default();
    if phase != PHASE_RUNNING {
        return Err(Skip::NotRunning(phase.to_string()));
    }

    // Only an explicit Ready condition that is not True rejects the pod.
    let not_ready = status
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == CONDITION_READY && c.status != CONDITION_TRUE);
    if not_ready {
        return Err(Skip::NotReady);
    }

    let ip = status
        .and_then(|s| {
            if host_network {
                s.host_ip.as_deref()
            } else {
                s.pod_ip.as_deref()
            }
        })
        .unwrap_or_default();
    if ip.is_empty() {
        return Err(Skip::EmptyIp);
    }

    let annotation = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_KEY_PORT))
        .filter(|v| !v.is_empty());

    let Some(annotation) = annotation else {
        return Ok(ip.to_string());
    };

    let port = pod_port(pod, annotation, host_network)
        .ok_or_else(|| Skip::InvalidPort(annotation.clone()))?;

    Ok(join_host_port(ip, port))
}

/// Resolves a non-empty port annotation against the pod's declared ports.
///
/// A declared port whose name equals the annotation wins. With host
/// networking its host port is used, and a port without a host port is passed
/// over so that later containers declaring the same name still get a chance.
/// If no declared port matches, the annotation is parsed as an integer.
fn pod_port(pod: &Pod, annotation: &str, host_network: bool) -> Option<i32> {
    let mut named = declared_ports(pod).filter(|p| p.name.as_deref() == Some(annotation));

    let found = if host_network {
        named.find_map(|p| p.host_port.filter(|&port| port != 0))
    } else {
        named.next().map(|p| p.container_port)
    };

    found.or_else(|| parse_port(annotation))
}

/// All ports declared by the pod's containers, in declaration order.
fn declared_ports(pod: &Pod) -> impl Iterator<Item = &ContainerPort> {
    pod.spec
        .iter()
        .flat_map(|spec| &spec.containers)
        .flat_map(|container| container.ports.iter().flatten())
}

/// Parses a 32-bit signed integer, honoring `0x`, `0o`, `0b` and leading-zero
/// octal prefixes after an optional sign.
fn parse_port(value: &str) -> Option<i32> {
    let (negative, unsigned) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let prefix = unsigned.get(..2).map(str::to_ascii_lowercase);
    let (radix, digits) = match prefix.as_deref() {
        Some("0x") => (16, &unsigned[2..]),
        Some("0o") => (8, &unsigned[2..]),
        Some("0b") => (2, &unsigned[2..]),
        _ if unsigned.len() > 1 && unsigned.starts_with('0') => (8, &unsigned[1..]),
        _ => (10, unsigned),
    };

    // from_str_radix would accept a second sign here.
    if digits.starts_with(['+', '-']) {
        return None;
    }

    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    i32::try_from(if negative { -magnitude } else { magnitude }).ok()
}

/// Formats `ip:port`, bracketing IPv6 addresses.
fn join_host_port(ip: &str, port: i32) -> String {
    if ip.parse::<Ipv6Addr>().is_ok() {
        format!("[{ip}]:{port}")
    } else {
        format!("{ip}:{port}")
    }
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}
