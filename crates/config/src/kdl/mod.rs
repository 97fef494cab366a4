//! KDL configuration parsing.
//!
//! One section parser per top-level node. Unknown top-level nodes are logged
//! and ignored so newer files still load on older binaries.

mod helpers;

pub use helpers::{
    get_arg_pair, get_bool_entry, get_string_args, get_string_entry, get_u64_entry,
    offset_to_line_col,
};

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::warn;

use crate::Config;

/// Convert a parsed KDL document to Config
pub fn parse_kdl_document(doc: &kdl::KdlDocument) -> Result<Config> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => parse_acme(node, &mut config)?,
            "polling" => parse_polling(node, &mut config)?,
            "pending" => {
                if let Some(v) = get_u64_entry(node, "ttl-secs")? {
                    config.pending.ttl_secs = v;
                }
            }
            "precheck" => {
                if let Some(v) = get_u64_entry(node, "retry-delay-secs")? {
                    config.precheck.retry_delay_secs = v;
                }
                config.precheck.nameservers = get_string_args(node, "nameservers");
            }
            "propagation" => parse_propagation(node, &mut config)?,
            "dns-providers" => parse_dns_providers(node, &mut config)?,
            "storage" => {
                config.storage.path = get_string_entry(node, "path").map(PathBuf::from);
            }
            "logging" => {
                if let Some(level) = get_string_entry(node, "level") {
                    config.logging.level = level;
                }
                if let Some(format) = get_string_entry(node, "format") {
                    config.logging.format = format;
                }
            }
            other => warn!(node = other, "Ignoring unknown configuration node"),
        }
    }

    Ok(config)
}

fn parse_acme(node: &kdl::KdlNode, config: &mut Config) -> Result<()> {
    if let Some(url) = get_string_entry(node, "directory-url") {
        config.acme.directory_url = url;
    }
    config.acme.preferred_chain = get_string_entry(node, "preferred-chain");
    if let Some(v) = get_u64_entry(node, "request-timeout-secs")? {
        config.acme.request_timeout_secs = v;
    }
    if let Some(ua) = get_string_entry(node, "user-agent") {
        config.acme.user_agent = ua;
    }
    Ok(())
}

fn parse_polling(node: &kdl::KdlNode, config: &mut Config) -> Result<()> {
    if let Some(v) = get_u64_entry(node, "challenge-initial-interval-secs")? {
        config.polling.challenge_initial_interval_secs = v;
    }
    if let Some(v) = get_u64_entry(node, "finalize-window-secs")? {
        config.polling.finalize_window_secs = v;
    }
    if let Some(v) = get_u64_entry(node, "finalize-attempts")? {
        config.polling.finalize_attempts = u32::try_from(v)
            .map_err(|_| anyhow!("'finalize-attempts' is out of range: {}", v))?;
    }
    Ok(())
}

fn parse_propagation(node: &kdl::KdlNode, config: &mut Config) -> Result<()> {
    if let Some(enabled) = get_bool_entry(node, "enabled") {
        config.propagation.enabled = enabled;
    }
    if let Some(v) = get_u64_entry(node, "initial-delay-secs")? {
        config.propagation.initial_delay_secs = v;
    }
    if let Some(v) = get_u64_entry(node, "check-interval-secs")? {
        config.propagation.check_interval_secs = v;
    }
    if let Some(v) = get_u64_entry(node, "timeout-secs")? {
        config.propagation.timeout_secs = v;
    }
    Ok(())
}

fn parse_dns_providers(node: &kdl::KdlNode, config: &mut Config) -> Result<()> {
    if let Some(v) = get_u64_entry(node, "api-timeout-secs")? {
        config.dns_providers.api_timeout_secs = v;
    }
    if let Some(children) = node.children() {
        for child in children.nodes().iter().filter(|n| n.name().value() == "endpoint") {
            let (provider, url) = get_arg_pair(child)
                .ok_or_else(|| anyhow!("'endpoint' expects a provider type and a URL"))?;
            config.dns_providers.endpoints.insert(provider, url);
        }
    }
    Ok(())
}
