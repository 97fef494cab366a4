//! Default embedded configuration for easyacme
//!
//! Used by the CLI when no configuration file is given. Values mirror the
//! programmatic `Default` impls.

/// Let's Encrypt production directory
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// User-Agent sent to the CA and DNS provider APIs
pub const USER_AGENT: &str = concat!("easyacme/", env!("CARGO_PKG_VERSION"));

/// Embedded default configuration in KDL format
pub const DEFAULT_CONFIG_KDL: &str = r#"
// easyacme default configuration

acme {
    directory-url "https://acme-v02.api.letsencrypt.org/directory"
    request-timeout-secs 30
}

polling {
    challenge-initial-interval-secs 5
    finalize-window-secs 30
    finalize-attempts 60
}

pending {
    ttl-secs 600
}

precheck {
    retry-delay-secs 30
}

propagation {
    enabled #true
    initial-delay-secs 10
    check-interval-secs 5
    timeout-secs 120
}

dns-providers {
    api-timeout-secs 30
}

logging {
    level "info"
    format "pretty"
}
"#;
