//! Configuration document shapes (§3 `SyncConfig`/`MigrationConfig`, §6
//! "Configuration file format"), deserialized from the JSON or TOML file the
//! binary loads at startup.

use serde::Deserialize;

fn default_protocol() -> RemoteProtocol {
    RemoteProtocol::S3
}

fn default_max_conns() -> usize {
    10
}

fn default_items_chunk() -> usize {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    S3,
    Swift,
}

/// One local-container-to-remote-bucket mapping driving a sync worker.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub account: String,
    /// May be the all-containers wildcard `/*`.
    pub container: String,
    #[serde(default = "default_protocol")]
    pub protocol: RemoteProtocol,
    pub aws_bucket: String,
    pub aws_identity: String,
    pub aws_secret: String,
    #[serde(default)]
    pub aws_endpoint: Option<String>,
    #[serde(default)]
    pub custom_prefix: Option<String>,
    #[serde(default)]
    pub remote_account: Option<String>,
    #[serde(default = "default_max_conns")]
    pub max_conns: usize,
}

impl SyncConfig {
    pub fn is_wildcard_container(&self) -> bool {
        self.container == "/*"
    }

    /// True when this config targets the one cloud vendor that needs
    /// path-style addressing, SigV2 signing, and no multipart support.
    pub fn is_vendor_quirk_endpoint(&self) -> bool {
        self.aws_endpoint.as_deref() == Some(remote_storage::s3_provider::LEGACY_VENDOR_ENDPOINT)
    }
}

/// As [`SyncConfig`], plus the listing page size used per migration pass.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    #[serde(flatten)]
    pub sync: SyncConfig,
    #[serde(default = "default_items_chunk")]
    pub items_chunk: usize,
}

impl MigrationConfig {
    /// True iff all identity-relevant fields match; `status_dir` and any
    /// persisted cursor are deliberately excluded (§8 `equal_migration`).
    pub fn is_same_migration(&self, other: &MigrationConfig) -> bool {
        self.sync.account == other.sync.account
            && self.sync.aws_bucket == other.sync.aws_bucket
            && self.sync.aws_identity == other.sync.aws_identity
            && self.sync.aws_secret == other.sync.aws_secret
            && self.sync.aws_endpoint == other.sync.aws_endpoint
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_local_store_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// Top-level configuration document (§6). The native store's own endpoint and
/// auth token are not named in §6's field list (the original daemon reads
/// them from a separate internal-client config file, out of scope here), so
/// they are carried here instead with a loopback default.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    pub log_file: Option<String>,
    pub status_dir: String,
    #[serde(default = "default_local_store_endpoint")]
    pub local_store_endpoint: String,
    #[serde(default)]
    pub local_store_auth_token: String,
    #[serde(default)]
    pub containers: Vec<SyncConfig>,
    #[serde(default)]
    pub migrations: Vec<MigrationConfig>,
    #[serde(default = "default_max_conns")]
    pub workers: usize,
    #[serde(default = "default_items_chunk")]
    pub items_chunk: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_json_document() {
        let json = r#"{
            "status_dir": "/var/lib/mirror-daemon",
            "log_file": "/var/log/mirror-daemon.log",
            "containers": [{
                "account": "acct",
                "container": "cont",
                "aws_bucket": "bucket",
                "aws_identity": "id",
                "aws_secret": "secret"
            }],
            "migrations": []
        }"#;
        let config: MirrorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.containers.len(), 1);
        assert_eq!(config.containers[0].protocol, RemoteProtocol::S3);
        assert_eq!(config.workers, 10);
    }

    #[test]
    fn wildcard_container_is_detected() {
        let config = SyncConfig {
            account: "a".into(),
            container: "/*".into(),
            protocol: RemoteProtocol::S3,
            aws_bucket: "b".into(),
            aws_identity: "i".into(),
            aws_secret: "s".into(),
            aws_endpoint: None,
            custom_prefix: None,
            remote_account: None,
            max_conns: 10,
        };
        assert!(config.is_wildcard_container());
    }

    #[test]
    fn migrations_compare_identity_fields_only() {
        let base = SyncConfig {
            account: "a".into(),
            container: "c".into(),
            protocol: RemoteProtocol::S3,
            aws_bucket: "b".into(),
            aws_identity: "i".into(),
            aws_secret: "s".into(),
            aws_endpoint: None,
            custom_prefix: None,
            remote_account: None,
            max_conns: 10,
        };
        let a = MigrationConfig { sync: base.clone(), items_chunk: 100 };
        let mut b = MigrationConfig { sync: base, items_chunk: 500 };
        assert!(a.is_same_migration(&b));
        b.sync.aws_bucket = "different".into();
        assert!(!a.is_same_migration(&b));
    }
}
