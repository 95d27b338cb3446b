//! Builds a [`remote_storage::RemoteProvider`] from a [`sync_core::SyncConfig`],
//! choosing the S3-compatible or native-peer backend by `protocol` (§6).

use remote_storage::native_provider::NativeProviderConfig;
use remote_storage::s3_provider::S3ProviderConfig;
use remote_storage::{NativeProvider, RemoteProvider, S3Provider};
use sync_core::{RemoteProtocol, SyncConfig};

pub async fn build(config: &SyncConfig) -> RemoteProvider {
    match config.protocol {
        RemoteProtocol::S3 => RemoteProvider::S3(
            S3Provider::new(S3ProviderConfig {
                bucket: config.aws_bucket.clone(),
                endpoint: config.aws_endpoint.clone(),
                access_key: config.aws_identity.clone(),
                secret_key: config.aws_secret.clone(),
                region: None,
                max_conns: config.max_conns,
            })
            .await,
        ),
        RemoteProtocol::Swift => RemoteProvider::Native(NativeProvider::new(NativeProviderConfig {
            endpoint: config.aws_endpoint.clone().unwrap_or_default(),
            account: config.remote_account.clone().unwrap_or_else(|| config.account.clone()),
            container: config.aws_bucket.clone(),
            auth_token: config.aws_secret.clone(),
        })),
    }
}
