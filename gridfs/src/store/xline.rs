//! xline / etcd v3 backend.
//!
//! Key layout: `<prefix>/<region><full path>`, e.g. `/gridfs/metadata/a/b`
//! and `/gridfs/blocks/a/b`. etcd has no secondary index, so `query` scans a
//! key range and filters client-side. A filter on `parent` lists the keys below
//! that directory without values, keeps the direct children, and fetches only
//! their values.

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, GetOptions, Txn, TxnOp, TxnOpResponse};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{BackingStore, Query, Region, StoreError};

/// Reads per transaction; etcd caps a transaction at 128 operations by default.
const TXN_BATCH: usize = 64;

fn default_prefix() -> String {
    "/gridfs".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct XlineConfig {
    pub endpoints: Vec<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl XlineConfig {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            prefix: default_prefix(),
            username: None,
            password: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Accepts `host:port[,host:port...]`, with or without a scheme.
pub fn parse_endpoints(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct XlineStore {
    client: Client,
    prefix: String,
}

impl XlineStore {
    pub async fn connect(cfg: &XlineConfig) -> Result<Self, StoreError> {
        if cfg.endpoints.is_empty() {
            return Err(StoreError::Unavailable("no endpoints configured".into()));
        }
        let mut opts = ConnectOptions::new()
            .with_connect_timeout(Duration::from_secs(cfg.connect_timeout_secs));
        if let (Some(user), Some(password)) = (&cfg.username, &cfg.password) {
            opts = opts.with_user(user.clone(), password.clone());
        }
        let client = Client::connect(&cfg.endpoints, Some(opts)).await?;
        let store = Self {
            client,
            prefix: normalize_prefix(&cfg.prefix),
        };
        // channels connect lazily; one round trip makes an unreachable cluster fail here
        let mut kv = store.client.kv_client();
        kv.get(
            format!("{}/", store.prefix),
            Some(GetOptions::new().with_prefix().with_count_only()),
        )
        .await?;
        Ok(store)
    }

    /// Values of the keys directly below `dir`. Deeper keys are listed without
    /// their values and skipped.
    async fn child_values(&self, dir: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut kv = self.client.kv_client();
        let listed = kv
            .get(dir, Some(GetOptions::new().with_prefix().with_keys_only()))
            .await?;
        let children = direct_children(dir, listed.kvs().iter().map(|item| item.key()));
        debug!(
            range = %dir,
            scanned = listed.kvs().len(),
            children = children.len(),
            "child scan"
        );

        let mut values = Vec::with_capacity(children.len());
        for batch in children.chunks(TXN_BATCH) {
            let ops: Vec<TxnOp> = batch
                .iter()
                .map(|key| TxnOp::get(key.clone(), None))
                .collect();
            let resp = kv.txn(Txn::new().and_then(ops)).await?;
            for op in resp.op_responses() {
                if let TxnOpResponse::Get(get) = op {
                    // a child removed since the listing has no kv
                    values.extend(get.kvs().iter().map(|item| item.value().to_vec()));
                }
            }
        }
        Ok(values)
    }

    fn key_for(&self, region: Region, path: &str) -> String {
        format!("{}/{}{}", self.prefix, region, path)
    }

    /// Key range scanned for `query`.
    fn scan_prefix(&self, query: &Query) -> String {
        if query.field() == "parent" {
            let mut dir = self.key_for(query.region(), query.literal());
            if !dir.ends_with('/') {
                dir.push('/');
            }
            dir
        } else {
            format!("{}/{}/", self.prefix, query.region())
        }
    }
}

/// Keys exactly one level below `dir`, which ends with `/`.
fn direct_children<'a>(dir: &str, keys: impl IntoIterator<Item = &'a [u8]>) -> Vec<Vec<u8>> {
    keys.into_iter()
        .filter(|key| match key.strip_prefix(dir.as_bytes()) {
            Some(rest) => !rest.is_empty() && !rest.contains(&b'/'),
            None => false,
        })
        .map(<[u8]>::to_vec)
        .collect()
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[async_trait]
impl BackingStore for XlineStore {
    async fn get(&self, region: Region, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut kv = self.client.kv_client();
        let resp = kv.get(self.key_for(region, key), None).await?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn put(&self, region: Region, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut kv = self.client.kv_client();
        kv.put(self.key_for(region, key), value, None).await?;
        Ok(())
    }

    async fn remove(&self, region: Region, key: &str) -> Result<(), StoreError> {
        let mut kv = self.client.kv_client();
        kv.delete(self.key_for(region, key), None).await?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Vec<u8>>, StoreError> {
        let range = self.scan_prefix(query);
        let values = if query.field() == "parent" {
            self.child_values(&range).await?
        } else {
            let mut kv = self.client.kv_client();
            let resp = kv
                .get(range.clone(), Some(GetOptions::new().with_prefix()))
                .await?;
            debug!(range = %range, scanned = resp.kvs().len(), "query: {query}");
            resp.kvs().iter().map(|item| item.value().to_vec()).collect()
        };
        let mut out = Vec::new();
        for value in values {
            if query.matches_raw(&value)? {
                out.push(value);
            }
        }
        Ok(out)
    }
}
