use crate::service::AmountPolicy;
use crate::StreakPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the JSON ledger inside `data_dir`.
pub const LEDGER_FILE: &str = "claims.json";
/// Directory name of the sled ledger inside `data_dir`.
pub const SLED_DIR: &str = "claims_db";

/// Placeholder substituted with the url-encoded address in profile sources.
pub const ADDRESS_PLACEHOLDER: &str = "{address}";

/// Where the claim ledger lives.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Single pretty-printed JSON document (`claims.json`).
    #[default]
    Json,
    /// sled embedded database, one key per identity.
    Sled,
}

/// Parse a snake_case enum value the same way the TOML file would.
pub fn parse_setting<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|e| format!("invalid setting '{}': {}", raw, e))
}

/// Node configuration, loaded from TOML. Every field has a default so a
/// partial file (or no file at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub bind_addr: String,
    pub api_port: u16,
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    pub streak_policy: StreakPolicy,
    pub amount_policy: AmountPolicy,
    /// Average requests per second per client IP.
    pub rate_limit_per_sec: u32,
    /// Burst capacity per client IP.
    pub rate_limit_burst: u32,
    /// `POST /claim` attempts per client IP per minute, on top of the
    /// general budget. A claim succeeds at most once a day, so this can be
    /// far tighter than the read budget.
    pub claim_submits_per_min: u32,
    pub profile: ProfileConfig,
    pub manifest: ManifestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfileConfig {
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    /// Lookup URLs tried in order; `{address}` is replaced by the address.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccountAssociation {
    pub header: String,
    pub payload: String,
    pub signature: String,
}

/// Mini-app manifest. Image fields are file names under `<root_url>/images/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManifestConfig {
    pub root_url: String,
    pub version: String,
    pub name: String,
    pub subtitle: String,
    pub description: String,
    pub screenshots: Vec<String>,
    pub icon: String,
    pub splash_image: String,
    pub splash_background_color: String,
    pub primary_category: String,
    pub tags: Vec<String>,
    pub hero_image: String,
    pub tagline: String,
    pub og_title: String,
    pub og_description: String,
    pub og_image: String,
    pub account_association: AccountAssociation,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            api_port: 3030,
            data_dir: PathBuf::from("data"),
            storage: StorageBackend::default(),
            streak_policy: StreakPolicy::default(),
            amount_policy: AmountPolicy::default(),
            rate_limit_per_sec: 20,
            rate_limit_burst: 40,
            claim_submits_per_min: 10,
            profile: ProfileConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            request_timeout_secs: 5,
            sources: vec![
                "https://api.farcaster.xyz/v2/user-by-address?address={address}".to_string(),
                "https://api.warpcast.com/v2/users/by-address/{address}".to_string(),
                "https://api.castalchemy.org/v1/user?address={address}".to_string(),
            ],
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            root_url: "https://vice-toads.vercel.app".to_string(),
            version: "1".to_string(),
            name: "Vice Toads".to_string(),
            subtitle: "Mint Based Vice Toads NFT".to_string(),
            description: "On-chain art collectibles on Base. Mint your Vice Toad and join the swamp."
                .to_string(),
            screenshots: vec![
                "bg2.webp".to_string(),
                "bg3.webp".to_string(),
                "bg4.webp".to_string(),
            ],
            icon: "icon.png".to_string(),
            splash_image: "splash.webp".to_string(),
            splash_background_color: "#000000".to_string(),
            primary_category: "art-creativity".to_string(),
            tags: ["vice", "toads", "base", "nft", "mint"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            hero_image: "bg1.webp".to_string(),
            tagline: "Mint Based Vice Toads".to_string(),
            og_title: "Vice Toads — Mint on Base".to_string(),
            og_description: "Collect and mint your Vice Toad NFTs directly on Base. Limited supply."
                .to_string(),
            og_image: "bg1.webp".to_string(),
            account_association: AccountAssociation {
                header: "eyJmaWQiOjM0NjA3NSwidHlwZSI6ImN1c3RvZHkiLCJrZXkiOiIweDEwQjUzYTlGNDFBNzhlNENDQ0FhZUEyQzUxZGZiNUY2RmYwMjIzMTgifQ".to_string(),
                payload: "eyJkb21haW4iOiJ2aWNlLXRvYWRzLnZlcmNlbC5hcHAifQ".to_string(),
                signature: "VuapZP02zGv/2Ho4HslcWbd9GKNA9BcxOc7qh9ND/OtUfuMfVGvaS9Z8gWyG8JEB1H6ZZpND7r/vpwPxjwpJ2Rs=".to_string(),
            },
        }
    }
}

impl NodeConfig {
    /// Load node config from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overridden by `TOAD_*` environment variables.
    /// Useful for containerized deployments
    pub fn load_from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields for every `TOAD_*` variable that is set.
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TOAD_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = var("TOAD_API_PORT") {
            self.api_port = v.trim().parse()?;
        }
        if let Some(v) = var("TOAD_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("TOAD_STORAGE") {
            self.storage = parse_setting(&v)?;
        }
        if let Some(v) = var("TOAD_STREAK_POLICY") {
            self.streak_policy = parse_setting(&v)?;
        }
        if let Some(v) = var("TOAD_AMOUNT_POLICY") {
            self.amount_policy = parse_setting(&v)?;
        }
        if let Some(v) = var("TOAD_CLAIM_SUBMITS_PER_MIN") {
            self.claim_submits_per_min = v.trim().parse()?;
        }
        if let Some(v) = var("TOAD_ROOT_URL") {
            self.manifest.root_url = v;
        }
        Ok(())
    }

    /// Save node config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api_port == 0 {
            return Err("api_port cannot be 0".to_string());
        }
        if self.bind_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("bind_addr '{}' is not an IP address", self.bind_addr));
        }
        if self.rate_limit_per_sec == 0 {
            return Err("rate_limit_per_sec must be > 0".to_string());
        }
        if self.rate_limit_burst < self.rate_limit_per_sec {
            return Err("rate_limit_burst must be >= rate_limit_per_sec".to_string());
        }
        if self.claim_submits_per_min == 0 {
            return Err("claim_submits_per_min must be > 0".to_string());
        }
        if self.profile.request_timeout_secs == 0 {
            return Err("profile.request_timeout_secs must be > 0".to_string());
        }
        if let Some(bad) = self
            .profile
            .sources
            .iter()
            .find(|s| !s.contains(ADDRESS_PLACEHOLDER))
        {
            return Err(format!("profile source '{}' has no {{address}} placeholder", bad));
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn sled_path(&self) -> PathBuf {
        self.data_dir.join(SLED_DIR)
    }
}
