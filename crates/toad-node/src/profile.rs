// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - PROFILE LOOKUP
//
// Best-effort address → social profile resolution. Sources are tried in
// priority order, one request each, no retries. Every JSON reply is run
// through the shape extractors below; the first source whose reply matches
// a shape wins and is cached for `cache_ttl_secs`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::safe_lock;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use toad_core::config::{ProfileConfig, ADDRESS_PLACEHOLDER};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Profile {
    Normalized {
        username: Option<String>,
        #[serde(rename = "displayName")]
        display_name: Option<String>,
        avatar: Option<String>,
    },
    /// The reply mentioned profile fields but in no shape we recognise.
    Raw { raw: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Cached(Profile),
    Found { profile: Profile, source: String },
    NotFound { tried: Vec<String> },
}

/// First non-empty string among `keys` on `obj`.
fn first_str(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// `{ "user": { ... } }`
fn user_object_shape(doc: &Value) -> Option<Profile> {
    let user = doc.get("user").filter(|u| u.is_object())?;
    Some(Profile::Normalized {
        username: first_str(user, &["username", "fname"]),
        display_name: first_str(user, &["displayName", "name"]),
        avatar: first_str(user, &["avatar", "avatarUrl", "profileImageUrl"]),
    })
}

/// `{ "username": ..., "displayName": ..., "avatar": ... }`
fn top_level_shape(doc: &Value) -> Option<Profile> {
    let username = first_str(doc, &["username"]);
    let display_name = first_str(doc, &["displayName"]);
    let has_avatar = first_str(doc, &["avatar"]).is_some();
    if username.is_none() && display_name.is_none() && !has_avatar {
        return None;
    }
    Some(Profile::Normalized {
        username,
        display_name,
        avatar: first_str(doc, &["avatar", "avatarUrl"]),
    })
}

/// `{ "result": { "username": ... } }`
fn result_object_shape(doc: &Value) -> Option<Profile> {
    let result = doc.get("result")?;
    let username = first_str(result, &["username"])?;
    Some(Profile::Normalized {
        username: Some(username),
        display_name: first_str(result, &["displayName"]),
        avatar: first_str(result, &["avatar"]),
    })
}

/// Anything whose text mentions a profile field is kept verbatim.
fn raw_mention_shape(doc: &Value) -> Option<Profile> {
    if !(doc.is_object() || doc.is_array()) {
        return None;
    }
    let flat = doc.to_string();
    if flat.contains("username") || flat.contains("avatar") {
        Some(Profile::Raw { raw: doc.clone() })
    } else {
        None
    }
}

const SHAPES: &[fn(&Value) -> Option<Profile>] = &[
    user_object_shape,
    top_level_shape,
    result_object_shape,
    raw_mention_shape,
];

/// Run a reply through the shape extractors in priority order.
pub fn detect_profile(doc: &Value) -> Option<Profile> {
    SHAPES.iter().find_map(|shape| shape(doc))
}

/// Stand-in for the placeholder while a template is parsed.
const SLOT: &str = "toad-address-slot";

/// Fill `template` with `address`, escaped for the URL component the
/// placeholder sits in (path segment or query value). `None` when the
/// template is not a usable URL or puts the placeholder anywhere else.
fn fill_template(template: &str, address: &str) -> Option<Url> {
    let mut url = Url::parse(&template.replace(ADDRESS_PLACEHOLDER, SLOT)).ok()?;

    let mut scratch = url.clone();
    scratch.set_query(None);
    scratch.path_segments_mut().ok()?.clear().push(address);
    let as_segment = scratch.path().trim_start_matches('/').to_string();
    scratch.query_pairs_mut().clear().append_pair("a", address);
    let as_query_value = scratch.query()?.strip_prefix("a=")?.to_string();

    if url.path().contains(SLOT) {
        let path = url.path().replace(SLOT, &as_segment);
        url.set_path(&path);
    }
    if let Some(query) = url.query().filter(|q| q.contains(SLOT)) {
        let query = query.replace(SLOT, &as_query_value);
        url.set_query(Some(&query));
    }
    (!url.as_str().contains(SLOT)).then_some(url)
}

pub struct ProfileResolver {
    client: reqwest::Client,
    sources: Vec<String>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, Profile)>>,
}

impl ProfileResolver {
    pub fn new(config: &ProfileConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            sources: config.sources.clone(),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Concrete URLs that will be tried for `address`.
    pub fn source_urls(&self, address: &str) -> Vec<Url> {
        self.sources
            .iter()
            .filter_map(|tpl| {
                let url = fill_template(tpl, address);
                if url.is_none() {
                    tracing::warn!(source = %tpl, "skipping unusable profile source");
                }
                url
            })
            .collect()
    }

    fn cached(&self, address: &str) -> Option<Profile> {
        let mut cache = safe_lock(&self.cache);
        match cache.get(address) {
            Some((at, profile)) if at.elapsed() < self.ttl => Some(profile.clone()),
            Some(_) => {
                cache.remove(address);
                None
            }
            None => None,
        }
    }

    async fn fetch(&self, url: &Url) -> Option<Profile> {
        let resp = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(%url, "profile source unreachable: {}", e);
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(%url, status = %resp.status(), "profile source declined");
            return None;
        }
        let doc: Value = resp.json().await.ok()?;
        detect_profile(&doc)
    }

    /// `address` must already be normalized.
    pub async fn lookup(&self, address: &str) -> LookupOutcome {
        if let Some(profile) = self.cached(address) {
            return LookupOutcome::Cached(profile);
        }

        let urls = self.source_urls(address);
        for url in &urls {
            if let Some(profile) = self.fetch(url).await {
                safe_lock(&self.cache)
                    .insert(address.to_string(), (Instant::now(), profile.clone()));
                return LookupOutcome::Found {
                    profile,
                    source: url.to_string(),
                };
            }
        }
        LookupOutcome::NotFound {
            tried: urls.iter().map(Url::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warp::Filter;

    #[test]
    fn test_user_object_shape() {
        let doc = json!({"user": {"fname": "toadking", "name": "Toad King", "profileImageUrl": "https://img/x.png"}});
        assert_eq!(
            detect_profile(&doc),
            Some(Profile::Normalized {
                username: Some("toadking".to_string()),
                display_name: Some("Toad King".to_string()),
                avatar: Some("https://img/x.png".to_string()),
            })
        );
    }

    #[test]
    fn test_top_level_shape() {
        let doc = json!({"username": "hopper", "avatarUrl": "https://img/h.png"});
        assert_eq!(
            detect_profile(&doc),
            Some(Profile::Normalized {
                username: Some("hopper".to_string()),
                display_name: None,
                avatar: Some("https://img/h.png".to_string()),
            })
        );
    }

    #[test]
    fn test_result_object_shape() {
        let doc = json!({"result": {"username": "swampy", "displayName": "Swampy"}});
        let profile = detect_profile(&doc).unwrap();
        assert_eq!(
            serde_json::to_value(&profile).unwrap(),
            json!({"username": "swampy", "displayName": "Swampy", "avatar": null})
        );
    }

    #[test]
    fn test_raw_fallback_and_no_match() {
        let doc = json!({"data": [{"profile": {"username": "deep"}}]});
        assert_eq!(
            detect_profile(&doc),
            Some(Profile::Raw { raw: doc.clone() })
        );
        assert_eq!(detect_profile(&json!({"status": "ok"})), None);
        assert_eq!(detect_profile(&json!("username")), None);
    }

    fn resolver_for(sources: &[&str]) -> ProfileResolver {
        ProfileResolver::new(&ProfileConfig {
            cache_ttl_secs: 60,
            request_timeout_secs: 1,
            sources: sources.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_source_urls_encode_address() {
        let resolver = resolver_for(&["http://x/users/{address}?q={address}&v=2"]);
        let urls: Vec<String> = resolver
            .source_urls("0xab c/&")
            .iter()
            .map(Url::to_string)
            .collect();
        assert_eq!(urls, vec!["http://x/users/0xab%20c%2F&?q=0xab+c%2F%26&v=2"]);
    }

    #[test]
    fn test_unusable_sources_are_skipped() {
        let resolver = resolver_for(&[
            "not a url/{address}",
            "http://{address}.example/",
            "https://api.example/v1/{address}",
        ]);
        let urls = resolver.source_urls("0xabc");
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "https://api.example/v1/0xabc");
    }

    #[tokio::test]
    async fn test_lookup_falls_through_to_first_matching_source() {
        let declined = warp::path("a").map(|| {
            warp::reply::with_status("nope", warp::http::StatusCode::NOT_FOUND)
        });
        let no_shape = warp::path("b").map(|| warp::reply::json(&json!({"status": "ok"})));
        let hit = warp::path!("c" / String)
            .map(|addr: String| warp::reply::json(&json!({"user": {"username": addr}})));
        let (addr, server) =
            warp::serve(declined.or(no_shape).or(hit)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let base = format!("http://{}", addr);
        let resolver = ProfileResolver::new(&ProfileConfig {
            cache_ttl_secs: 60,
            request_timeout_secs: 2,
            sources: vec![
                format!("{}/a/{{address}}", base),
                format!("{}/b/{{address}}", base),
                format!("{}/c/{{address}}", base),
            ],
        })
        .unwrap();

        match resolver.lookup("0xabc").await {
            LookupOutcome::Found { profile, source } => {
                assert_eq!(source, format!("{}/c/0xabc", base));
                assert_eq!(
                    profile,
                    Profile::Normalized {
                        username: Some("0xabc".to_string()),
                        display_name: None,
                        avatar: None,
                    }
                );
            }
            other => panic!("expected a match, got {:?}", other),
        }

        assert!(matches!(
            resolver.lookup("0xabc").await,
            LookupOutcome::Cached(_)
        ));
    }

    #[tokio::test]
    async fn test_lookup_reports_every_source_tried() {
        let resolver = ProfileResolver::new(&ProfileConfig {
            cache_ttl_secs: 60,
            request_timeout_secs: 1,
            sources: vec![
                "http://127.0.0.1:9/{address}".to_string(),
                "http://127.0.0.1:9/v2/{address}".to_string(),
            ],
        })
        .unwrap();

        assert_eq!(
            resolver.lookup("0xabc").await,
            LookupOutcome::NotFound {
                tried: vec![
                    "http://127.0.0.1:9/0xabc".to_string(),
                    "http://127.0.0.1:9/v2/0xabc".to_string(),
                ]
            }
        );
    }
}
