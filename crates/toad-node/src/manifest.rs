//! Mini-app manifest served at `/.well-known/farcaster.json`.

use serde_json::{json, Value};
use toad_core::config::ManifestConfig;

fn image_url(root: &str, file: &str) -> String {
    format!("{}/images/{}", root, file)
}

pub fn build_manifest(cfg: &ManifestConfig) -> Value {
    let root = cfg.root_url.trim_end_matches('/');
    let screenshots: Vec<String> = cfg
        .screenshots
        .iter()
        .map(|f| image_url(root, f))
        .collect();

    json!({
        "accountAssociation": {
            "header": cfg.account_association.header,
            "payload": cfg.account_association.payload,
            "signature": cfg.account_association.signature,
        },
        "miniapp": {
            "version": cfg.version,
            "name": cfg.name,
            "subtitle": cfg.subtitle,
            "description": cfg.description,
            "screenshotUrls": screenshots,
            "iconUrl": image_url(root, &cfg.icon),
            "splashImageUrl": image_url(root, &cfg.splash_image),
            "splashBackgroundColor": cfg.splash_background_color,
            "homeUrl": root,
            "webhookUrl": format!("{}/webhook", root),
            "primaryCategory": cfg.primary_category,
            "tags": cfg.tags,
            "heroImageUrl": image_url(root, &cfg.hero_image),
            "tagline": cfg.tagline,
            "ogTitle": cfg.og_title,
            "ogDescription": cfg.og_description,
            "ogImageUrl": image_url(root, &cfg.og_image),
        }
    })
}
