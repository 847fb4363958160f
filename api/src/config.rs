use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::info;

pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    /// Posts per feed page.
    pub page_size: usize,
    pub broadcast_capacity: usize,
    /// Where the local image store writes, and the base URL its files are
    /// served under.
    pub image_dir: PathBuf,
    pub public_url: String,
    /// When set, images go to the remote host instead of local disk.
    pub image_host: Option<ImageHostConfig>,
}

pub struct ImageHostConfig {
    pub base_url: String,
    pub api_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = load_or("PORT", "8080");
        Self {
            port,
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set!"),
            page_size: load_or("FEED_PAGE_SIZE", "2"),
            broadcast_capacity: load_or("BROADCAST_CAPACITY", "64"),
            image_dir: env::var("IMAGE_DIR").unwrap_or_else(|_| "images".into()).into(),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            image_host: env::var("IMAGE_HOST_URL").ok().map(|base_url| ImageHostConfig {
                base_url,
                api_key: env::var("IMAGE_HOST_KEY")
                    .expect("IMAGE_HOST_KEY must be set when IMAGE_HOST_URL is"),
            }),
        }
    }
}

fn load_or<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .unwrap_or_else(|e| panic!("Invalid {key} value {raw:?}: {e}"))
}
