use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::error::LauncherResult;

const APP_USER_AGENT: &str = concat!("CraftenLauncher/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared client for manifests, downloads and the identity service.
///
/// Compression is disabled so `Content-Length` matches the bytes written
/// to disk and size checks stay meaningful.
pub fn build_http_client() -> LauncherResult<Client> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    let client = Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    Ok(client)
}
