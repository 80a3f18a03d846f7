use std::path::PathBuf;

use reqwest::Url;

/// Expands a leading `~` in a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Maps an HTTP base URL onto its websocket counterpart (`http` → `ws`,
/// `https` → `wss`). URLs that already use a websocket scheme pass through.
pub fn websocket_base(base: &Url) -> Result<Url, String> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(format!("Unsupported scheme \"{other}\" in {base}")),
    };
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| format!("Cannot switch {base} to {scheme}"))?;
    Ok(url)
}

/// Builds `{base}/{route}/{org}`. The organization name is a single path
/// segment, so reserved characters (`/`, `%`, spaces, ...) are percent-encoded.
pub fn endpoint_url(base: &Url, route: &str, org: &str) -> Result<Url, String> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| format!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .push(route)
        .push(org);
    Ok(url)
}
