use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::{RemoteFile, RemoteStorage, StorageError};
use crate::config::{self, BaiduConfig};

const MULTIMEDIA_URL: &str = "https://pan.baidu.com/rest/2.0/xpan/multimedia";
const FILE_URL: &str = "https://pan.baidu.com/rest/2.0/xpan/file";
const TOKEN_URL: &str = "https://openapi.baidu.com/oauth/2.0/token";

/// Root that relative folder names are resolved under. Apps registered with
/// Baidu Pan may only touch files below `/apps/<app name>`.
pub const APP_ROOT: &str = "/apps/bypy";

/// The download host rejects requests without this user agent.
const USER_AGENT: &str = "pan.baidu.com";

/// Page size for `listall`; the API caps it at 1000.
const LIST_PAGE_SIZE: u64 = 1000;

/// HTTP client for the Baidu Pan (xpan) REST API.
pub struct BaiduPanClient {
    creds: Mutex<BaiduConfig>,
    /// Config file that refreshed tokens are written back to
    token_file: Option<PathBuf>,
    agent: ureq::Agent,
}

impl BaiduPanClient {
    pub fn new(creds: BaiduConfig) -> Self {
        Self {
            creds: Mutex::new(creds),
            token_file: None,
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    /// Save every refreshed token pair into the config file at `path`.
    /// Baidu refresh tokens are single-use, so the file must follow along.
    pub fn persist_tokens_to(mut self, path: PathBuf) -> Self {
        self.token_file = Some(path);
        self
    }

    /// Snapshot of the current credentials.
    pub fn credentials(&self) -> BaiduConfig {
        self.creds().clone()
    }

    fn creds(&self) -> MutexGuard<'_, BaiduConfig> {
        self.creds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exchange the refresh token for a new access token. Both tokens are
    /// replaced since Baidu rotates the refresh token on every exchange.
    pub fn refresh_access_token(&self) -> Result<(), StorageError> {
        let endpoint = "oauth/token";
        let current = self.credentials();
        let resp_str = self
            .agent
            .get(TOKEN_URL)
            .query("grant_type", "refresh_token")
            .query("refresh_token", &current.refresh_token)
            .query("client_id", &current.api_key)
            .query("client_secret", &current.secret_key)
            .call()
            .map_err(|source| http_error(endpoint, source))?
            .body_mut()
            .read_to_string()
            .map_err(|source| http_error(endpoint, source))?;
        let json = parse_json(endpoint, &resp_str)?;
        let (access_token, refresh_token) = parse_token_response(&json)?;
        info!("Refreshed Baidu Pan access token");

        if let Some(path) = &self.token_file {
            match config::save_tokens(path, &access_token, &refresh_token) {
                Ok(()) => info!("Saved refreshed tokens to {}", path.display()),
                Err(e) => warn!("Refreshed tokens were not saved: {e:#}"),
            }
        }

        let mut creds = self.creds();
        creds.access_token = access_token;
        creds.refresh_token = refresh_token;
        Ok(())
    }

    /// Authenticated GET against an xpan endpoint, returning checked JSON.
    fn get(&self, url: &str, method: &str, params: &[(&str, &str)]) -> Result<Value, StorageError> {
        let access_token = self.creds().access_token.clone();
        let mut req = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .query("method", method)
            .query("access_token", &access_token);
        for &(key, value) in params {
            req = req.query(key, value);
        }
        let resp_str = req
            .call()
            .map_err(|source| http_error(method, source))?
            .body_mut()
            .read_to_string()
            .map_err(|source| http_error(method, source))?;
        let json = parse_json(method, &resp_str)?;
        check_errno(&json, method)?;
        Ok(json)
    }

    fn download_link(&self, fs_id: u64) -> Result<String, StorageError> {
        let fsids = format!("[{fs_id}]");
        let json = self.get(
            MULTIMEDIA_URL,
            "filemetas",
            &[("fsids", fsids.as_str()), ("dlink", "1")],
        )?;
        parse_download_link(&json, fs_id)
    }
}

impl RemoteStorage for BaiduPanClient {
    fn list(&self, folder: &str, recursive: bool) -> Result<Vec<RemoteFile>, StorageError> {
        let path = resolve_folder(folder);
        let recursion = if recursive { "1" } else { "0" };
        let limit = LIST_PAGE_SIZE.to_string();
        let mut start = 0u64;
        let mut files = Vec::new();

        loop {
            let start_str = start.to_string();
            let json = self.get(
                MULTIMEDIA_URL,
                "listall",
                &[
                    ("path", path.as_str()),
                    ("recursion", recursion),
                    ("start", start_str.as_str()),
                    ("limit", limit.as_str()),
                ],
            )?;
            let (page, has_more, cursor) = parse_listing(&json)?;
            debug!("Listed {} entries under {path} (start {start})", page.len());
            files.extend(page);

            if !has_more || cursor <= start {
                break;
            }
            start = cursor;
        }

        Ok(files)
    }

    fn download(&self, file: &RemoteFile, dest: &Path) -> Result<(), StorageError> {
        let endpoint = "download";
        let dlink = self.download_link(file.fs_id)?;
        let separator = if dlink.contains('?') { '&' } else { '?' };
        let url = format!("{dlink}{separator}access_token={}", self.creds().access_token);

        let mut resp = self
            .agent
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|source| http_error(endpoint, source))?;

        let written = save_body(&mut resp.body_mut().as_reader(), dest)?;
        debug!("Wrote {written} bytes of {} to {}", file.name, dest.display());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let endpoint = "filemanager";
        let access_token = self.creds().access_token.clone();
        let filelist = serde_json::to_string(&[path]).map_err(|e| StorageError::Malformed {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })?;
        let resp_str = self
            .agent
            .post(FILE_URL)
            .header("User-Agent", USER_AGENT)
            .query("method", "filemanager")
            .query("opera", "delete")
            .query("access_token", &access_token)
            .send_form([("async", "0"), ("filelist", filelist.as_str())])
            .map_err(|source| http_error(endpoint, source))?
            .body_mut()
            .read_to_string()
            .map_err(|source| http_error(endpoint, source))?;
        let json = parse_json(endpoint, &resp_str)?;
        check_errno(&json, endpoint)
    }

    fn renew_token(&self) -> Result<bool, StorageError> {
        self.refresh_access_token()?;
        Ok(true)
    }
}

/// Copy `body` into a new file at `dest` and return the byte count. The
/// buffer is flushed before returning; a failed final write is an error.
pub fn save_body<R: Read + ?Sized>(body: &mut R, dest: &Path) -> std::io::Result<u64> {
    let mut out = BufWriter::new(File::create(dest)?);
    let written = std::io::copy(body, &mut out)?;
    out.into_inner().map_err(|e| e.into_error())?;
    Ok(written)
}

fn http_error(endpoint: &str, source: ureq::Error) -> StorageError {
    StorageError::Http {
        endpoint: endpoint.to_string(),
        source,
    }
}

fn malformed(endpoint: &str, detail: impl Into<String>) -> StorageError {
    StorageError::Malformed {
        endpoint: endpoint.to_string(),
        detail: detail.into(),
    }
}

fn parse_json(endpoint: &str, body: &str) -> Result<Value, StorageError> {
    serde_json::from_str(body).map_err(|e| malformed(endpoint, format!("invalid JSON: {e}")))
}

/// Resolve a watched-folder name to an absolute remote path. Relative names
/// live under [`APP_ROOT`].
pub fn resolve_folder(folder: &str) -> String {
    let folder = folder.trim();
    if folder.starts_with('/') {
        let trimmed = folder.trim_end_matches('/');
        return if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() };
    }
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        APP_ROOT.to_string()
    } else {
        format!("{APP_ROOT}/{folder}")
    }
}

/// xpan responses carry `errno: 0` on success. Missing errno counts as success.
pub fn check_errno(json: &Value, endpoint: &str) -> Result<(), StorageError> {
    match json["errno"].as_i64() {
        Some(0) | None => Ok(()),
        Some(errno) => Err(StorageError::Api {
            endpoint: endpoint.to_string(),
            errno,
        }),
    }
}

/// Parse one `listall` page. Returns (entries, has_more, next start cursor).
pub fn parse_listing(json: &Value) -> Result<(Vec<RemoteFile>, bool, u64), StorageError> {
    let endpoint = "listall";
    check_errno(json, endpoint)?;
    let entries = json["list"]
        .as_array()
        .ok_or_else(|| malformed(endpoint, "missing list"))?;

    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry["server_filename"]
            .as_str()
            .ok_or_else(|| malformed(endpoint, "entry without server_filename"))?
            .to_string();
        let path = entry["path"]
            .as_str()
            .ok_or_else(|| malformed(endpoint, format!("entry {name} without path")))?
            .to_string();
        files.push(RemoteFile {
            fs_id: entry["fs_id"].as_u64().unwrap_or(0),
            is_directory: entry["isdir"].as_i64().unwrap_or(0) != 0,
            creation_timestamp: entry["server_ctime"].as_i64().unwrap_or(0),
            size: entry["size"].as_u64().unwrap_or(0),
            name,
            path,
        });
    }

    let has_more = json["has_more"].as_i64().unwrap_or(0) != 0;
    let cursor = json["cursor"].as_u64().unwrap_or(0);
    Ok((files, has_more, cursor))
}

/// Pick the download link for `fs_id` out of a `filemetas` response.
pub fn parse_download_link(json: &Value, fs_id: u64) -> Result<String, StorageError> {
    let endpoint = "filemetas";
    check_errno(json, endpoint)?;
    json["list"]
        .as_array()
        .and_then(|list| list.iter().find(|meta| meta["fs_id"].as_u64() == Some(fs_id)))
        .and_then(|meta| meta["dlink"].as_str())
        .map(str::to_string)
        .ok_or_else(|| malformed(endpoint, format!("no download link for fs_id {fs_id}")))
}

/// Parse an OAuth token response into (access_token, refresh_token).
pub fn parse_token_response(json: &Value) -> Result<(String, String), StorageError> {
    let endpoint = "oauth/token";
    if let Some(error) = json["error"].as_str() {
        let description = json["error_description"].as_str().unwrap_or("");
        return Err(malformed(endpoint, format!("{error}: {description}")));
    }
    let access = json["access_token"]
        .as_str()
        .ok_or_else(|| malformed(endpoint, "missing access_token"))?;
    let refresh = json["refresh_token"]
        .as_str()
        .ok_or_else(|| malformed(endpoint, "missing refresh_token"))?;
    Ok((access.to_string(), refresh.to_string()))
}
