//! Interactive collection of the credentials and connection parameters.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};

use crate::config::{BaiduConfig, PanpostConfig, WordPressConfig};

/// Print `label` to `output` and read one trimmed line from `input`.
/// End of input is an error: every value is required.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String> {
    write!(output, "{label}: ")?;
    output.flush()?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {label}"))?;
    if read == 0 {
        bail!("Input ended before {label} was entered");
    }
    Ok(line.trim().to_string())
}

/// Ask for the nine values a run needs, in a fixed order: Baidu API key,
/// secret key, access token, refresh token, watched folder, then database
/// host, user, password and name.
pub fn prompt_config<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<PanpostConfig> {
    let api_key = ask(input, output, "Baidu Pan API key")?;
    let secret_key = ask(input, output, "Baidu Pan secret key")?;
    let access_token = ask(input, output, "Access token")?;
    let refresh_token = ask(input, output, "Refresh token")?;
    let watch_folder = ask(input, output, "Folder to watch")?;
    let host = ask(input, output, "WordPress database host")?;
    let user = ask(input, output, "WordPress database user")?;
    let password = ask(input, output, "WordPress database password")?;
    let database = ask(input, output, "WordPress database name")?;

    let baidu = BaiduConfig {
        api_key,
        secret_key,
        access_token,
        refresh_token,
    };
    let wordpress = WordPressConfig::new(host, user, password, database);
    Ok(PanpostConfig::new(watch_folder, baidu, wordpress))
}
