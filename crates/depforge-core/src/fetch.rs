//! Downloading source archives.
//!
//! One unauthenticated GET per archive, no retries. The [`Fetch`] trait is
//! the seam the provisioner downloads through, so callers can substitute
//! their own transport.

use crate::ProvisionError;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

/// Something that can download a URL into a writer.
pub trait Fetch {
    /// Write the body of `url` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Fetch`] on connection failure or a non-2xx
    /// response, and [`ProvisionError::Io`] if `dest` cannot be written.
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<(), ProvisionError>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed for the whole download.
    pub timeout: Duration,
    /// Suppress download progress output.
    pub quiet: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("depforge/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(60),
            timeout: Duration::from_secs(600),
            quiet: false,
        }
    }
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    quiet: bool,
}

impl HttpFetcher {
    /// Create a fetcher with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(config: &FetchConfig) -> Result<Self, ProvisionError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProvisionError::Fetch {
                url: String::new(),
                reason: format!("could not create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            quiet: config.quiet,
        })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<(), ProvisionError> {
        let fetch_error = |reason: String| ProvisionError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .header("Accept", "application/octet-stream")
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;
        let mut reader = response;
        let mut buffer = [0; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| fetch_error(format!("connection interrupted: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            dest.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;

            if !self.quiet && total_size > 0 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
                let percent = (downloaded as f64 / total_size as f64 * 100.0) as u32;
                print!("\r  Downloading... {percent}%");
                io::stdout().flush().ok();
            }
        }

        if total_size > 0 && downloaded < total_size {
            return Err(fetch_error(format!(
                "incomplete body: got {downloaded} of {total_size} bytes"
            )));
        }

        dest.flush()?;
        if !self.quiet {
            println!("\r  Downloading... done    ");
        }

        Ok(())
    }
}

/// SHA256 of a file, lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
