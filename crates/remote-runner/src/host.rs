//! Host environment detection
//!
//! Media files referenced by loader nodes are served by the host's own
//! file server. Where that server lives depends on how the host is being
//! accessed: a local development host always serves from a fixed port,
//! anything else serves under the current origin and path prefix.

use reqwest::Url;

use crate::constants::hosts;
use crate::error::{Result, RunnerError};

/// Where the host editor is being served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLocation {
    /// e.g., "localhost"
    pub hostname: String,
    /// e.g., "https://studio.example.com"
    pub origin: String,
    /// e.g., "/comfy/"
    pub pathname: String,
}

impl HostLocation {
    /// Parse a location from the editor's full URL
    pub fn from_url(href: &str) -> Result<Self> {
        let url = Url::parse(href)
            .map_err(|e| RunnerError::HostUnavailable(format!("invalid host URL '{}': {}", href, e)))?;

        let hostname = url.host_str().unwrap_or_default().to_string();
        Ok(Self {
            hostname,
            origin: url.origin().ascii_serialization(),
            pathname: url.path().to_string(),
        })
    }

    /// Whether this is a recognized local development host
    pub fn is_local(&self) -> bool {
        hosts::LOCAL_HOSTNAMES.contains(&self.hostname.as_str())
    }

    /// Base URL of the host's file server
    pub fn file_server(&self) -> String {
        if self.is_local() {
            return hosts::LOCAL_FILE_SERVER.to_string();
        }

        let segments: Vec<&str> = self.pathname.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            self.origin.clone()
        } else {
            format!("{}/{}", self.origin, segments.join("/"))
        }
    }

    /// Download URL of an input file on the host's file server
    pub fn input_file_url(&self, filename: &str) -> Result<Url> {
        let base = format!("{}/api/view", self.file_server());
        Url::parse_with_params(&base, &[("type", "input"), ("filename", filename)])
            .map_err(|e| RunnerError::InvalidResponse(format!("cannot build download URL: {}", e)))
    }
}
