use std::{fmt, str::FromStr};

use url::Url;

use crate::error::{DidHealthResult, StorageErrorSource};

/// A content address, independent of the gateway it was written or read through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentUri {
    pub cid: String,
    /// path inside a wrapping directory, without a leading slash
    pub path: Option<String>,
}

impl ContentUri {
    pub fn new(cid: impl Into<String>, path: Option<String>) -> Self {
        Self {
            cid: cid.into(),
            path: path.filter(|p| !p.is_empty()),
        }
    }

    /// Parse `ipfs://<cid>[/path]`, `https://<gw>/ipfs/<cid>[/path]` or
    /// `https://<cid>.ipfs.<gw>[/path]`.
    pub fn parse(input: &str) -> DidHealthResult<Self> {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("ipfs://") {
            let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
            let (cid, path) = match rest.split_once('/') {
                Some((cid, path)) => (cid, Some(path.to_string())),
                None => (rest, None),
            };
            return Self::validated(cid, path, input);
        }

        let url = Url::parse(input).map_err(|_| invalid(input))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid(input));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        if segments.first() == Some(&"ipfs") && segments.len() >= 2 {
            let path = (segments.len() > 2).then(|| segments[2..].join("/"));
            return Self::validated(segments[1], path, input);
        }

        let host = url.host_str().ok_or_else(|| invalid(input))?;
        if let Some((cid, _gateway)) = host.split_once(".ipfs.") {
            let path = (!segments.is_empty()).then(|| segments.join("/"));
            return Self::validated(cid, path, input);
        }

        Err(invalid(input))
    }

    fn validated(cid: &str, path: Option<String>, input: &str) -> DidHealthResult<Self> {
        if cid.is_empty() || !cid.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(invalid(input));
        }
        Ok(Self::new(cid, path))
    }

    /// `ipfs://<cid>[/path]`
    pub fn to_native(&self) -> String {
        match &self.path {
            Some(path) => format!("ipfs://{}/{}", self.cid, path),
            None => format!("ipfs://{}", self.cid),
        }
    }

    /// Path-style gateway URL under `gateway` (e.g. `https://w3s.link`).
    pub fn to_gateway(&self, gateway: &str) -> String {
        let gateway = gateway.trim_end_matches('/');
        match &self.path {
            Some(path) => format!("{gateway}/ipfs/{}/{}", self.cid, path),
            None => format!("{gateway}/ipfs/{}", self.cid),
        }
    }

    /// file name of the addressed blob, if any
    pub fn file_name(&self) -> Option<&str> {
        self.path.as_deref().and_then(|p| p.rsplit('/').next())
    }

    /// Blobs written by the encrypting workflow carry an `.enc` (or legacy `.lit`) suffix.
    pub fn is_encrypted(&self) -> bool {
        self.file_name()
            .is_some_and(|n| n.ends_with(".enc") || n.ends_with(".lit"))
    }
}

impl fmt::Display for ContentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_native())
    }
}

impl FromStr for ContentUri {
    type Err = crate::error::DidHealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(input: &str) -> crate::error::DidHealthError {
    StorageErrorSource::InvalidUri(input.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    #[test]
    fn parse_native_with_path() {
        let uri = ContentUri::parse(&format!("ipfs://{CID}/Patient/abc.json")).unwrap();
        assert_eq!(uri.cid, CID);
        assert_eq!(uri.path.as_deref(), Some("Patient/abc.json"));
        assert_eq!(uri.file_name(), Some("abc.json"));
        assert!(!uri.is_encrypted());
    }

    #[test]
    fn parse_path_gateway() {
        let uri = ContentUri::parse(&format!("https://w3s.link/ipfs/{CID}/Patient/x.enc")).unwrap();
        assert_eq!(uri.cid, CID);
        assert!(uri.is_encrypted());
        assert_eq!(uri.to_native(), format!("ipfs://{CID}/Patient/x.enc"));
    }

    #[test]
    fn parse_subdomain_gateway() {
        let uri = ContentUri::parse(&format!("https://{CID}.ipfs.w3s.link/didDocument/1.json")).unwrap();
        assert_eq!(uri.cid, CID);
        assert_eq!(uri.path.as_deref(), Some("didDocument/1.json"));
    }

    #[test]
    fn native_and_gateway_forms_address_the_same_content() {
        let native = ContentUri::parse(&format!("ipfs://{CID}/a.json")).unwrap();
        let gateway = ContentUri::parse(&native.to_gateway("https://ipfs.io/")).unwrap();
        assert_eq!(native, gateway);
        assert_eq!(native.to_gateway("https://ipfs.io/"), format!("https://ipfs.io/ipfs/{CID}/a.json"));
    }

    #[test]
    fn rejects_non_content_urls() {
        assert!(ContentUri::parse("https://example.com/file.json").is_err());
        assert!(ContentUri::parse("ftp://x/ipfs/abc").is_err());
        assert!(ContentUri::parse("ipfs://").is_err());
    }
}
