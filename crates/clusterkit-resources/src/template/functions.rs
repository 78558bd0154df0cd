//! Helper functions available to resource templates
//!
//! - `publicKey(certsPath, platform, name)`: contents of `<certsPath>/<platform>/<name>.crt`
//! - `privateKey(certsPath, platform, name)`: contents of `<certsPath>/<platform>/<name>.key`
//! - `getPEM(certsPath, platform, name)`: public key followed by private key
//! - `cert(certsPath, platform, name)`: base64 of `getPEM`
//! - `base64Encode(data)`: base64 of a string (also a filter)
//! - `readFile(path)`: raw file contents
//! - `elasticFileshares(json)`: decode a JSON array of elastic file shares
//!   (also registered as `unmarshallEFS`)
//! - `join(list, sep)`, `trim(s)`

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Error, ErrorKind, Value};
use serde::{Deserialize, Serialize};

fn key_path(certs_path: &str, platform: &str, name: &str, extension: &str) -> PathBuf {
    Path::new(certs_path)
        .join(platform)
        .join(format!("{}.{}", name, extension))
}

/// Read a file, failing the render if it cannot be read
pub fn read_file(path: &str) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("failed to read {}", path),
        )
        .with_source(e)
    })
}

/// Public key of a certificate
pub fn public_key(certs_path: &str, platform: &str, name: &str) -> Result<String, Error> {
    read_file(&key_path(certs_path, platform, name, "crt").to_string_lossy())
}

/// Private key of a certificate
pub fn private_key(certs_path: &str, platform: &str, name: &str) -> Result<String, Error> {
    read_file(&key_path(certs_path, platform, name, "key").to_string_lossy())
}

/// Public and private key concatenated as one PEM bundle
pub fn get_pem(certs_path: &str, platform: &str, name: &str) -> Result<String, Error> {
    let public = public_key(certs_path, platform, name)?;
    let private = private_key(certs_path, platform, name)?;
    Ok(format!("{}{}", public, private))
}

/// Base64-encoded PEM bundle
pub fn cert(certs_path: &str, platform: &str, name: &str) -> Result<String, Error> {
    get_pem(certs_path, platform, name).map(|pem| base64_encode(&pem))
}

/// Standard base64 encoding
pub fn base64_encode(data: &str) -> String {
    STANDARD.encode(data.as_bytes())
}

/// An elastic file share as recorded by the provisioner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticFileshare {
    /// Share name
    pub efs_name: String,
    /// Filesystem id
    pub efs_id: String,
    /// Region the share lives in
    pub efs_region: String,
    /// Mount DNS name
    pub efs_dns: String,
}

/// Decode a JSON array of elastic file shares
pub fn elastic_fileshares(json: &str) -> Result<Value, Error> {
    let shares: Vec<ElasticFileshare> = serde_json::from_str(json).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            "elastic file shares must be a JSON array",
        )
        .with_source(e)
    })?;
    Ok(Value::from_serialize(&shares))
}

/// Join the items of a sequence with a separator
pub fn join(items: Value, separator: &str) -> Result<String, Error> {
    let parts: Vec<String> = items.try_iter()?.map(|item| item.to_string()).collect();
    Ok(parts.join(separator))
}

/// Strip leading and trailing whitespace
pub fn trim(value: &str) -> String {
    value.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certs_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let platform = dir.path().join("eks");
        std::fs::create_dir_all(&platform).unwrap();
        std::fs::write(platform.join("root_ca.crt"), "PUBLIC\n").unwrap();
        std::fs::write(platform.join("root_ca.key"), "PRIVATE\n").unwrap();
        dir
    }

    #[test]
    fn reads_key_pairs_by_platform() {
        let dir = certs_dir();
        let path = dir.path().to_string_lossy().to_string();

        assert_eq!(public_key(&path, "eks", "root_ca").unwrap(), "PUBLIC\n");
        assert_eq!(private_key(&path, "eks", "root_ca").unwrap(), "PRIVATE\n");
        assert_eq!(get_pem(&path, "eks", "root_ca").unwrap(), "PUBLIC\nPRIVATE\n");
        assert_eq!(
            cert(&path, "eks", "root_ca").unwrap(),
            STANDARD.encode("PUBLIC\nPRIVATE\n")
        );
    }

    #[test]
    fn missing_key_fails() {
        let dir = certs_dir();
        let path = dir.path().to_string_lossy().to_string();
        assert!(public_key(&path, "aks", "root_ca").is_err());
        assert!(cert(&path, "eks", "missing").is_err());
    }

    #[test]
    fn decodes_elastic_fileshares() {
        let json = r#"[{"efs_name":"data","efs_id":"fs-1","efs_region":"us-west-2","efs_dns":"fs-1.efs.amazonaws.com"}]"#;
        let shares = elastic_fileshares(json).unwrap();
        assert_eq!(shares.len(), Some(1));
        let first = shares.get_item(&Value::from(0)).unwrap();
        assert_eq!(first.get_attr("efs_id").unwrap().as_str(), Some("fs-1"));
    }

    #[test]
    fn malformed_fileshares_fail() {
        assert!(elastic_fileshares("{not json").is_err());
    }

    #[test]
    fn joins_and_trims() {
        let items = Value::from(vec!["a", "b", "c"]);
        assert_eq!(join(items, ",").unwrap(), "a,b,c");
        assert_eq!(trim("  x \n"), "x");
        assert_eq!(base64_encode("demo01"), "ZGVtbzAx");
    }
}
