//! Change-detection fingerprints for IngressRoutes
//!
//! A fingerprint is the first 16 bytes of a SHA-256 digest over the canonical
//! JSON of a route's spec followed by its namespace and name. It is used to
//! tell whether the gateway has loaded a given version of a route, never for
//! security.

use crate::Result;
use courier_api::IngressRoute;
use kube::ResourceExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of a fingerprint in bytes
pub const FINGERPRINT_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Fingerprint an IngressRoute by its spec, namespace and name
    pub fn of(route: &IngressRoute) -> Result<Self> {
        fingerprint(
            &route.namespace().unwrap_or_default(),
            &route.name_any(),
            &route.spec,
        )
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, always 32 characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the fingerprint of `spec` as owned by `namespace`/`name`
pub fn fingerprint<S>(namespace: &str, name: &str, spec: &S) -> Result<Fingerprint>
where
    S: Serialize + ?Sized,
{
    let mut bytes = canonical_json(spec)?;
    bytes.extend_from_slice(namespace.as_bytes());
    bytes.extend_from_slice(name.as_bytes());
    Ok(Fingerprint(digest(&bytes)))
}

/// Serialize `value` as compact JSON with object keys in sorted order.
///
/// Going through `serde_json::Value` pins the key order: its maps are
/// `BTreeMap`s as long as the `preserve_order` feature stays off.
pub fn canonical_json<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

pub(crate) fn digest(bytes: &[u8]) -> [u8; FINGERPRINT_LEN] {
    let full = Sha256::digest(bytes);
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&full[..FINGERPRINT_LEN]);
    out
}

/// "namespace/name" key used in logs, route names and virtual host names
pub fn route_key(route: &IngressRoute) -> String {
    format!(
        "{}/{}",
        route.namespace().unwrap_or_default(),
        route.name_any()
    )
}
