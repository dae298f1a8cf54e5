//! # Package Naming Utilities
//!
//! Every artifact lives under a key derived from the package name and the
//! version: `<name>-<encoded version>.tgz`. Scoped packages therefore get an
//! `@scope/` directory. The download filename clients see uses the unscoped
//! segment only (`/@scope/foo/-/foo-1.0.0.tgz`), matching npm.
//!
//! Versions are percent-encoded in keys and filenames; everything except
//! ASCII alphanumerics and `-._~` is escaped, so build metadata (`+`) and
//! anything stranger stay inside a single path segment.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const TARBALL_SUFFIX: &str = ".tgz";

/// Characters escaped in the version part of keys and filenames
const VERSION_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `@scope/foo` -> `foo`, `foo` -> `foo`
pub fn unscoped_name(package_name: &str) -> &str {
    package_name
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(package_name)
}

pub fn encode_version(version: &str) -> String {
    utf8_percent_encode(version, VERSION_ENCODE_SET).to_string()
}

/// Reverse of [`encode_version`]. Fails on invalid UTF-8.
pub fn decode_version(encoded: &str) -> Option<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Storage key of the artifact for one package version
pub fn storage_key(package_name: &str, version: &str) -> String {
    format!(
        "{}-{}{}",
        package_name,
        encode_version(version),
        TARBALL_SUFFIX
    )
}

/// Download filename of one package version, e.g. `foo-1.0.0.tgz`
pub fn tarball_filename(package_name: &str, version: &str) -> String {
    format!(
        "{}-{}{}",
        unscoped_name(package_name),
        encode_version(version),
        TARBALL_SUFFIX
    )
}

/// Public download URL of one package version
pub fn tarball_url(base_url: &str, package_name: &str, version: &str) -> String {
    format!(
        "{}/{}/-/{}",
        base_url.trim_end_matches('/'),
        package_name,
        tarball_filename(package_name, version)
    )
}

/// Recover the version from a download filename.
///
/// Strips the `<unscoped name>-` prefix and the `.tgz` suffix and
/// percent-decodes the rest. Returns `None` if the filename does not belong
/// to `package_name` or the version part is empty.
pub fn parse_tarball_filename(package_name: &str, file_name: &str) -> Option<String> {
    let rest = file_name
        .strip_prefix(unscoped_name(package_name))?
        .strip_prefix('-')?
        .strip_suffix(TARBALL_SUFFIX)?;

    if rest.is_empty() {
        return None;
    }

    let version = decode_version(rest)?;
    if version.is_empty() || version.contains('/') || version.contains('\0') {
        return None;
    }
    Some(version)
}

/// Attachment name referenced by a version's `dist.tarball` URL.
///
/// npm names attachments after the tarball path below `/<package>/-/`, e.g.
/// `http://host/@scope/foo/-/@scope/foo-1.0.0.tgz` -> `@scope/foo-1.0.0.tgz`.
/// Returns `None` for unparsable URLs or paths outside of the package.
pub fn attachment_name(package_name: &str, tarball_url: &str) -> Option<String> {
    let url = url::Url::parse(tarball_url).ok()?;
    let path = percent_decode_str(url.path()).decode_utf8().ok()?;

    let prefix = format!("/{}/-/", package_name);
    let name = path.strip_prefix(&prefix)?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}
