use crate::ConfigError;
use std::fmt;
use std::str::FromStr;

/// A parsed `scheme://bucket[/key]` reference into a remote blob store.
///
/// The bucket is everything up to the first `/` after the scheme separator and
/// the key is whatever follows it, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteRef {
    scheme: String,
    bucket: String,
    key: String,
}

impl RemoteRef {
    pub fn parse(reference: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = reference
            .split_once("://")
            .ok_or_else(|| invalid("expected the form scheme://bucket[/key]"))?;

        let mut chars = scheme.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return Err(invalid("scheme must start with a letter")),
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
            return Err(invalid("scheme contains invalid characters"));
        }

        let (bucket, key) = match rest.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(invalid("bucket name is empty"));
        }
        if bucket == "." || bucket == ".." {
            return Err(invalid("bucket name cannot be a relative path component"));
        }
        if bucket.chars().any(char::is_whitespace) {
            return Err(invalid("bucket name contains whitespace"));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Appends a relative path to this reference's key, inserting a single `/`
    /// unless the key is empty or already ends with one.
    pub fn join(&self, relative: &str) -> RemoteRef {
        let relative = relative.trim_start_matches('/');
        let key = if self.key.is_empty() || self.key.ends_with('/') {
            format!("{}{}", self.key, relative)
        } else {
            format!("{}/{}", self.key, relative)
        };
        Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}://{}", self.scheme, self.bucket)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
        }
    }
}

impl FromStr for RemoteRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bucket_and_key() {
        let r = RemoteRef::parse("gs://mock/something/1").unwrap();
        assert_eq!(r.scheme(), "gs");
        assert_eq!(r.bucket(), "mock");
        assert_eq!(r.key(), "something/1");
        assert_eq!(r.to_string(), "gs://mock/something/1");
    }

    #[test]
    fn bucket_only_has_empty_key() {
        let r = RemoteRef::parse("gs://mock").unwrap();
        assert_eq!(r.bucket(), "mock");
        assert_eq!(r.key(), "");

        let trailing = RemoteRef::parse("gs://mock/").unwrap();
        assert_eq!(trailing.key(), "");
    }

    #[test]
    fn rejects_malformed_references() {
        for bad in [
            "",
            "mock/1",
            "gs:/mock",
            "gs://",
            "gs:///key",
            "://b/k",
            "1s://b/k",
            "gs://../k",
        ] {
            assert!(
                matches!(
                    RemoteRef::parse(bad),
                    Err(ConfigError::InvalidReference { .. })
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn join_inserts_exactly_one_separator() {
        let bare = RemoteRef::parse("gs://mock").unwrap();
        assert_eq!(bare.join("subdir/2").to_string(), "gs://mock/subdir/2");

        let nested = RemoteRef::parse("gs://mock/out").unwrap();
        assert_eq!(nested.join("2").to_string(), "gs://mock/out/2");

        let slashed = RemoteRef::parse("gs://mock/out/").unwrap();
        assert_eq!(slashed.join("2").to_string(), "gs://mock/out/2");
    }
}
