/// A content key id in its normalized form: lowercase hex, no separators.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct KeyId(String);

impl KeyId {
    /// Normalize a key id as it appears in manifests and tools.
    ///
    /// Dashes, braces and whitespace are dropped and hex digits are lowercased,
    /// so `{AA-BB-CC-DD}` and `aabbccdd` are the same key id.
    pub fn normalize(value: &str) -> Self {
        Self(
            value
                .chars()
                .filter(|x| !matches!(x, '-' | '{' | '}') && !x.is_whitespace())
                .map(|x| x.to_ascii_lowercase())
                .collect(),
        )
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// True when non empty and made of hex digits only.
    pub fn is_hex(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|x| x.is_ascii_hexdigit())
    }

    /// True for a full 128-bit key id (32 hex digits).
    pub fn is_valid(&self) -> bool {
        self.0.len() == 32 && self.is_hex()
    }

    /// Render as `8-4-4-4-12` for logs. Key ids which are not 128-bit are returned as is.
    pub fn uuid(&self) -> String {
        if !self.is_valid() {
            return self.0.clone();
        }

        format!(
            "{}-{}-{}-{}-{}",
            &self.0[..8],
            &self.0[8..12],
            &self.0[12..16],
            &self.0[16..20],
            &self.0[20..]
        )
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for KeyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
