const COMMON_SYSTEM_ID: &str = "1077efecc0b24d02ace33c1e52e2fb4b";
const PLAYREADY_SYSTEM_ID: &str = "9a04f07998404286ab92e65be0885f95";
const WIDEVINE_SYSTEM_ID: &str = "edef8ba979d64acea3c827dcd51d21ed";

/// DRM system identified by its 128-bit system id.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum SystemId {
    Common,
    PlayReady,
    WideVine,
    /// Any other system id, in lowercase hex.
    Other(String),
}

impl SystemId {
    /// Classify a hex system id (separators and case are ignored).
    pub fn from_hex(value: &str) -> Self {
        let value = value.replace('-', "").to_ascii_lowercase();

        match value.as_str() {
            COMMON_SYSTEM_ID => Self::Common,
            PLAYREADY_SYSTEM_ID => Self::PlayReady,
            WIDEVINE_SYSTEM_ID => Self::WideVine,
            _ => Self::Other(value),
        }
    }

    /// Classify a `ContentProtection@schemeIdUri` value such as
    /// `urn:uuid:EDEF8BA9-79D6-4ACE-A3C8-27DCD51D21ED`.
    ///
    /// Returns `None` for non uuid schemes (eg. `urn:mpeg:dash:mp4protection:2011`).
    pub fn from_scheme_id_uri(value: &str) -> Option<Self> {
        let value = value.trim();
        let uuid = value
            .get(..9)
            .filter(|x| x.eq_ignore_ascii_case("urn:uuid:"))
            .map(|_| &value[9..])?;

        let hex = uuid.replace('-', "");

        if hex.len() != 32 || !hex.chars().all(|x| x.is_ascii_hexdigit()) {
            return None;
        }

        Some(Self::from_hex(&hex))
    }

    /// Name used as the protection header key, `None` for unknown systems.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Common => Some("common"),
            Self::PlayReady => Some("playready"),
            Self::WideVine => Some("widevine"),
            Self::Other(_) => None,
        }
    }

    /// Systems whose headers are collected from manifests.
    pub fn is_drm(&self) -> bool {
        matches!(self, Self::PlayReady | Self::WideVine)
    }
}

impl std::fmt::Display for SystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(x) => f.write_str(x),
            x => f.write_str(x.name().unwrap_or_default()),
        }
    }
}
