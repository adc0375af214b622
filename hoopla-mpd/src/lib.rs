#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate extracts the content protection parameters of a DASH (`.mpd`) manifest.
//! It collects key ids, the per-system `PSSH` headers and vendor asset identifiers
//! without resolving any segment addressing.
//!
//! # Optional Features
//!
//! The following are a list of [Cargo features](https://doc.rust-lang.org/stable/cargo/reference/features.html#the-features-section) that can be
//! enabled or disabled:
//!
//! - **serde**: Derives `Serialize` and `Deserialize` for [`ManifestInfo`].
//!
//! # Example
//!
//! ```
//! let xml = r#"<MPD xmlns:cenc="urn:mpeg:cenc:2013">
//!   <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc"
//!     cenc:default_KID="AA-BB-CC-DD"/>
//! </MPD>"#;
//!
//! let info = hoopla_mpd::parse(xml).unwrap();
//! assert_eq!(info.default_kid(), Some("aabbccdd"));
//! ```

macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::new(format!($($arg)*)))
    };
}

pub(crate) use bail;

mod error;
mod kid;
mod protection;
mod pssh;
mod reader;
mod system;

pub use error::Error;
pub use kid::KeyId;
pub use protection::{ManifestInfo, parse};
pub use pssh::PsshBox;
pub use system::SystemId;

/// A `Result` alias where the `Err` case is `hoopla_mpd::Error`.
pub type Result<T> = std::result::Result<T, Error>;
