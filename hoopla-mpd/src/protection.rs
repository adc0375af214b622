/*
    REFERENCES
    ----------

    1. https://github.com/shaka-project/shaka-player/blob/b441518943241693fa2df03196be6ee707c8511e/lib/dash/content_protection.js
    2. https://dashif.org/identifiers/content_protection

*/

use crate::{Error, KeyId, Result, SystemId};
use quick_xml::{
    NsReader,
    events::{BytesStart, Event},
    name::{Namespace, ResolveResult},
};
use std::collections::BTreeMap;

const CENC_NAMESPACE: &[u8] = b"urn:mpeg:cenc:2013";
const MSPR_NAMESPACE: &[u8] = b"urn:microsoft:playready";
const VENDOR_SCHEMES: &[&str] = &["drmtoday", "castlabs"];

/// Protection parameters collected from a manifest.
///
/// Key ids are normalized and unique, in the order they were first seen. The first
/// key id ever seen is the default one, so [`ManifestInfo::default_kid`] is always
/// contained in [`ManifestInfo::key_ids`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManifestInfo {
    key_ids: Vec<KeyId>,
    default_kid: Option<KeyId>,
    headers: BTreeMap<String, String>,
    asset_id: Option<String>,
    variant_id: Option<String>,
}

impl ManifestInfo {
    pub fn key_ids(&self) -> &[KeyId] {
        &self.key_ids
    }

    pub fn default_kid(&self) -> Option<&str> {
        self.default_kid.as_ref().map(|x| x.as_str())
    }

    /// Base64 protection headers keyed by system name (`widevine`, `playready`).
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, system: &SystemId) -> Option<&str> {
        system
            .name()
            .and_then(|x| self.headers.get(x))
            .map(|x| x.as_str())
    }

    pub fn widevine_header(&self) -> Option<&str> {
        self.header(&SystemId::WideVine)
    }

    pub fn asset_id(&self) -> Option<&str> {
        self.asset_id.as_deref()
    }

    pub fn variant_id(&self) -> Option<&str> {
        self.variant_id.as_deref()
    }

    /// True when the manifest declared no key ids and no protection headers.
    pub fn is_unprotected(&self) -> bool {
        self.key_ids.is_empty() && self.headers.is_empty()
    }

    fn insert_kid(&mut self, kid: KeyId) {
        // Key ids are hex, anything else is not a key id at all.
        if !kid.is_hex() || self.key_ids.contains(&kid) {
            return;
        }

        if self.default_kid.is_none() {
            self.default_kid = Some(kid.clone());
        }

        self.key_ids.push(kid);
    }

    fn open<R>(&mut self, reader: &NsReader<R>, element: &BytesStart) -> Result<Protection> {
        let mut scheme_id_uri = None;
        let mut asset_id = None;
        let mut variant_id = None;

        for attribute in element.attributes() {
            let attribute = attribute?;
            let (namespace, local_name) = reader.resolve_attribute(attribute.key);

            match (namespace, local_name.as_ref()) {
                (ResolveResult::Unbound, b"schemeIdUri") => {
                    scheme_id_uri = Some(attribute.unescape_value()?.trim().to_owned());
                }
                (ResolveResult::Bound(Namespace(ns)), b"default_KID") if ns == CENC_NAMESPACE => {
                    self.insert_kid(KeyId::normalize(&attribute.unescape_value()?));
                }
                (ResolveResult::Bound(_), b"assetId") => {
                    asset_id = Some(attribute.unescape_value()?.trim().to_owned());
                }
                (ResolveResult::Bound(_), b"variantId") => {
                    variant_id = Some(attribute.unescape_value()?.trim().to_owned());
                }
                _ => (),
            }
        }

        let scheme_id_uri = scheme_id_uri.unwrap_or_default();
        let scheme = scheme_id_uri.to_ascii_lowercase();

        if VENDOR_SCHEMES.iter().any(|x| scheme.contains(x)) {
            if self.asset_id.is_none() {
                self.asset_id = asset_id.filter(|x| !x.is_empty());
            }

            if self.variant_id.is_none() {
                self.variant_id = variant_id.filter(|x| !x.is_empty());
            }
        }

        Ok(Protection {
            system: SystemId::from_scheme_id_uri(&scheme_id_uri).filter(|x| x.is_drm()),
            pssh: None,
            pro: None,
        })
    }

    fn close(&mut self, protection: Protection) {
        let Some(system) = protection.system else {
            return;
        };

        let header = match system {
            SystemId::PlayReady => protection.pssh.or(protection.pro),
            _ => protection.pssh,
        };

        if let (Some(name), Some(header)) = (system.name(), header)
            && !header.is_empty()
        {
            self.headers.entry(name.to_owned()).or_insert(header);
        }
    }
}

/// A `ContentProtection` element being read.
struct Protection {
    system: Option<SystemId>,
    pssh: Option<String>,
    pro: Option<String>,
}

impl Protection {
    fn store(&mut self, capture: Capture, text: &str) {
        let text = text.split_whitespace().collect::<String>();

        let slot = match capture {
            Capture::Pssh => &mut self.pssh,
            Capture::Pro => &mut self.pro,
        };

        if slot.is_none() && !text.is_empty() {
            *slot = Some(text);
        }
    }
}

#[derive(Clone, Copy)]
enum Capture {
    Pssh,
    Pro,
}

#[derive(Clone, Copy, PartialEq)]
enum Ns {
    Cenc,
    Mspr,
    Other,
}

impl From<&ResolveResult<'_>> for Ns {
    fn from(value: &ResolveResult<'_>) -> Self {
        match value {
            ResolveResult::Bound(Namespace(ns)) if *ns == CENC_NAMESPACE => Self::Cenc,
            ResolveResult::Bound(Namespace(ns)) if *ns == MSPR_NAMESPACE => Self::Mspr,
            _ => Self::Other,
        }
    }
}

/// Scan a manifest for `ContentProtection` elements, wherever they are nested.
///
/// A manifest without any protection is not an error, it yields an empty
/// [`ManifestInfo`]. Parsing is a pure function of the input text.
pub fn parse(xml: &str) -> Result<ManifestInfo> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut info = ManifestInfo::default();
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut current: Option<(usize, Protection)> = None;
    let mut capture = None;
    let mut text = String::new();

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let ns = Ns::from(&ns);

        match event {
            Event::Start(element) => {
                root_seen = true;
                depth += 1;

                if element.local_name().as_ref() == b"ContentProtection" {
                    if current.is_none() {
                        current = Some((depth, info.open(&reader, &element)?));
                    }
                } else if current.is_some() {
                    capture = match (ns, element.local_name().as_ref()) {
                        (Ns::Cenc, b"pssh") => Some(Capture::Pssh),
                        (Ns::Mspr, b"pro") => Some(Capture::Pro),
                        _ => None,
                    };
                    text.clear();
                }
            }
            Event::Empty(element) => {
                root_seen = true;

                if element.local_name().as_ref() == b"ContentProtection" && current.is_none() {
                    let protection = info.open(&reader, &element)?;
                    info.close(protection);
                }
            }
            Event::Text(data) => {
                if capture.is_some() {
                    text.push_str(&data.unescape()?);
                } else if depth == 0 {
                    return Err(Error::new_xml_err("text outside of the root element"));
                }
            }
            Event::CData(data) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(element) => {
                if let (Some(kind), Some((_, protection))) = (capture.take(), current.as_mut()) {
                    protection.store(kind, &text);
                }

                if element.local_name().as_ref() == b"ContentProtection"
                    && current.as_ref().is_some_and(|(x, _)| *x == depth)
                    && let Some((_, protection)) = current.take()
                {
                    info.close(protection);
                }

                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => (),
        }
    }

    if depth != 0 {
        return Err(Error::new_xml_err("unexpected end of document"));
    }

    if !root_seen {
        return Err(Error::new_xml_err("no root element"));
    }

    Ok(info)
}
