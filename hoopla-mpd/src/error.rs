/// The Errors that may occur when parsing a manifest or a `PSSH` box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: Kind,
    reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Decode,
    Other,
    Read,
    Xml,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix_reason = match self.kind {
            Kind::Decode => "Cannot decode ",
            Kind::Other => "",
            Kind::Read => "Cannot read ",
            Kind::Xml => "Cannot parse manifest: ",
        };

        write!(f, "{}{}", prefix_reason, self.reason)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a new uncategorized error.
    pub fn new<T: Into<String>>(reason: T) -> Self {
        Self {
            kind: Kind::Other,
            reason: reason.into(),
        }
    }

    /// Create a new read error.
    pub fn new_read_err<T: Into<String>>(reason: T) -> Self {
        Self {
            kind: Kind::Read,
            reason: reason.into(),
        }
    }

    /// Create a new decode error.
    pub fn new_decode_err<T: Into<String>>(reason: T) -> Self {
        Self {
            kind: Kind::Decode,
            reason: reason.into(),
        }
    }

    /// Create a new malformed xml error.
    pub fn new_xml_err<T: Into<String>>(reason: T) -> Self {
        Self {
            kind: Kind::Xml,
            reason: reason.into(),
        }
    }

    /// Returns true if the error is a read error.
    pub fn is_read_err(&self) -> bool {
        self.kind == Kind::Read
    }

    /// Returns true if the error is a decode error.
    pub fn is_decode_err(&self) -> bool {
        self.kind == Kind::Decode
    }

    /// Returns true if the manifest document itself could not be parsed.
    pub fn is_xml_err(&self) -> bool {
        self.kind == Kind::Xml
    }

    /// The bare reason, without the category prefix.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Self::new_xml_err(value.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Self::new_xml_err(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::new_read_err(value.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Self::new_decode_err(format!("base64 data ({})", value))
    }
}
