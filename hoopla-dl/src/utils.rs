use base64::Engine;
use reqwest::Url;
use std::{env, path::Path};

pub(crate) fn decode_base64<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(input)
}

pub(crate) fn encode_base64<T: AsRef<[u8]>>(input: T) -> String {
    base64::engine::general_purpose::STANDARD.encode(input)
}

/// Replace `{name}` placeholders of an endpoint template and parse the result.
///
/// Values are inserted as single path segments, so `/` and `?` are percent encoded.
pub(crate) fn fill_template(template: &str, vars: &[(&str, &str)]) -> Result<Url, String> {
    let mut url = template.to_owned();

    for (name, value) in vars {
        url = url.replace(&format!("{{{}}}", name), &percent_encode(value));
    }

    url.parse::<Url>()
        .map_err(|x| format!("invalid endpoint '{}' ({})", url, x))
}

/// Encode every byte outside of `[A-Za-z0-9._~-]` as `%XX`.
///
/// `%` itself is always encoded, so distinct inputs never share an output.
pub(crate) fn percent_encode(value: &str) -> String {
    value
        .bytes()
        .map(|x| match x {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (x as char).to_string()
            }
            x => format!("%{:02X}", x),
        })
        .collect()
}

/// Cut text used in diagnostics to a sane length.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    let mut text = text.trim().chars().take(max_chars + 1).collect::<String>();

    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect();
        text.push_str("...");
    }

    text
}

/// Locate an executable either as given or on `PATH`.
pub fn find_program(name: &str) -> Option<String> {
    let path = Path::new(name);

    if path.components().count() > 1 {
        return path.exists().then(|| name.to_owned());
    }

    let bin = if cfg!(target_os = "windows") && path.extension().is_none() {
        format!("{}.exe", name)
    } else {
        name.to_owned()
    };

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let x = dir.join(&bin);

            if x.is_file() {
                Some(x.to_string_lossy().into_owned())
            } else {
                None
            }
        })
    })
}
