//! SOPS envelope formats and their textual markers.

use std::fmt;
use std::path::Path;

/// Serialization format of a SOPS document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Binary,
    Dotenv,
    Ini,
    Json,
    Yaml,
}

/// Probe order for marker detection. YAML before JSON matters: a JSON
/// envelope never contains the YAML marker, but both JSON and binary
/// envelopes share one.
const PROBE_ORDER: [Format; 5] = [
    Format::Yaml,
    Format::Json,
    Format::Ini,
    Format::Dotenv,
    Format::Binary,
];

impl Format {
    /// The stable substring whose presence identifies a SOPS envelope of
    /// this format without parsing it.
    pub fn marker(&self) -> &'static [u8] {
        match self {
            Format::Yaml => b"mac: ENC[",
            Format::Json | Format::Binary => b"\"mac\": \"ENC[",
            Format::Ini => b"[sops]",
            Format::Dotenv => b"sops_mac=ENC[",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Binary => "binary",
            Format::Dotenv => "dotenv",
            Format::Ini => "INI",
            Format::Json => "JSON",
            Format::Yaml => "YAML",
        };
        f.write_str(name)
    }
}

/// Map a file name to its SOPS format by extension; everything unrecognized
/// is treated as binary.
pub fn format_for_path(path: &Path) -> Format {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Format::Yaml,
        Some("json") => Format::Json,
        Some("ini") => Format::Ini,
        Some("env") => Format::Dotenv,
        _ => Format::Binary,
    }
}

/// Detect the envelope format of `data` by marker, in the fixed probe order.
/// `None` means the bytes do not look like a SOPS envelope at all.
pub fn probe_format(data: &[u8]) -> Option<Format> {
    PROBE_ORDER
        .iter()
        .copied()
        .find(|format| has_marker(data, *format))
}

/// Whether `data` contains the envelope marker of `format`.
pub fn has_marker(data: &[u8], format: Format) -> bool {
    let marker = format.marker();
    data.windows(marker.len()).any(|window| window == marker)
}
