//! ASCII armor for encrypted fields.
//!
//! ```text
//! -----BEGIN CREDVAULT MESSAGE-----
//! Recipient: 3F2A...
//!
//! AQx0bW9...
//! -----END CREDVAULT MESSAGE-----
//! ```
//!
//! The block is self-delimiting, so it can sit inside the credential
//! record as one multi-line string. Body lines are wrapped at 64 columns.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::errors::{CredVaultError, Result};

pub const BEGIN_LINE: &str = "-----BEGIN CREDVAULT MESSAGE-----";
pub const END_LINE: &str = "-----END CREDVAULT MESSAGE-----";

const RECIPIENT_HEADER: &str = "Recipient";
const LINE_WIDTH: usize = 64;

/// A parsed armor block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Armored {
    /// Fingerprint of the key the payload was encrypted to.
    pub recipient: String,
    /// Raw binary payload.
    pub payload: Vec<u8>,
}

/// Wrap `payload` in an armor block addressed to `recipient`.
pub fn armor(recipient: &str, payload: &[u8]) -> String {
    let encoded = BASE64.encode(payload);

    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 128);
    out.push_str(BEGIN_LINE);
    out.push('\n');
    out.push_str(RECIPIENT_HEADER);
    out.push_str(": ");
    out.push_str(recipient);
    out.push_str("\n\n");
    // base64 output is pure ASCII, so byte chunks are valid UTF-8.
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(END_LINE);
    out.push('\n');
    out
}

/// Parse an armor block produced by [`armor`].
///
/// Surrounding whitespace is tolerated; anything else outside the
/// BEGIN/END lines is not.
pub fn dearmor(text: &str) -> Result<Armored> {
    let mut lines = text.trim().lines().map(str::trim_end);

    if lines.next() != Some(BEGIN_LINE) {
        return Err(malformed("missing BEGIN line"));
    }

    let mut recipient = None;
    loop {
        match lines.next() {
            None => return Err(malformed("unterminated header block")),
            Some("") => break,
            Some(line) => {
                let (key, value) = line
                    .split_once(':')
                    .ok_or_else(|| malformed("invalid header line"))?;
                if key == RECIPIENT_HEADER {
                    if recipient.is_some() {
                        return Err(malformed("duplicate Recipient header"));
                    }
                    recipient = Some(value.trim().to_string());
                }
            }
        }
    }
    let recipient = recipient.ok_or_else(|| malformed("missing Recipient header"))?;

    let mut body = String::new();
    let mut terminated = false;
    for line in lines.by_ref() {
        if line == END_LINE {
            terminated = true;
            break;
        }
        body.push_str(line.trim_start());
    }
    if !terminated {
        return Err(malformed("missing END line"));
    }
    if lines.next().is_some() {
        return Err(malformed("trailing data after END line"));
    }

    let payload = BASE64
        .decode(body.as_bytes())
        .map_err(|e| malformed(&format!("invalid base64 body: {e}")))?;

    Ok(Armored { recipient, payload })
}

fn malformed(reason: &str) -> CredVaultError {
    CredVaultError::DecryptionFailed(format!("malformed armor: {reason}"))
}
