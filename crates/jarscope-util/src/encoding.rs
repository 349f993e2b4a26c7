use crate::errors::JarscopeError;

/// Decode text bytes of unknown provenance, trying utf-8-sig, utf-8, gbk,
/// gb2312, latin-1 in order. The first encoding that decodes without errors
/// wins.
///
/// Directory listings and decompiled sources from fleet hosts arrive in
/// whatever locale the host was provisioned with; this chain covers the
/// encodings seen in practice.
pub fn decode_text(bytes: &[u8]) -> miette::Result<String> {
    // utf-8-sig: a BOM followed by valid UTF-8.
    if let Some(stripped) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        if let Ok(text) = std::str::from_utf8(stripped) {
            return Ok(text.to_string());
        }
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }
    for label in ["gbk", "gb2312", "latin1"] {
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (text, _, had_errors) = encoding.decode(bytes);
            if !had_errors {
                return Ok(text.into_owned());
            }
        }
    }
    Err(JarscopeError::Encoding {
        message: format!("not decodable by any fallback encoding ({} bytes)", bytes.len()),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_text(b"plain ascii").unwrap(), "plain ascii");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFwith bom").unwrap(), "with bom");
    }

    #[test]
    fn gbk_bytes_fall_through_utf8() {
        // "中文" encoded as GBK is not valid UTF-8.
        let gbk_bytes: &[u8] = &[0xD6, 0xD0, 0xCE, 0xC4];
        assert_eq!(decode_text(gbk_bytes).unwrap(), "中文");
    }

    #[test]
    fn latin1_is_the_last_resort() {
        let bytes: &[u8] = &[b'f', 0xFF, b'o'];
        assert!(decode_text(bytes).is_ok());
    }
}
