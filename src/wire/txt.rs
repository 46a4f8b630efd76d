// TXT record key=value codec (spec 4.1, "TXT encoding"; RFC 6763 section 6).

use super::DnsFormatError;

pub const MAX_TXT_SEGMENT_LEN: usize = 255;

// Encodes a ';'-separated "key=value" sequence into TXT wire form: one
// length-prefixed label per segment. An empty string is a single zero byte
// (RFC 6763 6.1).
pub fn encode(kv: &str) -> Result<Vec<u8>, DnsFormatError> {
    if kv.is_empty() {
        return Ok(vec![0x00]);
    }
    let mut bytes = Vec::new();
    for segment in kv.split(';') {
        if segment.len() > MAX_TXT_SEGMENT_LEN {
            return Err(DnsFormatError::make_error(format!(
                "TXT segment `{}` exceeds {} octet maximum",
                segment, MAX_TXT_SEGMENT_LEN
            )));
        }
        bytes.push(segment.len() as u8);
        bytes.extend_from_slice(segment.as_bytes());
    }
    Ok(bytes)
}

// Decodes TXT wire bytes back into a ';'-separated "key=value" string.
pub fn decode(bytes: &[u8]) -> Result<String, DnsFormatError> {
    if bytes == [0x00] || bytes.is_empty() {
        return Ok(String::new());
    }
    let mut segments = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = bytes[pos] as usize;
        pos += 1;
        if pos + len > bytes.len() {
            return Err(DnsFormatError::make_error("TXT segment length overruns rdata"));
        }
        let segment = std::str::from_utf8(&bytes[pos..pos + len])
            .map_err(|_| DnsFormatError::make_error("TXT segment was not valid UTF-8"))?;
        segments.push(segment.to_owned());
        pos += len;
    }
    Ok(segments.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_two_segments() {
        let kv = "key1=val1;key2=";
        let encoded = encode(kv).expect("encode should succeed");
        // Two length-prefixed labels.
        assert_eq!(encoded[0] as usize, "key1=val1".len());
        let decoded = decode(&encoded).expect("decode should succeed");
        assert_eq!(decoded, kv);
    }

    #[test]
    fn empty_txt_is_single_zero_byte() {
        let encoded = encode("").expect("encode should succeed");
        assert_eq!(encoded, vec![0x00]);
        assert_eq!(decode(&encoded).unwrap(), "");
    }
}
