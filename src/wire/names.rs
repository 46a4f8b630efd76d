// DNS name wire encoding/decoding (spec 4.1, "Name encoding"/"Name decoding").
//
// Grounded on dylnuge-montague's dns::protocol::names module, extended with
// the guards spec 4.1 calls for: a hop budget against compression-pointer
// loops, rejection of a pointer that targets itself or its own length byte,
// and rejection of label-type bits other than 00/11.

use super::DnsFormatError;

pub const MAX_LABEL_LEN: usize = 63;
// Guards against pathological pointer chains; no legitimate mDNS packet
// nests anywhere close to this deep.
pub const MAX_COMPRESSION_POINTERS: usize = 32;

pub fn deserialize_name(bytes: &[u8], start: usize) -> Result<(Vec<String>, usize), DnsFormatError> {
    let mut labels = Vec::new();
    let mut pos = start;
    let packet_len = bytes.len();
    let mut hops = 0usize;
    // `next_pos` is the position immediately after the *first* pointer we
    // follow; a decode that jumps must still report where the outer name
    // ended in the original buffer, not where the jump landed.
    let mut next_pos: Option<usize> = None;

    loop {
        if pos >= packet_len {
            return Err(DnsFormatError::make_error(
                "reached end of packet while parsing label or label pointer jumped beyond packet",
            ));
        }
        let len_byte = bytes[pos];
        match (len_byte >> 6) & 0b11 {
            0b11 => {
                if pos + 1 >= packet_len {
                    return Err(DnsFormatError::make_error(
                        "unexpected end of packet at label pointer start",
                    ));
                }
                let pointer_start =
                    (((len_byte & 0b0011_1111) as usize) << 8) + (bytes[pos + 1] as usize);
                if pointer_start >= packet_len {
                    return Err(DnsFormatError::make_error(
                        "label pointer targets beyond end of packet",
                    ));
                }
                if pointer_start == pos || pointer_start == pos + 1 {
                    return Err(DnsFormatError::make_error(
                        "label pointer targets itself or its own length byte",
                    ));
                }
                hops += 1;
                if hops > MAX_COMPRESSION_POINTERS {
                    return Err(DnsFormatError::make_error(
                        "too many compression pointer hops while decoding name",
                    ));
                }

                if next_pos.is_none() {
                    next_pos = Some(pos + 2);
                }
                pos = pointer_start;
            }
            0b00 => {
                let length = len_byte as usize;
                pos += 1;
                if length == 0 {
                    if next_pos.is_none() {
                        next_pos = Some(pos);
                    }
                    break;
                }
                if length > MAX_LABEL_LEN {
                    return Err(DnsFormatError::make_error(format!(
                        "label length {} exceeds {} octet maximum",
                        length, MAX_LABEL_LEN
                    )));
                }
                if pos + length > packet_len {
                    return Err(DnsFormatError::make_error(
                        "label length is longer than remainder of packet",
                    ));
                }
                let label = String::from_utf8(bytes[pos..pos + length].to_vec())
                    .map_err(|_| DnsFormatError::make_error("label was not valid UTF-8"))?;
                labels.push(label);
                pos += length;
                if next_pos.is_none() {
                    next_pos = Some(pos);
                }
            }
            _ => {
                return Err(DnsFormatError::make_error(
                    "unsupported or invalid label length/pointer type bits",
                ));
            }
        }
    }

    Ok((labels, next_pos.unwrap_or(pos)))
}

// Does not compress; mDNS responses built by this crate never emit
// compression pointers on output (spec 4.1).
pub fn serialize_name(name: &[String]) -> Result<Vec<u8>, DnsFormatError> {
    let mut bytes = Vec::new();
    for label in name {
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsFormatError::make_error(format!(
                "label `{}` exceeds {} octet maximum",
                label, MAX_LABEL_LEN
            )));
        }
        bytes.push(label.len() as u8);
        bytes.extend_from_slice(label.as_bytes());
    }
    bytes.push(0x00);
    Ok(bytes)
}

// Splits "foo.bar.local" into labels, case preserved. An empty string (the
// root) yields zero labels.
pub fn labels_from_str(name: &str) -> Vec<String> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('.').map(|s| s.to_owned()).collect()
    }
}

pub fn str_from_labels(labels: &[String]) -> String {
    labels.join(".")
}

fn ascii_fold(byte: u8) -> u8 {
    if byte.is_ascii_uppercase() {
        byte | 0x20
    } else {
        byte
    }
}

// Spec 9: "all name comparisons use ASCII case-fold."
pub fn labels_eq_ci(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| {
        x.len() == y.len()
            && x.bytes()
                .zip(y.bytes())
                .all(|(bx, by)| ascii_fold(bx) == ascii_fold(by))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_read_works() {
        let mut packet = [0x00u8; 93];
        packet[20] = 1;
        packet[21] = b'f';
        packet[22] = 3;
        packet[23] = b'i';
        packet[24] = b's';
        packet[25] = b'i';
        packet[26] = 4;
        packet[27] = b'a';
        packet[28] = b'r';
        packet[29] = b'p';
        packet[30] = b'a';
        packet[31] = 0;

        packet[40] = 3;
        packet[41] = b'f';
        packet[42] = b'o';
        packet[43] = b'o';
        packet[44] = 0b1100_0000;
        packet[45] = 20;

        packet[64] = 0b1100_0000;
        packet[65] = 26;

        packet[92] = 0;

        let (labels, pos) = deserialize_name(&packet, 20).expect("deserialize failed");
        assert_eq!(labels, vec!["f", "isi", "arpa"]);
        assert_eq!(pos, 32);

        let (labels, pos) = deserialize_name(&packet, 40).expect("deserialize failed");
        assert_eq!(labels, vec!["foo", "f", "isi", "arpa"]);
        assert_eq!(pos, 46);

        let (labels, pos) = deserialize_name(&packet, 64).expect("deserialize failed");
        assert_eq!(labels, vec!["arpa"]);
        assert_eq!(pos, 66);

        let (labels, pos) = deserialize_name(&packet, 92).expect("deserialize failed");
        assert_eq!(labels, Vec::<String>::new());
        assert_eq!(pos, 93);
    }

    #[test]
    fn pointer_to_self_is_rejected() {
        let mut packet = [0x00u8; 4];
        packet[0] = 0b1100_0000;
        packet[1] = 0;
        assert!(deserialize_name(&packet, 0).is_err());
    }

    #[test]
    fn pointer_loop_is_rejected() {
        // Two pointers that bounce between each other forever.
        let mut packet = [0x00u8; 4];
        packet[0] = 0b1100_0000;
        packet[1] = 2;
        packet[2] = 0b1100_0000;
        packet[3] = 0;
        assert!(deserialize_name(&packet, 0).is_err());
    }

    #[test]
    fn label_over_63_octets_rejected_on_encode() {
        let label = "a".repeat(64);
        assert!(serialize_name(&[label]).is_err());
    }

    #[test]
    fn encode_decode_round_trip_preserves_case() {
        for name in ["A.local", "Foo._http._tcp.local", &"a".repeat(63)] {
            let labels = labels_from_str(name);
            let encoded = serialize_name(&labels).expect("encode should succeed");
            let mut packet = vec![0u8; 12];
            packet.extend_from_slice(&encoded);
            let (decoded, _) = deserialize_name(&packet, 12).expect("decode should succeed");
            assert_eq!(str_from_labels(&decoded), name.trim_end_matches('.'));
        }
    }

    #[test]
    fn case_insensitive_compare() {
        let a = labels_from_str("Printer.local");
        let b = labels_from_str("printer.LOCAL");
        assert!(labels_eq_ci(&a, &b));
    }
}
