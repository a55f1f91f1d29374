use std::net::{Ipv4Addr, Ipv6Addr};

use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::name::Name;

/// A single resource record read from a zone file, rdata in wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Fully qualified owner name
    pub owner: Name,
    /// Time to live in seconds
    pub ttl: u32,
    /// Record class (usually IN)
    pub class: DNSResourceClass,
    /// Record type (A, AAAA, MX, etc.)
    pub rtype: DNSResourceType,
    /// Record data in wire format
    pub rdata: Vec<u8>,
}

impl ZoneRecord {
    pub fn new(
        owner: Name,
        ttl: u32,
        class: DNSResourceClass,
        rtype: DNSResourceType,
        rdata: Vec<u8>,
    ) -> Self {
        Self {
            owner,
            ttl,
            class,
            rtype,
            rdata,
        }
    }

    /// Encode presentation-format rdata fields. Relative names in the rdata
    /// are completed with `origin`.
    pub fn encode_rdata(
        rtype: DNSResourceType,
        fields: &[String],
        origin: Option<&Name>,
    ) -> Result<Vec<u8>, String> {
        let encoder = RdataEncoder { fields, origin };
        if fields.first().map(String::as_str) == Some("\\#") {
            return encoder.parse_generic();
        }
        match rtype {
            DNSResourceType::A => encoder.parse_a_record(),
            DNSResourceType::AAAA => encoder.parse_aaaa_record(),
            DNSResourceType::NS | DNSResourceType::CNAME | DNSResourceType::PTR => {
                encoder.parse_name_record()
            }
            DNSResourceType::SOA => encoder.parse_soa_record(),
            DNSResourceType::MX => encoder.parse_mx_record(),
            DNSResourceType::TXT => encoder.parse_txt_record(),
            DNSResourceType::SRV => encoder.parse_srv_record(),
            DNSResourceType::CAA => encoder.parse_caa_record(),
            _ => Err(format!(
                "Unsupported record type for zone files: {} (use \\# generic form)",
                rtype
            )),
        }
    }
}

/// Resolve a presentation-format name against the origin
pub fn resolve_name(text: &str, origin: Option<&Name>) -> Result<Name, String> {
    if text == "@" {
        return origin
            .cloned()
            .ok_or_else(|| "'@' used before an origin is known".to_string());
    }
    if text.ends_with('.') {
        return text.parse().map_err(|e| format!("{e}"));
    }
    let origin = origin.ok_or_else(|| format!("relative name '{text}' without an origin"))?;
    let full = if origin.is_root() {
        format!("{text}.")
    } else {
        format!("{text}.{origin}")
    };
    full.parse().map_err(|e| format!("{e}"))
}

struct RdataEncoder<'a> {
    fields: &'a [String],
    origin: Option<&'a Name>,
}

impl RdataEncoder<'_> {
    fn expect_fields(&self, rtype: &str, count: usize) -> Result<(), String> {
        if self.fields.len() != count {
            return Err(format!(
                "{} record requires {} fields, got {}",
                rtype,
                count,
                self.fields.len()
            ));
        }
        Ok(())
    }

    fn number<T: std::str::FromStr>(&self, index: usize, what: &str) -> Result<T, String> {
        self.fields[index]
            .parse()
            .map_err(|_| format!("Invalid {}: {}", what, self.fields[index]))
    }

    fn name(&self, index: usize) -> Result<Name, String> {
        resolve_name(&self.fields[index], self.origin)
    }

    /// Parse A record (IPv4 address)
    fn parse_a_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("A", 1)?;
        let addr: Ipv4Addr = self.number(0, "IPv4 address")?;
        Ok(addr.octets().to_vec())
    }

    /// Parse AAAA record (IPv6 address)
    fn parse_aaaa_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("AAAA", 1)?;
        let addr: Ipv6Addr = self.number(0, "IPv6 address")?;
        Ok(addr.octets().to_vec())
    }

    /// NS, CNAME and PTR all carry a single domain name
    fn parse_name_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("Name", 1)?;
        Ok(self.name(0)?.wire().to_vec())
    }

    /// SOA format: mname rname serial refresh retry expire minimum
    fn parse_soa_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("SOA", 7)?;
        let mut rdata = Vec::new();
        rdata.extend_from_slice(self.name(0)?.wire());
        rdata.extend_from_slice(self.name(1)?.wire());
        for index in 2..7 {
            let value = parse_ttl(&self.fields[index])
                .map_err(|_| format!("Invalid SOA numeric value: {}", self.fields[index]))?;
            rdata.extend_from_slice(&value.to_be_bytes());
        }
        Ok(rdata)
    }

    /// MX format: preference exchange
    fn parse_mx_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("MX", 2)?;
        let preference: u16 = self.number(0, "MX preference")?;
        let mut rdata = preference.to_be_bytes().to_vec();
        rdata.extend_from_slice(self.name(1)?.wire());
        Ok(rdata)
    }

    /// TXT: one or more character-strings, each at most 255 bytes
    fn parse_txt_record(&self) -> Result<Vec<u8>, String> {
        if self.fields.is_empty() {
            return Err("TXT record requires at least one string".to_string());
        }
        let mut rdata = Vec::new();
        for field in self.fields {
            let text = unescape(unquote(field))?;
            if text.len() > 255 {
                return Err(format!("TXT string longer than 255 bytes: {}", text.len()));
            }
            rdata.push(text.len() as u8);
            rdata.extend_from_slice(&text);
        }
        Ok(rdata)
    }

    /// SRV format: priority weight port target
    fn parse_srv_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("SRV", 4)?;
        let mut rdata = Vec::new();
        for (index, what) in [(0, "SRV priority"), (1, "SRV weight"), (2, "SRV port")] {
            let value: u16 = self.number(index, what)?;
            rdata.extend_from_slice(&value.to_be_bytes());
        }
        rdata.extend_from_slice(self.name(3)?.wire());
        Ok(rdata)
    }

    /// CAA format: flags tag value
    fn parse_caa_record(&self) -> Result<Vec<u8>, String> {
        self.expect_fields("CAA", 3)?;
        let flags: u8 = self.number(0, "CAA flags")?;
        let tag = self.fields[1].as_bytes();
        if tag.is_empty() || tag.len() > 255 {
            return Err(format!("Invalid CAA tag: {}", self.fields[1]));
        }
        let mut rdata = vec![flags, tag.len() as u8];
        rdata.extend_from_slice(tag);
        rdata.extend_from_slice(&unescape(unquote(&self.fields[2]))?);
        Ok(rdata)
    }

    /// RFC 3597 generic form: \# length hex...
    fn parse_generic(&self) -> Result<Vec<u8>, String> {
        if self.fields.len() < 2 {
            return Err("generic rdata requires a length".to_string());
        }
        let length: usize = self.number(1, "generic rdata length")?;
        let hex: String = self.fields[2..].concat();
        if !hex.is_ascii() || hex.len() % 2 != 0 {
            return Err(format!("Invalid hex in generic rdata: {hex}"));
        }
        let rdata = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| format!("Invalid hex in generic rdata: {hex}"))?;
        if rdata.len() != length {
            return Err(format!(
                "generic rdata length {} does not match {} bytes of data",
                length,
                rdata.len()
            ));
        }
        Ok(rdata)
    }
}

/// TTL in seconds, optionally written with s/m/h/d/w units ("1h30m")
pub fn parse_ttl(text: &str) -> Result<u32, String> {
    if let Ok(seconds) = text.parse::<u32>() {
        return Ok(seconds);
    }
    let mut total: u64 = 0;
    let mut current: u64 = 0;
    let mut seen_digit = false;
    for c in text.chars() {
        if let Some(digit) = c.to_digit(10) {
            current = current * 10 + digit as u64;
            seen_digit = true;
            if current > u32::MAX as u64 {
                return Err(format!("TTL out of range: {text}"));
            }
            continue;
        }
        let unit = match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            'w' => 604800,
            _ => return Err(format!("Invalid TTL: {text}")),
        };
        if !seen_digit {
            return Err(format!("Invalid TTL: {text}"));
        }
        total += current * unit;
        current = 0;
        seen_digit = false;
    }
    if seen_digit || text.is_empty() {
        return Err(format!("Invalid TTL: {text}"));
    }
    u32::try_from(total).map_err(|_| format!("TTL out of range: {text}"))
}

fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(field)
}

/// Resolve `\X` and `\DDD` escapes
fn unescape(text: &str) -> Result<Vec<u8>, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let rest = &bytes[i + 1..];
        if rest.len() >= 3 && rest[..3].iter().all(u8::is_ascii_digit) {
            let value = (rest[0] - b'0') as u16 * 100 + (rest[1] - b'0') as u16 * 10
                + (rest[2] - b'0') as u16;
            let value = u8::try_from(value).map_err(|_| format!("Invalid escape in {text}"))?;
            out.push(value);
            i += 4;
        } else if let Some(&c) = rest.first() {
            out.push(c);
            i += 2;
        } else {
            return Err(format!("Dangling escape in {text}"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn origin() -> Name {
        "example.com.".parse().unwrap()
    }

    #[test]
    fn test_resolve_name() {
        let o = origin();
        assert_eq!(resolve_name("@", Some(&o)).unwrap(), o);
        assert_eq!(
            resolve_name("www", Some(&o)).unwrap().to_string(),
            "www.example.com."
        );
        assert_eq!(resolve_name("other.", Some(&o)).unwrap().to_string(), "other.");
        assert!(resolve_name("www", None).is_err());
    }

    #[test]
    fn test_encode_address_records() {
        let a = ZoneRecord::encode_rdata(DNSResourceType::A, &fields(&["192.0.2.1"]), None);
        assert_eq!(a.unwrap(), vec![192, 0, 2, 1]);
        assert!(ZoneRecord::encode_rdata(DNSResourceType::A, &fields(&["300.0.0.1"]), None).is_err());
        let aaaa = ZoneRecord::encode_rdata(DNSResourceType::AAAA, &fields(&["2001:db8::1"]), None)
            .unwrap();
        assert_eq!(aaaa.len(), 16);
    }

    #[test]
    fn test_encode_soa_relative_names() {
        let o = origin();
        let rdata = ZoneRecord::encode_rdata(
            DNSResourceType::SOA,
            &fields(&["ns1", "admin", "2024010101", "3600", "900", "1w", "1d"]),
            Some(&o),
        )
        .unwrap();
        let mname = "ns1.example.com.".parse::<Name>().unwrap();
        assert_eq!(&rdata[..mname.len()], mname.wire());
        assert_eq!(&rdata[rdata.len() - 20..rdata.len() - 16], &2024010101u32.to_be_bytes());
        assert_eq!(&rdata[rdata.len() - 4..], &86400u32.to_be_bytes());
    }

    #[test]
    fn test_encode_txt_and_mx() {
        let txt = ZoneRecord::encode_rdata(
            DNSResourceType::TXT,
            &fields(&["\"hello world\"", "\"a\\\"b\"", "x\\059"]),
            None,
        )
        .unwrap();
        assert_eq!(txt, b"\x0bhello world\x03a\"b\x02x;".to_vec());

        let o = origin();
        let mx = ZoneRecord::encode_rdata(DNSResourceType::MX, &fields(&["10", "mail"]), Some(&o))
            .unwrap();
        assert_eq!(&mx[..2], &[0, 10]);
        assert_eq!(mx.len(), 2 + "mail.example.com.".parse::<Name>().unwrap().len());
    }

    #[test]
    fn test_encode_generic() {
        let rdata = ZoneRecord::encode_rdata(
            DNSResourceType::Unknown(65280),
            &fields(&["\\#", "3", "abcd", "ef"]),
            None,
        )
        .unwrap();
        assert_eq!(rdata, vec![0xab, 0xcd, 0xef]);
        assert!(ZoneRecord::encode_rdata(
            DNSResourceType::Unknown(65280),
            &fields(&["\\#", "2", "abcdef"]),
            None
        )
        .is_err());
        assert!(ZoneRecord::encode_rdata(DNSResourceType::NSEC, &fields(&["x"]), None).is_err());
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("3600").unwrap(), 3600);
        assert_eq!(parse_ttl("1h30m").unwrap(), 5400);
        assert_eq!(parse_ttl("2D").unwrap(), 172800);
        assert!(parse_ttl("").is_err());
        assert!(parse_ttl("h").is_err());
        assert!(parse_ttl("5x").is_err());
        assert!(parse_ttl("1h5").is_err());
    }
}
