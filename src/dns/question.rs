use super::{
    enums::{DNSResourceClass, DNSResourceType},
    header::DNSHeader,
    name::Name,
    wire::{self, WireReader, WireWriter},
};
use crate::error::DnsError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    pub qname: Name,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn new(qname: Name, qtype: DNSResourceType) -> Self {
        Self {
            qname,
            qtype,
            qclass: DNSResourceClass::IN,
        }
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, DnsError> {
        let qname = Name::read(reader)?;
        let qtype = reader.read_u16()?.into();
        let qclass = reader.read_u16()?.into();
        Ok(Self {
            qname,
            qtype,
            qclass,
        })
    }

    pub fn write(&self, writer: &mut WireWriter<'_>) -> wire::Result<()> {
        writer.write_bytes(self.qname.wire())?;
        writer.write_u16(self.qtype.into())?;
        writer.write_u16(self.qclass.into())
    }

    pub fn wire_len(&self) -> usize {
        self.qname.len() + 4
    }
}

/// A parsed incoming query: header plus its single question
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DNSRequest {
    pub header: DNSHeader,
    pub question: DNSQuestion,
}

impl DNSRequest {
    /// Parse a query message. Everything past the question is ignored.
    pub fn parse(buf: &[u8]) -> Result<Self, DnsError> {
        let header = DNSHeader::parse(buf)?;
        if header.qdcount != 1 {
            return Err(DnsError::MalformedRecord(format!(
                "expected one question, got {}",
                header.qdcount
            )));
        }
        let mut reader = WireReader::new(buf);
        reader.seek(DNSHeader::SIZE)?;
        let question = DNSQuestion::read(&mut reader)?;
        Ok(Self { header, question })
    }

    pub fn new(id: u16, question: DNSQuestion) -> Self {
        Self {
            header: DNSHeader {
                id,
                qdcount: 1,
                ..Default::default()
            },
            question,
        }
    }

    /// Serialize as a query message
    pub fn to_bytes(&self) -> Result<Vec<u8>, DnsError> {
        let mut buf = vec![0u8; DNSHeader::SIZE + self.question.wire_len()];
        buf[..DNSHeader::SIZE].copy_from_slice(&self.header.to_bytes()?);
        let mut writer = WireWriter::at(&mut buf, DNSHeader::SIZE)?;
        self.question.write(&mut writer)?;
        Ok(buf)
    }
}
