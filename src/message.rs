//! Response assembly into a fixed-capacity buffer.

use std::io;
use std::net::SocketAddr;

use tracing::trace;

use crate::dns::enums::ResponseCode;
use crate::dns::header::DNSHeader;
use crate::dns::question::{DNSQuestion, DNSRequest};
use crate::dns::wire::WireWriter;
use crate::error::DnsError;
use crate::rrset::RRset;

/// Message sections records can be added to, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Answer,
    Authority,
    Additional,
}

/// Delivers finished response messages to the peer that asked
pub trait Transport {
    fn send(&mut self, request: &DNSRequest, message: &[u8], peer: SocketAddr) -> io::Result<()>;
}

/// Collects messages in memory for a caller that sends them later
#[derive(Debug, Default)]
pub struct Outbox {
    pub messages: Vec<(SocketAddr, Vec<u8>)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, (SocketAddr, Vec<u8>)> {
        self.messages.drain(..)
    }
}

impl Transport for Outbox {
    fn send(&mut self, _request: &DNSRequest, message: &[u8], peer: SocketAddr) -> io::Result<()> {
        self.messages.push((peer, message.to_vec()));
        Ok(())
    }
}

/// Builds one response message at a time.
///
/// Records go in whole RRsets or not at all. When [`MessageBuilder::put`]
/// reports that a set does not fit, the caller sends what it has and starts a
/// [`MessageBuilder::continuation`].
#[derive(Debug)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    len: usize,
    header: DNSHeader,
    question: DNSQuestion,
    section: Section,
}

impl MessageBuilder {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(DNSHeader::SIZE)],
            len: DNSHeader::SIZE,
            header: DNSHeader::default(),
            question: DNSQuestion::default(),
            section: Section::Answer,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Start a response to `request`: same id, opcode, RD bit and question
    pub fn to_answer(&mut self, request: &DNSRequest) -> Result<(), DnsError> {
        self.header = DNSHeader {
            id: request.header.id,
            qr: true,
            opcode: request.header.opcode,
            rd: request.header.rd,
            qdcount: 1,
            ..Default::default()
        };
        self.question = request.question.clone();
        self.restart()
    }

    /// Start the next message of a multi-message answer. Header flags and
    /// the question carry over; sections start empty.
    pub fn continuation(&mut self) -> Result<(), DnsError> {
        self.header.tc = false;
        self.restart()
    }

    fn restart(&mut self) -> Result<(), DnsError> {
        self.header.ancount = 0;
        self.header.nscount = 0;
        self.header.arcount = 0;
        self.section = Section::Answer;
        let mut writer = WireWriter::at(&mut self.buf, DNSHeader::SIZE)?;
        self.question.write(&mut writer)?;
        self.len = writer.tell();
        Ok(())
    }

    pub fn set_authoritative(&mut self, aa: bool) {
        self.header.aa = aa;
    }

    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode.to_u8();
    }

    pub fn set_truncated(&mut self, tc: bool) {
        self.header.tc = tc;
    }

    pub fn header(&self) -> &DNSHeader {
        &self.header
    }

    pub fn has_records(&self) -> bool {
        self.header.ancount > 0 || self.header.nscount > 0 || self.header.arcount > 0
    }

    /// Append every record of `rrset` to `section`. Returns false, leaving
    /// the message untouched, when the whole set does not fit.
    pub fn put(&mut self, rrset: &RRset, section: Section) -> Result<bool, DnsError> {
        if section < self.section {
            return Err(DnsError::Unsupported(format!(
                "{:?} records after {:?} records",
                section, self.section
            )));
        }
        if rrset.wire_size() > self.buf.len() - self.len {
            trace!(
                "{} {} needs {} bytes, {} left",
                rrset.owner(),
                rrset.rtype(),
                rrset.wire_size(),
                self.buf.len() - self.len
            );
            return Ok(false);
        }

        let mut writer = WireWriter::at(&mut self.buf, self.len)?;
        rrset.write_records(&mut writer)?;
        self.len = writer.tell();
        self.section = section;

        let count = match section {
            Section::Answer => &mut self.header.ancount,
            Section::Authority => &mut self.header.nscount,
            Section::Additional => &mut self.header.arcount,
        };
        *count = count.saturating_add(rrset.rdcount());
        Ok(true)
    }

    /// Patch the header in and return the finished message
    pub fn finish(&mut self) -> Result<&[u8], DnsError> {
        self.buf[..DNSHeader::SIZE].copy_from_slice(&self.header.to_bytes()?);
        Ok(&self.buf[..self.len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::DNSResourceType;
    use crate::dns::name::Name;

    fn request() -> DNSRequest {
        let qname: Name = "www.example.".parse().unwrap();
        let mut request = DNSRequest::new(0x1234, DNSQuestion::new(qname, DNSResourceType::A));
        request.header.rd = true;
        request
    }

    fn a_set(count: u8) -> RRset {
        let mut set = RRset::new("www.example.".parse().unwrap(), DNSResourceType::A, 60);
        for i in 0..count {
            set.push_rdata(&[192, 0, 2, i]).unwrap();
        }
        set
    }

    #[test]
    fn test_answer_header_and_question() {
        let mut builder = MessageBuilder::new(512);
        builder.to_answer(&request()).unwrap();
        builder.set_authoritative(true);
        assert!(builder.put(&a_set(2), Section::Answer).unwrap());
        let message = builder.finish().unwrap().to_vec();

        let header = DNSHeader::parse(&message).unwrap();
        assert_eq!(header.id, 0x1234);
        assert!(header.qr && header.aa && header.rd);
        assert_eq!(header.ancount, 2);
        // header + question + 2 * (name 13 + 10 + 4)
        assert_eq!(message.len(), 12 + 17 + 2 * 27);
        let parsed = DNSRequest::parse(&message).unwrap();
        assert_eq!(parsed.question, request().question);
    }

    #[test]
    fn test_put_is_all_or_nothing() {
        let mut builder = MessageBuilder::new(12 + 17 + 27 * 2);
        builder.to_answer(&request()).unwrap();
        assert!(!builder.put(&a_set(3), Section::Answer).unwrap());
        assert!(!builder.has_records());
        assert_eq!(builder.finish().unwrap().len(), 12 + 17);
        assert!(builder.put(&a_set(2), Section::Answer).unwrap());
        assert!(!builder.put(&a_set(1), Section::Authority).unwrap());
    }

    #[test]
    fn test_continuation_keeps_flags() {
        let mut builder = MessageBuilder::new(100);
        builder.to_answer(&request()).unwrap();
        builder.set_authoritative(true);
        builder.set_rcode(ResponseCode::NameError);
        builder.put(&a_set(1), Section::Authority).unwrap();
        builder.continuation().unwrap();
        assert!(!builder.has_records());
        let message = builder.finish().unwrap();
        let header = DNSHeader::parse(message).unwrap();
        assert!(header.aa);
        assert_eq!(header.rcode, 3);
        assert_eq!(header.nscount, 0);
        assert_eq!(message.len(), 12 + 17);
    }

    #[test]
    fn test_sections_must_be_in_order() {
        let mut builder = MessageBuilder::new(512);
        builder.to_answer(&request()).unwrap();
        builder.put(&a_set(1), Section::Authority).unwrap();
        assert!(builder.put(&a_set(1), Section::Answer).is_err());
    }

    #[test]
    fn test_question_larger_than_capacity() {
        let mut builder = MessageBuilder::new(20);
        assert!(matches!(
            builder.to_answer(&request()),
            Err(DnsError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_outbox_collects() {
        let mut outbox = Outbox::new();
        let peer: SocketAddr = "127.0.0.1:5353".parse().unwrap();
        outbox.send(&request(), b"abc", peer).unwrap();
        assert_eq!(outbox.drain().collect::<Vec<_>>(), vec![(peer, b"abc".to_vec())]);
    }
}
