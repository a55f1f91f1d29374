//! Authoritative answers from the store.
//!
//! Each query is classified as a referral (the name lies under a zone cut),
//! a positive answer, NODATA (the name exists without the asked type) or a
//! negative answer, and written through a [`Transport`]. A name outside every
//! hosted zone is refused.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::WorkerContext;
use crate::dns::constants::Opcode;
use crate::dns::enums::{DNSResourceClass, ResponseCode};
use crate::dns::header::DNSHeader;
use crate::dns::question::{DNSQuestion, DNSRequest};
use crate::error::DnsError;
use crate::message::{MessageBuilder, Section, Transport};
use crate::rrset::RRset;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    Positive,
    /// The name exists but holds nothing of the asked type
    NoData,
    /// NXDOMAIN
    Negative,
    Referral,
    Refused,
    NotImplemented,
    FormatError,
}

#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    #[error("Transport error: {0}")]
    Io(#[from] io::Error),
}

pub struct AnswerEngine {
    store: Arc<dyn Store>,
    max_message_size: usize,
}

impl AnswerEngine {
    pub fn new(store: Arc<dyn Store>, max_message_size: usize) -> Self {
        Self {
            store,
            max_message_size,
        }
    }

    /// A context sized for this engine's messages, one per worker
    pub fn context(&self) -> WorkerContext {
        WorkerContext::new(self.max_message_size)
    }

    /// Answer a raw query packet. A packet whose question cannot be parsed
    /// gets FORMERR if its header is readable and no reply otherwise.
    pub fn handle(
        &self,
        ctx: &mut WorkerContext,
        packet: &[u8],
        peer: SocketAddr,
        transport: &mut dyn Transport,
    ) -> Result<AnswerKind, AnswerError> {
        match DNSRequest::parse(packet) {
            Ok(request) => self.answer(ctx, &request, peer, transport),
            Err(e) => {
                debug!("Malformed query from {}: {}", peer, e);
                let header = DNSHeader::parse(packet)?;
                let response = format_error_response(&header, ResponseCode::FormatError)?;
                let request = DNSRequest {
                    header,
                    question: DNSQuestion::default(),
                };
                transport.send(&request, &response, peer)?;
                Ok(AnswerKind::FormatError)
            }
        }
    }

    /// Answer one parsed query. The context's transaction is released
    /// whatever the outcome.
    pub fn answer(
        &self,
        ctx: &mut WorkerContext,
        request: &DNSRequest,
        peer: SocketAddr,
        transport: &mut dyn Transport,
    ) -> Result<AnswerKind, AnswerError> {
        let result = self.resolve(ctx, request, peer, transport);
        ctx.release();
        if let Ok(kind) = &result {
            debug!(
                "{} {} from {}: {:?}",
                request.question.qname, request.question.qtype, peer, kind
            );
        }
        result
    }

    fn resolve(
        &self,
        ctx: &mut WorkerContext,
        request: &DNSRequest,
        peer: SocketAddr,
        transport: &mut dyn Transport,
    ) -> Result<AnswerKind, AnswerError> {
        let question = &request.question;
        ctx.message.to_answer(request)?;

        if Opcode::from(request.header.opcode) != Opcode::QUERY {
            ctx.message.set_rcode(ResponseCode::NotImplemented);
            transport.send(request, ctx.message.finish()?, peer)?;
            return Ok(AnswerKind::NotImplemented);
        }
        if question.qclass != DNSResourceClass::IN {
            ctx.message.set_rcode(ResponseCode::Refused);
            transport.send(request, ctx.message.finish()?, peer)?;
            return Ok(AnswerKind::Refused);
        }

        ctx.begin(self.store.as_ref())?;
        let txn = ctx.txn.as_deref().ok_or(StoreError::Released)?;
        let message = &mut ctx.message;

        if !txn.zone(&question.qname, &mut ctx.soa)? {
            message.set_rcode(ResponseCode::Refused);
            transport.send(request, message.finish()?, peer)?;
            return Ok(AnswerKind::Refused);
        }
        message.set_authoritative(true);

        let encloser = txn.encloser(&question.qname, &ctx.soa, &mut ctx.cut)?;
        let kind = if encloser.cut {
            message.set_authoritative(false);
            emit(message, &ctx.cut, Section::Authority, request, peer, transport)?;
            AnswerKind::Referral
        } else if encloser.name == question.qname {
            if txn.get(&question.qname, question.qtype, &mut ctx.answer)? {
                emit(message, &ctx.answer, Section::Answer, request, peer, transport)?;
                AnswerKind::Positive
            } else {
                emit(message, &ctx.soa, Section::Authority, request, peer, transport)?;
                AnswerKind::NoData
            }
        } else {
            message.set_rcode(ResponseCode::NameError);
            emit(message, &ctx.soa, Section::Authority, request, peer, transport)?;
            AnswerKind::Negative
        };

        transport.send(request, message.finish()?, peer)?;
        Ok(kind)
    }
}

/// Add `rrset` to the message. If it does not fit, the message so far is
/// sent and the set goes into a continuation; a set too large for any
/// message is dropped and the message marked truncated.
fn emit(
    message: &mut MessageBuilder,
    rrset: &RRset,
    section: Section,
    request: &DNSRequest,
    peer: SocketAddr,
    transport: &mut dyn Transport,
) -> Result<(), AnswerError> {
    if message.put(rrset, section)? {
        return Ok(());
    }
    if message.has_records() {
        transport.send(request, message.finish()?, peer)?;
        message.continuation()?;
        if message.put(rrset, section)? {
            return Ok(());
        }
    }
    warn!(
        "{} {} ({} bytes) does not fit in a {} byte message",
        rrset.owner(),
        rrset.rtype(),
        rrset.wire_size(),
        message.capacity()
    );
    message.set_truncated(true);
    Ok(())
}

/// Header-only reply echoing the id and opcode of `header`
pub fn format_error_response(header: &DNSHeader, rcode: ResponseCode) -> Result<Vec<u8>, DnsError> {
    let response = DNSHeader {
        id: header.id,
        qr: true,
        opcode: header.opcode,
        rd: header.rd,
        rcode: rcode.to_u8(),
        ..Default::default()
    };
    Ok(response.to_bytes()?.to_vec())
}
