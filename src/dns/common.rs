use bitstream_io::{BitReader, BitWriter, Endianness};

use crate::error::DnsError;

/// Fixed-layout packet pieces packed bit by bit
pub trait PacketComponent {
    fn write<E: Endianness>(&self, writer: &mut BitWriter<&mut Vec<u8>, E>)
    -> Result<(), DnsError>;

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), DnsError>;
}
