pub mod common;
pub mod constants;
pub mod enums;
pub mod header;
pub mod name;
pub mod question;
pub mod wire;

pub use header::DNSHeader;
pub use name::{Bsearcher, HasOwner, Name, bsearch, dname_cmp, dname_len};
pub use question::{DNSQuestion, DNSRequest};
pub use wire::{WireReader, WireWriter};
