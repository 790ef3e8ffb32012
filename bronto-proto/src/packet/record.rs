use super::QueryType;
use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;
use std::net::{Ipv4Addr, Ipv6Addr};

const CLASS_INTERNET: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)]
pub enum Record {
    /// Any type we don't decode. The class and RDATA are preserved so the
    /// record survives a round trip; OPT pseudo records ride through here
    /// with their payload size in `class` and their flags in `ttl`.
    Unknown {
        domain: String,
        qtype: u16,
        class: u16,
        ttl: u32,
        data: Vec<u8>,
    }, // 0
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    }, // 1
    NS {
        domain: String,
        host: String,
        ttl: u32,
    }, // 2
    CNAME {
        domain: String,
        host: String,
        ttl: u32,
    }, // 5
    PTR {
        domain: String,
        host: String,
        ttl: u32,
    }, // 12
    MX {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    }, // 15
    TXT {
        domain: String,
        text: String,
        ttl: u32,
    }, // 16
    AAAA {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    }, // 28
    SRV {
        domain: String,
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
        ttl: u32,
    }, // 33
}

impl Record {
    pub fn domain(&self) -> &str {
        match self {
            Self::Unknown { domain, .. }
            | Self::A { domain, .. }
            | Self::NS { domain, .. }
            | Self::CNAME { domain, .. }
            | Self::PTR { domain, .. }
            | Self::MX { domain, .. }
            | Self::TXT { domain, .. }
            | Self::AAAA { domain, .. }
            | Self::SRV { domain, .. } => domain,
        }
    }

    pub fn qtype(&self) -> QueryType {
        match self {
            Self::Unknown { qtype, .. } => QueryType::from_num(*qtype),
            Self::A { .. } => QueryType::A,
            Self::NS { .. } => QueryType::NS,
            Self::CNAME { .. } => QueryType::CNAME,
            Self::PTR { .. } => QueryType::PTR,
            Self::MX { .. } => QueryType::MX,
            Self::TXT { .. } => QueryType::TXT,
            Self::AAAA { .. } => QueryType::AAAA,
            Self::SRV { .. } => QueryType::SRV,
        }
    }

    /// Whether this is an EDNS0 OPT pseudo record; those carry no real TTL.
    pub fn is_opt(&self) -> bool {
        self.qtype() == QueryType::OPT
    }

    pub fn ttl(&self) -> u32 {
        match self {
            Self::Unknown { ttl, .. }
            | Self::A { ttl, .. }
            | Self::NS { ttl, .. }
            | Self::CNAME { ttl, .. }
            | Self::PTR { ttl, .. }
            | Self::MX { ttl, .. }
            | Self::TXT { ttl, .. }
            | Self::AAAA { ttl, .. }
            | Self::SRV { ttl, .. } => *ttl,
        }
    }

    pub fn set_ttl(&mut self, value: u32) {
        match self {
            Self::Unknown { ttl, .. }
            | Self::A { ttl, .. }
            | Self::NS { ttl, .. }
            | Self::CNAME { ttl, .. }
            | Self::PTR { ttl, .. }
            | Self::MX { ttl, .. }
            | Self::TXT { ttl, .. }
            | Self::AAAA { ttl, .. }
            | Self::SRV { ttl, .. } => *ttl = value,
        }
    }

    pub fn with_ttl(mut self, value: u32) -> Self {
        self.set_ttl(value);
        self
    }

    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Record, ReaderError> {
        // NAME a domain name to which this resource record pertains.
        let domain = buffer.read_qname()?;

        // TYPE two octets containing one of the RR type codes.
        let qtype_num = buffer.read_u16()?;
        let qtype = QueryType::from_num(qtype_num);

        // CLASS two octets; OPT records abuse this field for the UDP
        // payload size, so it is kept verbatim for unknown types.
        let class = buffer.read_u16()?;

        // TTL a 32 bit unsigned integer specifying how long the resource
        // record may be cached.
        let ttl = buffer.read_u32()?;

        // RDLENGTH the length in octets of the RDATA field.
        let data_len = buffer.read_u16()?;

        match qtype {
            QueryType::A => {
                let raw_addr = buffer.read_u32()?;
                let addr = Ipv4Addr::from(raw_addr);

                Ok(Record::A { domain, addr, ttl })
            }
            QueryType::AAAA => {
                let mut octets = [0u8; 16];
                for chunk in octets.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&buffer.read_u32()?.to_be_bytes());
                }

                Ok(Record::AAAA {
                    domain,
                    addr: Ipv6Addr::from(octets),
                    ttl,
                })
            }
            QueryType::NS => {
                let host = buffer.read_qname()?;

                Ok(Record::NS { domain, host, ttl })
            }
            QueryType::CNAME => {
                let host = buffer.read_qname()?;

                Ok(Record::CNAME { domain, host, ttl })
            }
            QueryType::PTR => {
                let host = buffer.read_qname()?;

                Ok(Record::PTR { domain, host, ttl })
            }
            QueryType::MX => {
                let priority = buffer.read_u16()?;
                let host = buffer.read_qname()?;

                Ok(Record::MX {
                    domain,
                    priority,
                    host,
                    ttl,
                })
            }
            QueryType::TXT => {
                // RDATA is a sequence of character strings; joined here.
                let mut text = String::new();
                let mut consumed = 0usize;
                while consumed < data_len as usize {
                    let len = buffer.read()? as usize;
                    let chunk = buffer.get_range(buffer.pos(), len)?;
                    text.push_str(&String::from_utf8_lossy(chunk));
                    buffer.step(len)?;
                    consumed += len + 1;
                }

                Ok(Record::TXT { domain, text, ttl })
            }
            QueryType::SRV => {
                let priority = buffer.read_u16()?;
                let weight = buffer.read_u16()?;
                let port = buffer.read_u16()?;
                let target = buffer.read_qname()?;

                Ok(Record::SRV {
                    domain,
                    priority,
                    weight,
                    port,
                    target,
                    ttl,
                })
            }
            _ => {
                let data = buffer.get_range(buffer.pos(), data_len as usize)?.to_vec();
                buffer.step(data_len as usize)?;

                Ok(Record::Unknown {
                    domain,
                    qtype: qtype_num,
                    class,
                    ttl,
                    data,
                })
            }
        }
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<usize, WriterError> {
        let start_pos = buffer.pos();

        match *self {
            Record::A {
                ref domain,
                ref addr,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::A.into_num())?;
                buffer.write_u16(CLASS_INTERNET)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(4)?;
                buffer.write_bytes(&addr.octets())?;
            }
            Record::AAAA {
                ref domain,
                ref addr,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::AAAA.into_num())?;
                buffer.write_u16(CLASS_INTERNET)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(16)?;
                buffer.write_bytes(&addr.octets())?;
            }
            Record::NS {
                ref domain,
                ref host,
                ttl,
            } => {
                self.write_host_record(buffer, domain, QueryType::NS, ttl, host)?;
            }
            Record::CNAME {
                ref domain,
                ref host,
                ttl,
            } => {
                self.write_host_record(buffer, domain, QueryType::CNAME, ttl, host)?;
            }
            Record::PTR {
                ref domain,
                ref host,
                ttl,
            } => {
                self.write_host_record(buffer, domain, QueryType::PTR, ttl, host)?;
            }
            Record::MX {
                ref domain,
                priority,
                ref host,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::MX.into_num())?;
                buffer.write_u16(CLASS_INTERNET)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(priority)?;
                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::TXT {
                ref domain,
                ref text,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::TXT.into_num())?;
                buffer.write_u16(CLASS_INTERNET)?;
                buffer.write_u32(ttl)?;

                // Single character string; longer text is truncated.
                let data = text.as_bytes();
                let len = data.len().min(255);
                buffer.write_u16(len as u16 + 1)?;
                buffer.write_u8(len as u8)?;
                buffer.write_bytes(&data[..len])?;
            }
            Record::SRV {
                ref domain,
                priority,
                weight,
                port,
                ref target,
                ttl,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::SRV.into_num())?;
                buffer.write_u16(CLASS_INTERNET)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(priority)?;
                buffer.write_u16(weight)?;
                buffer.write_u16(port)?;
                buffer.write_qname(target)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            Record::Unknown {
                ref domain,
                qtype,
                class,
                ttl,
                ref data,
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype)?;
                buffer.write_u16(class)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(data.len() as u16)?;
                buffer.write_bytes(data)?;
            }
        }

        Ok(buffer.pos() - start_pos)
    }

    fn write_host_record(
        &self,
        buffer: &mut BytePacketBuffer,
        domain: &str,
        qtype: QueryType,
        ttl: u32,
        host: &str,
    ) -> Result<(), WriterError> {
        buffer.write_qname(domain)?;
        buffer.write_u16(qtype.into_num())?;
        buffer.write_u16(CLASS_INTERNET)?;
        buffer.write_u32(ttl)?;

        let pos = buffer.pos();
        buffer.write_u16(0)?;

        buffer.write_qname(host)?;

        let size = buffer.pos() - (pos + 2);
        buffer.set_u16(pos, size as u16)?;
        Ok(())
    }
}
