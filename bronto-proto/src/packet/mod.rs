pub mod header;
pub mod question;
pub mod record;

use crate::buffer::{BytePacketBuffer, ReaderError, WriterError};

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)]
pub enum QueryType {
    Unknown(u16),
    /// a host address
    A, // 1
    /// an authoritative name server
    NS, // 2
    /// the canonical name for an alias
    CNAME, // 5
    /// a domain name pointer
    PTR, // 12
    /// mail exchange
    MX, // 15
    /// text strings
    TXT, // 16
    /// an IPv6 host address
    AAAA, // 28
    /// server selection
    SRV, // 33
    /// EDNS0 pseudo record
    OPT, // 41
    /// request for any record; used in block rules, never cached
    ANY, // 255
}

impl QueryType {
    pub fn into_num(self) -> u16 {
        match self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::NS => 2,
            QueryType::CNAME => 5,
            QueryType::PTR => 12,
            QueryType::MX => 15,
            QueryType::TXT => 16,
            QueryType::AAAA => 28,
            QueryType::SRV => 33,
            QueryType::OPT => 41,
            QueryType::ANY => 255,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            12 => QueryType::PTR,
            15 => QueryType::MX,
            16 => QueryType::TXT,
            28 => QueryType::AAAA,
            33 => QueryType::SRV,
            41 => QueryType::OPT,
            255 => QueryType::ANY,
            _ => QueryType::Unknown(num),
        }
    }

    /// Symbolic name as used in blocklist entries and logs.
    pub fn from_name(name: &str) -> Option<QueryType> {
        match name {
            "A" => Some(QueryType::A),
            "NS" => Some(QueryType::NS),
            "CNAME" => Some(QueryType::CNAME),
            "PTR" => Some(QueryType::PTR),
            "MX" => Some(QueryType::MX),
            "TXT" => Some(QueryType::TXT),
            "AAAA" => Some(QueryType::AAAA),
            "SRV" => Some(QueryType::SRV),
            "OPT" => Some(QueryType::OPT),
            "ANY" => Some(QueryType::ANY),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Unknown(num) => write!(f, "TYPE{num}"),
            QueryType::A => write!(f, "A"),
            QueryType::NS => write!(f, "NS"),
            QueryType::CNAME => write!(f, "CNAME"),
            QueryType::PTR => write!(f, "PTR"),
            QueryType::MX => write!(f, "MX"),
            QueryType::TXT => write!(f, "TXT"),
            QueryType::AAAA => write!(f, "AAAA"),
            QueryType::SRV => write!(f, "SRV"),
            QueryType::OPT => write!(f, "OPT"),
            QueryType::ANY => write!(f, "ANY"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsPacket {
    pub header: header::Header,
    pub questions: Vec<question::Question>,
    pub answers: Vec<record::Record>,
    pub authorities: Vec<record::Record>,
    pub resources: Vec<record::Record>,
}

impl TryFrom<BytePacketBuffer> for DnsPacket {
    type Error = ReaderError;

    fn try_from(mut buffer: BytePacketBuffer) -> Result<Self, Self::Error> {
        let header = header::Header::read(&mut buffer)?;

        let mut questions = Vec::with_capacity(header.questions as usize);
        for _ in 0..header.questions {
            questions.push(question::Question::read(&mut buffer)?);
        }

        let mut answers = Vec::with_capacity(header.answers as usize);
        for _ in 0..header.answers {
            answers.push(record::Record::read(&mut buffer)?);
        }

        let mut authorities = Vec::with_capacity(header.authoritative_entries as usize);
        for _ in 0..header.authoritative_entries {
            authorities.push(record::Record::read(&mut buffer)?);
        }

        let mut resources = Vec::with_capacity(header.resource_entries as usize);
        for _ in 0..header.resource_entries {
            resources.push(record::Record::read(&mut buffer)?);
        }

        Ok(DnsPacket {
            header,
            questions,
            answers,
            authorities,
            resources,
        })
    }
}

impl DnsPacket {
    pub fn new(header: header::Header) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    /// Skeleton of a locally generated reply to `request`: same id, opcode
    /// and recursion-desired bit, question section echoed.
    pub fn response_from(request: &Self) -> Self {
        Self {
            header: header::Header::response_from(&request.header),
            questions: request.questions.clone(),
            ..Default::default()
        }
    }

    pub fn with_question(mut self, question: question::Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_answer(mut self, answer: record::Record) -> Self {
        self.answers.push(answer);
        self
    }

    pub fn with_answers(mut self, answers: Vec<record::Record>) -> Self {
        self.answers = answers;
        self
    }

    pub fn with_resource(mut self, resource: record::Record) -> Self {
        self.resources.push(resource);
        self
    }

    /// All resource records across answer, authority and additional
    /// sections.
    pub fn records(&self) -> impl Iterator<Item = &record::Record> {
        self.answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut record::Record> {
        self.answers
            .iter_mut()
            .chain(self.authorities.iter_mut())
            .chain(self.resources.iter_mut())
    }

    pub fn create_buffer(&mut self) -> Result<BytePacketBuffer, WriterError> {
        let mut buffer = BytePacketBuffer::default();
        self.header.questions = self.questions.len() as u16;
        self.header.answers = self.answers.len() as u16;
        self.header.authoritative_entries = self.authorities.len() as u16;
        self.header.resource_entries = self.resources.len() as u16;

        self.header.write(&mut buffer)?;

        for question in &self.questions {
            question.write(&mut buffer)?;
        }
        for rec in &self.answers {
            rec.write(&mut buffer)?;
        }
        for rec in &self.authorities {
            rec.write(&mut buffer)?;
        }
        for rec in &self.resources {
            rec.write(&mut buffer)?;
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::header::Header;
    use super::question::Question;
    use super::record::Record;
    use super::{DnsPacket, QueryType};
    use std::net::Ipv4Addr;

    #[test]
    fn qtype_names_should_roundtrip() {
        for qtype in [
            QueryType::A,
            QueryType::NS,
            QueryType::CNAME,
            QueryType::PTR,
            QueryType::MX,
            QueryType::TXT,
            QueryType::AAAA,
            QueryType::SRV,
            QueryType::ANY,
        ] {
            assert_eq!(QueryType::from_name(&qtype.to_string()), Some(qtype));
        }
        assert_eq!(QueryType::from_name("NOPE"), None);
        assert_eq!(QueryType::Unknown(4242).to_string(), "TYPE4242");
    }

    #[test]
    fn should_roundtrip_query_packet() {
        let mut packet = DnsPacket::new(Header::question(38005))
            .with_question(Question::new("google.com".into(), QueryType::A));
        packet.header.recursion_desired = true;

        let buffer = packet.create_buffer().unwrap();
        let decoded = DnsPacket::try_from(crate::buffer::BytePacketBuffer::new(buffer.buf)).unwrap();

        assert_eq!(decoded.header.id, 38005);
        assert!(decoded.header.recursion_desired);
        assert_eq!(decoded.questions.len(), 1);
        assert_eq!(decoded.questions[0].name, "google.com");
        assert_eq!(decoded.questions[0].qtype, QueryType::A);
        assert!(decoded.answers.is_empty());
    }

    #[test]
    fn should_roundtrip_response_packet() {
        let mut packet = DnsPacket::new(Header::response(38005))
            .with_question(Question::new("google.com".into(), QueryType::A))
            .with_answer(Record::A {
                domain: "google.com".into(),
                addr: Ipv4Addr::new(172, 217, 20, 206),
                ttl: 8,
            });

        let buffer = packet.create_buffer().unwrap();
        let decoded = DnsPacket::try_from(crate::buffer::BytePacketBuffer::new(buffer.buf)).unwrap();

        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(
            decoded.answers[0],
            Record::A {
                domain: "google.com".into(),
                addr: Ipv4Addr::new(172, 217, 20, 206),
                ttl: 8,
            }
        );
    }

    #[test]
    fn response_from_should_echo_question() {
        let request = DnsPacket::new(Header::question(99))
            .with_question(Question::new("perdu.com".into(), QueryType::MX));
        let response = DnsPacket::response_from(&request);
        assert_eq!(response.header.id, 99);
        assert!(response.header.response);
        assert_eq!(response.questions, request.questions);
    }
}
