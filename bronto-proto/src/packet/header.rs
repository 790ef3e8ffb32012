use crate::buffer::reader::ReaderError;
use crate::buffer::writer::WriterError;
use crate::buffer::BytePacketBuffer;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError,
    /// Format error - The name server was unable to interpret the query.
    FormatError,
    /// Server failure - The name server was unable to process this query
    /// due to a problem with the name server.
    ServerFailure,
    /// Name Error - this code signifies that the domain name referenced in
    /// the query does not exist. Also known as NXDOMAIN.
    NameError,
    /// Not Implemented - The name server does not support the requested
    /// kind of query.
    NotImplemented,
    /// Refused - The name server refuses to perform the specified operation
    /// for policy reasons.
    Refused,
    /// Any other code; forwarded unchanged.
    Other(u8),
}

impl ResponseCode {
    pub fn from_num(value: u8) -> Self {
        match value & 0x0F {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            other => ResponseCode::Other(other),
        }
    }

    pub fn to_num(self) -> u8 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NameError => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Other(value) => value & 0x0F,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates any kind
    /// of query. This identifier is copied into the corresponding reply and
    /// can be used by the requester to match up replies to outstanding
    /// queries.
    pub id: u16, // 16 bits

    /// RD Recursion Desired - this bit may be set in a query and is copied
    /// into the response.
    pub recursion_desired: bool, // 1 bit
    /// TC TrunCation - specifies that this message was truncated due to
    /// length greater than that permitted on the transmission channel.
    pub truncated_message: bool, // 1 bit
    /// AA Authoritative Answer - this bit is valid in responses, and
    /// specifies that the responding name server is an authority for the
    /// domain name in question section.
    pub authoritative_answer: bool, // 1 bit
    /// OPCODE A four bit field that specifies kind of query in this
    /// message. This value is set by the originator of a query and copied
    /// into the response.
    pub opcode: u8, // 4 bits
    /// QR A one bit field that specifies whether this message is a query
    /// (0), or a response (1).
    pub response: bool, // 1 bit

    /// Response code - this 4 bit field is set as part of responses.
    pub response_code: ResponseCode, // 4 bits
    pub checking_disabled: bool, // 1 bit
    pub authed_data: bool,       // 1 bit
    /// Z Reserved for future use. Must be zero in all queries and
    /// responses.
    pub z: bool, // 1 bit
    /// RA Recursion Available - this bit is set or cleared in a response,
    /// and denotes whether recursive query support is available in the
    /// name server.
    pub recursion_available: bool, // 1 bit

    /// QDCOUNT number of entries in the question section.
    pub questions: u16,
    /// ANCOUNT number of resource records in the answer section.
    pub answers: u16,
    /// NSCOUNT number of name server resource records in the authority
    /// records section.
    pub authoritative_entries: u16,
    /// ARCOUNT number of resource records in the additional records
    /// section.
    pub resource_entries: u16,
}

impl Header {
    pub fn question(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn response(id: u16) -> Self {
        Self {
            id,
            response: true,
            ..Default::default()
        }
    }

    /// Header of a locally generated reply to `request`.
    pub fn response_from(request: &Self) -> Self {
        Self {
            id: request.id,
            recursion_desired: request.recursion_desired,
            opcode: request.opcode,
            response: true,
            ..Default::default()
        }
    }

    pub fn with_response_code(mut self, value: ResponseCode) -> Self {
        self.response_code = value;
        self
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,

            recursion_desired: false,
            truncated_message: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            response_code: ResponseCode::NoError,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,

            questions: 0,
            answers: 0,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }
}

impl Header {
    /// Reads the first 12 bytes
    pub fn read(buffer: &mut BytePacketBuffer) -> Result<Self, ReaderError> {
        let id = buffer.read_u16()?;

        let head = buffer.read()?;
        let tail = buffer.read()?;

        Ok(Self {
            id,
            recursion_desired: (head & (1 << 0)) > 0,
            truncated_message: (head & (1 << 1)) > 0,
            authoritative_answer: (head & (1 << 2)) > 0,
            opcode: (head >> 3) & 0x0F,
            response: (head & (1 << 7)) > 0,
            response_code: ResponseCode::from_num(tail & 0x0F),
            checking_disabled: (tail & (1 << 4)) > 0,
            authed_data: (tail & (1 << 5)) > 0,
            z: (tail & (1 << 6)) > 0,
            recursion_available: (tail & (1 << 7)) > 0,
            questions: buffer.read_u16()?,
            answers: buffer.read_u16()?,
            authoritative_entries: buffer.read_u16()?,
            resource_entries: buffer.read_u16()?,
        })
    }

    pub fn write(&self, buffer: &mut BytePacketBuffer) -> Result<(), WriterError> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        buffer.write_u8(
            self.response_code.to_num()
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, ResponseCode};

    #[test]
    fn should_roundtrip_flags() {
        let header = Header {
            id: 4242,
            recursion_desired: true,
            authoritative_answer: true,
            response: true,
            response_code: ResponseCode::NameError,
            recursion_available: true,
            questions: 1,
            answers: 2,
            ..Default::default()
        };
        let mut buffer = crate::buffer::BytePacketBuffer::default();
        header.write(&mut buffer).unwrap();
        buffer.pos = 0;
        let decoded = Header::read(&mut buffer).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn response_from_should_copy_request_fields() {
        let request = Header {
            id: 7,
            recursion_desired: true,
            opcode: 0,
            ..Default::default()
        };
        let response = Header::response_from(&request);
        assert_eq!(response.id, 7);
        assert!(response.response);
        assert!(response.recursion_desired);
        assert_eq!(response.response_code, ResponseCode::NoError);
    }
}
