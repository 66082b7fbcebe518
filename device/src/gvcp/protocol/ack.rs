/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io;

use byteorder::{ReadBytesExt, BE};

use crate::gvcp::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckPacket<'a> {
    header: Header,
    raw_ack_data: &'a [u8],
}

impl<'a> AckPacket<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let mut cursor = io::Cursor::new(buf);
        let header = Header::parse(&mut cursor)?;

        let data_start = cursor.position() as usize;
        let data_end = data_start + header.length as usize;
        if buf.len() < data_end {
            return Err(Error::InvalidPacket(
                "ack data length is smaller than specified length in header".into(),
            ));
        }

        let raw_ack_data = &buf[data_start..data_end];
        Ok(Self {
            header,
            raw_ack_data,
        })
    }

    pub fn ack_kind(&self) -> AckKind {
        self.header.ack_kind
    }

    pub fn ack_data_as<T: ParseAckData<'a>>(&self) -> Result<T> {
        T::parse(self.raw_ack_data, &self.header)
    }

    pub fn request_id(&self) -> u16 {
        self.header.request_id
    }

    pub fn status(&self) -> Status {
        self.header.status
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    status: Status,
    ack_kind: AckKind,
    length: u16,
    request_id: u16,
}

impl Header {
    fn parse(cursor: &mut io::Cursor<&[u8]>) -> Result<Self> {
        let status = Status::parse(cursor)?;
        let ack_kind = AckKind::parse(cursor)?;
        let length = cursor.read_u16::<BE>()?;
        let request_id = cursor.read_u16::<BE>()?;
        Ok(Self {
            status,
            ack_kind,
            length,
            request_id,
        })
    }
}

pub trait ParseAckData<'a>: Sized {
    fn parse(raw_data: &'a [u8], header: &Header) -> Result<Self>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    code: u16,
    kind: StatusKind,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self.kind, StatusKind::Success | StatusKind::PacketResend)
    }

    pub fn code(self) -> u16 {
        self.code
    }

    pub fn kind(self) -> StatusKind {
        self.kind
    }

    fn parse(cursor: &mut io::Cursor<&[u8]>) -> Result<Self> {
        let code: u16 = cursor.read_u16::<BE>()?;
        let kind = match code {
            0x0000 => StatusKind::Success,
            0x0100 => StatusKind::PacketResend,
            0x8001 => StatusKind::NotImplemented,
            0x8002 => StatusKind::InvalidParameter,
            0x8003 => StatusKind::InvalidAddress,
            0x8004 => StatusKind::WriteProtect,
            0x8005 => StatusKind::BadAlignment,
            0x8006 => StatusKind::AccessDenied,
            0x8007 => StatusKind::Busy,
            0x8008 => StatusKind::LocalProblem,
            0x8009 => StatusKind::MessageMismatch,
            0x800a => StatusKind::InvalidProtocol,
            0x800b => StatusKind::NoMessage,
            0x800c => StatusKind::PacketUnavailable,
            0x800d => StatusKind::DataOverrun,
            0x800e => StatusKind::InvalidHeader,
            0x800f => StatusKind::WrongConfig,
            0x8fff => StatusKind::GenericError,
            _ => {
                return Err(Error::InvalidPacket(
                    format! {"invalid gvcp ack status code {:#X}", code}.into(),
                ));
            }
        };
        Ok(Self { code, kind })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    PacketResend,
    NotImplemented,
    InvalidParameter,
    InvalidAddress,
    WriteProtect,
    BadAlignment,
    AccessDenied,
    Busy,
    LocalProblem,
    MessageMismatch,
    InvalidProtocol,
    NoMessage,
    PacketUnavailable,
    DataOverrun,
    InvalidHeader,
    WrongConfig,
    GenericError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckKind {
    ReadReg,
    WriteReg,
    ReadMem,
    WriteMem,
    Pending,
}

impl AckKind {
    fn parse(cursor: &mut io::Cursor<&[u8]>) -> Result<Self> {
        let id: u16 = cursor.read_u16::<BE>()?;
        match id {
            0x0081 => Ok(AckKind::ReadReg),
            0x0083 => Ok(AckKind::WriteReg),
            0x0085 => Ok(AckKind::ReadMem),
            0x0087 => Ok(AckKind::WriteMem),
            0x0089 => Ok(AckKind::Pending),
            _ => Err(Error::InvalidPacket(
                format!("unknown ack kind id {:#X}", id).into(),
            )),
        }
    }
}

fn expect_kind(header: &Header, expected: AckKind) -> Result<()> {
    if header.ack_kind == expected {
        Ok(())
    } else {
        Err(Error::InvalidPacket(
            format!(
                "invalid ack kind: expected `{:?}` but `{:?}`",
                expected, header.ack_kind
            )
            .into(),
        ))
    }
}

/// Ack data of a `ReadReg` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadReg {
    value: u32,
}

impl ReadReg {
    pub fn value(self) -> u32 {
        self.value
    }
}

impl<'a> ParseAckData<'a> for ReadReg {
    fn parse(mut raw_data: &'a [u8], header: &Header) -> Result<Self> {
        expect_kind(header, AckKind::ReadReg)?;
        let value = raw_data.read_u32::<BE>()?;
        Ok(Self { value })
    }
}

/// Ack data of a `WriteReg` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteReg {
    entry_num: u16,
}

impl WriteReg {
    pub fn entry_num(self) -> u16 {
        self.entry_num
    }
}

impl<'a> ParseAckData<'a> for WriteReg {
    fn parse(raw_data: &'a [u8], header: &Header) -> Result<Self> {
        expect_kind(header, AckKind::WriteReg)?;
        if raw_data.len() < 4 {
            return Err(Error::InvalidPacket(
                "data of `WriteReg` ack is too small".into(),
            ));
        }

        let entry_num = (&raw_data[2..4]).read_u16::<BE>()?;
        Ok(Self { entry_num })
    }
}

/// Ack data of a `ReadMem` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadMem<'a> {
    address: u32,
    data: &'a [u8],
}

impl<'a> ReadMem<'a> {
    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> ParseAckData<'a> for ReadMem<'a> {
    fn parse(raw_data: &'a [u8], header: &Header) -> Result<Self> {
        expect_kind(header, AckKind::ReadMem)?;
        if raw_data.len() < 4 {
            return Err(Error::InvalidPacket(
                "data of `ReadMem` ack is too small".into(),
            ));
        }

        let address = (&raw_data[..4]).read_u32::<BE>()?;
        Ok(Self {
            address,
            data: &raw_data[4..],
        })
    }
}

/// Ack data of a `WriteMem` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteMem {
    address: u32,
}

impl WriteMem {
    pub fn address(self) -> u32 {
        self.address
    }
}

impl<'a> ParseAckData<'a> for WriteMem {
    fn parse(mut raw_data: &'a [u8], header: &Header) -> Result<Self> {
        expect_kind(header, AckKind::WriteMem)?;
        let address = raw_data.read_u32::<BE>()?;
        Ok(Self { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_reg_ack() {
        let bytes = [
            0x00, 0x00, 0x00, 0x81, 0x00, 0x04, 0x00, 0x07, // header
            0xde, 0xad, 0xbe, 0xef, // value
        ];
        let ack = AckPacket::parse(&bytes).unwrap();
        assert!(ack.status().is_success());
        assert_eq!(ack.ack_kind(), AckKind::ReadReg);
        assert_eq!(ack.request_id(), 7);

        let data: ReadReg = ack.ack_data_as().unwrap();
        assert_eq!(data.value(), 0xdead_beef);
    }

    #[test]
    fn parses_read_mem_ack() {
        let bytes = [
            0x00, 0x00, 0x00, 0x85, 0x00, 0x08, 0x00, 0x02, // header
            0x00, 0x01, 0x00, 0x00, // address
            0x01, 0x02, 0x03, 0x04, // data
        ];
        let ack = AckPacket::parse(&bytes).unwrap();
        let data: ReadMem = ack.ack_data_as().unwrap();
        assert_eq!(data.address(), 0x0001_0000);
        assert_eq!(data.data(), [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn parses_write_reg_ack() {
        let bytes = [
            0x00, 0x00, 0x00, 0x83, 0x00, 0x04, 0x00, 0x01, // header
            0x00, 0x00, 0x00, 0x01, // reserved + entry count
        ];
        let ack = AckPacket::parse(&bytes).unwrap();
        let data: WriteReg = ack.ack_data_as().unwrap();
        assert_eq!(data.entry_num(), 1);
    }

    #[test]
    fn decodes_error_status() {
        let bytes = [
            0x80, 0x06, 0x00, 0x83, 0x00, 0x04, 0x00, 0x01, // header
            0x00, 0x00, 0x00, 0x00,
        ];
        let ack = AckPacket::parse(&bytes).unwrap();
        assert!(!ack.status().is_success());
        assert_eq!(ack.status().kind(), StatusKind::AccessDenied);
        assert_eq!(ack.status().code(), 0x8006);
    }

    #[test]
    fn rejects_truncated_ack() {
        // Header claims 8 bytes of data but only 4 follow.
        let bytes = [
            0x00, 0x00, 0x00, 0x85, 0x00, 0x08, 0x00, 0x01, // header
            0x00, 0x01, 0x00, 0x00,
        ];
        assert!(AckPacket::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_kind_mismatch() {
        let bytes = [
            0x00, 0x00, 0x00, 0x81, 0x00, 0x04, 0x00, 0x07, // `ReadReg` ack
            0xde, 0xad, 0xbe, 0xef,
        ];
        let ack = AckPacket::parse(&bytes).unwrap();
        assert!(ack.ack_data_as::<WriteReg>().is_err());
    }

    #[test]
    fn rejects_unknown_status_code() {
        let bytes = [
            0x70, 0x00, 0x00, 0x81, 0x00, 0x00, 0x00, 0x01, // bogus status
        ];
        assert!(AckPacket::parse(&bytes).is_err());
    }
}
