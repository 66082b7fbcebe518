/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io;

use byteorder::{WriteBytesExt, BE};

use crate::gvcp::{Error, Result};

use super::{DATA_SIZE_MAX, HEADER_LENGTH};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandPacket<T> {
    header: CommandHeader,
    command_data: T,
}

impl<T> CommandPacket<T>
where
    T: CommandData,
{
    pub fn new(command_data: T, request_id: u16) -> Self {
        let header = CommandHeader::new(&command_data, request_id);
        Self {
            header,
            command_data,
        }
    }

    /// Total length of the serialized packet in bytes.
    pub fn length(&self) -> usize {
        HEADER_LENGTH + self.command_data.length() as usize
    }

    /// Length in bytes of a complete acknowledge to this command.
    pub fn maximum_ack_len(&self) -> usize {
        self.command_data.ack_len()
    }

    pub fn request_id(&self) -> u16 {
        self.header.request_id
    }

    pub fn serialize(&self, mut buf: impl io::Write) -> Result<()> {
        self.header.serialize(&mut buf)?;
        self.command_data.serialize(&mut buf)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandHeader {
    flag: CommandFlag,
    command_kind: CommandKind,
    length: u16,
    request_id: u16,
}

impl CommandHeader {
    pub fn new(command_data: &impl CommandData, request_id: u16) -> Self {
        let flag = command_data.flag();
        let command_kind = command_data.kind();
        let length = command_data.length();
        Self {
            flag,
            command_kind,
            length,
            request_id,
        }
    }

    pub fn serialize(&self, mut buf: impl io::Write) -> Result<()> {
        const MAGIC: u8 = 0x42;

        buf.write_u8(MAGIC)?;
        self.flag.serialize(&mut buf)?;
        self.command_kind.serialize(&mut buf)?;
        buf.write_u16::<BE>(self.length)?;
        buf.write_u16::<BE>(self.request_id)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    ReadReg,
    WriteReg,
    ReadMem,
    WriteMem,
}

impl CommandKind {
    pub fn serialize(self, mut buf: impl io::Write) -> Result<()> {
        let value: u16 = match self {
            Self::ReadReg => 0x0080,
            Self::WriteReg => 0x0082,
            Self::ReadMem => 0x0084,
            Self::WriteMem => 0x0086,
        };

        buf.write_u16::<BE>(value)?;
        Ok(())
    }
}

pub trait CommandData: Sized {
    fn flag(&self) -> CommandFlag;

    fn kind(&self) -> CommandKind;

    /// Length in bytes of the command specific data.
    fn length(&self) -> u16;

    /// Length in bytes of a complete acknowledge to this command.
    fn ack_len(&self) -> usize;

    fn serialize(&self, buf: impl io::Write) -> Result<()>;

    fn finalize(self, request_id: u16) -> CommandPacket<Self> {
        CommandPacket::new(self, request_id)
    }
}

/// Reads a single 32-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadReg {
    address: u32,
}

impl ReadReg {
    pub fn new(address: u32) -> Result<Self> {
        if address % 4 != 0 {
            Err(Error::InvalidPacket(
                "an address of `ReadReg` must be a multiple of 4".into(),
            ))
        } else {
            Ok(Self { address })
        }
    }
}

impl CommandData for ReadReg {
    fn flag(&self) -> CommandFlag {
        CommandFlag::new().need_ack()
    }

    fn kind(&self) -> CommandKind {
        CommandKind::ReadReg
    }

    fn length(&self) -> u16 {
        4
    }

    fn ack_len(&self) -> usize {
        HEADER_LENGTH + 4
    }

    fn serialize(&self, mut buf: impl io::Write) -> Result<()> {
        buf.write_u32::<BE>(self.address)?;
        Ok(())
    }
}

/// Writes a single 32-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteReg {
    address: u32,
    value: u32,
}

impl WriteReg {
    pub fn new(address: u32, value: u32) -> Result<Self> {
        if address % 4 != 0 {
            Err(Error::InvalidPacket(
                "an address of `WriteReg` must be a multiple of 4".into(),
            ))
        } else {
            Ok(Self { address, value })
        }
    }
}

impl CommandData for WriteReg {
    fn flag(&self) -> CommandFlag {
        CommandFlag::new().need_ack()
    }

    fn kind(&self) -> CommandKind {
        CommandKind::WriteReg
    }

    fn length(&self) -> u16 {
        8
    }

    fn ack_len(&self) -> usize {
        HEADER_LENGTH + 4
    }

    fn serialize(&self, mut buf: impl io::Write) -> Result<()> {
        buf.write_u32::<BE>(self.address)?;
        buf.write_u32::<BE>(self.value)?;
        Ok(())
    }
}

/// Reads a block of the device's memory space.
///
/// The requested length must already be rounded up to a multiple of 4; a
/// caller interested in fewer bytes discards the tail of the acknowledge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadMem {
    address: u32,
    length: u16,
}

impl ReadMem {
    pub fn new(address: u32, length: u16) -> Result<Self> {
        if address % 4 != 0 || length % 4 != 0 {
            Err(Error::InvalidPacket(
                "address and length fields of `ReadMem` command must be a multiple of 4".into(),
            ))
        } else if length > DATA_SIZE_MAX {
            Err(Error::InvalidPacket(
                format!("length must be smaller or equal than {}", DATA_SIZE_MAX).into(),
            ))
        } else {
            Ok(Self { address, length })
        }
    }

    pub const fn maximum_read_length() -> usize {
        DATA_SIZE_MAX as usize
    }
}

impl CommandData for ReadMem {
    fn flag(&self) -> CommandFlag {
        CommandFlag::new().need_ack()
    }

    fn kind(&self) -> CommandKind {
        CommandKind::ReadMem
    }

    fn length(&self) -> u16 {
        8
    }

    fn ack_len(&self) -> usize {
        HEADER_LENGTH + 4 + self.length as usize
    }

    fn serialize(&self, mut buf: impl io::Write) -> Result<()> {
        buf.write_u32::<BE>(self.address)?;
        buf.write_u32::<BE>(u32::from(self.length))?;
        Ok(())
    }
}

/// Writes a block of the device's memory space.
///
/// The data must already be zero-padded to a multiple of 4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteMem<'a> {
    address: u32,
    data: &'a [u8],
}

impl<'a> WriteMem<'a> {
    pub fn new(address: u32, data: &'a [u8]) -> Result<Self> {
        if address % 4 != 0 || data.len() % 4 != 0 {
            Err(Error::InvalidPacket(
                "address and data length of `WriteMem` command must be a multiple of 4".into(),
            ))
        } else if data.len() > DATA_SIZE_MAX as usize {
            Err(Error::InvalidPacket(
                format!(
                    "a data length of `WriteMem` command must be smaller or equal than {}",
                    DATA_SIZE_MAX
                )
                .into(),
            ))
        } else {
            Ok(Self { address, data })
        }
    }

    pub const fn maximum_data_length() -> usize {
        DATA_SIZE_MAX as usize
    }
}

impl<'a> CommandData for WriteMem<'a> {
    fn flag(&self) -> CommandFlag {
        CommandFlag::new().need_ack()
    }

    fn kind(&self) -> CommandKind {
        CommandKind::WriteMem
    }

    fn length(&self) -> u16 {
        4 + self.data.len() as u16
    }

    fn ack_len(&self) -> usize {
        HEADER_LENGTH + 4
    }

    fn serialize(&self, mut buf: impl io::Write) -> Result<()> {
        buf.write_u32::<BE>(self.address)?;
        buf.write_all(self.data)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CommandFlag(u8);

impl CommandFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bit(self, pos: u8) -> Self {
        debug_assert!(pos < 8);
        Self(self.0 | 1_u8 << pos)
    }

    pub fn clear_bit(self, pos: u8) -> Self {
        debug_assert!(pos < 8);
        Self(self.0 & !(1_u8 << pos))
    }

    /// Requests an acknowledge from the device.
    pub fn need_ack(self) -> Self {
        self.set_bit(0)
    }

    pub fn serialize(self, mut buf: impl io::Write) -> Result<()> {
        buf.write_u8(self.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(cmd: &CommandPacket<impl CommandData>) -> Vec<u8> {
        let mut bytes = Vec::new();
        cmd.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), cmd.length());
        bytes
    }

    #[test]
    fn read_reg_cmd_layout() {
        let cmd = ReadReg::new(0x0a00).unwrap().finalize(0x0102);
        assert_eq!(cmd.maximum_ack_len(), 12);
        assert_eq!(
            serialize(&cmd),
            [0x42, 0x01, 0x00, 0x80, 0x00, 0x04, 0x01, 0x02, 0x00, 0x00, 0x0a, 0x00]
        );
    }

    #[test]
    fn write_reg_cmd_layout() {
        let cmd = WriteReg::new(0x0a00, 2).unwrap().finalize(1);
        assert_eq!(
            serialize(&cmd),
            [
                0x42, 0x01, 0x00, 0x82, 0x00, 0x08, 0x00, 0x01, // header
                0x00, 0x00, 0x0a, 0x00, // address
                0x00, 0x00, 0x00, 0x02, // value
            ]
        );
    }

    #[test]
    fn read_mem_cmd_layout() {
        let cmd = ReadMem::new(0x0001_0000, 64).unwrap().finalize(0x0a0b);
        assert_eq!(cmd.request_id(), 0x0a0b);
        assert_eq!(cmd.maximum_ack_len(), 8 + 4 + 64);
        assert_eq!(
            serialize(&cmd),
            [
                0x42, 0x01, 0x00, 0x84, 0x00, 0x08, 0x0a, 0x0b, // header
                0x00, 0x01, 0x00, 0x00, // address
                0x00, 0x00, 0x00, 0x40, // count
            ]
        );
    }

    #[test]
    fn write_mem_cmd_layout() {
        let data = [0xde, 0xad, 0xbe, 0xef];
        let cmd = WriteMem::new(0x0d18, &data).unwrap().finalize(3);
        assert_eq!(cmd.maximum_ack_len(), 12);
        assert_eq!(
            serialize(&cmd),
            [
                0x42, 0x01, 0x00, 0x86, 0x00, 0x08, 0x00, 0x03, // header
                0x00, 0x00, 0x0d, 0x18, // address
                0xde, 0xad, 0xbe, 0xef, // data
            ]
        );
    }

    #[test]
    fn rejects_unaligned_fields() {
        assert!(ReadReg::new(0x0a01).is_err());
        assert!(WriteReg::new(0x0a02, 0).is_err());
        assert!(ReadMem::new(0x0a03, 4).is_err());
        assert!(ReadMem::new(0x0a00, 6).is_err());
        assert!(WriteMem::new(0x0a00, &[0; 6]).is_err());
    }

    #[test]
    fn rejects_oversized_transfers() {
        assert!(ReadMem::new(0, DATA_SIZE_MAX).is_ok());
        assert!(ReadMem::new(0, DATA_SIZE_MAX + 4).is_err());
        assert!(WriteMem::new(0, &[0; DATA_SIZE_MAX as usize]).is_ok());
        assert!(WriteMem::new(0, &[0; DATA_SIZE_MAX as usize + 4]).is_err());
    }
}
