/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Low level device control implementation for `GigE` devices: the GVCP
//! transaction engine, the control-privilege session with its heartbeat,
//! and the `GenICam` XML bootstrap.

use std::{
    convert::TryInto,
    net::Ipv4Addr,
    sync::{Arc, Mutex},
    thread, time,
};

use async_std::{channel, future, net::UdpSocket, task};
use futures_channel::oneshot;
use futures_util::{select, FutureExt};
use tracing::{debug, error, warn};

use gevion_device::gvcp::protocol::{ack, cmd};

use crate::{ControlError, ControlResult, DeviceControl};

use super::{
    register_map::{Bootstrap, ControlChannelPrivilege, StreamRegister, XmlFileLocation},
    stream_handle::StreamHandle,
};

/// Well known UDP port the device's control channel listens on.
const GVCP_DEFAULT_PORT: u16 = 3956;

/// Timeout duration for a single command/acknowledge transaction.
const ACKNOWLEDGE_TIMEOUT: time::Duration = time::Duration::from_millis(1000);

/// Interval between two privilege register reads of the heartbeat.
const HEARTBEAT_PERIOD: time::Duration = time::Duration::from_millis(1000);

/// Size of the scratch buffer packets are serialized into and acknowledges
/// are received into.
const GVCP_BUFFER_SIZE: usize = 1024;

/// Packet size written to a stream channel when it is opened.
const DEFAULT_STREAM_PACKET_SIZE: u32 = 1500;

macro_rules! align {
    ($data:expr) => {
        ($data + 3) & !0b11
    };
}

/// This handle provides the control session of a `GigE` device.
///
/// Opening the handle retrieves the `GenICam` XML from the device, takes
/// the control privilege and starts a heartbeat that keeps the privilege
/// from timing out. All operations of one handle share a single in-flight
/// transaction slot; commands issued from multiple threads are totally
/// ordered.
pub struct ControlHandle {
    inner: Arc<Mutex<ControlHandleInner>>,
    event_tx: Option<channel::Sender<HeartbeatEvent>>,
    completion_rx: Option<oneshot::Receiver<()>>,
}

impl ControlHandle {
    /// Creates a new handle bound to `interface_addr`, targeting the
    /// device's control port at `device_addr`.
    pub fn new(interface_addr: Ipv4Addr, device_addr: Ipv4Addr) -> ControlResult<Self> {
        Self::with_config(interface_addr, device_addr, ConnectionConfig::default())
    }

    /// Creates a new handle with an explicit [`ConnectionConfig`].
    pub fn with_config(
        interface_addr: Ipv4Addr,
        device_addr: Ipv4Addr,
        config: ConnectionConfig,
    ) -> ControlResult<Self> {
        let inner = Arc::new(Mutex::new(task::block_on(ControlHandleInner::new(
            interface_addr,
            device_addr,
            config,
        ))?));

        Ok(Self {
            inner,
            event_tx: None,
            completion_rx: None,
        })
    }

    /// Returns `true` while the session holds the device's control
    /// privilege.
    #[must_use]
    pub fn is_controller(&self) -> bool {
        self.inner.lock().unwrap().is_controller
    }

    /// Allocates a stream receiver socket and registers it with the
    /// device's first stream channel.
    ///
    /// The returned handle is owned by the caller.
    pub fn create_stream(&mut self) -> ControlResult<StreamHandle> {
        let mut inner = self.inner.lock().unwrap();
        log_failure(assert_open(&mut *inner))?;
        if !inner.is_controller {
            warn!("stream creation refused: control privilege is not held");
            return Err(ControlError::NotController);
        }

        let interface_addr = inner.interface_addr;
        let packet_size = inner.config.stream_packet_size;
        let stream = log_failure(StreamHandle::new(interface_addr))?;

        let sr = StreamRegister::new(0);
        log_failure(sr.set_packet_size(&mut *inner, packet_size))?;
        log_failure(sr.set_destination_address(&mut *inner, interface_addr))?;
        log_failure(sr.set_channel_port(&mut *inner, u32::from(stream.port())))?;
        let port = log_failure(sr.channel_port(&mut *inner))?;
        debug!("stream channel port: {}", port);

        Ok(stream)
    }
}

impl DeviceControl for ControlHandle {
    fn open(&mut self) -> ControlResult<()> {
        if self.is_opened() {
            return Ok(());
        }
        debug!("opening device control session");

        let (is_controller, heartbeat_period) = {
            let mut inner = self.inner.lock().unwrap();
            log_failure(inner.open())?;
            (inner.is_controller, inner.config.heartbeat_period)
        };

        // The heartbeat only makes sense while we are the controller.
        if is_controller {
            let (event_tx, event_rx) = channel::unbounded();
            let (completion_tx, completion_rx) = oneshot::channel();
            let heartbeat_loop = HeartbeatLoop {
                inner: self.inner.clone(),
                period: heartbeat_period,
                event_rx,
            };

            self.event_tx = Some(event_tx);
            self.completion_rx = Some(completion_rx);

            thread::spawn(|| task::block_on(heartbeat_loop.run(completion_tx)));
        }

        Ok(())
    }

    fn close(&mut self) -> ControlResult<()> {
        if let (Some(event_tx), Some(completion_rx)) =
            (self.event_tx.take(), self.completion_rx.take())
        {
            event_tx.try_send(HeartbeatEvent::ChannelClosed).ok();
            task::block_on(completion_rx).ok();
        }

        log_failure(self.inner.lock().unwrap().close())
    }

    fn is_opened(&self) -> bool {
        self.inner.lock().unwrap().is_opened
    }

    fn read(&mut self, address: u64, buf: &mut [u8]) -> ControlResult<()> {
        let mut inner = self.inner.lock().unwrap();
        log_failure(assert_open(&mut *inner))?;
        log_failure(inner.read(address, buf))
    }

    fn read_reg(&mut self, address: u64) -> ControlResult<u32> {
        let mut inner = self.inner.lock().unwrap();
        log_failure(assert_open(&mut *inner))?;
        log_failure(inner.read_reg(address))
    }

    fn write(&mut self, address: u64, data: &[u8]) -> ControlResult<()> {
        let mut inner = self.inner.lock().unwrap();
        log_failure(assert_open(&mut *inner))?;
        log_failure(inner.write(address, data))
    }

    fn write_reg(&mut self, address: u64, value: u32) -> ControlResult<()> {
        let mut inner = self.inner.lock().unwrap();
        log_failure(assert_open(&mut *inner))?;
        log_failure(inner.write_reg(address, value))
    }

    fn genapi(&mut self) -> ControlResult<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        log_failure(assert_open(&mut *inner))?;
        log_failure(inner.genapi())
    }

    fn set_genapi(&mut self, xml: Vec<u8>) {
        self.inner.lock().unwrap().set_genapi(xml);
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!("failed to tear down the control session: {}", err);
        }
    }
}

/// Configuration of a control session.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout duration of each command/acknowledge transaction.
    pub timeout: time::Duration,

    /// Interval between two privilege register reads of the heartbeat.
    pub heartbeat_period: time::Duration,

    /// Size of the scratch buffer acknowledges are received into. Must
    /// accommodate the largest expected acknowledge.
    pub buffer_size: usize,

    /// Packet size written to a stream channel when it is opened.
    pub stream_packet_size: u32,

    /// UDP port of the device's control channel.
    pub gvcp_port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: ACKNOWLEDGE_TIMEOUT,
            heartbeat_period: HEARTBEAT_PERIOD,
            buffer_size: GVCP_BUFFER_SIZE,
            stream_packet_size: DEFAULT_STREAM_PACKET_SIZE,
            gvcp_port: GVCP_DEFAULT_PORT,
        }
    }
}

#[derive(Debug)]
struct ControlHandleInner {
    sock: UdpSocket,
    interface_addr: Ipv4Addr,
    config: ConnectionConfig,
    /// Request id of the packet in flight; incremented before every send.
    next_req_id: u16,
    /// Buffer for serializing/deserializing a packet.
    buffer: Vec<u8>,
    genicam_xml: Option<Vec<u8>>,
    is_opened: bool,
    is_controller: bool,
}

impl ControlHandleInner {
    async fn new(
        interface_addr: Ipv4Addr,
        device_addr: Ipv4Addr,
        config: ConnectionConfig,
    ) -> ControlResult<Self> {
        let sock = UdpSocket::bind((interface_addr, 0))
            .await
            .map_err(|err| ControlError::Io(err.into()))?;
        sock.connect((device_addr, config.gvcp_port))
            .await
            .map_err(|err| ControlError::Io(err.into()))?;

        let buffer = vec![0; config.buffer_size];
        Ok(Self {
            sock,
            interface_addr,
            config,
            next_req_id: 0,
            buffer,
            genicam_xml: None,
            is_opened: false,
            is_controller: false,
        })
    }

    async fn send_cmd<'a, T, U>(&'a mut self, cmd: T) -> ControlResult<U>
    where
        T: cmd::CommandData,
        U: ack::ParseAckData<'a>,
    {
        self.next_req_id = self.next_req_id.checked_add(1).unwrap_or(1);

        let cmd = cmd.finalize(self.next_req_id);
        let cmd_len = cmd.length();
        let ack_len = cmd.maximum_ack_len();
        if cmd_len.max(ack_len) > self.buffer.len() {
            return Err(ControlError::InvalidData(
                "transaction doesn't fit into the scratch buffer".into(),
            ));
        }
        cmd.serialize(self.buffer.as_mut_slice())?;

        self.send(cmd_len).await?;
        let received = self.recv().await?;

        if received < ack_len {
            return Err(ControlError::Io(anyhow::Error::msg(
                "acknowledge packet is shorter than expected",
            )));
        }

        let ack = ack::AckPacket::parse(&self.buffer[..received])?;
        self.verify_ack(&ack)?;

        ack.ack_data_as().map_err(Into::into)
    }

    async fn send(&self, len: usize) -> ControlResult<usize> {
        timeout(self.config.timeout, self.sock.send(&self.buffer[..len]))
            .await?
            .map_err(Into::into)
    }

    async fn recv(&mut self) -> ControlResult<usize> {
        timeout(self.config.timeout, self.sock.recv(&mut self.buffer))
            .await?
            .map_err(Into::into)
    }

    fn verify_ack(&self, ack: &ack::AckPacket) -> ControlResult<()> {
        let status = ack.status();
        if !status.is_success() {
            return Err(ControlError::Io(anyhow::Error::msg(format!(
                "invalid status: {:?}",
                status.kind()
            ))));
        }

        // A delayed acknowledge of an earlier transaction must not be taken
        // for the current one's.
        if ack.request_id() != self.next_req_id {
            return Err(ControlError::Io(anyhow::Error::msg("request id mismatch")));
        }

        if ack.ack_kind() == ack::AckKind::Pending {
            return Err(ControlError::NotSupported(
                "pending acknowledges are not supported".into(),
            ));
        }

        Ok(())
    }

    fn load_genicam(&mut self) -> ControlResult<Vec<u8>> {
        let bs = Bootstrap::new();
        let first = bs
            .first_url(self)
            .and_then(|url| self.fetch_genicam(&url));
        match first {
            Ok(xml) => Ok(xml),
            Err(err) => {
                debug!("first XML URL didn't yield a GenICam file: {}", err);
                let url = bs.second_url(self)?;
                self.fetch_genicam(&url)
            }
        }
    }

    fn fetch_genicam(&mut self, url: &str) -> ControlResult<Vec<u8>> {
        if url.is_empty() {
            return Err(ControlError::InvalidData("XML URL register is empty".into()));
        }
        debug!("retrieving GenICam file from: {}", url);

        match XmlFileLocation::parse(url)? {
            XmlFileLocation::Device { address, size } => {
                let mut xml = vec![0; size as usize];
                self.read(u64::from(address), &mut xml)?;
                // The device is not obliged to terminate the file.
                if let Some(last) = xml.last_mut() {
                    *last = 0;
                }
                Ok(xml)
            }

            XmlFileLocation::Host { path } => {
                std::fs::read(&path).map_err(|err| ControlError::Io(err.into()))
            }
        }
    }
}

impl DeviceControl for ControlHandleInner {
    fn open(&mut self) -> ControlResult<()> {
        match self.load_genicam() {
            Ok(xml) => self.genicam_xml = Some(xml),
            Err(err) => warn!("failed to load the GenICam XML: {}", err),
        }

        let privilege = ControlChannelPrivilege::new().enable_control_access();
        match Bootstrap::new().set_control_channel_privilege(self, privilege) {
            Ok(()) => self.is_controller = true,
            Err(err) => warn!("failed to take the control privilege: {}", err),
        }

        self.is_opened = true;
        Ok(())
    }

    fn close(&mut self) -> ControlResult<()> {
        if !self.is_opened {
            return Ok(());
        }

        if self.is_controller {
            let privilege = ControlChannelPrivilege::new();
            if let Err(err) = Bootstrap::new().set_control_channel_privilege(self, privilege) {
                warn!("failed to release the control privilege: {}", err);
            }
            self.is_controller = false;
        }

        self.is_opened = false;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.is_opened
    }

    fn read(&mut self, mut address: u64, buf: &mut [u8]) -> ControlResult<()> {
        for buf_chunk in buf.chunks_mut(cmd::ReadMem::maximum_read_length()) {
            let target_addr: u32 = address.try_into().map_err(|_| {
                ControlError::InvalidData(
                    "the address of `ReadMem` command must be smaller than u32::MAX".into(),
                )
            })?;
            let read_len = buf_chunk.len() as u16;
            let aligned_read_len = align!(read_len);

            let cmd = cmd::ReadMem::new(target_addr, aligned_read_len)?;
            let ack: ack::ReadMem = task::block_on(self.send_cmd(cmd))?;
            if ack.data().len() < read_len as usize {
                return Err(ControlError::Io(anyhow::Error::msg(
                    "`ReadMem` ack data is shorter than requested",
                )));
            }
            buf_chunk.copy_from_slice(&ack.data()[..read_len as usize]);

            address += u64::from(read_len);
        }

        Ok(())
    }

    fn read_reg(&mut self, address: u64) -> ControlResult<u32> {
        let address: u32 = address.try_into().map_err(|_| {
            ControlError::InvalidData(
                "the address of `ReadReg` command must be smaller than u32::MAX".into(),
            )
        })?;

        let cmd = cmd::ReadReg::new(address)?;
        let ack: ack::ReadReg = task::block_on(self.send_cmd(cmd))?;
        Ok(ack.value())
    }

    fn write(&mut self, mut address: u64, data: &[u8]) -> ControlResult<()> {
        for data_chunk in data.chunks(cmd::WriteMem::maximum_data_length()) {
            let target_addr: u32 = address.try_into().map_err(|_| {
                ControlError::InvalidData(
                    "the address of `WriteMem` command must be smaller than u32::MAX".into(),
                )
            })?;
            let aligned_data_len = align!(data_chunk.len());

            let _: ack::WriteMem = if aligned_data_len == data_chunk.len() {
                let cmd = cmd::WriteMem::new(target_addr, data_chunk)?;
                task::block_on(self.send_cmd(cmd))?
            } else {
                let mut aligned_data = vec![0; aligned_data_len];
                aligned_data[..data_chunk.len()].copy_from_slice(data_chunk);
                let cmd = cmd::WriteMem::new(target_addr, &aligned_data)?;
                task::block_on(self.send_cmd(cmd))?
            };

            address += data_chunk.len() as u64;
        }

        Ok(())
    }

    fn write_reg(&mut self, address: u64, value: u32) -> ControlResult<()> {
        let address: u32 = address.try_into().map_err(|_| {
            ControlError::InvalidData(
                "the address of `WriteReg` command must be smaller than u32::MAX".into(),
            )
        })?;

        let cmd = cmd::WriteReg::new(address, value)?;
        let ack: ack::WriteReg = task::block_on(self.send_cmd(cmd))?;

        if ack.entry_num() == 1 {
            Ok(())
        } else {
            Err(ControlError::Io(anyhow::Error::msg(
                "`WriteReg` failed: written entry num mismatch",
            )))
        }
    }

    fn genapi(&mut self) -> ControlResult<Vec<u8>> {
        self.genicam_xml.clone().ok_or_else(|| {
            ControlError::InvalidData("GenICam XML is not available on this device".into())
        })
    }

    fn set_genapi(&mut self, xml: Vec<u8>) {
        self.genicam_xml = Some(xml);
    }
}

struct HeartbeatLoop {
    inner: Arc<Mutex<ControlHandleInner>>,
    period: time::Duration,
    event_rx: channel::Receiver<HeartbeatEvent>,
}

impl HeartbeatLoop {
    async fn run(self, _completion_tx: oneshot::Sender<()>) {
        loop {
            select! {
                _ = task::sleep(self.period).fuse() => {
                    let bs = Bootstrap::new();
                    match bs.control_channel_privilege(&mut *self.inner.lock().unwrap()) {
                        Ok(privilege) => {
                            debug!("heartbeat: control channel privilege = {}", privilege.as_raw());
                        }
                        Err(err) => {
                            error!("heartbeat: failed to read the privilege register: {}", err);
                        }
                    }
                }
                event = self.event_rx.recv().fuse() => {
                    match event {
                        Ok(HeartbeatEvent::ChannelClosed) | Err(_) => break,
                    }
                }
            }
        }
    }
}

enum HeartbeatEvent {
    ChannelClosed,
}

impl From<std::io::Error> for ControlError {
    fn from(err: std::io::Error) -> Self {
        ControlError::Io(err.into())
    }
}

async fn timeout<F, T>(timeout: time::Duration, f: F) -> ControlResult<T>
where
    F: std::future::Future<Output = T>,
{
    future::timeout(timeout, f)
        .await
        .map_err(|_| ControlError::Timeout)
}

fn assert_open<Ctrl: DeviceControl>(device: Ctrl) -> ControlResult<()> {
    if device.is_opened() {
        Ok(())
    } else {
        Err(ControlError::NotOpened)
    }
}

/// Records a failed operation at the session boundary before handing the
/// error to the caller.
fn log_failure<T>(result: ControlResult<T>) -> ControlResult<T> {
    if let Err(error) = &result {
        error!(?error);
    }
    result
}
