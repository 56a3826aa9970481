//! Multi-process transport over a full mesh of TCP connections.
//!
//! Every rank listens on its own address. During setup rank `r` dials every
//! lower rank and accepts one connection from every higher rank; a dialer
//! announces itself by writing its rank as a little-endian `u32`.
//!
//! Messages are framed as an 8-byte little-endian payload length followed by
//! the bincode encoding of the matrix. Lengths above [`MAX_FRAME_BYTES`] are
//! rejected before any allocation.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use ndarray::{Array2, ArrayView2};

use crate::core::constants::{CONNECT_RETRY_INTERVAL_MS, MAX_FRAME_BYTES};
use crate::core::error::{GcnError, Result};
use crate::core::types::{Rank, Scalar};
use crate::network::CommunicationGroup;

/// Write one framed matrix.
pub fn write_frame<W: Write>(writer: &mut W, tensor: ArrayView2<'_, Scalar>) -> Result<()> {
    let payload = bincode::serialize(&tensor)?;
    writer.write_all(&(payload.len() as u64).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed matrix.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Array2<Scalar>> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf)?;
    let declared = u64::from_le_bytes(len_buf);
    if declared > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {} byte limit", declared, MAX_FRAME_BYTES),
        )
        .into());
    }
    let len = usize::try_from(declared)
        .map_err(|_| GcnError::internal("frame length does not fit in memory"))?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

#[derive(Debug)]
struct PeerLink {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
}

impl PeerLink {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        Ok(PeerLink {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(BufWriter::new(stream)),
        })
    }
}

/// One process's endpoint of a TCP group.
#[derive(Debug)]
pub struct TcpGroup {
    rank: Rank,
    size: usize,
    links: Vec<Option<PeerLink>>,
}

impl TcpGroup {
    /// Bind `peers[rank]` and connect to every other address in `peers`.
    pub fn connect(rank: Rank, peers: &[SocketAddr], timeout: Duration) -> Result<Self> {
        let addr = peers.get(rank).ok_or_else(|| {
            GcnError::invalid_parameter(
                "rank",
                rank.to_string(),
                format!("only {} peer addresses configured", peers.len()),
            )
        })?;
        let listener = TcpListener::bind(addr)?;
        TcpGroup::establish(rank, listener, peers, timeout)
    }

    /// Build the mesh from an already bound listener.
    pub fn establish(
        rank: Rank,
        listener: TcpListener,
        peers: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self> {
        let size = peers.len();
        if rank >= size {
            return Err(GcnError::invalid_parameter(
                "rank",
                rank.to_string(),
                format!("must be below world size {}", size),
            ));
        }

        let deadline = Instant::now() + timeout;
        let retry = Duration::from_millis(CONNECT_RETRY_INTERVAL_MS);
        let mut links: Vec<Option<PeerLink>> = (0..size).map(|_| None).collect();

        for (peer, addr) in peers.iter().enumerate().take(rank) {
            let mut stream = loop {
                match TcpStream::connect(addr) {
                    Ok(stream) => break stream,
                    Err(e) if Instant::now() < deadline => {
                        log::trace!("rank {} waiting for rank {} at {}: {}", rank, peer, addr, e);
                        thread::sleep(retry);
                    }
                    Err(e) => {
                        return Err(GcnError::communication(
                            rank,
                            format!("could not reach rank {} at {}: {}", peer, addr, e),
                        ))
                    }
                }
            };
            stream.write_all(&(rank as u32).to_le_bytes())?;
            links[peer] = Some(PeerLink::new(stream)?);
            log::debug!("rank {} connected to rank {}", rank, peer);
        }

        listener.set_nonblocking(true)?;
        let mut pending = size - rank - 1;
        while pending > 0 {
            match listener.accept() {
                Ok((mut stream, remote)) => {
                    stream.set_nonblocking(false)?;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    stream.set_read_timeout(Some(remaining.max(retry)))?;
                    let mut hello = [0u8; 4];
                    stream.read_exact(&mut hello).map_err(|e| {
                        GcnError::communication(
                            rank,
                            format!("no handshake from {} before the deadline: {}", remote, e),
                        )
                    })?;
                    stream.set_read_timeout(None)?;
                    let peer = u32::from_le_bytes(hello) as Rank;
                    if peer <= rank || peer >= size || links[peer].is_some() {
                        return Err(GcnError::communication(
                            rank,
                            format!("unexpected handshake from {} claiming rank {}", remote, peer),
                        ));
                    }
                    links[peer] = Some(PeerLink::new(stream)?);
                    pending -= 1;
                    log::debug!("rank {} accepted rank {}", rank, peer);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(GcnError::communication(
                            rank,
                            format!("timed out waiting for {} higher ranks", pending),
                        ));
                    }
                    thread::sleep(retry);
                }
                Err(e) => return Err(e.into()),
            }
        }

        log::info!("rank {} joined a TCP group of {}", rank, size);
        Ok(TcpGroup { rank, size, links })
    }

    fn link(&self, peer: Rank) -> Result<&PeerLink> {
        self.check_peer(peer)?;
        self.links[peer].as_ref().ok_or_else(|| {
            GcnError::communication(self.rank, format!("no connection from rank {} to itself", peer))
        })
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>, peer: Rank) -> Result<MutexGuard<'a, T>> {
        mutex.lock().map_err(|_| {
            GcnError::communication(self.rank, format!("connection to rank {} poisoned", peer))
        })
    }
}

impl CommunicationGroup for TcpGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, tensor: ArrayView2<'_, Scalar>, dst: Rank) -> Result<()> {
        let link = self.link(dst)?;
        let mut writer = self.lock(&link.writer, dst)?;
        write_frame(&mut *writer, tensor).map_err(|e| {
            GcnError::communication(self.rank, format!("send to rank {} failed: {}", dst, e))
        })
    }

    fn recv(&self, src: Rank) -> Result<Array2<Scalar>> {
        let link = self.link(src)?;
        let mut reader = self.lock(&link.reader, src)?;
        read_frame(&mut *reader).map_err(|e| {
            GcnError::communication(self.rank, format!("receive from rank {} failed: {}", src, e))
        })
    }
}
