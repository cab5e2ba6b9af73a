//! Multi-process ranks over TCP.
//!
//! Rank 0 is the hub: it listens on the rendezvous address and every other
//! rank connects to it once at startup. Collectives are hub-and-spoke:
//!
//! - broadcast: the hub writes the payload to each rank
//! - barrier: every rank sends `ENTER` to the hub, the hub answers `RELEASE`
//!   once it has heard from all of them
//!
//! Messages are framed as `[kind: u8][len: u32 LE][payload]`.
//!
//! Rank and size come from the launcher environment (Open MPI, PMI, or
//! explicit `LEGACYHALOS_RANK` / `LEGACYHALOS_SIZE`).

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::AppError;
use crate::mpi::channel::{CollectiveChannel, ROOT};

pub const ENV_ADDR: &str = "LEGACYHALOS_MPI_ADDR";
const RANK_VARS: [&str; 3] = ["OMPI_COMM_WORLD_RANK", "PMI_RANK", "LEGACYHALOS_RANK"];
const SIZE_VARS: [&str; 3] = ["OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "LEGACYHALOS_SIZE"];
const DEFAULT_ADDR: &str = "127.0.0.1:47000";

const CONNECT_ATTEMPTS: usize = 120;
const CONNECT_BACKOFF: Duration = Duration::from_millis(250);
const MAX_FRAME: usize = 1 << 30;

const KIND_HELLO: u8 = 1;
const KIND_BCAST: u8 = 2;
const KIND_ENTER: u8 = 3;
const KIND_RELEASE: u8 = 4;

/// Rank, size, and rendezvous address of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchInfo {
    pub rank: usize,
    pub size: usize,
    pub addr: String,
}

impl LaunchInfo {
    /// Resolve from a key lookup (normally the process environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_usize = |vars: &[&str]| -> Result<Option<usize>, AppError> {
            for var in vars {
                if let Some(raw) = lookup(var) {
                    let v = raw
                        .trim()
                        .parse::<usize>()
                        .map_err(|e| AppError::config(format!("Invalid {var}='{raw}': {e}")))?;
                    return Ok(Some(v));
                }
            }
            Ok(None)
        };

        let rank = first_usize(&RANK_VARS)?.unwrap_or(0);
        let size = first_usize(&SIZE_VARS)?.unwrap_or(1);
        if size == 0 {
            return Err(AppError::config("MPI size must be at least 1."));
        }
        if rank >= size {
            return Err(AppError::config(format!("MPI rank {rank} is out of range for size {size}.")));
        }

        Ok(Self {
            rank,
            size,
            addr: lookup(ENV_ADDR).unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        })
    }
}

pub struct TcpGroup {
    rank: usize,
    size: usize,
    /// Hub: one stream per rank (index 0 unused). Other ranks: the hub stream.
    peers: Vec<Option<TcpStream>>,
}

impl std::fmt::Debug for TcpGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpGroup")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl TcpGroup {
    /// Join the group described by `info`, binding or connecting as needed.
    pub fn join(info: &LaunchInfo) -> Result<Self, AppError> {
        if info.rank == ROOT {
            let listener = TcpListener::bind(&info.addr)
                .map_err(|e| AppError::runtime(format!("Failed to bind {}: {e}", info.addr)))?;
            Self::hub(listener, info.size)
        } else {
            Self::connect(&info.addr, info.rank, info.size)
        }
    }

    /// Rank 0: accept `size - 1` peers on `listener`.
    pub fn hub(listener: TcpListener, size: usize) -> Result<Self, AppError> {
        let mut peers: Vec<Option<TcpStream>> = (0..size).map(|_| None).collect();
        let mut joined = 1;
        while joined < size {
            let (stream, from) = listener
                .accept()
                .map_err(|e| AppError::runtime(format!("Failed to accept rank connection: {e}")))?;
            stream.set_nodelay(true).ok();

            let (kind, payload) = read_frame(&stream)?;
            let rank = match (kind, <[u8; 4]>::try_from(payload.as_slice())) {
                (KIND_HELLO, Ok(bytes)) => u32::from_le_bytes(bytes) as usize,
                _ => return Err(AppError::runtime(format!("Unexpected handshake from {from}"))),
            };
            if rank == ROOT || rank >= size || peers[rank].is_some() {
                return Err(AppError::runtime(format!("Invalid or duplicate rank {rank} from {from}")));
            }
            debug!(rank, %from, "Rank connected");
            peers[rank] = Some(stream);
            joined += 1;
        }
        info!(size, "All ranks connected");
        Ok(Self {
            rank: ROOT,
            size,
            peers,
        })
    }

    /// Rank > 0: connect to the hub, retrying while it starts up.
    pub fn connect(addr: &str, rank: usize, size: usize) -> Result<Self, AppError> {
        let target = resolve(addr)?;
        let mut last_err = None;
        for _ in 0..CONNECT_ATTEMPTS {
            match TcpStream::connect(target) {
                Ok(stream) => {
                    stream.set_nodelay(true).ok();
                    let hello = u32::try_from(rank)
                        .map_err(|_| AppError::config(format!("Rank {rank} does not fit the handshake.")))?;
                    write_frame(&stream, KIND_HELLO, &hello.to_le_bytes())?;
                    return Ok(Self {
                        rank,
                        size,
                        peers: vec![Some(stream)],
                    });
                }
                Err(e) => {
                    last_err = Some(e);
                    thread::sleep(CONNECT_BACKOFF);
                }
            }
        }
        Err(AppError::runtime(format!(
            "Rank {rank} could not reach {addr}: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn hub_stream(&self) -> Result<&TcpStream, AppError> {
        self.peers
            .first()
            .and_then(Option::as_ref)
            .ok_or_else(|| AppError::runtime("Not connected to rank 0."))
    }

    fn spokes(&self) -> impl Iterator<Item = &TcpStream> {
        self.peers.iter().skip(1).flatten()
    }
}

impl CollectiveChannel for TcpGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_bytes(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, AppError> {
        if self.is_root() {
            let payload = payload.ok_or_else(|| AppError::runtime("Root rank has nothing to broadcast."))?;
            for stream in self.spokes() {
                write_frame(stream, KIND_BCAST, &payload)?;
            }
            Ok(payload)
        } else {
            expect_frame(self.hub_stream()?, KIND_BCAST)
        }
    }

    fn barrier(&self) -> Result<(), AppError> {
        if self.is_root() {
            for stream in self.spokes() {
                expect_frame(stream, KIND_ENTER)?;
            }
            for stream in self.spokes() {
                write_frame(stream, KIND_RELEASE, &[])?;
            }
        } else {
            let hub = self.hub_stream()?;
            write_frame(hub, KIND_ENTER, &[])?;
            expect_frame(hub, KIND_RELEASE)?;
        }
        Ok(())
    }
}

fn resolve(addr: &str) -> Result<SocketAddr, AppError> {
    addr.to_socket_addrs()
        .map_err(|e| AppError::config(format!("Invalid {ENV_ADDR} '{addr}': {e}")))?
        .next()
        .ok_or_else(|| AppError::config(format!("{ENV_ADDR} '{addr}' did not resolve.")))
}

fn write_frame(mut stream: &TcpStream, kind: u8, payload: &[u8]) -> Result<(), AppError> {
    let len = u32::try_from(payload.len()).map_err(|_| AppError::runtime("Broadcast payload too large."))?;
    let mut header = [0u8; 5];
    header[0] = kind;
    header[1..5].copy_from_slice(&len.to_le_bytes());
    stream
        .write_all(&header)
        .and_then(|_| stream.write_all(payload))
        .and_then(|_| stream.flush())
        .map_err(|e| AppError::runtime(format!("Rank link write failed: {e}")))
}

fn read_frame(mut stream: &TcpStream) -> Result<(u8, Vec<u8>), AppError> {
    let mut header = [0u8; 5];
    stream
        .read_exact(&mut header)
        .map_err(|e| AppError::runtime(format!("Rank link read failed: {e}")))?;
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME {
        return Err(AppError::runtime(format!("Frame of {len} bytes exceeds the limit.")));
    }
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .map_err(|e| AppError::runtime(format!("Rank link read failed: {e}")))?;
    Ok((header[0], payload))
}

fn expect_frame(stream: &TcpStream, kind: u8) -> Result<Vec<u8>, AppError> {
    let (got, payload) = read_frame(stream)?;
    if got != kind {
        return Err(AppError::runtime(format!("Expected frame kind {kind}, got {got}.")));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpi::channel::broadcast;
    use std::collections::HashMap;

    #[test]
    fn launch_info_prefers_open_mpi_variables() {
        let env: HashMap<&str, &str> = [
            ("OMPI_COMM_WORLD_RANK", "2"),
            ("OMPI_COMM_WORLD_SIZE", "4"),
            ("LEGACYHALOS_RANK", "9"),
        ]
        .into_iter()
        .collect();
        let info = LaunchInfo::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(info.rank, 2);
        assert_eq!(info.size, 4);
        assert_eq!(info.addr, DEFAULT_ADDR);
    }

    #[test]
    fn launch_info_rejects_rank_out_of_range() {
        let env: HashMap<&str, &str> = [("PMI_RANK", "3"), ("PMI_SIZE", "3")].into_iter().collect();
        let err = LaunchInfo::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn hub_and_spokes_share_broadcasts_and_barriers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let size = 3;

        let spokes: Vec<_> = (1..size)
            .map(|rank| {
                let addr = addr.clone();
                thread::spawn(move || {
                    let group = TcpGroup::connect(&addr, rank, size).unwrap();
                    let got: Vec<String> = broadcast(&group, None).unwrap();
                    group.barrier().unwrap();
                    got
                })
            })
            .collect();

        let hub = TcpGroup::hub(listener, size).unwrap();
        let sent = vec!["NGC1".to_string(), "NGC2".to_string()];
        let echoed: Vec<String> = broadcast(&hub, Some(&sent)).unwrap();
        hub.barrier().unwrap();

        assert_eq!(echoed, sent);
        for s in spokes {
            assert_eq!(s.join().unwrap(), sent);
        }
    }
}
