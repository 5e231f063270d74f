use crate::error::{EstimatorError, EstimatorResult};
use backend::{CMatrix, C64};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};

/// Position of one process in a fixed cyclic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingTopology {
    pub rank: usize,
    pub size: usize,
    pub send_to: usize,
    pub recv_from: usize,
}

impl RingTopology {
    pub fn new(rank: usize, size: usize, send_to: usize, recv_from: usize) -> EstimatorResult<Self> {
        if size == 0 {
            return Err(EstimatorError::GroupSize {
                expected: 1,
                actual: 0,
            });
        }
        if rank >= size || send_to >= size || recv_from >= size {
            return Err(EstimatorError::Communication(format!(
                "rank {} with neighbours {} -> {} does not fit a group of {}",
                rank, recv_from, send_to, size
            )));
        }
        Ok(RingTopology {
            rank,
            size,
            send_to,
            recv_from,
        })
    }

    /// `rank` sends to `rank + 1` and receives from `rank - 1`, modulo `size`.
    pub fn cyclic(rank: usize, size: usize) -> EstimatorResult<Self> {
        let size_or_one = size.max(1);
        RingTopology::new(
            rank,
            size,
            (rank + 1) % size_or_one,
            (rank + size_or_one - 1) % size_or_one,
        )
    }

    /// Check that the topologies of a whole group, indexed by rank, form one cycle with
    /// matching send and receive neighbours.
    pub fn validate_group(group: &[RingTopology]) -> EstimatorResult<()> {
        let size = group.len();
        if size == 0 {
            return Err(EstimatorError::GroupSize {
                expected: 1,
                actual: 0,
            });
        }
        for (r, t) in group.iter().enumerate() {
            if t.size != size {
                return Err(EstimatorError::GroupSize {
                    expected: size,
                    actual: t.size,
                });
            }
            if t.rank != r {
                return Err(EstimatorError::Communication(format!(
                    "topology at position {} claims rank {}",
                    r, t.rank
                )));
            }
            if group[t.send_to].recv_from != r {
                return Err(EstimatorError::Communication(format!(
                    "rank {} sends to {} which receives from {}",
                    r, t.send_to, group[t.send_to].recv_from
                )));
            }
        }

        let mut visited = 1;
        let mut rank = group[0].send_to;
        while rank != 0 && visited <= size {
            visited += 1;
            rank = group[rank].send_to;
        }
        if visited != size {
            return Err(EstimatorError::Communication(format!(
                "ring through rank 0 visits {} of {} processes",
                visited, size
            )));
        }
        Ok(())
    }
}

/// Walker data and running sums travelling one hop around the ring.
#[derive(Debug, Clone)]
pub struct RoundMessage {
    pub ghalfa: Vec<CMatrix>,
    pub ghalfb: Vec<CMatrix>,
    pub ecoul: Vec<C64>,
    pub exx: Vec<C64>,
}

#[derive(Debug, Clone)]
pub enum RingMessage {
    Round(RoundMessage),
    /// Final hop returning the reduced sums to the owner of the walkers.
    Sums { ecoul: Vec<C64>, exx: Vec<C64> },
}

impl RingMessage {
    fn kind(&self) -> &'static str {
        match self {
            RingMessage::Round(_) => "round",
            RingMessage::Sums { .. } => "sums",
        }
    }

    pub fn into_round(self) -> EstimatorResult<RoundMessage> {
        match self {
            RingMessage::Round(round) => Ok(round),
            other => Err(EstimatorError::Communication(format!(
                "expected a round message, got {}",
                other.kind()
            ))),
        }
    }

    pub fn into_sums(self) -> EstimatorResult<(Vec<C64>, Vec<C64>)> {
        match self {
            RingMessage::Sums { ecoul, exx } => Ok((ecoul, exx)),
            other => Err(EstimatorError::Communication(format!(
                "expected a sums message, got {}",
                other.kind()
            ))),
        }
    }
}

/// Blocking, ordered point-to-point messaging with the ring neighbours plus a group barrier.
pub trait RingTransport {
    fn topology(&self) -> RingTopology;

    /// Deliver `message` to the send neighbour.
    fn send(&self, message: RingMessage) -> EstimatorResult<()>;

    /// Block until the receive neighbour's next message arrives.
    fn recv(&self) -> EstimatorResult<RingMessage>;

    fn barrier(&self) -> EstimatorResult<()>;
}

/// In-process ring: one mpsc channel into every rank and a shared barrier. Each endpoint is
/// meant to be moved to its own thread.
pub struct ChannelTransport {
    topology: RingTopology,
    sender: Sender<RingMessage>,
    receiver: Receiver<RingMessage>,
    barrier: Arc<Barrier>,
}

impl ChannelTransport {
    /// Endpoints of a cyclic group of `size` processes, indexed by rank.
    pub fn ring(size: usize) -> EstimatorResult<Vec<ChannelTransport>> {
        let topologies = (0..size)
            .map(|rank| RingTopology::cyclic(rank, size))
            .collect::<EstimatorResult<Vec<_>>>()?;
        RingTopology::validate_group(&topologies)?;

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        let barrier = Arc::new(Barrier::new(size));
        Ok(topologies
            .into_iter()
            .zip(receivers)
            .map(|(topology, receiver)| ChannelTransport {
                sender: senders[topology.send_to].clone(),
                receiver,
                barrier: Arc::clone(&barrier),
                topology,
            })
            .collect())
    }
}

impl RingTransport for ChannelTransport {
    fn topology(&self) -> RingTopology {
        self.topology
    }

    fn send(&self, message: RingMessage) -> EstimatorResult<()> {
        self.sender.send(message).map_err(|_| {
            EstimatorError::Communication(format!(
                "rank {} lost its send neighbour {}",
                self.topology.rank, self.topology.send_to
            ))
        })
    }

    fn recv(&self) -> EstimatorResult<RingMessage> {
        self.receiver.recv().map_err(|_| {
            EstimatorError::Communication(format!(
                "rank {} lost its receive neighbour {}",
                self.topology.rank, self.topology.recv_from
            ))
        })
    }

    fn barrier(&self) -> EstimatorResult<()> {
        self.barrier.wait();
        Ok(())
    }
}
