use super::codec::{decode, encode};
use super::transport::{RingMessage, RingTopology, RingTransport};
use crate::error::{EstimatorError, EstimatorResult};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use std::cell::RefCell;
use tracing::debug;

/// Ring over `MPI_COMM_WORLD`: rank `r` sends to `r + 1` and receives from `r - 1`.
///
/// Every rank sends and then receives in the same step, so a blocking send would deadlock
/// the whole ring. `send` therefore only encodes and stores the message; the following
/// `recv` posts it as a non-blocking send and completes it after its own receive.
pub struct MpiTransport {
    // Finalises MPI on drop.
    _universe: Universe,
    world: SimpleCommunicator,
    topology: RingTopology,
    pending: RefCell<Option<(i32, Vec<f64>)>>,
}

impl MpiTransport {
    /// Initialise MPI and join the world ring. Fails when MPI was already initialised.
    pub fn init() -> EstimatorResult<Self> {
        let universe = mpi::initialize().ok_or_else(|| {
            EstimatorError::Communication("MPI is already initialised".into())
        })?;
        let world = universe.world();
        let topology = RingTopology::cyclic(world.rank() as usize, world.size() as usize)?;
        debug!(
            "MPI rank {} of {}: sends to {}, receives from {}",
            topology.rank, topology.size, topology.send_to, topology.recv_from
        );
        Ok(MpiTransport {
            _universe: universe,
            world,
            topology,
            pending: RefCell::new(None),
        })
    }
}

impl RingTransport for MpiTransport {
    fn topology(&self) -> RingTopology {
        self.topology
    }

    fn send(&self, message: RingMessage) -> EstimatorResult<()> {
        let encoded = encode(&message)?;
        if self.pending.borrow_mut().replace(encoded).is_some() {
            return Err(EstimatorError::Communication(format!(
                "rank {} sent twice without receiving",
                self.topology.rank
            )));
        }
        Ok(())
    }

    fn recv(&self) -> EstimatorResult<RingMessage> {
        let send_to = self.world.process_at_rank(self.topology.send_to as i32);
        let recv_from = self.world.process_at_rank(self.topology.recv_from as i32);
        let (tag, buf) = match self.pending.borrow_mut().take() {
            Some((out_tag, out)) => mpi::request::scope(|scope| {
                let request = send_to.immediate_send_with_tag(scope, &out[..], out_tag);
                let (buf, status) = recv_from.receive_vec::<f64>();
                request.wait();
                (status.tag(), buf)
            }),
            None => {
                let (buf, status) = recv_from.receive_vec::<f64>();
                (status.tag(), buf)
            }
        };
        decode(tag, &buf)
    }

    fn barrier(&self) -> EstimatorResult<()> {
        self.world.barrier();
        Ok(())
    }
}
