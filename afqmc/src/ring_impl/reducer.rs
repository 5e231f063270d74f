use super::transport::{RingMessage, RingTransport, RoundMessage};
use crate::energy_impl::kernel::{two_body_kernel, TwoBodyParts};
use crate::error::{ensure_dim, EstimatorResult};
use crate::hamiltonian::InteractionSlab;
use backend::{CMatrix, NumericBackend};
use tracing::debug;

/// Sums Coulomb and exchange energies over Cholesky slabs held by different processes.
///
/// The slabs stay where they are; the half Green's functions travel around the ring
/// together with the running sums accumulated for them so far. After `size - 1` rounds the
/// sums a process holds cover every slab, and one last hop hands them back to the process
/// that owns those walkers.
pub struct ChunkRingReducer<'a> {
    transport: &'a dyn RingTransport,
    slab: &'a InteractionSlab,
    restricted: bool,
    backend: &'a dyn NumericBackend,
}

impl<'a> ChunkRingReducer<'a> {
    pub fn new(
        transport: &'a dyn RingTransport,
        slab: &'a InteractionSlab,
        restricted: bool,
        backend: &'a dyn NumericBackend,
    ) -> Self {
        ChunkRingReducer {
            transport,
            slab,
            restricted,
            backend,
        }
    }

    fn check_round(&self, round: &RoundMessage, nwalkers: usize) -> EstimatorResult<()> {
        ensure_dim("received alpha walker count", round.ghalfa.len(), nwalkers)?;
        ensure_dim("received beta walker count", round.ghalfb.len(), nwalkers)?;
        ensure_dim("received coulomb sums", round.ecoul.len(), nwalkers)?;
        ensure_dim("received exchange sums", round.exx.len(), nwalkers)
    }

    /// Globally summed (ecoul, exx) for the walkers whose half Green's functions are given.
    pub fn reduce(&self, ghalfa: &[CMatrix], ghalfb: &[CMatrix]) -> EstimatorResult<TwoBodyParts> {
        let topology = self.transport.topology();
        let nwalkers = ghalfa.len();

        let mut sums =
            two_body_kernel(self.slab, ghalfa, ghalfb, self.restricted, self.backend)?;
        let mut outgoing = (ghalfa.to_vec(), ghalfb.to_vec());

        for round in 1..topology.size {
            let (out_a, out_b) = outgoing;
            self.transport.send(RingMessage::Round(RoundMessage {
                ghalfa: out_a,
                ghalfb: out_b,
                ecoul: sums.ecoul,
                exx: sums.exx,
            }))?;
            let received = self.transport.recv()?.into_round()?;
            self.transport.barrier()?;
            self.check_round(&received, nwalkers)?;

            let local = two_body_kernel(
                self.slab,
                &received.ghalfa,
                &received.ghalfb,
                self.restricted,
                self.backend,
            )?;
            sums = TwoBodyParts {
                ecoul: received.ecoul,
                exx: received.exx,
            };
            sums.accumulate(&local);
            outgoing = (received.ghalfa, received.ghalfb);
            debug!(
                "rank {}: ring round {}/{} done",
                topology.rank,
                round,
                topology.size - 1
            );
        }

        if topology.size > 1 {
            self.transport.send(RingMessage::Sums {
                ecoul: sums.ecoul,
                exx: sums.exx,
            })?;
            let (ecoul, exx) = self.transport.recv()?.into_sums()?;
            self.transport.barrier()?;
            ensure_dim("returned coulomb sums", ecoul.len(), nwalkers)?;
            ensure_dim("returned exchange sums", exx.len(), nwalkers)?;
            sums = TwoBodyParts { ecoul, exx };
        }
        Ok(sums)
    }
}
