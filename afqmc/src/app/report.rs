use backend::{CMatrix, SignedLogDet};
use tracing::{info, warn};

/// Chunked and unchunked energies closer than this count as the same result.
const RING_TOLERANCE: f64 = 1e-8;

pub fn report_energies(ovlp: &[SignedLogDet], energies: &CMatrix) {
    info!("\nLocal energies ({} walkers):", ovlp.len());
    for (w, o) in ovlp.iter().enumerate() {
        let e = energies[(w, 0)];
        info!(
            "  Walker {:>3}: E = {:+.10} {:+.3e}i  E1 = {:+.10}  E2 = {:+.10}  log|overlap| = {:+.6}  phase = {:+.6} {:+.6}i",
            w,
            e.re,
            e.im,
            energies[(w, 1)].re,
            energies[(w, 2)].re,
            o.log_abs,
            o.sign.re,
            o.sign.im
        );
    }
    if !ovlp.is_empty() {
        let mean = energies.column(0).sum() / ovlp.len() as f64;
        info!("\nMean local energy: {:.10} au", mean.re);
    }
}

/// Largest deviation of the ring results of every rank from the unchunked energies.
pub fn max_ring_deviation(reference: &CMatrix, ring: &[CMatrix]) -> f64 {
    ring.iter()
        .map(|energies| {
            (energies - reference)
                .iter()
                .map(|z| z.norm())
                .fold(0.0, f64::max)
        })
        .fold(0.0, f64::max)
}

pub fn report_ring_check(chunks: usize, reference: &CMatrix, ring: &[CMatrix]) {
    let deviation = max_ring_deviation(reference, ring);
    if deviation < RING_TOLERANCE {
        info!(
            "\nChunked energies over {} ring processes agree with the unchunked ones (max deviation {:.3e})",
            chunks, deviation
        );
    } else {
        warn!(
            "\nChunked energies over {} ring processes deviate by {:.3e} from the unchunked ones",
            chunks, deviation
        );
    }
}
