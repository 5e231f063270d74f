//! Flat `f64` encoding of ring messages for transports that move plain buffers.
//!
//! A round is `[nwalkers, nocc_a, nocc_b, nbasis]` followed by the alpha and beta half
//! Green's functions (column-major, real and imaginary parts interleaved) and the Coulomb
//! and exchange sums. A sums message is `[nwalkers]` followed by the two sums. The message
//! kind travels as the tag.

use super::transport::{RingMessage, RoundMessage};
use crate::error::{EstimatorError, EstimatorResult};
use backend::{CMatrix, C64};

pub const ROUND_TAG: i32 = 1;
pub const SUMS_TAG: i32 = 2;

fn malformed(reason: String) -> EstimatorError {
    EstimatorError::Communication(format!("malformed ring message: {}", reason))
}

fn push_complex(buf: &mut Vec<f64>, values: impl Iterator<Item = C64>) {
    for z in values {
        buf.push(z.re);
        buf.push(z.im);
    }
}

/// Common shape of a batch of half Green's functions, `(0, nbasis)` when it is empty.
fn batch_shape(what: &str, batch: &[CMatrix], nbasis: usize) -> EstimatorResult<usize> {
    let nocc = batch.first().map_or(0, |g| g.nrows());
    for g in batch.iter() {
        if g.shape() != (nocc, nbasis) {
            return Err(malformed(format!(
                "{} half Green's functions of different shapes",
                what
            )));
        }
    }
    Ok(nocc)
}

pub fn encode(message: &RingMessage) -> EstimatorResult<(i32, Vec<f64>)> {
    match message {
        RingMessage::Round(round) => {
            let nwalkers = round.ghalfa.len();
            let nbasis = round
                .ghalfa
                .first()
                .or(round.ghalfb.first())
                .map_or(0, |g| g.ncols());
            let nocc_a = batch_shape("alpha", &round.ghalfa, nbasis)?;
            let nocc_b = batch_shape("beta", &round.ghalfb, nbasis)?;
            if round.ghalfb.len() != nwalkers
                || round.ecoul.len() != nwalkers
                || round.exx.len() != nwalkers
            {
                return Err(malformed("round with inconsistent walker counts".into()));
            }

            let len = 4 + 2 * nwalkers * ((nocc_a + nocc_b) * nbasis + 2);
            let mut buf = Vec::with_capacity(len);
            buf.extend([nwalkers, nocc_a, nocc_b, nbasis].map(|n| n as f64));
            for g in round.ghalfa.iter().chain(round.ghalfb.iter()) {
                push_complex(&mut buf, g.iter().copied());
            }
            push_complex(&mut buf, round.ecoul.iter().copied());
            push_complex(&mut buf, round.exx.iter().copied());
            Ok((ROUND_TAG, buf))
        }
        RingMessage::Sums { ecoul, exx } => {
            if ecoul.len() != exx.len() {
                return Err(malformed("sums with inconsistent walker counts".into()));
            }
            let mut buf = Vec::with_capacity(1 + 4 * ecoul.len());
            buf.push(ecoul.len() as f64);
            push_complex(&mut buf, ecoul.iter().copied());
            push_complex(&mut buf, exx.iter().copied());
            Ok((SUMS_TAG, buf))
        }
    }
}

struct Reader<'a> {
    buf: &'a [f64],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn count(&mut self) -> EstimatorResult<usize> {
        let value = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| malformed("truncated header".into()))?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(malformed(format!("{} is not a count", value)));
        }
        self.pos += 1;
        Ok(value as usize)
    }

    fn complex(&mut self, n: usize) -> EstimatorResult<Vec<C64>> {
        let end = self.pos + 2 * n;
        let chunk = self.buf.get(self.pos..end).ok_or_else(|| {
            malformed(format!(
                "{} values expected after offset {}, {} left",
                2 * n,
                self.pos,
                self.buf.len().saturating_sub(self.pos)
            ))
        })?;
        self.pos = end;
        Ok(chunk
            .chunks_exact(2)
            .map(|pair| C64::new(pair[0], pair[1]))
            .collect())
    }

    fn matrices(
        &mut self,
        count: usize,
        nrows: usize,
        ncols: usize,
    ) -> EstimatorResult<Vec<CMatrix>> {
        (0..count)
            .map(|_| {
                let values = self.complex(nrows * ncols)?;
                Ok(CMatrix::from_iterator(nrows, ncols, values))
            })
            .collect()
    }

    fn finish(&self) -> EstimatorResult<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(malformed(format!(
                "{} trailing values",
                self.buf.len() - self.pos
            )))
        }
    }
}

pub fn decode(tag: i32, buf: &[f64]) -> EstimatorResult<RingMessage> {
    let mut reader = Reader { buf, pos: 0 };
    let message = match tag {
        ROUND_TAG => {
            let nwalkers = reader.count()?;
            let nocc_a = reader.count()?;
            let nocc_b = reader.count()?;
            let nbasis = reader.count()?;
            let ghalfa = reader.matrices(nwalkers, nocc_a, nbasis)?;
            let ghalfb = reader.matrices(nwalkers, nocc_b, nbasis)?;
            let ecoul = reader.complex(nwalkers)?;
            let exx = reader.complex(nwalkers)?;
            RingMessage::Round(RoundMessage {
                ghalfa,
                ghalfb,
                ecoul,
                exx,
            })
        }
        SUMS_TAG => {
            let nwalkers = reader.count()?;
            let ecoul = reader.complex(nwalkers)?;
            let exx = reader.complex(nwalkers)?;
            RingMessage::Sums { ecoul, exx }
        }
        other => {
            return Err(EstimatorError::Communication(format!(
                "unknown ring message tag {}",
                other
            )))
        }
    };
    reader.finish()?;
    Ok(message)
}
